pub mod channel;
pub mod task;
pub mod upstream;
pub mod worker;

pub use channel::*;
pub use task::*;
pub use upstream::*;
pub use worker::*;
