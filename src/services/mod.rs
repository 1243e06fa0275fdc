//! Background services

pub mod upstream_cleanup;
pub mod worker_scaling;

pub use upstream_cleanup::{UpstreamCleanupConfig, UpstreamCleanupHandle, UpstreamCleanupService};
pub use worker_scaling::{
    ScaleAction, WorkerScalingConfig, WorkerScalingHandle, WorkerScalingService,
};
