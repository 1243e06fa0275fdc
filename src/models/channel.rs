use serde::{Deserialize, Serialize};

/// Delivery channel a worker is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Browser,
    DirectApi,
    CloudDispatch,
    Hybrid,
}

impl Channel {
    pub fn all() -> [Channel; 4] {
        [
            Channel::Browser,
            Channel::DirectApi,
            Channel::CloudDispatch,
            Channel::Hybrid,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Browser => "browser",
            Channel::DirectApi => "direct_api",
            Channel::CloudDispatch => "cloud_dispatch",
            Channel::Hybrid => "hybrid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "browser" => Some(Channel::Browser),
            "direct_api" | "directapi" | "direct-api" | "api" => Some(Channel::DirectApi),
            "cloud_dispatch" | "clouddispatch" | "cloud-dispatch" | "cloud" => {
                Some(Channel::CloudDispatch)
            }
            "hybrid" => Some(Channel::Hybrid),
            _ => None,
        }
    }

    /// Typical response time in seconds, used before real samples exist
    pub fn baseline_response_secs(&self) -> f64 {
        match self {
            Channel::Browser => 2.5,
            Channel::DirectApi => 1.0,
            Channel::CloudDispatch => 3.0,
            Channel::Hybrid => 2.0,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
