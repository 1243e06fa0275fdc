use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DispatchError, Result};

/// Consecutive failures that trigger automatic blacklisting
pub const BLACKLIST_THRESHOLD: u32 = 5;

/// Upstream protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamProtocol {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl UpstreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamProtocol::Http => "http",
            UpstreamProtocol::Https => "https",
            UpstreamProtocol::Socks4 => "socks4",
            UpstreamProtocol::Socks5 => "socks5",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(UpstreamProtocol::Http),
            "https" => Some(UpstreamProtocol::Https),
            "socks4" => Some(UpstreamProtocol::Socks4),
            "socks5" | "socks5h" => Some(UpstreamProtocol::Socks5),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            UpstreamProtocol::Http => 80,
            UpstreamProtocol::Https => 443,
            UpstreamProtocol::Socks4 | UpstreamProtocol::Socks5 => 1080,
        }
    }
}

impl std::fmt::Display for UpstreamProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Egress upstream with health and performance bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    /// `host:port`, unique within a pool
    pub address: String,
    pub protocol: UpstreamProtocol,
    #[serde(default)]
    pub country: Option<String>,
    /// Free-form kind tag (e.g. "datacenter", "internal")
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub fail_count: u64,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Times handed out by the pool
    #[serde(default)]
    pub selected_count: u64,
    /// Cumulative moving average, seconds
    #[serde(default)]
    pub avg_response_time: f64,
    #[serde(default = "default_score")]
    pub reliability_score: f64,
    #[serde(default = "default_score")]
    pub speed_score: f64,
    #[serde(default)]
    pub blacklisted: bool,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_error: Option<String>,
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

fn default_score() -> f64 {
    0.5
}

impl Upstream {
    pub fn new(address: impl Into<String>, protocol: UpstreamProtocol) -> Self {
        Self {
            address: address.into(),
            protocol,
            country: None,
            kind: None,
            success_count: 0,
            fail_count: 0,
            total_requests: 0,
            consecutive_failures: 0,
            selected_count: 0,
            avg_response_time: 0.0,
            reliability_score: default_score(),
            speed_score: default_score(),
            blacklisted: false,
            last_used: None,
            last_success: None,
            last_failure: None,
            last_error: None,
            added_at: Utc::now(),
        }
    }

    /// Parse `scheme://host:port` or bare `host:port` (defaults to http)
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DispatchError::InvalidUpstreamAddress("empty address".into()));
        }

        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };
        let url = Url::parse(&with_scheme)?;

        let protocol = UpstreamProtocol::from_str(url.scheme()).ok_or_else(|| {
            DispatchError::InvalidUpstreamAddress(format!("unsupported scheme: {}", url.scheme()))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| DispatchError::InvalidUpstreamAddress(format!("missing host: {}", raw)))?;
        let port = url.port().unwrap_or_else(|| protocol.default_port());

        Ok(Self::new(format!("{}:{}", host, port), protocol))
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn url(&self) -> String {
        format!("{}://{}", self.protocol, self.address)
    }

    /// Success ratio adjusted by a recent-failure penalty and a volume bonus, clamped to [0.1, 1.0]
    pub fn compute_reliability(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.5;
        }

        let base = self.success_count as f64 / self.total_requests as f64;
        let penalty = self.consecutive_failures as f64 * 0.1;
        let volume_bonus = (self.total_requests as f64 / 1000.0).min(0.2);

        (base - penalty + volume_bonus).clamp(0.1, 1.0)
    }

    /// Five-tier score from the average response time
    pub fn compute_speed(&self) -> f64 {
        match self.avg_response_time {
            t if t < 1.0 => 1.0,
            t if t < 3.0 => 0.8,
            t if t < 5.0 => 0.6,
            t if t < 10.0 => 0.4,
            _ => 0.2,
        }
    }

    /// Recency of the last success
    pub fn freshness(&self, now: DateTime<Utc>) -> f64 {
        let Some(last) = self.last_success else {
            return 0.1;
        };

        let hours = (now - last).num_seconds() as f64 / 3600.0;
        if hours < 1.0 {
            1.0
        } else if hours < 6.0 {
            0.7
        } else if hours < 24.0 {
            0.4
        } else {
            0.1
        }
    }

    /// Share of recorded requests that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_requests as f64 * 100.0
        }
    }

    /// Record a successful request and clear any blacklisting
    pub fn record_success(&mut self, response_time: f64) {
        let now = Utc::now();
        self.success_count += 1;
        self.total_requests += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(now);
        self.last_used = Some(now);

        let n = self.success_count as f64;
        self.avg_response_time = if self.success_count == 1 {
            response_time
        } else {
            (self.avg_response_time * (n - 1.0) + response_time) / n
        };

        self.reliability_score = self.compute_reliability();
        self.speed_score = self.compute_speed();
        self.blacklisted = false;
    }

    /// Record a failed request; returns true when this failure blacklisted the entry
    pub fn record_failure(&mut self, error: Option<&str>) -> bool {
        self.fail_count += 1;
        self.total_requests += 1;
        self.consecutive_failures += 1;
        self.last_failure = Some(Utc::now());
        self.last_error = error.map(str::to_string);
        self.reliability_score = self.compute_reliability();

        if self.consecutive_failures >= BLACKLIST_THRESHOLD && !self.blacklisted {
            self.blacklisted = true;
            return true;
        }
        false
    }
}
