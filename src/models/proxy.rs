use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smoothing factor for the mean response time estimate
const RESPONSE_TIME_ALPHA: f64 = 0.3;

/// Proxy health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    /// Never used, or ban expired and awaiting re-check
    #[default]
    Unchecked,
    /// Last outcome was a success
    Alive,
    /// Temporarily excluded from selection until `banned_until`
    Banned,
    /// Permanently removed from rotation (terminal)
    Dead,
}

impl ProxyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyStatus::Unchecked => "unchecked",
            ProxyStatus::Alive => "alive",
            ProxyStatus::Banned => "banned",
            ProxyStatus::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unchecked" => Some(ProxyStatus::Unchecked),
            "alive" => Some(ProxyStatus::Alive),
            "banned" => Some(ProxyStatus::Banned),
            "dead" => Some(ProxyStatus::Dead),
            _ => None,
        }
    }

    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProxyStatus::Dead)
    }
}

impl std::fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-proxy health state
///
/// All mutation happens inside the owning [`ProxyPool`](crate::pool::ProxyPool);
/// the record itself only answers state queries.
#[derive(Debug, Clone)]
pub struct ProxyRecord {
    /// Proxy endpoint (scheme + host + port + optional credentials), immutable
    pub address: String,
    pub status: ProxyStatus,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// While set and in the future, the proxy is not selectable
    pub banned_until: Option<DateTime<Utc>>,
    /// Exponential moving average of observed response times
    pub mean_response_time: Option<Duration>,
    pub total_requests: u64,
    pub total_failures: u64,
}

impl ProxyRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: ProxyStatus::Unchecked,
            consecutive_failures: 0,
            banned_until: None,
            mean_response_time: None,
            total_requests: 0,
            total_failures: 0,
        }
    }

    /// Check if the proxy is selectable at `now`.
    ///
    /// False iff the proxy is dead, or banned with the ban still running.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ProxyStatus::Dead => false,
            ProxyStatus::Banned => match self.banned_until {
                Some(until) => now >= until,
                None => true,
            },
            ProxyStatus::Unchecked | ProxyStatus::Alive => true,
        }
    }

    /// Fold a new response time sample into the running estimate
    pub(crate) fn observe_response_time(&mut self, sample: Duration) {
        let sample_ms = sample.as_secs_f64() * 1000.0;
        let updated_ms = match self.mean_response_time {
            Some(mean) => {
                let mean_ms = mean.as_secs_f64() * 1000.0;
                RESPONSE_TIME_ALPHA * sample_ms + (1.0 - RESPONSE_TIME_ALPHA) * mean_ms
            }
            None => sample_ms,
        };
        self.mean_response_time = Some(Duration::from_secs_f64(updated_ms / 1000.0));
    }

    /// Create a copy-out view of this record
    pub fn snapshot(&self) -> ProxySnapshot {
        ProxySnapshot {
            address: self.address.clone(),
            status: self.status,
            consecutive_failures: self.consecutive_failures,
            banned_until: self.banned_until,
            mean_response_time: self.mean_response_time,
            total_requests: self.total_requests,
            total_failures: self.total_failures,
        }
    }
}

/// Read-only view of a proxy record for observability export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySnapshot {
    pub address: String,
    pub status: ProxyStatus,
    pub consecutive_failures: u32,
    pub banned_until: Option<DateTime<Utc>>,
    pub mean_response_time: Option<Duration>,
    pub total_requests: u64,
    pub total_failures: u64,
}

/// Aggregate pool statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub unchecked: usize,
    pub alive: usize,
    pub banned: usize,
    pub dead: usize,
    /// Proxies selectable right now
    pub eligible: usize,
    /// Mean remaining ban time across banned proxies, in seconds
    pub mean_backoff_secs: f64,
}
