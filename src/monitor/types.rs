//! Core monitoring types

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status codes accepted when an endpoint does not list its own
pub const DEFAULT_ACCEPTED_STATUS_CODES: [u16; 4] = [200, 201, 202, 204];

/// A monitored URL with its own schedule and acceptance criteria.
///
/// Only built from a validated configuration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub timeout: Duration,
    pub check_interval: Duration,
    pub accepted_status_codes: BTreeSet<u16>,
}

impl Endpoint {
    /// Create an endpoint with the default timeout, interval and status codes
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
            check_interval: Duration::from_secs(300),
            accepted_status_codes: DEFAULT_ACCEPTED_STATUS_CODES.into_iter().collect(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_accepted_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.accepted_status_codes = codes.into_iter().collect();
        self
    }

    /// Whether a response status counts as healthy
    pub fn accepts(&self, status_code: u16) -> bool {
        self.accepted_status_codes.contains(&status_code)
    }
}

/// Result of one probe attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl Outcome {
    /// A probe that got an accepted response
    pub fn up(status_code: u16, observed_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            error: None,
            response_time_ms: None,
            observed_at,
        }
    }

    /// A probe that failed to complete or got an unacceptable response
    pub fn down(error: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            status_code: None,
            error: Some(error.into()),
            response_time_ms: None,
            observed_at,
        }
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_response_time(mut self, elapsed: Duration) -> Self {
        self.response_time_ms = Some(elapsed.as_secs_f64() * 1000.0);
        self
    }

    /// Short human-readable description for logs and alerts
    pub fn detail(&self) -> String {
        match (&self.error, self.status_code) {
            (Some(error), _) => error.clone(),
            (None, Some(code)) => format!("HTTP {}", code),
            (None, None) => "no response".to_string(),
        }
    }
}

/// Last known availability of an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
    #[default]
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => write!(f, "UP"),
            Status::Down => write!(f, "DOWN"),
            Status::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Persisted per-endpoint state.
///
/// `alert_sent` implies `status == Down`, and `down_since` is set exactly
/// when `status == Down`. Only [`apply`](super::transition::apply) produces
/// new values of this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointState {
    pub status: Status,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub down_since: Option<DateTime<Utc>>,
    pub alert_sent: bool,
    #[serde(default)]
    pub last_state_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub consecutive_successes: u32,
    #[serde(default)]
    pub total_checks: u64,
    #[serde(default)]
    pub total_failures: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub avg_response_time_ms: Option<f64>,
}

impl EndpointState {
    /// Check the structural invariants of a state record
    pub fn is_consistent(&self) -> bool {
        let alert_ok = !self.alert_sent || self.status == Status::Down;
        let down_since_ok = self.down_since.is_some() == (self.status == Status::Down);
        alert_ok && down_since_ok
    }
}

/// Direction of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    Down,
    Recovered,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Down => write!(f, "DOWN"),
            AlertKind::Recovered => write!(f, "RECOVERED"),
        }
    }
}

/// Notification raised at an incident boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub endpoint_url: String,
    pub kind: AlertKind,
    pub occurred_at: DateTime<Utc>,
    pub detail: String,
}

impl AlertEvent {
    pub fn subject(&self) -> String {
        match self.kind {
            AlertKind::Down => format!("ALERT: Website Down - {}", self.endpoint_url),
            AlertKind::Recovered => format!("RECOVERED: Website Up - {}", self.endpoint_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults() {
        let endpoint = Endpoint::new("https://example.com");
        assert_eq!(endpoint.timeout, Duration::from_secs(30));
        assert_eq!(endpoint.check_interval, Duration::from_secs(300));
        assert!(endpoint.accepts(204));
        assert!(!endpoint.accepts(301));
    }

    #[test]
    fn test_outcome_detail() {
        let now = Utc::now();
        assert_eq!(Outcome::up(200, now).detail(), "HTTP 200");
        assert_eq!(
            Outcome::down("Connection error: refused", now).detail(),
            "Connection error: refused"
        );
    }

    #[test]
    fn test_default_state_is_unknown() {
        let state = EndpointState::default();
        assert_eq!(state.status, Status::Unknown);
        assert!(!state.alert_sent);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&Status::Down).unwrap();
        assert_eq!(json, "\"DOWN\"");
        let kind: AlertKind = serde_json::from_str("\"RECOVERED\"").unwrap();
        assert_eq!(kind, AlertKind::Recovered);
    }
}
