//! On-demand summary of every monitored endpoint

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::monitor::{EndpointStatus, Status};
use crate::state::StatusSummary;

/// Snapshot of all configured endpoints, delivered through the notifiers
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    pub summary: StatusSummary,
    pub endpoints: Vec<EndpointStatus>,
}

impl SummaryReport {
    pub fn new(endpoints: Vec<EndpointStatus>, generated_at: DateTime<Utc>) -> Self {
        let summary = endpoints.iter().map(|endpoint| endpoint.state.status).collect();
        Self {
            generated_at,
            summary,
            endpoints,
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "Pingwatch Summary Report - {} URLs Monitored",
            self.summary.total
        )
    }

    /// Plain-text rendering: overview counts, then the DOWN and UP endpoints
    pub fn body(&self) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "Pingwatch Summary Report");
        let _ = writeln!(
            body,
            "Generated: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(body);
        let _ = writeln!(body, "OVERVIEW:");
        let _ = writeln!(body, "- Total URLs: {}", self.summary.total);
        let _ = writeln!(body, "- Up: {}", self.summary.up);
        let _ = writeln!(body, "- Down: {}", self.summary.down);
        let _ = writeln!(body, "- Unknown: {}", self.summary.unknown);

        let _ = writeln!(body);
        let _ = writeln!(body, "DOWN URLS:");
        let mut any = false;
        for endpoint in self.with_status(Status::Down) {
            any = true;
            let _ = writeln!(
                body,
                "- {} (Failures: {}, Last Error: {})",
                endpoint.url,
                endpoint.state.consecutive_failures,
                endpoint.state.last_error.as_deref().unwrap_or("Unknown")
            );
        }
        if !any {
            let _ = writeln!(body, "- None");
        }

        let _ = writeln!(body);
        let _ = writeln!(body, "UP URLS:");
        let mut any = false;
        for endpoint in self.with_status(Status::Up) {
            any = true;
            let avg = endpoint
                .state
                .avg_response_time_ms
                .map(|ms| format!("{:.0}ms", ms))
                .unwrap_or_else(|| "N/A".to_string());
            let _ = writeln!(body, "- {} (Avg Response: {})", endpoint.url, avg);
        }
        if !any {
            let _ = writeln!(body, "- None");
        }

        body
    }

    fn with_status(&self, status: Status) -> impl Iterator<Item = &EndpointStatus> {
        self.endpoints
            .iter()
            .filter(move |endpoint| endpoint.state.status == status)
    }
}
