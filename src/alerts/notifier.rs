//! Notification delivery for alert events and summary reports

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::report::SummaryReport;
use crate::monitor::{AlertEvent, AlertKind};

/// Upper bound on a single webhook request, connection included
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers alert events. Shared by every endpoint task, so implementations
/// must tolerate concurrent calls.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;

    /// Deliver an on-demand summary of every endpoint
    async fn send_report(&self, report: &SummaryReport) -> Result<(), NotifyError>;
}

/// Notification target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// HTTP webhook receiving the event as JSON
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Notifier fanning each event out to a list of targets
pub struct TargetNotifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl TargetNotifier {
    pub fn new(targets: Vec<NotifyTarget>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(targets, DEFAULT_WEBHOOK_TIMEOUT)
    }

    /// Create a notifier whose webhook requests give up after `timeout`
    pub fn with_timeout(targets: Vec<NotifyTarget>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, targets })
    }

    pub fn targets(&self) -> &[NotifyTarget] {
        &self.targets
    }

    /// Send notification to a single target
    async fn notify_target(
        &self,
        target: &NotifyTarget,
        event: &AlertEvent,
    ) -> Result<(), NotifyError> {
        match target {
            NotifyTarget::Log => {
                match event.kind {
                    AlertKind::Down => tracing::warn!(
                        url = %event.endpoint_url,
                        kind = %event.kind,
                        occurred_at = %event.occurred_at,
                        "{}: {}",
                        event.subject(),
                        event.detail
                    ),
                    AlertKind::Recovered => tracing::info!(
                        url = %event.endpoint_url,
                        kind = %event.kind,
                        occurred_at = %event.occurred_at,
                        "{}: {}",
                        event.subject(),
                        event.detail
                    ),
                }
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => {
                let payload = serde_json::json!({
                    "subject": event.subject(),
                    "url": event.endpoint_url,
                    "kind": event.kind,
                    "occurred_at": event.occurred_at.to_rfc3339(),
                    "detail": event.detail,
                });
                self.send_webhook(url, headers, &payload).await?;
                tracing::debug!(url = %event.endpoint_url, webhook = %url, "Webhook notification sent");
                Ok(())
            }
        }
    }

    /// Send a summary report to a single target
    async fn report_target(
        &self,
        target: &NotifyTarget,
        report: &SummaryReport,
    ) -> Result<(), NotifyError> {
        match target {
            NotifyTarget::Log => {
                tracing::info!(
                    total = report.summary.total,
                    up = report.summary.up,
                    down = report.summary.down,
                    unknown = report.summary.unknown,
                    "{}\n{}",
                    report.subject(),
                    report.body()
                );
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => {
                let payload = serde_json::json!({
                    "subject": report.subject(),
                    "kind": "REPORT",
                    "generated_at": report.generated_at.to_rfc3339(),
                    "summary": report.summary,
                    "endpoints": report.endpoints,
                    "body": report.body(),
                });
                self.send_webhook(url, headers, &payload).await
            }
        }
    }

    /// POST a JSON payload to a webhook
    async fn send_webhook(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        let mut request = self.client.post(url).json(payload);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifyError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for TargetNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.notify_target(target, event).await {
                errors.push(e);
            }
        }

        combine(errors)
    }

    async fn send_report(&self, report: &SummaryReport) -> Result<(), NotifyError> {
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.report_target(target, report).await {
                errors.push(e);
            }
        }

        combine(errors)
    }
}

fn combine(mut errors: Vec<NotifyError>) -> Result<(), NotifyError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(NotifyError::Multiple(errors)),
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Delivery timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifyError>),
}
