//! Per-endpoint scheduling
//!
//! Every endpoint gets its own tokio task and its own interval timer, so a
//! slow probe only ever delays the endpoint it belongs to. Within one
//! endpoint, runs are strictly sequential: the next tick is not awaited until
//! the current probe → apply → save → notify pipeline has finished, and ticks
//! missed while a run overran are skipped rather than queued. Both the probe
//! and the alert delivery are time-bounded, so a hung target can stall its
//! endpoint for at most one timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{self, MissedTickBehavior};

use super::prober::Prober;
use super::transition;
use super::types::{AlertEvent, Endpoint, EndpointState, Outcome};
use crate::alerts::{Notifier, NotifyError, SummaryReport};
use crate::state::{PersistenceError, StateStore, StatusSummary};

/// Extra time granted beyond the endpoint timeout before the scheduler gives
/// up on a prober that does not enforce it
const PROBE_DEADLINE_SLACK: Duration = Duration::from_secs(1);

/// Fraction of the timeout above which a successful response is logged as slow
const SLOW_RESPONSE_RATIO: f64 = 0.8;

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Upper bound on delivering one alert to every notification target
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Endpoint not configured: {0}")]
    UnknownEndpoint(String),

    #[error("State persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Notification failed: {0}")]
    Notify(#[from] NotifyError),
}

/// State of one configured endpoint, for status queries
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub url: String,
    pub check_interval_secs: u64,
    pub state: EndpointState,
}

/// Collaborators shared by every endpoint task
#[derive(Clone)]
struct Pipeline {
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    store: Arc<StateStore>,
    notify_timeout: Duration,
}

impl Pipeline {
    /// Probe an endpoint, bounding the call by the endpoint timeout
    async fn probe(&self, endpoint: &Endpoint) -> Outcome {
        let deadline = endpoint.timeout.saturating_add(PROBE_DEADLINE_SLACK);
        let outcome = match time::timeout(deadline, self.prober.probe(endpoint)).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::down(
                format!("Probe timed out after {}s", endpoint.timeout.as_secs_f64()),
                chrono::Utc::now(),
            ),
        };

        if outcome.success {
            tracing::debug!(
                url = %endpoint.url,
                status_code = ?outcome.status_code,
                response_time_ms = ?outcome.response_time_ms,
                "Probe succeeded"
            );
            let slow_ms = endpoint.timeout.as_secs_f64() * 1000.0 * SLOW_RESPONSE_RATIO;
            if let Some(elapsed) = outcome.response_time_ms.filter(|ms| *ms > slow_ms) {
                tracing::warn!(
                    url = %endpoint.url,
                    "Slow response time: {:.0}ms (timeout {}s)",
                    elapsed,
                    endpoint.timeout.as_secs()
                );
            }
        } else {
            tracing::warn!(url = %endpoint.url, detail = %outcome.detail(), "Probe failed");
        }

        outcome
    }

    /// Apply an outcome to the stored state, persist it and dispatch any alert.
    ///
    /// Persistence and notification failures are logged and never undo the
    /// transition.
    async fn record(&self, endpoint: &Endpoint, outcome: &Outcome) -> EndpointState {
        let (next, alert) = self.commit(endpoint, outcome).await;
        if let Some(event) = alert {
            self.deliver(&event).await;
        }
        next
    }

    /// Apply an outcome and persist the new state, returning the alert to send
    async fn commit(
        &self,
        endpoint: &Endpoint,
        outcome: &Outcome,
    ) -> (EndpointState, Option<AlertEvent>) {
        let prior = self.store.load(&endpoint.url);
        let (next, alert) = transition::apply(endpoint, outcome, &prior);

        if next.status != prior.status {
            tracing::info!(
                url = %endpoint.url,
                from = %prior.status,
                to = %next.status,
                "Endpoint state changed"
            );
        }

        // File writes fsync; keep them off the timer threads
        let store = Arc::clone(&self.store);
        let url = endpoint.url.clone();
        let state = next.clone();
        let saved = tokio::task::spawn_blocking(move || store.save(&url, state))
            .await
            .unwrap_or_else(|e| Err(PersistenceError::Task(e.to_string())));

        if let Err(e) = saved {
            tracing::error!(
                url = %endpoint.url,
                error = %e,
                "Failed to persist endpoint state; a restart may repeat the last alert"
            );
        }

        (next, alert)
    }

    /// Send an alert, giving up after the notify timeout
    async fn deliver(&self, event: &AlertEvent) {
        let result = match time::timeout(self.notify_timeout, self.notifier.notify(event)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.notify_timeout)),
        };

        match result {
            Ok(()) => tracing::info!(url = %event.endpoint_url, kind = %event.kind, "Alert sent"),
            Err(e) => tracing::error!(
                url = %event.endpoint_url,
                kind = %event.kind,
                error = %e,
                "Failed to send alert"
            ),
        }
    }
}

/// Schedules probes for a fixed set of endpoints
pub struct Monitor {
    endpoints: Vec<Arc<Endpoint>>,
    /// Serializes pipeline runs per endpoint, keyed by URL
    runs: HashMap<String, Arc<Mutex<()>>>,
    pipeline: Pipeline,
    shutdown_grace: Duration,
}

impl Monitor {
    pub fn new(
        endpoints: Vec<Endpoint>,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
        store: Arc<StateStore>,
    ) -> Self {
        let endpoints: Vec<Arc<Endpoint>> = endpoints.into_iter().map(Arc::new).collect();
        let runs = endpoints
            .iter()
            .map(|endpoint| (endpoint.url.clone(), Arc::new(Mutex::new(()))))
            .collect();

        Self {
            endpoints,
            runs,
            pipeline: Pipeline {
                prober,
                notifier,
                store,
                notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            },
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// How long an in-flight probe may keep running once shutdown is requested
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// How long delivering one alert may take before it is given up
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline.notify_timeout = timeout;
        self
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().map(|endpoint| endpoint.as_ref())
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.pipeline.store
    }

    /// Probe every endpoint on its own schedule until `shutdown` becomes true.
    ///
    /// Returns once every endpoint task has finished its current run, then
    /// flushes the state store.
    pub async fn run_forever(&self, shutdown: watch::Receiver<bool>) -> Result<(), MonitorError> {
        for endpoint in &self.endpoints {
            let state = self.pipeline.store.load(&endpoint.url);
            tracing::info!(
                url = %endpoint.url,
                status = %state.status,
                alert_sent = state.alert_sent,
                interval_secs = endpoint.check_interval.as_secs(),
                "Scheduling endpoint"
            );
        }

        let handles: Vec<_> = self
            .endpoints
            .iter()
            .map(|endpoint| {
                let run = Arc::clone(&self.runs[&endpoint.url]);
                tokio::spawn(run_endpoint(
                    self.pipeline.clone(),
                    Arc::clone(endpoint),
                    run,
                    self.shutdown_grace,
                    shutdown.clone(),
                ))
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Endpoint task terminated abnormally");
            }
        }

        self.pipeline.store.flush()?;
        tracing::info!("Monitor stopped");
        Ok(())
    }

    /// Run the full pipeline for one endpoint right now and return its new state.
    ///
    /// Waits for any scheduled run of the same endpoint to finish first.
    pub async fn check_once(&self, url: &str) -> Result<EndpointState, MonitorError> {
        let endpoint = self
            .endpoint(url)
            .ok_or_else(|| MonitorError::UnknownEndpoint(url.to_string()))?;
        let _run = self.runs[&endpoint.url].lock().await;

        let outcome = self.pipeline.probe(endpoint).await;
        Ok(self.pipeline.record(endpoint, &outcome).await)
    }

    /// Probe an endpoint without touching its state or sending alerts
    pub async fn test_connectivity(&self, endpoint: &Endpoint) -> Outcome {
        self.pipeline.probe(endpoint).await
    }

    /// Discard the stored state of an endpoint so its next probe starts from UNKNOWN.
    ///
    /// For a configured endpoint this waits for any in-flight run so the reset
    /// cannot be overwritten by it. Returns whether a record existed.
    pub async fn reset(&self, url: &str) -> Result<bool, MonitorError> {
        let _run = match self.runs.get(url) {
            Some(run) => Some(run.lock().await),
            None => None,
        };
        Ok(self.pipeline.store.reset(url)?)
    }

    /// Stored state of a configured endpoint
    pub fn status(&self, url: &str) -> Option<EndpointState> {
        self.endpoint(url)
            .map(|endpoint| self.pipeline.store.load(&endpoint.url))
    }

    /// Stored state of every configured endpoint, in configuration order
    pub fn statuses(&self) -> Vec<EndpointStatus> {
        self.endpoints
            .iter()
            .map(|endpoint| EndpointStatus {
                url: endpoint.url.clone(),
                check_interval_secs: endpoint.check_interval.as_secs(),
                state: self.pipeline.store.load(&endpoint.url),
            })
            .collect()
    }

    /// Status counts over the configured endpoints
    pub fn summary(&self) -> StatusSummary {
        self.endpoints
            .iter()
            .map(|endpoint| self.pipeline.store.load(&endpoint.url).status)
            .collect()
    }

    /// Summary report of every configured endpoint as of now
    pub fn report(&self) -> SummaryReport {
        SummaryReport::new(self.statuses(), chrono::Utc::now())
    }

    /// Build a summary report and send it through the notifier
    pub async fn send_report(&self) -> Result<SummaryReport, MonitorError> {
        let report = self.report();
        let timeout = self.pipeline.notify_timeout;
        match time::timeout(timeout, self.pipeline.notifier.send_report(&report)).await {
            Ok(result) => result?,
            Err(_) => return Err(NotifyError::Timeout(timeout).into()),
        }
        tracing::info!(total = report.summary.total, "Summary report sent");
        Ok(report)
    }

    fn endpoint(&self, url: &str) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.url == url)
            .map(|endpoint| endpoint.as_ref())
    }
}

/// Scheduling loop for a single endpoint
async fn run_endpoint(
    pipeline: Pipeline,
    endpoint: Arc<Endpoint>,
    run: Arc<Mutex<()>>,
    grace: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(endpoint.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                // A dropped sender also means shutdown
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let _run = run.lock().await;
        let outcome = tokio::select! {
            outcome = pipeline.probe(&endpoint) => outcome,
            _ = shutdown_deadline(shutdown.clone(), grace) => {
                tracing::warn!(url = %endpoint.url, "Abandoning in-flight probe at shutdown");
                Outcome::down("Probe abandoned: shutdown deadline exceeded", chrono::Utc::now())
            }
        };

        let (_, alert) = pipeline.commit(&endpoint, &outcome).await;
        if let Some(event) = alert {
            // The new state is already saved; only the delivery is dropped
            tokio::select! {
                _ = pipeline.deliver(&event) => {}
                _ = shutdown_deadline(shutdown.clone(), grace) => {
                    tracing::warn!(url = %endpoint.url, kind = %event.kind, "Abandoning alert delivery at shutdown");
                }
            }
        }
    }

    tracing::debug!(url = %endpoint.url, "Endpoint task stopped");
}

/// Completes `grace` after shutdown is requested
async fn shutdown_deadline(mut shutdown: watch::Receiver<bool>, grace: Duration) {
    // An error means the sender is gone, which counts as shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
    time::sleep(grace).await;
}
