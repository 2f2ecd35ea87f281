//! Test doubles for the monitor's collaborators

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::Instant;

use super::prober::Prober;
use super::types::{AlertEvent, AlertKind, Endpoint, Outcome};
use crate::alerts::{Notifier, NotifyError, SummaryReport};
use crate::state::{PersistenceError, StateBackend};

#[derive(Default)]
struct ProbeLog {
    calls: Vec<(String, Instant)>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Prober answering from a per-URL script of successes and failures.
///
/// URLs without a script (or whose script ran out) succeed.
#[derive(Default)]
pub struct ScriptedProber {
    scripts: Mutex<HashMap<String, VecDeque<bool>>>,
    delays: Mutex<HashMap<String, Duration>>,
    log: Mutex<ProbeLog>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, results: impl IntoIterator<Item = bool>) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .extend(results);
    }

    pub fn set_delay(&self, url: &str, delay: Duration) {
        self.delays.lock().insert(url.to_string(), delay);
    }

    /// Start times of every probe of a URL
    pub fn calls_for(&self, url: &str) -> Vec<Instant> {
        self.log
            .lock()
            .calls
            .iter()
            .filter(|(called, _)| called == url)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn max_in_flight(&self, url: &str) -> usize {
        self.log.lock().max_in_flight.get(url).copied().unwrap_or(0)
    }
}

/// Decrements the in-flight count even when a probe future is dropped
struct InFlight<'a> {
    log: &'a Mutex<ProbeLog>,
    url: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(count) = self.log.lock().in_flight.get_mut(&self.url) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, endpoint: &Endpoint) -> Outcome {
        let url = endpoint.url.clone();
        {
            let mut log = self.log.lock();
            log.calls.push((url.clone(), Instant::now()));
            let count = log.in_flight.entry(url.clone()).or_insert(0);
            *count += 1;
            let current = *count;
            let max = log.max_in_flight.entry(url.clone()).or_insert(0);
            *max = (*max).max(current);
        }
        let _in_flight = InFlight {
            log: &self.log,
            url: url.clone(),
        };

        let delay = self.delays.lock().get(&url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let success = self
            .scripts
            .lock()
            .get_mut(&url)
            .and_then(|script| script.pop_front())
            .unwrap_or(true);

        let now = chrono::Utc::now();
        if success {
            Outcome::up(200, now)
        } else {
            Outcome::down("Connection error: refused", now)
        }
    }
}

/// Notifier that records every event it is asked to deliver
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<AlertEvent>>,
    reports: Mutex<Vec<SummaryReport>>,
    attempts: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// A notifier that takes `delay` to deliver each event
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn kinds(&self) -> Vec<AlertKind> {
        self.events.lock().iter().map(|event| event.kind).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn reports(&self) -> Vec<SummaryReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(NotifyError::Webhook("connection refused".to_string()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn send_report(&self, report: &SummaryReport) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Webhook("connection refused".to_string()));
        }
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

/// Webhook URL whose server accepts connections and never answers
pub async fn silent_webhook() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    format!("http://{}/hook", addr)
}

/// Backend whose writes always fail
pub struct FailingBackend;

impl StateBackend for FailingBackend {
    fn write(&self, _key: &str, _data: &[u8]) -> Result<(), PersistenceError> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full").into())
    }

    fn read(&self, _key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(None)
    }

    fn delete(&self, _key: &str) -> Result<(), PersistenceError> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full").into())
    }

    fn read_all(&self) -> Result<Vec<(String, Vec<u8>)>, PersistenceError> {
        Ok(Vec::new())
    }

    fn sync(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}
