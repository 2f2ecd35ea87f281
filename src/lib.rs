//! Pingwatch: HTTP(S) Endpoint Availability Monitor
//!
//! Probes a set of endpoints on independent schedules, remembers each
//! endpoint's up/down state across restarts, and sends exactly one alert when
//! an endpoint goes down and one when it comes back.
//!
//! # Features
//!
//! - **Independent Schedules**: One timer per endpoint; a slow endpoint never delays another
//! - **Once-Per-Incident Alerts**: DOWN on the first failure, RECOVERED on the first success after it
//! - **Restart-Safe State**: Per-endpoint state written through to disk and reloaded on startup
//! - **Pluggable Delivery**: Log and webhook notifiers behind a `Notifier` trait
//! - **Status API**: Optional HTTP endpoints for status queries, on-demand checks and resets
//! - **Summary Reports**: On-demand report of every endpoint through the same notifiers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pingwatch::alerts::{NotifyTarget, TargetNotifier};
//! use pingwatch::monitor::{Endpoint, HttpProber, Monitor};
//! use pingwatch::state::StateStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let monitor = Monitor::new(
//!     vec![Endpoint::new("https://example.com")],
//!     Arc::new(HttpProber::new()?),
//!     Arc::new(TargetNotifier::new(vec![NotifyTarget::Log])?),
//!     Arc::new(StateStore::in_memory()),
//! );
//!
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! monitor.run_forever(shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod monitor;
pub mod state;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use monitor::{AlertEvent, AlertKind, Endpoint, EndpointState, Monitor, MonitorError, Outcome, Status};
pub use state::{PersistenceError, StateStore};
