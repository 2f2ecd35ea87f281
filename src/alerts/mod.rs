//! Alert delivery
//!
//! Alert events are produced by the monitor's state machine; this module only
//! decides where they go. Summary reports travel the same routes on demand.

pub mod notifier;
pub mod report;

pub use notifier::{Notifier, NotifyError, NotifyTarget, TargetNotifier, DEFAULT_WEBHOOK_TIMEOUT};
pub use report::SummaryReport;
