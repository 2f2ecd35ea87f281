//! Endpoint monitoring: probing, the up/down state machine and scheduling

pub mod prober;
pub mod scheduler;
pub mod transition;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use prober::{HttpProber, Prober};
pub use scheduler::{
    EndpointStatus, Monitor, MonitorError, DEFAULT_NOTIFY_TIMEOUT, DEFAULT_SHUTDOWN_GRACE,
};
pub use transition::apply;
pub use types::{
    AlertEvent, AlertKind, Endpoint, EndpointState, Outcome, Status,
    DEFAULT_ACCEPTED_STATUS_CODES,
};
