//! Up/down state machine
//!
//! [`apply`] is a pure function of the endpoint, the probe outcome and the
//! prior state. It never performs I/O, so the scheduler can persist the
//! result and dispatch the alert independently.

use super::types::{AlertEvent, AlertKind, Endpoint, EndpointState, Outcome, Status};

/// Smoothing factor for the response time moving average
const RESPONSE_TIME_ALPHA: f64 = 0.3;

/// Compute the next state for an endpoint and the alert it warrants, if any.
///
/// Every timestamp in the returned state is taken from `outcome.observed_at`.
pub fn apply(
    endpoint: &Endpoint,
    outcome: &Outcome,
    prior: &EndpointState,
) -> (EndpointState, Option<AlertEvent>) {
    let now = outcome.observed_at;
    let mut next = prior.clone();

    next.last_checked_at = Some(now);
    next.total_checks += 1;
    if let Some(elapsed) = outcome.response_time_ms {
        next.avg_response_time_ms = Some(match prior.avg_response_time_ms {
            Some(avg) => RESPONSE_TIME_ALPHA * elapsed + (1.0 - RESPONSE_TIME_ALPHA) * avg,
            None => elapsed,
        });
    }

    let alert = if outcome.success {
        next.consecutive_successes += 1;
        next.consecutive_failures = 0;

        match prior.status {
            Status::Up => None,
            Status::Down | Status::Unknown => {
                next.status = Status::Up;
                next.down_since = None;
                next.alert_sent = false;
                next.last_state_change = Some(now);

                prior.alert_sent.then(|| AlertEvent {
                    endpoint_url: endpoint.url.clone(),
                    kind: AlertKind::Recovered,
                    occurred_at: now,
                    detail: recovery_detail(prior, outcome),
                })
            }
        }
    } else {
        next.consecutive_failures += 1;
        next.consecutive_successes = 0;
        next.total_failures += 1;
        next.last_error = Some(outcome.detail());

        match prior.status {
            // Still inside the same incident
            Status::Down => None,
            Status::Up | Status::Unknown => {
                next.status = Status::Down;
                next.down_since = Some(now);
                next.alert_sent = true;
                next.last_state_change = Some(now);

                Some(AlertEvent {
                    endpoint_url: endpoint.url.clone(),
                    kind: AlertKind::Down,
                    occurred_at: now,
                    detail: outcome.detail(),
                })
            }
        }
    };

    (next, alert)
}

fn recovery_detail(prior: &EndpointState, outcome: &Outcome) -> String {
    match prior.down_since {
        Some(since) => {
            let downtime = outcome.observed_at - since;
            format!(
                "{} after {}s of downtime",
                outcome.detail(),
                downtime.num_seconds().max(0)
            )
        }
        None => outcome.detail(),
    }
}
