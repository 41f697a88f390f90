//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Attempt outcomes and durations
//! - Rejections by reason code
//! - Wait-for-stable polling
//! - Cluster fan-out health
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `rejoin_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use rejoin_controller::metrics;
//! use std::time::Duration;
//!
//! metrics::record_rejection("db2:3306", "ErrantTransactions");
//! metrics::record_attempt_complete("db2:3306", "rejected", Duration::from_millis(120));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the final outcome of an attempt.
///
/// `outcome` is one of `online`, `allowed`, `rejected`, `timed_out` or `error`.
pub fn record_attempt_complete(instance_id: &str, outcome: &str, duration: Duration) {
    counter!(
        "rejoin_attempts_total",
        "instance_id" => instance_id.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("rejoin_attempt_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

/// Record a validation rejection by stable reason code.
pub fn record_rejection(instance_id: &str, reason_code: &str) {
    counter!(
        "rejoin_rejections_total",
        "instance_id" => instance_id.to_string(),
        "reason" => reason_code.to_string()
    )
    .increment(1);
}

/// Record an attempt that ended in an error.
pub fn record_error(instance_id: &str, error_kind: &str) {
    counter!(
        "rejoin_errors_total",
        "instance_id" => instance_id.to_string(),
        "error_type" => error_kind.to_string()
    )
    .increment(1);
}

/// Record a warning emitted to the caller.
pub fn record_warning(level: &str) {
    counter!("rejoin_warnings_total", "level" => level.to_string()).increment(1);
}

/// Record one wait-for-stable poll and the state it observed.
pub fn record_poll(instance_id: &str, observed: &str) {
    counter!(
        "rejoin_polls_total",
        "instance_id" => instance_id.to_string(),
        "observed" => observed.to_string()
    )
    .increment(1);
}

/// Record a cluster fan-out.
pub fn record_fan_out(members: usize, unreachable: usize, duration: Duration) {
    counter!("rejoin_fan_outs_total").increment(1);
    if unreachable > 0 {
        counter!("rejoin_members_unreachable_total").increment(unreachable as u64);
    }
    histogram!("rejoin_fan_out_members").record(members as f64);
    histogram!("rejoin_fan_out_duration_seconds").record(duration.as_secs_f64());
}

/// Record a member query that failed or timed out during fan-out.
pub fn record_member_query_failure(member_id: &str, operation: &str) {
    counter!(
        "rejoin_member_query_failures_total",
        "member_id" => member_id.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Gauge for attempts currently holding an instance.
pub fn set_in_flight(count: usize) {
    gauge!("rejoin_in_flight").set(count as f64);
}

/// Gauge for attempt state.
pub fn set_attempt_state(instance_id: &str, state: &str) {
    // Numeric encoding for alerting
    let value = match state {
        "Init" => 0.0,
        "Validating" => 1.0,
        "JoinRequested" => 2.0,
        "WaitStable" => 3.0,
        "Online" => 4.0,
        "TimedOut" => 5.0,
        "Rejected" => 6.0,
        _ => -1.0,
    };
    gauge!("rejoin_attempt_state", "instance_id" => instance_id.to_string()).set(value);
}
