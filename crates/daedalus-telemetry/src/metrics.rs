//! Pipeline metrics.
//!
//! Metrics are emitted through the `metrics` facade. No recorder is
//! installed here; without one every call is a no-op.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `daedalus_actions_invoked_total` | Counter | `action`, `status` | Completed invocations |
//! | `daedalus_action_duration_seconds` | Histogram | `action` | Invocation latency |
//! | `daedalus_actions_in_flight` | Gauge | - | Invocations in progress |
//! | `daedalus_filter_short_circuits_total` | Counter | `stage` | Filters that set a result |
//! | `daedalus_model_binding_failures_total` | Counter | `action` | Invalid model state after binding |
//! | `daedalus_unhandled_exceptions_total` | Counter | `action` | Errors no exception filter handled |

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Completed invocations.
pub const ACTIONS_INVOKED_TOTAL: &str = "daedalus_actions_invoked_total";
/// Invocation latency.
pub const ACTION_DURATION_SECONDS: &str = "daedalus_action_duration_seconds";
/// Invocations in progress.
pub const ACTIONS_IN_FLIGHT: &str = "daedalus_actions_in_flight";
/// Filter short-circuits by stage.
pub const FILTER_SHORT_CIRCUITS_TOTAL: &str = "daedalus_filter_short_circuits_total";
/// Requests whose model state was invalid after binding.
pub const MODEL_BINDING_FAILURES_TOTAL: &str = "daedalus_model_binding_failures_total";
/// Errors that escaped every exception filter.
pub const UNHANDLED_EXCEPTIONS_TOTAL: &str = "daedalus_unhandled_exceptions_total";

/// Registers descriptions with the installed recorder.
///
/// Call after installing a recorder; calling it earlier does nothing.
pub fn describe_metrics() {
    describe_counter!(ACTIONS_INVOKED_TOTAL, "Total number of action invocations");
    describe_histogram!(ACTION_DURATION_SECONDS, "Action invocation duration in seconds");
    describe_gauge!(ACTIONS_IN_FLIGHT, "Number of action invocations in progress");
    describe_counter!(
        FILTER_SHORT_CIRCUITS_TOTAL,
        "Total filter short-circuits by pipeline stage"
    );
    describe_counter!(
        MODEL_BINDING_FAILURES_TOTAL,
        "Total requests with invalid model state after binding"
    );
    describe_counter!(
        UNHANDLED_EXCEPTIONS_TOTAL,
        "Total errors not handled by an exception filter"
    );
}

/// Records a completed invocation.
pub fn record_action_invoked(action: &str, status_code: u16, duration: Duration) {
    counter!(
        ACTIONS_INVOKED_TOTAL,
        "action" => action.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(ACTION_DURATION_SECONDS, "action" => action.to_string())
        .record(duration.as_secs_f64());
}

/// Records a filter short-circuit at `stage` (`authorization`, `resource`, ...).
pub fn record_short_circuit(stage: &'static str) {
    counter!(FILTER_SHORT_CIRCUITS_TOTAL, "stage" => stage).increment(1);
}

/// Records invalid model state after binding.
pub fn record_binding_failure(action: &str) {
    counter!(MODEL_BINDING_FAILURES_TOTAL, "action" => action.to_string()).increment(1);
}

/// Records an error that no exception filter handled.
pub fn record_unhandled_exception(action: &str) {
    counter!(UNHANDLED_EXCEPTIONS_TOTAL, "action" => action.to_string()).increment(1);
}

/// Tracks one in-flight invocation; decrements the gauge on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(ACTIONS_IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(ACTIONS_IN_FLIGHT).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_dont_panic() {
        describe_metrics();
        record_action_invoked("Orders.Create", 200, Duration::from_millis(12));
        record_short_circuit("resource");
        record_binding_failure("Orders.Create");
        record_unhandled_exception("Orders.Create");
    }

    #[test]
    fn test_in_flight_guard() {
        let guard = InFlightGuard::new();
        drop(guard);
        let _default = InFlightGuard::default();
    }
}
