//! Histogram helpers

use super::labels;

/// Full query duration
pub fn query_duration(operation: &'static str, duration_ms: u64) {
    metrics::histogram!(labels::QUERY_DURATION, "operation" => operation)
        .record(duration_ms as f64);
}

/// Time until response headers arrived
pub fn time_to_first_byte(operation: &'static str, duration_ms: u64) {
    metrics::histogram!(labels::TIME_TO_FIRST_BYTE, "operation" => operation)
        .record(duration_ms as f64);
}

/// Time spent waiting for a pool permit
pub fn pool_wait(duration_ms: u64) {
    metrics::histogram!(labels::POOL_WAIT).record(duration_ms as f64);
}
