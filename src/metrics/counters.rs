//! Counter helpers

use super::labels;

/// A query was sent
pub fn query_started(operation: &'static str) {
    metrics::counter!(labels::QUERIES_STARTED, "operation" => operation).increment(1);
}

/// A query finished with `status`
pub fn query_completed(operation: &'static str, status: &'static str) {
    metrics::counter!(labels::QUERIES_COMPLETED, "operation" => operation, "status" => status)
        .increment(1);
}

/// `count` rows were delivered
pub fn rows_processed(operation: &'static str, count: u64) {
    metrics::counter!(labels::ROWS_PROCESSED, "operation" => operation).increment(count);
}

/// A row failed to decode
pub fn row_decode_error(operation: &'static str) {
    metrics::counter!(labels::ROW_DECODE_ERRORS, "operation" => operation).increment(1);
}

/// The startup liveness check failed
pub fn ping_failed(reason: &'static str) {
    metrics::counter!(labels::PING_FAILURES, "reason" => reason).increment(1);
}

/// The HTTP client was replaced after its max lifetime
pub fn pool_recycled() {
    metrics::counter!(labels::POOL_RECYCLES).increment(1);
}
