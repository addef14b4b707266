//! Metric names and label values

/// Queries sent to the server
pub const QUERIES_STARTED: &str = "clickhouse_connector_queries_started_total";

/// Queries finished, labelled by status
pub const QUERIES_COMPLETED: &str = "clickhouse_connector_queries_completed_total";

/// Rows handed to callers
pub const ROWS_PROCESSED: &str = "clickhouse_connector_rows_processed_total";

/// Rows that failed to decode
pub const ROW_DECODE_ERRORS: &str = "clickhouse_connector_row_decode_errors_total";

/// Failed liveness checks
pub const PING_FAILURES: &str = "clickhouse_connector_ping_failures_total";

/// HTTP clients replaced after reaching their max lifetime
pub const POOL_RECYCLES: &str = "clickhouse_connector_pool_recycles_total";

/// Full query duration (ms)
pub const QUERY_DURATION: &str = "clickhouse_connector_query_duration_ms";

/// Time until response headers arrived (ms)
pub const TIME_TO_FIRST_BYTE: &str = "clickhouse_connector_time_to_first_byte_ms";

/// Time spent waiting for a pool permit (ms)
pub const POOL_WAIT: &str = "clickhouse_connector_pool_wait_ms";

/// Query completed normally
pub const STATUS_OK: &str = "ok";

/// Query failed
pub const STATUS_ERROR: &str = "error";

/// Query stream dropped before it was exhausted
pub const STATUS_ABANDONED: &str = "abandoned";
