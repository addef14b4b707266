//! ClickHouse HTTP interface constants

/// Read timeout appended to every transport URL
pub const DEFAULT_READ_TIMEOUT: &str = "200s";

/// Write timeout appended to every transport URL
pub const DEFAULT_WRITE_TIMEOUT: &str = "30s";

/// Output format requested for every query (one JSON array per row)
pub const OUTPUT_FORMAT: &str = "JSONCompactEachRow";

/// Liveness endpoint, relative to the server root
pub const PING_PATH: &str = "ping";

/// Body returned by a healthy server on `/ping`
pub const PING_OK: &str = "Ok.";

/// Transport URL parameters consumed by the driver instead of being forwarded
pub mod driver_params {
    /// Idle timeout between body reads
    pub const READ_TIMEOUT: &str = "read_timeout";

    /// Bound on sending the request
    pub const WRITE_TIMEOUT: &str = "write_timeout";

    /// Scheme hint (already applied during normalization)
    pub const PROTOCOL: &str = "protocol";
}

/// HTTP query parameters understood by ClickHouse
pub mod params {
    /// Target database
    pub const DATABASE: &str = "database";

    /// Format applied when the statement has no FORMAT clause
    pub const DEFAULT_FORMAT: &str = "default_format";

    /// Prefix of a bound query parameter (`param_<name>`)
    pub const PARAM_PREFIX: &str = "param_";
}

/// Response headers set by ClickHouse
pub mod headers {
    /// Numeric exception code on a failed query
    pub const EXCEPTION_CODE: &str = "X-ClickHouse-Exception-Code";

    /// Query identifier assigned by the server
    pub const QUERY_ID: &str = "X-ClickHouse-Query-Id";
}

/// Settings applied to individual statements
pub mod settings {
    /// Make aggregates over an empty set return NULL instead of a default value
    pub const AGGREGATE_NULL_FOR_EMPTY: &str = "aggregate_functions_null_for_empty";
}
