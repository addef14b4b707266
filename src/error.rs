//! Error types

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by a row callback
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration (missing DSN, bad pool settings)
    #[error("config error: {0}")]
    Config(String),

    /// Transport URL is malformed or the HTTP driver could not be built
    #[error("failed to open driver: {0}")]
    DriverOpen(String),

    /// Liveness check failed during startup (the pool has already been released)
    #[error("failed to ping ClickHouse: {source}")]
    Connectivity {
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// A column could not be decoded into the requested type
    #[error("row decode error at column {column}: {message}")]
    RowDecode {
        /// Zero-based column index
        column: usize,
        /// What went wrong
        message: String,
    },

    /// Query execution or stream finalization failed
    #[error("{operation} failed: {source}")]
    Scan {
        /// Operation that failed
        operation: &'static str,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Placeholder/argument mismatch while binding a statement
    #[error("bind error: {0}")]
    Bind(String),

    /// HTTP transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// ClickHouse returned an exception
    #[error("ClickHouse exception{}: {message}", code_suffix(.code))]
    Server {
        /// ClickHouse error code, when reported
        code: Option<u32>,
        /// Exception text
        message: String,
    },

    /// Unexpected response shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `query_row` found no rows
    #[error("query returned no rows")]
    NoRows,

    /// Pool is closed or was never opened
    #[error("connection closed")]
    ConnectionClosed,

    /// Lifecycle call made in the wrong state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The lifetime token passed to `start` was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// A bounded operation ran past its deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Row callback returned an error
    #[error("callback failed: {0}")]
    Callback(#[source] CallbackError),
}

fn code_suffix(code: &Option<u32>) -> String {
    match code {
        Some(code) => format!(" (code {})", code),
        None => String::new(),
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for cancellation and deadline errors
    pub fn is_context_error(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Timeout(_))
    }

    /// Whether the caller may reasonably retry the whole call
    ///
    /// The connector itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::Timeout(_) | Error::Connectivity { .. } => true,
            Error::Scan { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Short label used for metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::DriverOpen(_) => "driver_open",
            Error::Connectivity { .. } => "connectivity",
            Error::RowDecode { .. } => "row_decode",
            Error::Scan { .. } => "scan",
            Error::Bind(_) => "bind",
            Error::Http(_) => "http",
            Error::Server { .. } => "server",
            Error::Protocol(_) => "protocol",
            Error::NoRows => "no_rows",
            Error::ConnectionClosed => "connection_closed",
            Error::InvalidState { .. } => "invalid_state",
            Error::Cancelled => "cancelled",
            Error::Timeout(_) => "timeout",
            Error::Callback(_) => "callback",
        }
    }

    /// Wrap as a scan failure of `operation`
    ///
    /// Context, decode and callback errors pass through untouched so callers can
    /// tell them apart from query/finalization failures.
    pub(crate) fn into_scan(self, operation: &'static str) -> Error {
        match self {
            e @ (Error::Cancelled
            | Error::Timeout(_)
            | Error::RowDecode { .. }
            | Error::Callback(_)
            | Error::Scan { .. }) => e,
            other => Error::Scan {
                operation,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_scan_wraps_transport_failures() {
        let err = Error::Protocol("truncated body".into()).into_scan("exec_on_expired_accounts");
        match err {
            Error::Scan { operation, source } => {
                assert_eq!(operation, "exec_on_expired_accounts");
                assert!(matches!(*source, Error::Protocol(_)));
            }
            other => panic!("expected scan error, got {:?}", other),
        }
    }

    #[test]
    fn test_into_scan_passes_context_and_decode_errors() {
        assert!(matches!(Error::Cancelled.into_scan("op"), Error::Cancelled));
        assert!(matches!(
            Error::Timeout(Duration::from_secs(1)).into_scan("op"),
            Error::Timeout(_)
        ));
        assert!(matches!(
            Error::RowDecode {
                column: 0,
                message: "null".into()
            }
            .into_scan("op"),
            Error::RowDecode { .. }
        ));
    }

    #[test]
    fn test_server_error_display() {
        let err = Error::Server {
            code: Some(60),
            message: "Table default.missing doesn't exist".into(),
        };
        assert_eq!(
            err.to_string(),
            "ClickHouse exception (code 60): Table default.missing doesn't exist"
        );

        let err = Error::Server {
            code: None,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "ClickHouse exception: boom");
    }

    #[test]
    fn test_context_errors() {
        assert!(Error::Cancelled.is_context_error());
        assert!(Error::Timeout(Duration::from_secs(10)).is_context_error());
        assert!(!Error::NoRows.is_context_error());
    }

    #[test]
    fn test_retryable() {
        let connectivity = Error::Connectivity {
            source: Box::new(Error::Timeout(Duration::from_secs(10))),
        };
        assert!(connectivity.is_retryable());
        assert!(!Error::Config("missing dsn".into()).is_retryable());
        assert!(!Error::RowDecode {
            column: 1,
            message: "expected string".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_category() {
        assert_eq!(Error::Cancelled.category(), "cancelled");
        assert_eq!(Error::NoRows.category(), "no_rows");
        assert_eq!(
            Error::Scan {
                operation: "get_max_block",
                source: Box::new(Error::NoRows)
            }
            .category(),
            "scan"
        );
    }
}
