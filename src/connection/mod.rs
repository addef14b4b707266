//! Connection management
//!
//! This module handles:
//! * Pool policy (open/idle limits, connection max lifetime)
//! * Connection lifecycle (normalize, open, liveness check, stop)
//! * State machine enforcement

mod conn;
mod pool;
mod state;

pub use conn::{Connection, ConnectionConfig, ConnectionConfigBuilder, DSN_ENV_VAR};
pub use pool::{
    Pool, PoolConfig, PoolConfigBuilder, PoolStats, DEFAULT_MAX_IDLE, DEFAULT_MAX_LIFETIME,
    DEFAULT_MAX_OPEN, DEFAULT_PING_TIMEOUT,
};
pub use state::ConnectionState;
