//! High-level client API
//!
//! [`ExpiryClient`] is the entry point: it owns a [`Connection`](crate::connection::Connection)
//! and runs the expired-account and expired-slot scans over it.

pub mod connection_string;
mod expiry_client;
mod records;

pub use connection_string::{normalize_dsn, NormalizedDsn, Scheme, TransportInfo};
pub use expiry_client::ExpiryClient;
pub use records::{
    BlockRange, ExpiredAccount, ExpiredSlot, EXPIRED_ACCOUNTS_QUERY, EXPIRED_SLOTS_QUERY,
    MAX_BLOCK_QUERY,
};
