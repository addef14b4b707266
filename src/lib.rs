//! clickhouse-connector: stream expired state entries out of ClickHouse
//!
//! The crate polls the `accounts_last_access` and `storage_last_access` tables for
//! entries whose last access block falls inside a caller-supplied range and hands
//! each decoded row to the caller.
//!
//! Layers, leaf-first:
//! * [`client::connection_string`] normalizes `clickhouse+http(s)://` DSNs into
//!   transport URLs
//! * [`connection`] owns the pooled, health-checked HTTP handle
//! * [`client::ExpiryClient`] runs the range scans and streams rows to callbacks
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> clickhouse_connector::Result<()> {
//! use clickhouse_connector::{ConnectionConfig, ExpiryClient};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ConnectionConfig::new("clickhouse+http://default:@localhost:8123/default");
//! let mut client = ExpiryClient::new(config);
//! client.start(CancellationToken::new()).await?;
//!
//! client
//!     .exec_on_expired_accounts(0, 1_000_000, |account| {
//!         println!("expired account {}", account.address);
//!         Ok::<_, std::convert::Infallible>(())
//!     })
//!     .await?;
//!
//! client.stop()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod stream;

pub use client::{BlockRange, ExpiredAccount, ExpiredSlot, ExpiryClient};
pub use connection::{ConnectionConfig, PoolConfig};
pub use error::{Error, Result};
pub use protocol::Value;
pub use stream::{Records, Row, RowStream};
