//! ExpiryClient implementation

use super::records::{
    BlockRange, ExpiredAccount, ExpiredSlot, EXPIRED_ACCOUNTS_QUERY, EXPIRED_SLOTS_QUERY,
    MAX_BLOCK_QUERY,
};
use crate::connection::{Connection, ConnectionConfig, ConnectionState, PoolStats};
use crate::error::CallbackError;
use crate::protocol::constants::settings;
use crate::protocol::{bind, Value};
use crate::stream::{FromRow, Records, Row, RowStream};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;

const OP_QUERY: &str = "query";
const OP_QUERY_ROW: &str = "query_row";
const OP_MAX_BLOCK: &str = "get_max_block";
const OP_EXPIRED_ACCOUNTS: &str = "exec_on_expired_accounts";
const OP_EXPIRED_SLOTS: &str = "exec_on_expired_slots";

/// Expired state scanner
///
/// Wraps a [`Connection`] and exposes the two range scans, the max block lookup
/// and a thin passthrough for arbitrary statements.
#[derive(Debug)]
pub struct ExpiryClient {
    conn: Connection,
}

impl ExpiryClient {
    /// Create an unstarted client
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Connection::new(config),
        }
    }

    /// Open the pool and run the liveness check
    ///
    /// See [`Connection::start`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example() -> clickhouse_connector::Result<()> {
    /// use clickhouse_connector::{ConnectionConfig, ExpiryClient};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// let mut client = ExpiryClient::new(ConnectionConfig::from_env()?);
    /// client.start(CancellationToken::new()).await?;
    /// println!("max block: {}", client.get_max_block().await?);
    /// client.stop()?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(&mut self, lifetime: CancellationToken) -> Result<()> {
        self.conn.start(lifetime).await
    }

    /// Close the pool; no-op when not started
    pub fn stop(&mut self) -> Result<()> {
        self.conn.stop()
    }

    /// Lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Pool usage, `None` unless started
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.conn.pool_stats()
    }

    /// Run an arbitrary statement
    ///
    /// `?` placeholders are bound, in order, to `args`.
    pub async fn query(&self, sql: &str, args: &[Value]) -> Result<RowStream> {
        let statement = bind(sql, args)?;
        self.conn.execute(OP_QUERY, &statement, &[]).await
    }

    /// First row of a statement
    ///
    /// Returns [`Error::NoRows`] if the result is empty. Remaining rows are
    /// discarded.
    pub async fn query_row(&self, sql: &str, args: &[Value]) -> Result<Row> {
        let statement = bind(sql, args)?;
        let mut rows = self.conn.execute(OP_QUERY_ROW, &statement, &[]).await?;
        let first = rows.next().await;
        rows.complete();
        match first {
            Some(row) => row,
            None => Err(Error::NoRows),
        }
    }

    /// Highest `last_access_block` in `accounts_last_access`
    ///
    /// Any failure, including an empty table, is an [`Error::Scan`];
    /// cancellation and deadline errors are returned as they are.
    pub async fn get_max_block(&self) -> Result<u64> {
        self.max_block().await.map_err(|e| match e {
            e @ (Error::Cancelled | Error::Timeout(_) | Error::Scan { .. }) => e,
            other => Error::Scan {
                operation: OP_MAX_BLOCK,
                source: Box::new(other),
            },
        })
    }

    async fn max_block(&self) -> Result<u64> {
        let statement = bind(MAX_BLOCK_QUERY, &[])?;
        let null_for_empty = [(settings::AGGREGATE_NULL_FOR_EMPTY.to_string(), "1".to_string())];
        let mut rows = self
            .conn
            .execute(OP_MAX_BLOCK, &statement, &null_for_empty)
            .await?;

        let row = rows.next().await.ok_or(Error::NoRows)??;
        row.expect_columns(1)?;
        let max: Option<u64> = row.get(0)?;

        // Drain so an exception after the aggregate row is not missed
        while let Some(extra) = rows.next().await {
            extra?;
        }

        max.ok_or_else(|| Error::Protocol("max(last_access_block) is NULL: table is empty".into()))
    }

    /// Invoke `callback` for every account last accessed in `[start_block, end_block)`
    ///
    /// Rows are delivered in the order ClickHouse returns them. Returns the number
    /// of callbacks made.
    ///
    /// # Errors
    ///
    /// * [`Error::RowDecode`] if a row cannot be decoded; no later row is delivered
    /// * [`Error::Callback`] with the first error the callback returns
    /// * [`Error::Scan`] if the query fails or the stream fails after the rows
    ///   already delivered
    /// * [`Error::Cancelled`] / [`Error::Timeout`] for context errors
    ///
    /// Side effects of callbacks made before an error are not undone.
    pub async fn exec_on_expired_accounts<F, E>(
        &self,
        start_block: u64,
        end_block: u64,
        callback: F,
    ) -> Result<u64>
    where
        F: FnMut(ExpiredAccount) -> std::result::Result<(), E>,
        E: Into<CallbackError>,
    {
        self.scan(
            OP_EXPIRED_ACCOUNTS,
            EXPIRED_ACCOUNTS_QUERY,
            BlockRange::new(start_block, end_block),
            callback,
        )
        .await
    }

    /// Invoke `callback` for every live storage slot last accessed in
    /// `[start_block, end_block)`
    ///
    /// Soft-deleted slots are excluded. Error semantics match
    /// [`exec_on_expired_accounts`](Self::exec_on_expired_accounts).
    pub async fn exec_on_expired_slots<F, E>(
        &self,
        start_block: u64,
        end_block: u64,
        callback: F,
    ) -> Result<u64>
    where
        F: FnMut(ExpiredSlot) -> std::result::Result<(), E>,
        E: Into<CallbackError>,
    {
        self.scan(
            OP_EXPIRED_SLOTS,
            EXPIRED_SLOTS_QUERY,
            BlockRange::new(start_block, end_block),
            callback,
        )
        .await
    }

    /// Expired accounts as a typed stream
    ///
    /// Errors from the stream are returned unwrapped.
    pub async fn expired_accounts(&self, range: BlockRange) -> Result<Records<ExpiredAccount>> {
        self.open_records(OP_EXPIRED_ACCOUNTS, EXPIRED_ACCOUNTS_QUERY, range)
            .await
    }

    /// Expired storage slots as a typed stream
    pub async fn expired_slots(&self, range: BlockRange) -> Result<Records<ExpiredSlot>> {
        self.open_records(OP_EXPIRED_SLOTS, EXPIRED_SLOTS_QUERY, range)
            .await
    }

    async fn open_records<T: FromRow>(
        &self,
        operation: &'static str,
        sql: &str,
        range: BlockRange,
    ) -> Result<Records<T>> {
        let statement = bind(sql, &[range.start.into(), range.end.into()])?;
        let rows = self.conn.execute(operation, &statement, &[]).await?;
        Ok(Records::new(rows))
    }

    async fn scan<T, F, E>(
        &self,
        operation: &'static str,
        sql: &str,
        range: BlockRange,
        mut callback: F,
    ) -> Result<u64>
    where
        T: FromRow,
        F: FnMut(T) -> std::result::Result<(), E>,
        E: Into<CallbackError>,
    {
        let mut records = self
            .open_records::<T>(operation, sql, range)
            .await
            .map_err(|e| e.into_scan(operation))?;

        let mut delivered = 0u64;
        while let Some(record) = records.next().await {
            let record = record.map_err(|e| e.into_scan(operation))?;
            if let Err(e) = callback(record) {
                records.abort();
                tracing::debug!(operation, delivered, "callback failed, scan stopped");
                return Err(Error::Callback(e.into()));
            }
            delivered += 1;
        }

        tracing::debug!(operation, %range, delivered, "scan complete");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_before_start_is_scan_error() {
        let client = ExpiryClient::new(ConnectionConfig::new("http://localhost:8123/"));
        let err = client
            .exec_on_expired_accounts(0, 10, |_| Ok::<_, CallbackError>(()))
            .await
            .unwrap_err();
        match err {
            Error::Scan { operation, source } => {
                assert_eq!(operation, "exec_on_expired_accounts");
                assert!(matches!(*source, Error::InvalidState { .. }));
            }
            other => panic!("expected scan error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_max_block_before_start_is_scan_error() {
        let client = ExpiryClient::new(ConnectionConfig::new("http://localhost:8123/"));
        assert!(matches!(
            client.get_max_block().await,
            Err(Error::Scan {
                operation: "get_max_block",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_query_rejects_argument_mismatch() {
        let client = ExpiryClient::new(ConnectionConfig::new("http://localhost:8123/"));
        assert!(matches!(
            client.query("SELECT ?", &[]).await,
            Err(Error::Bind(_))
        ));
    }

    #[test]
    fn test_stop_without_start() {
        let mut client = ExpiryClient::new(ConnectionConfig::new("http://localhost:8123/"));
        assert!(client.stop().is_ok());
        assert_eq!(client.state(), ConnectionState::Initial);
        assert!(client.pool_stats().is_none());
    }
}
