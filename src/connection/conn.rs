//! Core connection type

use super::pool::{Pool, PoolConfig, PoolStats};
use super::state::ConnectionState;
use crate::client::connection_string::{normalize_dsn, TransportInfo};
use crate::protocol::BoundStatement;
use crate::stream::RowStream;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Environment variable read by [`ConnectionConfig::from_env`]
pub const DSN_ENV_VAR: &str = "CLICKHOUSE_DSN";

/// Connection configuration
///
/// A raw DSN (any of the forms accepted by
/// [`normalize_dsn`](crate::client::connection_string::normalize_dsn)) plus the
/// pool policy. Use `ConnectionConfig::builder()` to change the pool limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Raw connection string
    pub dsn: String,
    /// Pool policy
    pub pool: PoolConfig,
}

impl ConnectionConfig {
    /// Create new configuration with the default pool policy
    ///
    /// # Defaults
    ///
    /// - `max_open`: 10
    /// - `max_idle`: 5
    /// - `max_lifetime`: 1 hour
    /// - `ping_timeout`: 10 seconds
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            pool: PoolConfig::default(),
        }
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use clickhouse_connector::ConnectionConfig;
    /// use std::time::Duration;
    ///
    /// let config = ConnectionConfig::builder("clickhouse+https://default:@db.internal:8443/default")
    ///     .max_open_connections(4)
    ///     .conn_max_lifetime(Duration::from_secs(600))
    ///     .build();
    /// assert_eq!(config.pool.max_open, 4);
    /// ```
    pub fn builder(dsn: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            dsn: dsn.into(),
            pool: PoolConfig::default(),
        }
    }

    /// Read the DSN from `CLICKHOUSE_DSN`
    pub fn from_env() -> Result<Self> {
        Self::from_env_var(DSN_ENV_VAR)
    }

    /// Read the DSN from the named environment variable
    pub fn from_env_var(name: &str) -> Result<Self> {
        match std::env::var(name) {
            Ok(dsn) if !dsn.trim().is_empty() => Ok(Self::new(dsn.trim())),
            Ok(_) => Err(Error::Config(format!("{} is empty", name))),
            Err(_) => Err(Error::Config(format!("{} is not set", name))),
        }
    }
}

/// Builder for creating `ConnectionConfig` with a custom pool policy
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    dsn: String,
    pool: PoolConfig,
}

impl ConnectionConfigBuilder {
    /// Set maximum concurrent in-flight queries
    pub fn max_open_connections(mut self, n: usize) -> Self {
        self.pool.max_open = n;
        self
    }

    /// Set maximum idle keep-alive connections
    pub fn max_idle_connections(mut self, n: usize) -> Self {
        self.pool.max_idle = n;
        self
    }

    /// Set connection max lifetime
    pub fn conn_max_lifetime(mut self, duration: Duration) -> Self {
        self.pool.max_lifetime = duration;
        self
    }

    /// Set the startup liveness check timeout
    pub fn ping_timeout(mut self, duration: Duration) -> Self {
        self.pool.ping_timeout = duration;
        self
    }

    /// Replace the whole pool policy
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            dsn: self.dsn,
            pool: self.pool,
        }
    }
}

/// ClickHouse connection manager
///
/// Owns the pooled HTTP handle from a successful [`start`](Self::start) until
/// [`stop`](Self::stop).
#[derive(Debug)]
pub struct Connection {
    config: ConnectionConfig,
    state: ConnectionState,
    pool: Option<Arc<Pool>>,
    lifetime: CancellationToken,
}

impl Connection {
    /// Create an unstarted connection
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Initial,
            pool: None,
            lifetime: CancellationToken::new(),
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Configuration this connection was created with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Pool usage, `None` before start or after stop
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(|pool| pool.stats())
    }

    /// Open the pool and verify the server is reachable
    ///
    /// `lifetime` scopes every later operation on this connection: once it is
    /// cancelled, in-flight and future queries fail with [`Error::Cancelled`].
    ///
    /// If the liveness check fails the pool is closed before
    /// [`Error::Connectivity`] is returned, and the connection goes back to
    /// [`ConnectionState::Initial`].
    pub async fn start(&mut self, lifetime: CancellationToken) -> Result<()> {
        self.state.transition(ConnectionState::Starting)?;

        match self.open(&lifetime).await {
            Ok(pool) => {
                self.state.transition(ConnectionState::Ready)?;
                self.pool = Some(Arc::new(pool));
                self.lifetime = lifetime;
                Ok(())
            }
            Err(e) => {
                self.state.transition(ConnectionState::Initial)?;
                Err(e)
            }
        }
    }

    async fn open(&self, lifetime: &CancellationToken) -> Result<Pool> {
        let normalized = normalize_dsn(&self.config.dsn);
        let info = TransportInfo::parse(&normalized.url)?;
        let span = tracing::info_span!(
            "start",
            host = %info.host(),
            scheme = %info.scheme(),
            database = info.database.as_deref().unwrap_or("default"),
        );

        async move {
            let ping_timeout = self.config.pool.ping_timeout;
            let pool = Pool::open(info, self.config.pool.clone())?;

            let checked = tokio::select! {
                biased;
                _ = lifetime.cancelled() => Err(Error::Cancelled),
                res = tokio::time::timeout(ping_timeout, pool.ping()) => {
                    res.unwrap_or(Err(Error::Timeout(ping_timeout)))
                }
            };

            if let Err(e) = checked {
                crate::metrics::counters::ping_failed(e.category());
                tracing::warn!(error = %e, "liveness check failed, closing pool");
                if let Err(close_err) = pool.close() {
                    tracing::debug!(error = %close_err, "pool already closed");
                }
                return Err(Error::Connectivity {
                    source: Box::new(e),
                });
            }

            tracing::info!(
                max_open = self.config.pool.max_open,
                max_idle = self.config.pool.effective_max_idle(),
                "connection ready"
            );
            Ok(pool)
        }
        .instrument(span)
        .await
    }

    /// Close the pool
    ///
    /// No-op if `start` was never called, failed, or `stop` already ran.
    pub fn stop(&mut self) -> Result<()> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };
        self.state.transition(ConnectionState::Closed)?;
        pool.close()?;
        tracing::info!("connection stopped");
        Ok(())
    }

    pub(crate) fn pool(&self) -> Result<&Arc<Pool>> {
        match (&self.pool, self.state) {
            (Some(pool), ConnectionState::Ready) => Ok(pool),
            (_, ConnectionState::Closed) => Err(Error::ConnectionClosed),
            (_, state) => Err(Error::InvalidState {
                expected: ConnectionState::Ready.to_string(),
                actual: state.to_string(),
            }),
        }
    }

    /// Send a statement and return its row stream
    ///
    /// Waits for a free pool slot, then for response headers; both waits end
    /// early when the lifetime token is cancelled.
    pub async fn execute(
        &self,
        operation: &'static str,
        statement: &BoundStatement,
        settings: &[(String, String)],
    ) -> Result<RowStream> {
        let pool = Arc::clone(self.pool()?);
        let lifetime = self.lifetime.clone();
        let started = Instant::now();

        async move {
            crate::metrics::counters::query_started(operation);

            let sent = tokio::select! {
                biased;
                _ = lifetime.cancelled() => Err(Error::Cancelled),
                res = pool.send(statement, settings) => res,
            };

            match sent {
                Ok((response, permit)) => {
                    crate::metrics::histograms::time_to_first_byte(
                        operation,
                        started.elapsed().as_millis() as u64,
                    );
                    tracing::debug!(status = %response.status(), "response headers received");
                    Ok(RowStream::new(operation, response, permit, lifetime, started))
                }
                Err(e) => {
                    crate::metrics::counters::query_completed(
                        operation,
                        crate::metrics::labels::STATUS_ERROR,
                    );
                    tracing::debug!(error = %e, "query failed before streaming");
                    Err(e)
                }
            }
        }
        .instrument(tracing::debug_span!("query", operation))
        .await
    }
}
