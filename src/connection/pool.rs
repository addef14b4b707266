//! Pooled HTTP handle
//!
//! The HTTP client keeps its own keep-alive connections; this wrapper adds the
//! policy on top of it:
//! * at most `max_open` requests/streams in flight (semaphore permits)
//! * at most `max_idle` idle keep-alive connections per host
//! * connections are never reused past `max_lifetime`: the client is rebuilt and
//!   the old one is dropped once its in-flight requests finish

use crate::client::connection_string::TransportInfo;
use crate::protocol::constants::{headers, params, OUTPUT_FORMAT, PING_OK, PING_PATH};
use crate::protocol::{decode, BoundStatement};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default maximum number of open connections
pub const DEFAULT_MAX_OPEN: usize = 10;

/// Default maximum number of idle connections
pub const DEFAULT_MAX_IDLE: usize = 5;

/// Default connection max lifetime (1 hour)
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Default bound on the startup liveness check
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool policy
///
/// # Defaults
///
/// - `max_open`: 10
/// - `max_idle`: 5
/// - `max_lifetime`: 1 hour
/// - `ping_timeout`: 10 seconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum concurrent in-flight queries
    pub max_open: usize,
    /// Maximum idle keep-alive connections (clamped to `max_open`)
    pub max_idle: usize,
    /// Connections are not reused after this age
    pub max_lifetime: Duration,
    /// Bound on the startup liveness check
    pub ping_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: DEFAULT_MAX_OPEN,
            max_idle: DEFAULT_MAX_IDLE,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Create a builder starting from the defaults
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder {
            config: Self::default(),
        }
    }

    /// Idle limit actually applied
    pub fn effective_max_idle(&self) -> usize {
        self.max_idle.min(self.max_open)
    }

    /// Reject policies the pool cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_open == 0 {
            return Err(Error::Config("max_open must be at least 1".into()));
        }
        if self.max_lifetime.is_zero() {
            return Err(Error::Config("max_lifetime must be non-zero".into()));
        }
        if self.ping_timeout.is_zero() {
            return Err(Error::Config("ping_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`PoolConfig`]
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Set maximum open connections
    pub fn max_open(mut self, n: usize) -> Self {
        self.config.max_open = n;
        self
    }

    /// Set maximum idle connections
    pub fn max_idle(mut self, n: usize) -> Self {
        self.config.max_idle = n;
        self
    }

    /// Set connection max lifetime
    pub fn max_lifetime(mut self, duration: Duration) -> Self {
        self.config.max_lifetime = duration;
        self
    }

    /// Set the liveness check timeout
    pub fn ping_timeout(mut self, duration: Duration) -> Self {
        self.config.ping_timeout = duration;
        self
    }

    /// Build the configuration
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// Point-in-time pool usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured open limit
    pub max_open: usize,
    /// Permits currently held by requests or streams
    pub in_use: usize,
    /// Number of times the client was rebuilt after `max_lifetime`
    pub generation: u64,
}

struct Generation {
    client: reqwest::Client,
    created: Instant,
    id: u64,
}

/// Shared pooled handle
pub struct Pool {
    info: TransportInfo,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    current: Mutex<Generation>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("endpoint", &self.info.endpoint.as_str())
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl Pool {
    /// Build the HTTP client; no network I/O happens here
    pub fn open(info: TransportInfo, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(&info, &config)?;

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_open)),
            current: Mutex::new(Generation {
                client,
                created: Instant::now(),
                id: 0,
            }),
            closed: AtomicBool::new(false),
            info,
            config,
        })
    }

    /// Transport details this pool was opened with
    pub fn info(&self) -> &TransportInfo {
        &self.info
    }

    /// Pool policy
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current usage
    pub fn stats(&self) -> PoolStats {
        let generation = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .id;
        PoolStats {
            max_open: self.config.max_open,
            in_use: self
                .config
                .max_open
                .saturating_sub(self.permits.available_permits()),
            generation,
        }
    }

    /// Wait for a free slot
    async fn acquire(&self) -> Result<(reqwest::Client, OwnedSemaphorePermit)> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let wait_start = Instant::now();
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        crate::metrics::histograms::pool_wait(wait_start.elapsed().as_millis() as u64);

        Ok((self.client()?, permit))
    }

    /// Current client, rebuilt if it outlived `max_lifetime`
    fn client(&self) -> Result<reqwest::Client> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if current.created.elapsed() >= self.config.max_lifetime {
            let client = build_client(&self.info, &self.config)?;
            *current = Generation {
                client,
                created: Instant::now(),
                id: current.id + 1,
            };
            crate::metrics::counters::pool_recycled();
            tracing::debug!(
                generation = current.id,
                "recycled HTTP connections after max lifetime"
            );
        }

        Ok(current.client.clone())
    }

    /// Liveness check against `/ping`
    pub async fn ping(&self) -> Result<()> {
        let (client, _permit) = self.acquire().await?;
        let url = self
            .info
            .endpoint
            .join(PING_PATH)
            .map_err(|e| Error::DriverOpen(format!("invalid ping URL: {}", e)))?;

        let response = client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Server {
                code: None,
                message: format!("ping returned {}: {}", status, body.trim()),
            });
        }
        if body.trim() != PING_OK {
            return Err(Error::Protocol(format!(
                "unexpected ping response: {:?}",
                body.trim()
            )));
        }
        Ok(())
    }

    /// Send a bound statement and wait for response headers
    ///
    /// The returned permit must be held until the body has been consumed.
    pub async fn send(
        &self,
        statement: &BoundStatement,
        settings: &[(String, String)],
    ) -> Result<(reqwest::Response, OwnedSemaphorePermit)> {
        let (client, permit) = self.acquire().await?;
        let request = self.request(&client, statement, settings);

        let write_timeout = self.info.write_timeout;
        let response = tokio::time::timeout(write_timeout, request.send())
            .await
            .map_err(|_| Error::Timeout(write_timeout))??;

        if !response.status().is_success() {
            return Err(server_error(response).await);
        }

        if let Some(query_id) = response.headers().get(headers::QUERY_ID) {
            tracing::trace!(query_id = ?query_id, "query accepted");
        }

        Ok((response, permit))
    }

    fn request(
        &self,
        client: &reqwest::Client,
        statement: &BoundStatement,
        settings: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        let mut url = self.info.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(database) = &self.info.database {
                query.append_pair(params::DATABASE, database);
            }
            for (key, value) in self.info.settings.iter().chain(settings) {
                query.append_pair(key, value);
            }
            query.append_pair(params::DEFAULT_FORMAT, OUTPUT_FORMAT);
            for (name, value) in &statement.params {
                query.append_pair(&format!("{}{}", params::PARAM_PREFIX, name), value);
            }
        }

        let mut request = client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(statement.sql.clone());

        if let Some(user) = &self.info.user {
            request = request.basic_auth(user, self.info.password.as_ref());
        }
        request
    }

    /// Stop handing out slots
    ///
    /// Streams already holding a permit finish normally; the HTTP client is
    /// released when the last of them is dropped.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::ConnectionClosed);
        }
        self.permits.close();
        Ok(())
    }
}

fn build_client(info: &TransportInfo, config: &PoolConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(config.effective_max_idle())
        .pool_idle_timeout(config.max_lifetime)
        .read_timeout(info.read_timeout)
        .build()
        .map_err(|e| Error::DriverOpen(format!("failed to build HTTP client: {}", e)))
}

async fn server_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let code = response
        .headers()
        .get(headers::EXCEPTION_CODE)
        .and_then(|v| v.to_str().ok())
        .and_then(decode::parse_exception_code);

    match response.text().await {
        Ok(body) => {
            let body = body.trim();
            Error::Server {
                code: code
                    .or_else(|| decode::parse_exception(body.as_bytes()).and_then(|(c, _)| c)),
                message: if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                },
            }
        }
        Err(e) => Error::Http(e),
    }
}
