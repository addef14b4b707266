//! Connection string parsing
//!
//! Supports formats:
//! * clickhouse+https://[user[:password]@]host[:port][/database][?params]
//! * clickhouse+http://[user[:password]@]host[:port][/database][?params]
//!   (upgraded to https when the string carries `:443` or `protocol=https`)
//! * a literal http(s):// transport URL (passed through)
//!
//! Normalization is a pure string rewrite; [`TransportInfo::parse`] then splits the
//! resulting URL into what the HTTP driver needs.

use crate::protocol::constants::{driver_params, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
use crate::{Error, Result};
use reqwest::Url;
use std::time::Duration;

/// Prefix selecting secure transport over the custom scheme
pub const SECURE_MARKER: &str = "clickhouse+https://";

/// Prefix selecting plain transport over the custom scheme
pub const INSECURE_MARKER: &str = "clickhouse+http://";

/// Transport scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
}

impl Scheme {
    /// Detect the scheme of a literal URL
    pub fn of_url(url: &str) -> Option<Self> {
        if url.starts_with("https://") {
            Some(Scheme::Https)
        } else if url.starts_with("http://") {
            Some(Scheme::Http)
        } else {
            None
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Scheme::Http => "http://",
            Scheme::Https => "https://",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Result of DSN normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDsn {
    /// Scheme of the resulting URL, `None` for an unrecognized passthrough
    pub scheme: Option<Scheme>,
    /// Transport URL with the timeout parameters appended
    pub url: String,
}

/// Normalize a user-facing DSN into the transport URL the driver expects
///
/// Never fails. The exact `read_timeout=200s` and `write_timeout=30s` pairs are
/// always present in the result: each is appended unless that pair is already in
/// the query string, so normalizing an already-normalized URL is a no-op. A
/// user-supplied value for the same key stays in place ahead of it.
///
/// # Examples
///
/// ```
/// use clickhouse_connector::client::connection_string::{normalize_dsn, Scheme};
///
/// let dsn = normalize_dsn("clickhouse+http://u:p@ch.example.com:443/db");
/// assert_eq!(dsn.scheme, Some(Scheme::Https));
/// assert_eq!(
///     dsn.url,
///     "https://u:p@ch.example.com:443/db?read_timeout=200s&write_timeout=30s"
/// );
/// ```
pub fn normalize_dsn(raw: &str) -> NormalizedDsn {
    let (scheme, url) = if let Some(rest) = raw.strip_prefix(SECURE_MARKER) {
        (Some(Scheme::Https), format!("{}{}", Scheme::Https.prefix(), rest))
    } else if let Some(rest) = raw.strip_prefix(INSECURE_MARKER) {
        // Secondary signals are checked against the original string
        let scheme = if has_secure_signal(raw) {
            Scheme::Https
        } else {
            Scheme::Http
        };
        (Some(scheme), format!("{}{}", scheme.prefix(), rest))
    } else {
        (Scheme::of_url(raw), raw.to_string())
    };

    NormalizedDsn {
        scheme,
        url: append_timeouts(url),
    }
}

/// Port 443 or an explicit `protocol=https` parameter
fn has_secure_signal(dsn: &str) -> bool {
    dsn.contains(":443") || dsn.contains("protocol=https")
}

fn append_timeouts(mut url: String) -> String {
    let query = url.find('?').map(|pos| url[pos..].to_string());
    let query_ref = query.as_deref().unwrap_or("");

    let missing: Vec<String> = [
        (driver_params::READ_TIMEOUT, DEFAULT_READ_TIMEOUT),
        (driver_params::WRITE_TIMEOUT, DEFAULT_WRITE_TIMEOUT),
    ]
    .iter()
    .filter(|(key, value)| !has_query_pair(query_ref, key, value))
    .map(|(key, value)| format!("{}={}", key, value))
    .collect();

    if missing.is_empty() {
        return url;
    }

    if query.is_none() {
        url.push('?');
    } else if !url.ends_with('?') && !url.ends_with('&') {
        url.push('&');
    }
    url.push_str(&missing.join("&"));
    url
}

/// Whether the query string contains the exact `key=value` pair
fn has_query_pair(query_string: &str, key: &str, value: &str) -> bool {
    // Remove leading '?' if present
    let query = query_string.trim_start_matches('?');

    query
        .split('&')
        .any(|pair| pair.split_once('=').unwrap_or((pair, "")) == (key, value))
}

/// Everything the HTTP driver needs, split out of a transport URL
#[derive(Debug, Clone)]
pub struct TransportInfo {
    /// Server root (`scheme://host:port/`), without credentials or query
    pub endpoint: Url,
    /// Username
    pub user: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Database from the URL path
    pub database: Option<String>,
    /// Idle timeout between body reads
    pub read_timeout: Duration,
    /// Bound on sending a request until response headers arrive
    pub write_timeout: Duration,
    /// Remaining query parameters, forwarded to ClickHouse as settings
    pub settings: Vec<(String, String)>,
}

impl TransportInfo {
    /// Parse a normalized transport URL
    ///
    /// Fails with [`Error::DriverOpen`] when the URL is malformed, uses a scheme
    /// other than http/https, has no host, or carries an unparseable timeout.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::DriverOpen(format!("invalid transport URL: {}", e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::DriverOpen(format!(
                "unsupported transport scheme '{}': expected http or https",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::DriverOpen("transport URL has no host".into()))?;

        let mut endpoint = Url::parse(&format!("{}://{}/", parsed.scheme(), host))
            .map_err(|e| Error::DriverOpen(format!("invalid transport URL: {}", e)))?;
        endpoint
            .set_port(parsed.port())
            .map_err(|_| Error::DriverOpen("cannot set port on transport URL".into()))?;

        let user = Some(decode_credential(parsed.username(), "user")?).filter(|u| !u.is_empty());
        let password = parsed
            .password()
            .map(|p| decode_credential(p, "password"))
            .transpose()?;

        let database = Some(parsed.path().trim_matches('/').to_string()).filter(|d| !d.is_empty());

        let mut read_timeout = None;
        let mut write_timeout = None;
        let mut settings = Vec::new();
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                // First occurrence wins
                driver_params::READ_TIMEOUT => {
                    if read_timeout.is_none() {
                        read_timeout = Some(parse_duration(&value)?);
                    }
                }
                driver_params::WRITE_TIMEOUT => {
                    if write_timeout.is_none() {
                        write_timeout = Some(parse_duration(&value)?);
                    }
                }
                driver_params::PROTOCOL => {}
                _ => settings.push((key.into_owned(), value.into_owned())),
            }
        }

        Ok(Self {
            endpoint,
            user,
            password,
            database,
            read_timeout: match read_timeout {
                Some(t) => t,
                None => parse_duration(DEFAULT_READ_TIMEOUT)?,
            },
            write_timeout: match write_timeout {
                Some(t) => t,
                None => parse_duration(DEFAULT_WRITE_TIMEOUT)?,
            },
            settings,
        })
    }

    /// Transport scheme
    pub fn scheme(&self) -> Scheme {
        if self.endpoint.scheme() == "https" {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }

    /// Host name (for logging)
    pub fn host(&self) -> &str {
        self.endpoint.host_str().unwrap_or_default()
    }
}

/// Parse a driver duration such as `200s`, `500ms`, `2m`, `1h` or bare seconds
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| Error::DriverOpen(format!("invalid duration '{}'", s)))?;

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| Error::DriverOpen(format!("duration '{}' out of range", s)))
    };

    match unit {
        "" | "s" => secs(1),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => secs(60),
        "h" => secs(3600),
        other => Err(Error::DriverOpen(format!(
            "invalid duration unit '{}' in '{}': expected ms, s, m, or h",
            other, s
        ))),
    }
}

/// Percent-decode a userinfo component; invalid UTF-8 is rejected
fn decode_credential(raw: &str, field: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| Error::DriverOpen(format!("invalid percent-encoding in {}: {}", field, e)))
}
