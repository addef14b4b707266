//! expiry-scan: log expired accounts and storage slots for a block range
//!
//! Usage: `expiry-scan [START] END`
//!
//! Reads the DSN from `CLICKHOUSE_DSN`. Without arguments the range is
//! `[0, max block)`. Log level follows `RUST_LOG` (default `info`).

use clickhouse_connector::{ConnectionConfig, ExpiryClient};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn parse_block(arg: &str) -> Result<u64, String> {
    arg.parse().map_err(|_| format!("invalid block number: {:?}", arg))
}

async fn block_range(client: &ExpiryClient, args: &[String]) -> Result<(u64, u64), BoxError> {
    match args {
        [] => Ok((0, client.get_max_block().await?)),
        [end] => Ok((0, parse_block(end)?)),
        [start, end] => Ok((parse_block(start)?, parse_block(end)?)),
        _ => Err("usage: expiry-scan [START] END".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ConnectionConfig::from_env()?;

    let lifetime = CancellationToken::new();
    let on_signal = lifetime.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling scan");
            on_signal.cancel();
        }
    });

    let mut client = ExpiryClient::new(config);
    client.start(lifetime).await?;

    let result = scan(&client, &args).await;
    client.stop()?;
    result
}

async fn scan(client: &ExpiryClient, args: &[String]) -> Result<(), BoxError> {
    let (start, end) = block_range(client, args).await?;
    tracing::info!(start, end, "scanning expired state");

    let accounts = client
        .exec_on_expired_accounts(start, end, |account| {
            tracing::info!(address = %account.address, "expired account");
            Ok::<_, std::convert::Infallible>(())
        })
        .await?;

    let slots = client
        .exec_on_expired_slots(start, end, |slot| {
            tracing::info!(address = %slot.address, slot_key = %slot.slot_key, "expired slot");
            Ok::<_, std::convert::Infallible>(())
        })
        .await?;

    tracing::info!(accounts, slots, "scan finished");
    Ok(())
}
