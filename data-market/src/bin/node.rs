//! Data market node binary

use anyhow::Context;
use data_market::{Config, DataMarket, KeyPair};
use prometheus::{Encoder, TextEncoder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting ProLong data market node");

    // Config file as first argument, environment otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("reading DATA_MARKET_* environment")?,
    };

    let keypair = match std::env::var("DATA_MARKET_SIGNING_SEED") {
        Ok(seed) => Some(KeyPair::from_seed_hex(&seed).context("DATA_MARKET_SIGNING_SEED")?),
        Err(_) => None,
    };

    let market = DataMarket::open_with_keypair(config, keypair).await?;
    let entries = market.verify_journal().context("journal verification failed")?;

    tracing::info!(
        entries,
        listings = market.listing_count().await?,
        market_account = %market.market_account(),
        "Market ready"
    );

    tokio::signal::ctrl_c().await?;

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&market.metrics().registry().gather(), &mut buffer)?;
    tracing::info!("Final metrics:\n{}", String::from_utf8_lossy(&buffer));

    tracing::info!("Shutting down data market node");
    market.shutdown().await?;
    Ok(())
}

