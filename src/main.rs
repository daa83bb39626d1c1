use dex_pool_monitor::config;
use dex_pool_monitor::driver::PoolMonitor;
use dex_pool_monitor::oracle::HttpPriceOracle;
use dex_pool_monitor::source::RpcClient;
use dex_pool_monitor::store::PgStore;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn env_var(key: &str) -> eyre::Result<String> {
    std::env::var(key).map_err(|_| eyre::eyre!("{key} must be set"))
}

fn config_path(env_key: &str, default: &str) -> std::path::PathBuf {
    std::env::var(env_key)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap().join(default))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    dotenv().ok();

    let rpc_url = env_var("RPC_URL")?;
    let database_url = env_var("DATABASE_URL")?;
    let price_api_url = env_var("PRICE_API_URL")?;

    let pools_path = config_path("POOLS_JSON", "pools.json");
    let monitor_config = config::load_pools_file(pools_path.to_str().unwrap())?;
    if monitor_config.pools.is_empty() {
        eyre::bail!("no enabled pools in {}", pools_path.display());
    }

    info!("Initializing DEX pool monitor for {} pools...", monitor_config.pools.len());

    let chain = Arc::new(RpcClient::connect(&rpc_url)?);
    let store = Arc::new(PgStore::connect(&database_url).await?);
    let oracle = Arc::new(HttpPriceOracle::new(price_api_url));

    for pool in monitor_config.pools {
        let monitor = PoolMonitor::new(
            pool,
            chain.clone(),
            chain.clone(),
            oracle.clone(),
            store.clone(),
            monitor_config.wash.clone(),
            monitor_config.lookback_blocks,
        );
        tokio::spawn(monitor.run(monitor_config.poll_interval));
    }

    // Keep the main thread alive
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    Ok(())
}
