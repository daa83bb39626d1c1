use crate::metrics::WashConfig;
use crate::types::{Protocol, TokenInfo, TrackedPool};
use eyre::Result;
use std::fs;
use std::time::Duration;

/// Format of each token entry in pools.json.
#[derive(serde::Deserialize)]
struct TokenEntry {
    address: String,
    symbol: String,
    decimals: u8,
}

/// Format of each pool entry in pools.json (camelCase).
#[derive(serde::Deserialize)]
struct PoolEntry {
    address: String,
    protocol: String,
    token0: TokenEntry,
    token1: TokenEntry,
    #[serde(rename = "lpToken")]
    lp_token: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Format of monitor section in pools.json (camelCase).
#[derive(serde::Deserialize)]
struct MonitorEntry {
    #[serde(rename = "pollIntervalSecs")]
    poll_interval_secs: u64,
    #[serde(rename = "lookbackBlocks")]
    lookback_blocks: u64,
    #[serde(rename = "washWindowHours", default = "default_wash_window_hours")]
    wash_window_hours: u64,
}

fn default_wash_window_hours() -> u64 {
    24
}

/// Root format of pools.json: { "pools": [...], "monitor": {...} }
#[derive(serde::Deserialize)]
struct PoolsFile {
    pools: Vec<PoolEntry>,
    monitor: MonitorEntry,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub pools: Vec<TrackedPool>,
    pub poll_interval: Duration,
    pub lookback_blocks: u64,
    pub wash: WashConfig,
}

fn parse_token(entry: &TokenEntry) -> Result<TokenInfo> {
    Ok(TokenInfo {
        address: entry.address.parse()?,
        symbol: entry.symbol.clone(),
        decimals: entry.decimals,
    })
}

fn parse_pool(entry: &PoolEntry) -> Result<TrackedPool> {
    let protocol = match entry.protocol.as_str() {
        "UniswapV2" => Protocol::UniswapV2,
        "UniswapV3" => Protocol::UniswapV3,
        other => return Err(eyre::eyre!("unknown protocol {other:?}")),
    };
    let lp_token = match &entry.lp_token {
        Some(raw) => Some(raw.parse()?),
        None => None,
    };
    Ok(TrackedPool {
        address: entry.address.parse()?,
        protocol,
        token0: parse_token(&entry.token0)?,
        token1: parse_token(&entry.token1)?,
        lp_token,
    })
}

pub fn parse_pools_json(content: &str) -> Result<MonitorConfig> {
    let file: PoolsFile = serde_json::from_str(content)?;

    let mut pools = Vec::new();
    for entry in &file.pools {
        if !entry.enabled {
            continue;
        }
        match parse_pool(entry) {
            Ok(pool) => pools.push(pool),
            Err(e) => {
                tracing::warn!("skipping pool entry {}: {e}", entry.address);
            }
        }
    }

    let wash = WashConfig {
        window_secs: file.monitor.wash_window_hours * 60 * 60,
        ..WashConfig::default()
    };

    Ok(MonitorConfig {
        pools,
        poll_interval: Duration::from_secs(file.monitor.poll_interval_secs),
        lookback_blocks: file.monitor.lookback_blocks,
        wash,
    })
}

/// Load pools.json. Expects format: { "pools": [ { address, protocol,
/// token0, token1, lpToken?, enabled? } ], "monitor": { pollIntervalSecs,
/// lookbackBlocks, washWindowHours? } }. Disabled or unparseable entries
/// are skipped.
pub fn load_pools_file(path: &str) -> Result<MonitorConfig> {
    let content = fs::read_to_string(path)?;
    parse_pools_json(&content)
}
