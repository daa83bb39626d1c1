use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::eth::Log;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[serde(rename = "UniswapV2")]
    UniswapV2,
    #[serde(rename = "UniswapV3")]
    UniswapV3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// A pool the monitor ingests events for, as declared in pools.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPool {
    pub address: Address,
    pub protocol: Protocol,
    pub token0: TokenInfo,
    pub token1: TokenInfo,
    /// LP token contract. V2 pairs issue LP shares from the pair contract
    /// itself, so this defaults to the pool address when absent.
    pub lp_token: Option<Address>,
}

impl TrackedPool {
    pub fn lp_token_address(&self) -> Address {
        self.lp_token.unwrap_or(self.address)
    }
}

/// An undecoded event log as returned by the log source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_timestamp: u64,
}

impl From<Log> for RawLog {
    fn from(log: Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.to_vec(),
            block_number: log.block_number.unwrap_or_default(),
            tx_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            block_timestamp: log.block_timestamp.unwrap_or_default(),
        }
    }
}

/// Provenance shared by every decoded event. `(tx_hash, log_index)` is the
/// natural dedup key the store upserts on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventMeta {
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub block_timestamp: u64,
}

impl EventMeta {
    pub fn of(log: &RawLog) -> Self {
        Self {
            tx_hash: log.tx_hash,
            log_index: log.log_index,
            block_number: log.block_number,
            block_timestamp: log.block_timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferEvent {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub meta: EventMeta,
}

/// V2-style net-flow swap. Exactly one of the `_in` amounts is nonzero for a
/// direct pool trade; aggregated router calls can populate both legs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwapEvent {
    pub pool: Address,
    pub sender: Address,
    pub recipient: Address,
    pub amount0_in: U256,
    pub amount1_in: U256,
    pub amount0_out: U256,
    pub amount1_out: U256,
    pub meta: EventMeta,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LiquidityKind {
    Mint,
    Burn,
    PlainTransfer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct V2LiquidityEvent {
    pub pool: Address,
    pub kind: LiquidityKind,
    pub from: Address,
    pub to: Address,
    pub lp_amount: U256,
    pub meta: EventMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct V3LiquidityEvent {
    pub pool: Address,
    pub kind: LiquidityKind,
    pub owner: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: U256,
    pub amount0: U256,
    pub amount1: U256,
    pub meta: EventMeta,
}

/// Typed view of a raw log after signature dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DecodedEvent {
    Transfer(TransferEvent),
    Swap(SwapEvent),
    V2Liquidity(V2LiquidityEvent),
    V3Liquidity(V3LiquidityEvent),
}

impl DecodedEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            DecodedEvent::Transfer(e) => &e.meta,
            DecodedEvent::Swap(e) => &e.meta,
            DecodedEvent::V2Liquidity(e) => &e.meta,
            DecodedEvent::V3Liquidity(e) => &e.meta,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DecodedEvent::Transfer(_) => "transfer",
            DecodedEvent::Swap(_) => "swap",
            DecodedEvent::V2Liquidity(_) => "v2_liquidity",
            DecodedEvent::V3Liquidity(_) => "v3_liquidity",
        }
    }

    /// Position folding is order-dependent, so cycles sort on this key.
    pub fn ordering_key(&self) -> (u64, u64) {
        let meta = self.meta();
        (meta.block_number, meta.log_index)
    }
}

/// Append-only per-cycle view of a pool's reserves and valuation.
/// `tvl_usd` is `None` when no USD quote was available, which is distinct
/// from a pool that is genuinely worthless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool_address: Address,
    pub reserve0: f64,
    pub reserve1: f64,
    pub price: f64,
    pub tvl_usd: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Running per-wallet trade accounting for one pool. Derived state: it is
/// recomputable by replaying the stored swap history in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPosition {
    pub wallet: Address,
    pub base_balance: f64,
    pub quote_balance: f64,
    pub total_cost_usd: f64,
    pub total_revenue_usd: f64,
    pub unrealized_pnl_usd: Option<f64>,
    pub trade_count: u64,
    pub win_count: u64,
}

impl WalletPosition {
    pub fn new(wallet: Address) -> Self {
        Self {
            wallet,
            base_balance: 0.0,
            quote_balance: 0.0,
            total_cost_usd: 0.0,
            total_revenue_usd: 0.0,
            unrealized_pnl_usd: None,
            trade_count: 0,
            win_count: 0,
        }
    }

    /// Whole-history cumulative PnL, not lot-matched accounting.
    pub fn realized_pnl_usd(&self) -> f64 {
        self.total_revenue_usd - self.total_cost_usd
    }

    pub fn win_rate(&self) -> f64 {
        if self.trade_count == 0 {
            0.0
        } else {
            self.win_count as f64 / self.trade_count as f64 * 100.0
        }
    }
}

/// Holder-distribution statistics for one balance snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationStats {
    pub top10_pct: f64,
    pub top25_pct: f64,
    pub top50_pct: f64,
    pub top100_pct: f64,
    pub gini_coefficient: f64,
    pub computed_at: DateTime<Utc>,
}

/// A lead for manual review, not a verdict. Recomputed from the trailing
/// trade window each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WashTradeSuspect {
    pub wallet: Address,
    pub related_wallets: HashSet<Address>,
    pub suspicious_tx_count: u64,
    pub circular_volume_usd: f64,
    pub confidence_score: u32,
}
