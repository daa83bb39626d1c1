pub mod concentration;
pub mod pnl;
pub mod wash;

use crate::types::{
    ConcentrationStats, DecodedEvent, PoolSnapshot, SwapEvent, TrackedPool, WalletPosition,
    WashTradeSuspect,
};
use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

pub use wash::WashConfig;

/// The engine has no unrecoverable internal error for well-typed input:
/// every division is guarded and short-circuits to a defined value instead
/// of raising. The taxonomy exists so callers and tests can name the guard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputationError {
    #[error("division guard triggered")]
    DivisionGuardTriggered,
}

/// A swap normalized into the engine's units: token amounts scaled by
/// decimals, value in USD, direction relative to the base (token0) side.
#[derive(Debug, Clone)]
pub struct TradeFill {
    pub wallet: Address,
    pub is_buy: bool,
    pub base_amount: f64,
    pub quote_amount: f64,
    pub value_usd: f64,
    pub timestamp: u64,
}

/// Lossy but adequate for display-scale metrics; raw integer amounts stay
/// exact in the stored events.
fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

fn scale_amount(raw: U256, decimals: u8) -> f64 {
    u256_to_f64(raw) / 10f64.powi(decimals as i32)
}

/// Scale raw reserves, derive the pool price and TVL. `price` is
/// reserve1/reserve0 guarded to zero for an empty reserve0 side, in which
/// case TVL is valued from the reserve1 leg alone. Without a token1 quote
/// the TVL is unknown, not zero.
pub fn compute_pool_snapshot(
    pool_address: Address,
    reserve0_raw: U256,
    reserve1_raw: U256,
    decimals0: u8,
    decimals1: u8,
    price1_usd: Option<f64>,
    timestamp: DateTime<Utc>,
) -> PoolSnapshot {
    let reserve0 = scale_amount(reserve0_raw, decimals0);
    let reserve1 = scale_amount(reserve1_raw, decimals1);

    let price = if reserve0 > 0.0 { reserve1 / reserve0 } else { 0.0 };

    let tvl_usd = price1_usd.map(|price1| {
        // token0 has no independent quote: derive it through the pool price.
        let price0 = price * price1;
        reserve0 * price0 + reserve1 * price1
    });

    PoolSnapshot {
        pool_address,
        reserve0,
        reserve1,
        price,
        tvl_usd,
        timestamp,
    }
}

/// Folds one pool's decoded events into running aggregates: wallet
/// positions, token-holder balances and a trailing trade window for the
/// wash-trading screen.
pub struct MetricsEngine {
    pool: TrackedPool,
    positions: pnl::PositionBook,
    holder_balances: HashMap<Address, f64>,
    trade_window: Vec<TradeFill>,
    wash_config: WashConfig,
}

impl MetricsEngine {
    pub fn new(pool: TrackedPool, wash_config: WashConfig) -> Self {
        Self {
            pool,
            positions: pnl::PositionBook::new(),
            holder_balances: HashMap::new(),
            trade_window: Vec::new(),
            wash_config,
        }
    }

    /// Turn a swap into a fill from the recipient wallet's perspective.
    /// Router-aggregated swaps can carry both legs, so direction comes from
    /// the net base-token flow; a swap with no net flow produces nothing.
    fn fill_from_swap(&self, swap: &SwapEvent, quote_price_usd: f64) -> Option<TradeFill> {
        let d0 = self.pool.token0.decimals;
        let d1 = self.pool.token1.decimals;
        let net_base = scale_amount(swap.amount0_out, d0) - scale_amount(swap.amount0_in, d0);
        let net_quote = scale_amount(swap.amount1_out, d1) - scale_amount(swap.amount1_in, d1);
        if net_base == 0.0 {
            return None;
        }

        let wallet = if swap.recipient != Address::ZERO {
            swap.recipient
        } else {
            swap.sender
        };

        let quote_amount = net_quote.abs();
        Some(TradeFill {
            wallet,
            is_buy: net_base > 0.0,
            base_amount: net_base.abs(),
            quote_amount,
            value_usd: quote_amount * quote_price_usd,
            timestamp: swap.meta.block_timestamp,
        })
    }

    /// Fold swaps into wallet positions and the wash window. Only called on
    /// priced cycles; the ordered swap history in the store makes the
    /// positions recomputable for any cycle this skips.
    pub fn fold_swaps(&mut self, events: &[DecodedEvent], quote_price_usd: f64) {
        for event in events {
            let DecodedEvent::Swap(swap) = event else {
                continue;
            };
            let Some(fill) = self.fill_from_swap(swap, quote_price_usd) else {
                debug!(pool = %self.pool.address, tx = %swap.meta.tx_hash, "swap with no net base flow");
                continue;
            };
            self.positions.fold(&fill);
            self.trade_window.push(fill);
        }
    }

    /// Fold base-token transfers into the holder balance map. Mint and burn
    /// legs touch only their non-zero side; balances never go below zero,
    /// which absorbs transfers predating the monitor's history.
    pub fn fold_transfers(&mut self, events: &[DecodedEvent]) {
        for event in events {
            let DecodedEvent::Transfer(transfer) = event else {
                continue;
            };
            if transfer.token != self.pool.token0.address {
                continue;
            }
            let amount = scale_amount(transfer.amount, self.pool.token0.decimals);
            if transfer.from != Address::ZERO {
                let balance = self.holder_balances.entry(transfer.from).or_insert(0.0);
                *balance = (*balance - amount).max(0.0);
            }
            if transfer.to != Address::ZERO {
                *self.holder_balances.entry(transfer.to).or_insert(0.0) += amount;
            }
        }
    }

    pub fn mark_positions(&mut self, base_price_usd: Option<f64>, quote_price_usd: Option<f64>) {
        self.positions.mark(base_price_usd, quote_price_usd);
    }

    pub fn positions(&self) -> Vec<WalletPosition> {
        self.positions.all()
    }

    pub fn concentration(&self, computed_at: DateTime<Utc>) -> ConcentrationStats {
        let balances: Vec<f64> = self
            .holder_balances
            .values()
            .copied()
            .filter(|balance| *balance > 0.0)
            .collect();
        concentration::concentration_stats(&balances, computed_at)
    }

    /// Drop fills older than the trailing window, then rerun the screen over
    /// what remains. Suspects carry no state between cycles.
    pub fn wash_suspects(&mut self, now_ts: u64) -> Vec<WashTradeSuspect> {
        let cutoff = now_ts.saturating_sub(self.wash_config.window_secs);
        self.trade_window.retain(|fill| fill.timestamp >= cutoff);
        wash::detect_wash_trades(&self.trade_window, &self.wash_config)
    }
}
