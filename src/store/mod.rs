use crate::types::{
    ConcentrationStats, DecodedEvent, LiquidityKind, PoolSnapshot, WalletPosition,
    WashTradeSuspect,
};
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use eyre::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Idempotent relational sink. Re-writing a natural key must neither
/// duplicate rows nor error; for mutable rows (positions) the later write
/// wins.
#[async_trait]
pub trait Store: Send + Sync {
    async fn record_events(&self, pool: Address, events: &[DecodedEvent]) -> Result<()>;
    async fn record_snapshot(&self, snapshot: &PoolSnapshot) -> Result<()>;
    async fn record_positions(&self, pool: Address, positions: &[WalletPosition]) -> Result<()>;
    async fn record_concentration(&self, pool: Address, stats: &ConcentrationStats) -> Result<()>;
    async fn record_wash_suspects(
        &self,
        pool: Address,
        suspects: &[WashTradeSuspect],
        computed_at: DateTime<Utc>,
    ) -> Result<()>;
}

fn hex_address(address: Address) -> String {
    format!("{address:#x}")
}

fn hex_hash(hash: B256) -> String {
    format!("{hash:#x}")
}

fn decimal_string(amount: U256) -> String {
    amount.to_string()
}

fn block_time(unix_secs: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(unix_secs as i64, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn liquidity_kind_str(kind: LiquidityKind) -> &'static str {
    match kind {
        LiquidityKind::Mint => "mint",
        LiquidityKind::Burn => "burn",
        LiquidityKind::PlainTransfer => "transfer",
    }
}

/// Postgres-backed store. The schema is provisioned externally; this layer
/// only issues inserts keyed on natural uniqueness constraints.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        info!("connected to postgres");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn record_events(&self, pool: Address, events: &[DecodedEvent]) -> Result<()> {
        for event in events {
            let meta = event.meta();
            match event {
                DecodedEvent::Transfer(e) => {
                    sqlx::query(
                        "INSERT INTO transfer_events \
                         (pool_address, token_address, from_address, to_address, amount, \
                          block_number, tx_hash, log_index, block_time) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                         ON CONFLICT (tx_hash, log_index) DO NOTHING",
                    )
                    .bind(hex_address(pool))
                    .bind(hex_address(e.token))
                    .bind(hex_address(e.from))
                    .bind(hex_address(e.to))
                    .bind(decimal_string(e.amount))
                    .bind(meta.block_number as i64)
                    .bind(hex_hash(meta.tx_hash))
                    .bind(meta.log_index as i64)
                    .bind(block_time(meta.block_timestamp))
                    .execute(&self.pool)
                    .await?;
                }
                DecodedEvent::Swap(e) => {
                    sqlx::query(
                        "INSERT INTO swap_events \
                         (pool_address, sender, recipient, amount0_in, amount1_in, \
                          amount0_out, amount1_out, block_number, tx_hash, log_index, block_time) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                         ON CONFLICT (tx_hash, log_index) DO NOTHING",
                    )
                    .bind(hex_address(e.pool))
                    .bind(hex_address(e.sender))
                    .bind(hex_address(e.recipient))
                    .bind(decimal_string(e.amount0_in))
                    .bind(decimal_string(e.amount1_in))
                    .bind(decimal_string(e.amount0_out))
                    .bind(decimal_string(e.amount1_out))
                    .bind(meta.block_number as i64)
                    .bind(hex_hash(meta.tx_hash))
                    .bind(meta.log_index as i64)
                    .bind(block_time(meta.block_timestamp))
                    .execute(&self.pool)
                    .await?;
                }
                DecodedEvent::V2Liquidity(e) => {
                    sqlx::query(
                        "INSERT INTO liquidity_events \
                         (pool_address, kind, protocol, owner_address, counterparty, amount, \
                          block_number, tx_hash, log_index, block_time) \
                         VALUES ($1, $2, 'v2', $3, $4, $5, $6, $7, $8, $9) \
                         ON CONFLICT (tx_hash, log_index) DO NOTHING",
                    )
                    .bind(hex_address(e.pool))
                    .bind(liquidity_kind_str(e.kind))
                    .bind(hex_address(e.from))
                    .bind(hex_address(e.to))
                    .bind(decimal_string(e.lp_amount))
                    .bind(meta.block_number as i64)
                    .bind(hex_hash(meta.tx_hash))
                    .bind(meta.log_index as i64)
                    .bind(block_time(meta.block_timestamp))
                    .execute(&self.pool)
                    .await?;
                }
                DecodedEvent::V3Liquidity(e) => {
                    sqlx::query(
                        "INSERT INTO liquidity_events \
                         (pool_address, kind, protocol, owner_address, tick_lower, tick_upper, \
                          amount, amount0, amount1, block_number, tx_hash, log_index, block_time) \
                         VALUES ($1, $2, 'v3', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                         ON CONFLICT (tx_hash, log_index) DO NOTHING",
                    )
                    .bind(hex_address(e.pool))
                    .bind(liquidity_kind_str(e.kind))
                    .bind(hex_address(e.owner))
                    .bind(e.tick_lower)
                    .bind(e.tick_upper)
                    .bind(decimal_string(e.liquidity))
                    .bind(decimal_string(e.amount0))
                    .bind(decimal_string(e.amount1))
                    .bind(meta.block_number as i64)
                    .bind(hex_hash(meta.tx_hash))
                    .bind(meta.log_index as i64)
                    .bind(block_time(meta.block_timestamp))
                    .execute(&self.pool)
                    .await?;
                }
            }
        }
        Ok(())
    }

    async fn record_snapshot(&self, snapshot: &PoolSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO pool_snapshots \
             (pool_address, reserve0, reserve1, price, tvl_usd, snapshot_time) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (pool_address, snapshot_time) DO NOTHING",
        )
        .bind(hex_address(snapshot.pool_address))
        .bind(snapshot.reserve0)
        .bind(snapshot.reserve1)
        .bind(snapshot.price)
        .bind(snapshot.tvl_usd)
        .bind(snapshot.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_positions(&self, pool: Address, positions: &[WalletPosition]) -> Result<()> {
        for position in positions {
            sqlx::query(
                "INSERT INTO wallet_positions \
                 (pool_address, wallet, base_balance, quote_balance, total_cost_usd, \
                  total_revenue_usd, realized_pnl_usd, unrealized_pnl_usd, trade_count, \
                  win_count, win_rate, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now()) \
                 ON CONFLICT (pool_address, wallet) DO UPDATE SET \
                  base_balance = EXCLUDED.base_balance, \
                  quote_balance = EXCLUDED.quote_balance, \
                  total_cost_usd = EXCLUDED.total_cost_usd, \
                  total_revenue_usd = EXCLUDED.total_revenue_usd, \
                  realized_pnl_usd = EXCLUDED.realized_pnl_usd, \
                  unrealized_pnl_usd = EXCLUDED.unrealized_pnl_usd, \
                  trade_count = EXCLUDED.trade_count, \
                  win_count = EXCLUDED.win_count, \
                  win_rate = EXCLUDED.win_rate, \
                  updated_at = now()",
            )
            .bind(hex_address(pool))
            .bind(hex_address(position.wallet))
            .bind(position.base_balance)
            .bind(position.quote_balance)
            .bind(position.total_cost_usd)
            .bind(position.total_revenue_usd)
            .bind(position.realized_pnl_usd())
            .bind(position.unrealized_pnl_usd)
            .bind(position.trade_count as i64)
            .bind(position.win_count as i64)
            .bind(position.win_rate())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn record_concentration(&self, pool: Address, stats: &ConcentrationStats) -> Result<()> {
        sqlx::query(
            "INSERT INTO concentration_stats \
             (pool_address, top10_pct, top25_pct, top50_pct, top100_pct, gini, computed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (pool_address, computed_at) DO NOTHING",
        )
        .bind(hex_address(pool))
        .bind(stats.top10_pct)
        .bind(stats.top25_pct)
        .bind(stats.top50_pct)
        .bind(stats.top100_pct)
        .bind(stats.gini_coefficient)
        .bind(stats.computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_wash_suspects(
        &self,
        pool: Address,
        suspects: &[WashTradeSuspect],
        computed_at: DateTime<Utc>,
    ) -> Result<()> {
        for suspect in suspects {
            let related: Vec<String> = suspect
                .related_wallets
                .iter()
                .map(|w| hex_address(*w))
                .collect();
            sqlx::query(
                "INSERT INTO wash_trade_suspects \
                 (pool_address, wallet, related_wallets, suspicious_tx_count, \
                  circular_volume_usd, confidence_score, computed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (pool_address, wallet, computed_at) DO NOTHING",
            )
            .bind(hex_address(pool))
            .bind(hex_address(suspect.wallet))
            .bind(related)
            .bind(suspect.suspicious_tx_count as i64)
            .bind(suspect.circular_volume_usd)
            .bind(suspect.confidence_score as i32)
            .bind(computed_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}
