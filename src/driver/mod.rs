use crate::decoder::{self, TRANSFER_TOPIC, V2_SWAP_TOPIC, V3_BURN_TOPIC, V3_MINT_TOPIC};
use crate::metrics::{compute_pool_snapshot, MetricsEngine, WashConfig};
use crate::oracle::PriceOracle;
use crate::source::{LogSource, ReserveSource};
use crate::store::Store;
use crate::types::{DecodedEvent, Protocol, TrackedPool};
use alloy::primitives::{Address, B256};
use chrono::Utc;
use eyre::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Which (contract, signature) pairs a pool's poll cycle pulls logs for.
/// V2 pairs emit swaps themselves and their LP shares move as Transfers on
/// the pair contract; V3 liquidity comes from the pool's Mint/Burn events.
/// Both track base-token Transfers for holder concentration.
fn fetch_plan(pool: &TrackedPool) -> Vec<(Address, B256)> {
    let mut plan = vec![(pool.token0.address, TRANSFER_TOPIC)];
    match pool.protocol {
        Protocol::UniswapV2 => {
            plan.push((pool.address, V2_SWAP_TOPIC));
            plan.push((pool.lp_token_address(), TRANSFER_TOPIC));
        }
        Protocol::UniswapV3 => {
            plan.push((pool.address, V3_MINT_TOPIC));
            plan.push((pool.address, V3_BURN_TOPIC));
        }
    }
    plan
}

/// Runs one pool's ingest cycle on a fixed interval: fetch logs, decode,
/// persist the events, then derive and persist the cycle's metrics.
/// Cycles are independent across pools; the store is the only shared sink.
pub struct PoolMonitor {
    pool: TrackedPool,
    source: Arc<dyn LogSource>,
    reserves: Arc<dyn ReserveSource>,
    oracle: Arc<dyn PriceOracle>,
    store: Arc<dyn Store>,
    engine: MetricsEngine,
    last_block: Option<u64>,
    lookback_blocks: u64,
}

impl PoolMonitor {
    pub fn new(
        pool: TrackedPool,
        source: Arc<dyn LogSource>,
        reserves: Arc<dyn ReserveSource>,
        oracle: Arc<dyn PriceOracle>,
        store: Arc<dyn Store>,
        wash_config: WashConfig,
        lookback_blocks: u64,
    ) -> Self {
        let engine = MetricsEngine::new(pool.clone(), wash_config);
        Self {
            pool,
            source,
            reserves,
            oracle,
            store,
            engine,
            last_block: None,
            lookback_blocks,
        }
    }

    pub async fn run(mut self, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(pool = %self.pool.address, "monitor started");
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                warn!(pool = %self.pool.address, "poll cycle failed, will retry: {e}");
            }
        }
    }

    async fn decode_range(&self, from_block: u64, to_block: u64) -> Result<Vec<DecodedEvent>> {
        let fetches = fetch_plan(&self.pool)
            .into_iter()
            .map(|(address, topic0)| self.source.fetch_logs(address, from_block, to_block, topic0));
        let mut events = Vec::new();
        for fetched in join_all(fetches).await {
            let logs = fetched?;
            for raw in &logs {
                match decoder::decode_log(&self.pool, raw) {
                    Some(Ok(event)) => events.push(event),
                    Some(Err(e)) => {
                        // A malformed log is skipped, never fatal to the batch.
                        warn!(
                            pool = %self.pool.address,
                            tx = %raw.tx_hash,
                            log_index = raw.log_index,
                            "skipping undecodable log: {e}"
                        );
                    }
                    None => {}
                }
            }
        }
        events.sort_by_key(|event| event.ordering_key());
        Ok(events)
    }

    pub async fn run_cycle(&mut self) -> Result<()> {
        let latest = self.source.latest_block().await?;
        let from_block = match self.last_block {
            Some(last) => last + 1,
            None => latest.saturating_sub(self.lookback_blocks),
        };
        if from_block > latest {
            return Ok(());
        }

        let events = self.decode_range(from_block, latest).await?;
        info!(
            pool = %self.pool.address,
            from_block,
            to_block = latest,
            events = events.len(),
            "decoded poll cycle"
        );

        // Raw decoded events have independent value: persist them before
        // anything that can degrade.
        self.store.record_events(self.pool.address, &events).await?;

        let quote_price = match self.oracle.usd_price(&self.pool.token1.symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(
                    pool = %self.pool.address,
                    "no {} quote, cycle metrics degrade to unpriced: {e}",
                    self.pool.token1.symbol
                );
                None
            }
        };

        self.engine.fold_transfers(&events);
        if let Some(quote) = quote_price {
            self.engine.fold_swaps(&events, quote);
        }

        let now = Utc::now();
        let mut base_price = None;
        match self.reserves.fetch_reserves(&self.pool).await {
            Ok((reserve0, reserve1)) => {
                let snapshot = compute_pool_snapshot(
                    self.pool.address,
                    reserve0,
                    reserve1,
                    self.pool.token0.decimals,
                    self.pool.token1.decimals,
                    quote_price,
                    now,
                );
                // Derived token0 quote; undefined while reserve0 is empty.
                if snapshot.price > 0.0 {
                    base_price = quote_price.map(|quote| snapshot.price * quote);
                }
                self.store.record_snapshot(&snapshot).await?;
            }
            Err(e) => {
                warn!(pool = %self.pool.address, "reserve read failed, no snapshot this cycle: {e}");
            }
        }

        self.engine.mark_positions(base_price, quote_price);
        self.store
            .record_positions(self.pool.address, &self.engine.positions())
            .await?;
        self.store
            .record_concentration(self.pool.address, &self.engine.concentration(now))
            .await?;
        let suspects = self.engine.wash_suspects(now.timestamp() as u64);
        self.store
            .record_wash_suspects(self.pool.address, &suspects, now)
            .await?;

        self.last_block = Some(latest);
        Ok(())
    }
}
