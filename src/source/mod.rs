use crate::types::{Protocol, RawLog, TrackedPool};
use alloy::primitives::{Address, B256, TxKind, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::{Filter, TransactionInput, TransactionRequest};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::Result;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// The number of blocks to cover in one get_logs call.
const STEP_SIZE: u64 = 2_000;
const CALL_RETRIES: usize = 3;
const RETRY_BACKOFF_MS: [u64; CALL_RETRIES] = [250, 1_000, 4_000];

/// getReserves()
const GET_RESERVES_SELECTOR: [u8; 4] = [0x09, 0x02, 0xf1, 0xac];
/// balanceOf(address)
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Yields raw event logs for a contract and signature over a block range.
/// An empty result is valid.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
        topic0: B256,
    ) -> Result<Vec<RawLog>>;

    async fn latest_block(&self) -> Result<u64>;
}

/// Reads a pool's current raw reserves.
#[async_trait]
pub trait ReserveSource: Send + Sync {
    async fn fetch_reserves(&self, pool: &TrackedPool) -> Result<(U256, U256)>;
}

/// HTTP JSON-RPC implementation of both source traits.
pub struct RpcClient {
    provider: Arc<dyn Provider<Http<Client>>>,
}

impl RpcClient {
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let url = rpc_url.parse()?;
        let provider = ProviderBuilder::new().on_http(url);
        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    async fn get_logs_retrying(&self, filter: &Filter) -> Result<Vec<alloy::rpc::types::eth::Log>> {
        let mut last_err = None;
        for (attempt, backoff_ms) in RETRY_BACKOFF_MS.iter().enumerate() {
            match self.provider.get_logs(filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    warn!("get_logs attempt {} failed: {e}", attempt + 1);
                    last_err = Some(e);
                    sleep(Duration::from_millis(*backoff_ms)).await;
                }
            }
        }
        Err(eyre::eyre!("get_logs exhausted retries: {:?}", last_err))
    }

    async fn call_retrying(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>> {
        let tx = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(calldata.into()),
            ..Default::default()
        };
        let mut last_err = None;
        for (attempt, backoff_ms) in RETRY_BACKOFF_MS.iter().enumerate() {
            match self.provider.call(&tx).await {
                Ok(bytes) => return Ok(bytes.to_vec()),
                Err(e) => {
                    warn!("eth_call to {to:?} attempt {} failed: {e}", attempt + 1);
                    last_err = Some(e);
                    sleep(Duration::from_millis(*backoff_ms)).await;
                }
            }
        }
        Err(eyre::eyre!("eth_call exhausted retries: {:?}", last_err))
    }

    async fn erc20_balance_of(&self, token: Address, holder: Address) -> Result<U256> {
        let mut calldata = BALANCE_OF_SELECTOR.to_vec();
        calldata.extend_from_slice(&[0u8; 12]);
        calldata.extend_from_slice(holder.as_slice());
        let out = self.call_retrying(token, calldata).await?;
        if out.len() < 32 {
            return Err(eyre::eyre!(
                "balanceOf({holder:?}) on {token:?} returned {} bytes",
                out.len()
            ));
        }
        Ok(U256::from_be_slice(&out[0..32]))
    }
}

#[async_trait]
impl LogSource for RpcClient {
    async fn fetch_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
        topic0: B256,
    ) -> Result<Vec<RawLog>> {
        let mut logs = Vec::new();
        let mut chunk_start = from_block;
        while chunk_start <= to_block {
            let chunk_end = (chunk_start + STEP_SIZE - 1).min(to_block);
            let filter = Filter::new()
                .address(address)
                .event_signature(topic0)
                .from_block(chunk_start)
                .to_block(chunk_end);
            let chunk = self.get_logs_retrying(&filter).await?;
            debug!(
                "fetched {} logs for {address:?} in blocks {chunk_start}..={chunk_end}",
                chunk.len()
            );
            logs.extend(chunk.into_iter().map(RawLog::from));
            chunk_start = chunk_end + 1;
        }
        Ok(logs)
    }

    async fn latest_block(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }
}

#[async_trait]
impl ReserveSource for RpcClient {
    /// V2 pairs expose both reserves through getReserves(); V3 pools hold
    /// their inventory as plain token balances.
    async fn fetch_reserves(&self, pool: &TrackedPool) -> Result<(U256, U256)> {
        match pool.protocol {
            Protocol::UniswapV2 => {
                let out = self
                    .call_retrying(pool.address, GET_RESERVES_SELECTOR.to_vec())
                    .await?;
                if out.len() < 64 {
                    return Err(eyre::eyre!(
                        "getReserves on {:?} returned {} bytes",
                        pool.address,
                        out.len()
                    ));
                }
                Ok((
                    U256::from_be_slice(&out[0..32]),
                    U256::from_be_slice(&out[32..64]),
                ))
            }
            Protocol::UniswapV3 => {
                let reserve0 = self
                    .erc20_balance_of(pool.token0.address, pool.address)
                    .await?;
                let reserve1 = self
                    .erc20_balance_of(pool.token1.address, pool.address)
                    .await?;
                Ok((reserve0, reserve1))
            }
        }
    }
}
