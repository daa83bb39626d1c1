use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// A failed lookup is distinct from a legitimately zero price: callers
/// degrade their metrics to "unpriced" on error instead of treating the
/// asset as worthless.
#[derive(Error, Debug, Clone)]
pub enum PriceError {
    #[error("price source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed price response: {0}")]
    BadResponse(String),
    #[error("no quote for symbol {0}")]
    UnknownSymbol(String),
}

/// Supplies the current USD price for a token symbol.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn usd_price(&self, symbol: &str) -> Result<f64, PriceError>;
}

#[derive(Deserialize)]
struct PriceResponse {
    price: f64,
}

/// Queries `GET {base_url}/price?symbol=SYM` expecting `{"price": <f64>}`.
pub struct HttpPriceOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn usd_price(&self, symbol: &str) -> Result<f64, PriceError> {
        let url = format!("{}/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| PriceError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PriceError::UnknownSymbol(symbol.to_string()));
        }
        if !response.status().is_success() {
            return Err(PriceError::Unavailable(format!(
                "{} from {url}",
                response.status()
            )));
        }

        let parsed: PriceResponse = response
            .json()
            .await
            .map_err(|e| PriceError::BadResponse(e.to_string()))?;

        if !parsed.price.is_finite() || parsed.price < 0.0 {
            return Err(PriceError::BadResponse(format!(
                "negative or non-finite price {} for {symbol}",
                parsed.price
            )));
        }

        debug!("{symbol} = {} USD", parsed.price);
        Ok(parsed.price)
    }
}
