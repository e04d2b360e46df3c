use crate::error::ApiError;
use crate::responses::{ApiErrorResponse, TickerPriceResponse};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Source of the current price of a symbol such as `BTC/USD`.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn price(&self, symbol: &str) -> Result<Decimal, ApiError>;

    /// Name reported by `system_info`.
    fn source(&self) -> &str;
}

/// A fixed price table, editable at runtime.
#[derive(Debug, Default)]
pub struct StaticPriceFeed {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl StaticPriceFeed {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        Self { prices: RwLock::new(prices) }
    }

    pub async fn set_price(&self, symbol: impl Into<String>, price: Decimal) {
        self.prices.write().await.insert(symbol.into(), price);
    }

    pub async fn remove_price(&self, symbol: &str) {
        self.prices.write().await.remove(symbol);
    }
}

#[async_trait]
impl MarketDataProvider for StaticPriceFeed {
    async fn price(&self, symbol: &str) -> Result<Decimal, ApiError> {
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| ApiError::PriceUnavailable(symbol.to_string()))
    }

    fn source(&self) -> &str {
        "static"
    }
}

/// Converts `BTC/USD` into the exchange's `BTCUSDT`. USD quotes are priced
/// against USDT; other pairs are concatenated.
pub fn to_exchange_symbol(symbol: &str) -> String {
    match symbol.split_once('/') {
        Some((base, "USD")) => format!("{}USDT", base.to_uppercase()),
        Some((base, quote)) => format!("{}{}", base, quote).to_uppercase(),
        None => symbol.to_uppercase(),
    }
}

/// Spot prices from the public Binance ticker. No API key is needed.
#[derive(Clone)]
pub struct BinanceTickerClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceTickerClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for BinanceTickerClient {
    async fn price(&self, symbol: &str) -> Result<Decimal, ApiError> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let exchange_symbol = to_exchange_symbol(symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", exchange_symbol.as_str())])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let ticker: TickerPriceResponse = serde_json::from_str(&text)
                .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
            if ticker.price <= Decimal::ZERO {
                return Err(ApiError::PriceUnavailable(symbol.to_string()));
            }
            Ok(ticker.price)
        } else {
            match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_error) => {
                    tracing::warn!(
                        symbol = %exchange_symbol,
                        code = api_error.code,
                        msg = %api_error.msg,
                        "Ticker request rejected"
                    );
                    Err(ApiError::PriceUnavailable(format!("{} ({})", symbol, api_error.msg)))
                }
                Err(_) => Err(ApiError::from_status(status.as_u16(), text)),
            }
        }
    }

    fn source(&self) -> &str {
        "binance"
    }
}
