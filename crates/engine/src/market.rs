use crate::error::EngineError;
use api_client::{ApiError, MarketDataProvider};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Prices of every competition symbol, fetched once at the start of a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketContext {
    prices: BTreeMap<String, Decimal>,
    fetched_at: DateTime<Utc>,
}

impl MarketContext {
    /// Fetches all symbols concurrently. Any missing, non-positive or late price
    /// fails the whole context.
    pub async fn fetch(
        provider: &dyn MarketDataProvider,
        symbols: &[String],
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let lookups = join_all(symbols.iter().map(|symbol| provider.price(symbol)));
        let results = tokio::time::timeout(timeout, lookups).await.map_err(|_| {
            EngineError::MarketData {
                symbol: symbols.join(", "),
                source: ApiError::Timeout(format!(
                    "{} did not answer within {}ms",
                    provider.source(),
                    timeout.as_millis()
                )),
            }
        })?;

        let mut prices = BTreeMap::new();
        for (symbol, result) in symbols.iter().zip(results) {
            let price = result.map_err(|source| EngineError::MarketData {
                symbol: symbol.clone(),
                source,
            })?;
            if price <= Decimal::ZERO {
                return Err(EngineError::MarketData {
                    symbol: symbol.clone(),
                    source: ApiError::InvalidResponse(format!("non-positive price {}", price)),
                });
            }
            prices.insert(symbol.clone(), price);
        }

        tracing::debug!(source = provider.source(), symbols = prices.len(), "Market context loaded");
        Ok(Self { prices, fetched_at: Utc::now() })
    }

    pub fn from_prices(prices: BTreeMap<String, Decimal>) -> Self {
        Self { prices, fetched_at: Utc::now() }
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn prices(&self) -> &BTreeMap<String, Decimal> {
        &self.prices
    }

    /// The lookup shape `PortfolioLedger` values portfolios with.
    pub fn price_map(&self) -> HashMap<String, Decimal> {
        self.prices.iter().map(|(s, p)| (s.clone(), *p)).collect()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}
