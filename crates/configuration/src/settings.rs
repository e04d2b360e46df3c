use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub market_data: MarketDataSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.primary_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.primary_url must be set".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.runtime.default_agent_timeout_ms == 0 || self.runtime.market_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "runtime timeouts must be greater than zero".to_string(),
            ));
        }
        if self.runtime.lease_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.lease_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(entry) = self
            .market_data
            .prices
            .iter()
            .find(|entry| entry.price <= Decimal::ZERO)
        {
            return Err(ConfigError::ValidationError(format!(
                "market_data price for {} must be positive",
                entry.symbol
            )));
        }
        Ok(())
    }
}

/// Locations of the authoritative store and the reporting mirror.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// e.g. `sqlite://data/arena.db`
    pub primary_url: String,
    /// Best-effort copy consumed by the reporting process. `None` disables mirroring.
    pub mirror_url: Option<String>,
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before failing a statement.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            primary_url: "sqlite://data/arena.db".to_string(),
            mirror_url: Some("sqlite://data/arena_mirror.db".to_string()),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Knobs for cycle execution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Applied to agents whose spec does not set `timeout_ms`.
    pub default_agent_timeout_ms: u64,
    /// Upper bound on fetching the prices of all symbols for a cycle.
    pub market_timeout_ms: u64,
    /// A lease older than this is considered abandoned by a crashed process.
    pub lease_ttl_secs: u64,
    /// When true, `initialize` makes a network call to each provider.
    pub probe_providers: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            default_agent_timeout_ms: 60_000,
            market_timeout_ms: 10_000,
            lease_ttl_secs: 600,
            probe_providers: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketDataSource {
    /// Prices come from the `prices` table below.
    Static,
    /// Spot prices from the Binance public ticker.
    Binance,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketDataSettings {
    pub source: MarketDataSource,
    pub base_url: String,
    pub prices: Vec<PriceEntry>,
}

/// One row of the static price table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceEntry {
    pub symbol: String,
    pub price: Decimal,
}

impl MarketDataSettings {
    pub fn price_table(&self) -> HashMap<String, Decimal> {
        self.prices
            .iter()
            .map(|entry| (entry.symbol.clone(), entry.price))
            .collect()
    }
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            source: MarketDataSource::Static,
            base_url: "https://api.binance.com".to_string(),
            prices: vec![
                PriceEntry { symbol: "BTC/USD".to_string(), price: dec!(65000) },
                PriceEntry { symbol: "ETH/USD".to_string(), price: dec!(3200) },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "arena.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}
