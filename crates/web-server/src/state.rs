use crate::error::AppError;
use agents::HttpProviderFactory;
use api_client::{BinanceTickerClient, MarketDataProvider, StaticPriceFeed};
use configuration::{Config, MarketDataSource};
use database::{
    DbRepository, MirrorRepository, PersistenceStore, connect, run_migrations,
    run_mirror_migrations,
};
use engine::{Registry, RuntimeServices};
use executor::PaperExecutor;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Where the two stores live, as reported by `system_info`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreLocations {
    pub primary: String,
    pub mirror: Option<String>,
}

/// The shared application state that every transport dispatches into.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub locations: StoreLocations,
    pub market_source: String,
}

impl AppState {
    pub fn new(registry: Registry, locations: StoreLocations) -> Self {
        let market_source = registry.services().market.source().to_string();
        Self {
            registry: Arc::new(registry),
            locations,
            market_source,
        }
    }
}

/// Opens the stores, runs migrations and wires the runtime collaborators.
///
/// The primary store must come up. A mirror that cannot be opened is disabled
/// for the lifetime of the process.
pub async fn bootstrap(config: &Config) -> Result<AppState, AppError> {
    let db = &config.database;
    let busy_timeout = Duration::from_millis(db.busy_timeout_ms);

    let primary_pool = connect(&db.primary_url, db.max_connections, busy_timeout).await?;
    run_migrations(&primary_pool).await?;
    let primary = DbRepository::new(primary_pool);

    let mut mirror_location = None;
    let mirror = match &db.mirror_url {
        Some(url) => match open_mirror(url, db.max_connections, busy_timeout).await {
            Ok(mirror) => {
                mirror_location = Some(url.clone());
                Some(mirror)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Mirror store unavailable, continuing without it");
                None
            }
        },
        None => None,
    };

    let market: Arc<dyn MarketDataProvider> = match config.market_data.source {
        MarketDataSource::Static => {
            Arc::new(StaticPriceFeed::new(config.market_data.price_table()))
        }
        MarketDataSource::Binance => Arc::new(BinanceTickerClient::new(
            config.market_data.base_url.clone(),
            Duration::from_millis(config.runtime.market_timeout_ms),
        )?),
    };

    let services = RuntimeServices {
        store: PersistenceStore::new(primary, mirror),
        market,
        executor: Arc::new(PaperExecutor::new()),
        providers: Arc::new(HttpProviderFactory),
        settings: config.runtime.clone(),
    };
    let registry = Registry::new(services);
    tracing::debug!(
        holder = registry.holder(),
        primary = %db.primary_url,
        mirror = mirror_location.as_deref().unwrap_or("disabled"),
        "Runtime services ready"
    );

    Ok(AppState::new(
        registry,
        StoreLocations {
            primary: db.primary_url.clone(),
            mirror: mirror_location,
        },
    ))
}

async fn open_mirror(
    url: &str,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<MirrorRepository, AppError> {
    let pool = connect(url, max_connections, busy_timeout).await?;
    run_mirror_migrations(&pool).await?;
    Ok(MirrorRepository::new(pool))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use configuration::MarketDataSettings;
    use database::connect_in_memory;

    /// In-memory primary and mirror, the default static price table and the
    /// production provider factory (scripted agents need no network).
    pub async fn state() -> AppState {
        let primary_pool = connect_in_memory().await.unwrap();
        run_migrations(&primary_pool).await.unwrap();
        let mirror_pool = connect_in_memory().await.unwrap();
        run_mirror_migrations(&mirror_pool).await.unwrap();

        let services = RuntimeServices {
            store: PersistenceStore::new(
                DbRepository::new(primary_pool),
                Some(MirrorRepository::new(mirror_pool)),
            ),
            market: Arc::new(StaticPriceFeed::new(MarketDataSettings::default().price_table())),
            executor: Arc::new(PaperExecutor::new()),
            providers: Arc::new(HttpProviderFactory),
            settings: Config::default().runtime,
        };
        AppState::new(
            Registry::new(services),
            StoreLocations {
                primary: "sqlite::memory:".to_string(),
                mirror: Some("sqlite::memory:".to_string()),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_without_mirror() {
        let dir = std::env::temp_dir().join(format!("arena-bootstrap-{}", std::process::id()));
        let mut config = Config::default();
        config.database.primary_url = format!("sqlite://{}/primary.db", dir.display());
        config.database.mirror_url = None;

        let state = bootstrap(&config).await.unwrap();
        assert!(state.locations.mirror.is_none());
        assert!(!state.registry.services().store.has_mirror());
        assert_eq!(state.market_source, "static");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
