//! Fixtures shared by the engine's unit tests.

use crate::runtime::RuntimeServices;
use agents::{AgentError, HttpProviderFactory, ProviderFactory};
use api_client::{DecisionProvider, ScriptedProvider, StaticPriceFeed};
use configuration::RuntimeSettings;
use core_types::{AgentSpec, CompetitionConfig, ProviderKind};
use database::{
    DbRepository, MirrorRepository, PersistenceStore, connect_in_memory, run_migrations,
    run_mirror_migrations,
};
use executor::PaperExecutor;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const BUY_TENTH: &str =
    r#"{"action":"BUY","symbol":"BTC/USD","quantity":0.1,"confidence":0.8,"reasoning":"accumulate"}"#;

/// Scripted agents that buy 0.1 BTC every cycle. An agent named `slow` never
/// answers within its 50ms timeout; one named `broken` cannot be built.
pub struct TestFactory;

impl ProviderFactory for TestFactory {
    fn create(
        &self,
        spec: &AgentSpec,
        credential: Option<String>,
    ) -> Result<Arc<dyn DecisionProvider>, AgentError> {
        match spec.name.as_str() {
            "slow" => Ok(Arc::new(
                ScriptedProvider::new("slow", vec![BUY_TENTH.to_string()])
                    .with_delay(Duration::from_secs(5)),
            )),
            "broken" => Err(AgentError::Unavailable {
                agent: spec.name.clone(),
                reason: "endpoint rejected the configuration".to_string(),
            }),
            _ => HttpProviderFactory.create(spec, credential),
        }
    }
}

pub fn config(agents: &[&str]) -> CompetitionConfig {
    CompetitionConfig {
        id: String::new(),
        name: "Engine test".to_string(),
        agents: agents
            .iter()
            .map(|name| {
                let mut spec = AgentSpec::new(*name, ProviderKind::Scripted, "scripted-v1");
                spec.script = vec![BUY_TENTH.to_string()];
                if *name == "slow" {
                    spec.timeout_ms = Some(50);
                }
                spec
            })
            .collect(),
        symbols: vec!["BTC/USD".to_string()],
        initial_capital: dec!(10000),
        cycle_interval_secs: 60,
        max_cycles: None,
        exchange: "paper".to_string(),
    }
}

pub async fn services_with_primary() -> (RuntimeServices, DbRepository) {
    let primary_pool = connect_in_memory().await.unwrap();
    run_migrations(&primary_pool).await.unwrap();
    let mirror_pool = connect_in_memory().await.unwrap();
    run_mirror_migrations(&mirror_pool).await.unwrap();

    let primary = DbRepository::new(primary_pool);
    let store = PersistenceStore::new(primary.clone(), Some(MirrorRepository::new(mirror_pool)));
    let market = StaticPriceFeed::new(HashMap::from([
        ("BTC/USD".to_string(), dec!(50000)),
        ("ETH/USD".to_string(), dec!(2500)),
    ]));

    let services = RuntimeServices {
        store,
        market: Arc::new(market),
        executor: Arc::new(PaperExecutor::new()),
        providers: Arc::new(TestFactory),
        settings: RuntimeSettings {
            default_agent_timeout_ms: 2_000,
            market_timeout_ms: 1_000,
            lease_ttl_secs: 30,
            probe_providers: false,
        },
    };
    (services, primary)
}

pub async fn services() -> RuntimeServices {
    services_with_primary().await.0
}
