use crate::enums::{Action, CompetitionStatus, ProviderKind, TradeStatus};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// One competitor: an LLM-backed agent and the capital it starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub provider: ProviderKind,
    pub model_id: String,
    /// API key for the provider. Never serialized, so it never reaches
    /// `config_json` or a response body.
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
    /// Falls back to the competition's `initial_capital` when absent.
    #[serde(default)]
    pub initial_capital: Option<Decimal>,
    /// Endpoint override, required for `openai_compat`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Decision timeout for this agent. Falls back to the runtime default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Canned responses replayed by the `scripted` provider.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub script: Vec<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, provider: ProviderKind, model_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider,
            model_id: model_id.into(),
            credential: None,
            initial_capital: None,
            base_url: None,
            timeout_ms: None,
            temperature: None,
            script: Vec::new(),
        }
    }
}

/// The immutable definition of a competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionConfig {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub agents: Vec<AgentSpec>,
    /// Ordered set of tradable symbols, e.g. `["BTC/USD", "ETH/USD"]`.
    pub symbols: Vec<String>,
    pub initial_capital: Decimal,
    /// Advisory spacing between cycles; there is no scheduler, the caller drives cycles.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    #[serde(default)]
    pub max_cycles: Option<u64>,
    #[serde(default = "default_exchange")]
    pub exchange: String,
}

fn default_cycle_interval_secs() -> u64 {
    300
}

fn default_exchange() -> String {
    "paper".to_string()
}

impl CompetitionConfig {
    /// Assigns a fresh id when the caller did not provide one.
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
    }

    /// Starting capital of a given agent.
    pub fn capital_for(&self, agent: &AgentSpec) -> Decimal {
        agent.initial_capital.unwrap_or(self.initial_capital)
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    /// Checks every structural rule a competition must satisfy before it is persisted.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::InvalidConfig("competition id is empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidConfig("competition name is empty".to_string()));
        }
        if self.agents.is_empty() {
            return Err(CoreError::InvalidConfig("at least one agent is required".to_string()));
        }
        if self.symbols.is_empty() {
            return Err(CoreError::InvalidConfig("at least one symbol is required".to_string()));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(CoreError::InvalidInput(
                "initial_capital".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.max_cycles == Some(0) {
            return Err(CoreError::InvalidInput(
                "max_cycles".to_string(),
                "must be at least 1 when set".to_string(),
            ));
        }

        let mut seen_symbols = HashSet::new();
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return Err(CoreError::InvalidConfig("symbol names must not be empty".to_string()));
            }
            if !seen_symbols.insert(symbol.as_str()) {
                return Err(CoreError::InvalidConfig(format!("duplicate symbol '{}'", symbol)));
            }
        }

        let mut seen_agents = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(CoreError::InvalidConfig("agent names must not be empty".to_string()));
            }
            if !seen_agents.insert(agent.name.as_str()) {
                return Err(CoreError::InvalidConfig(format!("duplicate agent name '{}'", agent.name)));
            }
            if self.capital_for(agent) <= Decimal::ZERO {
                return Err(CoreError::InvalidInput(
                    format!("agents[{}].initial_capital", agent.name),
                    "must be greater than zero".to_string(),
                ));
            }
            if agent.provider == ProviderKind::OpenAiCompat && agent.base_url.is_none() {
                return Err(CoreError::InvalidConfig(format!(
                    "agent '{}' uses openai_compat but has no base_url",
                    agent.name
                )));
            }
            if agent.timeout_ms == Some(0) {
                return Err(CoreError::InvalidInput(
                    format!("agents[{}].timeout_ms", agent.name),
                    "must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A competition and its mutable lifecycle fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub config: CompetitionConfig,
    pub status: CompetitionStatus,
    pub cycle_count: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Competition {
    pub fn new(config: CompetitionConfig) -> Self {
        let now = Utc::now();
        Self {
            config,
            status: CompetitionStatus::Created,
            cycle_count: 0,
            start_time: None,
            end_time: None,
            created_at: now,
            updated_at: now,
            failure_reason: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// True once `cycle_count` has reached the configured cap.
    pub fn reached_max_cycles(&self) -> bool {
        self.config.max_cycles.is_some_and(|max| self.cycle_count >= max)
    }
}

/// A long holding in a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_price: Decimal,
}

/// The simulated account of one agent inside one competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub agent_name: String,
    pub initial_capital: Decimal,
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    pub trades_count: u64,
    pub realized_pnl: Decimal,
}

impl Portfolio {
    pub fn new(agent_name: impl Into<String>, initial_capital: Decimal) -> Self {
        Self {
            agent_name: agent_name.into(),
            initial_capital,
            cash: initial_capital,
            positions: BTreeMap::new(),
            trades_count: 0,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn quantity_of(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).map(|p| p.quantity).unwrap_or(Decimal::ZERO)
    }

    /// Number of symbols with a non-zero holding.
    pub fn open_positions(&self) -> usize {
        self.positions.values().filter(|p| !p.quantity.is_zero()).count()
    }
}

/// Token accounting reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The recorded outcome of one agent in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub competition_id: String,
    pub agent_name: String,
    pub cycle_number: u64,
    pub action: Action,
    pub symbol: Option<String>,
    pub quantity: Decimal,
    pub confidence: f64,
    pub reasoning: String,
    pub trade_executed: bool,
    pub price_at_decision: Option<Decimal>,
    pub trade_pnl: Decimal,
    pub portfolio_value_before: Decimal,
    pub portfolio_value_after: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn trade_status(&self) -> TradeStatus {
        TradeStatus::of(self.action, self.trade_executed)
    }
}

/// Per-agent, per-cycle valuation used for charting and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub competition_id: String,
    pub agent_name: String,
    pub cycle_number: u64,
    pub portfolio_value: Decimal,
    pub cash: Decimal,
    pub pnl: Decimal,
    pub return_pct: Decimal,
    pub positions_count: u32,
    pub trades_count: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub agent_name: String,
    pub rank: u32,
    pub portfolio_value: Decimal,
    pub return_pct: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_config() -> CompetitionConfig {
        CompetitionConfig {
            id: "cmp-1".to_string(),
            name: "Weekly".to_string(),
            agents: vec![
                AgentSpec::new("alpha", ProviderKind::OpenAi, "gpt-4o-mini"),
                AgentSpec::new("beta", ProviderKind::Anthropic, "claude-3-5-haiku"),
            ],
            symbols: vec!["BTC/USD".to_string()],
            initial_capital: dec!(10000),
            cycle_interval_secs: 60,
            max_cycles: Some(10),
            exchange: "paper".to_string(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_empty_agent_list_is_rejected() {
        let mut config = sample_config();
        config.agents.clear();
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_agent_and_symbol_rejected() {
        let mut config = sample_config();
        config.agents[1].name = "alpha".to_string();
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.symbols.push("BTC/USD".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_cycles_rejected() {
        let mut config = sample_config();
        config.max_cycles = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_agent_capital_falls_back_to_competition() {
        let mut config = sample_config();
        config.agents[0].initial_capital = Some(dec!(500));
        assert_eq!(config.capital_for(&config.agents[0]), dec!(500));
        assert_eq!(config.capital_for(&config.agents[1]), dec!(10000));
    }

    #[test]
    fn test_credential_is_never_serialized() {
        let mut config = sample_config();
        config.agents[0].credential = Some("sk-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));

        let back: CompetitionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agents[0].credential, None);
    }

    #[test]
    fn test_status_transitions() {
        use CompetitionStatus::*;
        assert!(Created.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Paused.can_transition_to(Failed));
        assert!(!Created.can_transition_to(Paused));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_ensure_id_generates_when_missing() {
        let mut config = sample_config();
        config.id.clear();
        config.ensure_id();
        assert!(!config.id.is_empty());
    }
}
