use crate::cycle::{AgentSlot, CycleExecutor};
use crate::error::EngineError;
use crate::leaderboard::compute_leaderboard;
use crate::market::MarketContext;
use agents::{Agent, Credentials, ProviderFactory};
use api_client::MarketDataProvider;
use chrono::Utc;
use configuration::RuntimeSettings;
use core_types::{
    Competition, CompetitionConfig, CompetitionStatus, Decision, LeaderboardEntry,
    PerformanceSnapshot, Portfolio,
};
use database::{CycleRecord, DbError, PersistenceStore};
use executor::{Executor, ExecutorError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// The collaborators every runtime of a process shares.
#[derive(Clone)]
pub struct RuntimeServices {
    pub store: PersistenceStore,
    pub market: Arc<dyn MarketDataProvider>,
    pub executor: Arc<dyn Executor>,
    pub providers: Arc<dyn ProviderFactory>,
    pub settings: RuntimeSettings,
}

/// What a successful `run_cycle` reports back.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub competition_id: String,
    pub cycle_number: u64,
    pub status: CompetitionStatus,
    pub decisions: Vec<Decision>,
    pub snapshots: Vec<PerformanceSnapshot>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// The lifecycle state machine of one competition.
///
/// ```text
/// CREATED -> RUNNING <-> PAUSED -> COMPLETED
///     \________\___________\_____-> FAILED
/// ```
///
/// In-memory state (competition row, portfolios, latest snapshots) changes only
/// after the primary store accepted the matching write.
pub struct CompetitionRuntime {
    competition: Competition,
    services: RuntimeServices,
    holder: String,
    agents: Vec<AgentSlot>,
    ready: bool,
    issues: Vec<String>,
    portfolios: Vec<Portfolio>,
    latest_snapshots: Vec<PerformanceSnapshot>,
}

impl CompetitionRuntime {
    /// Validates and persists a new competition in CREATED.
    pub async fn create(
        mut config: CompetitionConfig,
        services: RuntimeServices,
        holder: String,
    ) -> Result<Self, EngineError> {
        config.ensure_id();
        config.validate()?;
        if config.exchange != services.executor.venue() {
            return Err(EngineError::Configuration(format!(
                "exchange '{}' is not supported (available: '{}')",
                config.exchange,
                services.executor.venue()
            )));
        }

        let competition = Competition::new(config);
        match services.store.create_competition(&competition).await {
            Ok(()) => {}
            Err(DbError::Duplicate(_)) => {
                return Err(EngineError::Configuration(format!(
                    "competition '{}' already exists",
                    competition.id()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            competition_id = %competition.id(),
            agents = competition.config.agents.len(),
            symbols = ?competition.config.symbols,
            "Competition created"
        );
        Ok(Self::assemble(competition, services, holder, Vec::new(), Vec::new()))
    }

    /// Cold resume: rebuilds the runtime from the primary store. Agents are not
    /// connected yet; call `initialize`.
    pub async fn restore(
        competition_id: &str,
        services: RuntimeServices,
        holder: String,
    ) -> Result<Self, EngineError> {
        let competition = services
            .store
            .load_competition(competition_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(competition_id.to_string()))?;
        let mut ledgers = services.store.load_ledgers(competition_id).await?;
        let latest_snapshots = services.store.latest_snapshots(competition_id).await?;

        let portfolios: Vec<Portfolio> = competition
            .config
            .agents
            .iter()
            .map(|spec| {
                let capital = competition.config.capital_for(spec);
                match ledgers.remove(&spec.name) {
                    Some(ledger) => {
                        if ledger.cycle_number != competition.cycle_count {
                            tracing::warn!(
                                competition_id,
                                agent = %spec.name,
                                ledger_cycle = ledger.cycle_number,
                                cycle_count = competition.cycle_count,
                                "Ledger row is behind the competition row"
                            );
                        }
                        ledger.into_portfolio(capital)
                    }
                    None => Portfolio::new(spec.name.clone(), capital),
                }
            })
            .collect();

        tracing::info!(
            competition_id,
            status = %competition.status,
            cycle_count = competition.cycle_count,
            "Competition restored from store"
        );
        Ok(Self::assemble(competition, services, holder, portfolios, latest_snapshots))
    }

    fn assemble(
        competition: Competition,
        services: RuntimeServices,
        holder: String,
        mut portfolios: Vec<Portfolio>,
        latest_snapshots: Vec<PerformanceSnapshot>,
    ) -> Self {
        if portfolios.is_empty() {
            portfolios = competition
                .config
                .agents
                .iter()
                .map(|spec| Portfolio::new(spec.name.clone(), competition.config.capital_for(spec)))
                .collect();
        }
        Self {
            competition,
            services,
            holder,
            agents: Vec::new(),
            ready: false,
            issues: Vec::new(),
            portfolios,
            latest_snapshots,
        }
    }

    /// Deletes a competition from both stores. Idempotent.
    pub async fn delete(services: &RuntimeServices, competition_id: &str) -> Result<bool, EngineError> {
        Ok(services.store.delete_competition(competition_id).await?)
    }

    pub fn id(&self) -> &str {
        self.competition.id()
    }

    pub fn competition(&self) -> &Competition {
        &self.competition
    }

    /// Whether this runtime's lifecycle fields agree with the stored row.
    pub fn matches_stored(&self, stored: &Competition) -> bool {
        self.competition.status == stored.status && self.competition.cycle_count == stored.cycle_count
    }

    pub fn status(&self) -> CompetitionStatus {
        self.competition.status
    }

    pub fn portfolios(&self) -> &[Portfolio] {
        &self.portfolios
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Problems found by the last `initialize`, one line per agent.
    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    /// Builds every agent's provider client. Returns `false` when any agent is
    /// unusable; those agents still get a slot that answers WAIT.
    pub async fn initialize(&mut self, credentials: &Credentials) -> bool {
        let config = &self.competition.config;
        let settings = &self.services.settings;
        let mut slots = Vec::with_capacity(config.agents.len());
        let mut issues = Vec::new();

        for spec in &config.agents {
            let credential = credentials.resolve(spec);
            if spec.provider.requires_credential() && credential.is_none() {
                let hint = spec
                    .provider
                    .credential_env_var()
                    .map(|var| format!(" (pass it in credentials or set {})", var))
                    .unwrap_or_default();
                let reason = format!("no credential for provider '{}'{}", spec.provider, hint);
                issues.push(format!("{}: {}", spec.name, reason));
                slots.push(AgentSlot::Unavailable { name: spec.name.clone(), reason });
                continue;
            }

            let provider = match self.services.providers.create(spec, credential) {
                Ok(provider) => provider,
                Err(e) => {
                    issues.push(format!("{}: {}", spec.name, e));
                    slots.push(AgentSlot::Unavailable {
                        name: spec.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let timeout = Duration::from_millis(
                spec.timeout_ms.unwrap_or(settings.default_agent_timeout_ms),
            );
            let agent = Agent::new(spec.clone(), provider, config.symbols.clone(), timeout);

            if settings.probe_providers {
                if let Err(e) = agent.probe().await {
                    issues.push(format!("{}: {}", spec.name, e));
                    slots.push(AgentSlot::Unavailable {
                        name: spec.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            }
            slots.push(AgentSlot::Ready(agent));
        }

        self.ready = issues.is_empty();
        if self.ready {
            tracing::info!(competition_id = %self.id(), agents = slots.len(), "Agents initialized");
        } else {
            tracing::warn!(competition_id = %self.id(), issues = ?issues, "Some agents are unusable");
        }
        self.agents = slots;
        self.issues = issues;
        self.ready
    }

    /// CREATED | PAUSED -> RUNNING. Agents must all initialize first.
    pub async fn start(&mut self, credentials: &Credentials) -> Result<(), EngineError> {
        self.ensure_transition("start", CompetitionStatus::Running)?;
        if !self.ready && !self.initialize(credentials).await {
            return Err(EngineError::AgentsUnavailable(self.issues.clone()));
        }

        let now = Utc::now();
        let mut next = self.competition.clone();
        next.status = CompetitionStatus::Running;
        next.start_time.get_or_insert(now);
        next.updated_at = now;
        self.services.store.update_competition(&next).await?;
        self.competition = next;

        tracing::info!(competition_id = %self.id(), cycle_count = self.competition.cycle_count, "Competition running");
        Ok(())
    }

    /// RUNNING -> PAUSED. Nothing is cancelled; there is no cycle in flight
    /// between commands.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        self.ensure_transition("stop", CompetitionStatus::Paused)?;

        let mut next = self.competition.clone();
        next.status = CompetitionStatus::Paused;
        next.updated_at = Utc::now();
        self.services.store.update_competition(&next).await?;
        self.competition = next;

        tracing::info!(competition_id = %self.id(), "Competition paused");
        Ok(())
    }

    /// Runs and persists one cycle under the competition lease.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, EngineError> {
        if self.competition.status != CompetitionStatus::Running {
            return Err(EngineError::InvalidTransition {
                action: "run a cycle of",
                status: self.competition.status,
            });
        }
        if self.agents.is_empty() {
            self.initialize(&Credentials::new()).await;
        }

        let ttl = Duration::from_secs(self.services.settings.lease_ttl_secs);
        let competition_id = self.id().to_string();
        self.services
            .store
            .acquire_lease(&competition_id, &self.holder, ttl)
            .await?;

        let result = self.run_cycle_leased().await;

        if let Err(e) = self.services.store.release_lease(&competition_id, &self.holder).await {
            tracing::warn!(competition_id = %competition_id, error = %e, "Failed to release lease");
        }
        result
    }

    async fn run_cycle_leased(&mut self) -> Result<CycleReport, EngineError> {
        let market = MarketContext::fetch(
            self.services.market.as_ref(),
            &self.competition.config.symbols,
            Duration::from_millis(self.services.settings.market_timeout_ms),
        )
        .await?;

        let cycle_executor = CycleExecutor::new(Arc::clone(&self.services.executor));
        let result = match cycle_executor
            .run_cycle(&self.competition, &self.agents, &self.portfolios, &market)
            .await
        {
            Ok(result) => result,
            Err(EngineError::Ledger(e @ ExecutorError::InvariantViolation { .. })) => {
                self.mark_failed(&e.to_string()).await;
                return Err(EngineError::Ledger(e));
            }
            Err(e) => return Err(e),
        };

        let mut next = self.competition.clone();
        next.cycle_count = result.cycle_number;
        next.updated_at = result.timestamp;
        if next.reached_max_cycles() {
            next.status = CompetitionStatus::Completed;
            next.end_time = Some(result.timestamp);
        }
        let leaderboard = compute_leaderboard(&next.config, &result.snapshots);

        self.services
            .store
            .persist_cycle(&CycleRecord {
                competition: &next,
                decisions: &result.decisions,
                snapshots: &result.snapshots,
                leaderboard: &leaderboard,
                portfolios: &result.portfolios,
                timestamp: result.timestamp,
            })
            .await?;

        // Committed: only now does memory move forward.
        self.competition = next;
        self.portfolios = result.portfolios;
        self.latest_snapshots = result.snapshots.clone();

        let executed = result.decisions.iter().filter(|d| d.trade_executed).count();
        tracing::info!(
            competition_id = %self.id(),
            cycle = result.cycle_number,
            trades_executed = executed,
            status = %self.competition.status,
            "Cycle committed"
        );

        Ok(CycleReport {
            competition_id: self.id().to_string(),
            cycle_number: result.cycle_number,
            status: self.competition.status,
            decisions: result.decisions,
            snapshots: result.snapshots,
            leaderboard,
        })
    }

    /// Current ranking. Pure: never touches the store.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        compute_leaderboard(&self.competition.config, &self.latest_snapshots)
    }

    /// Moves a non-terminal competition to FAILED. Best effort: a store error is
    /// logged and the in-memory state still records the failure.
    pub async fn mark_failed(&mut self, reason: &str) {
        if self.competition.status.is_terminal() {
            return;
        }
        let now = Utc::now();
        let mut next = self.competition.clone();
        next.status = CompetitionStatus::Failed;
        next.failure_reason = Some(reason.to_string());
        next.end_time = Some(now);
        next.updated_at = now;
        if let Err(e) = self.services.store.update_competition(&next).await {
            tracing::error!(competition_id = %self.id(), error = %e, "Could not persist FAILED status");
        }
        tracing::error!(competition_id = %self.id(), reason, "Competition failed");
        self.competition = next;
    }

    fn ensure_transition(
        &self,
        action: &'static str,
        next: CompetitionStatus,
    ) -> Result<(), EngineError> {
        if self.competition.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition { action, status: self.competition.status })
        }
    }
}
