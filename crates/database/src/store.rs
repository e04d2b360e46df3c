use crate::error::DbError;
use crate::mirror::MirrorRepository;
use crate::models::{
    CompetitionSummary, CycleRecord, DecisionFilter, LeaderboardRecord, StoredLedger,
};
use crate::repository::DbRepository;
use core_types::{Competition, Decision, PerformanceSnapshot};
use std::collections::HashMap;
use std::time::Duration;

/// Durable competition state: an authoritative primary store plus an optional,
/// best-effort reporting mirror.
///
/// Primary failures are returned to the caller. Mirror failures are logged and
/// swallowed; the mirror may lag or miss rows but never blocks a write.
///
/// The store takes no locks of its own. Callers serialize `persist_cycle` per
/// competition through `acquire_lease`.
#[derive(Debug, Clone)]
pub struct PersistenceStore {
    primary: DbRepository,
    mirror: Option<MirrorRepository>,
}

impl PersistenceStore {
    pub fn new(primary: DbRepository, mirror: Option<MirrorRepository>) -> Self {
        Self { primary, mirror }
    }

    pub fn primary(&self) -> &DbRepository {
        &self.primary
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    pub async fn create_competition(&self, competition: &Competition) -> Result<(), DbError> {
        self.primary.insert_competition(competition).await?;
        self.mirror_competition(competition).await;
        tracing::info!(competition_id = %competition.id(), "Competition persisted");
        Ok(())
    }

    pub async fn update_competition(&self, competition: &Competition) -> Result<(), DbError> {
        self.primary.update_competition(competition).await?;
        self.mirror_competition(competition).await;
        Ok(())
    }

    pub async fn persist_cycle(&self, record: &CycleRecord<'_>) -> Result<(), DbError> {
        self.primary.persist_cycle(record).await?;
        tracing::debug!(
            competition_id = %record.competition.id(),
            cycle = record.competition.cycle_count,
            decisions = record.decisions.len(),
            "Cycle committed to primary store"
        );

        if let Some(mirror) = &self.mirror {
            let competition_id = record.competition.id();
            let cycle = record.competition.cycle_count;
            if let Err(e) = mirror.insert_decisions(record.decisions).await {
                tracing::warn!(competition_id, cycle, error = %e, "Mirror write of decisions failed");
            }
            if let Err(e) = mirror.insert_snapshots(record.snapshots).await {
                tracing::warn!(competition_id, cycle, error = %e, "Mirror write of snapshots failed");
            }
            if let Err(e) = mirror
                .insert_leaderboard(competition_id, cycle, record.leaderboard, record.timestamp)
                .await
            {
                tracing::warn!(competition_id, cycle, error = %e, "Mirror write of leaderboard failed");
            }
            self.mirror_competition(record.competition).await;
        }
        Ok(())
    }

    pub async fn load_competition(&self, competition_id: &str) -> Result<Option<Competition>, DbError> {
        self.primary.get_competition(competition_id).await
    }

    pub async fn load_ledgers(
        &self,
        competition_id: &str,
    ) -> Result<HashMap<String, StoredLedger>, DbError> {
        self.primary.load_ledgers(competition_id).await
    }

    pub async fn latest_snapshots(
        &self,
        competition_id: &str,
    ) -> Result<Vec<PerformanceSnapshot>, DbError> {
        self.primary.latest_snapshots(competition_id).await
    }

    pub async fn decisions(
        &self,
        competition_id: &str,
        filter: &DecisionFilter,
    ) -> Result<Vec<Decision>, DbError> {
        self.primary.get_decisions(competition_id, filter).await
    }

    pub async fn snapshots(
        &self,
        competition_id: &str,
        agent_name: Option<&str>,
    ) -> Result<Vec<PerformanceSnapshot>, DbError> {
        self.primary.get_snapshots(competition_id, agent_name).await
    }

    pub async fn leaderboard_history(
        &self,
        competition_id: &str,
    ) -> Result<Vec<LeaderboardRecord>, DbError> {
        self.primary.leaderboard_history(competition_id).await
    }

    pub async fn list_competitions(&self) -> Result<Vec<CompetitionSummary>, DbError> {
        self.primary.list_competitions().await
    }

    /// Deletes from both stores. Idempotent: returns `false` when nothing existed.
    pub async fn delete_competition(&self, competition_id: &str) -> Result<bool, DbError> {
        let existed = self.primary.delete_competition(competition_id).await?;
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.delete_competition(competition_id).await {
                tracing::warn!(competition_id, error = %e, "Mirror delete failed");
            }
        }
        if existed {
            tracing::info!(competition_id, "Competition deleted");
        }
        Ok(existed)
    }

    pub async fn acquire_lease(
        &self,
        competition_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<(), DbError> {
        self.primary.acquire_lease(competition_id, holder, ttl).await
    }

    pub async fn release_lease(&self, competition_id: &str, holder: &str) -> Result<(), DbError> {
        self.primary.release_lease(competition_id, holder).await
    }

    async fn mirror_competition(&self, competition: &Competition) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.upsert_competition(competition).await {
                tracing::warn!(
                    competition_id = %competition.id(),
                    error = %e,
                    "Mirror write of competition failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{connect_in_memory, run_migrations, run_mirror_migrations};
    use chrono::Utc;
    use core_types::{
        Action, AgentSpec, CompetitionConfig, CompetitionStatus, LeaderboardEntry, Portfolio,
        Position, ProviderKind,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn primary() -> DbRepository {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        DbRepository::new(pool)
    }

    async fn mirror() -> MirrorRepository {
        let pool = connect_in_memory().await.unwrap();
        run_mirror_migrations(&pool).await.unwrap();
        MirrorRepository::new(pool)
    }

    fn competition(id: &str) -> Competition {
        let mut alpha = AgentSpec::new("alpha", ProviderKind::OpenAi, "gpt-4o-mini");
        alpha.credential = Some("sk-should-not-be-stored".to_string());
        let beta = AgentSpec::new("beta", ProviderKind::Scripted, "scripted-v1");
        Competition::new(CompetitionConfig {
            id: id.to_string(),
            name: "Store test".to_string(),
            agents: vec![alpha, beta],
            symbols: vec!["BTC/USD".to_string()],
            initial_capital: dec!(10000),
            cycle_interval_secs: 60,
            max_cycles: Some(5),
            exchange: "paper".to_string(),
        })
    }

    /// Cycles are only committed for running competitions.
    fn running(id: &str) -> Competition {
        let mut competition = competition(id);
        competition.status = CompetitionStatus::Running;
        competition
    }

    async fn mirror_ids(mirror: &MirrorRepository, table: &str, competition_id: &str) -> Vec<String> {
        sqlx::query_scalar(&format!("SELECT id FROM {} WHERE competition_id = ?", table))
            .bind(competition_id)
            .fetch_all(mirror.pool())
            .await
            .unwrap()
    }

    fn decision(competition_id: &str, agent: &str, cycle: u64, action: Action) -> Decision {
        Decision {
            competition_id: competition_id.to_string(),
            agent_name: agent.to_string(),
            cycle_number: cycle,
            action,
            symbol: action.is_trade().then(|| "BTC/USD".to_string()),
            quantity: if action.is_trade() { dec!(0.1) } else { Decimal::ZERO },
            confidence: 0.7,
            reasoning: "test".to_string(),
            trade_executed: action.is_trade(),
            price_at_decision: Some(dec!(50000)),
            trade_pnl: Decimal::ZERO,
            portfolio_value_before: dec!(10000),
            portfolio_value_after: dec!(10000),
            timestamp: Utc::now(),
        }
    }

    fn snapshot(competition_id: &str, agent: &str, cycle: u64, value: Decimal) -> PerformanceSnapshot {
        PerformanceSnapshot {
            competition_id: competition_id.to_string(),
            agent_name: agent.to_string(),
            cycle_number: cycle,
            portfolio_value: value,
            cash: value,
            pnl: value - dec!(10000),
            return_pct: (value - dec!(10000)) / dec!(100),
            positions_count: 0,
            trades_count: 0,
            timestamp: Utc::now(),
        }
    }

    fn alpha_after_buy() -> Portfolio {
        let mut portfolio = Portfolio::new("alpha", dec!(10000));
        portfolio.cash = dec!(5000);
        portfolio.trades_count = 1;
        portfolio.positions.insert(
            "BTC/USD".to_string(),
            Position { symbol: "BTC/USD".to_string(), quantity: dec!(0.1), avg_price: dec!(50000) },
        );
        portfolio
    }

    /// Advances `competition` by one cycle and persists it.
    async fn commit_cycle(store: &PersistenceStore, competition: &mut Competition) -> Result<(), DbError> {
        competition.cycle_count += 1;
        let id = competition.id().to_string();
        let cycle = competition.cycle_count;
        let decisions = vec![
            decision(&id, "alpha", cycle, Action::Buy),
            decision(&id, "beta", cycle, Action::Hold),
        ];
        let snapshots = vec![
            snapshot(&id, "alpha", cycle, dec!(10000) + Decimal::from(cycle)),
            snapshot(&id, "beta", cycle, dec!(10000)),
        ];
        let leaderboard = vec![LeaderboardEntry {
            agent_name: "alpha".to_string(),
            rank: 1,
            portfolio_value: dec!(10001),
            return_pct: dec!(0.01),
        }];
        let portfolios = vec![alpha_after_buy(), Portfolio::new("beta", dec!(10000))];
        store
            .persist_cycle(&CycleRecord {
                competition,
                decisions: &decisions,
                snapshots: &snapshots,
                leaderboard: &leaderboard,
                portfolios: &portfolios,
                timestamp: Utc::now(),
            })
            .await
    }

    #[tokio::test]
    async fn test_competition_round_trip_excludes_credentials() {
        let store = PersistenceStore::new(primary().await, None);
        let competition = competition("cmp-roundtrip");
        store.create_competition(&competition).await.unwrap();

        let loaded = store.load_competition("cmp-roundtrip").await.unwrap().unwrap();
        assert_eq!(loaded.status, CompetitionStatus::Created);
        assert_eq!(loaded.cycle_count, 0);
        assert_eq!(loaded.config.agent_names(), vec!["alpha", "beta"]);
        assert_eq!(loaded.config.agents[0].credential, None);

        assert!(matches!(
            store.create_competition(&competition).await,
            Err(DbError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_cycle_persists_ledgers_and_snapshots() {
        let store = PersistenceStore::new(primary().await, None);
        let mut competition = running("cmp-cycle");
        store.create_competition(&competition).await.unwrap();
        commit_cycle(&store, &mut competition).await.unwrap();
        commit_cycle(&store, &mut competition).await.unwrap();

        let loaded = store.load_competition("cmp-cycle").await.unwrap().unwrap();
        assert_eq!(loaded.cycle_count, 2);

        let ledgers = store.load_ledgers("cmp-cycle").await.unwrap();
        let alpha = &ledgers["alpha"];
        assert_eq!(alpha.cash, dec!(5000));
        assert_eq!(alpha.trades_count, 1);
        assert_eq!(alpha.cycle_number, 2);
        assert_eq!(alpha.positions["BTC/USD"].quantity, dec!(0.1));
        assert!(ledgers["beta"].positions.is_empty());

        let latest = store.latest_snapshots("cmp-cycle").await.unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|s| s.cycle_number == 2));

        let all = store.decisions("cmp-cycle", &DecisionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].cycle_number, 2);
        assert_eq!(all[0].agent_name, "alpha");
        assert!(all[0].trade_executed);

        let filtered = store
            .decisions(
                "cmp-cycle",
                &DecisionFilter { agent_name: Some("beta".to_string()), cycle_number: Some(1), limit: None },
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].action, Action::Hold);

        let alpha_snapshots = store.snapshots("cmp-cycle", Some("alpha")).await.unwrap();
        assert_eq!(
            alpha_snapshots.iter().map(|s| s.cycle_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(store.leaderboard_history("cmp-cycle").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_same_cycle_cannot_be_committed_twice() {
        let store = PersistenceStore::new(primary().await, None);
        let mut competition = running("cmp-dup");
        store.create_competition(&competition).await.unwrap();
        commit_cycle(&store, &mut competition).await.unwrap();

        // Replay cycle 1.
        competition.cycle_count = 0;
        assert!(commit_cycle(&store, &mut competition).await.is_err());

        let decisions = store.decisions("cmp-dup", &DecisionFilter::default()).await.unwrap();
        assert_eq!(decisions.len(), 2);
        let loaded = store.load_competition("cmp-dup").await.unwrap().unwrap();
        assert_eq!(loaded.cycle_count, 1);
    }

    #[tokio::test]
    async fn test_paused_competition_rejects_cycle_commit() {
        let store = PersistenceStore::new(primary().await, None);
        let mut competition = running("cmp-paused");
        store.create_competition(&competition).await.unwrap();
        commit_cycle(&store, &mut competition).await.unwrap();

        // Another process pauses while this copy still believes it is running.
        let mut paused = store.load_competition("cmp-paused").await.unwrap().unwrap();
        paused.status = CompetitionStatus::Paused;
        store.update_competition(&paused).await.unwrap();

        assert!(matches!(
            commit_cycle(&store, &mut competition).await,
            Err(DbError::Conflict(_))
        ));
        let loaded = store.load_competition("cmp-paused").await.unwrap().unwrap();
        assert_eq!(loaded.status, CompetitionStatus::Paused);
        assert_eq!(loaded.cycle_count, 1);
        assert_eq!(store.decisions("cmp-paused", &DecisionFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lifecycle_write_from_an_older_cycle_conflicts() {
        let store = PersistenceStore::new(primary().await, None);
        let stale = running("cmp-stale");
        store.create_competition(&stale).await.unwrap();
        let mut current = stale.clone();
        commit_cycle(&store, &mut current).await.unwrap();

        let mut paused = stale.clone();
        paused.status = CompetitionStatus::Paused;
        assert!(matches!(store.update_competition(&paused).await, Err(DbError::Conflict(_))));

        current.status = CompetitionStatus::Paused;
        store.update_competition(&current).await.unwrap();
        assert_eq!(
            store.load_competition("cmp-stale").await.unwrap().unwrap().status,
            CompetitionStatus::Paused
        );

        assert!(matches!(
            store.update_competition(&running("cmp-missing")).await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_across_both_stores() {
        let mirror = mirror().await;
        let store = PersistenceStore::new(primary().await, Some(mirror.clone()));
        let mut competition = running("cmp-delete");
        store.create_competition(&competition).await.unwrap();
        commit_cycle(&store, &mut competition).await.unwrap();
        commit_cycle(&store, &mut competition).await.unwrap();
        assert_eq!(mirror.count_decisions("cmp-delete").await.unwrap(), 4);

        let snapshot_ids = mirror_ids(&mirror, "snapshots", "cmp-delete").await;
        assert_eq!(snapshot_ids.len(), 4);
        let leaderboard_ids = mirror_ids(&mirror, "leaderboard_history", "cmp-delete").await;
        assert_eq!(leaderboard_ids.len(), 2);
        let mut ids: Vec<&String> = snapshot_ids.iter().chain(&leaderboard_ids).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
        assert!(ids.iter().all(|id| uuid::Uuid::parse_str(id).is_ok()));

        assert!(store.delete_competition("cmp-delete").await.unwrap());
        assert!(!store.delete_competition("cmp-delete").await.unwrap());
        assert!(store.load_competition("cmp-delete").await.unwrap().is_none());
        assert!(store.load_ledgers("cmp-delete").await.unwrap().is_empty());
        assert_eq!(mirror.count_decisions("cmp-delete").await.unwrap(), 0);
        assert!(mirror_ids(&mirror, "snapshots", "cmp-delete").await.is_empty());
        assert!(mirror_ids(&mirror, "leaderboard_history", "cmp-delete").await.is_empty());
    }

    #[tokio::test]
    async fn test_mirror_failure_does_not_fail_primary_write() {
        let mirror = mirror().await;
        mirror.pool().close().await;
        let store = PersistenceStore::new(primary().await, Some(mirror));
        let mut competition = running("cmp-mirror-down");

        store.create_competition(&competition).await.unwrap();
        commit_cycle(&store, &mut competition).await.unwrap();

        let decisions = store.decisions("cmp-mirror-down", &DecisionFilter::default()).await.unwrap();
        assert_eq!(decisions.len(), 2);
    }

    #[tokio::test]
    async fn test_lease_excludes_other_holders_until_released_or_expired() {
        let store = PersistenceStore::new(primary().await, None);
        let ttl = Duration::from_secs(60);

        store.acquire_lease("cmp-lease", "process-a", ttl).await.unwrap();
        assert!(matches!(
            store.acquire_lease("cmp-lease", "process-b", ttl).await,
            Err(DbError::LeaseHeld { .. })
        ));
        // Re-entrant for the same holder.
        store.acquire_lease("cmp-lease", "process-a", ttl).await.unwrap();

        // Releasing someone else's lease is a no-op.
        store.release_lease("cmp-lease", "process-b").await.unwrap();
        assert!(store.acquire_lease("cmp-lease", "process-b", ttl).await.is_err());

        store.release_lease("cmp-lease", "process-a").await.unwrap();
        store.acquire_lease("cmp-lease", "process-b", ttl).await.unwrap();

        // An expired lease can be taken over.
        store.acquire_lease("cmp-expired", "process-a", Duration::ZERO).await.unwrap();
        store.acquire_lease("cmp-expired", "process-b", ttl).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_competitions() {
        let store = PersistenceStore::new(primary().await, None);
        store.create_competition(&competition("cmp-a")).await.unwrap();
        store.create_competition(&competition("cmp-b")).await.unwrap();

        let summaries = store.list_competitions().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.agents == vec!["alpha", "beta"]));
        assert!(summaries.iter().any(|s| s.competition_id == "cmp-b"));
    }
}
