use crate::error::DbError;
use crate::models::{
    CompetitionSummary, CycleRecord, DecisionFilter, LeaderboardRecord, StoredLedger,
};
use crate::rows::{
    AgentStateRow, CompetitionRow, DecisionRow, LeaderboardRow, PositionRow, SnapshotRow,
    decimal_text, parse_decimal, to_i64, to_u64,
};
use chrono::{DateTime, Utc};
use core_types::{Competition, Decision, LeaderboardEntry, PerformanceSnapshot, Position};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{QueryBuilder, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const COMPETITION_COLUMNS: &str = "competition_id, config_json, status, cycle_count, start_time, \
     end_time, created_at, updated_at, failure_reason";

const DECISION_COLUMNS: &str = "competition_id, agent_name, cycle_number, action, symbol, quantity, \
     confidence, reasoning, price_at_decision, trade_status, trade_pnl, portfolio_value_before, \
     portfolio_value_after, timestamp";

const SNAPSHOT_COLUMNS: &str = "competition_id, agent_name, cycle_number, portfolio_value, cash, \
     pnl, return_pct, positions_count, trades_count, timestamp";

/// The `DbRepository` provides a high-level, application-specific interface
/// to the authoritative store. It encapsulates all SQL queries against it.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: SqlitePool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts a freshly created competition. Fails with `Duplicate` if the id exists.
    pub async fn insert_competition(&self, competition: &Competition) -> Result<(), DbError> {
        let config_json = serde_json::to_string(&competition.config)?;
        sqlx::query(
            r#"
            INSERT INTO competitions (competition_id, config_json, status, cycle_count, start_time,
                                      end_time, created_at, updated_at, failure_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(competition.id())
        .bind(config_json)
        .bind(competition.status.as_str())
        .bind(to_i64(competition.cycle_count, "cycle_count")?)
        .bind(competition.start_time)
        .bind(competition.end_time)
        .bind(competition.created_at)
        .bind(competition.updated_at)
        .bind(competition.failure_reason.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_write(e, format!("competition '{}'", competition.id())))?;
        Ok(())
    }

    /// Writes a lifecycle transition. `cycle_count` is only ever advanced by
    /// `persist_cycle`, so it is not touched here; a writer that has not seen the
    /// latest cycle gets `Conflict`.
    pub async fn update_competition(&self, competition: &Competition) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE competitions
            SET status = ?, start_time = ?, end_time = ?, updated_at = ?, failure_reason = ?
            WHERE competition_id = ? AND cycle_count = ?
            "#,
        )
        .bind(competition.status.as_str())
        .bind(competition.start_time)
        .bind(competition.end_time)
        .bind(competition.updated_at)
        .bind(competition.failure_reason.as_deref())
        .bind(competition.id())
        .bind(to_i64(competition.cycle_count, "cycle_count")?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_competition(competition.id()).await? {
                Some(stored) => Err(DbError::Conflict(format!(
                    "competition '{}' is at cycle {}, not {}",
                    competition.id(),
                    stored.cycle_count,
                    competition.cycle_count
                ))),
                None => Err(DbError::NotFound(format!("competition '{}'", competition.id()))),
            };
        }
        Ok(())
    }

    pub async fn get_competition(&self, competition_id: &str) -> Result<Option<Competition>, DbError> {
        let row = sqlx::query_as::<_, CompetitionRow>(&format!(
            "SELECT {} FROM competitions WHERE competition_id = ?",
            COMPETITION_COLUMNS
        ))
        .bind(competition_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CompetitionRow::into_competition).transpose()
    }

    /// All competitions, newest first.
    pub async fn list_competitions(&self) -> Result<Vec<CompetitionSummary>, DbError> {
        let rows = sqlx::query_as::<_, CompetitionRow>(&format!(
            "SELECT {} FROM competitions ORDER BY created_at DESC, competition_id ASC",
            COMPETITION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let competition = row.into_competition()?;
                Ok(CompetitionSummary {
                    competition_id: competition.config.id.clone(),
                    name: competition.config.name.clone(),
                    status: competition.status,
                    cycle_count: competition.cycle_count,
                    max_cycles: competition.config.max_cycles,
                    agents: competition.config.agent_names(),
                    created_at: competition.created_at,
                    updated_at: competition.updated_at,
                })
            })
            .collect()
    }

    /// Commits one cycle atomically: decisions, snapshots, the leaderboard, every
    /// agent's ledger and the competition row.
    ///
    /// The competition update is conditional on the stored row being RUNNING with
    /// a `cycle_count` exactly one behind, so a cycle can never be committed twice,
    /// out of order, or over a pause made by another process.
    pub async fn persist_cycle(&self, record: &CycleRecord<'_>) -> Result<(), DbError> {
        let competition = record.competition;
        let competition_id = competition.id();
        let cycle_number = to_i64(competition.cycle_count, "cycle_count")?;
        let previous = cycle_number.checked_sub(1).filter(|p| *p >= 0).ok_or_else(|| {
            DbError::Conflict("a persisted cycle must advance cycle_count".to_string())
        })?;

        let mut tx = self.pool.begin().await?;

        for decision in record.decisions {
            insert_decision(&mut tx, decision).await?;
        }
        for snapshot in record.snapshots {
            insert_snapshot(&mut tx, snapshot).await?;
        }

        sqlx::query(
            "INSERT INTO leaderboard_history (competition_id, cycle_number, leaderboard_json, timestamp) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(competition_id)
        .bind(cycle_number)
        .bind(serde_json::to_string(record.leaderboard)?)
        .bind(record.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::from_write(e, format!("leaderboard for cycle {}", cycle_number)))?;

        for portfolio in record.portfolios {
            sqlx::query(
                r#"
                INSERT INTO agent_state (competition_id, agent_name, cash, trades_count, realized_pnl,
                                         cycle_number, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (competition_id, agent_name) DO UPDATE SET
                    cash = excluded.cash,
                    trades_count = excluded.trades_count,
                    realized_pnl = excluded.realized_pnl,
                    cycle_number = excluded.cycle_number,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(competition_id)
            .bind(&portfolio.agent_name)
            .bind(decimal_text(portfolio.cash))
            .bind(to_i64(portfolio.trades_count, "trades_count")?)
            .bind(decimal_text(portfolio.realized_pnl))
            .bind(cycle_number)
            .bind(record.timestamp)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM agent_positions WHERE competition_id = ? AND agent_name = ?")
                .bind(competition_id)
                .bind(&portfolio.agent_name)
                .execute(&mut *tx)
                .await?;

            for position in portfolio.positions.values().filter(|p| !p.quantity.is_zero()) {
                sqlx::query(
                    "INSERT INTO agent_positions (competition_id, agent_name, symbol, quantity, avg_price) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(competition_id)
                .bind(&portfolio.agent_name)
                .bind(&position.symbol)
                .bind(decimal_text(position.quantity))
                .bind(decimal_text(position.avg_price))
                .execute(&mut *tx)
                .await?;
            }
        }

        let updated = sqlx::query(
            r#"
            UPDATE competitions
            SET status = ?, cycle_count = ?, start_time = ?, end_time = ?, updated_at = ?,
                failure_reason = ?
            WHERE competition_id = ? AND cycle_count = ? AND status = 'RUNNING'
            "#,
        )
        .bind(competition.status.as_str())
        .bind(cycle_number)
        .bind(competition.start_time)
        .bind(competition.end_time)
        .bind(competition.updated_at)
        .bind(competition.failure_reason.as_deref())
        .bind(competition_id)
        .bind(previous)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls everything back.
            return Err(DbError::Conflict(format!(
                "competition '{}' is no longer running at cycle {}",
                competition_id, previous
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Ledger state per agent, including open positions.
    pub async fn load_ledgers(
        &self,
        competition_id: &str,
    ) -> Result<HashMap<String, StoredLedger>, DbError> {
        let states = sqlx::query_as::<_, AgentStateRow>(
            "SELECT agent_name, cash, trades_count, realized_pnl, cycle_number \
             FROM agent_state WHERE competition_id = ?",
        )
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await?;

        let positions = sqlx::query_as::<_, PositionRow>(
            "SELECT agent_name, symbol, quantity, avg_price FROM agent_positions \
             WHERE competition_id = ? ORDER BY agent_name, symbol",
        )
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await?;

        let mut ledgers = HashMap::with_capacity(states.len());
        for state in states {
            ledgers.insert(
                state.agent_name.clone(),
                StoredLedger {
                    agent_name: state.agent_name,
                    cash: parse_decimal(&state.cash, "cash")?,
                    trades_count: to_u64(state.trades_count, "trades_count")?,
                    realized_pnl: parse_decimal(&state.realized_pnl, "realized_pnl")?,
                    cycle_number: to_u64(state.cycle_number, "cycle_number")?,
                    positions: BTreeMap::new(),
                },
            );
        }
        for row in positions {
            let Some(ledger) = ledgers.get_mut(&row.agent_name) else {
                tracing::warn!(
                    competition_id,
                    agent = %row.agent_name,
                    "Position row without agent_state; ignoring"
                );
                continue;
            };
            ledger.positions.insert(
                row.symbol.clone(),
                Position {
                    symbol: row.symbol,
                    quantity: parse_decimal(&row.quantity, "quantity")?,
                    avg_price: parse_decimal(&row.avg_price, "avg_price")?,
                },
            );
        }
        Ok(ledgers)
    }

    /// The most recent snapshot of every agent.
    pub async fn latest_snapshots(
        &self,
        competition_id: &str,
    ) -> Result<Vec<PerformanceSnapshot>, DbError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            SELECT {} FROM snapshots s
            WHERE s.competition_id = ?
              AND s.cycle_number = (
                  SELECT MAX(cycle_number) FROM snapshots
                  WHERE competition_id = s.competition_id AND agent_name = s.agent_name
              )
            ORDER BY s.id ASC
            "#,
            SNAPSHOT_COLUMNS
        ))
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    /// Decisions newest cycle first; agents of a cycle in registration order.
    pub async fn get_decisions(
        &self,
        competition_id: &str,
        filter: &DecisionFilter,
    ) -> Result<Vec<Decision>, DbError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM decisions WHERE competition_id = ",
            DECISION_COLUMNS
        ));
        query.push_bind(competition_id.to_string());
        if let Some(agent_name) = &filter.agent_name {
            query.push(" AND agent_name = ").push_bind(agent_name.clone());
        }
        if let Some(cycle_number) = filter.cycle_number {
            query
                .push(" AND cycle_number = ")
                .push_bind(to_i64(cycle_number, "cycle_number")?);
        }
        query.push(" ORDER BY cycle_number DESC, id ASC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query
            .build_query_as::<DecisionRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(DecisionRow::into_decision).collect()
    }

    /// Snapshots in chronological order, optionally for a single agent.
    pub async fn get_snapshots(
        &self,
        competition_id: &str,
        agent_name: Option<&str>,
    ) -> Result<Vec<PerformanceSnapshot>, DbError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM snapshots WHERE competition_id = ",
            SNAPSHOT_COLUMNS
        ));
        query.push_bind(competition_id.to_string());
        if let Some(agent_name) = agent_name {
            query.push(" AND agent_name = ").push_bind(agent_name.to_string());
        }
        query.push(" ORDER BY cycle_number ASC, id ASC");

        let rows = query
            .build_query_as::<SnapshotRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    pub async fn leaderboard_history(
        &self,
        competition_id: &str,
    ) -> Result<Vec<LeaderboardRecord>, DbError> {
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT cycle_number, leaderboard_json, timestamp FROM leaderboard_history \
             WHERE competition_id = ? ORDER BY cycle_number ASC",
        )
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let entries: Vec<LeaderboardEntry> = serde_json::from_str(&row.leaderboard_json)?;
                Ok(LeaderboardRecord {
                    cycle_number: to_u64(row.cycle_number, "cycle_number")?,
                    entries,
                    timestamp: row.timestamp,
                })
            })
            .collect()
    }

    /// Removes a competition and every dependent row. Returns whether it existed.
    pub async fn delete_competition(&self, competition_id: &str) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "decisions",
            "snapshots",
            "leaderboard_history",
            "agent_positions",
            "agent_state",
            "competition_leases",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE competition_id = ?", table))
                .bind(competition_id)
                .execute(&mut *tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM competitions WHERE competition_id = ?")
            .bind(competition_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// Takes the single-writer lease on a competition.
    ///
    /// Succeeds when there is no lease, the existing one has expired, or it is
    /// already held by `holder` (which extends it).
    pub async fn acquire_lease(
        &self,
        competition_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<(), DbError> {
        let now = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_ms);

        let result = sqlx::query(
            r#"
            INSERT INTO competition_leases (competition_id, holder, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT (competition_id) DO UPDATE SET
                holder = excluded.holder,
                expires_at = excluded.expires_at
            WHERE competition_leases.holder = excluded.holder
               OR competition_leases.expires_at <= ?
            "#,
        )
        .bind(competition_id)
        .bind(holder)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<i64> =
            sqlx::query_scalar("SELECT expires_at FROM competition_leases WHERE competition_id = ?")
                .bind(competition_id)
                .fetch_optional(&self.pool)
                .await?;
        let expires_at = current
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        Err(DbError::LeaseHeld {
            competition_id: competition_id.to_string(),
            expires_at,
        })
    }

    /// Releases the lease if `holder` still owns it.
    pub async fn release_lease(&self, competition_id: &str, holder: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM competition_leases WHERE competition_id = ? AND holder = ?")
            .bind(competition_id)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn insert_decision(
    tx: &mut Transaction<'_, Sqlite>,
    decision: &Decision,
) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO decisions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        DECISION_COLUMNS
    ))
    .bind(&decision.competition_id)
    .bind(&decision.agent_name)
    .bind(to_i64(decision.cycle_number, "cycle_number")?)
    .bind(decision.action.as_str())
    .bind(decision.symbol.as_deref())
    .bind(decimal_text(decision.quantity))
    .bind(decision.confidence)
    .bind(&decision.reasoning)
    .bind(decision.price_at_decision.map(decimal_text))
    .bind(decision.trade_status().as_str())
    .bind(decimal_text(decision.trade_pnl))
    .bind(decimal_text(decision.portfolio_value_before))
    .bind(decimal_text(decision.portfolio_value_after))
    .bind(decision.timestamp)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        DbError::from_write(
            e,
            format!(
                "decision for '{}' in cycle {}",
                decision.agent_name, decision.cycle_number
            ),
        )
    })?;
    Ok(())
}

async fn insert_snapshot(
    tx: &mut Transaction<'_, Sqlite>,
    snapshot: &PerformanceSnapshot,
) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO snapshots ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        SNAPSHOT_COLUMNS
    ))
    .bind(&snapshot.competition_id)
    .bind(&snapshot.agent_name)
    .bind(to_i64(snapshot.cycle_number, "cycle_number")?)
    .bind(decimal_text(snapshot.portfolio_value))
    .bind(decimal_text(snapshot.cash))
    .bind(decimal_text(snapshot.pnl))
    .bind(decimal_text(snapshot.return_pct))
    .bind(i64::from(snapshot.positions_count))
    .bind(to_i64(snapshot.trades_count, "trades_count")?)
    .bind(snapshot.timestamp)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        DbError::from_write(
            e,
            format!(
                "snapshot for '{}' in cycle {}",
                snapshot.agent_name, snapshot.cycle_number
            ),
        )
    })?;
    Ok(())
}
