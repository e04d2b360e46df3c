use crate::error::DbError;
use crate::rows::{decimal_text, to_i64};
use chrono::{DateTime, Utc};
use core_types::{Competition, Decision, LeaderboardEntry, PerformanceSnapshot};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

/// Writes the reporting copy consumed by the UI process. Every row gets a
/// fresh UUID of its own.
#[derive(Debug, Clone)]
pub struct MirrorRepository {
    pool: SqlitePool,
}

impl MirrorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert_competition(&self, competition: &Competition) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO competitions (competition_id, name, status, cycle_count, config_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (competition_id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                cycle_count = excluded.cycle_count,
                config_json = excluded.config_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(competition.id())
        .bind(&competition.config.name)
        .bind(competition.status.as_str())
        .bind(to_i64(competition.cycle_count, "cycle_count")?)
        .bind(serde_json::to_string(&competition.config)?)
        .bind(competition.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_decisions(&self, decisions: &[Decision]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for decision in decisions {
            sqlx::query(
                r#"
                INSERT INTO decisions (id, competition_id, agent_name, cycle_number, action, symbol,
                                       quantity, confidence, reasoning, price_at_decision,
                                       trade_status, trade_pnl, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
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
            .bind(decision.timestamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_snapshots(&self, snapshots: &[PerformanceSnapshot]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for snapshot in snapshots {
            sqlx::query(
                r#"
                INSERT INTO snapshots (id, competition_id, agent_name, cycle_number, portfolio_value,
                                       cash, pnl, return_pct, positions_count, trades_count, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
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
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_leaderboard(
        &self,
        competition_id: &str,
        cycle_number: u64,
        entries: &[LeaderboardEntry],
        timestamp: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO leaderboard_history (id, competition_id, cycle_number, leaderboard_json, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(competition_id)
        .bind(to_i64(cycle_number, "cycle_number")?)
        .bind(serde_json::to_string(entries)?)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_competition(&self, competition_id: &str) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for table in ["decisions", "snapshots", "leaderboard_history", "competitions"] {
            sqlx::query(&format!("DELETE FROM {} WHERE competition_id = ?", table))
                .bind(competition_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Number of decision rows held for a competition.
    pub async fn count_decisions(&self, competition_id: &str) -> Result<i64, DbError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM decisions WHERE competition_id = ?")
            .bind(competition_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
