//! Row shapes as stored, and their decoding into domain types.

use crate::error::DbError;
use chrono::{DateTime, Utc};
use core_types::{
    Action, Competition, CompetitionConfig, CompetitionStatus, Decision, PerformanceSnapshot,
    TradeStatus,
};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::str::FromStr;

pub(crate) fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn parse_decimal(value: &str, column: &'static str) -> Result<Decimal, DbError> {
    Decimal::from_str(value).map_err(|e| DbError::Corrupt {
        column,
        detail: format!("'{}': {}", value, e),
    })
}

pub(crate) fn to_i64(value: u64, column: &'static str) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::Corrupt {
        column,
        detail: format!("{} does not fit in INTEGER", value),
    })
}

pub(crate) fn to_u64(value: i64, column: &'static str) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::Corrupt {
        column,
        detail: format!("negative value {}", value),
    })
}

#[derive(Debug, FromRow)]
pub(crate) struct CompetitionRow {
    pub competition_id: String,
    pub config_json: String,
    pub status: String,
    pub cycle_count: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

impl CompetitionRow {
    pub fn into_competition(self) -> Result<Competition, DbError> {
        let mut config: CompetitionConfig = serde_json::from_str(&self.config_json)?;
        // The row key wins over whatever the JSON carries.
        config.id = self.competition_id;
        let status = CompetitionStatus::from_str(&self.status).map_err(|e| DbError::Corrupt {
            column: "status",
            detail: e.to_string(),
        })?;
        Ok(Competition {
            config,
            status,
            cycle_count: to_u64(self.cycle_count, "cycle_count")?,
            start_time: self.start_time,
            end_time: self.end_time,
            created_at: self.created_at,
            updated_at: self.updated_at,
            failure_reason: self.failure_reason,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct DecisionRow {
    pub competition_id: String,
    pub agent_name: String,
    pub cycle_number: i64,
    pub action: String,
    pub symbol: Option<String>,
    pub quantity: String,
    pub confidence: f64,
    pub reasoning: String,
    pub price_at_decision: Option<String>,
    pub trade_status: String,
    pub trade_pnl: String,
    pub portfolio_value_before: String,
    pub portfolio_value_after: String,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRow {
    pub fn into_decision(self) -> Result<Decision, DbError> {
        let action = Action::from_str(&self.action).map_err(|e| DbError::Corrupt {
            column: "action",
            detail: e.to_string(),
        })?;
        let trade_status =
            TradeStatus::from_str(&self.trade_status).map_err(|e| DbError::Corrupt {
                column: "trade_status",
                detail: e.to_string(),
            })?;
        Ok(Decision {
            competition_id: self.competition_id,
            agent_name: self.agent_name,
            cycle_number: to_u64(self.cycle_number, "cycle_number")?,
            action,
            symbol: self.symbol,
            quantity: parse_decimal(&self.quantity, "quantity")?,
            confidence: self.confidence,
            reasoning: self.reasoning,
            trade_executed: trade_status == TradeStatus::Executed,
            price_at_decision: self
                .price_at_decision
                .as_deref()
                .map(|p| parse_decimal(p, "price_at_decision"))
                .transpose()?,
            trade_pnl: parse_decimal(&self.trade_pnl, "trade_pnl")?,
            portfolio_value_before: parse_decimal(
                &self.portfolio_value_before,
                "portfolio_value_before",
            )?,
            portfolio_value_after: parse_decimal(
                &self.portfolio_value_after,
                "portfolio_value_after",
            )?,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SnapshotRow {
    pub competition_id: String,
    pub agent_name: String,
    pub cycle_number: i64,
    pub portfolio_value: String,
    pub cash: String,
    pub pnl: String,
    pub return_pct: String,
    pub positions_count: i64,
    pub trades_count: i64,
    pub timestamp: DateTime<Utc>,
}

impl SnapshotRow {
    pub fn into_snapshot(self) -> Result<PerformanceSnapshot, DbError> {
        Ok(PerformanceSnapshot {
            competition_id: self.competition_id,
            agent_name: self.agent_name,
            cycle_number: to_u64(self.cycle_number, "cycle_number")?,
            portfolio_value: parse_decimal(&self.portfolio_value, "portfolio_value")?,
            cash: parse_decimal(&self.cash, "cash")?,
            pnl: parse_decimal(&self.pnl, "pnl")?,
            return_pct: parse_decimal(&self.return_pct, "return_pct")?,
            positions_count: u32::try_from(self.positions_count).map_err(|_| {
                DbError::Corrupt {
                    column: "positions_count",
                    detail: self.positions_count.to_string(),
                }
            })?,
            trades_count: to_u64(self.trades_count, "trades_count")?,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct AgentStateRow {
    pub agent_name: String,
    pub cash: String,
    pub trades_count: i64,
    pub realized_pnl: String,
    pub cycle_number: i64,
}

#[derive(Debug, FromRow)]
pub(crate) struct PositionRow {
    pub agent_name: String,
    pub symbol: String,
    pub quantity: String,
    pub avg_price: String,
}

#[derive(Debug, FromRow)]
pub(crate) struct LeaderboardRow {
    pub cycle_number: i64,
    pub leaderboard_json: String,
    pub timestamp: DateTime<Utc>,
}
