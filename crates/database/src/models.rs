use chrono::{DateTime, Utc};
use core_types::{
    Competition, CompetitionStatus, Decision, LeaderboardEntry, PerformanceSnapshot, Portfolio,
    Position,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything one cycle writes, committed in a single primary transaction.
#[derive(Debug, Clone, Copy)]
pub struct CycleRecord<'a> {
    /// The competition as it will be after the cycle (`cycle_count` already advanced).
    pub competition: &'a Competition,
    pub decisions: &'a [Decision],
    pub snapshots: &'a [PerformanceSnapshot],
    pub leaderboard: &'a [LeaderboardEntry],
    pub portfolios: &'a [Portfolio],
    pub timestamp: DateTime<Utc>,
}

/// Ledger state of one agent as of its last persisted cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLedger {
    pub agent_name: String,
    pub cash: Decimal,
    pub trades_count: u64,
    pub realized_pnl: Decimal,
    pub cycle_number: u64,
    pub positions: BTreeMap<String, Position>,
}

impl StoredLedger {
    pub fn into_portfolio(self, initial_capital: Decimal) -> Portfolio {
        Portfolio {
            agent_name: self.agent_name,
            initial_capital,
            cash: self.cash,
            positions: self.positions,
            trades_count: self.trades_count,
            realized_pnl: self.realized_pnl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionSummary {
    pub competition_id: String,
    pub name: String,
    pub status: CompetitionStatus,
    pub cycle_count: u64,
    pub max_cycles: Option<u64>,
    pub agents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    pub cycle_number: u64,
    pub entries: Vec<LeaderboardEntry>,
    pub timestamp: DateTime<Utc>,
}

/// Optional narrowing for decision queries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DecisionFilter {
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub cycle_number: Option<u64>,
    #[serde(default)]
    pub limit: Option<u32>,
}
