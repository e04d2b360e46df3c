//! # Arena Core Types
//!
//! The shared vocabulary of the competition system: configs, lifecycle states,
//! portfolios, decisions, snapshots and leaderboard rows. This crate has no
//! knowledge of storage, providers or the runtime.

pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{Action, CompetitionStatus, ProviderKind, TradeStatus};
pub use error::CoreError;
pub use structs::{
    AgentSpec, Competition, CompetitionConfig, Decision, LeaderboardEntry, PerformanceSnapshot,
    Portfolio, Position, TokenUsage,
};
