//! # Arena Engine
//!
//! The competition runtime: lifecycle state machine, one-cycle-at-a-time
//! execution and the per-process registry of live competitions.
//!
//! A process may be started fresh for every command, so nothing here is the
//! source of truth. Every state change is written to the primary store before
//! it becomes visible in memory, and a registry miss rebuilds the runtime from
//! that store.

pub mod cycle;
pub mod error;
pub mod leaderboard;
pub mod market;
pub mod registry;
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use cycle::{AgentSlot, CycleExecutor, CycleResult};
pub use error::EngineError;
pub use leaderboard::compute_leaderboard;
pub use market::MarketContext;
pub use registry::{Registry, SharedRuntime};
pub use runtime::{CompetitionRuntime, CycleReport, RuntimeServices};
