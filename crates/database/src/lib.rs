//! # Arena Database Crate
//!
//! Durable state for competitions, backed by SQLite through `sqlx`.
//!
//! ## Architectural Principles
//!
//! - **Authoritative primary:** every cycle is committed to the primary store in
//!   one transaction. A competition can always be rebuilt from it alone.
//! - **Best-effort mirror:** an optional second database receives a reporting
//!   copy for the UI. Its failures are logged and never surface to callers.
//! - **Single writer:** a lease row per competition keeps two processes from
//!   advancing the same competition.
//!
//! ## Public API
//!
//! - `connect` / `connect_in_memory`: open a pool.
//! - `run_migrations` / `run_mirror_migrations`: apply the embedded schemas.
//! - `PersistenceStore`: what the runtime talks to.
//! - `DbRepository` / `MirrorRepository`: the raw SQL behind each store.

pub mod connection;
pub mod error;
pub mod mirror;
pub mod models;
pub mod repository;
mod rows;
pub mod store;

pub use connection::{connect, connect_in_memory, run_migrations, run_mirror_migrations};
pub use error::DbError;
pub use mirror::MirrorRepository;
pub use models::{CompetitionSummary, CycleRecord, DecisionFilter, LeaderboardRecord, StoredLedger};
pub use repository::DbRepository;
pub use store::PersistenceStore;
