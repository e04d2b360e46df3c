//! # Arena Executor Crate
//!
//! Portfolio bookkeeping and trade execution for simulated agents.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** `PortfolioLedger` never mutates the portfolio it
//!   is given. It returns the next state inside an `ApplyResult`, and the caller decides
//!   whether to commit it. A cycle can therefore be abandoned at any point without
//!   leaving a half-applied trade behind.
//! - **Execution Abstraction:** The `Executor` trait is the seam to whatever fills an
//!   order. The only implementation is `PaperExecutor`, which fills at the quoted price.
//!
//! ## Public API
//!
//! - `PortfolioLedger`: pure application of trades, valuation and PnL.
//! - `Executor` / `PaperExecutor`: the trade execution collaborator.
//! - `ExecutorError`: the specific error types that can be returned from this crate.

pub mod error;
pub mod exchange;
pub mod portfolio;

pub use error::ExecutorError;
pub use exchange::{Executor, Fill, PaperExecutor};
pub use portfolio::{ApplyResult, PortfolioLedger, TradeInstruction, TradeSide};
