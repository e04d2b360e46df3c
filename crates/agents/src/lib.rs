//! # Arena Agents
//!
//! Turns an `AgentSpec` into something that can be asked for a decision.
//!
//! ## Architectural Principles
//!
//! - **One parse boundary:** `DecisionResolver` is the only place model text is
//!   interpreted. It yields a tagged `TradeAction` or a parse/validation error.
//! - **Failures are data:** `Agent::decide` never returns an error. Timeouts,
//!   provider errors and unusable answers become a WAIT decision whose reasoning
//!   starts with the failure class, so one agent cannot abort a cycle.
//! - **Extensibility:** adding a provider means a new `ProviderKind`, a client in
//!   `api-client`, and an arm in `HttpProviderFactory`.

pub mod agent;
pub mod error;
pub mod factory;
pub mod prompt;
pub mod resolver;

pub use agent::{Agent, AgentOutcome, FailureClass};
pub use error::AgentError;
pub use factory::{Credentials, HttpProviderFactory, ProviderFactory};
pub use prompt::{PromptContext, render_market_context, system_prompt};
pub use resolver::{AgentDecision, DecisionResolver, TradeAction};
