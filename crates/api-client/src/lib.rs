//! # Arena API Client
//!
//! Outbound HTTP: the LLM providers that make trading decisions and the market
//! data sources that price them. Everything here sits behind a trait so the
//! engine can run against fakes.

pub mod error;
pub mod llm;
pub mod market;
pub mod responses;
pub mod scripted;

// --- Public API ---
pub use error::ApiError;
pub use llm::{
    AnthropicClient, Completion, DecisionProvider, DecisionRequest, OpenAiCompatClient,
    default_base_url,
};
pub use market::{BinanceTickerClient, MarketDataProvider, StaticPriceFeed, to_exchange_symbol};
pub use scripted::ScriptedProvider;
