use api_client::ApiError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// The model's text could not be decoded into a decision.
    #[error("Could not parse decision: {0}")]
    Parse(String),

    /// The decision decoded but breaks a rule (unknown symbol, bad quantity, ...).
    #[error("Invalid decision: {0}")]
    Validation(String),

    #[error("Agent '{agent}' is unavailable: {reason}")]
    Unavailable { agent: String, reason: String },

    #[error("Provider error: {0}")]
    Api(#[from] ApiError),
}
