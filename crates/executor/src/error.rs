use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Invalid trade quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid market price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: String },

    #[error("Missing market price for symbol: {0}")]
    MissingPrice(String),

    /// The ledger produced a state with negative cash or a negative holding.
    #[error("Portfolio invariant violated for agent '{agent}': {detail}")]
    InvariantViolation { agent: String, detail: String },

    #[error("Order rejected by execution venue: {0}")]
    Rejected(String),
}
