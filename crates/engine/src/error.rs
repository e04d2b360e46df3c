use api_client::ApiError;
use core_types::{CompetitionStatus, CoreError};
use database::DbError;
use executor::ExecutorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid competition config: {0}")]
    InvalidConfig(#[from] CoreError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Competition '{0}' not found")]
    NotFound(String),

    #[error("Cannot {action} a competition that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: CompetitionStatus,
    },

    #[error("Agents could not be initialized: {}", .0.join("; "))]
    AgentsUnavailable(Vec<String>),

    #[error("Market data unavailable for {symbol}: {source}")]
    MarketData { symbol: String, source: ApiError },

    #[error("Ledger error: {0}")]
    Ledger(#[from] ExecutorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl EngineError {
    /// The `error_kind` reported to callers of the command surface.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Configuration(_)
            | EngineError::InvalidConfig(_)
            | EngineError::AgentsUnavailable(_) => "config_error",
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) | EngineError::Database(DbError::NotFound(_)) => "not_found",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::MarketData { .. } => "market_data_error",
            EngineError::Ledger(_) => "ledger_error",
            EngineError::Database(DbError::LeaseHeld { .. }) => "lease_held",
            EngineError::Database(_) => "persistence_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_taxonomy() {
        assert_eq!(EngineError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            EngineError::InvalidConfig(CoreError::InvalidConfig("no agents".into())).kind(),
            "config_error"
        );
        assert_eq!(
            EngineError::Database(DbError::Conflict("stale".into())).kind(),
            "persistence_error"
        );
        assert_eq!(
            EngineError::Database(DbError::LeaseHeld {
                competition_id: "c".into(),
                expires_at: "later".into(),
            })
            .kind(),
            "lease_held"
        );
        assert_eq!(
            EngineError::InvalidTransition { action: "stop", status: CompetitionStatus::Paused }
                .to_string(),
            "Cannot stop a competition that is PAUSED"
        );
    }
}
