use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database configuration: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique key already exists, e.g. a second decision for the same agent and cycle.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A conditional write found the row in an unexpected state.
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Competition '{competition_id}' is leased by another process until {expires_at}")]
    LeaseHeld { competition_id: String, expires_at: String },

    /// A stored value could not be decoded back into its domain type.
    #[error("Corrupt value in column '{column}': {detail}")]
    Corrupt { column: &'static str, detail: String },
}

impl DbError {
    /// Converts a write error, recognising unique-constraint violations.
    pub(crate) fn from_write(err: sqlx::Error, what: impl Into<String>) -> Self {
        let is_unique = err
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation());
        if is_unique {
            DbError::Duplicate(what.into())
        } else {
            DbError::QueryError(err)
        }
    }
}
