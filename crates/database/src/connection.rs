use crate::error::DbError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Opens a pool on a SQLite database URL such as `sqlite://data/arena.db`.
///
/// The file and its parent directory are created when missing. WAL mode lets the
/// reporting process read while a cycle is being written.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| DbError::ConnectionConfigError(format!("{}: {}", database_url, e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout)
        .foreign_keys(true);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::ConnectionConfigError(format!(
                    "cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    tracing::debug!(url = %database_url, "Database pool opened");
    Ok(pool)
}

/// A private in-memory database, used by tests and dry runs.
///
/// Pinned to a single connection that never expires: every SQLite
/// `:memory:` connection is its own database.
pub async fn connect_in_memory() -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| DbError::ConnectionConfigError(e.to_string()))?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Applies the schema of the authoritative store.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations/primary").run(pool).await?;
    Ok(())
}

/// Applies the schema of the reporting mirror.
pub async fn run_mirror_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations/mirror").run(pool).await?;
    Ok(())
}
