/// Database layer for Quartermaster
///
/// Manages the SQLite connection pool and embedded migrations for the
/// inventory, settings, user, and activity tables.
use crate::error::{QmError, QmResult};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Pool tuning knobs, defaulted for a single-node deployment
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Open the inventory database, creating file and parents as needed
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> QmResult<SqlitePool> {
    // The data directory may not exist on first boot
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(QmError::Database)?;

    Ok(pool)
}

/// Run migrations, embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> QmResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| QmError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// One-row ping used by the health probes
pub async fn test_connection(pool: &SqlitePool) -> QmResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(QmError::Database)?;

    Ok(())
}

/// In-memory pool with the full migrated schema for unit tests.
///
/// Capped at a single connection because every pooled connection to
/// `:memory:` would otherwise open its own private database.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(":memory:")
        .await
        .expect("in-memory database");

    run_migrations(&pool).await.expect("migrations");
    pool
}
