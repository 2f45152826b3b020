/// Append-only activity log
///
/// Every mutating operation in the system leaves exactly one entry
/// here. Entries are never updated or deleted; the dashboard activity
/// feed and the audit trail both read from this table.
use crate::error::{QmError, QmResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

/// Severity/outcome class of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LogType {
    Info,
    Success,
    Warning,
    Error,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Info => "info",
            LogType::Success => "success",
            LogType::Warning => "warning",
            LogType::Error => "error",
        }
    }
}

/// Log entry record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub log_type: LogType,
    /// Short machine-readable code, e.g. `ACCOUNT_GENERATED`
    pub action: String,
    pub message: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Writer/reader over the `logs` table
#[derive(Clone)]
pub struct ActivityLog {
    db: SqlitePool,
}

impl ActivityLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append one entry
    pub async fn append(
        &self,
        log_type: LogType,
        action: &str,
        message: &str,
        user_id: Option<&str>,
    ) -> QmResult<()> {
        let mut conn = self.db.acquire().await?;
        Self::append_on(&mut conn, log_type, action, message, user_id).await
    }

    /// Append one entry on an existing connection, used inside
    /// transactions so the entry commits atomically with the operation
    /// it records.
    pub(crate) async fn append_on(
        conn: &mut SqliteConnection,
        log_type: LogType,
        action: &str,
        message: &str,
        user_id: Option<&str>,
    ) -> QmResult<()> {
        sqlx::query(
            "INSERT INTO logs (log_type, action, message, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(log_type.as_str())
        .bind(action)
        .bind(message)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(QmError::Database)?;

        Ok(())
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: i64) -> QmResult<Vec<LogEntry>> {
        let limit = limit.clamp(1, 500);

        let entries = sqlx::query_as::<_, LogEntry>(
            "SELECT id, log_type, action, message, user_id, created_at
             FROM logs
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(QmError::Database)?;

        Ok(entries)
    }

    /// Entry count, used by the dashboard stats endpoint
    pub async fn count(&self) -> QmResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.db)
            .await
            .map_err(QmError::Database)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_log() -> ActivityLog {
        ActivityLog::new(crate::db::test_pool().await)
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let log = create_test_log().await;

        log.append(
            LogType::Success,
            "ACCOUNT_GENERATED",
            "netflix account for tester",
            Some("user-1"),
        )
        .await
        .unwrap();

        let entries = log.recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].log_type, LogType::Success);
        assert_eq!(entries[0].action, "ACCOUNT_GENERATED");
        assert_eq!(entries[0].user_id.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn test_recent_newest_first() {
        let log = create_test_log().await;

        for i in 0..5 {
            log.append(LogType::Info, "TEST", &format!("entry {}", i), None)
                .await
                .unwrap();
        }

        let entries = log.recent(3).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "entry 4");
        assert_eq!(entries[2].message, "entry 2");
    }

    #[tokio::test]
    async fn test_limit_clamped() {
        let log = create_test_log().await;
        log.append(LogType::Info, "TEST", "entry", None)
            .await
            .unwrap();

        // A non-positive limit still returns something sane
        let entries = log.recent(0).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unknown_log_type_at_schema_level() {
        let log = create_test_log().await;

        let result = sqlx::query("INSERT INTO logs (log_type, action, message, created_at) VALUES ('fatal', 'X', 'y', ?1)")
            .bind(Utc::now())
            .execute(&log.db)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_count() {
        let log = create_test_log().await;
        assert_eq!(log.count().await.unwrap(), 0);
        log.append(LogType::Warning, "X", "y", None).await.unwrap();
        assert_eq!(log.count().await.unwrap(), 1);
    }
}
