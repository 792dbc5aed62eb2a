use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::AuditLog;
use crate::error::StorageResult;
use crate::models::AuditEntry;

/// SQLite implementation of [`AuditLog`].
#[derive(Debug, Clone)]
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    /// Create a new SQLite audit log
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent unlocks, newest first.
    pub async fn recent(&self, limit: i64) -> StorageResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, name, opened_at
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Unlocks attributed to `name`, newest first.
    pub async fn find_by_name(&self, name: &str, limit: i64) -> StorageResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, name, opened_at
            FROM audit_log
            WHERE name = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

impl AuditLog for SqliteAuditLog {
    async fn record(&self, name: &str, opened_at: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query("INSERT INTO audit_log (name, opened_at) VALUES (?, ?)")
            .bind(name)
            .bind(opened_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_record_and_recent() {
        let db = Database::in_memory().await.unwrap();
        let log = SqliteAuditLog::new(db.pool().clone());
        let first = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();

        log.record("alice", first).await.unwrap();
        log.record("bob", second).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].name, "bob");
        assert_eq!(recent[0].opened_at, second);
        assert_eq!(recent[1].name, "alice");

        assert_eq!(log.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let db = Database::in_memory().await.unwrap();
        let log = SqliteAuditLog::new(db.pool().clone());
        log.record("alice", Utc::now()).await.unwrap();
        log.record("bob", Utc::now()).await.unwrap();
        log.record("alice", Utc::now()).await.unwrap();

        let entries = log.find_by_name("alice", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.name == "alice"));
    }
}
