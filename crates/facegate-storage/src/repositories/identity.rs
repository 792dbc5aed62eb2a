use sqlx::SqlitePool;
use tracing::debug;

use super::PersistenceStore;
use crate::error::{StorageError, StorageResult};
use crate::models::{CorruptRecord, EnrollmentRecord, LoadedRecord, decode_embedding, encode_embedding};

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    name: String,
    embedding: Vec<u8>,
    dimension: i64,
}

impl IdentityRow {
    fn into_record(self) -> LoadedRecord {
        let dimension = usize::try_from(self.dimension)
            .map_err(|_| CorruptRecord::new(&self.name, format!("invalid dimension {}", self.dimension)))?;
        match decode_embedding(&self.embedding, dimension) {
            Ok(values) => Ok(EnrollmentRecord::new(self.name, values)),
            Err(reason) => Err(CorruptRecord::new(self.name, reason)),
        }
    }
}

/// SQLite implementation of [`PersistenceStore`].
#[derive(Debug, Clone)]
pub struct SqliteIdentityRepository {
    pool: SqlitePool,
}

impl SqliteIdentityRepository {
    /// Create a new SQLite identity repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored identities, corrupt ones included.
    pub async fn count(&self) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM identities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

impl PersistenceStore for SqliteIdentityRepository {
    async fn load(&self) -> StorageResult<Vec<LoadedRecord>> {
        let rows = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT name, embedding, dimension
            FROM identities
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Loaded identity rows");
        Ok(rows.into_iter().map(IdentityRow::into_record).collect())
    }

    async fn save(&self, record: &EnrollmentRecord) -> StorageResult<()> {
        if record.values.is_empty() {
            return Err(StorageError::InvalidRecord(format!(
                "identity '{}' has an empty embedding",
                record.name
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO identities (name, embedding, dimension)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                embedding = excluded.embedding,
                dimension = excluded.dimension,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&record.name)
        .bind(encode_embedding(&record.values))
        .bind(record.dimension() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM identities WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    async fn setup() -> (Database, SqliteIdentityRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteIdentityRepository::new(db.pool().clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (_db, repo) = setup().await;
        repo.save(&EnrollmentRecord::new("alice", vec![0.1, 0.2]))
            .await
            .unwrap();

        let loaded = repo.load().await.unwrap();

        assert_eq!(loaded, vec![Ok(EnrollmentRecord::new("alice", vec![0.1, 0.2]))]);
    }

    #[tokio::test]
    async fn test_save_overwrites_in_place() {
        let (_db, repo) = setup().await;
        repo.save(&EnrollmentRecord::new("alice", vec![1.0])).await.unwrap();
        repo.save(&EnrollmentRecord::new("bob", vec![2.0])).await.unwrap();
        repo.save(&EnrollmentRecord::new("alice", vec![3.0])).await.unwrap();

        let names: Vec<_> = repo
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(
            names,
            vec![
                EnrollmentRecord::new("alice", vec![3.0]),
                EnrollmentRecord::new("bob", vec![2.0]),
            ]
        );
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_save_rejects_empty_embedding() {
        let (_db, repo) = setup().await;
        let result = repo.save(&EnrollmentRecord::new("alice", vec![])).await;
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_db, repo) = setup().await;
        repo.save(&EnrollmentRecord::new("alice", vec![1.0])).await.unwrap();

        assert!(repo.delete("alice").await.unwrap());
        assert!(!repo.delete("alice").await.unwrap());
        assert!(repo.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_blob_is_reported_corrupt() {
        let (db, repo) = setup().await;
        repo.save(&EnrollmentRecord::new("alice", vec![1.0])).await.unwrap();
        sqlx::query("INSERT INTO identities (name, embedding, dimension) VALUES ('bob', x'0000', 2)")
            .execute(db.pool())
            .await
            .unwrap();

        let loaded = repo.load().await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].is_ok());
        let corrupt = loaded[1].as_ref().unwrap_err();
        assert_eq!(corrupt.key, "bob");
    }

    #[tokio::test]
    async fn test_oversized_dimension_is_reported_corrupt() {
        let (db, repo) = setup().await;
        sqlx::query("INSERT INTO identities (name, embedding, dimension) VALUES ('carol', x'0000000000000000', ?)")
            .bind(i64::MAX)
            .execute(db.pool())
            .await
            .unwrap();

        let loaded = repo.load().await.unwrap();

        assert_eq!(loaded.len(), 1);
        let corrupt = loaded[0].as_ref().unwrap_err();
        assert_eq!(corrupt.key, "carol");
        if cfg!(target_pointer_width = "64") {
            assert_eq!(corrupt.reason, "dimension too large");
        }
    }
}
