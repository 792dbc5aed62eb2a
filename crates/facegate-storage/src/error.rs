use thiserror::Error;

/// Failures persisting enrolled identities or the unlock audit trail.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A record was refused before it reached the database.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The database file cannot be placed at the configured path.
    #[error("Database path {path}: {reason}")]
    Path { path: String, reason: String },

    /// The backing store refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
