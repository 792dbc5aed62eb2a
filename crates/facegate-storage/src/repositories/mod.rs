//! Persistence seams and their SQLite implementations.
//!
//! The traits are declared with `-> impl Future + Send` so generic callers
//! can run them on spawned Tokio tasks (the lock controller writes audit
//! entries off its own task).

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::models::{EnrollmentRecord, LoadedRecord};

pub mod audit;
pub mod identity;

pub use audit::SqliteAuditLog;
pub use identity::SqliteIdentityRepository;

/// Durable key-value storage for enrolled identities, keyed by name.
pub trait PersistenceStore: Send + Sync + 'static {
    /// Load every stored record in enrollment order.
    ///
    /// Records that cannot be decoded come back as `Err` entries; only a
    /// failure to read the store as a whole is an error.
    fn load(&self) -> impl Future<Output = StorageResult<Vec<LoadedRecord>>> + Send;

    /// Store `record`, replacing any record with the same name in place.
    fn save(&self, record: &EnrollmentRecord) -> impl Future<Output = StorageResult<()>> + Send;

    /// Delete the record named `name`. Returns whether a record existed.
    fn delete(&self, name: &str) -> impl Future<Output = StorageResult<bool>> + Send;
}

/// Append-only trail of confirmed unlocks.
pub trait AuditLog: Send + Sync + 'static {
    /// Record that `name` opened the lock at `opened_at`.
    fn record(
        &self,
        name: &str,
        opened_at: DateTime<Utc>,
    ) -> impl Future<Output = StorageResult<()>> + Send;
}
