//! In-memory stores for tests and for running without a database.
//!
//! Both stores can be told to fail, so callers can exercise their error
//! paths without a broken disk.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::{StorageError, StorageResult};
use crate::models::{CorruptRecord, EnrollmentRecord, LoadedRecord};
use crate::repositories::{AuditLog, PersistenceStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct PersistenceState {
    records: Vec<LoadedRecord>,
    fail_loads: bool,
    fail_saves: bool,
    fail_deletes: bool,
}

/// [`PersistenceStore`] backed by a vector. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    state: Arc<Mutex<PersistenceState>>,
}

impl MemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `records`, in order.
    pub fn with_records(records: impl IntoIterator<Item = EnrollmentRecord>) -> Self {
        let store = Self::new();
        lock(&store.state).records = records.into_iter().map(Ok).collect();
        store
    }

    /// Append a record that will load as corrupt.
    pub fn insert_corrupt(&self, key: impl Into<String>, reason: impl Into<String>) {
        lock(&self.state)
            .records
            .push(Err(CorruptRecord::new(key, reason)));
    }

    /// Make every load fail until cleared.
    pub fn set_fail_loads(&self, fail: bool) {
        lock(&self.state).fail_loads = fail;
    }

    /// Make every save fail until cleared.
    pub fn set_fail_saves(&self, fail: bool) {
        lock(&self.state).fail_saves = fail;
    }

    /// Make every delete fail until cleared.
    pub fn set_fail_deletes(&self, fail: bool) {
        lock(&self.state).fail_deletes = fail;
    }

    /// Readable records currently stored, in order.
    pub fn records(&self) -> Vec<EnrollmentRecord> {
        lock(&self.state)
            .records
            .iter()
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect()
    }

    /// Names of readable records currently stored, in order.
    pub fn names(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.name).collect()
    }
}

impl PersistenceStore for MemoryPersistence {
    async fn load(&self) -> StorageResult<Vec<LoadedRecord>> {
        let state = lock(&self.state);
        if state.fail_loads {
            return Err(StorageError::Unavailable("injected load failure".to_string()));
        }
        Ok(state.records.clone())
    }

    async fn save(&self, record: &EnrollmentRecord) -> StorageResult<()> {
        let mut state = lock(&self.state);
        if state.fail_saves {
            return Err(StorageError::Unavailable("injected save failure".to_string()));
        }
        let position = state
            .records
            .iter()
            .position(|r| matches!(r, Ok(existing) if existing.name == record.name));
        match position {
            Some(index) => state.records[index] = Ok(record.clone()),
            None => state.records.push(Ok(record.clone())),
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        let mut state = lock(&self.state);
        if state.fail_deletes {
            return Err(StorageError::Unavailable("injected delete failure".to_string()));
        }
        let before = state.records.len();
        state
            .records
            .retain(|r| !matches!(r, Ok(record) if record.name == name));
        Ok(state.records.len() < before)
    }
}

#[derive(Debug, Default)]
struct AuditState {
    entries: Vec<(String, DateTime<Utc>)>,
    fail: bool,
}

/// [`AuditLog`] backed by a vector. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    state: Arc<Mutex<AuditState>>,
}

impl MemoryAuditLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail until cleared.
    pub fn set_fail(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    /// Recorded entries, oldest first.
    pub fn entries(&self) -> Vec<(String, DateTime<Utc>)> {
        lock(&self.state).entries.clone()
    }

    /// Recorded names, oldest first.
    pub fn names(&self) -> Vec<String> {
        lock(&self.state)
            .entries
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl AuditLog for MemoryAuditLog {
    async fn record(&self, name: &str, opened_at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = lock(&self.state);
        if state.fail {
            return Err(StorageError::Unavailable("injected audit failure".to_string()));
        }
        state.entries.push((name.to_string(), opened_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_replaces_in_place() {
        let store = MemoryPersistence::with_records([
            EnrollmentRecord::new("alice", vec![1.0]),
            EnrollmentRecord::new("bob", vec![2.0]),
        ]);

        store
            .save(&EnrollmentRecord::new("alice", vec![9.0]))
            .await
            .unwrap();

        assert_eq!(
            store.records(),
            vec![
                EnrollmentRecord::new("alice", vec![9.0]),
                EnrollmentRecord::new("bob", vec![2.0]),
            ]
        );
    }

    #[tokio::test]
    async fn test_corrupt_records_survive_load() {
        let store = MemoryPersistence::with_records([EnrollmentRecord::new("alice", vec![1.0])]);
        store.insert_corrupt("ghost", "bad bytes");

        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(loaded[1].is_err());
        assert_eq!(store.names(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryPersistence::new();
        store.set_fail_saves(true);
        assert!(store.save(&EnrollmentRecord::new("a", vec![1.0])).await.is_err());

        store.set_fail_saves(false);
        store.save(&EnrollmentRecord::new("a", vec![1.0])).await.unwrap();

        store.set_fail_deletes(true);
        assert!(store.delete("a").await.is_err());
        assert_eq!(store.names(), vec!["a"]);

        store.set_fail_loads(true);
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_audit_log_records_in_order() {
        let log = MemoryAuditLog::new();
        log.record("alice", Utc::now()).await.unwrap();
        log.record("bob", Utc::now()).await.unwrap();

        assert_eq!(log.names(), vec!["alice", "bob"]);

        log.set_fail(true);
        assert!(log.record("carol", Utc::now()).await.is_err());
        assert_eq!(log.entries().len(), 2);
    }
}
