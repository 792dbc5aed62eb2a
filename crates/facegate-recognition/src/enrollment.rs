//! In-memory index of enrolled identities.
//!
//! Reads are lock-free: [`EnrollmentStore::identities`] hands out the
//! current snapshot, and the recognition loop matches against it without
//! blocking enrollment. Writers (enroll, re-enroll, remove, reload) are
//! serialized and always update persistence before publishing a new
//! snapshot, so the index never holds an identity that was not saved.

use std::sync::Arc;

use arc_swap::ArcSwap;
use facegate_core::constants::DEFAULT_EMBEDDING_DIMENSION;
use facegate_core::{Embedding, Frame, Identity, validate_name};
use facegate_hardware::{FaceDetector, FaceEmbedder};
use facegate_storage::{EnrollmentRecord, PersistenceStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::EnrollmentError;
use crate::pipeline::FacePipeline;

/// Result type alias for enrollment operations.
pub type Result<T> = std::result::Result<T, EnrollmentError>;

/// Enrollment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentConfig {
    /// Dimension every enrolled embedding must have.
    pub embedding_dimension: usize,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// Enrolled identities backed by a [`PersistenceStore`].
pub struct EnrollmentStore<P> {
    persistence: P,
    config: EnrollmentConfig,
    index: ArcSwap<Vec<Arc<Identity>>>,
    writer: Mutex<()>,
}

impl<P> std::fmt::Debug for EnrollmentStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentStore")
            .field("config", &self.config)
            .field("identities", &self.index.load().len())
            .finish_non_exhaustive()
    }
}

impl<P: PersistenceStore> EnrollmentStore<P> {
    /// Create an empty index. Call [`load_all`](Self::load_all) to fill it
    /// from persistence.
    pub fn new(persistence: P, config: EnrollmentConfig) -> Self {
        Self {
            persistence,
            config,
            index: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Current snapshot, in enrollment order.
    pub fn identities(&self) -> Arc<Vec<Arc<Identity>>> {
        self.index.load_full()
    }

    pub fn len(&self) -> usize {
        self.index.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.load().is_empty()
    }

    /// Look up an identity by name.
    pub fn get(&self, name: &str) -> Option<Arc<Identity>> {
        let name = name.trim();
        self.index
            .load()
            .iter()
            .find(|identity| identity.name() == name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Enroll a new identity from a single-face image.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::InvalidName`] for an unusable name
    /// - [`EnrollmentError::DuplicateName`] when the name is taken
    /// - [`EnrollmentError::NoFaceDetected`] / [`EnrollmentError::AmbiguousFace`]
    ///   unless exactly one face is found
    /// - [`EnrollmentError::Persistence`] when saving fails; nothing is added
    pub async fn enroll<D, E>(
        &self,
        name: &str,
        image: &Frame,
        pipeline: &FacePipeline<D, E>,
    ) -> Result<Arc<Identity>>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        let name = validate_name(name)?;
        if self.contains(&name) {
            return Err(EnrollmentError::DuplicateName(name));
        }
        let embedding = self.embed_single_face(image, pipeline).await?;
        self.insert(&name, embedding, false).await
    }

    /// Enroll `name`, replacing any existing identity of that name in place.
    pub async fn re_enroll<D, E>(
        &self,
        name: &str,
        image: &Frame,
        pipeline: &FacePipeline<D, E>,
    ) -> Result<Arc<Identity>>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        let name = validate_name(name)?;
        let embedding = self.embed_single_face(image, pipeline).await?;
        self.insert(&name, embedding, true).await
    }

    async fn embed_single_face<D, E>(
        &self,
        image: &Frame,
        pipeline: &FacePipeline<D, E>,
    ) -> Result<Embedding>
    where
        D: FaceDetector,
        E: FaceEmbedder,
    {
        let regions = pipeline.detect(image).await?;
        match regions.as_slice() {
            [] => Err(EnrollmentError::NoFaceDetected),
            [region] => Ok(pipeline.embed(image, region).await?),
            many => Err(EnrollmentError::AmbiguousFace { faces: many.len() }),
        }
    }

    /// Enroll an already computed embedding.
    ///
    /// With `overwrite` set an existing identity of the same name is
    /// replaced in place; otherwise the name must be free.
    pub async fn insert(
        &self,
        name: &str,
        embedding: Embedding,
        overwrite: bool,
    ) -> Result<Arc<Identity>> {
        let identity = Identity::new(name, embedding)?;
        if identity.embedding().dimension() != self.config.embedding_dimension {
            return Err(facegate_core::Error::DimensionMismatch {
                expected: self.config.embedding_dimension,
                actual: identity.embedding().dimension(),
            }
            .into());
        }

        let _writer = self.writer.lock().await;
        let current = self.index.load_full();
        let existing = current.iter().position(|i| i.name() == identity.name());
        if existing.is_some() && !overwrite {
            return Err(EnrollmentError::DuplicateName(identity.name().to_string()));
        }

        let record = EnrollmentRecord::new(identity.name(), identity.embedding().as_slice().to_vec());
        self.persistence.save(&record).await?;

        let identity = Arc::new(identity);
        let mut next = current.as_ref().clone();
        match existing {
            Some(index) => next[index] = Arc::clone(&identity),
            None => next.push(Arc::clone(&identity)),
        }
        self.index.store(Arc::new(next));

        info!(
            name = %identity.name(),
            replaced = existing.is_some(),
            total = self.len(),
            "Identity enrolled"
        );
        Ok(identity)
    }

    /// Remove an enrolled identity from persistence and from the index.
    ///
    /// # Errors
    ///
    /// [`EnrollmentError::UnknownIdentity`] when no such identity is
    /// enrolled; [`EnrollmentError::Persistence`] when the delete fails, in
    /// which case the index is left unchanged.
    pub async fn remove(&self, name: &str) -> Result<Arc<Identity>> {
        let name = name.trim();
        let _writer = self.writer.lock().await;
        let current = self.index.load_full();
        let Some(position) = current.iter().position(|i| i.name() == name) else {
            return Err(EnrollmentError::UnknownIdentity(name.to_string()));
        };

        if !self.persistence.delete(name).await? {
            warn!(name = %name, "Identity was indexed but not persisted");
        }

        let mut next = current.as_ref().clone();
        let removed = next.remove(position);
        self.index.store(Arc::new(next));

        info!(name = %name, total = self.len(), "Identity removed");
        Ok(removed)
    }

    /// Rebuild the index from persistence.
    ///
    /// Records that are undecodable, carry an invalid name, have the wrong
    /// dimension or non-finite values, or repeat an earlier name are skipped
    /// with a warning. Only a failure to read persistence at all is an error.
    pub async fn load_all(&self) -> Result<Arc<Vec<Arc<Identity>>>> {
        let _writer = self.writer.lock().await;
        let records = self.persistence.load().await?;
        let total = records.len();

        let mut identities: Vec<Arc<Identity>> = Vec::with_capacity(total);
        for record in records {
            let record = match record {
                Ok(record) => record,
                Err(corrupt) => {
                    warn!(key = %corrupt.key, reason = %corrupt.reason, "Skipping corrupt enrollment record");
                    continue;
                }
            };

            if record.dimension() != self.config.embedding_dimension {
                warn!(
                    name = %record.name,
                    dimension = record.dimension(),
                    expected = self.config.embedding_dimension,
                    "Skipping enrollment record with wrong dimension"
                );
                continue;
            }

            let identity = match Identity::new(&record.name, Embedding::new(record.values)) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(name = %record.name, error = %e, "Skipping invalid enrollment record");
                    continue;
                }
            };

            if identities.iter().any(|i| i.name() == identity.name()) {
                warn!(name = %identity.name(), "Skipping duplicate enrollment record");
                continue;
            }
            identities.push(Arc::new(identity));
        }

        let snapshot = Arc::new(identities);
        self.index.store(Arc::clone(&snapshot));
        info!(
            loaded = snapshot.len(),
            skipped = total - snapshot.len(),
            "Enrollment index loaded"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_storage::MemoryPersistence;

    fn store(dimension: usize) -> (EnrollmentStore<MemoryPersistence>, MemoryPersistence) {
        let persistence = MemoryPersistence::new();
        let store = EnrollmentStore::new(
            persistence.clone(),
            EnrollmentConfig {
                embedding_dimension: dimension,
            },
        );
        (store, persistence)
    }

    #[tokio::test]
    async fn test_insert_persists_then_indexes() {
        let (store, persistence) = store(2);

        store
            .insert("alice", Embedding::new(vec![0.1, 0.2]), false)
            .await
            .unwrap();

        assert_eq!(persistence.names(), vec!["alice"]);
        assert!(store.contains("alice"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_dimension() {
        let (store, persistence) = store(3);

        let result = store.insert("alice", Embedding::new(vec![0.1]), false).await;

        assert!(matches!(result, Err(EnrollmentError::InvalidEmbedding(_))));
        assert!(persistence.names().is_empty());
    }

    #[tokio::test]
    async fn test_insert_rejects_non_finite() {
        let (store, _) = store(2);
        let result = store
            .insert("alice", Embedding::new(vec![f32::NAN, 0.0]), false)
            .await;
        assert!(matches!(result, Err(EnrollmentError::InvalidEmbedding(_))));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_index_untouched() {
        let (store, persistence) = store(1);
        persistence.set_fail_saves(true);

        let result = store.insert("alice", Embedding::new(vec![0.5]), false).await;

        assert!(matches!(result, Err(EnrollmentError::Persistence(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_position() {
        let (store, _) = store(1);
        store.insert("alice", Embedding::new(vec![0.1]), false).await.unwrap();
        store.insert("bob", Embedding::new(vec![0.2]), false).await.unwrap();

        store.insert("alice", Embedding::new(vec![0.9]), true).await.unwrap();

        let names: Vec<_> = store.identities().iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(
            store.get("alice").unwrap().embedding(),
            &Embedding::new(vec![0.9])
        );
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_across_writes() {
        let (store, _) = store(1);
        store.insert("alice", Embedding::new(vec![0.1]), false).await.unwrap();

        let snapshot = store.identities();
        store.insert("bob", Embedding::new(vec![0.2]), false).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.identities().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_identity() {
        let (store, persistence) = store(1);
        store.insert("alice", Embedding::new(vec![0.1]), false).await.unwrap();
        persistence.set_fail_deletes(true);

        assert!(store.remove("alice").await.is_err());
        assert!(store.contains("alice"));
    }
}
