//! Face recognition side of the facegate door controller.
//!
//! - [`IdentityAggregator`] debounces per-frame matches into confirmations
//!   and absence timeouts.
//! - [`EnrollmentStore`] keeps the enrolled identities, backed by a
//!   [`PersistenceStore`](facegate_storage::PersistenceStore).
//! - [`FacePipeline`] runs a detector and an embedder over a frame.
//! - [`RecognitionLoop`] ties them together and drives the
//!   [`LockController`](facegate_controller::LockController).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use facegate_core::{Embedding, Identity, Observation, FaceRegion};
//! use facegate_recognition::{AggregatorConfig, IdentityAggregator};
//!
//! let alice = Arc::new(Identity::new("alice", Embedding::new(vec![0.0, 0.0])).unwrap());
//! let mut aggregator = IdentityAggregator::new(AggregatorConfig::default());
//! let face = [Observation::new(Embedding::new(vec![0.1, 0.0]), FaceRegion::new(0, 10, 10, 0))];
//!
//! let confirmed: Vec<bool> = (0..4)
//!     .map(|_| aggregator.observe(&face, &[Arc::clone(&alice)]).confirmed().count() > 0)
//!     .collect();
//! assert_eq!(confirmed, vec![false, false, false, true]);
//! ```

pub mod aggregator;
pub mod enrollment;
pub mod error;
pub mod pipeline;
pub mod recognition_loop;

pub use aggregator::{
    AggregatorConfig, AggregatorOutcome, FaceLabel, IdentityAggregator, LabeledFace, best_match,
};
pub use enrollment::{EnrollmentConfig, EnrollmentStore};
pub use error::{EnrollmentError, RecognitionError};
pub use pipeline::FacePipeline;
pub use recognition_loop::{RecognitionConfig, RecognitionLoop, RecognitionStats};
