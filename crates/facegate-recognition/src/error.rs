use facegate_hardware::HardwareError;
use facegate_storage::StorageError;
use thiserror::Error;

/// Errors returned by [`EnrollmentStore`](crate::EnrollmentStore).
///
/// No variant leaves a partial change behind: a failed enrollment adds
/// nothing to the index or to persistence.
#[derive(Debug, Error)]
pub enum EnrollmentError {
    /// The name is empty, too long or contains control characters.
    #[error("Invalid identity name: {0}")]
    InvalidName(String),

    /// The embedder produced an unusable vector.
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// The enrollment image holds no face.
    #[error("No face detected in enrollment image")]
    NoFaceDetected,

    /// The enrollment image holds more than one face.
    #[error("Enrollment image holds {faces} faces, expected exactly one")]
    AmbiguousFace { faces: usize },

    /// The name is already enrolled; use re-enrollment to overwrite.
    #[error("Identity '{0}' is already enrolled")]
    DuplicateName(String),

    /// No identity with this name is enrolled.
    #[error("Identity '{0}' is not enrolled")]
    UnknownIdentity(String),

    /// Face detection or embedding failed.
    #[error("Vision error: {0}")]
    Vision(#[from] HardwareError),

    /// The persistence collaborator failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),
}

impl From<facegate_core::Error> for EnrollmentError {
    fn from(error: facegate_core::Error) -> Self {
        match error {
            facegate_core::Error::InvalidName(reason) => Self::InvalidName(reason),
            other => Self::InvalidEmbedding(other.to_string()),
        }
    }
}

/// Errors that end the recognition loop.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The frame source failed; recognition cannot continue.
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(#[source] HardwareError),

    /// The frame capture task ended abnormally.
    #[error("Frame capture task failed: {0}")]
    CaptureTask(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_name_error_maps_to_invalid_name() {
        let error: EnrollmentError =
            facegate_core::Error::InvalidName("name is empty".to_string()).into();
        assert!(matches!(error, EnrollmentError::InvalidName(_)));
    }

    #[test]
    fn test_core_embedding_error_maps_to_invalid_embedding() {
        let error: EnrollmentError = facegate_core::Error::DimensionMismatch {
            expected: 128,
            actual: 3,
        }
        .into();
        assert!(matches!(error, EnrollmentError::InvalidEmbedding(_)));
    }

    #[test]
    fn test_ambiguous_face_message() {
        let error = EnrollmentError::AmbiguousFace { faces: 2 };
        assert_eq!(
            error.to_string(),
            "Enrollment image holds 2 faces, expected exactly one"
        );
    }
}
