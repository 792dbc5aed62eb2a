use serde::{Deserialize, Serialize};
use std::fmt;

/// A persisted enrollment: an identity name and its reference embedding.
///
/// Records are validated by the enrollment store on load, not here; a
/// record only guarantees that its embedding bytes decoded cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub name: String,
    pub values: Vec<f32>,
}

impl EnrollmentRecord {
    pub fn new(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Number of embedding components.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// A stored record that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptRecord {
    /// Storage key of the record (the identity name when readable).
    pub key: String,

    /// What was wrong with it.
    pub reason: String,
}

impl CorruptRecord {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CorruptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

/// One entry returned by a bulk load. Corrupt entries are reported
/// individually so a single bad record never hides the rest.
pub type LoadedRecord = Result<EnrollmentRecord, CorruptRecord>;

/// Encode embedding values as little-endian `f32` bytes.
pub fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes written by [`encode_embedding`].
///
/// # Errors
///
/// Returns a description of the problem when the byte length does not
/// match `dimension`, or when `dimension` is too large to be a length.
pub fn decode_embedding(bytes: &[u8], dimension: usize) -> Result<Vec<f32>, String> {
    if dimension == 0 {
        return Err("dimension is zero".to_string());
    }
    let expected = dimension
        .checked_mul(4)
        .ok_or_else(|| "dimension too large".to_string())?;
    if bytes.len() != expected {
        return Err(format!(
            "expected {expected} bytes for {dimension} values, found {}",
            bytes.len()
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode_embedding(&[1.0]), 1.0f32.to_le_bytes().to_vec());
        assert_eq!(encode_embedding(&[0.5, -2.0]).len(), 8);
    }

    #[test]
    fn test_decode_restores_values() {
        let values = vec![0.25, -1.5, 3.0];
        let decoded = decode_embedding(&encode_embedding(&values), 3).unwrap();
        assert_eq!(decoded, values);
    }

    #[rstest]
    #[case(&[0u8; 7], 2)]
    #[case(&[0u8; 12], 2)]
    #[case(&[], 1)]
    #[case(&[], 0)]
    #[case(&[0u8; 8], usize::MAX / 2)]
    #[case(&[0u8; 8], usize::MAX)]
    fn test_decode_rejects_bad_length(#[case] bytes: &[u8], #[case] dimension: usize) {
        assert!(decode_embedding(bytes, dimension).is_err());
    }

    #[test]
    fn test_decode_oversized_dimension_reports_reason() {
        let error = decode_embedding(&[0u8; 8], usize::MAX / 2).unwrap_err();
        assert_eq!(error, "dimension too large");
    }

    #[test]
    fn test_corrupt_record_display() {
        let corrupt = CorruptRecord::new("bob", "truncated blob");
        assert_eq!(corrupt.to_string(), "bob: truncated blob");
    }
}
