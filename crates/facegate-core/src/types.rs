use crate::{
    Result,
    constants::{MAX_NAME_LENGTH, WIRE_CLOSE, WIRE_OPEN},
    error::Error,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Fixed-length face signature produced by the embedding capability.
///
/// Embeddings are compared with the Euclidean distance; two embeddings of
/// different dimensionality are never comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap raw embedding values.
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of components.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Check that every component is a finite number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Euclidean distance to another embedding.
    ///
    /// Returns `None` when the dimensions differ.
    ///
    /// # Examples
    ///
    /// ```
    /// use facegate_core::Embedding;
    ///
    /// let a = Embedding::new(vec![0.0, 0.0]);
    /// let b = Embedding::new(vec![3.0, 4.0]);
    /// assert_eq!(a.distance(&b), Some(5.0));
    /// assert_eq!(a.distance(&Embedding::new(vec![1.0])), None);
    /// ```
    #[must_use]
    pub fn distance(&self, other: &Embedding) -> Option<f32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        let sum: f32 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Some(sum.sqrt())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// An enrolled person: a unique name bound to a reference embedding.
///
/// Identities are immutable once created. Re-enrolling a name produces a
/// new `Identity` that replaces the old one in the enrollment index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    name: String,
    embedding: Embedding,
}

impl Identity {
    /// Create a new identity with validation.
    ///
    /// The name is trimmed before validation.
    ///
    /// # Errors
    /// - `Error::InvalidName` if the name is empty, longer than
    ///   `MAX_NAME_LENGTH` characters, or contains control characters.
    /// - `Error::InvalidEmbedding` if the embedding is empty or holds
    ///   non-finite values.
    pub fn new(name: &str, embedding: Embedding) -> Result<Self> {
        let name = validate_name(name)?;

        if embedding.dimension() == 0 {
            return Err(Error::InvalidEmbedding("embedding is empty".to_string()));
        }
        if !embedding.is_finite() {
            return Err(Error::InvalidEmbedding(
                "embedding contains non-finite values".to_string(),
            ));
        }

        Ok(Self { name, embedding })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}-d)", self.name, self.embedding.dimension())
    }
}

/// Normalize and validate an identity name.
///
/// # Errors
/// Returns `Error::InvalidName` if the trimmed name is empty, too long, or
/// contains control characters.
pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(Error::InvalidName("name cannot be empty".to_string()));
    }

    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(Error::InvalidName(format!(
            "name must be at most {MAX_NAME_LENGTH} chars, got {len}"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(Error::InvalidName(
            "name cannot contain control characters".to_string(),
        ));
    }

    Ok(name.to_string())
}

/// Pixel box of a detected face, in `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    #[must_use]
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// A single camera frame.
///
/// Pixel data is reference counted so frames can be fanned out to the
/// recognizer without copying.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic sequence number assigned by the frame source.
    pub sequence: u64,

    pub width: u32,

    pub height: u32,

    /// Raw pixel bytes (layout defined by the frame source).
    pub pixels: Bytes,

    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Create a frame captured now.
    #[must_use]
    pub fn new(sequence: u64, width: u32, height: u32, pixels: Bytes) -> Self {
        Self {
            sequence,
            width,
            height,
            pixels,
            captured_at: Utc::now(),
        }
    }
}

/// One detected face in one frame, ready for matching.
///
/// Observations are produced per face per frame and consumed immediately
/// by the aggregator; they are never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub embedding: Embedding,
    pub region: FaceRegion,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    #[must_use]
    pub fn new(embedding: Embedding, region: FaceRegion) -> Self {
        Self {
            embedding,
            region,
            timestamp: Utc::now(),
        }
    }
}

/// Result of matching one observation against the enrolled identities.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Closest identity under the tolerance, if any.
    pub identity: Option<Arc<Identity>>,

    /// Distance to the closest enrolled embedding (`f32::INFINITY` when
    /// nothing comparable is enrolled).
    pub distance: f32,
}

impl MatchResult {
    #[must_use]
    pub fn unknown(distance: f32) -> Self {
        Self {
            identity: None,
            distance,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.identity.is_some()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.identity.as_deref().map(Identity::name)
    }
}

/// Logical state of the door lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Closed,
    Open,
}

impl LockState {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Actuator command that drives the relay into this state.
    #[must_use]
    pub fn command(&self) -> LockCommand {
        match self {
            Self::Closed => LockCommand::Close,
            Self::Open => LockCommand::Open,
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
        }
    }
}

impl std::str::FromStr for LockState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            other => Err(Error::InvalidLockState(other.to_string())),
        }
    }
}

/// Command sent to the relay actuator.
///
/// The wire protocol is one ASCII byte per command, fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LockCommand {
    Open = WIRE_OPEN,
    Close = WIRE_CLOSE,
}

impl LockCommand {
    /// Serialize to the single-byte wire code.
    ///
    /// # Examples
    ///
    /// ```
    /// use facegate_core::LockCommand;
    ///
    /// assert_eq!(LockCommand::Open.wire_byte(), b'1');
    /// assert_eq!(LockCommand::Close.wire_byte(), b'0');
    /// ```
    #[must_use]
    pub fn wire_byte(&self) -> u8 {
        *self as u8
    }

    /// Parse a wire byte.
    ///
    /// # Errors
    /// Returns `Error::InvalidWireByte` for anything other than `'1'` or `'0'`.
    pub fn from_wire_byte(byte: u8) -> Result<Self> {
        match byte {
            WIRE_OPEN => Ok(Self::Open),
            WIRE_CLOSE => Ok(Self::Close),
            other => Err(Error::InvalidWireByte(other)),
        }
    }

    /// Lock state this command produces.
    #[must_use]
    pub fn target_state(&self) -> LockState {
        match self {
            Self::Open => LockState::Open,
            Self::Close => LockState::Closed,
        }
    }
}

impl fmt::Display for LockCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Close => write!(f, "CLOSE"),
        }
    }
}
