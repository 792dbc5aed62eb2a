use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Identity errors
    #[error("Invalid identity name: {0}")]
    InvalidName(String),

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Wire errors
    #[error("Invalid actuator wire byte: 0x{0:02X}")]
    InvalidWireByte(u8),

    #[error("Invalid lock state: {0}")]
    InvalidLockState(String),
}

pub type Result<T> = std::result::Result<T, Error>;
