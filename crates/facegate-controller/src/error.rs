use facegate_core::LockCommand;
use thiserror::Error;

/// Reasons a lock transition was not applied.
///
/// Every variant means the lock state is unchanged and no further actuator
/// command will follow from the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Open requested while the lock is already open.
    #[error("Lock is already open")]
    AlreadyOpen,

    /// Close requested while the lock is already closed.
    #[error("Lock is already closed")]
    AlreadyClosed,

    /// The request queue is full.
    #[error("Lock controller busy, request rejected")]
    Busy,

    /// The controller has shut down.
    #[error("Lock controller shut down")]
    ShutDown,

    /// The actuator did not take the command and the controller is
    /// configured to keep the previous state.
    #[error("Actuator did not accept {command}, state kept")]
    CommandFailed { command: LockCommand },
}

impl ControllerError {
    /// Whether the request was refused because the lock was already in the
    /// requested state.
    pub fn is_redundant(&self) -> bool {
        matches!(self, Self::AlreadyOpen | Self::AlreadyClosed)
    }
}

/// Result type alias for lock controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
