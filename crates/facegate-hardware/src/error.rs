//! Error types for hardware operations.
//!
//! Covers the serial actuator link (connection, writes, timeouts) and the
//! external vision capabilities (camera and face analysis).

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// No device is present (no camera, no serial port).
    #[error("Device unavailable: {device}")]
    DeviceUnavailable { device: String },

    /// Opening the serial device failed.
    #[error("Connection to {address} failed: {message}")]
    ConnectFailure { address: String, message: String },

    /// A write to an open device failed mid-operation.
    #[error("Write failed: {message}")]
    WriteFailure { message: String },

    /// The actuator link currently holds no open handle.
    #[error("Actuator not connected")]
    NotConnected,

    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The link was shut down and accepts no more work.
    #[error("Actuator link shut down")]
    ShutDown,

    /// Face detection or embedding failed for a frame.
    #[error("Face analysis failed: {message}")]
    AnalysisFailed { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    /// Create a new device unavailable error.
    pub fn device_unavailable(device: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
        }
    }

    /// Create a new connection failure error.
    pub fn connect_failure(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailure {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a new write failure error.
    pub fn write_failure(message: impl Into<String>) -> Self {
        Self::WriteFailure {
            message: message.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new face analysis error.
    pub fn analysis(message: impl Into<String>) -> Self {
        Self::AnalysisFailed {
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether retrying the same operation later can succeed.
    ///
    /// Connection-level failures recover once the device comes back;
    /// a shut-down link never does.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ShutDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unavailable_error() {
        let error = HardwareError::device_unavailable("camera 0");
        assert!(matches!(error, HardwareError::DeviceUnavailable { .. }));
        assert_eq!(error.to_string(), "Device unavailable: camera 0");
    }

    #[test]
    fn test_connect_failure_error() {
        let error = HardwareError::connect_failure("/dev/ttyACM0", "permission denied");
        assert_eq!(
            error.to_string(),
            "Connection to /dev/ttyACM0 failed: permission denied"
        );
    }

    #[test]
    fn test_write_failure_error() {
        let error = HardwareError::write_failure("broken pipe");
        assert!(matches!(error, HardwareError::WriteFailure { .. }));
        assert_eq!(error.to_string(), "Write failed: broken pipe");
    }

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(1000);
        assert_eq!(error.to_string(), "Operation timeout after 1000ms");
    }

    #[test]
    fn test_recoverable() {
        assert!(HardwareError::NotConnected.is_recoverable());
        assert!(HardwareError::timeout(10).is_recoverable());
        assert!(!HardwareError::ShutDown.is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let error: HardwareError = io.into();
        assert!(matches!(error, HardwareError::Io(_)));
    }
}
