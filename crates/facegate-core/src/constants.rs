//! Default tuning values for the facegate controller.
//!
//! Every configurable component takes a typed config struct whose `Default`
//! is built from the constants below. They match the values the door
//! controller has always shipped with:
//!
//! | Constant | Value | Used by |
//! |----------|-------|---------|
//! | `DEFAULT_TOLERANCE` | 0.40 | identity matching |
//! | `DEFAULT_CONFIRMATION_THRESHOLD` | 3 | debounce before unlock |
//! | `DEFAULT_ABSENCE_THRESHOLD` | 30 | empty calls before auto-lock |
//! | `DEFAULT_DWELL_MS` | 5000 | time the lock stays open |
//! | `DEFAULT_RECONNECT_BACKOFF_MS` | 5000 | serial reconnect delay |
//! | `DEFAULT_SEND_TIMEOUT_MS` | 1000 | bound on a single actuator write |
//!
//! # Usage
//!
//! ```
//! use facegate_core::constants::*;
//! use std::time::Duration;
//!
//! let dwell = Duration::from_millis(DEFAULT_DWELL_MS);
//! assert_eq!(dwell.as_secs(), 5);
//! assert_eq!(WIRE_OPEN, b'1');
//! ```

// ============================================================================
// Recognition
// ============================================================================

/// Maximum embedding distance for a face to count as an enrolled identity.
///
/// Distances are Euclidean. The usual 128-d face embeddings put the same
/// person under 0.6; 0.40 trades some recall for fewer false unlocks.
pub const DEFAULT_TOLERANCE: f32 = 0.40;

/// Number of labeled detections an identity needs before it is confirmed.
///
/// Confirmation fires when the tally strictly exceeds this value, so the
/// default confirms on the 4th detection.
pub const DEFAULT_CONFIRMATION_THRESHOLD: u32 = 3;

/// Number of consecutive empty aggregator calls tolerated before an
/// absence timeout is raised.
///
/// The timeout fires on call `DEFAULT_ABSENCE_THRESHOLD + 1`.
pub const DEFAULT_ABSENCE_THRESHOLD: u32 = 30;

/// Embedding dimensionality produced by the reference embedder.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 128;

/// Frames buffered between the camera and the recognizer.
///
/// When the recognizer falls behind, the oldest buffered frames are dropped.
pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 4;

/// Maximum length of an identity name, in characters.
pub const MAX_NAME_LENGTH: usize = 64;

// ============================================================================
// Lock
// ============================================================================

/// Time the lock stays open after an unlock, in milliseconds.
pub const DEFAULT_DWELL_MS: u64 = 5_000;

/// Capacity of the lock controller request queue.
///
/// Requests beyond this depth are rejected as busy instead of waiting.
pub const DEFAULT_CONTROLLER_QUEUE_CAPACITY: usize = 16;

/// Number of lock transitions kept in the controller history.
pub const MAX_TRANSITION_HISTORY: usize = 100;

// ============================================================================
// Actuator link
// ============================================================================

/// Serial baud rate of the relay board.
pub const DEFAULT_BAUD_RATE: u32 = 9_600;

/// Delay between serial connection attempts, in milliseconds.
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5_000;

/// Upper bound on a single actuator write, in milliseconds.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 1_000;

/// Interval between actuator liveness checks, in milliseconds.
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 5_000;

/// Serial address that asks the transport to pick the only attached port.
pub const AUTO_DETECT_ADDRESS: &str = "auto";

/// Wire byte that energizes the relay (unlock).
pub const WIRE_OPEN: u8 = b'1';

/// Wire byte that releases the relay (lock).
pub const WIRE_CLOSE: u8 = b'0';

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes_are_ascii_digits() {
        assert_eq!(WIRE_OPEN, 0x31);
        assert_eq!(WIRE_CLOSE, 0x30);
    }

    #[test]
    fn test_confirmation_needs_more_than_one_hit() {
        assert!(DEFAULT_CONFIRMATION_THRESHOLD >= 1);
        assert!(DEFAULT_ABSENCE_THRESHOLD > DEFAULT_CONFIRMATION_THRESHOLD);
    }

    #[test]
    fn test_send_timeout_shorter_than_backoff() {
        assert!(DEFAULT_SEND_TIMEOUT_MS < DEFAULT_RECONNECT_BACKOFF_MS);
    }
}
