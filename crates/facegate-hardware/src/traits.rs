//! Hardware trait definitions.
//!
//! Two seams live here. The serial seam ([`SerialTransport`] and
//! [`ActuatorPort`]) sits under the [`ActuatorLink`](crate::ActuatorLink)
//! so the relay board can be swapped for a scripted port in tests. The
//! vision seam ([`FrameSource`], [`FaceDetector`], [`FaceEmbedder`]) stands in
//! for the camera and the face analysis models, which are external
//! capabilities this workspace does not implement.
//!
//! Methods are declared as `fn .. -> impl Future + Send` so generic callers
//! can move the futures onto spawned Tokio tasks. Implementations are free
//! to write them as plain `async fn`.

use facegate_core::{Embedding, FaceRegion, Frame};
use std::future::Future;

use crate::error::Result;

/// An open handle to the relay board.
///
/// The handle is owned by the actuator link and only ever used by one task
/// at a time. Dropping it releases the underlying device.
pub trait ActuatorPort: Send + 'static {
    /// Write a single command byte and flush it to the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the write or has gone away.
    fn write_byte(&mut self, byte: u8) -> impl Future<Output = Result<()>> + Send;

    /// Cheap liveness check used by the connection monitor.
    fn is_alive(&mut self) -> impl Future<Output = bool> + Send;

    /// Device address this handle was opened on.
    fn address(&self) -> &str;

    /// Release the device.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized,
    {
        async move { drop(self) }
    }
}

/// Opens serial handles to the relay board.
pub trait SerialTransport: Send + Sync + 'static {
    /// Handle type produced by [`open`](Self::open).
    type Port: ActuatorPort;

    /// Open the device at `address` with the given baud rate.
    ///
    /// The address [`AUTO_DETECT_ADDRESS`](facegate_core::constants::AUTO_DETECT_ADDRESS)
    /// asks the transport to pick the single attached port.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::DeviceUnavailable`](crate::HardwareError::DeviceUnavailable)
    /// when no device can be found, or
    /// [`HardwareError::ConnectFailure`](crate::HardwareError::ConnectFailure)
    /// when opening it fails.
    fn open(
        &self,
        address: &str,
        baud_rate: u32,
    ) -> impl Future<Output = Result<Self::Port>> + Send;
}

/// A camera delivering frames in capture order.
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the camera is unavailable or disconnected. The
    /// recognition loop treats this as fatal.
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame>> + Send;
}

/// Locates faces in a frame.
pub trait FaceDetector: Send + Sync + 'static {
    /// Return one region per face found in `frame`, possibly none.
    fn detect(&self, frame: &Frame) -> impl Future<Output = Result<Vec<FaceRegion>>> + Send;
}

/// Computes a fixed-length embedding for a face region.
pub trait FaceEmbedder: Send + Sync + 'static {
    /// Compute the embedding of the face inside `region`.
    fn embed(
        &self,
        frame: &Frame,
        region: &FaceRegion,
    ) -> impl Future<Output = Result<Embedding>> + Send;
}
