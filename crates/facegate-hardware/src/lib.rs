//! Hardware abstraction layer for the facegate door controller.
//!
//! This crate owns everything that touches a device:
//!
//! - [`ActuatorLink`]: the serial link to the relay board that drives the
//!   lock. It connects with retry, writes single-byte commands under a
//!   timeout, watches the connection, and shuts down exactly once.
//! - [`traits`]: the seams between the controller and the outside world.
//!   [`SerialTransport`] opens relay ports; [`FrameSource`], [`FaceDetector`]
//!   and [`FaceEmbedder`] stand in for the camera and the face models.
//! - [`serial`] (feature `hardware-serial`): the `serialport`-backed transport.
//! - [`mock`]: scriptable devices for tests and for running without hardware.
//!
//! # Example
//!
//! ```
//! use facegate_core::LockCommand;
//! use facegate_hardware::mock::MockSerialTransport;
//! use facegate_hardware::{ActuatorConfig, ActuatorLink};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> facegate_hardware::Result<()> {
//! let (transport, handle) = MockSerialTransport::new();
//! let link = ActuatorLink::new(transport, ActuatorConfig::default());
//!
//! link.try_connect().await?;
//! link.send(LockCommand::Open).await?;
//! link.shutdown().await;
//!
//! assert_eq!(handle.written(), vec![b'1', b'0']);
//! # Ok(())
//! # }
//! ```

pub mod actuator;
pub mod error;
pub mod mock;
#[cfg(feature = "hardware-serial")]
pub mod serial;
pub mod traits;

// Re-export commonly used types for convenience
pub use actuator::{ActuatorConfig, ActuatorLink};
pub use error::{HardwareError, Result};
pub use traits::{ActuatorPort, FaceDetector, FaceEmbedder, FrameSource, SerialTransport};
