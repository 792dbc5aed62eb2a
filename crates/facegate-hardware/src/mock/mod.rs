//! Mock device implementations for testing and development.
//!
//! These devices are controlled programmatically and need no hardware:
//!
//! - [`MockSerialTransport`] plays the relay board. Its
//!   [`MockSerialHandle`] records written bytes and injects failures.
//! - [`ScriptedScene`] plays the camera and the face models from a fixed
//!   list of frames, each carrying the embeddings of the faces in view.

pub mod scene;
pub mod serial;

// Re-export commonly used types
pub use scene::{SceneScript, ScriptedCamera, ScriptedFrame, ScriptedScene, ScriptedVision};
pub use serial::{MockSerialHandle, MockSerialPort, MockSerialTransport};
