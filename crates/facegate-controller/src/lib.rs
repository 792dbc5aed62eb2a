//! Lock controller for the facegate door controller.
//!
//! [`LockController`] is the only component that decides whether the door
//! is open. It accepts four triggers (confirmed identity, manual open,
//! manual close, absence timeout) plus its own dwell timer, applies them one
//! at a time, and issues exactly one actuator command per applied
//! transition. Rejected triggers issue none.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use facegate_controller::{ControllerConfig, LockController};
//! use facegate_core::{LockCommand, LockState};
//! use facegate_hardware::mock::MockSerialTransport;
//! use facegate_hardware::{ActuatorConfig, ActuatorLink};
//! use facegate_storage::MemoryAuditLog;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (transport, board) = MockSerialTransport::new();
//! let link = Arc::new(ActuatorLink::new(transport, ActuatorConfig::default()));
//! link.try_connect().await.unwrap();
//!
//! let (controller, task) =
//!     LockController::spawn(link, MemoryAuditLog::new(), ControllerConfig::default());
//!
//! controller.confirm("alice").await.unwrap();
//! assert_eq!(controller.state(), LockState::Open);
//! assert!(controller.manual_open().await.is_err());
//!
//! controller.shutdown().await;
//! task.await.unwrap();
//! assert_eq!(board.commands(), vec![LockCommand::Open, LockCommand::Close]);
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod state_machine;

pub use controller::{ControllerConfig, LockController, WriteFailurePolicy};
pub use error::{ControllerError, Result};
pub use state_machine::{LockStateMachine, LockTransition, LockTrigger};
