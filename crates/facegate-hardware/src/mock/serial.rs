//! Mock relay board for testing the actuator link.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use facegate_core::LockCommand;

use crate::error::{HardwareError, Result};
use crate::traits::{ActuatorPort, SerialTransport};

#[derive(Debug)]
struct BoardState {
    available: bool,
    fail_writes: bool,
    stall_writes: bool,
    stall_liveness: bool,
    /// Bumped on unplug so handles opened before report dead.
    generation: u64,
    written: Vec<u8>,
    open_attempts: u32,
    open_ports: u32,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            available: true,
            fail_writes: false,
            stall_writes: false,
            stall_liveness: false,
            generation: 0,
            written: Vec::new(),
            open_attempts: 0,
            open_ports: 0,
        }
    }
}

fn lock(state: &Mutex<BoardState>) -> MutexGuard<'_, BoardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock serial transport simulating the relay board.
///
/// # Examples
///
/// ```
/// use facegate_hardware::mock::MockSerialTransport;
/// use facegate_hardware::traits::{ActuatorPort, SerialTransport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> facegate_hardware::Result<()> {
/// let (transport, handle) = MockSerialTransport::new();
///
/// let mut port = transport.open("/dev/ttyMOCK0", 9600).await?;
/// port.write_byte(b'1').await?;
///
/// assert_eq!(handle.written(), vec![b'1']);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockSerialTransport {
    state: Arc<Mutex<BoardState>>,
    device_path: String,
}

/// Control handle for a [`MockSerialTransport`].
#[derive(Debug, Clone)]
pub struct MockSerialHandle {
    state: Arc<Mutex<BoardState>>,
}

/// Open handle produced by [`MockSerialTransport`].
#[derive(Debug)]
pub struct MockSerialPort {
    state: Arc<Mutex<BoardState>>,
    address: String,
    generation: u64,
}

impl MockSerialTransport {
    /// Create a transport with the board plugged in.
    pub fn new() -> (Self, MockSerialHandle) {
        Self::with_device_path("/dev/ttyMOCK0")
    }

    /// Create a transport whose board appears at `device_path` when the
    /// address `"auto"` is requested.
    pub fn with_device_path(device_path: impl Into<String>) -> (Self, MockSerialHandle) {
        let state = Arc::new(Mutex::new(BoardState::default()));
        let transport = Self {
            state: Arc::clone(&state),
            device_path: device_path.into(),
        };
        (transport, MockSerialHandle { state })
    }
}

impl SerialTransport for MockSerialTransport {
    type Port = MockSerialPort;

    async fn open(&self, address: &str, _baud_rate: u32) -> Result<MockSerialPort> {
        let mut state = lock(&self.state);
        state.open_attempts += 1;
        if !state.available {
            return Err(HardwareError::device_unavailable(address));
        }
        state.open_ports += 1;

        let address = if address == facegate_core::constants::AUTO_DETECT_ADDRESS {
            self.device_path.clone()
        } else {
            address.to_string()
        };
        Ok(MockSerialPort {
            state: Arc::clone(&self.state),
            address,
            generation: state.generation,
        })
    }
}

impl ActuatorPort for MockSerialPort {
    async fn write_byte(&mut self, byte: u8) -> Result<()> {
        let stall = {
            let mut state = lock(&self.state);
            if state.generation != self.generation || !state.available {
                return Err(HardwareError::disconnected(&self.address));
            }
            if state.fail_writes {
                return Err(HardwareError::write_failure("injected write failure"));
            }
            if !state.stall_writes {
                state.written.push(byte);
            }
            state.stall_writes
        };
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn is_alive(&mut self) -> bool {
        let (alive, stall) = {
            let state = lock(&self.state);
            (
                state.available && state.generation == self.generation,
                state.stall_liveness,
            )
        };
        if stall {
            std::future::pending::<()>().await;
        }
        alive
    }

    fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for MockSerialPort {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.open_ports = state.open_ports.saturating_sub(1);
    }
}

impl MockSerialHandle {
    /// Reattach the board; new connection attempts succeed again.
    pub fn plug(&self) {
        lock(&self.state).available = true;
    }

    /// Detach the board. Open handles go dead and connection attempts fail.
    pub fn unplug(&self) {
        let mut state = lock(&self.state);
        state.available = false;
        state.generation += 1;
    }

    /// Make every write fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Make every write hang until cleared.
    pub fn set_stall_writes(&self, stall: bool) {
        lock(&self.state).stall_writes = stall;
    }

    /// Make every liveness check hang until cleared.
    pub fn set_stall_liveness(&self, stall: bool) {
        lock(&self.state).stall_liveness = stall;
    }

    /// Bytes the board has received, in order.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Received bytes decoded as lock commands. Unknown bytes are skipped.
    pub fn commands(&self) -> Vec<LockCommand> {
        lock(&self.state)
            .written
            .iter()
            .filter_map(|&b| LockCommand::from_wire_byte(b).ok())
            .collect()
    }

    /// Number of times the transport was asked to open the board.
    pub fn open_attempts(&self) -> u32 {
        lock(&self.state).open_attempts
    }

    /// Number of handles currently open.
    pub fn open_ports(&self) -> u32 {
        lock(&self.state).open_ports
    }
}
