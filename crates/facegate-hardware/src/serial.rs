//! Relay board transport over a real serial port.
//!
//! Blocking `serialport` calls run on Tokio's blocking pool. The open handle
//! is moved into the blocking task for each write and moved back after, so
//! the port never needs a lock of its own.

use std::io::Write;
use std::time::Duration;

use facegate_core::constants::{AUTO_DETECT_ADDRESS, DEFAULT_SEND_TIMEOUT_MS};
use serialport::SerialPort;
use tracing::{debug, info};

use crate::error::{HardwareError, Result};
use crate::traits::{ActuatorPort, SerialTransport};

/// A serial port found on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescription {
    /// Device path, usable as the actuator address.
    pub name: String,

    /// Human-readable port kind (USB, PCI, Bluetooth).
    pub kind: String,
}

/// List the serial ports attached to this machine.
///
/// # Errors
///
/// Returns an error if the operating system refuses to enumerate ports.
pub fn list_ports() -> Result<Vec<PortDescription>> {
    let ports = serialport::available_ports()
        .map_err(|e| HardwareError::other(format!("Failed to enumerate serial ports: {e}")))?;

    Ok(ports
        .into_iter()
        .map(|port| PortDescription {
            kind: match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => match usb.product {
                    Some(product) => format!("USB ({product})"),
                    None => format!("USB {:04x}:{:04x}", usb.vid, usb.pid),
                },
                serialport::SerialPortType::PciPort => "PCI".to_string(),
                serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                serialport::SerialPortType::Unknown => "unknown".to_string(),
            },
            name: port.port_name,
        })
        .collect())
}

/// Resolve `"auto"` to the single attached port. Other addresses pass through.
///
/// # Errors
///
/// Returns [`HardwareError::DeviceUnavailable`] when auto-detection finds
/// zero ports or more than one.
pub fn resolve_address(address: &str) -> Result<String> {
    if address != AUTO_DETECT_ADDRESS {
        return Ok(address.to_string());
    }

    let ports = list_ports()?;
    match ports.as_slice() {
        [only] => {
            debug!(port = %only.name, "Auto-detected actuator port");
            Ok(only.name.clone())
        }
        [] => Err(HardwareError::device_unavailable("no serial ports found")),
        many => Err(HardwareError::device_unavailable(format!(
            "{} serial ports found, set an explicit address ({})",
            many.len(),
            many.iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Serial transport backed by the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SystemSerialTransport {
    io_timeout: Duration,
}

impl SystemSerialTransport {
    /// Create a transport whose ports time out blocking I/O after `io_timeout`.
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }
}

impl Default for SystemSerialTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS))
    }
}

impl SerialTransport for SystemSerialTransport {
    type Port = SystemSerialPort;

    async fn open(&self, address: &str, baud_rate: u32) -> Result<SystemSerialPort> {
        let requested = address.to_string();
        let io_timeout = self.io_timeout;

        let (address, port) = tokio::task::spawn_blocking(move || {
            let address = resolve_address(&requested)?;
            let port = serialport::new(address.as_str(), baud_rate)
                .timeout(io_timeout)
                .open()
                .map_err(|e| HardwareError::connect_failure(&address, e.to_string()))?;
            Ok::<_, HardwareError>((address, port))
        })
        .await
        .map_err(|e| HardwareError::other(format!("Serial open task failed: {e}")))??;

        info!(address = %address, baud_rate, "Serial port opened");
        Ok(SystemSerialPort {
            address,
            inner: Some(port),
        })
    }
}

/// An open serial port to the relay board.
pub struct SystemSerialPort {
    address: String,
    /// `None` only while a write is running on the blocking pool, or after
    /// that write task panicked.
    inner: Option<Box<dyn SerialPort>>,
}

impl std::fmt::Debug for SystemSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSerialPort")
            .field("address", &self.address)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl ActuatorPort for SystemSerialPort {
    async fn write_byte(&mut self, byte: u8) -> Result<()> {
        let mut port = self
            .inner
            .take()
            .ok_or_else(|| HardwareError::disconnected(&self.address))?;

        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = port.write_all(&[byte]).and_then(|()| port.flush());
            (port, result)
        })
        .await
        .map_err(|e| HardwareError::other(format!("Serial write task failed: {e}")))?;

        self.inner = Some(port);
        result.map_err(|e| HardwareError::write_failure(e.to_string()))
    }

    async fn is_alive(&mut self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|port| port.bytes_to_read().is_ok())
    }

    fn address(&self) -> &str {
        &self.address
    }
}
