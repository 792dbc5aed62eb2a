//! Serial link to the lock relay board.
//!
//! The relay board understands two bytes: `'1'` energizes the relay and
//! `'0'` releases it. [`ActuatorLink`] keeps at most one open handle to the
//! board and guarantees that:
//!
//! - writes are serialized and each is bounded by the send timeout,
//! - a failed or stalled write drops the handle so the link reports
//!   disconnected and the monitor reconnects,
//! - [`shutdown`](ActuatorLink::shutdown) sends a final CLOSE and releases the
//!   device exactly once, no matter how many times it is called.
//!
//! The link never panics on device errors. Every failure is logged and
//! returned to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use facegate_core::LockCommand;
use facegate_core::constants::{
    AUTO_DETECT_ADDRESS, DEFAULT_BAUD_RATE, DEFAULT_MONITOR_INTERVAL_MS,
    DEFAULT_RECONNECT_BACKOFF_MS, DEFAULT_SEND_TIMEOUT_MS,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{HardwareError, Result};
use crate::traits::{ActuatorPort, SerialTransport};

/// Actuator link configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorConfig {
    /// Serial device path, or `"auto"` to use the single attached port.
    pub address: String,

    /// Serial baud rate.
    pub baud_rate: u32,

    /// Delay between connection attempts.
    pub reconnect_backoff: Duration,

    /// Upper bound on a single write, including waiting for the handle.
    pub send_timeout: Duration,

    /// Interval between liveness checks of an open handle.
    pub monitor_interval: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            address: AUTO_DETECT_ADDRESS.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            reconnect_backoff: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS),
            send_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
            monitor_interval: Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS),
        }
    }
}

/// Owned connection to the relay board.
///
/// All methods take `&self`; share the link behind an [`Arc`].
pub struct ActuatorLink<T: SerialTransport> {
    transport: T,
    config: ActuatorConfig,
    port: Mutex<Option<T::Port>>,
    connected: AtomicBool,
    shut_down: AtomicBool,
    shutdown_token: CancellationToken,
    commands_sent: AtomicU64,
    write_failures: AtomicU64,
}

impl<T: SerialTransport> std::fmt::Debug for ActuatorLink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorLink")
            .field("address", &self.config.address)
            .field("connected", &self.is_connected())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl<T: SerialTransport> ActuatorLink<T> {
    /// Create a disconnected link. Nothing is opened until
    /// [`try_connect`](Self::try_connect) or [`connect`](Self::connect).
    pub fn new(transport: T, config: ActuatorConfig) -> Self {
        Self {
            transport,
            config,
            port: Mutex::new(None),
            connected: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
            commands_sent: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    /// Link configuration.
    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    /// Whether an open handle is currently held.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Number of commands delivered to the device.
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent.load(Ordering::Relaxed)
    }

    /// Number of writes that failed or timed out.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Make a single connection attempt.
    ///
    /// Succeeds immediately when a handle is already held.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the device cannot be opened, or
    /// [`HardwareError::ShutDown`] once the link is shut down.
    pub async fn try_connect(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(HardwareError::ShutDown);
        }
        if self.is_connected() {
            return Ok(());
        }

        let port = self
            .transport
            .open(&self.config.address, self.config.baud_rate)
            .await?;

        let mut guard = self.port.lock().await;
        if self.is_shut_down() {
            port.close().await;
            return Err(HardwareError::ShutDown);
        }
        if guard.is_some() {
            // Lost a race with another connect; keep the handle already installed.
            port.close().await;
            return Ok(());
        }

        info!(
            address = %port.address(),
            baud_rate = self.config.baud_rate,
            "Actuator connected"
        );
        *guard = Some(port);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Connect, retrying every `reconnect_backoff` until a handle is open.
    ///
    /// # Errors
    ///
    /// Only returns [`HardwareError::ShutDown`], when the link is shut down
    /// while waiting.
    pub async fn connect(&self) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match self.try_connect().await {
                Ok(()) => return Ok(()),
                Err(HardwareError::ShutDown) => return Err(HardwareError::ShutDown),
                Err(e) => {
                    warn!(
                        address = %self.config.address,
                        attempt,
                        retry_in_ms = self.config.reconnect_backoff.as_millis() as u64,
                        error = %e,
                        "Actuator connection failed"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown_token.cancelled() => return Err(HardwareError::ShutDown),
                _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
            }
        }
    }

    /// Send one command to the relay board.
    ///
    /// Writes are serialized. A failed or timed-out write drops the handle,
    /// after which the link reports disconnected until reconnected.
    ///
    /// # Errors
    ///
    /// - [`HardwareError::NotConnected`] when no handle is held
    /// - [`HardwareError::WriteFailure`] when the device rejects the write
    /// - [`HardwareError::Timeout`] when the write exceeds `send_timeout`
    /// - [`HardwareError::ShutDown`] after shutdown
    pub async fn send(&self, command: LockCommand) -> Result<()> {
        if self.is_shut_down() {
            warn!(command = %command, "Actuator shut down, command dropped");
            return Err(HardwareError::ShutDown);
        }
        self.write_command(command).await
    }

    async fn write_command(&self, command: LockCommand) -> Result<()> {
        let byte = command.wire_byte();
        let bounded = tokio::time::timeout(self.config.send_timeout, async {
            let mut guard = self.port.lock().await;
            let Some(port) = guard.as_mut() else {
                return Err(HardwareError::NotConnected);
            };
            match port.write_byte(byte).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    if let Some(port) = guard.take() {
                        port.close().await;
                    }
                    self.connected.store(false, Ordering::SeqCst);
                    Err(HardwareError::write_failure(e.to_string()))
                }
            }
        })
        .await;

        let result = match bounded {
            Ok(result) => result,
            Err(_) => {
                self.drop_stalled_port();
                Err(HardwareError::timeout(
                    self.config.send_timeout.as_millis() as u64
                ))
            }
        };

        match &result {
            Ok(()) => {
                self.commands_sent.fetch_add(1, Ordering::Relaxed);
                debug!(command = %command, "Actuator command sent");
            }
            Err(HardwareError::NotConnected) => {
                warn!(command = %command, "Actuator not connected, command dropped");
            }
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(command = %command, error = %e, "Actuator command failed");
            }
        }
        result
    }

    /// Forget a handle whose write never completed.
    fn drop_stalled_port(&self) {
        self.connected.store(false, Ordering::SeqCst);
        match self.port.try_lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(_) => {
                trace!("Actuator handle busy, leaving it for the next failed write");
            }
        }
    }

    /// Spawn the connection monitor.
    ///
    /// The monitor reconnects whenever the link is down and checks the open
    /// handle every `monitor_interval`. It exits when `cancel` fires or the
    /// link shuts down.
    pub fn spawn_monitor(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let link = Arc::clone(self);
        tokio::spawn(async move { link.monitor(cancel).await })
    }

    async fn monitor(&self, cancel: CancellationToken) {
        debug!(
            interval_ms = self.config.monitor_interval.as_millis() as u64,
            "Actuator monitor started"
        );
        loop {
            if self.is_connected() {
                self.check_liveness().await;
            }
            if !self.is_connected() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = self.connect() => {
                        if result.is_err() {
                            break;
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.monitor_interval) => {}
            }
        }
        debug!("Actuator monitor stopped");
    }

    /// Upper bound on a liveness check. Sends wait behind it.
    fn liveness_timeout(&self) -> Duration {
        self.config.send_timeout / 2
    }

    async fn check_liveness(&self) {
        // A write in flight proves nothing either way; check next round.
        let Ok(mut guard) = self.port.try_lock() else {
            return;
        };
        let alive = match guard.as_mut() {
            // A device that cannot answer in time is treated as gone.
            Some(port) => tokio::time::timeout(self.liveness_timeout(), port.is_alive())
                .await
                .unwrap_or(false),
            None => false,
        };
        if !alive {
            if let Some(port) = guard.take() {
                port.close().await;
            }
            self.connected.store(false, Ordering::SeqCst);
            warn!(address = %self.config.address, "Actuator link lost");
        }
    }

    /// Send a final CLOSE and release the device.
    ///
    /// Only the first call does anything; it returns `true`. Later calls
    /// return `false` without touching the device. A failed final CLOSE is
    /// logged, and the device is released anyway.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Actuator already shut down");
            return false;
        }
        self.shutdown_token.cancel();

        if let Err(e) = self.write_command(LockCommand::Close).await {
            warn!(error = %e, "Final CLOSE not delivered");
        }

        let released = tokio::time::timeout(self.config.send_timeout, self.port.lock())
            .await
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(port) = released {
            port.close().await;
        }
        self.connected.store(false, Ordering::SeqCst);

        info!(
            commands_sent = self.commands_sent(),
            write_failures = self.write_failures(),
            "Actuator shut down"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerialTransport;
    use rstest::rstest;

    fn link() -> (
        ActuatorLink<MockSerialTransport>,
        crate::mock::MockSerialHandle,
    ) {
        let (transport, handle) = MockSerialTransport::new();
        (ActuatorLink::new(transport, ActuatorConfig::default()), handle)
    }

    #[test]
    fn test_default_config() {
        let config = ActuatorConfig::default();
        assert_eq!(config.address, "auto");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(config.send_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_new_link_is_disconnected() {
        let (link, handle) = link();
        assert!(!link.is_connected());
        assert!(!link.is_shut_down());
        assert_eq!(handle.open_attempts(), 0);
    }

    #[rstest]
    #[case(LockCommand::Open, b'1')]
    #[case(LockCommand::Close, b'0')]
    #[tokio::test]
    async fn test_send_writes_wire_byte(#[case] command: LockCommand, #[case] byte: u8) {
        let (link, handle) = link();
        link.try_connect().await.unwrap();

        link.send(command).await.unwrap();

        assert_eq!(handle.written(), vec![byte]);
        assert_eq!(link.commands_sent(), 1);
    }

    #[tokio::test]
    async fn test_send_when_disconnected() {
        let (link, handle) = link();

        let result = link.send(LockCommand::Open).await;

        assert!(matches!(result, Err(HardwareError::NotConnected)));
        assert!(handle.written().is_empty());
    }

    #[tokio::test]
    async fn test_try_connect_is_idempotent() {
        let (link, handle) = link();
        link.try_connect().await.unwrap();
        link.try_connect().await.unwrap();

        assert_eq!(handle.open_attempts(), 1);
        assert_eq!(handle.open_ports(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_disconnects() {
        let (link, handle) = link();
        link.try_connect().await.unwrap();
        handle.set_fail_writes(true);

        let result = link.send(LockCommand::Open).await;

        assert!(matches!(result, Err(HardwareError::WriteFailure { .. })));
        assert!(!link.is_connected());
        assert_eq!(link.write_failures(), 1);
        assert_eq!(handle.open_ports(), 0);
    }

    #[tokio::test]
    async fn test_live_handle_survives_liveness_check() {
        let (link, handle) = link();
        link.try_connect().await.unwrap();

        link.check_liveness().await;

        assert!(link.is_connected());
        assert_eq!(handle.open_ports(), 1);
    }

    #[tokio::test]
    async fn test_unplugged_handle_fails_liveness_check() {
        let (link, handle) = link();
        link.try_connect().await.unwrap();
        handle.unplug();

        link.check_liveness().await;

        assert!(!link.is_connected());
        assert_eq!(handle.open_ports(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_liveness_check_does_not_stall_sends() {
        let (link, handle) = link();
        link.try_connect().await.unwrap();
        handle.set_stall_liveness(true);
        let started = tokio::time::Instant::now();

        let ((), sent) = tokio::join!(link.check_liveness(), async {
            tokio::task::yield_now().await;
            link.send(LockCommand::Open).await
        });

        assert!(started.elapsed() < link.config().send_timeout);
        assert!(!matches!(sent, Err(HardwareError::Timeout { .. })));
        assert!(!link.is_connected());
        assert_eq!(handle.open_ports(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_after_shutdown_is_noop() {
        let (link, handle) = link();
        link.try_connect().await.unwrap();

        assert!(link.shutdown().await);
        assert!(!link.shutdown().await);

        assert_eq!(handle.written(), vec![b'0']);
        assert!(matches!(
            link.send(LockCommand::Open).await,
            Err(HardwareError::ShutDown)
        ));
    }
}
