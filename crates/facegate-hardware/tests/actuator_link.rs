//! Integration tests for the actuator link against the mock relay board.
//!
//! Tests run on a paused Tokio clock, so backoff and timeout waits complete
//! instantly while keeping their ordering.

use std::sync::Arc;
use std::time::Duration;

use facegate_core::LockCommand;
use facegate_hardware::mock::{MockSerialHandle, MockSerialTransport};
use facegate_hardware::{ActuatorConfig, ActuatorLink, HardwareError};
use tokio_util::sync::CancellationToken;

fn config() -> ActuatorConfig {
    ActuatorConfig {
        address: "/dev/ttyMOCK0".to_string(),
        reconnect_backoff: Duration::from_secs(5),
        send_timeout: Duration::from_secs(1),
        monitor_interval: Duration::from_secs(2),
        ..ActuatorConfig::default()
    }
}

fn link() -> (Arc<ActuatorLink<MockSerialTransport>>, MockSerialHandle) {
    let (transport, handle) = MockSerialTransport::new();
    (Arc::new(ActuatorLink::new(transport, config())), handle)
}

#[tokio::test(start_paused = true)]
async fn test_connect_retries_with_backoff() {
    let (link, handle) = link();
    handle.unplug();

    let connecting = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.connect().await }
    });

    // First attempt fails immediately, the next waits out the backoff.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.open_attempts(), 1);
    assert!(!link.is_connected());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.open_attempts(), 2);

    handle.plug();
    connecting.await.unwrap().unwrap();

    assert!(link.is_connected());
    assert_eq!(handle.open_attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_connect() {
    let (link, handle) = link();
    handle.unplug();

    let connecting = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(link.shutdown().await);

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(HardwareError::ShutDown)));
    assert!(handle.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_write_times_out_and_disconnects() {
    let (link, handle) = link();
    link.try_connect().await.unwrap();
    handle.set_stall_writes(true);

    let started = tokio::time::Instant::now();
    let result = link.send(LockCommand::Open).await;

    assert!(matches!(
        result,
        Err(HardwareError::Timeout { duration_ms: 1000 })
    ));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!link.is_connected());
    assert_eq!(handle.open_ports(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_twice_writes_close_once() {
    let (link, handle) = link();
    link.try_connect().await.unwrap();
    link.send(LockCommand::Open).await.unwrap();

    let (first, second) = tokio::join!(link.shutdown(), link.shutdown());

    assert!(first ^ second);
    assert_eq!(handle.commands(), vec![LockCommand::Open, LockCommand::Close]);
    assert_eq!(handle.open_ports(), 0);
    assert!(!link.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_disconnected_is_clean() {
    let (link, handle) = link();

    assert!(link.shutdown().await);

    assert!(handle.written().is_empty());
    assert!(link.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_monitor_reconnects_after_unplug() {
    let (link, handle) = link();
    let cancel = CancellationToken::new();
    let monitor = link.spawn_monitor(cancel.clone());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(link.is_connected());

    handle.unplug();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!link.is_connected());

    handle.plug();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(link.is_connected());

    link.send(LockCommand::Close).await.unwrap();
    assert_eq!(handle.written(), vec![b'0']);

    cancel.cancel();
    monitor.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_on_shutdown() {
    let (link, _handle) = link();
    let monitor = link.spawn_monitor(CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(10)).await;

    link.shutdown().await;

    tokio::time::timeout(Duration::from_secs(10), monitor)
        .await
        .expect("monitor should stop after shutdown")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_then_reconnect() {
    let (link, handle) = link();
    link.try_connect().await.unwrap();

    handle.set_fail_writes(true);
    assert!(link.send(LockCommand::Open).await.is_err());
    assert!(!link.is_connected());

    handle.set_fail_writes(false);
    link.try_connect().await.unwrap();
    link.send(LockCommand::Open).await.unwrap();

    assert_eq!(handle.written(), vec![b'1']);
    assert_eq!(handle.open_attempts(), 2);
}
