//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use facegate_controller::LockController;
use facegate_core::LockState;
use facegate_hardware::mock::{MockSerialTransport, ScriptedScene};
use facegate_hardware::serial::{SystemSerialTransport, list_ports};
use facegate_hardware::{ActuatorLink, SerialTransport};
use facegate_recognition::{
    EnrollmentError, EnrollmentStore, FacePipeline, RecognitionLoop, RecognitionStats,
};
use facegate_storage::{
    AuditLog, Database, MemoryAuditLog, PersistenceStore, SqliteAuditLog, SqliteIdentityRepository,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::FacegateConfig;
use crate::console::{Console, spawn_stdin_reader};
use crate::scene::load_scene;

/// Which relay board to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuator {
    Serial,
    /// A simulated board, for running without hardware.
    Mock,
}

/// `facegate run`: recognition over a scripted scene plus the manual console.
///
/// The scene ending reads as a camera disconnect and ends the session with
/// an error after the lock has been closed.
pub async fn run(config: &FacegateConfig, script: &Path, actuator: Actuator) -> Result<()> {
    let scene = load_scene(script)?;
    let db = open_database(config).await?;

    let enrollment = EnrollmentStore::new(
        SqliteIdentityRepository::new(db.pool().clone()),
        config.enrollment_config(),
    );
    let identities = enrollment
        .load_all()
        .await
        .context("Failed to load enrolled identities")?;
    if identities.is_empty() {
        warn!("No identities enrolled, only manual control can open the lock");
    }
    let audit = SqliteAuditLog::new(db.pool().clone());

    let result = match actuator {
        Actuator::Serial => {
            let transport = SystemSerialTransport::new(config.actuator_config().send_timeout);
            serve(transport, config, scene, enrollment, audit).await
        }
        Actuator::Mock => {
            let (transport, _board) = MockSerialTransport::new();
            serve(transport, config, scene, enrollment, audit).await
        }
    };

    db.close().await;
    result
}

async fn serve<T, P, A>(
    transport: T,
    config: &FacegateConfig,
    scene: ScriptedScene,
    enrollment: EnrollmentStore<P>,
    audit: A,
) -> Result<()>
where
    T: SerialTransport,
    P: PersistenceStore,
    A: AuditLog,
{
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let link = Arc::new(ActuatorLink::new(transport, config.actuator_config()));
    let monitor = link.spawn_monitor(cancel.child_token());
    let (controller, controller_task) =
        LockController::spawn(Arc::clone(&link), audit, config.controller_config());

    let console = tokio::spawn({
        let controller = controller.clone();
        let cancel = cancel.clone();
        async move {
            let mut console = Console::new(controller, std::io::stdout());
            if let Err(e) = console.run(spawn_stdin_reader(), &cancel).await {
                warn!(error = %e, "Console stopped");
            }
        }
    });

    let recognition = tokio::spawn({
        let controller = controller.clone();
        let cancel = cancel.clone();
        let recognition_config = config.recognition_config();
        async move {
            let pipeline = FacePipeline::new(scene.vision(), scene.vision());
            let mut recognition = RecognitionLoop::new(recognition_config);
            let outcome = recognition
                .run(scene.camera(), &pipeline, &enrollment, &controller, &cancel)
                .await;
            (outcome, recognition.stats())
        }
    });

    let outcome = recognition.await;

    cancel.cancel();
    controller.shutdown().await;
    if let Err(e) = controller_task.await {
        error!(error = %e, "Lock controller task failed");
    }
    // No-op when the controller already shut the link down.
    link.shutdown().await;
    if let Err(e) = monitor.await {
        error!(error = %e, "Actuator monitor task failed");
    }
    if let Err(e) = console.await {
        error!(error = %e, "Console task failed");
    }

    let (outcome, stats) = outcome.context("Recognition task failed")?;
    print_stats(&stats);
    outcome.context("Recognition stopped")?;
    info!("facegate stopped");
    Ok(())
}

fn print_stats(stats: &RecognitionStats) {
    info!(
        processed = stats.frames_processed,
        dropped = stats.frames_dropped,
        failed = stats.frames_failed,
        faces = stats.faces_seen,
        confirmations = stats.confirmations,
        absence_timeouts = stats.absence_timeouts,
        "Recognition summary"
    );
}

/// `facegate open`: unlock once, wait out the dwell time, relock.
pub async fn open(config: &FacegateConfig, actuator: Actuator) -> Result<()> {
    match actuator {
        Actuator::Serial => {
            let transport = SystemSerialTransport::new(config.actuator_config().send_timeout);
            open_once(transport, config).await
        }
        Actuator::Mock => open_once(MockSerialTransport::new().0, config).await,
    }
}

async fn open_once<T: SerialTransport>(transport: T, config: &FacegateConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let link = Arc::new(ActuatorLink::new(transport, config.actuator_config()));
    println!("Connecting to actuator at {}...", config.actuator.address);
    tokio::select! {
        _ = cancel.cancelled() => {
            link.shutdown().await;
            return Ok(());
        }
        connected = link.connect() => connected.context("Actuator connection aborted")?,
    }

    // Manual opens are not audited.
    let (controller, task) =
        LockController::spawn(Arc::clone(&link), MemoryAuditLog::new(), config.controller_config());
    let result = open_and_wait(&controller, &cancel).await;

    controller.shutdown().await;
    if let Err(e) = task.await {
        error!(error = %e, "Lock controller task failed");
    }
    link.shutdown().await;
    result
}

async fn open_and_wait(controller: &LockController, cancel: &CancellationToken) -> Result<()> {
    let mut states = controller.subscribe();
    controller.manual_open().await.context("Lock did not open")?;
    println!("Lock opened.");

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = states.wait_for(|state| *state == LockState::Closed) => {}
    }
    println!("Lock closed.");
    Ok(())
}

/// `facegate enroll`: enroll one frame of a scripted scene.
pub async fn enroll(
    config: &FacegateConfig,
    name: &str,
    script: &Path,
    frame: usize,
    overwrite: bool,
) -> Result<()> {
    let scene = load_scene(script)?;
    let image = scene
        .frame(frame)
        .with_context(|| format!("Scene has no frame {frame} (it has {})", scene.len()))?;
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());

    let db = open_database(config).await?;
    let store = EnrollmentStore::new(
        SqliteIdentityRepository::new(db.pool().clone()),
        config.enrollment_config(),
    );
    let result = match store.load_all().await {
        Ok(_) if overwrite => store.re_enroll(name, &image, &pipeline).await,
        Ok(_) => store.enroll(name, &image, &pipeline).await,
        Err(e) => Err(e),
    };
    db.close().await;

    match result {
        Ok(identity) => {
            println!(
                "Enrolled '{}' ({} identities enrolled).",
                identity.name(),
                store.len()
            );
            Ok(())
        }
        Err(EnrollmentError::DuplicateName(name)) => {
            bail!("'{name}' is already enrolled, pass --overwrite to replace it")
        }
        Err(e) => Err(e).context("Enrollment failed"),
    }
}

/// `facegate remove`.
pub async fn remove(config: &FacegateConfig, name: &str) -> Result<()> {
    let db = open_database(config).await?;
    let store = EnrollmentStore::new(
        SqliteIdentityRepository::new(db.pool().clone()),
        config.enrollment_config(),
    );
    let result = match store.load_all().await {
        Ok(_) => store.remove(name).await,
        Err(e) => Err(e),
    };
    db.close().await;

    let removed = result.context("Removal failed")?;
    println!("Removed '{}'.", removed.name());
    Ok(())
}

/// `facegate identities`.
pub async fn identities(config: &FacegateConfig) -> Result<()> {
    let db = open_database(config).await?;
    let store = EnrollmentStore::new(
        SqliteIdentityRepository::new(db.pool().clone()),
        config.enrollment_config(),
    );
    let result = store.load_all().await;
    db.close().await;

    let identities = result.context("Failed to load enrolled identities")?;
    if identities.is_empty() {
        println!("No identities enrolled.");
    }
    for identity in identities.iter() {
        println!("{}", identity.name());
    }
    Ok(())
}

/// `facegate audit`: the most recent confirmed unlocks.
pub async fn audit(config: &FacegateConfig, limit: u32) -> Result<()> {
    let db = open_database(config).await?;
    let result = SqliteAuditLog::new(db.pool().clone())
        .recent(i64::from(limit))
        .await;
    db.close().await;

    let entries = result.context("Failed to read audit log")?;
    if entries.is_empty() {
        println!("No unlocks recorded.");
    }
    for entry in entries {
        println!(
            "{}  {}",
            entry.opened_at.format("%Y-%m-%d %H:%M:%S"),
            entry.name
        );
    }
    Ok(())
}

/// `facegate ports`.
pub fn ports() -> Result<()> {
    let ports = list_ports().context("Failed to list serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{:<24} {}", port.name, port.kind);
    }
    Ok(())
}

async fn open_database(config: &FacegateConfig) -> Result<Database> {
    Database::new(config.database_config())
        .await
        .with_context(|| format!("Failed to open database {}", config.storage.database_path))
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            return ctrl_c().await;
        }
    };
    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
