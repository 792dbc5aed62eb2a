//! End-to-end recognition runs over scripted scenes.
//!
//! The Tokio clock is paused: scene frame intervals and the controller's
//! dwell timer advance virtually.

use std::sync::Arc;
use std::time::Duration;

use facegate_controller::{ControllerConfig, LockController};
use facegate_core::{Embedding, LockCommand, LockState};
use facegate_hardware::HardwareError;
use facegate_hardware::mock::{MockSerialHandle, MockSerialTransport, ScriptedScene};
use facegate_hardware::{ActuatorConfig, ActuatorLink};
use facegate_recognition::{
    AggregatorConfig, EnrollmentConfig, EnrollmentStore, FacePipeline, RecognitionConfig,
    RecognitionError, RecognitionLoop,
};
use facegate_storage::{MemoryAuditLog, MemoryPersistence};
use tokio_util::sync::CancellationToken;

struct Door {
    controller: LockController,
    board: MockSerialHandle,
    audit: MemoryAuditLog,
}

async fn door() -> Door {
    let (transport, board) = MockSerialTransport::new();
    let link = Arc::new(ActuatorLink::new(transport, ActuatorConfig::default()));
    link.try_connect().await.unwrap();
    let audit = MemoryAuditLog::new();
    let (controller, _task) = LockController::spawn(link, audit.clone(), ControllerConfig::default());
    Door {
        controller,
        board,
        audit,
    }
}

async fn enrolled_alice() -> EnrollmentStore<MemoryPersistence> {
    let store = EnrollmentStore::new(
        MemoryPersistence::new(),
        EnrollmentConfig {
            embedding_dimension: 2,
        },
    );
    store
        .insert("alice", Embedding::new(vec![0.0, 0.0]), false)
        .await
        .unwrap();
    store
}

/// A face 0.1 away from alice.
fn alice_face() -> Embedding {
    Embedding::new(vec![0.1, 0.0])
}

fn stranger_face() -> Embedding {
    Embedding::new(vec![0.8, 0.6])
}

fn recognition(absence_threshold: u32) -> RecognitionLoop {
    RecognitionLoop::new(RecognitionConfig {
        aggregator: AggregatorConfig {
            tolerance: 0.40,
            confirmation_threshold: 3,
            absence_threshold,
        },
        frame_queue_capacity: 4,
    })
}

#[tokio::test(start_paused = true)]
async fn test_alice_unlocks_once_then_dwell_relocks() {
    let door = door().await;
    let enrollment = enrolled_alice().await;
    let scene = ScriptedScene::new(vec![vec![alice_face()]; 5])
        .with_frame_interval(Duration::from_millis(100));
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());
    let mut recognition = recognition(30);

    let result = recognition
        .run(
            scene.camera(),
            &pipeline,
            &enrollment,
            &door.controller,
            &CancellationToken::new(),
        )
        .await;

    // The scene running out reads as a camera disconnect.
    assert!(matches!(result, Err(RecognitionError::CameraUnavailable(_))));
    let stats = recognition.stats();
    assert_eq!(stats.frames_processed, 5);
    assert_eq!(stats.confirmations, 1);
    assert_eq!(door.controller.state(), LockState::Open);
    assert_eq!(door.board.commands(), vec![LockCommand::Open]);

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(door.controller.state(), LockState::Closed);
    assert_eq!(
        door.board.commands(),
        vec![LockCommand::Open, LockCommand::Close]
    );
    assert_eq!(door.audit.names(), vec!["alice"]);
}

#[tokio::test(start_paused = true)]
async fn test_strangers_never_unlock() {
    let door = door().await;
    let enrollment = enrolled_alice().await;
    let scene = ScriptedScene::new(vec![vec![stranger_face()]; 12])
        .with_frame_interval(Duration::from_millis(100));
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());
    let mut recognition = recognition(30);

    let _ = recognition
        .run(
            scene.camera(),
            &pipeline,
            &enrollment,
            &door.controller,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(recognition.stats().frames_processed, 12);
    assert_eq!(recognition.stats().faces_seen, 12);
    assert_eq!(recognition.stats().confirmations, 0);
    assert!(door.board.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_absence_closes_open_lock() {
    let door = door().await;
    let enrollment = enrolled_alice().await;
    let mut frames = vec![vec![alice_face()]; 4];
    frames.extend(vec![vec![]; 3]);
    let scene = ScriptedScene::new(frames).with_frame_interval(Duration::from_millis(100));
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());
    let mut recognition = recognition(2);

    let _ = recognition
        .run(
            scene.camera(),
            &pipeline,
            &enrollment,
            &door.controller,
            &CancellationToken::new(),
        )
        .await;

    let stats = recognition.stats();
    assert_eq!(stats.absence_timeouts, 1);
    assert_eq!(door.controller.state(), LockState::Closed);
    assert_eq!(
        door.board.commands(),
        vec![LockCommand::Open, LockCommand::Close]
    );

    // The dwell timer was cancelled by the absence close.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(door.board.commands().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_consumer_drops_oldest_frames() {
    let door = door().await;
    let enrollment = enrolled_alice().await;
    let scene = ScriptedScene::new(vec![vec![]; 20]);
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());
    let mut recognition = recognition(100);

    let result = recognition
        .run(
            scene.camera(),
            &pipeline,
            &enrollment,
            &door.controller,
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
    let stats = recognition.stats();
    assert!(stats.frames_processed <= 4);
    assert_eq!(stats.frames_processed + stats.frames_dropped, 20);
    assert_eq!(stats.last_sequence, Some(19));
}

#[tokio::test(start_paused = true)]
async fn test_camera_failure_ends_run() {
    let door = door().await;
    let enrollment = enrolled_alice().await;
    let scene = ScriptedScene::new(vec![vec![], vec![]]);
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());
    let mut recognition = recognition(30);

    let result = recognition
        .run(
            scene.camera(),
            &pipeline,
            &enrollment,
            &door.controller,
            &CancellationToken::new(),
        )
        .await;

    match result {
        Err(RecognitionError::CameraUnavailable(HardwareError::Disconnected { .. })) => {}
        other => panic!("expected camera disconnect, got {other:?}"),
    }
    assert_eq!(recognition.stats().frames_processed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_run() {
    let door = door().await;
    let enrollment = enrolled_alice().await;
    let scene =
        ScriptedScene::new(vec![vec![]; 100]).with_frame_interval(Duration::from_secs(1));
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());
    let mut recognition = recognition(30);
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            cancel.cancel();
        }
    });

    let stats = recognition
        .run(scene.camera(), &pipeline, &enrollment, &door.controller, &cancel)
        .await
        .unwrap();

    assert_eq!(stats.frames_processed, 2);
    assert_eq!(stats.last_sequence, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_failed_frames_are_skipped_not_absent() {
    let door = door().await;
    let enrollment = enrolled_alice().await;
    let scene = ScriptedScene::new(vec![vec![]; 3]).with_frame_interval(Duration::from_millis(10));
    let vision = scene.vision().with_failing_frames([0, 1, 2]);
    let pipeline = FacePipeline::new(vision.clone(), vision);
    let mut recognition = recognition(1);

    let _ = recognition
        .run(
            scene.camera(),
            &pipeline,
            &enrollment,
            &door.controller,
            &CancellationToken::new(),
        )
        .await;

    let stats = recognition.stats();
    assert_eq!(stats.frames_failed, 3);
    assert_eq!(stats.frames_processed, 0);
    assert_eq!(stats.absence_timeouts, 0);
    assert_eq!(recognition.aggregator().absence_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_controller_ends_run() {
    let door = door().await;
    let enrollment = enrolled_alice().await;
    let scene = ScriptedScene::new(vec![vec![alice_face()]; 10])
        .with_frame_interval(Duration::from_millis(100));
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());
    let mut recognition = recognition(30);
    door.controller.shutdown().await;

    let stats = recognition
        .run(
            scene.camera(),
            &pipeline,
            &enrollment,
            &door.controller,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.confirmations, 1);
    assert_eq!(stats.frames_processed, 4);
}

#[tokio::test(start_paused = true)]
async fn test_identities_enrolled_mid_run_are_matched() {
    let door = door().await;
    let enrollment = EnrollmentStore::new(
        MemoryPersistence::new(),
        EnrollmentConfig {
            embedding_dimension: 2,
        },
    );
    let scene = ScriptedScene::new(vec![vec![alice_face()]; 8])
        .with_frame_interval(Duration::from_millis(100));
    let pipeline = FacePipeline::new(scene.vision(), scene.vision());
    let mut recognition = recognition(30);
    let cancel = CancellationToken::new();

    let run = recognition.run(
        scene.camera(),
        &pipeline,
        &enrollment,
        &door.controller,
        &cancel,
    );
    let enroll = async {
        tokio::time::sleep(Duration::from_millis(350)).await;
        enrollment
            .insert("alice", Embedding::new(vec![0.0, 0.0]), false)
            .await
            .unwrap();
    };
    let (_, ()) = tokio::join!(run, enroll);

    assert_eq!(recognition.stats().confirmations, 1);
    assert_eq!(door.board.commands(), vec![LockCommand::Open]);
}
