//! The recognition loop.
//!
//! A capture task pulls frames from the camera into a bounded queue while
//! the loop itself runs each frame through the face pipeline, the
//! aggregator and finally the lock controller:
//!
//! ```text
//! FrameSource -> [queue] -> FacePipeline -> IdentityAggregator -> LockController
//! ```
//!
//! The queue never grows past its capacity. When analysis falls behind, the
//! oldest queued frames are overwritten and counted as dropped, so the loop
//! always works on the newest frames the camera produced.

use facegate_controller::{ControllerError, LockController};
use facegate_core::Frame;
use facegate_core::constants::DEFAULT_FRAME_QUEUE_CAPACITY;
use facegate_hardware::{FaceDetector, FaceEmbedder, FrameSource, HardwareError};
use facegate_storage::PersistenceStore;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::{AggregatorConfig, IdentityAggregator};
use crate::enrollment::EnrollmentStore;
use crate::error::RecognitionError;
use crate::pipeline::FacePipeline;

/// Recognition loop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub aggregator: AggregatorConfig,

    /// Frames buffered between the camera and the analysis.
    pub frame_queue_capacity: usize,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            aggregator: AggregatorConfig::default(),
            frame_queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY,
        }
    }
}

/// Counters describing a recognition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecognitionStats {
    /// Frames that went through the pipeline and the aggregator.
    pub frames_processed: u64,

    /// Frames overwritten in the queue before they could be analysed.
    pub frames_dropped: u64,

    /// Frames skipped because detection or embedding failed.
    pub frames_failed: u64,

    pub faces_seen: u64,
    pub confirmations: u64,
    pub absence_timeouts: u64,

    /// Sequence number of the last frame taken off the queue.
    pub last_sequence: Option<u64>,
}

/// Drives frames through recognition into the lock controller.
#[derive(Debug)]
pub struct RecognitionLoop {
    config: RecognitionConfig,
    aggregator: IdentityAggregator,
    stats: RecognitionStats,
}

impl RecognitionLoop {
    pub fn new(config: RecognitionConfig) -> Self {
        Self {
            aggregator: IdentityAggregator::new(config.aggregator),
            config,
            stats: RecognitionStats::default(),
        }
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> RecognitionStats {
        self.stats
    }

    /// The aggregator state carried between runs.
    pub fn aggregator(&self) -> &IdentityAggregator {
        &self.aggregator
    }

    /// Run until `cancel` fires or the camera fails.
    ///
    /// Identities are read from `enrollment` on every frame, so enrollments
    /// made while the loop runs take effect immediately. Controller
    /// rejections (the lock already open, a busy queue) are logged and do
    /// not stop the loop; a controller that has shut down does.
    ///
    /// # Errors
    ///
    /// [`RecognitionError::CameraUnavailable`] when `source` fails, and
    /// [`RecognitionError::CaptureTask`] when the capture task panics.
    pub async fn run<S, D, E, P>(
        &mut self,
        source: S,
        pipeline: &FacePipeline<D, E>,
        enrollment: &EnrollmentStore<P>,
        controller: &LockController,
        cancel: &CancellationToken,
    ) -> Result<RecognitionStats, RecognitionError>
    where
        S: FrameSource,
        D: FaceDetector,
        E: FaceEmbedder,
        P: PersistenceStore,
    {
        let (frames_tx, mut frames) = broadcast::channel(self.config.frame_queue_capacity.max(1));
        let capture_cancel = cancel.child_token();
        let mut capture = tokio::spawn(capture_frames(source, frames_tx, capture_cancel.clone()));

        info!(
            identities = enrollment.len(),
            queue_capacity = self.config.frame_queue_capacity,
            "Recognition loop started"
        );

        let outcome = loop {
            let frame = tokio::select! {
                biased;

                _ = cancel.cancelled() => break Ok(()),

                frame = frames.recv() => frame,
            };

            match frame {
                Ok(frame) => {
                    if !self.process(&frame, pipeline, enrollment, controller).await {
                        break Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    self.stats.frames_dropped += skipped;
                    debug!(skipped, "Recognition behind camera, frames dropped");
                }
                Err(RecvError::Closed) => {
                    break match (&mut capture).await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(RecognitionError::CameraUnavailable(e)),
                        Err(e) => Err(RecognitionError::CaptureTask(e.to_string())),
                    };
                }
            }
        };

        if !capture.is_finished() {
            capture_cancel.cancel();
            if let Err(e) = capture.await {
                warn!(error = %e, "Frame capture task failed during shutdown");
            }
        }

        let stats = self.stats;
        match &outcome {
            Ok(()) => info!(
                frames = stats.frames_processed,
                dropped = stats.frames_dropped,
                confirmations = stats.confirmations,
                "Recognition loop stopped"
            ),
            Err(e) => warn!(error = %e, frames = stats.frames_processed, "Recognition loop ended"),
        }
        outcome.map(|()| stats)
    }

    /// Handle one frame. Returns `false` once the controller is gone.
    async fn process<D, E, P>(
        &mut self,
        frame: &Frame,
        pipeline: &FacePipeline<D, E>,
        enrollment: &EnrollmentStore<P>,
        controller: &LockController,
    ) -> bool
    where
        D: FaceDetector,
        E: FaceEmbedder,
        P: PersistenceStore,
    {
        self.stats.last_sequence = Some(frame.sequence);

        let observations = match pipeline.observe(frame).await {
            Ok(observations) => observations,
            Err(e) => {
                self.stats.frames_failed += 1;
                warn!(sequence = frame.sequence, error = %e, "Frame analysis failed, skipping");
                return true;
            }
        };
        self.stats.frames_processed += 1;
        self.stats.faces_seen += observations.len() as u64;

        let identities = enrollment.identities();
        let outcome = self.aggregator.observe(&observations, &identities);

        for name in outcome.confirmed() {
            self.stats.confirmations += 1;
            info!(name = %name, sequence = frame.sequence, "Identity confirmed");
            if !forward(controller.confirm(name).await) {
                return false;
            }
        }

        if outcome.absence_timeout {
            self.stats.absence_timeouts += 1;
            if !forward(controller.absence_timeout().await) {
                return false;
            }
        }
        true
    }
}

/// Log a controller reply. Returns `false` when the controller has shut down.
fn forward<T>(result: facegate_controller::Result<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(ControllerError::ShutDown) => {
            debug!("Lock controller shut down, stopping recognition");
            false
        }
        Err(e) if e.is_redundant() => {
            debug!(reason = %e, "Lock request not applied");
            true
        }
        Err(e) => {
            warn!(error = %e, "Lock request failed");
            true
        }
    }
}

async fn capture_frames<S: FrameSource>(
    mut source: S,
    frames: broadcast::Sender<Frame>,
    cancel: CancellationToken,
) -> Result<(), HardwareError> {
    loop {
        let frame = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Ok(()),

            frame = source.next_frame() => frame?,
        };

        // Only fails once the loop has stopped listening.
        if frames.send(frame).is_err() {
            return Ok(());
        }
    }
}
