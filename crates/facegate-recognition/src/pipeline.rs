//! Detector plus embedder, run together on one frame.

use facegate_core::{Embedding, FaceRegion, Frame, Observation};
use facegate_hardware::{FaceDetector, FaceEmbedder, Result};
use tracing::trace;

/// Turns frames into face observations.
#[derive(Debug, Clone)]
pub struct FacePipeline<D, E> {
    detector: D,
    embedder: E,
}

impl<D: FaceDetector, E: FaceEmbedder> FacePipeline<D, E> {
    pub fn new(detector: D, embedder: E) -> Self {
        Self { detector, embedder }
    }

    /// Locate faces without embedding them.
    pub async fn detect(&self, frame: &Frame) -> Result<Vec<FaceRegion>> {
        self.detector.detect(frame).await
    }

    /// Embed the face inside `region`.
    pub async fn embed(&self, frame: &Frame, region: &FaceRegion) -> Result<Embedding> {
        self.embedder.embed(frame, region).await
    }

    /// Detect every face in `frame` and embed each one.
    ///
    /// # Errors
    ///
    /// Fails as a whole if detection or any single embedding fails.
    pub async fn observe(&self, frame: &Frame) -> Result<Vec<Observation>> {
        let regions = self.detector.detect(frame).await?;
        let mut observations = Vec::with_capacity(regions.len());
        for region in regions {
            let embedding = self.embedder.embed(frame, &region).await?;
            observations.push(Observation::new(embedding, region));
        }
        trace!(sequence = frame.sequence, faces = observations.len(), "Frame analysed");
        Ok(observations)
    }
}
