//! Scripted camera and face models.
//!
//! A scene is a list of frames, each holding the embeddings of the faces
//! visible in it. [`ScriptedCamera`] replays the frames in order and
//! [`ScriptedVision`] answers detection and embedding queries for them by
//! frame sequence number. Both are cut from the same [`ScriptedScene`], so
//! the camera and the models always agree on what is in view.
//!
//! Scenes can be loaded from JSON:
//!
//! ```json
//! { "frame_interval_ms": 100, "frames": [ { "faces": [[0.1, 0.2]] }, { "faces": [] } ] }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use facegate_core::{Embedding, FaceRegion, Frame};
use serde::Deserialize;

use crate::error::{HardwareError, Result};
use crate::traits::{FaceDetector, FaceEmbedder, FrameSource};

/// Width of synthesized frames, in pixels.
const FRAME_WIDTH: u32 = 640;

/// Height of synthesized frames, in pixels.
const FRAME_HEIGHT: u32 = 480;

/// Side of the square region synthesized for each face.
const FACE_SIZE: u32 = 100;

/// Serialized form of a scene.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneScript {
    /// Delay the camera waits before delivering each frame.
    #[serde(default)]
    pub frame_interval_ms: u64,

    /// Frames in capture order.
    pub frames: Vec<ScriptedFrame>,
}

/// One frame of a [`SceneScript`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedFrame {
    /// Embeddings of the faces in view, left to right.
    #[serde(default)]
    pub faces: Vec<Vec<f32>>,
}

/// A fixed sequence of frames shared by a camera and a vision model.
#[derive(Debug, Clone, Default)]
pub struct ScriptedScene {
    frames: Arc<Vec<Vec<Embedding>>>,
    frame_interval: Duration,
}

impl ScriptedScene {
    /// Create a scene from per-frame face embeddings.
    pub fn new(frames: Vec<Vec<Embedding>>) -> Self {
        Self {
            frames: Arc::new(frames),
            frame_interval: Duration::ZERO,
        }
    }

    /// Create a scene from its serialized form.
    pub fn from_script(script: SceneScript) -> Self {
        let frames = script
            .frames
            .into_iter()
            .map(|frame| frame.faces.into_iter().map(Embedding::new).collect())
            .collect();
        Self::new(frames).with_frame_interval(Duration::from_millis(script.frame_interval_ms))
    }

    /// Set the delay before each captured frame.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Number of frames in the scene.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the scene has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Build frame `index` as the camera would deliver it.
    pub fn frame(&self, index: usize) -> Option<Frame> {
        (index < self.frames.len()).then(|| blank_frame(index as u64))
    }

    /// A camera replaying this scene from the first frame.
    pub fn camera(&self) -> ScriptedCamera {
        ScriptedCamera {
            frames: Arc::clone(&self.frames),
            frame_interval: self.frame_interval,
            next: 0,
        }
    }

    /// Detector and embedder answering for this scene.
    pub fn vision(&self) -> ScriptedVision {
        ScriptedVision {
            frames: Arc::clone(&self.frames),
            failing_frames: Arc::new(HashSet::new()),
        }
    }
}

fn blank_frame(sequence: u64) -> Frame {
    Frame::new(sequence, FRAME_WIDTH, FRAME_HEIGHT, Bytes::new())
}

fn regions_for(count: usize) -> Vec<FaceRegion> {
    (0..count as u32)
        .map(|i| FaceRegion::new(0, (i + 1) * FACE_SIZE, FACE_SIZE, i * FACE_SIZE))
        .collect()
}

/// Camera replaying a [`ScriptedScene`].
///
/// Once the script runs out the camera reports itself disconnected.
#[derive(Debug)]
pub struct ScriptedCamera {
    frames: Arc<Vec<Vec<Embedding>>>,
    frame_interval: Duration,
    next: usize,
}

impl ScriptedCamera {
    /// Number of frames not yet delivered.
    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.next)
    }
}

impl FrameSource for ScriptedCamera {
    async fn next_frame(&mut self) -> Result<Frame> {
        if self.next >= self.frames.len() {
            return Err(HardwareError::disconnected("scripted camera exhausted"));
        }
        if !self.frame_interval.is_zero() {
            tokio::time::sleep(self.frame_interval).await;
        }
        let frame = blank_frame(self.next as u64);
        self.next += 1;
        Ok(frame)
    }
}

/// Face detector and embedder answering from a [`ScriptedScene`].
#[derive(Debug, Clone)]
pub struct ScriptedVision {
    frames: Arc<Vec<Vec<Embedding>>>,
    failing_frames: Arc<HashSet<u64>>,
}

impl ScriptedVision {
    /// Make detection fail for the given frame sequence numbers.
    pub fn with_failing_frames(mut self, sequences: impl IntoIterator<Item = u64>) -> Self {
        self.failing_frames = Arc::new(sequences.into_iter().collect());
        self
    }

    fn faces(&self, frame: &Frame) -> Result<&[Embedding]> {
        usize::try_from(frame.sequence)
            .ok()
            .and_then(|index| self.frames.get(index))
            .map(Vec::as_slice)
            .ok_or_else(|| {
                HardwareError::analysis(format!("frame {} is not in the scene", frame.sequence))
            })
    }
}

impl FaceDetector for ScriptedVision {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceRegion>> {
        if self.failing_frames.contains(&frame.sequence) {
            return Err(HardwareError::analysis(format!(
                "injected detection failure on frame {}",
                frame.sequence
            )));
        }
        Ok(regions_for(self.faces(frame)?.len()))
    }
}

impl FaceEmbedder for ScriptedVision {
    async fn embed(&self, frame: &Frame, region: &FaceRegion) -> Result<Embedding> {
        let faces = self.faces(frame)?;
        regions_for(faces.len())
            .iter()
            .position(|r| r == region)
            .map(|index| faces[index].clone())
            .ok_or_else(|| HardwareError::analysis("region does not match a scripted face"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[tokio::test]
    async fn test_camera_replays_frames_then_disconnects() {
        let scene = ScriptedScene::new(vec![vec![], vec![emb(&[1.0])]]);
        let mut camera = scene.camera();

        assert_eq!(camera.next_frame().await.unwrap().sequence, 0);
        assert_eq!(camera.next_frame().await.unwrap().sequence, 1);
        assert_eq!(camera.remaining(), 0);
        assert!(matches!(
            camera.next_frame().await,
            Err(HardwareError::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_vision_detects_and_embeds_each_face() {
        let scene = ScriptedScene::new(vec![vec![emb(&[1.0, 0.0]), emb(&[0.0, 1.0])]]);
        let vision = scene.vision();
        let frame = scene.frame(0).unwrap();

        let regions = vision.detect(&frame).await.unwrap();
        assert_eq!(regions.len(), 2);

        let second = vision.embed(&frame, &regions[1]).await.unwrap();
        assert_eq!(second, emb(&[0.0, 1.0]));
    }

    #[tokio::test]
    async fn test_empty_frame_has_no_faces() {
        let scene = ScriptedScene::new(vec![vec![]]);
        let frame = scene.frame(0).unwrap();
        assert!(scene.vision().detect(&frame).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_frame() {
        let scene = ScriptedScene::new(vec![vec![emb(&[1.0])], vec![emb(&[1.0])]]);
        let vision = scene.vision().with_failing_frames([1]);

        assert!(vision.detect(&scene.frame(0).unwrap()).await.is_ok());
        assert!(vision.detect(&scene.frame(1).unwrap()).await.is_err());
    }

    #[test]
    fn test_scene_from_json() {
        let script: SceneScript = serde_json::from_str(
            r#"{ "frame_interval_ms": 50, "frames": [ { "faces": [[0.5, 0.5]] }, {} ] }"#,
        )
        .unwrap();
        let scene = ScriptedScene::from_script(script);

        assert_eq!(scene.len(), 2);
        assert!(scene.frame(1).is_some());
        assert!(scene.frame(2).is_none());
    }
}
