//! Offline sources that play back a recorded session, used by the binary and the tests.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    collector::{ScreenPoint, Viewport},
    landmarks::{FaceLandmarks, Frame, FrameSource, LandmarkSource},
    session::{SharedTarget, Sources},
};

fn default_frame_interval() -> u64 {
    33
}

/// One recorded frame: the detector's output and the stimulus shown at the time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub faces: Vec<FaceLandmarks>,
    #[serde(default)]
    pub target: Option<ScreenPoint>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub pixels: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub viewport: Viewport,
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_json(&bytes)
    }

    /// Parses a recording, rejecting an unusable viewport.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let recording: Self = serde_json::from_slice(bytes)?;
        recording.viewport.validate()?;
        Ok(recording)
    }

    /// Splits the recording into the sources a session consumes.
    pub fn into_sources(self) -> Result<Sources> {
        let target = Arc::new(SharedTarget::new(self.viewport)?);
        let mut faces = Vec::with_capacity(self.frames.len());
        let mut frames = Vec::with_capacity(self.frames.len());

        for (index, recorded) in self.frames.into_iter().enumerate() {
            let RecordedFrame {
                faces: detected,
                target: point,
                width,
                height,
                pixels,
            } = recorded;

            faces.push(detected);
            frames.push((
                Frame {
                    index: index as u64,
                    timestamp_ms: index as u64 * self.frame_interval_ms,
                    width,
                    height,
                    pixels: pixels.map(Arc::from),
                },
                point,
            ));
        }

        Ok(Sources {
            frames: Box::new(ReplayFrames::new(
                frames,
                Duration::from_millis(self.frame_interval_ms),
                target.clone(),
            )),
            landmarks: Arc::new(ReplayLandmarks::new(faces)),
            target,
        })
    }
}

/// Plays frames back at a fixed pace, moving the shared target along with them.
pub struct ReplayFrames {
    frames: std::vec::IntoIter<(Frame, Option<ScreenPoint>)>,
    interval: Duration,
    target: Arc<SharedTarget>,
}

impl ReplayFrames {
    pub fn new(
        frames: Vec<(Frame, Option<ScreenPoint>)>,
        interval: Duration,
        target: Arc<SharedTarget>,
    ) -> Self {
        Self {
            frames: frames.into_iter(),
            interval,
            target,
        }
    }
}

#[async_trait]
impl FrameSource for ReplayFrames {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some((frame, point)) = self.frames.next() else {
            return Ok(None);
        };

        tokio::time::sleep(self.interval).await;
        self.target.set_target(point);
        Ok(Some(frame))
    }
}

/// Answers detections from the faces recorded for each frame index.
pub struct ReplayLandmarks {
    faces: Vec<Vec<FaceLandmarks>>,
}

impl ReplayLandmarks {
    pub fn new(faces: Vec<Vec<FaceLandmarks>>) -> Self {
        Self { faces }
    }
}

#[async_trait]
impl LandmarkSource for ReplayLandmarks {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceLandmarks>> {
        let faces = usize::try_from(frame.index)
            .ok()
            .and_then(|i| self.faces.get(i))
            .cloned()
            .unwrap_or_default();

        Ok(faces)
    }
}
