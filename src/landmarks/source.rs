use async_trait::async_trait;

use super::{FaceLandmarks, Frame};
use crate::Result;

/// A face mesh detector, the pipeline only consumes its output.
#[async_trait]
pub trait LandmarkSource: Send + Sync {
    /// Detects every face in `frame`. An empty list means no face was found.
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceLandmarks>>;
}

/// A camera or a recorded video.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next frame, `None` once the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}
