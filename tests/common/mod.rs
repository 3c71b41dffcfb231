#![allow(dead_code)]

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use eyegaze::{
    Result,
    collector::{ScreenPoint, Viewport},
    landmarks::{Eye, FaceLandmarks, Frame, FrameSource, LandmarkSource, NUM_KEYPOINTS, Point},
    session::{SharedTarget, Sources},
};

pub const VIEWPORT: Viewport = Viewport {
    width: 800.,
    height: 600.,
};

/// A face with every eye landmark, its eyes shifted by `(dx, dy)` pixels.
pub fn face(dx: f32, dy: f32) -> FaceLandmarks {
    let mut annotations = BTreeMap::new();

    for (eye, cx) in [(Eye::Left, 140.), (Eye::Right, 60.)] {
        let mut regions = vec![(eye.iris(), 0.)];
        regions.extend((0..3).filter_map(|n| eye.upper(n)).map(|r| (r, -6.)));
        regions.extend((0..4).filter_map(|n| eye.lower(n)).map(|r| (r, 6.)));

        for (region, offset) in regions {
            let len = region.expected_len().unwrap_or(0);
            let points = (0..len)
                .map(|i| Point::new(cx + dx + i as f32 * 3. - 12., 100. + dy + offset, 0.))
                .collect();

            annotations.insert(region, points);
        }
    }

    let mut mesh = vec![Point::default(); NUM_KEYPOINTS];
    for cx in [140., 60.] {
        let (x, y) = (cx + dx * 1.5, 100. + dy * 1.5);
        mesh.extend([
            Point::new(x, y, 0.),
            Point::new(x + 4., y, 0.),
            Point::new(x, y - 5., 0.),
            Point::new(x - 4., y, 0.),
            Point::new(x, y + 5., 0.),
        ]);
    }

    FaceLandmarks {
        confidence: 0.9,
        annotations,
        mesh,
    }
}

/// A `width x height` RGB frame with a diagonal gradient that shifts with `index`.
pub fn rgb_frame(index: u64, width: u32, height: u32) -> Frame {
    let pixels: Vec<u8> = (0..height)
        .flat_map(|y| (0..width).map(move |x| x + y))
        .flat_map(|v| {
            let v = (v as u64 + index * 7) % 256;
            [v as u8, (v / 2) as u8, 255 - v as u8]
        })
        .collect();

    Frame {
        index,
        timestamp_ms: index * 33,
        width,
        height,
        pixels: Some(pixels.into()),
    }
}

/// Where the stimulus is shown on frame `index`, cycling over a 4x3 grid.
pub fn target_of(index: u64) -> ScreenPoint {
    let cell = index / 5 % 12;
    ScreenPoint {
        x: 100. + (cell % 4) as f32 * 200.,
        y: 100. + (cell / 4) as f32 * 200.,
    }
}

/// Emits `limit` frames (or endless ones), moving the target on each of them.
pub struct Camera {
    index: u64,
    limit: Option<u64>,
    period: Duration,
    target: Arc<SharedTarget>,
}

#[async_trait]
impl FrameSource for Camera {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.limit.is_some_and(|limit| self.index >= limit) {
            return Ok(None);
        }

        tokio::time::sleep(self.period).await;
        let index = self.index;
        self.index += 1;
        self.target.set_target(Some(target_of(index)));

        Ok(Some(Frame {
            index,
            timestamp_ms: index * self.period.as_millis() as u64,
            width: 640,
            height: 480,
            pixels: None,
        }))
    }
}

/// Detects a face looking at the target of each frame.
pub struct Detector;

#[async_trait]
impl LandmarkSource for Detector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceLandmarks>> {
        let target = target_of(frame.index);
        let [x, y] = VIEWPORT.normalize(target);
        Ok(vec![face(x * 10., y * 6.)])
    }
}

pub fn sources(limit: Option<u64>, period: Duration) -> Sources {
    let target = Arc::new(SharedTarget::new(VIEWPORT).unwrap());

    Sources {
        frames: Box::new(Camera {
            index: 0,
            limit,
            period,
            target: target.clone(),
        }),
        landmarks: Arc::new(Detector),
        target,
    }
}
