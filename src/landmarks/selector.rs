use log::debug;

use super::{FaceLandmarks, Point};

/// Picks the face the pipeline follows when a frame holds several of them.
///
/// A face is acquired by confidence (the first one wins ties) and then tracked by the position of
/// its eyes, so reordering in the detector's output doesn't switch subjects. Tracking is dropped
/// only when the closest face jumps farther than `jump_threshold` pixels.
#[derive(Debug, Clone)]
pub struct FaceSelector {
    tracked: Option<Point>,
    jump_threshold: f32,
}

impl FaceSelector {
    pub const DEFAULT_JUMP_THRESHOLD: f32 = 80.;

    pub fn new(jump_threshold: f32) -> Self {
        Self {
            tracked: None,
            jump_threshold,
        }
    }

    /// Selects one face among `faces`, `None` if there are none.
    pub fn select(&mut self, faces: Vec<FaceLandmarks>) -> Option<FaceLandmarks> {
        if faces.is_empty() {
            return None;
        }

        let index = self.track(&faces).unwrap_or_else(|| {
            debug!("acquiring a face among {}", faces.len());
            most_confident(&faces)
        });

        let face = faces.into_iter().nth(index)?;
        self.tracked = face.eye_midpoint();
        Some(face)
    }

    /// Forgets the tracked face.
    pub fn reset(&mut self) {
        self.tracked = None;
    }

    fn track(&self, faces: &[FaceLandmarks]) -> Option<usize> {
        let tracked = self.tracked?;

        let (index, dist) = faces
            .iter()
            .enumerate()
            .filter_map(|(i, face)| Some((i, face.eye_midpoint()?.distance(&tracked))))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))?;

        (dist <= self.jump_threshold).then_some(index)
    }
}

impl Default for FaceSelector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_JUMP_THRESHOLD)
    }
}

fn most_confident(faces: &[FaceLandmarks]) -> usize {
    let mut best = 0;

    for (i, face) in faces.iter().enumerate().skip(1) {
        if face.confidence > faces[best].confidence {
            best = i;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::synthetic_face;

    #[test]
    fn acquires_the_most_confident_face() {
        let mut selector = FaceSelector::default();
        let faces = vec![
            synthetic_face(0., 0., 0.7),
            synthetic_face(300., 0., 0.9),
            synthetic_face(600., 0., 0.9),
        ];

        let face = selector.select(faces).unwrap();
        assert_eq!(face, synthetic_face(300., 0., 0.9));
    }

    #[test]
    fn keeps_following_the_tracked_face() {
        let mut selector = FaceSelector::default();
        selector.select(vec![synthetic_face(0., 0., 0.9)]);

        // A more confident face shows up first in the list, the tracked one barely moved.
        let faces = vec![synthetic_face(300., 0., 0.99), synthetic_face(5., 3., 0.5)];
        let face = selector.select(faces).unwrap();
        assert_eq!(face, synthetic_face(5., 3., 0.5));
    }

    #[test]
    fn reacquires_after_a_jump() {
        let mut selector = FaceSelector::new(20.);
        selector.select(vec![synthetic_face(0., 0., 0.9)]);

        let faces = vec![synthetic_face(300., 0., 0.4), synthetic_face(200., 0., 0.8)];
        let face = selector.select(faces).unwrap();
        assert_eq!(face, synthetic_face(200., 0., 0.8));
    }

    #[test]
    fn no_faces_selects_nothing() {
        assert!(FaceSelector::default().select(Vec::new()).is_none());
    }
}
