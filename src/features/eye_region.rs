use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    GazeError, Result,
    landmarks::{Eye, FaceLandmarks, Point},
};

/// The box enclosing both eyes, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeBox {
    pub min_x: f32,
    pub min_y: f32,
    pub width: f32,
    pub height: f32,
}

/// The iris derived measurements of one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeMeasurements {
    pub center: Point,
    pub horizontal_diameter: f32,
    pub vertical_diameter: f32,
}

/// The output of `EyeRegionExtractor::extract`.
///
/// The measurements are `None` when the detector ran without iris refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeRegion {
    pub eye_box: EyeBox,
    pub left: Option<EyeMeasurements>,
    pub right: Option<EyeMeasurements>,
}

/// Locates the eyes within a frame.
#[derive(Debug, Clone, Copy)]
pub struct EyeRegionExtractor {
    padding: f32,
}

impl EyeRegionExtractor {
    pub const DEFAULT_PADDING: f32 = 5.;

    /// Creates a new `EyeRegionExtractor`.
    ///
    /// # Arguments
    /// * `padding` - The margin added on every side of the eye box.
    pub fn new(padding: f32) -> Self {
        Self { padding }
    }

    /// Computes the padded box around both eye outlines and, when the iris keypoints are present,
    /// the per eye measurements.
    ///
    /// # Errors
    /// `InsufficientLandmarks` if any eye outline is missing or incomplete.
    pub fn extract(&self, face: &FaceLandmarks) -> Result<EyeRegion> {
        let mut points = self.outline(face, Eye::Left)?;
        points.extend(self.outline(face, Eye::Right)?);

        let measures = self
            .measure(face, Eye::Left)
            .and_then(|left| Ok((left, self.measure(face, Eye::Right)?)));

        let (left, right) = match measures {
            Ok((left, right)) => {
                points.extend([left.center, right.center]);
                (Some(left), Some(right))
            }
            Err(e) => {
                debug!("omitting eye measurements: {e}");
                (None, None)
            }
        };

        Ok(EyeRegion {
            eye_box: self.bounding_box(&points),
            left,
            right,
        })
    }

    /// Returns the eyelid outline of `eye`, upper then lower lid for the left eye and lower then
    /// upper lid for the right one.
    pub fn outline(&self, face: &FaceLandmarks, eye: Eye) -> Result<Vec<Point>> {
        let mut outline = Vec::with_capacity(16);

        for region in eye.outline() {
            let expected = region.expected_len().unwrap_or_default();
            let points = face.region(region).unwrap_or_default();
            if points.len() != expected {
                return Err(GazeError::InsufficientLandmarks {
                    what: "eye outline",
                    got: points.len(),
                    expected,
                });
            }

            outline.extend_from_slice(points);
        }

        Ok(outline)
    }

    /// Measures the iris of `eye` from the iris keypoints appended to the mesh.
    ///
    /// # Errors
    /// `InsufficientLandmarks` if the mesh doesn't carry iris keypoints.
    pub fn measure(&self, face: &FaceLandmarks, eye: Eye) -> Result<EyeMeasurements> {
        let base = eye.iris_center_index();
        let ring = |i: usize| {
            face.mesh_point(base + i)
                .ok_or(GazeError::InsufficientLandmarks {
                    what: "iris keypoints",
                    got: face.mesh.len(),
                    expected: base + i + 1,
                })
        };

        Ok(EyeMeasurements {
            center: ring(0)?,
            horizontal_diameter: ring(3)?.distance(&ring(1)?),
            vertical_diameter: ring(4)?.distance(&ring(2)?),
        })
    }

    fn bounding_box(&self, points: &[Point]) -> EyeBox {
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);

        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        let pad = self.padding;
        EyeBox {
            min_x: min_x - pad,
            min_y: min_y - pad,
            width: (max_x + pad) - (min_x - pad),
            height: (max_y + pad) - (min_y - pad),
        }
    }
}

impl Default for EyeRegionExtractor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PADDING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{NUM_KEYPOINTS, Region, synthetic_face};

    #[test]
    fn box_spans_outlines_and_iris_centers() {
        let face = synthetic_face(0., 0., 1.);
        let region = EyeRegionExtractor::default().extract(&face).unwrap();

        // Outline x runs from 60 - 12 to 140 + 12, y from 94 to 110.
        let b = region.eye_box;
        assert_eq!((b.min_x, b.min_y), (43., 89.));
        assert_eq!((b.width, b.height), (114., 26.));

        let left = region.left.unwrap();
        assert_eq!(left.center, Point::new(140., 101., 1.));
        assert_eq!(left.horizontal_diameter, 8.);
        assert_eq!(left.vertical_diameter, 10.);
    }

    #[test]
    fn moving_an_extreme_point_moves_the_box_by_the_same_amount() {
        let extractor = EyeRegionExtractor::default();
        let face = synthetic_face(0., 0., 1.);
        let base = extractor.extract(&face).unwrap().eye_box;

        for eps in [0.25, 1.5, 7.] {
            let mut moved = face.clone();
            let lower = moved.annotations.get_mut(&Region::LeftEyeLower0).unwrap();
            lower[8].x += eps;
            lower[8].y += eps;

            let b = extractor.extract(&moved).unwrap().eye_box;
            assert!((b.width - (base.width + eps)).abs() < 1e-4);
            assert!((b.height - (base.height + eps)).abs() < 1e-4);
            assert_eq!((b.min_x, b.min_y), (base.min_x, base.min_y));
        }
    }

    #[test]
    fn missing_iris_omits_measurements() {
        let mut face = synthetic_face(0., 0., 1.);
        face.mesh.truncate(NUM_KEYPOINTS);

        let extractor = EyeRegionExtractor::default();
        let region = extractor.extract(&face).unwrap();
        assert_eq!(region.left, None);
        assert_eq!(region.right, None);

        let err = extractor.measure(&face, Eye::Right).unwrap_err();
        assert!(matches!(err, GazeError::InsufficientLandmarks { .. }));
    }

    #[test]
    fn incomplete_outline_is_insufficient() {
        let mut face = synthetic_face(0., 0., 1.);
        face.annotations.remove(&Region::RightEyeUpper0);

        let err = EyeRegionExtractor::default().extract(&face).unwrap_err();
        assert!(err.is_recoverable());
    }
}
