mod region;
mod selector;
mod source;

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

pub use region::{Eye, Region};
pub use selector::FaceSelector;
pub use source::{FrameSource, LandmarkSource};

/// The amount of points of the dense face mesh.
pub const NUM_KEYPOINTS: usize = 468;

/// The amount of iris points appended to the mesh per eye.
pub const NUM_IRIS_KEYPOINTS: usize = 5;

/// A landmark in frame pixel space, `z` being a relative depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance between the projections of both points, depth is ignored.
    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new(
            (self.x + other.x) / 2.,
            (self.y + other.y) / 2.,
            (self.z + other.z) / 2.,
        )
    }
}

/// The landmarks of a single detected face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub annotations: BTreeMap<Region, Vec<Point>>,
    #[serde(default)]
    pub mesh: Vec<Point>,
}

impl FaceLandmarks {
    pub fn region(&self, region: Region) -> Option<&[Point]> {
        self.annotations.get(&region).map(Vec::as_slice)
    }

    pub fn mesh_point(&self, index: usize) -> Option<Point> {
        self.mesh.get(index).copied()
    }

    /// Whether the mesh carries the iris keypoints of both eyes.
    pub fn has_iris(&self) -> bool {
        self.mesh.len() >= NUM_KEYPOINTS + 2 * NUM_IRIS_KEYPOINTS
    }

    /// The point halfway between both eyes, used to follow a face across frames.
    pub fn eye_midpoint(&self) -> Option<Point> {
        let left = centroid(self.region(Region::LeftEyeLower0)?)?;
        let right = centroid(self.region(Region::RightEyeLower0)?)?;
        Some(left.midpoint(&right))
    }
}

fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f32;
    let (x, y, z) = points
        .iter()
        .fold((0., 0., 0.), |(x, y, z), p| (x + p.x, y + p.y, z + p.z));

    Some(Point::new(x / n, y / n, z / n))
}

/// A video frame. Pixels, when present, are packed RGB rows.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Option<Arc<[u8]>>,
}

/// Builds a face whose eye landmarks are all present, shifted by `(dx, dy)`.
#[cfg(test)]
pub(crate) fn synthetic_face(dx: f32, dy: f32, confidence: f32) -> FaceLandmarks {
    let mut annotations = BTreeMap::new();

    for (eye, cx) in [(Eye::Left, 140.), (Eye::Right, 60.)] {
        let mut regions = vec![(eye.iris(), 0)];
        regions.extend((0..3).filter_map(|n| eye.upper(n)).map(|r| (r, 1)));
        regions.extend((0..4).filter_map(|n| eye.lower(n)).map(|r| (r, 2)));

        for (region, ring) in regions {
            let len = region.expected_len().unwrap_or(0);
            let points = (0..len)
                .map(|i| {
                    let x = cx + dx + i as f32 * 3. - 12.;
                    let y = 100. + dy + if ring == 1 { -6. } else { ring as f32 * 3. };
                    Point::new(x, y + i as f32 * 0.5, -1.)
                })
                .collect();

            annotations.insert(region, points);
        }
    }

    let mut mesh = vec![Point::new(100. + dx, 120. + dy, 0.); NUM_KEYPOINTS];
    for (cx, cz) in [(140., 1.), (60., 2.)] {
        let (x, y) = (cx + dx, 101. + dy);
        mesh.extend([
            Point::new(x, y, cz),
            Point::new(x + 4., y, cz),
            Point::new(x, y - 5., cz),
            Point::new(x - 4., y, cz),
            Point::new(x, y + 5., cz),
        ]);
    }

    FaceLandmarks {
        confidence,
        annotations,
        mesh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_ignores_depth() {
        let a = Point::new(0., 0., 10.);
        let b = Point::new(3., 4., -7.);
        assert_eq!(a.distance(&b), 5.);
    }

    #[test]
    fn faces_deserialize_with_missing_fields() {
        let json = r#"{ "annotations": { "leftEyeIris": [{ "x": 1.0, "y": 2.0 }] } }"#;
        let face: FaceLandmarks = serde_json::from_str(json).unwrap();

        assert_eq!(face.confidence, 0.);
        assert_eq!(face.region(Region::LeftEyeIris), Some(&[Point::new(1., 2., 0.)][..]));
        assert!(!face.has_iris());
    }

    #[test]
    fn synthetic_faces_have_iris_and_midpoint() {
        let face = synthetic_face(10., 0., 0.9);
        assert!(face.has_iris());

        let mid = face.eye_midpoint().unwrap();
        assert!((mid.x - 110.).abs() < 1e-3);
    }
}
