use serde::{Deserialize, Serialize};

use super::EyeRegionExtractor;
use crate::{
    GazeError, Result,
    landmarks::{Eye, FaceLandmarks, Point, Region},
};

/// The field layout of a feature vector.
///
/// `Derived` holds, per eye (right eye first): the 16 outline X's, the 16 outline Y's, the iris
/// center `(x, y, z)` and the horizontal and vertical iris diameters.
///
/// `RawFlatten` holds, per eye (left eye first): the `(x, y, z)` of the 5 iris points, of the 4
/// lower rings and of the 3 upper rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSchema {
    Derived,
    RawFlatten,
}

impl FeatureSchema {
    /// Bumped whenever a layout changes, stored samples of other versions can't be reused.
    pub const VERSION: u32 = 1;

    /// Returns the length of every vector built under this schema.
    pub const fn len(self) -> usize {
        match self {
            Self::Derived => 2 * (16 + 16 + 3 + 2),
            Self::RawFlatten => 2 * (5 + 4 * 9 + 3 * 7) * 3,
        }
    }
}

/// A feature vector tagged with the schema it was built under.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeFeatureVector {
    schema: FeatureSchema,
    values: Vec<f32>,
}

impl EyeFeatureVector {
    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// Flattens a face's landmarks into a fixed layout feature vector.
#[derive(Debug, Clone, Copy)]
pub struct FeatureVectorBuilder {
    schema: FeatureSchema,
    extractor: EyeRegionExtractor,
}

impl FeatureVectorBuilder {
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            extractor: EyeRegionExtractor::default(),
        }
    }

    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    /// Builds the feature vector of `face`.
    ///
    /// # Errors
    /// `InsufficientLandmarks` if any landmark the schema needs is missing, vectors are never
    /// padded or truncated.
    pub fn build(&self, face: &FaceLandmarks) -> Result<EyeFeatureVector> {
        let mut values = Vec::with_capacity(self.schema.len());

        match self.schema {
            FeatureSchema::Derived => {
                for eye in [Eye::Right, Eye::Left] {
                    self.push_derived(face, eye, &mut values)?;
                }
            }
            FeatureSchema::RawFlatten => {
                for eye in [Eye::Left, Eye::Right] {
                    self.push_raw(face, eye, &mut values)?;
                }
            }
        }

        ensure_len(self.schema.len(), values.len())?;
        Ok(EyeFeatureVector {
            schema: self.schema,
            values,
        })
    }

    fn push_derived(&self, face: &FaceLandmarks, eye: Eye, values: &mut Vec<f32>) -> Result<()> {
        let outline = self.extractor.outline(face, eye)?;
        let m = self.extractor.measure(face, eye)?;

        values.extend(outline.iter().map(|p| p.x));
        values.extend(outline.iter().map(|p| p.y));
        values.extend([m.center.x, m.center.y, m.center.z]);
        values.extend([m.horizontal_diameter, m.vertical_diameter]);
        Ok(())
    }

    fn push_raw(&self, face: &FaceLandmarks, eye: Eye, values: &mut Vec<f32>) -> Result<()> {
        let regions = std::iter::once(Some(eye.iris()))
            .chain((0..4).map(|n| eye.lower(n)))
            .chain((0..3).map(|n| eye.upper(n)))
            .flatten();

        for region in regions {
            let points = raw_region(face, region)?;
            values.extend(points.iter().flat_map(|p| [p.x, p.y, p.z]));
        }

        Ok(())
    }
}

fn raw_region(face: &FaceLandmarks, region: Region) -> Result<&[Point]> {
    let expected = region.expected_len().unwrap_or_default();
    let points = face.region(region).unwrap_or_default();
    if points.len() != expected {
        return Err(GazeError::InsufficientLandmarks {
            what: "raw eye ring",
            got: points.len(),
            expected,
        });
    }

    Ok(points)
}

/// Fails with `SchemaMismatch` unless `got == expected`.
pub fn ensure_len(expected: usize, got: usize) -> Result<()> {
    if got != expected {
        return Err(GazeError::SchemaMismatch { expected, got });
    }

    Ok(())
}
