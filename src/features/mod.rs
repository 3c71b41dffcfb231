mod crop;
mod eye_region;
mod vector;

use serde::{Deserialize, Serialize};

pub use crop::EyeCropper;
pub use eye_region::{EyeBox, EyeMeasurements, EyeRegion, EyeRegionExtractor};
pub use vector::{EyeFeatureVector, FeatureSchema, FeatureVectorBuilder, ensure_len};

use crate::{
    Result,
    landmarks::{FaceLandmarks, Frame},
};

/// The kind of model input the pipeline collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSchema {
    /// Landmark feature vectors, fed to the dense model.
    Features { schema: FeatureSchema },
    /// Cropped RGB eye images, fed to the convolutional model.
    Image { height: usize, width: usize },
}

impl InputSchema {
    pub const IMAGE_CHANNELS: usize = 3;

    /// Returns the amount of values of a single input.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Returns the shape of a single input, without the batch axis.
    pub fn shape(&self) -> Vec<usize> {
        match *self {
            Self::Features { schema } => vec![schema.len()],
            Self::Image { height, width } => vec![height, width, Self::IMAGE_CHANNELS],
        }
    }
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::Features {
            schema: FeatureSchema::Derived,
        }
    }
}

/// The latest detection result: the frame and the face selected in it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub frame: Frame,
    pub face: FaceLandmarks,
}

/// Turns a snapshot into a flat model input following an `InputSchema`.
#[derive(Debug, Clone, Copy)]
pub enum InputCapture {
    Features(FeatureVectorBuilder),
    Image {
        extractor: EyeRegionExtractor,
        cropper: EyeCropper,
    },
}

impl InputCapture {
    pub fn new(input: InputSchema) -> Self {
        match input {
            InputSchema::Features { schema } => Self::Features(FeatureVectorBuilder::new(schema)),
            InputSchema::Image { height, width } => Self::Image {
                extractor: EyeRegionExtractor::default(),
                cropper: EyeCropper::new(height as u32, width as u32),
            },
        }
    }

    /// Captures the model input of `snapshot`, row major and channel last for images.
    pub fn capture(&self, snapshot: &Snapshot) -> Result<Vec<f32>> {
        match self {
            Self::Features(builder) => Ok(builder.build(&snapshot.face)?.into_values()),
            Self::Image { extractor, cropper } => {
                let region = extractor.extract(&snapshot.face)?;
                let tensor = cropper.crop(&snapshot.frame, &region.eye_box)?;
                Ok(tensor.iter().copied().collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_schemas_report_their_shape() {
        assert_eq!(InputSchema::default().len(), 74);

        let image = InputSchema::Image {
            height: 32,
            width: 64,
        };
        assert_eq!(image.shape(), vec![32, 64, 3]);
        assert_eq!(image.len(), 32 * 64 * 3);
    }

    #[test]
    fn input_schemas_deserialize_from_tagged_json() {
        let json = r#"{ "features": { "schema": "raw_flatten" } }"#;
        let input: InputSchema = serde_json::from_str(json).unwrap();
        assert_eq!(input.len(), 372);
    }
}
