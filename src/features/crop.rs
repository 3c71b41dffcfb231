use image::{ImageBuffer, Rgb, imageops::FilterType};
use ndarray::Array4;

use super::EyeBox;
use crate::{GazeError, Result, collector::normalize_pixels, landmarks::Frame};

/// Cuts the eye box out of an RGB frame and scales it to a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct EyeCropper {
    height: u32,
    width: u32,
}

impl EyeCropper {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Crops `eye_box` out of `frame`.
    ///
    /// # Returns
    /// A normalized `(1, height, width, 3)` tensor or `InvalidFrame` if the frame has no usable
    /// pixels inside the box.
    pub fn crop(&self, frame: &Frame, eye_box: &EyeBox) -> Result<Array4<f32>> {
        let pixels = frame
            .pixels
            .as_deref()
            .ok_or_else(|| GazeError::InvalidFrame("the frame carries no pixels".into()))?;

        let owned = pixels.to_vec();
        let img = ImageBuffer::<Rgb<u8>, _>::from_raw(frame.width, frame.height, owned)
            .ok_or_else(|| {
                GazeError::InvalidFrame(format!(
                    "{} bytes don't hold a {}x{} RGB image",
                    pixels.len(),
                    frame.width,
                    frame.height
                ))
            })?;

        let (fw, fh) = (frame.width as f32, frame.height as f32);
        let x0 = eye_box.min_x.clamp(0., fw);
        let y0 = eye_box.min_y.clamp(0., fh);
        let x1 = (eye_box.min_x + eye_box.width).clamp(0., fw);
        let y1 = (eye_box.min_y + eye_box.height).clamp(0., fh);

        let (w, h) = ((x1 - x0) as u32, (y1 - y0) as u32);
        if w == 0 || h == 0 {
            return Err(GazeError::InvalidFrame("the eye box lies outside the frame".into()));
        }

        let crop = image::imageops::crop_imm(&img, x0 as u32, y0 as u32, w, h).to_image();
        let resized = image::imageops::resize(&crop, self.width, self.height, FilterType::Triangle);

        normalize_pixels(
            resized.as_raw(),
            self.height as usize,
            self.width as usize,
            3,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn frame(width: u32, height: u32, value: u8) -> Frame {
        let pixels: Arc<[u8]> = vec![value; (width * height * 3) as usize].into();
        Frame {
            index: 0,
            timestamp_ms: 0,
            width,
            height,
            pixels: Some(pixels),
        }
    }

    #[test]
    fn crops_resizes_and_normalizes() {
        let eye_box = EyeBox {
            min_x: -10.,
            min_y: 20.,
            width: 50.,
            height: 30.,
        };

        let tensor = EyeCropper::new(16, 24)
            .crop(&frame(64, 48, 254), &eye_box)
            .unwrap();

        assert_eq!(tensor.dim(), (1, 16, 24, 3));
        assert!(tensor.iter().all(|&v| (v - 1.).abs() < 1e-2));
    }

    #[test]
    fn crops_only_the_box() {
        let (width, height) = (20, 10);
        let pixels: Vec<u8> = (0..width * height)
            .flat_map(|i| [if i % width < 10 { 0 } else { 254 }; 3])
            .collect();
        let frame = Frame {
            pixels: Some(pixels.into()),
            ..frame(width, height, 0)
        };

        let right = EyeBox {
            min_x: 10.,
            min_y: 0.,
            width: 10.,
            height: 10.,
        };
        let tensor = EyeCropper::new(4, 4).crop(&frame, &right).unwrap();
        assert!(tensor.iter().all(|&v| (v - 1.).abs() < 1e-2));

        let left = EyeBox { min_x: 0., ..right };
        let tensor = EyeCropper::new(4, 4).crop(&frame, &left).unwrap();
        assert!(tensor.iter().all(|&v| (v + 1.).abs() < 1e-2));
    }

    #[test]
    fn frames_without_pixels_are_rejected() {
        let mut frame = frame(8, 8, 0);
        frame.pixels = None;
        let eye_box = EyeBox {
            min_x: 0.,
            min_y: 0.,
            width: 4.,
            height: 4.,
        };

        let err = EyeCropper::new(4, 4).crop(&frame, &eye_box).unwrap_err();
        assert!(matches!(err, GazeError::InvalidFrame(_)));
    }
}
