use ndarray::prelude::*;

use crate::{MlErr, Result};

/// Average pooling over non-overlapping `pool` x `pool` windows of a channel-last tensor.
///
/// Trailing rows or columns that don't fill a whole window are dropped.
#[derive(Debug, Clone)]
pub struct AvgPool2d {
    pool: usize,
    in_shape: (usize, usize, usize, usize),
}

impl AvgPool2d {
    pub fn new(pool: usize) -> Self {
        Self {
            pool,
            in_shape: (0, 0, 0, 0),
        }
    }

    pub fn output_dim(&self, height: usize, width: usize) -> (usize, usize) {
        (height / self.pool, width / self.pool)
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = x.dim();
        let (oh, ow) = self.output_dim(h, w);
        if oh == 0 || ow == 0 {
            return Err(MlErr::SizeMismatch {
                what: "pooling window",
                got: h.min(w),
                expected: self.pool,
            });
        }

        let p = self.pool;
        let scale = 1. / (p * p) as f32;
        let y = Array4::from_shape_fn((n, oh, ow, c), |(i, oy, ox, ch)| {
            let window = x.slice(s![i, oy * p..(oy + 1) * p, ox * p..(ox + 1) * p, ch]);
            window.sum() * scale
        });

        self.in_shape = (n, h, w, c);
        Ok(y)
    }

    pub fn backward(&mut self, d: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = self.in_shape;
        let (oh, ow) = self.output_dim(h, w);
        if d.dim() != (n, oh, ow, c) {
            return Err(MlErr::SizeMismatch {
                what: "pooling deltas",
                got: d.len(),
                expected: n * oh * ow * c,
            });
        }

        let p = self.pool;
        let scale = 1. / (p * p) as f32;
        let dx = Array4::from_shape_fn((n, h, w, c), |(i, y, x, ch)| {
            let (oy, ox) = (y / p, x / p);
            if oy < oh && ox < ow {
                d[[i, oy, ox, ch]] * scale
            } else {
                0.
            }
        });

        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_windows_and_spreads_deltas() {
        let x = Array4::from_shape_vec(
            (1, 2, 3, 1),
            vec![
                1.0, 3.0, 9.0, //
                5.0, 7.0, 9.0,
            ],
        )
        .unwrap();

        let mut pool = AvgPool2d::new(2);
        let y = pool.forward(x).unwrap();
        assert_eq!(y.dim(), (1, 1, 1, 1));
        assert_eq!(y[[0, 0, 0, 0]], 4.0);

        let dx = pool.backward(Array4::from_elem((1, 1, 1, 1), 8.0)).unwrap();
        assert_eq!(dx[[0, 0, 0, 0]], 2.0);
        assert_eq!(dx[[0, 1, 1, 0]], 2.0);
        assert_eq!(dx[[0, 0, 2, 0]], 0.0);
    }
}
