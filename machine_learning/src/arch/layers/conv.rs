use ndarray::prelude::*;
use rand::Rng;

use super::xavier_uniform;
use crate::{MlErr, Result, arch::activations::ActFn};

/// A 2D convolution over channel-last `(batch, height, width, channels)` tensors with unit stride
/// and no padding.
///
/// The parameters are laid out as a `(kernel * kernel * in_channels, filters)` weight matrix
/// followed by the `filters` biases, so the forward pass reduces to an `im2col` product.
#[derive(Debug, Clone)]
pub struct Conv2d {
    kernel: usize,
    in_channels: usize,
    filters: usize,
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    in_shape: (usize, usize, usize, usize),
    cols: Vec<Array2<f32>>,
    z: Array4<f32>,
}

impl Conv2d {
    /// Creates a new `Conv2d` layer.
    ///
    /// # Arguments
    /// * `kernel` - The side of the square kernel.
    /// * `in_channels` - The amount of channels of the incoming tensor.
    /// * `filters` - The amount of output channels.
    /// * `act_fn` - The activation function applied to the output, if any.
    pub fn new(kernel: usize, in_channels: usize, filters: usize, act_fn: Option<ActFn>) -> Self {
        let patch = kernel * kernel * in_channels;

        Self {
            kernel,
            in_channels,
            filters,
            act_fn,
            size: (patch + 1) * filters,
            in_shape: (0, 0, 0, 0),
            cols: Vec::new(),
            z: Array4::zeros((0, 0, 0, 0)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the spatial output size for an input of `height` x `width`.
    pub fn output_dim(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        let h = height.checked_sub(self.kernel)? + 1;
        let w = width.checked_sub(self.kernel)? + 1;
        Some((h, w))
    }

    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let patch = self.patch();
        let (w, b) = params.split_at_mut(patch * self.filters);
        xavier_uniform(w, patch, self.filters, rng)?;
        b.fill(0.);
        Ok(())
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = x.dim();
        if c != self.in_channels {
            return Err(MlErr::SizeMismatch {
                what: "conv layer channels",
                got: c,
                expected: self.in_channels,
            });
        }

        let (oh, ow) = self.output_dim(h, w).ok_or(MlErr::SizeMismatch {
            what: "conv layer spatial size",
            got: h.min(w),
            expected: self.kernel,
        })?;

        let (weights, biases) = self.view_params(params)?;
        let mut z = Array4::zeros((n, oh, ow, self.filters));
        self.cols.clear();

        for (i, img) in x.outer_iter().enumerate() {
            let col = self.im2col(img, oh, ow);
            let out = (col.dot(&weights) + &biases).into_shape_with_order((oh, ow, self.filters))?;
            z.index_axis_mut(Axis(0), i).assign(&out);
            self.cols.push(col);
        }

        self.in_shape = (n, h, w, c);
        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        self.z = z;
        Ok(a)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "conv layer deltas",
                got: d.len(),
                expected: self.z.len(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (n, h, w, c) = self.in_shape;
        let (_, oh, ow, f) = d.dim();
        let (weights, _) = self.view_params(params)?;
        let patch = self.patch();
        let (dw_raw, db_raw) = grad.split_at_mut(patch * f);
        let mut dw = ArrayViewMut2::from_shape((patch, f), dw_raw)?;
        let mut db = ArrayViewMut1::from_shape(f, db_raw)?;
        let mut dx = Array4::zeros((n, h, w, c));

        for (i, col) in self.cols.iter().enumerate() {
            let d_i = d
                .index_axis(Axis(0), i)
                .to_owned()
                .into_shape_with_order((oh * ow, f))?;

            dw += &col.t().dot(&d_i);
            db += &d_i.sum_axis(Axis(0));

            let dcol = d_i.dot(&weights.t());
            self.col2im(&dcol, dx.index_axis_mut(Axis(0), i), oh, ow);
        }

        Ok(dx)
    }

    fn patch(&self) -> usize {
        self.kernel * self.kernel * self.in_channels
    }

    /// Unrolls every receptive field of `img` into a row.
    fn im2col(&self, img: ArrayView3<f32>, oh: usize, ow: usize) -> Array2<f32> {
        let k = self.kernel;
        let c = self.in_channels;
        let mut col = Array2::zeros((oh * ow, self.patch()));

        for oy in 0..oh {
            for ox in 0..ow {
                let mut row = col.row_mut(oy * ow + ox);
                for ky in 0..k {
                    for kx in 0..k {
                        for ch in 0..c {
                            row[(ky * k + kx) * c + ch] = img[[oy + ky, ox + kx, ch]];
                        }
                    }
                }
            }
        }

        col
    }

    /// Scatters the rows of `dcol` back onto the receptive fields they came from.
    fn col2im(&self, dcol: &Array2<f32>, mut dx: ArrayViewMut3<f32>, oh: usize, ow: usize) {
        let k = self.kernel;
        let c = self.in_channels;

        for oy in 0..oh {
            for ox in 0..ow {
                let row = dcol.row(oy * ow + ox);
                for ky in 0..k {
                    for kx in 0..k {
                        for ch in 0..c {
                            dx[[oy + ky, ox + kx, ch]] += row[(ky * k + kx) * c + ch];
                        }
                    }
                }
            }
        }
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_size = self.patch() * self.filters;
        let weights = ArrayView2::from_shape((self.patch(), self.filters), &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.filters, &params[w_size..])?;
        Ok((weights, biases))
    }
}
