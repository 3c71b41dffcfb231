use std::num::NonZeroUsize;

use ndarray::{Array2, ArrayD, IxDyn};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// An owned, in-memory supervised dataset.
///
/// Inputs are stored row after row, each of them with `x_shape` (the batch axis excluded), and
/// targets are rows of `y_size` values.
#[derive(Debug, Clone)]
pub struct Dataset {
    xs: Vec<f32>,
    ys: Vec<f32>,
    x_shape: Vec<usize>,
    x_size: usize,
    y_size: usize,
    order: Vec<usize>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `xs` - The flattened inputs.
    /// * `x_shape` - The shape of a single input.
    /// * `ys` - The flattened targets.
    /// * `y_size` - The length of a single target.
    ///
    /// # Returns
    /// A new `Dataset` or an error if the buffers don't describe the same amount of samples.
    pub fn new(xs: Vec<f32>, x_shape: Vec<usize>, ys: Vec<f32>, y_size: usize) -> Result<Self> {
        let x_size: usize = x_shape.iter().product();
        if x_size == 0 || y_size == 0 {
            return Err(MlErr::SizeMismatch {
                what: "dataset sample shape",
                got: 0,
                expected: 1,
            });
        }

        let len = ys.len() / y_size;
        if ys.len() % y_size != 0 || xs.len() != len * x_size {
            return Err(MlErr::SizeMismatch {
                what: "dataset inputs",
                got: xs.len(),
                expected: len * x_size,
            });
        }

        Ok(Self {
            xs,
            ys,
            x_shape,
            x_size,
            y_size,
            order: (0..len).collect(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn x_shape(&self) -> &[usize] {
        &self.x_shape
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Shuffles the order in which samples are yielded by `batches`.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.order.shuffle(rng);
    }

    /// Yields the samples in batches of at most `batch_size`, following the current order.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = Result<(ArrayD<f32>, Array2<f32>)>> + '_ {
        self.order
            .chunks(batch_size.get())
            .map(|idxs| self.gather(idxs))
    }

    /// Returns every sample as a single batch, in insertion order.
    pub fn all(&self) -> Result<(ArrayD<f32>, Array2<f32>)> {
        let idxs: Vec<usize> = (0..self.len()).collect();
        self.gather(&idxs)
    }

    fn gather(&self, idxs: &[usize]) -> Result<(ArrayD<f32>, Array2<f32>)> {
        let mut xs = Vec::with_capacity(idxs.len() * self.x_size);
        let mut ys = Vec::with_capacity(idxs.len() * self.y_size);

        for &i in idxs {
            xs.extend_from_slice(&self.xs[i * self.x_size..(i + 1) * self.x_size]);
            ys.extend_from_slice(&self.ys[i * self.y_size..(i + 1) * self.y_size]);
        }

        let mut shape = Vec::with_capacity(self.x_shape.len() + 1);
        shape.push(idxs.len());
        shape.extend_from_slice(&self.x_shape);

        let x = ArrayD::from_shape_vec(IxDyn(&shape), xs)?;
        let y = Array2::from_shape_vec((idxs.len(), self.y_size), ys)?;
        Ok((x, y))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn dataset() -> Dataset {
        let xs = (0..10).map(|i| i as f32).collect();
        let ys = (0..5).map(|i| i as f32 * 10.).collect();
        Dataset::new(xs, vec![2], ys, 1).unwrap()
    }

    #[test]
    fn batches_cover_every_sample_once() {
        let mut ds = dataset();
        ds.shuffle(&mut StdRng::seed_from_u64(9));

        let mut seen = Vec::new();
        let sizes: Vec<usize> = ds
            .batches(NonZeroUsize::new(2).unwrap())
            .map(|batch| {
                let (x, y) = batch.unwrap();
                for (row, target) in x.outer_iter().zip(y.outer_iter()) {
                    assert_eq!(row[0] * 5., target[0]);
                    seen.push(target[0] as usize / 10);
                }
                y.nrows()
            })
            .collect();

        seen.sort();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn all_keeps_insertion_order() {
        let (x, y) = dataset().all().unwrap();
        assert_eq!(x.shape(), &[5, 2]);
        assert_eq!(y.column(0).to_vec(), vec![0., 10., 20., 30., 40.]);
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        assert!(Dataset::new(vec![0.; 7], vec![2], vec![0.; 4], 1).is_err());
    }
}
