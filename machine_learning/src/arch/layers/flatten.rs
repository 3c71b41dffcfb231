use ndarray::{ArrayD, IxDyn};

use crate::Result;

/// Collapses every axis but the batch axis.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    in_shape: Vec<usize>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let n = x.shape().first().copied().unwrap_or(0);
        let rest = x.len().checked_div(n).unwrap_or(0);
        self.in_shape = x.shape().to_vec();
        reshape(x, &[n, rest])
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        reshape(d, &self.in_shape)
    }
}

fn reshape(x: ArrayD<f32>, shape: &[usize]) -> Result<ArrayD<f32>> {
    let x = x.as_standard_layout().into_owned();
    Ok(x.into_shape_with_order(IxDyn(shape))?)
}
