use ndarray::{ArrayD, Ix2, Ix4};
use rand::Rng;

use super::{AvgPool2d, Conv2d, Dense, Dropout, Flatten};
use crate::{Result, arch::Pass};

/// Every layer kind a `Sequential` model can hold.
#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
    Conv2d(Conv2d),
    AvgPool2d(AvgPool2d),
    Flatten(Flatten),
    Dropout(Dropout),
}

impl Layer {
    /// Returns the amount of parameters this layer owns.
    pub fn size(&self) -> usize {
        match self {
            Self::Dense(l) => l.size(),
            Self::Conv2d(l) => l.size(),
            Self::AvgPool2d(_) | Self::Flatten(_) | Self::Dropout(_) => 0,
        }
    }

    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match self {
            Self::Dense(l) => l.init(params, rng),
            Self::Conv2d(l) => l.init(params, rng),
            _ => Ok(()),
        }
    }

    /// Runs the forward pass of the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of the model parameters.
    /// * `x` - The incoming activations, batch axis first.
    /// * `pass` - Whether the model is training or evaluating.
    ///
    /// # Returns
    /// The outgoing activations or an error if `x` has the wrong shape.
    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>, pass: Pass) -> Result<ArrayD<f32>> {
        let y = match self {
            Self::Dense(l) => l.forward(params, x.into_dimensionality::<Ix2>()?)?.into_dyn(),
            Self::Conv2d(l) => l.forward(params, x.into_dimensionality::<Ix4>()?)?.into_dyn(),
            Self::AvgPool2d(l) => l.forward(x.into_dimensionality::<Ix4>()?)?.into_dyn(),
            Self::Flatten(l) => l.forward(x)?,
            Self::Dropout(l) => l.forward(x, pass),
        };

        Ok(y)
    }

    /// Runs the backward pass of the layer, accumulating into `grad`.
    ///
    /// # Returns
    /// The deltas for the previous layer.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let dx = match self {
            Self::Dense(l) => l
                .backward(params, grad, d.into_dimensionality::<Ix2>()?)?
                .into_dyn(),
            Self::Conv2d(l) => l
                .backward(params, grad, d.into_dimensionality::<Ix4>()?)?
                .into_dyn(),
            Self::AvgPool2d(l) => l.backward(d.into_dimensionality::<Ix4>()?)?.into_dyn(),
            Self::Flatten(l) => l.backward(d)?,
            Self::Dropout(l) => l.backward(d),
        };

        Ok(dx)
    }
}
