use ndarray::{Array2, ArrayD, Ix2};
use rand::Rng;

use super::{Model, Pass, layers::Layer, loss::LossFn};
use crate::{MlErr, Result, optimization::Optimizer};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Creates a freshly initialized parameter buffer for this model.
    ///
    /// # Arguments
    /// * `rng` - The source of randomness for the weights.
    ///
    /// # Returns
    /// The parameters, laid out layer after layer.
    pub fn init_params<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params = vec![0.; self.size()];
        let mut rest = params.as_mut_slice();

        for layer in &self.layers {
            let (head, tail) = rest.split_at_mut(layer.size());
            layer.init(head, rng)?;
            rest = tail;
        }

        Ok(params)
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data.
    /// * `pass` - Whether this pass is part of training.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn forward(&mut self, params: &[f32], mut x: ArrayD<f32>, pass: Pass) -> Result<Array2<f32>> {
        self.check_size(params.len())?;
        let mut rest = params;

        for layer in self.layers.iter_mut() {
            let (head, tail) = rest.split_at(layer.size());
            x = layer.forward(head, x, pass)?;
            rest = tail;
        }

        Ok(x.into_dimensionality::<Ix2>()?)
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: ArrayD<f32>) -> Result<()> {
        let mut end = params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }

    fn check_size(&self, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what: "model parameters",
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    // NOTE: the epoch loss is the average of the batch losses, so it's measured while the
    // parameters are still moving.
    fn backprop<L, O, I>(
        &mut self,
        params: &mut [f32],
        grad: &mut [f32],
        loss_fn: &L,
        optimizer: &mut O,
        batches: I,
    ) -> Result<f32>
    where
        L: LossFn,
        O: Optimizer,
        I: Iterator<Item = Result<(ArrayD<f32>, Array2<f32>)>>,
    {
        self.check_size(grad.len())?;
        let mut total_loss = 0.0;
        let mut num_batches = 0;

        for batch in batches {
            let (x, y) = batch?;
            grad.fill(0.);

            let y_pred = self.forward(params, x, Pass::Train)?;
            if y_pred.dim() != y.dim() {
                return Err(MlErr::SizeMismatch {
                    what: "model outputs",
                    got: y_pred.ncols(),
                    expected: y.ncols(),
                });
            }

            total_loss += loss_fn.loss(y_pred.view(), y.view());
            num_batches += 1;

            let d = loss_fn.loss_prime(y_pred.view(), y.view());
            self.backward(params, grad, d.into_dyn())?;
            optimizer.update_params(params, grad)?;
        }

        if num_batches == 0 {
            return Err(MlErr::EmptyDataset);
        }

        Ok(total_loss / num_batches as f32)
    }

    fn predict(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<Array2<f32>> {
        self.forward(params, x, Pass::Eval)
    }
}
