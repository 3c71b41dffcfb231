use std::sync::atomic::AtomicBool;

use ndarray::{Array2, ArrayD};

use crate::{Result, dataset::Dataset};

/// The loss figures of a single training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: f32,
    pub val_loss: Option<f32>,
}

/// The public interface of every trainer, independent of its model, optimizer and loss.
pub trait Trainer: Send {
    /// Returns the amount of parameters of the underlying model.
    fn size(&self) -> usize;

    /// Creates a freshly initialized parameter buffer.
    fn init_params(&mut self) -> Result<Vec<f32>>;

    /// Trains `params` over `dataset` for the configured amount of epochs.
    ///
    /// # Arguments
    /// * `params` - The model's parameters, updated in place.
    /// * `dataset` - The training samples, reshuffled each epoch.
    /// * `validation` - Samples evaluated after each epoch, if any.
    /// * `interrupt` - Checked before every epoch, once set training stops with `Interrupted`.
    ///
    /// # Returns
    /// The stats of every epoch, in order.
    fn train(
        &mut self,
        params: &mut [f32],
        dataset: &mut Dataset,
        validation: Option<&Dataset>,
        interrupt: &AtomicBool,
    ) -> Result<Vec<EpochStats>>;

    /// Runs the model on `x` in evaluation mode.
    fn predict(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<Array2<f32>>;
}
