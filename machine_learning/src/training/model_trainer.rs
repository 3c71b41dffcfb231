use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicBool, Ordering},
};

use log::debug;
use ndarray::{Array2, ArrayD};
use rand::Rng;

use super::{EpochStats, Trainer};
use crate::{
    MlErr, Result,
    arch::{Model, Sequential, loss::LossFn},
    dataset::Dataset,
    optimization::Optimizer,
};

/// A model `Trainer`. Contains the relevant components needed for training a model,
/// including the model itself.
pub struct ModelTrainer<O, L, R>
where
    O: Optimizer,
    L: LossFn,
    R: Rng,
{
    model: Sequential,
    optimizer: O,
    loss_fn: L,
    grad: Vec<f32>,

    epochs: NonZeroUsize,
    batch_size: NonZeroUsize,
    rng: R,
}

impl<O, L, R> ModelTrainer<O, L, R>
where
    O: Optimizer,
    L: LossFn,
    R: Rng,
{
    /// Returns a new `ModelTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `optimizer` - The optimizer that steps the parameters after each batch.
    /// * `epochs` - The amount of epochs to run per `train` call.
    /// * `batch_size` - The maximum amount of samples per batch.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output and the expected one.
    /// * `rng` - A random number generator.
    pub fn new(
        model: Sequential,
        optimizer: O,
        epochs: NonZeroUsize,
        batch_size: NonZeroUsize,
        loss_fn: L,
        rng: R,
    ) -> Self {
        Self {
            grad: vec![0.; model.size()],
            model,
            optimizer,
            epochs,
            batch_size,
            loss_fn,
            rng,
        }
    }

    fn evaluate(&mut self, params: &[f32], dataset: &Dataset) -> Result<f32> {
        if dataset.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let (x, y) = dataset.all()?;
        let y_pred = self.model.predict(params, x)?;
        Ok(self.loss_fn.loss(y_pred.view(), y.view()))
    }
}

impl<O, L, R> Trainer for ModelTrainer<O, L, R>
where
    O: Optimizer + Send,
    L: LossFn + Send,
    R: Rng + Send,
{
    fn size(&self) -> usize {
        self.model.size()
    }

    fn init_params(&mut self) -> Result<Vec<f32>> {
        self.model.init_params(&mut self.rng)
    }

    fn train(
        &mut self,
        params: &mut [f32],
        dataset: &mut Dataset,
        validation: Option<&Dataset>,
        interrupt: &AtomicBool,
    ) -> Result<Vec<EpochStats>> {
        if dataset.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let epochs = self.epochs.get();
        let mut stats = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            if interrupt.load(Ordering::Relaxed) {
                debug!("interrupted before epoch {epoch}");
                return Err(MlErr::Interrupted { epoch });
            }

            dataset.shuffle(&mut self.rng);
            let batches = dataset.batches(self.batch_size);

            let loss = self.model.backprop(
                params,
                &mut self.grad,
                &self.loss_fn,
                &mut self.optimizer,
                batches,
            )?;

            let val_loss = match validation {
                Some(val) if !val.is_empty() => Some(self.evaluate(params, val)?),
                _ => None,
            };

            debug!("finished epoch {epoch}: loss={loss} val_loss={val_loss:?}");
            stats.push(EpochStats {
                epoch,
                loss,
                val_loss,
            });
        }

        Ok(stats)
    }

    fn predict(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<Array2<f32>> {
        self.model.predict(params, x)
    }
}
