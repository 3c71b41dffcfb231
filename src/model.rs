use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::info;
use machine_learning::{
    dataset::Dataset,
    specs::{ActFnSpec, LayerSpec, LossFnSpec, ModelSpec, TrainerSpec},
    training::{EpochStats, Trainer, TrainerBuilder},
};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::{
    GazeError, Result,
    collector::Sample,
    config::TrainingConfig,
    features::{InputSchema, ensure_len},
};

/// How the batch size follows the size of the training set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// `round(fraction * n)` clamped to `[min, max]`.
    Proportional { fraction: f32, min: usize, max: usize },
    Fixed { size: NonZeroUsize },
}

impl BatchPolicy {
    pub fn batch_size(&self, n: usize) -> NonZeroUsize {
        let size = match *self {
            Self::Proportional { fraction, min, max } => {
                ((fraction * n as f32).round() as usize).clamp(min, max.max(min))
            }
            Self::Fixed { size } => size.get(),
        };

        NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self::Proportional {
            fraction: 0.1,
            min: 4,
            max: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Untrained,
    Training,
    Ready,
}

/// The outcome of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub val_samples: usize,
    pub batch_size: usize,
    pub epochs: Vec<EpochStats>,
}

/// Regresses normalized gaze coordinates from feature vectors or eye images.
pub struct GazeModel {
    input: InputSchema,
    training: TrainingConfig,
    seed: Option<u64>,
    state: ModelState,
    trainer: Option<Box<dyn Trainer>>,
    params: Vec<f32>,
    interrupt: Arc<AtomicBool>,
}

impl GazeModel {
    /// Creates a new untrained `GazeModel`.
    ///
    /// # Arguments
    /// * `input` - The input schema, it picks the dense or convolutional architecture.
    /// * `training` - The training hyperparameters.
    /// * `seed` - Seeds weight initialization, shuffling and dropout.
    pub fn new(input: InputSchema, training: TrainingConfig, seed: Option<u64>) -> Self {
        Self {
            input,
            training,
            seed,
            state: ModelState::Untrained,
            trainer: None,
            params: Vec::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn input(&self) -> InputSchema {
        self.input
    }

    /// Returns the flag that stops a running `fit` before its next epoch.
    ///
    /// The flag is sticky: once set every `fit` aborts until `reset` clears it.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Returns the layers of the architecture matching the input schema.
    pub fn layers(input: InputSchema) -> Result<Vec<LayerSpec>> {
        match input {
            InputSchema::Features { schema } => Ok(vec![
                LayerSpec::Dense {
                    dim: (schema.len(), 50),
                    act_fn: None,
                },
                LayerSpec::Dense {
                    dim: (50, 50),
                    act_fn: Some(ActFnSpec::Sigmoid { amp: 1. }),
                },
                LayerSpec::Dense {
                    dim: (50, 2),
                    act_fn: None,
                },
            ]),
            InputSchema::Image { height, width } => {
                const KERNEL: usize = 5;
                const FILTERS: usize = 20;
                const POOL: usize = 2;

                let block = |d: usize| d.checked_sub(KERNEL - 1).map(|d| d / POOL);
                let side = |d: usize| block(d).and_then(block).filter(|&d| d > 0);
                let (Some(h), Some(w)) = (side(height), side(width)) else {
                    return Err(GazeError::InvalidConfig(format!(
                        "a {height}x{width} image is too small for the convolutional model"
                    )));
                };

                let relu = Some(ActFnSpec::Relu);
                let conv = |in_channels| LayerSpec::Conv2d {
                    kernel: KERNEL,
                    in_channels,
                    filters: FILTERS,
                    act_fn: relu,
                };

                Ok(vec![
                    conv(InputSchema::IMAGE_CHANNELS),
                    LayerSpec::AvgPool2d { pool: POOL },
                    conv(FILTERS),
                    LayerSpec::AvgPool2d { pool: POOL },
                    LayerSpec::Flatten,
                    LayerSpec::Dense {
                        dim: (h * w * FILTERS, 128),
                        act_fn: relu,
                    },
                    LayerSpec::Dense {
                        dim: (128, 128),
                        act_fn: relu,
                    },
                    LayerSpec::Dropout { rate: 0.2 },
                    LayerSpec::Dense {
                        dim: (128, 2),
                        act_fn: None,
                    },
                ])
            }
        }
    }

    /// Trains the model from scratch.
    ///
    /// # Arguments
    /// * `train` - The samples to fit.
    /// * `val` - The held out samples, evaluated after every epoch.
    ///
    /// # Errors
    /// Any failure is wrapped in `TrainingAborted` and leaves the model untrained.
    pub fn fit(&mut self, train: &[Sample], val: &[Sample]) -> Result<TrainingReport> {
        self.state = ModelState::Training;

        match self.try_fit(train, val) {
            Ok(report) => {
                self.state = ModelState::Ready;
                Ok(report)
            }
            Err(e) => {
                self.discard();
                Err(GazeError::TrainingAborted(Box::new(e)))
            }
        }
    }

    /// Maps a single input to a normalized gaze coordinate.
    ///
    /// # Errors
    /// `ModelNotReady` before training finished, `SchemaMismatch` if `input` has the wrong length.
    pub fn predict(&mut self, input: &[f32]) -> Result<[f32; 2]> {
        let (ModelState::Ready, Some(trainer)) = (self.state, self.trainer.as_mut()) else {
            return Err(GazeError::ModelNotReady);
        };

        ensure_len(self.input.len(), input.len())?;

        let mut shape = vec![1];
        shape.extend(self.input.shape());
        let x = ArrayD::from_shape_vec(IxDyn(&shape), input.to_vec())
            .map_err(machine_learning::MlErr::from)?;

        let y = trainer.predict(&self.params, x)?;
        Ok([y[[0, 0]], y[[0, 1]]])
    }

    /// Drops the trained parameters and clears the interrupt flag.
    pub fn reset(&mut self) {
        self.discard();
        self.interrupt.store(false, Ordering::Relaxed);
    }

    fn discard(&mut self) {
        self.state = ModelState::Untrained;
        self.trainer = None;
        self.params.clear();
    }

    fn try_fit(&mut self, train: &[Sample], val: &[Sample]) -> Result<TrainingReport> {
        let expected = self.input.len();
        for sample in train.iter().chain(val) {
            ensure_len(expected, sample.input.len())?;
        }

        let batch_size = self.training.batch.batch_size(train.len());
        let spec = TrainerSpec {
            model: ModelSpec::Sequential {
                layers: Self::layers(self.input)?,
            },
            optimizer: self.training.optimizer,
            loss: LossFnSpec::Mse,
            epochs: self.training.epochs,
            batch_size,
            seed: self.seed,
        };

        let mut trainer = TrainerBuilder::new().build(&spec)?;
        let mut params = trainer.init_params()?;
        let mut train_set = dataset(self.input, train)?;
        let val_set = dataset(self.input, val)?;

        info!(
            "training on {} samples ({} validation), batch size {batch_size}",
            train.len(),
            val.len()
        );

        let epochs = trainer.train(&mut params, &mut train_set, Some(&val_set), &self.interrupt)?;
        if let Some(last) = epochs.last() {
            info!(loss = last.loss; "training finished after {} epochs", epochs.len());
        }

        self.trainer = Some(trainer);
        self.params = params;

        Ok(TrainingReport {
            train_samples: train.len(),
            val_samples: val.len(),
            batch_size: batch_size.get(),
            epochs,
        })
    }
}

fn dataset(input: InputSchema, samples: &[Sample]) -> Result<Dataset> {
    let xs = samples.iter().flat_map(|s| s.input.iter().copied()).collect();
    let ys = samples.iter().flat_map(|s| s.target).collect();
    Ok(Dataset::new(xs, input.shape(), ys, 2)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSchema;

    fn derived() -> InputSchema {
        InputSchema::Features {
            schema: FeatureSchema::Derived,
        }
    }

    fn training(epochs: usize) -> TrainingConfig {
        TrainingConfig {
            epochs: NonZeroUsize::new(epochs).unwrap(),
            ..TrainingConfig::default()
        }
    }

    fn samples(n: usize, len: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                Sample {
                    input: (0..len).map(|j| (j as f32 * 0.01 + t).sin()).collect(),
                    target: [t * 2. - 1., 1. - t * 2.],
                }
            })
            .collect()
    }

    #[test]
    fn proportional_batches_are_clamped() {
        let policy = BatchPolicy::default();
        assert_eq!(policy.batch_size(10).get(), 4);
        assert_eq!(policy.batch_size(100).get(), 10);
        assert_eq!(policy.batch_size(125).get(), 13);
        assert_eq!(policy.batch_size(5000).get(), 64);

        let fixed = BatchPolicy::Fixed {
            size: NonZeroUsize::new(32).unwrap(),
        };
        assert_eq!(fixed.batch_size(3).get(), 32);
    }

    #[test]
    fn conv_layers_follow_the_image_size() {
        let layers = GazeModel::layers(InputSchema::Image {
            height: 32,
            width: 64,
        })
        .unwrap();

        // 32 -> 28 -> 14 -> 10 -> 5 and 64 -> 60 -> 30 -> 26 -> 13.
        assert!(layers.contains(&LayerSpec::Dense {
            dim: (5 * 13 * 20, 128),
            act_fn: Some(ActFnSpec::Relu),
        }));

        let too_small = InputSchema::Image {
            height: 15,
            width: 64,
        };
        assert!(GazeModel::layers(too_small).is_err());
    }

    #[test]
    fn fit_makes_the_model_ready() {
        let mut model = GazeModel::new(derived(), training(3), Some(5));
        assert!(matches!(model.predict(&[0.; 74]), Err(GazeError::ModelNotReady)));

        let report = model.fit(&samples(40, 74), &samples(8, 74)).unwrap();
        assert_eq!(model.state(), ModelState::Ready);
        assert_eq!(report.epochs.len(), 3);
        assert_eq!(report.batch_size, 4);
        assert!(report.epochs.iter().all(|e| e.val_loss.is_some()));

        let y = model.predict(&samples(1, 74)[0].input).unwrap();
        assert!(y.iter().all(|v| v.is_finite()));

        let err = model.predict(&[0.; 10]).unwrap_err();
        assert!(matches!(err, GazeError::SchemaMismatch { expected: 74, got: 10 }));
    }

    #[test]
    fn interrupted_fits_abort_until_reset() {
        let mut model = GazeModel::new(derived(), training(2), Some(5));
        model.interrupt_handle().store(true, Ordering::Relaxed);

        let err = model.fit(&samples(12, 74), &samples(2, 74)).unwrap_err();
        let GazeError::TrainingAborted(inner) = err else {
            panic!("expected an aborted training, got {err}");
        };
        assert!(matches!(
            *inner,
            GazeError::Ml(machine_learning::MlErr::Interrupted { epoch: 0 })
        ));
        assert_eq!(model.state(), ModelState::Untrained);
        assert!(model.fit(&samples(12, 74), &samples(2, 74)).is_err());

        model.reset();
        model.fit(&samples(12, 74), &samples(2, 74)).unwrap();
        assert_eq!(model.state(), ModelState::Ready);
    }

    #[test]
    fn mixed_schemas_abort_training() {
        let mut model = GazeModel::new(derived(), training(1), Some(5));
        let mut train = samples(10, 74);
        train.extend(samples(2, 372));

        let err = model.fit(&train, &samples(2, 74)).unwrap_err();
        let GazeError::TrainingAborted(inner) = err else {
            panic!("expected an aborted training, got {err}");
        };

        assert!(matches!(*inner, GazeError::SchemaMismatch { expected: 74, got: 372 }));
        assert_eq!(model.state(), ModelState::Untrained);
    }
}
