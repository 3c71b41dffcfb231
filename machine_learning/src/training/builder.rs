use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{ModelTrainer, Trainer};
use crate::{
    MlErr, Result,
    arch::{
        Model, Sequential,
        activations::ActFn,
        layers::{AvgPool2d, Conv2d, Dense, Dropout, Flatten, Layer},
        loss::{LossFn, Mse},
    },
    optimization::{Adam, GradientDescent, Optimizer},
    specs::{ActFnSpec, LayerSpec, LossFnSpec, ModelSpec, OptimizerSpec, TrainerSpec},
};

/// Builds `Trainer`s given a specification.
#[derive(Default)]
pub struct TrainerBuilder;

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new `Trainer` following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification for the trainer.
    ///
    /// # Returns
    /// The trainer or `MlErr::InvalidSpec` if any of its parts is malformed.
    pub fn build(&self, spec: &TrainerSpec) -> Result<Box<dyn Trainer>> {
        let mut rng = self.generate_rng(spec.seed);
        self.resolve_model(spec, &mut rng)
    }

    fn resolve_model(&self, spec: &TrainerSpec, rng: &mut StdRng) -> Result<Box<dyn Trainer>> {
        match &spec.model {
            ModelSpec::Sequential {
                layers: layer_specs,
            } => {
                if layer_specs.is_empty() {
                    return Err(MlErr::InvalidSpec("a model needs at least one layer".into()));
                }

                let layers = layer_specs
                    .iter()
                    .map(|&ls| self.resolve_layer(ls, rng))
                    .collect::<Result<Vec<_>>>()?;

                let model = Sequential::new(layers);
                self.resolve_optimizer(spec, model, rng)
            }
        }
    }

    fn resolve_layer(&self, spec: LayerSpec, rng: &mut StdRng) -> Result<Layer> {
        let layer = match spec {
            LayerSpec::Dense { dim, act_fn } => {
                if dim.0 == 0 || dim.1 == 0 {
                    return Err(MlErr::InvalidSpec(format!("invalid dense dim {dim:?}")));
                }

                Layer::Dense(Dense::new(dim, self.resolve_act_fn(act_fn)))
            }
            LayerSpec::Conv2d {
                kernel,
                in_channels,
                filters,
                act_fn,
            } => {
                if kernel == 0 || in_channels == 0 || filters == 0 {
                    return Err(MlErr::InvalidSpec("conv layers need non zero sizes".into()));
                }

                let act_fn = self.resolve_act_fn(act_fn);
                Layer::Conv2d(Conv2d::new(kernel, in_channels, filters, act_fn))
            }
            LayerSpec::AvgPool2d { pool } => {
                if pool == 0 {
                    return Err(MlErr::InvalidSpec("pool size must be non zero".into()));
                }

                Layer::AvgPool2d(AvgPool2d::new(pool))
            }
            LayerSpec::Flatten => Layer::Flatten(Flatten::new()),
            LayerSpec::Dropout { rate } => {
                if !(0.0..1.0).contains(&rate) {
                    return Err(MlErr::InvalidSpec(format!("invalid dropout rate {rate}")));
                }

                Layer::Dropout(Dropout::new(rate, rng.random()))
            }
        };

        Ok(layer)
    }

    fn resolve_act_fn(&self, spec: Option<ActFnSpec>) -> Option<ActFn> {
        let act_fn = match spec? {
            ActFnSpec::Sigmoid { amp } => ActFn::sigmoid(amp),
            ActFnSpec::Relu => ActFn::relu(),
        };

        Some(act_fn)
    }

    fn resolve_optimizer(
        &self,
        spec: &TrainerSpec,
        model: Sequential,
        rng: &mut StdRng,
    ) -> Result<Box<dyn Trainer>> {
        match spec.optimizer {
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                let optimizer = Adam::new(model.size(), learning_rate, beta1, beta2, epsilon);
                self.resolve_loss(spec, model, optimizer, rng)
            }
            OptimizerSpec::GradientDescent { learning_rate } => {
                let optimizer = GradientDescent::new(learning_rate);
                self.resolve_loss(spec, model, optimizer, rng)
            }
        }
    }

    fn resolve_loss<O>(
        &self,
        spec: &TrainerSpec,
        model: Sequential,
        optimizer: O,
        rng: &mut StdRng,
    ) -> Result<Box<dyn Trainer>>
    where
        O: Optimizer + Send + 'static,
    {
        match spec.loss {
            LossFnSpec::Mse => {
                let loss = Mse::new();
                self.terminate_build(spec, model, optimizer, loss, rng)
            }
        }
    }

    fn terminate_build<O, L>(
        &self,
        spec: &TrainerSpec,
        model: Sequential,
        optimizer: O,
        loss: L,
        rng: &mut StdRng,
    ) -> Result<Box<dyn Trainer>>
    where
        O: Optimizer + Send + 'static,
        L: LossFn + Send + 'static,
    {
        let rng = StdRng::from_rng(rng);
        let trainer = ModelTrainer::new(model, optimizer, spec.epochs, spec.batch_size, loss, rng);
        Ok(Box::new(trainer))
    }

    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
