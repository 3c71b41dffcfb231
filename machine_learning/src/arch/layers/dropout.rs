use ndarray::ArrayD;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::arch::Pass;

/// Inverted dropout: during training each unit is zeroed with probability `rate` and the survivors
/// are scaled by `1 / (1 - rate)`, evaluation is the identity.
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f32,
    rng: StdRng,
    mask: Option<ArrayD<f32>>,
}

impl Dropout {
    pub fn new(rate: f32, seed: u64) -> Self {
        Self {
            rate: rate.clamp(0., 0.99),
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>, pass: Pass) -> ArrayD<f32> {
        if pass == Pass::Eval || self.rate == 0. {
            self.mask = None;
            return x;
        }

        let keep = 1. - self.rate;
        let rng = &mut self.rng;
        let mask = x.mapv(|_| {
            if rng.random_bool(keep as f64) {
                1. / keep
            } else {
                0.
            }
        });

        let y = &x * &mask;
        self.mask = Some(mask);
        y
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> ArrayD<f32> {
        match self.mask.take() {
            Some(mask) => d * mask,
            None => d,
        }
    }
}
