mod conv;
mod dense;
mod dropout;
mod flatten;
mod layer;
mod pool;

pub use conv::Conv2d;
pub use dense::Dense;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use layer::Layer;
pub use pool::AvgPool2d;

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::{MlErr, Result};

/// Fills `w` with samples of the Xavier (Glorot) uniform distribution.
pub(crate) fn xavier_uniform<R: Rng + ?Sized>(
    w: &mut [f32],
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Result<()> {
    let limit = (6. / (fan_in + fan_out).max(1) as f32).sqrt();
    let dist = Uniform::new(-limit, limit).map_err(|e| MlErr::InvalidInit(e.to_string()))?;
    w.iter_mut().for_each(|w| *w = dist.sample(rng));
    Ok(())
}
