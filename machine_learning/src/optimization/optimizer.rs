use crate::{MlErr, Result};

/// An algorithm that steps the parameters given their gradient.
pub trait Optimizer {
    /// Updates `params` in place using `grad`.
    ///
    /// # Errors
    /// Returns `MlErr::SizeMismatch` if the buffers don't have the length the optimizer was
    /// created for.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;
}

pub(super) fn check_len(params: &[f32], grad: &[f32]) -> Result<()> {
    if params.len() != grad.len() {
        return Err(MlErr::SizeMismatch {
            what: "gradient",
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}
