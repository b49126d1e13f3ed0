//! Optimizers with exportable state.
//!
//! Every optimizer updates the slice it's given in place and optionally owns only
//! a range of the model parameters.

mod adam;
mod gradient_descent;
mod momentum;

pub use adam::Adam;
pub use gradient_descent::GradientDescent;
pub use momentum::GradientDescentWithMomentum;

use crate::{MlErr, Result};

fn check_sizes(params: usize, grad: usize, state: Option<usize>) -> Result<()> {
    if params != grad {
        return Err(MlErr::SizeMismatch {
            what: "gradient",
            got: grad,
            expected: params,
        });
    }

    match state {
        Some(len) if len != params => Err(MlErr::SizeMismatch {
            what: "optimizer state",
            got: params,
            expected: len,
        }),
        _ => Ok(()),
    }
}
