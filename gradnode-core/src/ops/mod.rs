//! # Node operations (`ops`)
//!
//! Every differentiable operation is a [`Function`](crate::autograd::Function)
//! implementation plus, where one exists, a public entry point taking
//! [`Variable`](crate::autograd::Variable)s and a [`Config`](crate::config::Config).
//!
//! ## Submodules:
//!
//! - [`linear`]: the affine transform and its two gradient nodes.
//! - [`dropout`]: stochastic masking and its gradient node.
//! - [`basic`]: dtype conversion, row reduction/broadcast and reshape, used
//!   by the gradient compositions above.
//!
//! Backward passes in this module never compute closed-form partials
//! directly: they apply nodes from this module to the upstream gradients,
//! so every gradient can itself be differentiated.

use crate::autograd::TensorMeta;
use crate::error::GradNodeError;

pub mod basic;
pub mod dropout;
pub mod linear;

#[cfg(test)]
mod basic_test;
#[cfg(test)]
mod dropout_test;

pub use dropout::{dropout, Dropout, DropoutGrad};
pub use linear::{linear, Linear, LinearGradData, LinearGradWeight};

/// Fails with `Validation` naming `constraint` unless `holds`.
pub(crate) fn expect(
    operation: &str,
    holds: bool,
    constraint: impl FnOnce() -> String,
) -> Result<(), GradNodeError> {
    if holds {
        Ok(())
    } else {
        Err(GradNodeError::validation(operation, constraint()))
    }
}

/// Checks a single floating-point input.
pub(crate) fn expect_single_float(
    operation: &str,
    inputs: &[TensorMeta],
) -> Result<(), GradNodeError> {
    expect(operation, inputs.len() == 1, || {
        format!("expected 1 input, got {}", inputs.len())
    })?;
    expect(operation, inputs[0].dtype.is_float(), || {
        format!("input dtype must be floating point, got {:?}", inputs[0].dtype)
    })
}
