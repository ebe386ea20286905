use std::any::Any;

use log::{trace, warn};
use rand::rngs::StdRng;

use crate::autograd::{
    BackwardContext, ForwardContext, Function, FunctionNode, NodeKind, TensorMeta, Variable,
};
use crate::backend::{BackendKind, Requirements};
use crate::config::Config;
use crate::error::GradNodeError;
use crate::ops::expect_single_float;
use crate::ops::linear::single_output;
use crate::tensor::Tensor;

/// Input ranks the accelerated dropout kernels accept.
const DROPOUT_RANKS: &[usize] = &[2, 4];

/// Dropout regularization.
///
/// Every element is zeroed with probability `ratio` and otherwise scaled by
/// `1 / (1 - ratio)`. The mask drawn by the first forward call is kept on
/// the node: a later call on the reference path multiplies by the same
/// mask, while the accelerated path always draws a fresh one.
#[derive(Debug)]
pub struct Dropout {
    ratio: f64,
    mask: Option<Tensor>,
    rng: Option<StdRng>,
}

impl Dropout {
    /// # Errors
    /// `Construction` unless `0 <= ratio < 1`.
    pub fn new(ratio: f64) -> Result<Self, GradNodeError> {
        if !(0.0..1.0).contains(&ratio) {
            return Err(GradNodeError::Construction {
                operation: "dropout".to_string(),
                detail: format!("dropout ratio must be in the range [0, 1), got {}", ratio),
            });
        }
        Ok(Dropout {
            ratio,
            mask: None,
            rng: None,
        })
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// The mask of the last forward call, if any.
    pub fn mask(&self) -> Option<&Tensor> {
        self.mask.as_ref()
    }
}

impl Function for Dropout {
    fn kind(&self) -> NodeKind {
        NodeKind::DropoutForward
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn check_type_forward(&self, inputs: &[TensorMeta]) -> Result<(), GradNodeError> {
        expect_single_float("dropout", inputs)
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        let x = &inputs[0];
        let backend = ctx.select_backend("dropout", &[x], &Requirements::ranks(DROPOUT_RANKS))?;

        if backend.kind() != BackendKind::Accelerated {
            if let Some(mask) = &self.mask {
                if mask.shape() != x.shape() {
                    warn!(
                        "dropout: stored mask {:?} does not fit input {:?}",
                        mask.shape(),
                        x.shape()
                    );
                    return Err(GradNodeError::ShapeMismatch {
                        expected: mask.shape(),
                        actual: x.shape(),
                        operation: "dropout".to_string(),
                    });
                }
                trace!("dropout: reusing stored mask");
                return Ok(vec![backend.multiply(x, mask)?]);
            }
        }

        let rng = self.rng.get_or_insert_with(|| ctx.config().make_rng());
        let (mask, y) = backend.dropout_forward(x, self.ratio, rng)?;
        self.mask = Some(mask);
        Ok(vec![y])
    }

    fn backward(
        &self,
        ctx: &BackwardContext<'_>,
        indexes: &[usize],
        grad_outputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError> {
        if indexes.is_empty() {
            return Ok(Vec::new());
        }
        let mask = self
            .mask
            .clone()
            .ok_or_else(|| GradNodeError::contract("dropout", "no mask has been drawn"))?;
        Ok(vec![ctx.apply_single(DropoutGrad::new(mask), grad_outputs)?])
    }
}

/// Multiplies the upstream gradient by a dropout mask.
///
/// The mask is shared with the [`Dropout`] node that drew it, never copied.
/// Its own backward applies a new `DropoutGrad` with the same mask.
#[derive(Debug)]
pub struct DropoutGrad {
    mask: Tensor,
}

impl DropoutGrad {
    pub fn new(mask: Tensor) -> Self {
        DropoutGrad { mask }
    }

    pub fn mask(&self) -> &Tensor {
        &self.mask
    }
}

impl Function for DropoutGrad {
    fn kind(&self) -> NodeKind {
        NodeKind::DropoutBackward
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn check_type_forward(&self, inputs: &[TensorMeta]) -> Result<(), GradNodeError> {
        expect_single_float("dropout_grad", inputs)
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        let gy = &inputs[0];
        let backend = ctx.select_backend(
            "dropout_grad",
            &[gy, &self.mask],
            &Requirements::ranks(DROPOUT_RANKS),
        )?;
        Ok(vec![backend.dropout_backward(&self.mask, gy)?])
    }

    fn backward(
        &self,
        ctx: &BackwardContext<'_>,
        indexes: &[usize],
        grad_outputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError> {
        if indexes.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ctx.apply_single(DropoutGrad::new(self.mask.clone()), grad_outputs)?])
    }
}

/// Drops elements of `x` randomly with probability `ratio` and scales the
/// rest by `1 / (1 - ratio)`.
///
/// Outside training mode (`config.train == false`) it does nothing and
/// returns `x` itself.
///
/// # Errors
/// `Construction` unless `0 <= ratio < 1`; `Validation` for a non-floating
/// input.
pub fn dropout(x: &Variable, ratio: f64, config: &Config) -> Result<Variable, GradNodeError> {
    if !config.train {
        return Ok(x.clone());
    }
    let node = FunctionNode::new(Dropout::new(ratio)?, config);
    single_output(node.apply(std::slice::from_ref(x))?)
}
