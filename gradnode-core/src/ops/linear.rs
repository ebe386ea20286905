//! Affine transform `y = x · Wᵀ + b` and its gradient nodes.
//!
//! Backward never computes partial derivatives in closed form. The
//! gradient of `x` is a [`LinearGradData`] node and the gradient of `W` a
//! [`LinearGradWeight`] node, and each of those differentiates itself by
//! applying `linear` or the other gradient node again. Derivatives of any
//! order follow from these three nodes.

use std::any::Any;

use log::debug;

use crate::autograd::{
    BackwardContext, ForwardContext, Function, FunctionNode, NodeKind, TensorMeta, Variable,
};
use crate::backend::Requirements;
use crate::config::Config;
use crate::error::GradNodeError;
use crate::ops::basic::Reshape;
use crate::ops::expect;
use crate::tensor::Tensor;
use crate::types::DType;

/// Operand ranks the accelerated linear kernels accept (the bias is rank 1).
const LINEAR_RANKS: &[usize] = &[1, 2];

/// `(x: [B, N], W: [M, N], b: [M]?) -> y: [B, M]`.
///
/// Retains `x` and `W`. The bias is never retained: its gradient is a
/// column sum of the upstream gradient.
#[derive(Debug, Default)]
pub struct Linear;

impl Function for Linear {
    fn kind(&self) -> NodeKind {
        NodeKind::LinearForward
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn check_type_forward(&self, inputs: &[TensorMeta]) -> Result<(), GradNodeError> {
        let op = "linear";
        expect(op, (2..=3).contains(&inputs.len()), || {
            format!("expected 2 or 3 inputs, got {}", inputs.len())
        })?;
        let (x, w) = (&inputs[0], &inputs[1]);
        expect(op, x.dtype.is_float(), || {
            format!("x dtype must be floating point, got {:?}", x.dtype)
        })?;
        expect(op, w.dtype.is_float(), || {
            format!("W dtype must be floating point, got {:?}", w.dtype)
        })?;
        expect(op, x.rank() == 2, || format!("x must have rank 2, got shape {:?}", x.shape))?;
        expect(op, w.rank() == 2, || format!("W must have rank 2, got shape {:?}", w.shape))?;
        expect(op, x.shape[1] == w.shape[1], || {
            format!(
                "x.shape[1] == W.shape[1] does not hold: {} != {}",
                x.shape[1], w.shape[1]
            )
        })?;
        if let Some(b) = inputs.get(2) {
            expect(op, b.dtype == x.dtype, || {
                format!("b dtype must equal x dtype: {:?} != {:?}", b.dtype, x.dtype)
            })?;
            expect(op, b.rank() == 1, || format!("b must have rank 1, got shape {:?}", b.shape))?;
            expect(op, b.shape[0] == w.shape[0], || {
                format!(
                    "b.shape[0] == W.shape[0] does not hold: {} != {}",
                    b.shape[0], w.shape[0]
                )
            })?;
        }
        Ok(())
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        let operands: Vec<&Tensor> = inputs.iter().collect();
        let backend = ctx.select_backend("linear", &operands, &Requirements::ranks(LINEAR_RANKS))?;
        let y = backend.linear_forward(&inputs[0], &inputs[1], inputs.get(2))?;
        ctx.retain_inputs(&[0, 1]);
        Ok(vec![y])
    }

    fn backward(
        &self,
        ctx: &BackwardContext<'_>,
        indexes: &[usize],
        grad_outputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError> {
        let x = ctx.retained_input(0)?;
        let w = ctx.retained_input(1)?;
        let gy = &grad_outputs[0];

        let mut ret = Vec::with_capacity(indexes.len());
        for &index in indexes {
            match index {
                0 => {
                    let gx = ctx.apply_single(LinearGradData, &[gy.clone(), w.clone()])?;
                    ret.push(ctx.cast(&gx, x.dtype())?);
                }
                1 => {
                    let grad_weight = LinearGradWeight::new(w.dtype());
                    let gw = ctx.apply_single(grad_weight, &[x.clone(), gy.clone()])?;
                    ret.push(ctx.cast(&gw, w.dtype())?);
                }
                _ => ret.push(ctx.sum_rows(gy)?),
            }
        }
        Ok(ret)
    }
}

/// `(gy: [B, M], W: [M, N]) -> gx: [B, N] = gy · W`, in `gy`'s dtype.
#[derive(Debug, Default)]
pub struct LinearGradData;

impl Function for LinearGradData {
    fn kind(&self) -> NodeKind {
        NodeKind::LinearGradData
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        ctx.retain_inputs(&[0, 1]);
        let (gy, w) = (&inputs[0], &inputs[1]);
        let requirements = Requirements::ranks(LINEAR_RANKS);
        let backend = ctx.select_backend("linear_grad_data", &[gy, w], &requirements)?;
        Ok(vec![backend.linear_backward_data(gy, w)?])
    }

    fn backward(
        &self,
        ctx: &BackwardContext<'_>,
        indexes: &[usize],
        grad_outputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError> {
        let gy = ctx.retained_input(0)?;
        let w = ctx.retained_input(1)?;
        let ggx = &grad_outputs[0];

        let mut ret = Vec::with_capacity(indexes.len());
        for &index in indexes {
            if index == 0 {
                let ggy = ctx.linear(ggx, w, None)?;
                ret.push(ctx.cast(&ggy, gy.dtype())?);
            } else {
                let grad_weight = LinearGradWeight::new(w.dtype());
                let gw = ctx.apply_single(grad_weight, &[ggx.clone(), gy.clone()])?;
                ret.push(ctx.cast(&gw, w.dtype())?);
            }
        }
        Ok(ret)
    }
}

/// `(x: [B, N], gy: [B, M]) -> gW: [M, N] = gyᵀ · x`, in the weight dtype
/// given at construction.
///
/// The accelerated path is only taken for an `F32` weight.
#[derive(Debug)]
pub struct LinearGradWeight {
    w_dtype: DType,
}

impl LinearGradWeight {
    pub fn new(w_dtype: DType) -> Self {
        LinearGradWeight { w_dtype }
    }

    pub fn weight_dtype(&self) -> DType {
        self.w_dtype
    }
}

impl Function for LinearGradWeight {
    fn kind(&self) -> NodeKind {
        NodeKind::LinearGradWeight
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        ctx.retain_inputs(&[0, 1]);
        let (x, gy) = (&inputs[0], &inputs[1]);
        let f32_weight = self.w_dtype == DType::F32;
        if !f32_weight {
            debug!(
                "linear_grad_weight: weight dtype {:?} keeps the accelerated path off",
                self.w_dtype
            );
        }
        let requirements = Requirements::ranks(LINEAR_RANKS).allow_accelerated(f32_weight);
        let backend = ctx.select_backend("linear_grad_weight", &[x, gy], &requirements)?;
        Ok(vec![backend.linear_backward_weight(x, gy, self.w_dtype)?])
    }

    fn backward(
        &self,
        ctx: &BackwardContext<'_>,
        indexes: &[usize],
        grad_outputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError> {
        let x = ctx.retained_input(0)?;
        let gy = ctx.retained_input(1)?;
        let ggw = &grad_outputs[0];

        let mut ret = Vec::with_capacity(indexes.len());
        for &index in indexes {
            if index == 0 {
                let gx = ctx.apply_single(LinearGradData, &[gy.clone(), ggw.clone()])?;
                ret.push(ctx.cast(&gx, x.dtype())?);
            } else {
                let ggy = ctx.linear(x, ggw, None)?;
                ret.push(ctx.cast(&ggy, gy.dtype())?);
            }
        }
        Ok(ret)
    }
}

/// Linear function, or affine transformation: `y = x · Wᵀ + b`.
///
/// `x` has shape `[s_B, s_1, ..., s_n]`; every dimension after the first is
/// flattened into one of size `N = s_1 * ... * s_n`. `W` has shape `[M, N]`
/// and the optional `b` shape `[M]`. The result has shape `[s_B, M]`.
///
/// # Errors
/// `Validation` for inconsistent shapes or dtypes, `BackendMismatch` for
/// operands on different devices.
///
/// # Example
/// ```
/// use gradnode_core::{linear, Config, Tensor, Variable};
///
/// let x = Variable::new(Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![3, 2]).unwrap());
/// let w = Variable::new(Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0], vec![4, 2]).unwrap());
/// let y = linear(&x, &w, None, &Config::default()).unwrap();
/// assert_eq!(y.shape(), vec![3, 4]);
/// ```
pub fn linear(
    x: &Variable,
    w: &Variable,
    b: Option<&Variable>,
    config: &Config,
) -> Result<Variable, GradNodeError> {
    let x = if x.rank() > 2 {
        let shape = x.shape();
        let flat: usize = shape[1..].iter().product();
        let reshape = FunctionNode::new(Reshape::new(vec![shape[0], flat]), config);
        single_output(reshape.apply(std::slice::from_ref(x))?)?
    } else {
        x.clone()
    };

    let mut args = vec![x, w.clone()];
    if let Some(b) = b {
        args.push(b.clone());
    }
    single_output(FunctionNode::new(Linear, config).apply(&args)?)
}

pub(crate) fn single_output(outputs: Vec<Variable>) -> Result<Variable, GradNodeError> {
    outputs
        .into_iter()
        .next()
        .ok_or_else(|| GradNodeError::InternalError("node produced no output".to_string()))
}
