use std::any::Any;
use std::fmt::Debug;

use crate::autograd::node::FunctionNode;
use crate::autograd::variable::Variable;
use crate::backend::{BackendSelector, ComputeBackend, Requirements};
use crate::config::Config;
use crate::device::StorageDevice;
use crate::error::GradNodeError;
use crate::ops::basic::{Cast, SumRows};
use crate::tensor::Tensor;
use crate::types::DType;

/// Tag identifying every node variant of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    LinearForward,
    LinearGradData,
    LinearGradWeight,
    DropoutForward,
    DropoutBackward,
    Cast,
    SumRows,
    BroadcastRows,
    Reshape,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::LinearForward => "linear",
            NodeKind::LinearGradData => "linear_grad_data",
            NodeKind::LinearGradWeight => "linear_grad_weight",
            NodeKind::DropoutForward => "dropout",
            NodeKind::DropoutBackward => "dropout_grad",
            NodeKind::Cast => "cast",
            NodeKind::SumRows => "sum_rows",
            NodeKind::BroadcastRows => "broadcast_rows",
            NodeKind::Reshape => "reshape",
        }
    }
}

/// What a type check gets to see of an input: its descriptor, never its data.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorMeta {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub device: StorageDevice,
}

impl TensorMeta {
    pub fn of(tensor: &Tensor) -> Self {
        TensorMeta {
            shape: tensor.shape(),
            dtype: tensor.dtype(),
            device: tensor.device(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Defines the interface shared by every differentiable node.
///
/// A `Function` is constructed with its parameters only. It is bound to its
/// inputs by [`FunctionNode`], which runs `check_type_forward` before any
/// computation, then `forward`, and later serves `backward` calls.
///
/// The trait requires `Debug + Send + Sync` because a node sealed into the
/// graph is shared through `Arc<FunctionNode>` by every output variable.
pub trait Function: Debug + Send + Sync {
    fn kind(&self) -> NodeKind;

    /// The function as `&dyn Any`, so a node's concrete function (and its
    /// parameters) can be recovered with [`FunctionNode::function`].
    fn as_any(&self) -> &dyn Any;

    /// Validates input descriptors.
    ///
    /// Runs before `forward` and must not have side effects. Failures are
    /// reported as [`GradNodeError::Validation`] naming the failed
    /// constraint.
    fn check_type_forward(&self, _inputs: &[TensorMeta]) -> Result<(), GradNodeError> {
        Ok(())
    }

    /// Computes the outputs from the input tensors.
    ///
    /// Inputs needed by `backward` must be marked through
    /// [`ForwardContext::retain_inputs`]; every other input is released once
    /// forward returns. Backends are chosen through
    /// [`ForwardContext::select_backend`].
    fn forward(
        &mut self,
        inputs: &[Tensor],
        ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError>;

    /// Computes the gradients of the requested inputs.
    ///
    /// # Arguments
    /// * `indexes`: strictly ascending input indexes, already range-checked.
    /// * `grad_outputs`: one upstream gradient per output.
    ///
    /// # Returns
    /// Exactly one gradient per entry of `indexes`, in the same order. The
    /// gradients are themselves graph values built by applying nodes through
    /// `ctx`, so they can be differentiated again.
    fn backward(
        &self,
        ctx: &BackwardContext<'_>,
        indexes: &[usize],
        grad_outputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError>;
}

/// State a node's `forward` can read and write.
pub struct ForwardContext<'a> {
    config: &'a Config,
    backends: &'a BackendSelector,
    retained: Vec<usize>,
}

impl<'a> ForwardContext<'a> {
    pub(crate) fn new(config: &'a Config, backends: &'a BackendSelector) -> Self {
        ForwardContext {
            config,
            backends,
            retained: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// Marks inputs to keep alive for backward. Replaces earlier marks.
    pub fn retain_inputs(&mut self, indexes: &[usize]) {
        self.retained = indexes.to_vec();
    }

    pub fn select_backend(
        &self,
        operation: &str,
        inputs: &[&Tensor],
        requirements: &Requirements<'_>,
    ) -> Result<&'a dyn ComputeBackend, GradNodeError> {
        self.backends.select(operation, inputs, requirements)
    }

    pub(crate) fn into_retained(self) -> Vec<usize> {
        self.retained
    }
}

/// State a node's `backward` can read, and the factory it builds gradient
/// nodes with.
pub struct BackwardContext<'a> {
    operation: &'static str,
    config: &'a Config,
    retained: &'a [Option<Variable>],
}

impl<'a> BackwardContext<'a> {
    pub(crate) fn new(
        operation: &'static str,
        config: &'a Config,
        retained: &'a [Option<Variable>],
    ) -> Self {
        BackwardContext {
            operation,
            config,
            retained,
        }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// A retained input.
    ///
    /// # Errors
    /// `ContractViolation` if input `index` was not retained in forward.
    pub fn retained_input(&self, index: usize) -> Result<&'a Variable, GradNodeError> {
        self.retained
            .get(index)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| {
                GradNodeError::contract(
                    self.operation,
                    format!("input {} was not retained for backward", index),
                )
            })
    }

    /// Builds a node from `function` and applies it to `inputs`.
    pub fn apply<F: Function + 'static>(
        &self,
        function: F,
        inputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError> {
        FunctionNode::new(function, self.config).apply(inputs)
    }

    /// Like [`apply`](Self::apply), for single-output nodes.
    pub fn apply_single<F: Function + 'static>(
        &self,
        function: F,
        inputs: &[Variable],
    ) -> Result<Variable, GradNodeError> {
        let kind = function.kind();
        self.apply(function, inputs)?.into_iter().next().ok_or_else(|| {
            GradNodeError::InternalError(format!("{} produced no output", kind.name()))
        })
    }

    /// Differentiable dtype conversion. No node is created when `v` already
    /// has `dtype`.
    pub fn cast(&self, v: &Variable, dtype: DType) -> Result<Variable, GradNodeError> {
        if v.dtype() == dtype {
            return Ok(v.clone());
        }
        self.apply_single(Cast::new(dtype), std::slice::from_ref(v))
    }

    /// Differentiable column-wise sum of a matrix.
    pub fn sum_rows(&self, v: &Variable) -> Result<Variable, GradNodeError> {
        self.apply_single(SumRows::default(), std::slice::from_ref(v))
    }

    /// The public linear operation, under this node's configuration.
    pub fn linear(
        &self,
        x: &Variable,
        w: &Variable,
        b: Option<&Variable>,
    ) -> Result<Variable, GradNodeError> {
        crate::ops::linear::linear(x, w, b, self.config)
    }
}
