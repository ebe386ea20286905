use std::fmt;
use std::sync::Arc;

use crate::autograd::node::FunctionNode;
use crate::device::StorageDevice;
use crate::tensor::Tensor;
use crate::types::DType;

/// A value in the differentiable graph.
///
/// A `Variable` pairs a shared, read-only [`Tensor`] with the node that
/// produced it (its *creator*). Leaves have no creator. Cloning a variable
/// is cheap and keeps the same tensor and creator.
#[derive(Clone)]
pub struct Variable {
    tensor: Tensor,
    creator: Option<Arc<FunctionNode>>,
    requires_grad: bool,
}

impl Variable {
    /// Creates a trainable leaf.
    pub fn new(tensor: Tensor) -> Self {
        Variable {
            tensor,
            creator: None,
            requires_grad: true,
        }
    }

    pub(crate) fn from_node(tensor: Tensor, creator: Arc<FunctionNode>, requires_grad: bool) -> Self {
        Variable {
            tensor,
            creator: Some(creator),
            requires_grad,
        }
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// The node whose output this variable is, if any.
    pub fn creator(&self) -> Option<&Arc<FunctionNode>> {
        self.creator.as_ref()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn is_leaf(&self) -> bool {
        self.creator.is_none()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.tensor.shape()
    }

    pub fn rank(&self) -> usize {
        self.tensor.rank()
    }

    pub fn dtype(&self) -> DType {
        self.tensor.dtype()
    }

    pub fn device(&self) -> StorageDevice {
        self.tensor.device()
    }
}

/// Wraps a plain tensor as a non-trainable leaf.
impl From<Tensor> for Variable {
    fn from(tensor: Tensor) -> Self {
        Variable {
            tensor,
            creator: None,
            requires_grad: false,
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("tensor", &self.tensor)
            .field("creator", &self.creator.as_ref().map(|node| node.kind()))
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}
