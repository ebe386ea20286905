use std::any::Any;

use crate::autograd::{BackwardContext, ForwardContext, Function, NodeKind, TensorMeta, Variable};
use crate::backend::reference;
use crate::error::GradNodeError;
use crate::ops::{expect, expect_single_float};
use crate::tensor::Tensor;
use crate::types::DType;

/// Converts its input to `target`. Backward casts the gradient back to the
/// input's dtype.
#[derive(Debug)]
pub struct Cast {
    target: DType,
    source: Option<DType>,
}

impl Cast {
    pub fn new(target: DType) -> Self {
        Cast {
            target,
            source: None,
        }
    }
}

impl Function for Cast {
    fn kind(&self) -> NodeKind {
        NodeKind::Cast
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn check_type_forward(&self, inputs: &[TensorMeta]) -> Result<(), GradNodeError> {
        expect_single_float("cast", inputs)?;
        expect("cast", self.target.is_float(), || {
            format!("target dtype must be floating point, got {:?}", self.target)
        })
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        _ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        self.source = Some(inputs[0].dtype());
        Ok(vec![reference::cast(&inputs[0], self.target)?])
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
        let source = self
            .source
            .ok_or_else(|| GradNodeError::contract("cast", "source dtype unknown before forward"))?;
        Ok(vec![ctx.cast(&grad_outputs[0], source)?])
    }
}

/// Column-wise sum of a matrix, `[rows, cols] -> [cols]`.
#[derive(Debug, Default)]
pub struct SumRows {
    rows: usize,
}

impl Function for SumRows {
    fn kind(&self) -> NodeKind {
        NodeKind::SumRows
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn check_type_forward(&self, inputs: &[TensorMeta]) -> Result<(), GradNodeError> {
        expect_single_float("sum_rows", inputs)?;
        expect("sum_rows", inputs[0].rank() == 2, || {
            format!("input must have rank 2, got shape {:?}", inputs[0].shape)
        })
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        _ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        self.rows = inputs[0].shape()[0];
        Ok(vec![reference::sum_rows(&inputs[0])?])
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
        Ok(vec![ctx.apply_single(BroadcastRows::new(self.rows), grad_outputs)?])
    }
}

/// Repeats a vector as the rows of a matrix, `[cols] -> [rows, cols]`.
#[derive(Debug)]
pub struct BroadcastRows {
    rows: usize,
}

impl BroadcastRows {
    pub fn new(rows: usize) -> Self {
        BroadcastRows { rows }
    }
}

impl Function for BroadcastRows {
    fn kind(&self) -> NodeKind {
        NodeKind::BroadcastRows
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn check_type_forward(&self, inputs: &[TensorMeta]) -> Result<(), GradNodeError> {
        expect_single_float("broadcast_rows", inputs)?;
        expect("broadcast_rows", inputs[0].rank() == 1, || {
            format!("input must have rank 1, got shape {:?}", inputs[0].shape)
        })
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        _ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        Ok(vec![reference::broadcast_rows(&inputs[0], self.rows)?])
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
        Ok(vec![ctx.sum_rows(&grad_outputs[0])?])
    }
}

/// Gives its input a new shape with the same number of elements.
#[derive(Debug)]
pub struct Reshape {
    shape: Vec<usize>,
    source: Vec<usize>,
}

impl Reshape {
    pub fn new(shape: Vec<usize>) -> Self {
        Reshape {
            shape,
            source: Vec::new(),
        }
    }
}

impl Function for Reshape {
    fn kind(&self) -> NodeKind {
        NodeKind::Reshape
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn check_type_forward(&self, inputs: &[TensorMeta]) -> Result<(), GradNodeError> {
        expect("reshape", inputs.len() == 1, || {
            format!("expected 1 input, got {}", inputs.len())
        })?;
        let numel: usize = inputs[0].shape.iter().product();
        let target: usize = self.shape.iter().product();
        expect("reshape", numel == target, || {
            format!("cannot reshape {:?} into {:?}", inputs[0].shape, self.shape)
        })
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        _ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        self.source = inputs[0].shape();
        Ok(vec![inputs[0].reshape(self.shape.clone())?])
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
        Ok(vec![ctx.apply_single(Reshape::new(self.source.clone()), grad_outputs)?])
    }
}
