use std::sync::Arc;

use crate::buffer::{Buffer, CpuBuffer};
use crate::error::GradNodeError;
use crate::tensor::utils::{calculate_strides, max_reachable_index};
use crate::tensor::Tensor;
use crate::tensor_data::TensorData;

impl Tensor {
    /// Swaps the two axes of a matrix without copying.
    pub fn transpose(&self) -> Result<Tensor, GradNodeError> {
        let guard = self.read_data();
        if guard.shape.len() != 2 {
            return Err(GradNodeError::UnsupportedOperation(format!(
                "transpose expects a rank-2 tensor, got shape {:?}",
                guard.shape
            )));
        }
        let shape = vec![guard.shape[1], guard.shape[0]];
        let strides = vec![guard.strides[1], guard.strides[0]];
        Ok(Tensor::from_data(TensorData::new_view(
            Arc::clone(&guard.buffer),
            guard.offset,
            shape,
            strides,
        )))
    }

    /// Creates a view with an arbitrary layout over this tensor's buffer.
    ///
    /// The layout is interpreted against the whole buffer (not relative to
    /// this tensor's own offset) and must stay inside it.
    pub fn as_strided(
        &self,
        shape: Vec<usize>,
        strides: Vec<usize>,
        offset: usize,
    ) -> Result<Tensor, GradNodeError> {
        if shape.len() != strides.len() {
            return Err(GradNodeError::UnsupportedOperation(format!(
                "as_strided: rank of shape {:?} does not match strides {:?}",
                shape, strides
            )));
        }
        let guard = self.read_data();
        let buffer_len = match guard.buffer.as_ref() {
            Buffer::Cpu(cpu) => cpu.len(),
            Buffer::Gpu { len, .. } => *len,
        };
        if let Some(max_index) = max_reachable_index(&shape, &strides, offset) {
            if max_index >= buffer_len {
                return Err(GradNodeError::UnsupportedOperation(format!(
                    "as_strided: view {:?}/{:?}+{} reaches index {} of a buffer of {} elements",
                    shape, strides, offset, max_index, buffer_len
                )));
            }
        }
        Ok(Tensor::from_data(TensorData::new_view(
            Arc::clone(&guard.buffer),
            offset,
            shape,
            strides,
        )))
    }

    /// Returns a row-major contiguous tensor with the same values.
    /// Already contiguous tensors are returned as a shared handle.
    pub fn contiguous(&self) -> Result<Tensor, GradNodeError> {
        let guard = self.read_data();
        if guard.is_contiguous() {
            return Ok(self.clone());
        }
        let offsets = guard.offsets();
        let shape = guard.shape.clone();
        let cpu_buffer = match guard.buffer.try_get_cpu()? {
            CpuBuffer::F32(v) => CpuBuffer::F32(Arc::new(offsets.iter().map(|&o| v[o]).collect())),
            CpuBuffer::F64(v) => CpuBuffer::F64(Arc::new(offsets.iter().map(|&o| v[o]).collect())),
            CpuBuffer::I32(v) => CpuBuffer::I32(Arc::new(offsets.iter().map(|&o| v[o]).collect())),
            CpuBuffer::I64(v) => CpuBuffer::I64(Arc::new(offsets.iter().map(|&o| v[o]).collect())),
        };
        Ok(Tensor::from_data(TensorData::from_cpu_buffer(cpu_buffer, shape)?))
    }

    /// Returns a tensor with the same elements and a new shape.
    ///
    /// Contiguous tensors are reshaped as views; others are copied first.
    pub fn reshape(&self, new_shape: Vec<usize>) -> Result<Tensor, GradNodeError> {
        let old_numel = self.numel();
        let new_numel: usize = new_shape.iter().product();
        if old_numel != new_numel {
            return Err(GradNodeError::ShapeMismatch {
                expected: self.shape(),
                actual: new_shape,
                operation: "reshape".to_string(),
            });
        }
        let source = self.contiguous()?;
        let guard = source.read_data();
        let strides = calculate_strides(&new_shape);
        Ok(Tensor::from_data(TensorData::new_view(
            Arc::clone(&guard.buffer),
            guard.offset,
            new_shape,
            strides,
        )))
    }
}
