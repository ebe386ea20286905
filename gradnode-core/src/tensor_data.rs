// src/tensor_data.rs
use std::fmt::Debug;
use std::sync::Arc;

use crate::buffer::{Buffer, CpuBuffer};
use crate::device::StorageDevice;
use crate::error::GradNodeError;
use crate::tensor::utils::{calculate_strides, logical_offsets};
use crate::types::DType;

/// Internal storage and metadata for a Tensor.
///
/// This struct holds the shared data buffer together with the layout
/// (shape, strides, offset), the device and the data type. It is immutable
/// once produced; views share the same `Arc<Buffer>` with new layout fields.
#[derive(Debug)]
pub struct TensorData {
    /// The underlying data buffer, shared between a tensor and its views.
    pub(crate) buffer: Arc<Buffer>,
    pub(crate) device: StorageDevice,
    pub(crate) dtype: DType,
    pub(crate) shape: Vec<usize>,
    /// Jump in elements required to move one step along each dimension.
    pub(crate) strides: Vec<usize>,
    /// The offset into the buffer for the first element (used for views).
    pub(crate) offset: usize,
}

impl TensorData {
    /// Creates contiguous CPU tensor data from an already typed buffer.
    ///
    /// # Errors
    /// Returns `GradNodeError::TensorCreationError` if the buffer length does
    /// not match the number of elements described by `shape`.
    pub(crate) fn from_cpu_buffer(
        cpu_buffer: CpuBuffer,
        shape: Vec<usize>,
    ) -> Result<Self, GradNodeError> {
        let numel: usize = shape.iter().product();
        let data_len = cpu_buffer.len();
        if data_len != numel {
            return Err(GradNodeError::TensorCreationError { data_len, shape });
        }
        let dtype = cpu_buffer.dtype();
        let strides = calculate_strides(&shape);
        Ok(TensorData {
            buffer: Arc::new(Buffer::Cpu(cpu_buffer)),
            device: StorageDevice::CPU,
            dtype,
            shape,
            strides,
            offset: 0,
        })
    }

    /// Creates metadata-only tensor data living in device memory.
    pub(crate) fn new_on_device(shape: Vec<usize>, dtype: DType, device: StorageDevice) -> Self {
        let len = shape.iter().product();
        let strides = calculate_strides(&shape);
        TensorData {
            buffer: Arc::new(Buffer::Gpu { device, dtype, len }),
            device,
            dtype,
            shape,
            strides,
            offset: 0,
        }
    }

    /// Creates a new `TensorData` representing a view of an existing buffer.
    ///
    /// No memory is allocated; the caller has validated that the view stays
    /// inside the buffer.
    pub(crate) fn new_view(
        buffer: Arc<Buffer>,
        offset: usize,
        shape: Vec<usize>,
        strides: Vec<usize>,
    ) -> Self {
        TensorData {
            device: buffer.device(),
            dtype: buffer.dtype(),
            buffer,
            shape,
            strides,
            offset,
        }
    }

    /// Provides immutable access to the underlying shared data buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Checks if the tensor is laid out in row-major (C) order without gaps.
    /// Dimensions of size 1 place no constraint on their stride.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1;
        for i in (0..self.shape.len()).rev() {
            let dim = self.shape[i];
            if dim == 0 {
                return true;
            }
            if dim != 1 {
                if self.strides[i] != expected {
                    return false;
                }
                expected *= dim;
            }
        }
        true
    }

    /// Checks if the tensor is laid out in column-major (Fortran) order without gaps.
    pub fn is_f_contiguous(&self) -> bool {
        let mut expected = 1;
        for i in 0..self.shape.len() {
            let dim = self.shape[i];
            if dim == 0 {
                return true;
            }
            if dim != 1 {
                if self.strides[i] != expected {
                    return false;
                }
                expected *= dim;
            }
        }
        true
    }

    /// Buffer offsets of every element, in logical row-major order.
    pub(crate) fn offsets(&self) -> Vec<usize> {
        logical_offsets(&self.shape, &self.strides, self.offset)
    }
}
