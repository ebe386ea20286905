// src/tensor/mod.rs

use std::fmt;
use std::sync::Arc;

use num_traits::Float;

use crate::buffer::{Buffer, CpuBuffer};
use crate::device::StorageDevice;
use crate::error::GradNodeError;
use crate::tensor_data::TensorData;
use crate::types::DType;

pub mod create;
pub mod utils;
mod view_methods;

#[cfg(test)]
mod view_methods_test;

pub use create::{from_vec_f32, full, rand_uniform, randn, zeros};

/// Floating element types the numeric kernels are generic over.
pub trait FloatElement: Float + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    /// Converts from `f64` with `as` semantics.
    fn from_f64_lossy(value: f64) -> Self;

    fn into_cpu_buffer(data: Vec<Self>) -> CpuBuffer;
}

impl FloatElement for f32 {
    const DTYPE: DType = DType::F32;

    fn from_f64_lossy(value: f64) -> Self {
        value as f32
    }

    fn into_cpu_buffer(data: Vec<Self>) -> CpuBuffer {
        CpuBuffer::F32(Arc::new(data))
    }
}

impl FloatElement for f64 {
    const DTYPE: DType = DType::F64;

    fn from_f64_lossy(value: f64) -> Self {
        value
    }

    fn into_cpu_buffer(data: Vec<Self>) -> CpuBuffer {
        CpuBuffer::F64(Arc::new(data))
    }
}

/// Represents a multi-dimensional array (tensor).
///
/// A `Tensor` is a cheap, shareable handle (`Arc<TensorData>`): clones share
/// both the metadata and the buffer. Tensor contents never change after they
/// are produced, so a tensor retained by a graph node, or a dropout mask
/// handed to its gradient node, is shared by reference and never copied.
#[derive(Clone)]
pub struct Tensor {
    pub(crate) data: Arc<TensorData>,
}

impl Tensor {
    pub(crate) fn from_data(data: TensorData) -> Self {
        Tensor {
            data: Arc::new(data),
        }
    }

    /// Creates a new Tensor with the given f32 data and shape on the CPU.
    pub fn new(data_vec: Vec<f32>, shape: Vec<usize>) -> Result<Self, GradNodeError> {
        Self::from_cpu_buffer(CpuBuffer::F32(Arc::new(data_vec)), shape)
    }

    /// Creates a new Tensor with the given f64 data and shape on the CPU.
    pub fn new_f64(data_vec: Vec<f64>, shape: Vec<usize>) -> Result<Self, GradNodeError> {
        Self::from_cpu_buffer(CpuBuffer::F64(Arc::new(data_vec)), shape)
    }

    pub fn new_i32(data_vec: Vec<i32>, shape: Vec<usize>) -> Result<Self, GradNodeError> {
        Self::from_cpu_buffer(CpuBuffer::I32(Arc::new(data_vec)), shape)
    }

    pub fn new_i64(data_vec: Vec<i64>, shape: Vec<usize>) -> Result<Self, GradNodeError> {
        Self::from_cpu_buffer(CpuBuffer::I64(Arc::new(data_vec)), shape)
    }

    /// Creates a CPU tensor from data of any floating element type.
    pub fn from_elements<T: FloatElement>(
        data_vec: Vec<T>,
        shape: Vec<usize>,
    ) -> Result<Self, GradNodeError> {
        Self::from_cpu_buffer(T::into_cpu_buffer(data_vec), shape)
    }

    fn from_cpu_buffer(buffer: CpuBuffer, shape: Vec<usize>) -> Result<Self, GradNodeError> {
        Ok(Self::from_data(TensorData::from_cpu_buffer(buffer, shape)?))
    }

    /// Creates a tensor that lives in device memory.
    ///
    /// Only its metadata is available on the host; any attempt to compute
    /// with it on the reference backend fails with `UnsupportedOperation`.
    pub fn placeholder_on_gpu(shape: Vec<usize>, dtype: DType) -> Self {
        Self::from_data(TensorData::new_on_device(shape, dtype, StorageDevice::GPU))
    }

    /// Gives read access to the underlying `TensorData`.
    pub fn read_data(&self) -> &TensorData {
        &self.data
    }

    /// Returns the data type (`DType`) of the tensor elements.
    pub fn dtype(&self) -> DType {
        self.data.dtype
    }

    /// Returns the device (`StorageDevice`) where the tensor's data resides.
    pub fn device(&self) -> StorageDevice {
        self.data.device
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data.shape.clone()
    }

    pub fn strides(&self) -> Vec<usize> {
        self.data.strides.clone()
    }

    pub fn rank(&self) -> usize {
        self.data.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.numel()
    }

    /// Checks if the tensor is row-major contiguous in memory.
    pub fn is_contiguous(&self) -> bool {
        self.data.is_contiguous()
    }

    /// Checks if the tensor is column-major contiguous in memory.
    pub fn is_f_contiguous(&self) -> bool {
        self.data.is_f_contiguous()
    }

    /// `true` when both handles point at the very same tensor.
    pub fn ptr_eq(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// `true` when both tensors read from the same buffer allocation.
    pub fn shares_buffer(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.data.buffer, &other.data.buffer)
    }

    /// Reads every element, in logical row-major order, converted to `T`.
    ///
    /// Works for any layout and any CPU dtype.
    pub fn to_vec_as<T: FloatElement>(&self) -> Result<Vec<T>, GradNodeError> {
        let guard = self.read_data();
        let offsets = guard.offsets();
        let values = match guard.buffer.as_ref() {
            Buffer::Cpu(CpuBuffer::F32(v)) => gather(&offsets, |o| v[o] as f64),
            Buffer::Cpu(CpuBuffer::F64(v)) => gather(&offsets, |o| v[o]),
            Buffer::Cpu(CpuBuffer::I32(v)) => gather(&offsets, |o| v[o] as f64),
            Buffer::Cpu(CpuBuffer::I64(v)) => gather(&offsets, |o| v[o] as f64),
            Buffer::Gpu { device, .. } => {
                return Err(GradNodeError::DeviceMismatch {
                    expected: StorageDevice::CPU,
                    actual: *device,
                    operation: "to_vec_as".to_string(),
                })
            }
        };
        Ok(values)
    }

    /// Attempts to get the tensor data as a `Vec<f32>`.
    /// Returns an error if the tensor is not on the CPU or not F32.
    pub fn get_f32_data(&self) -> Result<Vec<f32>, GradNodeError> {
        self.expect_dtype(DType::F32, "get_f32_data")?;
        self.to_vec_as::<f32>()
    }

    /// Attempts to get the tensor data as a `Vec<f64>`.
    /// Returns an error if the tensor is not on the CPU or not F64.
    pub fn get_f64_data(&self) -> Result<Vec<f64>, GradNodeError> {
        self.expect_dtype(DType::F64, "get_f64_data")?;
        self.to_vec_as::<f64>()
    }

    /// Reads any CPU tensor as `f64` values.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>, GradNodeError> {
        self.to_vec_as::<f64>()
    }

    fn expect_dtype(&self, dtype: DType, operation: &str) -> Result<(), GradNodeError> {
        if self.dtype() != dtype {
            return Err(GradNodeError::UnsupportedDType {
                dtype: self.dtype(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

fn gather<T: FloatElement>(offsets: &[usize], read: impl Fn(usize) -> f64) -> Vec<T> {
    offsets.iter().map(|&o| T::from_f64_lossy(read(o))).collect()
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.read_data();
        write!(
            f,
            "Tensor(shape={:?}, strides={:?}, offset={}, device={:?}, dtype={:?})",
            guard.shape, guard.strides, guard.offset, guard.device, guard.dtype
        )
    }
}
