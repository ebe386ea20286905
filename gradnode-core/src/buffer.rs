use std::fmt::Debug;
use std::sync::Arc;

use crate::device::StorageDevice;
use crate::error::GradNodeError;
use crate::types::DType;

/// Enum representing different buffer types based on device and data type.
#[derive(Debug, Clone)]
pub enum Buffer {
    /// Data resides on the CPU.
    Cpu(CpuBuffer),
    /// Device memory. Only the metadata is tracked here; the allocation
    /// itself belongs to the device runtime.
    Gpu {
        device: StorageDevice,
        dtype: DType,
        len: usize,
    },
}

/// Enum for CPU-specific buffer types.
#[derive(Debug, Clone)]
pub enum CpuBuffer {
    F32(Arc<Vec<f32>>),
    F64(Arc<Vec<f64>>),
    I32(Arc<Vec<i32>>),
    I64(Arc<Vec<i64>>),
}

impl CpuBuffer {
    pub fn dtype(&self) -> DType {
        match self {
            CpuBuffer::F32(_) => DType::F32,
            CpuBuffer::F64(_) => DType::F64,
            CpuBuffer::I32(_) => DType::I32,
            CpuBuffer::I64(_) => DType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CpuBuffer::F32(v) => v.len(),
            CpuBuffer::F64(v) => v.len(),
            CpuBuffer::I32(v) => v.len(),
            CpuBuffer::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Buffer {
    pub fn dtype(&self) -> DType {
        match self {
            Buffer::Cpu(cpu) => cpu.dtype(),
            Buffer::Gpu { dtype, .. } => *dtype,
        }
    }

    pub fn device(&self) -> StorageDevice {
        match self {
            Buffer::Cpu(_) => StorageDevice::CPU,
            Buffer::Gpu { device, .. } => *device,
        }
    }

    /// Returns the CPU buffer, or `DeviceMismatch` for device memory.
    pub fn try_get_cpu(&self) -> Result<&CpuBuffer, GradNodeError> {
        match self {
            Buffer::Cpu(cpu) => Ok(cpu),
            Buffer::Gpu { device, .. } => Err(GradNodeError::DeviceMismatch {
                expected: StorageDevice::CPU,
                actual: *device,
                operation: "try_get_cpu".to_string(),
            }),
        }
    }

    /// Attempts to get a reference to the underlying `Arc<Vec<f32>>` if this is a CPU F32 buffer.
    pub fn try_get_cpu_f32(&self) -> Result<&Arc<Vec<f32>>, GradNodeError> {
        match self.try_get_cpu()? {
            CpuBuffer::F32(data_arc) => Ok(data_arc),
            other => Err(GradNodeError::UnsupportedDType {
                dtype: other.dtype(),
                operation: "try_get_cpu_f32".to_string(),
            }),
        }
    }
}
