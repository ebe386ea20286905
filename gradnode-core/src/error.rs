use crate::device::StorageDevice;
use crate::types::DType;
use thiserror::Error;

/// Error type for the gradnode framework.
///
/// The first four variants form the node-level taxonomy: validation failures
/// detected before any computation, inconsistent tensor backends on the
/// reference path, programming-contract violations during backward, and
/// invalid operation parameters at construction time. None of them is
/// transient; callers should not retry.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum GradNodeError {
    #[error("Invalid input for {operation}: {constraint}")]
    Validation {
        operation: String,
        constraint: String,
    },

    #[error("Inputs of {operation} live on different backends: {devices:?}")]
    BackendMismatch {
        operation: String,
        devices: Vec<StorageDevice>,
    },

    #[error("Contract violation in {operation}: {detail}")]
    ContractViolation { operation: String, detail: String },

    #[error("Cannot construct {operation}: {detail}")]
    Construction { operation: String, detail: String },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Tensor creation error: data length {data_len} does not match shape {shape:?}")]
    TensorCreationError { data_len: usize, shape: Vec<usize> },

    #[error("Device mismatch for operation '{operation}': expected {expected:?}, got {actual:?}")]
    DeviceMismatch {
        expected: StorageDevice,
        actual: StorageDevice,
        operation: String,
    },

    #[error("Unsupported dtype {dtype:?} for operation {operation}")]
    UnsupportedDType { dtype: DType, operation: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl GradNodeError {
    pub(crate) fn validation(operation: &str, constraint: impl Into<String>) -> Self {
        GradNodeError::Validation {
            operation: operation.to_string(),
            constraint: constraint.into(),
        }
    }

    pub(crate) fn contract(operation: &str, detail: impl Into<String>) -> Self {
        GradNodeError::ContractViolation {
            operation: operation.to_string(),
            detail: detail.into(),
        }
    }
}
