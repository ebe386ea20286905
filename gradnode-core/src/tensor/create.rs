// src/tensor/create.rs

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::GradNodeError;
use crate::tensor::{FloatElement, Tensor};
use crate::types::DType;

/// Creates a new CPU F32 Tensor from a Vec<f32> and shape.
pub fn from_vec_f32(data_vec: Vec<f32>, shape: Vec<usize>) -> Result<Tensor, GradNodeError> {
    Tensor::new(data_vec, shape)
}

/// Creates a new tensor filled with zeros with the specified shape and floating dtype.
pub fn zeros(shape: &[usize], dtype: DType) -> Result<Tensor, GradNodeError> {
    full(shape, 0.0, dtype)
}

/// Creates a new tensor filled with `value`, stored with the requested floating dtype.
pub fn full(shape: &[usize], value: f64, dtype: DType) -> Result<Tensor, GradNodeError> {
    let numel: usize = shape.iter().product();
    match dtype {
        DType::F32 => Tensor::new(vec![value as f32; numel], shape.to_vec()),
        DType::F64 => Tensor::new_f64(vec![value; numel], shape.to_vec()),
        other => Err(GradNodeError::UnsupportedDType {
            dtype: other,
            operation: "full".to_string(),
        }),
    }
}

/// Samples a tensor from the uniform distribution over `[0, 1)`.
pub fn rand_uniform<R: Rng + ?Sized>(
    shape: &[usize],
    dtype: DType,
    rng: &mut R,
) -> Result<Tensor, GradNodeError> {
    let numel: usize = shape.iter().product();
    match dtype {
        // Drawn at the target width so that f32 samples stay strictly below 1.
        DType::F32 => sample_into::<f32, R>(shape, numel, rng, |r| r.gen::<f32>() as f64),
        DType::F64 => sample_into::<f64, R>(shape, numel, rng, |r| r.gen::<f64>()),
        other => Err(GradNodeError::UnsupportedDType {
            dtype: other,
            operation: "rand_uniform".to_string(),
        }),
    }
}

/// Samples a tensor from the standard normal distribution.
pub fn randn<R: Rng + ?Sized>(
    shape: &[usize],
    dtype: DType,
    rng: &mut R,
) -> Result<Tensor, GradNodeError> {
    let normal = Normal::new(0.0f64, 1.0f64)
        .map_err(|e| GradNodeError::InternalError(format!("normal distribution: {}", e)))?;
    let numel: usize = shape.iter().product();
    match dtype {
        DType::F32 => sample_into::<f32, R>(shape, numel, rng, |r| normal.sample(r)),
        DType::F64 => sample_into::<f64, R>(shape, numel, rng, |r| normal.sample(r)),
        other => Err(GradNodeError::UnsupportedDType {
            dtype: other,
            operation: "randn".to_string(),
        }),
    }
}

fn sample_into<T: FloatElement, R: Rng + ?Sized>(
    shape: &[usize],
    numel: usize,
    rng: &mut R,
    mut draw: impl FnMut(&mut R) -> f64,
) -> Result<Tensor, GradNodeError> {
    let data: Vec<T> = (0..numel).map(|_| T::from_f64_lossy(draw(rng))).collect();
    Tensor::from_elements(data, shape.to_vec())
}
