use rand::rngs::StdRng;

use crate::backend::{normalize_degenerate_layout, BackendKind, ComputeBackend, Requirements};
use crate::device::StorageDevice;
use crate::error::GradNodeError;
use crate::tensor::{rand_uniform, FloatElement, Tensor};
use crate::types::DType;

/// Generic host kernels for every floating dtype.
///
/// Operands are computed in the wider of their dtypes and the result is cast
/// to the dtype the operation prescribes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceBackend;

impl ComputeBackend for ReferenceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Reference
    }

    fn is_ready(&self, _inputs: &[&Tensor], _requirements: &Requirements<'_>) -> bool {
        true
    }

    fn linear_forward(
        &self,
        x: &Tensor,
        w: &Tensor,
        b: Option<&Tensor>,
    ) -> Result<Tensor, GradNodeError> {
        ensure_host("linear", &[x, w])?;
        let x = normalize_degenerate_layout(x)?;
        let compute = DType::promote(x.dtype(), w.dtype());
        let y = matmul_in(compute, &x, false, w, true)?;
        let y = cast(&y, x.dtype())?;
        match b {
            Some(b) => {
                ensure_host("linear", &[b])?;
                add_row_vector(&y, b)
            }
            None => Ok(y),
        }
    }

    fn linear_backward_data(&self, gy: &Tensor, w: &Tensor) -> Result<Tensor, GradNodeError> {
        ensure_host("linear_grad_data", &[gy, w])?;
        let gy = normalize_degenerate_layout(gy)?;
        let compute = DType::promote(gy.dtype(), w.dtype());
        let gx = matmul_in(compute, &gy, false, w, false)?;
        cast(&gx, gy.dtype())
    }

    fn linear_backward_weight(
        &self,
        x: &Tensor,
        gy: &Tensor,
        w_dtype: DType,
    ) -> Result<Tensor, GradNodeError> {
        ensure_host("linear_grad_weight", &[x, gy])?;
        let gy = normalize_degenerate_layout(gy)?;
        let compute = DType::promote(x.dtype(), gy.dtype());
        let gw = matmul_in(compute, &gy, true, x, false)?;
        cast(&gw, w_dtype)
    }

    fn dropout_forward(
        &self,
        x: &Tensor,
        ratio: f64,
        rng: &mut StdRng,
    ) -> Result<(Tensor, Tensor), GradNodeError> {
        ensure_host("dropout", &[x])?;
        let noise = rand_uniform(&x.shape(), x.dtype(), rng)?;
        let mask = match x.dtype() {
            DType::F32 => scale_mask::<f32>(&noise, ratio)?,
            DType::F64 => scale_mask::<f64>(&noise, ratio)?,
            other => {
                return Err(GradNodeError::UnsupportedDType {
                    dtype: other,
                    operation: "dropout".to_string(),
                })
            }
        };
        let y = self.multiply(x, &mask)?;
        Ok((mask, y))
    }

    fn multiply(&self, a: &Tensor, mask: &Tensor) -> Result<Tensor, GradNodeError> {
        ensure_host("mul", &[a, mask])?;
        if a.shape() != mask.shape() {
            return Err(GradNodeError::ShapeMismatch {
                expected: mask.shape(),
                actual: a.shape(),
                operation: "mul".to_string(),
            });
        }
        match DType::promote(a.dtype(), mask.dtype()) {
            DType::F32 => mul_elementwise::<f32>(a, mask),
            _ => mul_elementwise::<f64>(a, mask),
        }
    }
}

fn ensure_host(operation: &str, inputs: &[&Tensor]) -> Result<(), GradNodeError> {
    for t in inputs {
        if t.device() != StorageDevice::CPU {
            return Err(GradNodeError::UnsupportedOperation(format!(
                "{}: the reference backend computes on host memory only, got a {:?} tensor",
                operation,
                t.device()
            )));
        }
    }
    Ok(())
}

fn float_only(dtype: DType, operation: &str) -> Result<(), GradNodeError> {
    if !dtype.is_float() {
        return Err(GradNodeError::UnsupportedDType {
            dtype,
            operation: operation.to_string(),
        });
    }
    Ok(())
}

/// Matrix product of two rank-2 tensors, each optionally transposed, in `dtype`.
fn matmul_in(
    dtype: DType,
    lhs: &Tensor,
    lhs_transposed: bool,
    rhs: &Tensor,
    rhs_transposed: bool,
) -> Result<Tensor, GradNodeError> {
    match dtype {
        DType::F32 => matmul::<f32>(lhs, lhs_transposed, rhs, rhs_transposed),
        DType::F64 => matmul::<f64>(lhs, lhs_transposed, rhs, rhs_transposed),
        other => Err(GradNodeError::UnsupportedDType {
            dtype: other,
            operation: "matmul".to_string(),
        }),
    }
}

/// Dense row-major view of a matrix as `(rows, cols, row_stride, col_stride)`,
/// with the axes swapped when `transposed`.
fn matrix_layout(t: &Tensor, transposed: bool) -> Result<(usize, usize, usize, usize), GradNodeError> {
    let shape = t.shape();
    if shape.len() != 2 {
        return Err(GradNodeError::UnsupportedOperation(format!(
            "matmul expects rank-2 operands, got shape {:?}",
            shape
        )));
    }
    let (rows, cols) = (shape[0], shape[1]);
    if transposed {
        Ok((cols, rows, 1, cols))
    } else {
        Ok((rows, cols, cols, 1))
    }
}

fn matmul<T: FloatElement>(
    lhs: &Tensor,
    lhs_transposed: bool,
    rhs: &Tensor,
    rhs_transposed: bool,
) -> Result<Tensor, GradNodeError> {
    let (m, k, a_rs, a_cs) = matrix_layout(lhs, lhs_transposed)?;
    let (k_rhs, n, b_rs, b_cs) = matrix_layout(rhs, rhs_transposed)?;
    if k != k_rhs {
        return Err(GradNodeError::ShapeMismatch {
            expected: vec![k, n],
            actual: vec![k_rhs, n],
            operation: "matmul".to_string(),
        });
    }
    let a = lhs.to_vec_as::<T>()?;
    let b = rhs.to_vec_as::<T>()?;
    let mut out = vec![T::zero(); m * n];
    for i in 0..m {
        let row = &mut out[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * a_rs + p * a_cs];
            for (j, o) in row.iter_mut().enumerate() {
                *o = *o + a_ip * b[p * b_rs + j * b_cs];
            }
        }
    }
    Tensor::from_elements(out, vec![m, n])
}

/// Converts a host tensor to `dtype`. Returns the same handle when the
/// dtype already matches.
pub(crate) fn cast(t: &Tensor, dtype: DType) -> Result<Tensor, GradNodeError> {
    if t.dtype() == dtype {
        return Ok(t.clone());
    }
    ensure_host("cast", &[t])?;
    match dtype {
        DType::F32 => Tensor::from_elements(t.to_vec_as::<f32>()?, t.shape()),
        DType::F64 => Tensor::from_elements(t.to_vec_as::<f64>()?, t.shape()),
        other => Err(GradNodeError::UnsupportedDType {
            dtype: other,
            operation: "cast".to_string(),
        }),
    }
}

/// Adds a rank-1 `row` to every row of the matrix `y`, in `y`'s dtype.
pub(crate) fn add_row_vector(y: &Tensor, row: &Tensor) -> Result<Tensor, GradNodeError> {
    fn add<T: FloatElement>(y: &Tensor, row: &Tensor, cols: usize) -> Result<Tensor, GradNodeError> {
        let mut values = y.to_vec_as::<T>()?;
        let row_values = row.to_vec_as::<T>()?;
        if cols > 0 {
            for chunk in values.chunks_mut(cols) {
                for (v, r) in chunk.iter_mut().zip(row_values.iter()) {
                    *v = *v + *r;
                }
            }
        }
        Tensor::from_elements(values, y.shape())
    }

    let shape = y.shape();
    let cols = shape.last().copied().unwrap_or(1);
    if row.shape() != [cols] {
        return Err(GradNodeError::ShapeMismatch {
            expected: vec![cols],
            actual: row.shape(),
            operation: "add_row_vector".to_string(),
        });
    }
    match y.dtype() {
        DType::F32 => add::<f32>(y, row, cols),
        DType::F64 => add::<f64>(y, row, cols),
        other => Err(GradNodeError::UnsupportedDType {
            dtype: other,
            operation: "add_row_vector".to_string(),
        }),
    }
}

/// Column-wise sum of a matrix: `[rows, cols] -> [cols]`.
pub(crate) fn sum_rows(t: &Tensor) -> Result<Tensor, GradNodeError> {
    fn sum<T: FloatElement>(t: &Tensor, cols: usize) -> Result<Tensor, GradNodeError> {
        let values = t.to_vec_as::<T>()?;
        let mut out = vec![T::zero(); cols];
        if cols > 0 {
            for chunk in values.chunks(cols) {
                for (o, v) in out.iter_mut().zip(chunk.iter()) {
                    *o = *o + *v;
                }
            }
        }
        Tensor::from_elements(out, vec![cols])
    }

    ensure_host("sum_rows", &[t])?;
    let shape = t.shape();
    if shape.len() != 2 {
        return Err(GradNodeError::UnsupportedOperation(format!(
            "sum_rows expects a rank-2 tensor, got shape {:?}",
            shape
        )));
    }
    float_only(t.dtype(), "sum_rows")?;
    match t.dtype() {
        DType::F32 => sum::<f32>(t, shape[1]),
        _ => sum::<f64>(t, shape[1]),
    }
}

/// Repeats a rank-1 tensor `rows` times: `[cols] -> [rows, cols]`.
pub(crate) fn broadcast_rows(t: &Tensor, rows: usize) -> Result<Tensor, GradNodeError> {
    fn repeat<T: FloatElement>(t: &Tensor, rows: usize) -> Result<Tensor, GradNodeError> {
        let row = t.to_vec_as::<T>()?;
        let cols = row.len();
        let mut out = Vec::with_capacity(rows * cols);
        for _ in 0..rows {
            out.extend_from_slice(&row);
        }
        Tensor::from_elements(out, vec![rows, cols])
    }

    ensure_host("broadcast_rows", &[t])?;
    if t.rank() != 1 {
        return Err(GradNodeError::UnsupportedOperation(format!(
            "broadcast_rows expects a rank-1 tensor, got shape {:?}",
            t.shape()
        )));
    }
    float_only(t.dtype(), "broadcast_rows")?;
    match t.dtype() {
        DType::F32 => repeat::<f32>(t, rows),
        _ => repeat::<f64>(t, rows),
    }
}

fn mul_elementwise<T: FloatElement>(a: &Tensor, b: &Tensor) -> Result<Tensor, GradNodeError> {
    float_only(a.dtype(), "mul")?;
    float_only(b.dtype(), "mul")?;
    let lhs = a.to_vec_as::<T>()?;
    let rhs = b.to_vec_as::<T>()?;
    let out: Vec<T> = lhs.iter().zip(rhs.iter()).map(|(&l, &r)| l * r).collect();
    Tensor::from_elements(out, a.shape())
}

/// `mask = (noise >= ratio) * 1 / (1 - ratio)`, with the scale computed in `T`.
fn scale_mask<T: FloatElement>(noise: &Tensor, ratio: f64) -> Result<Tensor, GradNodeError> {
    let scale = T::from_f64_lossy(1.0 / (1.0 - ratio));
    let mask: Vec<T> = noise
        .to_vec_as::<f64>()?
        .into_iter()
        .map(|r| if r >= ratio { scale } else { T::zero() })
        .collect();
    Tensor::from_elements(mask, noise.shape())
}
