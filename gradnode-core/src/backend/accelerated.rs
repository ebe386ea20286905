use matrixmultiply::sgemm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::backend::reference::cast;
use crate::backend::{BackendKind, ComputeBackend, Requirements};
use crate::device::StorageDevice;
use crate::error::GradNodeError;
use crate::tensor::Tensor;
use crate::types::DType;

/// Elements handled by one rayon task in the elementwise kernels.
const CHUNK: usize = 4096;

/// Host `F32` kernels: strided GEMM and rayon-parallel elementwise work.
///
/// Strided views are consumed in place; a transpose is a stride swap.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceleratedBackend;

impl ComputeBackend for AcceleratedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Accelerated
    }

    fn is_ready(&self, inputs: &[&Tensor], requirements: &Requirements<'_>) -> bool {
        requirements.allow_accelerated
            && !inputs.is_empty()
            && inputs.iter().all(|t| {
                t.device() == StorageDevice::CPU
                    && t.dtype() == DType::F32
                    && requirements.ranks.contains(&t.rank())
            })
    }

    fn linear_forward(
        &self,
        x: &Tensor,
        w: &Tensor,
        b: Option<&Tensor>,
    ) -> Result<Tensor, GradNodeError> {
        let (mut y, rows, cols) = gemm(&matrix_ref(x, false)?, &matrix_ref(w, true)?)?;
        if let Some(b) = b {
            let bias = b.get_f32_data()?;
            if bias.len() != cols {
                return Err(GradNodeError::ShapeMismatch {
                    expected: vec![cols],
                    actual: b.shape(),
                    operation: "linear".to_string(),
                });
            }
            if cols > 0 {
                y.par_chunks_mut(cols).for_each(|row| {
                    for (v, b) in row.iter_mut().zip(bias.iter()) {
                        *v += *b;
                    }
                });
            }
        }
        Tensor::new(y, vec![rows, cols])
    }

    fn linear_backward_data(&self, gy: &Tensor, w: &Tensor) -> Result<Tensor, GradNodeError> {
        let (gx, rows, cols) = gemm(&matrix_ref(gy, false)?, &matrix_ref(w, false)?)?;
        Tensor::new(gx, vec![rows, cols])
    }

    fn linear_backward_weight(
        &self,
        x: &Tensor,
        gy: &Tensor,
        w_dtype: DType,
    ) -> Result<Tensor, GradNodeError> {
        let (gw, rows, cols) = gemm(&matrix_ref(gy, true)?, &matrix_ref(x, false)?)?;
        cast(&Tensor::new(gw, vec![rows, cols])?, w_dtype)
    }

    fn dropout_forward(
        &self,
        x: &Tensor,
        ratio: f64,
        rng: &mut StdRng,
    ) -> Result<(Tensor, Tensor), GradNodeError> {
        let values = x.get_f32_data()?;
        let n = values.len();
        let scale = (1.0 / (1.0 - ratio)) as f32;
        // The mask depends only on `rng`, never on chunk scheduling.
        let seeds: Vec<u64> = (0..(n + CHUNK - 1) / CHUNK).map(|_| rng.gen()).collect();
        let mut mask = vec![0.0f32; n];
        let mut y = vec![0.0f32; n];
        mask.par_chunks_mut(CHUNK)
            .zip(y.par_chunks_mut(CHUNK))
            .zip(values.par_chunks(CHUNK))
            .zip(seeds.par_iter())
            .for_each(|(((mask, y), x), &seed)| {
                let mut chunk_rng = StdRng::seed_from_u64(seed);
                for ((m, y), x) in mask.iter_mut().zip(y.iter_mut()).zip(x.iter()) {
                    let r: f32 = chunk_rng.gen();
                    if r as f64 >= ratio {
                        *m = scale;
                    }
                    *y = *x * *m;
                }
            });
        let shape = x.shape();
        Ok((Tensor::new(mask, shape.clone())?, Tensor::new(y, shape)?))
    }

    fn multiply(&self, a: &Tensor, mask: &Tensor) -> Result<Tensor, GradNodeError> {
        if a.shape() != mask.shape() {
            return Err(GradNodeError::ShapeMismatch {
                expected: mask.shape(),
                actual: a.shape(),
                operation: "mul".to_string(),
            });
        }
        let mut out = a.get_f32_data()?;
        let factors = mask.get_f32_data()?;
        out.par_chunks_mut(CHUNK)
            .zip(factors.par_chunks(CHUNK))
            .for_each(|(out, factors)| {
                for (o, f) in out.iter_mut().zip(factors.iter()) {
                    *o *= *f;
                }
            });
        Tensor::new(out, a.shape())
    }
}

/// A rank-2 `F32` view over a host buffer, with signed strides for `sgemm`.
struct MatrixRef<'a> {
    data: &'a [f32],
    offset: usize,
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
}

fn matrix_ref(t: &Tensor, transposed: bool) -> Result<MatrixRef<'_>, GradNodeError> {
    let guard = t.read_data();
    if guard.shape.len() != 2 {
        return Err(GradNodeError::UnsupportedOperation(format!(
            "matmul expects rank-2 operands, got shape {:?}",
            guard.shape
        )));
    }
    let data = guard.buffer.try_get_cpu_f32()?;
    let (rows, cols, row_stride, col_stride) = if transposed {
        (guard.shape[1], guard.shape[0], guard.strides[1], guard.strides[0])
    } else {
        (guard.shape[0], guard.shape[1], guard.strides[0], guard.strides[1])
    };
    Ok(MatrixRef {
        data: data.as_slice(),
        offset: guard.offset,
        rows,
        cols,
        row_stride: row_stride as isize,
        col_stride: col_stride as isize,
    })
}

/// Dense row-major `lhs · rhs`. Returns the data with its row and column counts.
fn gemm(lhs: &MatrixRef<'_>, rhs: &MatrixRef<'_>) -> Result<(Vec<f32>, usize, usize), GradNodeError> {
    let (m, k, n) = (lhs.rows, lhs.cols, rhs.cols);
    if rhs.rows != k {
        return Err(GradNodeError::ShapeMismatch {
            expected: vec![k, n],
            actual: vec![rhs.rows, n],
            operation: "matmul".to_string(),
        });
    }
    let mut out = vec![0.0f32; m * n];
    if m == 0 || k == 0 || n == 0 {
        return Ok((out, m, n));
    }
    // SAFETY: every tensor view is bounds-checked against its buffer when it
    // is created, so all (row, col) positions reachable through these strides
    // lie inside `data`. `out` is a dense m x n matrix.
    unsafe {
        sgemm(
            m,
            k,
            n,
            1.0,
            lhs.data.as_ptr().add(lhs.offset),
            lhs.row_stride,
            lhs.col_stride,
            rhs.data.as_ptr().add(rhs.offset),
            rhs.row_stride,
            rhs.col_stride,
            0.0,
            out.as_mut_ptr(),
            n as isize,
            1,
        );
    }
    Ok((out, m, n))
}
