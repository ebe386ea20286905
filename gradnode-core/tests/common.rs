use gradnode_core::autograd::Variable;
use gradnode_core::tensor::Tensor;

// Shared helpers for the integration tests.
// allow(dead_code) because each test binary only uses some of them.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
pub fn create_test_tensor_f64(data: Vec<f64>, shape: Vec<usize>) -> Tensor {
    Tensor::new_f64(data, shape).expect("Test tensor creation failed")
}

#[allow(dead_code)]
pub fn param_f64(data: Vec<f64>, shape: Vec<usize>) -> Variable {
    Variable::new(create_test_tensor_f64(data, shape))
}

#[allow(dead_code)]
pub fn constant_f64(data: Vec<f64>, shape: Vec<usize>) -> Variable {
    Variable::from(create_test_tensor_f64(data, shape))
}

/// Row-major `a[m,k] · b[k,n]`.
#[allow(dead_code)]
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        for j in 0..n {
            out[i * n + j] = (0..k).map(|p| a[i * k + p] * b[p * n + j]).sum();
        }
    }
    out
}

/// Row-major transpose of `a[rows, cols]`.
#[allow(dead_code)]
pub fn transpose(a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            out[j * rows + i] = a[i * cols + j];
        }
    }
    out
}
