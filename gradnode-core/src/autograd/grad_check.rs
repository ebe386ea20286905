use thiserror::Error;

use crate::autograd::node::FunctionNode;
use crate::autograd::variable::Variable;
use crate::device::StorageDevice;
use crate::error::GradNodeError;
use crate::tensor::Tensor;
use crate::types::DType;

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient check failed for input tensor at index {input_index}, element index {element_index}: Analytical grad {analytical_grad:?} != Numerical grad {numerical_grad:?}. Difference: {difference:?}")]
    GradientMismatch {
        input_index: usize,
        element_index: usize,
        analytical_grad: f64,
        numerical_grad: f64,
        difference: f64,
    },
    #[error("Forward function execution failed during gradient check: {0}")]
    ForwardPassError(GradNodeError),
    #[error("Backward pass execution failed during gradient check: {0}")]
    BackwardPassError(GradNodeError),
    #[error("Tensor error during intermediate calculation: {0}")]
    TensorError(GradNodeError),
    #[error("Unsupported data type for gradient check: expected a floating dtype, got {0:?}")]
    UnsupportedDType(DType),
    #[error("Gradient checking only supported on CPU tensors (Input {input_index}). Got: {device:?}")]
    NonCpuInput {
        input_index: usize,
        device: StorageDevice,
    },
    #[error("Expected {expected} output gradient(s), got {actual}")]
    OutputCountMismatch { expected: usize, actual: usize },
    #[error("Gradient of input {input_index} has shape {actual:?}, expected {expected:?}")]
    GradientShapeMismatch {
        input_index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Numerical gradient is NaN or infinite for input {input_index}, element {element_index}. Details: Loss+: {loss_plus:?}, Loss-: {loss_minus:?}")]
    NumericalGradNaNOrInfinite {
        input_index: usize,
        element_index: usize,
        loss_plus: f64,
        loss_minus: f64,
    },
}

impl From<GradNodeError> for GradCheckError {
    fn from(err: GradNodeError) -> Self {
        GradCheckError::TensorError(err)
    }
}

/// Checks the gradients a node composes in `backward` against central
/// finite differences.
///
/// The scalar being differentiated is `Σ_k <outputs[k], output_grads[k]>`.
/// The node is run on every perturbed input set, then once more on the
/// original inputs so that its retained state matches them, and finally
/// `backward` is asked for the gradient of every input. A stochastic node
/// therefore has to produce the same function on every call.
///
/// The check runs with the accelerated backend disabled on `node`, since an
/// accelerated dropout redraws its mask on every forward while the reference
/// path reuses it. The node's setting is restored before returning.
pub fn check_node_grad(
    node: &mut FunctionNode,
    inputs: &[Variable],
    output_grads: &[Tensor],
    epsilon: f64,
    tolerance: f64,
) -> Result<(), GradCheckError> {
    for (i, input) in inputs.iter().enumerate() {
        if !input.dtype().is_float() {
            return Err(GradCheckError::UnsupportedDType(input.dtype()));
        }
        if input.device() != StorageDevice::CPU {
            return Err(GradCheckError::NonCpuInput {
                input_index: i,
                device: input.device(),
            });
        }
    }

    let accelerate = node.config().accelerate;
    node.config_mut().accelerate = false;
    let result = compare_gradients(node, inputs, output_grads, epsilon, tolerance);
    node.config_mut().accelerate = accelerate;
    result
}

fn compare_gradients(
    node: &mut FunctionNode,
    inputs: &[Variable],
    output_grads: &[Tensor],
    epsilon: f64,
    tolerance: f64,
) -> Result<(), GradCheckError> {
    // --- Numerical gradients ---
    let mut numerical: Vec<Vec<f64>> = Vec::with_capacity(inputs.len());
    for (i, original_input) in inputs.iter().enumerate() {
        let original_data = original_input.tensor().to_f64_vec()?;
        let mut grads = Vec::with_capacity(original_data.len());
        for elem_idx in 0..original_data.len() {
            let loss_plus =
                perturbed_loss(node, inputs, i, &original_data, elem_idx, epsilon, output_grads)?;
            let loss_minus =
                perturbed_loss(node, inputs, i, &original_data, elem_idx, -epsilon, output_grads)?;
            let numerical_grad = (loss_plus - loss_minus) / (2.0 * epsilon);
            if !numerical_grad.is_finite() {
                return Err(GradCheckError::NumericalGradNaNOrInfinite {
                    input_index: i,
                    element_index: elem_idx,
                    loss_plus,
                    loss_minus,
                });
            }
            grads.push(numerical_grad);
        }
        numerical.push(grads);
    }

    // --- Analytical gradients ---
    node.forward(inputs).map_err(GradCheckError::ForwardPassError)?;
    let indexes: Vec<usize> = (0..inputs.len()).collect();
    let upstream: Vec<Variable> = output_grads.iter().cloned().map(Variable::from).collect();
    let analytical = node
        .backward(&indexes, &upstream)
        .map_err(GradCheckError::BackwardPassError)?;

    for (i, (grad, expected)) in analytical.iter().zip(numerical.iter()).enumerate() {
        if grad.shape() != inputs[i].shape() {
            return Err(GradCheckError::GradientShapeMismatch {
                input_index: i,
                expected: inputs[i].shape(),
                actual: grad.shape(),
            });
        }
        let analytical_data = grad.tensor().to_f64_vec()?;
        for (elem_idx, (&analytical_grad, &numerical_grad)) in
            analytical_data.iter().zip(expected.iter()).enumerate()
        {
            let difference = (analytical_grad - numerical_grad).abs();
            if difference > tolerance && difference / (analytical_grad.abs() + epsilon) > tolerance {
                return Err(GradCheckError::GradientMismatch {
                    input_index: i,
                    element_index: elem_idx,
                    analytical_grad,
                    numerical_grad,
                    difference,
                });
            }
        }
    }
    Ok(())
}

fn perturbed_loss(
    node: &mut FunctionNode,
    inputs: &[Variable],
    input_index: usize,
    original_data: &[f64],
    elem_idx: usize,
    delta: f64,
    output_grads: &[Tensor],
) -> Result<f64, GradCheckError> {
    let original = &inputs[input_index];
    let mut data = original_data.to_vec();
    data[elem_idx] += delta;
    let perturbed = match original.dtype() {
        DType::F32 => {
            Tensor::from_elements(data.iter().map(|&v| v as f32).collect(), original.shape())?
        }
        _ => Tensor::new_f64(data, original.shape())?,
    };
    let mut perturbed_inputs = inputs.to_vec();
    perturbed_inputs[input_index] = Variable::new(perturbed);
    let outputs = node
        .forward(&perturbed_inputs)
        .map_err(GradCheckError::ForwardPassError)?;
    calculate_loss(&outputs, output_grads)
}

/// `Σ_k <outputs[k], output_grads[k]>`, accumulated in `f64`.
fn calculate_loss(outputs: &[Tensor], output_grads: &[Tensor]) -> Result<f64, GradCheckError> {
    if outputs.len() != output_grads.len() {
        return Err(GradCheckError::OutputCountMismatch {
            expected: outputs.len(),
            actual: output_grads.len(),
        });
    }
    let mut loss = 0.0;
    for (output, grad) in outputs.iter().zip(output_grads.iter()) {
        if output.shape() != grad.shape() {
            return Err(GradCheckError::TensorError(GradNodeError::ShapeMismatch {
                expected: output.shape(),
                actual: grad.shape(),
                operation: "calculate_loss (grad_check)".to_string(),
            }));
        }
        let values = output.to_f64_vec()?;
        let weights = grad.to_f64_vec()?;
        loss += values.iter().zip(weights.iter()).map(|(v, w)| v * w).sum::<f64>();
    }
    Ok(loss)
}
