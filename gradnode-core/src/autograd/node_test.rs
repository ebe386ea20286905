use std::any::Any;

use super::{BackwardContext, ForwardContext, Function, FunctionNode, NodeKind, Variable};
use crate::config::Config;
use crate::error::GradNodeError;
use crate::ops::Linear;
use crate::tensor::Tensor;
use crate::utils::testing::{create_test_tensor_f64, create_test_variable_f64};

/// Passes its first input through; retains and answers as configured.
#[derive(Debug)]
struct Passthrough {
    retain: Vec<usize>,
    extra_grads: usize,
}

impl Function for Passthrough {
    fn kind(&self) -> NodeKind {
        NodeKind::Cast
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn forward(
        &mut self,
        inputs: &[Tensor],
        ctx: &mut ForwardContext<'_>,
    ) -> Result<Vec<Tensor>, GradNodeError> {
        ctx.retain_inputs(&self.retain);
        Ok(vec![inputs[0].clone()])
    }

    fn backward(
        &self,
        ctx: &BackwardContext<'_>,
        indexes: &[usize],
        grad_outputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError> {
        let mut grads = Vec::new();
        for &i in indexes {
            ctx.retained_input(i)?;
            grads.push(grad_outputs[0].clone());
        }
        for _ in 0..self.extra_grads {
            grads.push(grad_outputs[0].clone());
        }
        Ok(grads)
    }
}

fn linear_inputs() -> Vec<Variable> {
    vec![
        create_test_variable_f64(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]),
        create_test_variable_f64(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]),
        create_test_variable_f64(vec![0.1, 0.2, 0.3], vec![3]),
    ]
}

fn upstream() -> Vec<Variable> {
    vec![Variable::from(create_test_tensor_f64(vec![1.0; 6], vec![2, 3]))]
}

fn assert_contract_violation<T: std::fmt::Debug>(result: Result<T, GradNodeError>) {
    match result {
        Err(GradNodeError::ContractViolation { .. }) => {}
        other => panic!("expected ContractViolation, got {:?}", other),
    }
}

#[test]
fn test_backward_before_forward() {
    let node = FunctionNode::new(Linear, &Config::default());
    assert_contract_violation(node.backward(&[0], &upstream()));
}

#[test]
fn test_linear_retains_x_and_w_only() {
    let mut node = FunctionNode::new(Linear, &Config::default());
    let outputs = node.forward(&linear_inputs()).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(node.retained_inputs(), vec![0, 1]);
    assert_eq!(node.output_count(), 1);
    assert_eq!(node.inputs().len(), 3);
}

#[test]
fn test_backward_index_contract() {
    let mut node = FunctionNode::new(Linear, &Config::default());
    node.forward(&linear_inputs()).unwrap();
    assert_contract_violation(node.backward(&[1, 0], &upstream()));
    assert_contract_violation(node.backward(&[0, 0], &upstream()));
    assert_contract_violation(node.backward(&[3], &upstream()));
    assert_contract_violation(node.backward(&[0], &[]));

    let grads = node.backward(&[0, 2], &upstream()).unwrap();
    assert_eq!(grads.len(), 2);
    assert_eq!(grads[0].shape(), vec![2, 2]);
    assert_eq!(grads[1].shape(), vec![3]);
    assert!(node.backward(&[], &upstream()).unwrap().is_empty());
}

#[test]
fn test_validation_runs_before_forward() {
    let mut node = FunctionNode::new(Linear, &Config::default());
    let inputs = vec![
        create_test_variable_f64(vec![1.0; 6], vec![2, 3]),
        create_test_variable_f64(vec![1.0; 6], vec![3, 2]),
    ];
    assert!(matches!(
        node.forward(&inputs),
        Err(GradNodeError::Validation { .. })
    ));
    // Nothing was recorded.
    assert!(node.retained_inputs().is_empty());
    assert_contract_violation(node.backward(&[0], &upstream()));
}

#[test]
fn test_non_retained_input_access() {
    let x = create_test_variable_f64(vec![1.0, 2.0], vec![2]);
    let y = create_test_variable_f64(vec![3.0, 4.0], vec![2]);
    let mut node = FunctionNode::new(
        Passthrough {
            retain: vec![1],
            extra_grads: 0,
        },
        &Config::default(),
    );
    node.forward(&[x.clone(), y.clone()]).unwrap();
    assert_eq!(node.retained_inputs(), vec![1]);
    assert!(node.backward(&[1], &[x.clone()]).is_ok());
    assert_contract_violation(node.backward(&[0], &[x]));
}

#[test]
fn test_gradient_count_is_enforced() {
    let x = create_test_variable_f64(vec![1.0, 2.0], vec![2]);
    let mut node = FunctionNode::new(
        Passthrough {
            retain: vec![0],
            extra_grads: 1,
        },
        &Config::default(),
    );
    node.forward(std::slice::from_ref(&x)).unwrap();
    assert_contract_violation(node.backward(&[0], std::slice::from_ref(&x)));
}

#[test]
fn test_retaining_missing_input() {
    let x = create_test_variable_f64(vec![1.0, 2.0], vec![2]);
    let mut node = FunctionNode::new(
        Passthrough {
            retain: vec![2],
            extra_grads: 0,
        },
        &Config::default(),
    );
    assert_contract_violation(node.forward(&[x]));
}

#[test]
fn test_apply_links_outputs_to_node() {
    let inputs = linear_inputs();
    let outputs = FunctionNode::new(Linear, &Config::default())
        .apply(&inputs)
        .unwrap();
    let y = &outputs[0];
    assert!(!y.is_leaf());
    assert!(y.requires_grad());
    let creator = y.creator().unwrap();
    assert_eq!(creator.kind(), NodeKind::LinearForward);
    assert!(creator.retained_inputs().contains(&1));

    let constants: Vec<Variable> = inputs
        .iter()
        .map(|v| Variable::from(v.tensor().clone()))
        .collect();
    let outputs = FunctionNode::new(Linear, &Config::default())
        .apply(&constants)
        .unwrap();
    assert!(!outputs[0].requires_grad());
}
