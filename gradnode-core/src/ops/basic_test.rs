use crate::autograd::{check_node_grad, FunctionNode, NodeKind, Variable};
use crate::config::Config;
use crate::error::GradNodeError;
use crate::ops::basic::{BroadcastRows, Cast, Reshape, SumRows};
use crate::tensor::Tensor;
use crate::types::DType;
use crate::utils::testing::{
    check_tensor_near, check_tensor_near_f64, create_test_tensor, create_test_tensor_f64,
    create_test_variable_f64,
};

fn apply_one<F: crate::autograd::Function + 'static>(function: F, input: &Variable) -> Variable {
    FunctionNode::new(function, &Config::default())
        .apply(std::slice::from_ref(input))
        .unwrap()
        .remove(0)
}

#[test]
fn test_cast_round_trips_through_backward() {
    let x = Variable::new(create_test_tensor(vec![1.5, -2.0], vec![2]));
    let y = apply_one(Cast::new(DType::F64), &x);
    check_tensor_near_f64(y.tensor(), &[2], &[1.5, -2.0], 0.0);

    let gy = Variable::from(create_test_tensor_f64(vec![0.25, 4.0], vec![2]));
    let gx = y.creator().unwrap().backward(&[0], &[gy]).unwrap().remove(0);
    assert_eq!(gx.dtype(), DType::F32);
    assert_eq!(gx.creator().unwrap().kind(), NodeKind::Cast);
    check_tensor_near(gx.tensor(), &[2], &[0.25, 4.0], 0.0);
}

#[test]
fn test_cast_rejects_integer_input() {
    let x = Variable::from(Tensor::new_i32(vec![1, 2], vec![2]).unwrap());
    let result = FunctionNode::new(Cast::new(DType::F64), &Config::default()).apply(&[x]);
    assert!(matches!(result, Err(GradNodeError::Validation { .. })));
}

#[test]
fn test_sum_rows_and_broadcast_rows_are_adjoint() {
    let m = create_test_variable_f64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
    let s = apply_one(SumRows::default(), &m);
    check_tensor_near_f64(s.tensor(), &[3], &[5.0, 7.0, 9.0], 1e-12);

    let gs = Variable::from(create_test_tensor_f64(vec![1.0, 2.0, 3.0], vec![3]));
    let gm = s.creator().unwrap().backward(&[0], &[gs]).unwrap().remove(0);
    assert_eq!(gm.creator().unwrap().kind(), NodeKind::BroadcastRows);
    check_tensor_near_f64(gm.tensor(), &[2, 3], &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0], 0.0);

    let ggm = Variable::from(create_test_tensor_f64(vec![1.0; 6], vec![2, 3]));
    let ggs = gm.creator().unwrap().backward(&[0], &[ggm]).unwrap().remove(0);
    assert_eq!(ggs.creator().unwrap().kind(), NodeKind::SumRows);
    check_tensor_near_f64(ggs.tensor(), &[3], &[2.0, 2.0, 2.0], 0.0);
}

#[test]
fn test_sum_rows_requires_a_matrix() {
    let v = create_test_variable_f64(vec![1.0, 2.0], vec![2]);
    let result = FunctionNode::new(SumRows::default(), &Config::default()).apply(&[v]);
    assert!(matches!(result, Err(GradNodeError::Validation { .. })));
}

#[test]
fn test_reshape_backward_restores_shape() {
    let x = create_test_variable_f64((0..6).map(f64::from).collect(), vec![2, 3]);
    let y = apply_one(Reshape::new(vec![3, 2]), &x);
    assert_eq!(y.shape(), vec![3, 2]);
    assert!(y.tensor().shares_buffer(x.tensor()));

    let gy = Variable::from(create_test_tensor_f64(vec![1.0; 6], vec![3, 2]));
    let gx = y.creator().unwrap().backward(&[0], &[gy]).unwrap().remove(0);
    assert_eq!(gx.shape(), vec![2, 3]);

    let bad = FunctionNode::new(Reshape::new(vec![4, 2]), &Config::default()).apply(&[x]);
    assert!(matches!(bad, Err(GradNodeError::Validation { .. })));
}

#[test]
fn test_helper_nodes_grad_check() {
    let config = Config::default();
    let m = create_test_variable_f64(vec![0.5, -1.0, 2.0, 3.5], vec![2, 2]);
    let gs = create_test_tensor_f64(vec![0.3, -0.7], vec![2]);
    let mut node = FunctionNode::new(SumRows::default(), &config);
    check_node_grad(&mut node, &[m], &[gs], 1e-6, 1e-6).unwrap();

    let v = create_test_variable_f64(vec![0.5, -1.0], vec![2]);
    let gm = create_test_tensor_f64(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], vec![3, 2]);
    let mut node = FunctionNode::new(BroadcastRows::new(3), &config);
    check_node_grad(&mut node, &[v], &[gm], 1e-6, 1e-6).unwrap();
}
