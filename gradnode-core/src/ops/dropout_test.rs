use crate::autograd::{check_node_grad, FunctionNode, NodeKind, Variable};
use crate::config::Config;
use crate::error::GradNodeError;
use crate::ops::dropout::{dropout, Dropout, DropoutGrad};
use crate::tensor::{full, Tensor};
use crate::types::DType;
use crate::utils::testing::{check_tensor_near, check_tensor_near_f64, create_test_tensor, create_test_tensor_f64};

fn ones(shape: &[usize], dtype: DType) -> Variable {
    Variable::new(full(shape, 1.0, dtype).unwrap())
}

fn zero_fraction(t: &Tensor) -> f64 {
    let values = t.to_f64_vec().unwrap();
    values.iter().filter(|v| **v == 0.0).count() as f64 / values.len() as f64
}

#[test]
fn test_dropout_ratio_must_be_in_unit_interval() {
    for ratio in [-0.1, 1.0, 1.5, f64::NAN] {
        match Dropout::new(ratio) {
            Err(GradNodeError::Construction { operation, .. }) => assert_eq!(operation, "dropout"),
            other => panic!("ratio {} accepted: {:?}", ratio, other),
        }
    }
    assert!(Dropout::new(0.0).is_ok());
    assert!(Dropout::new(0.999).is_ok());

    let x = ones(&[2, 2], DType::F32);
    assert!(matches!(
        dropout(&x, 1.0, &Config::default()),
        Err(GradNodeError::Construction { .. })
    ));
}

#[test]
fn test_dropout_ratio_zero_is_identity() {
    let data = vec![-1.0, 0.0, 2.0, -3.0, -2.0, 1.0];
    for config in [Config::default(), Config::default().with_accelerate(false)] {
        let x = Variable::new(create_test_tensor(data.clone(), vec![3, 2]));
        let y = dropout(&x, 0.0, &config).unwrap();
        check_tensor_near(y.tensor(), &[3, 2], &data, 0.0);
    }
    let x = Variable::new(create_test_tensor_f64(vec![1.0, 2.0, 3.0], vec![3]));
    let y = dropout(&x, 0.0, &Config::default()).unwrap();
    check_tensor_near_f64(y.tensor(), &[3], &[1.0, 2.0, 3.0], 0.0);
}

#[test]
fn test_dropout_eval_mode_is_passthrough() {
    let x = Variable::new(create_test_tensor(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]));
    let y = dropout(&x, 0.9, &Config::eval()).unwrap();
    assert!(y.tensor().ptr_eq(x.tensor()));
    assert!(y.is_leaf());
}

#[test]
fn test_dropout_zero_fraction_converges_to_ratio() {
    let ratio = 0.3;
    let cases = [
        (DType::F32, Config::default()),
        (DType::F64, Config::default()),
        (DType::F32, Config::default().with_accelerate(false)),
    ];
    for (dtype, config) in cases {
        let x = ones(&[200, 500], dtype);
        let y = dropout(&x, ratio, &config.with_seed(17)).unwrap();
        let fraction = zero_fraction(y.tensor());
        assert!(
            (fraction - ratio).abs() < 0.01,
            "zero fraction {} too far from {} ({:?})",
            fraction,
            ratio,
            dtype
        );
        // Kept elements are scaled to preserve the expectation.
        let scale = 1.0 / (1.0 - ratio);
        for v in y.tensor().to_f64_vec().unwrap() {
            assert!(v == 0.0 || (v - scale).abs() < 1e-6);
        }
    }
}

#[test]
fn test_dropout_mask_is_reused_by_the_same_node() {
    let config = Config::default().with_accelerate(false).with_seed(3);
    let mut node = FunctionNode::new(Dropout::new(0.5).unwrap(), &config);
    let first = node.forward(&[ones(&[4, 8], DType::F32)]).unwrap().remove(0);
    let twos = Variable::new(full(&[4, 8], 2.0, DType::F32).unwrap());
    let second = node.forward(&[twos]).unwrap().remove(0);

    let doubled: Vec<f32> = first.get_f32_data().unwrap().iter().map(|v| v * 2.0).collect();
    check_tensor_near(&second, &[4, 8], &doubled, 0.0);
}

#[test]
fn test_dropout_reused_mask_must_fit() {
    let config = Config::default().with_accelerate(false);
    let mut node = FunctionNode::new(Dropout::new(0.5).unwrap(), &config);
    node.forward(&[ones(&[4, 8], DType::F64)]).unwrap();
    match node.forward(&[ones(&[8, 4], DType::F64)]) {
        Err(GradNodeError::ShapeMismatch { expected, actual, .. }) => {
            assert_eq!(expected, vec![4, 8]);
            assert_eq!(actual, vec![8, 4]);
        }
        other => panic!("expected ShapeMismatch, got {:?}", other),
    }
}

#[test]
fn test_dropout_accelerated_path_draws_fresh_masks() {
    let config = Config::default().with_seed(5);
    let mut node = FunctionNode::new(Dropout::new(0.5).unwrap(), &config);
    let x = ones(&[64, 64], DType::F32);
    let first = node.forward(std::slice::from_ref(&x)).unwrap().remove(0);
    let second = node.forward(std::slice::from_ref(&x)).unwrap().remove(0);
    assert_ne!(first.get_f32_data().unwrap(), second.get_f32_data().unwrap());

    // Rank 3 is outside the accelerated set: the stored mask is reused.
    let mut node = FunctionNode::new(Dropout::new(0.5).unwrap(), &config);
    let cube = ones(&[4, 4, 4], DType::F32);
    let first = node.forward(std::slice::from_ref(&cube)).unwrap().remove(0);
    let second = node.forward(std::slice::from_ref(&cube)).unwrap().remove(0);
    assert_eq!(first.get_f32_data().unwrap(), second.get_f32_data().unwrap());
}

#[test]
fn test_dropout_is_reproducible_with_a_seed() {
    let config = Config::default().with_seed(99);
    let x = ones(&[16, 16], DType::F32);
    let a = dropout(&x, 0.5, &config).unwrap();
    let b = dropout(&x, 0.5, &config).unwrap();
    assert_eq!(a.tensor().get_f32_data().unwrap(), b.tensor().get_f32_data().unwrap());
}

#[test]
fn test_dropout_backward_applies_the_mask() {
    let config = Config::default().with_seed(11);
    let x = ones(&[3, 5], DType::F32);
    let y = dropout(&x, 0.4, &config).unwrap();
    // With x = 1 the output is the mask itself.
    let mask = y.tensor().get_f32_data().unwrap();

    let gy_data: Vec<f32> = (1..=15).map(|v| v as f32).collect();
    let gy = Variable::from(create_test_tensor(gy_data.clone(), vec![3, 5]));
    let gx = y.creator().unwrap().backward(&[0], &[gy]).unwrap().remove(0);
    assert_eq!(gx.creator().unwrap().kind(), NodeKind::DropoutBackward);
    let expected: Vec<f32> = gy_data.iter().zip(mask.iter()).map(|(g, m)| g * m).collect();
    check_tensor_near(gx.tensor(), &[3, 5], &expected, 1e-6);

    // Second order: the gradient node differentiates to the same mask.
    let ggx = Variable::from(create_test_tensor(vec![1.0; 15], vec![3, 5]));
    let ggy = gx.creator().unwrap().backward(&[0], &[ggx]).unwrap().remove(0);
    assert_eq!(ggy.creator().unwrap().kind(), NodeKind::DropoutBackward);
    check_tensor_near(ggy.tensor(), &[3, 5], &mask, 1e-6);
}

#[test]
fn test_dropout_mask_is_shared_with_gradient_nodes() {
    let config = Config::default().with_seed(13);
    let y = dropout(&ones(&[4, 6], DType::F32), 0.5, &config).unwrap();
    let forward = y.creator().unwrap();
    let dropout_fn = forward.function::<Dropout>().unwrap();
    assert_eq!(dropout_fn.ratio(), 0.5);
    assert!(forward.function::<DropoutGrad>().is_none());
    let mask = dropout_fn.mask().unwrap();

    let gy = Variable::from(full(&[4, 6], 3.0, DType::F32).unwrap());
    let gx = forward.backward(&[0], &[gy]).unwrap().remove(0);
    let first = gx.creator().unwrap().function::<DropoutGrad>().unwrap();
    assert!(first.mask().ptr_eq(mask));

    let ggx = Variable::from(full(&[4, 6], 1.0, DType::F32).unwrap());
    let ggy = gx.creator().unwrap().backward(&[0], &[ggx]).unwrap().remove(0);
    let second = ggy.creator().unwrap().function::<DropoutGrad>().unwrap();
    assert!(second.mask().ptr_eq(mask));
}

#[test]
fn test_dropout_grad_check() {
    let config = Config::default().with_seed(21);
    let x = Variable::new(create_test_tensor_f64(
        vec![0.5, -1.0, 2.0, 0.25, -0.75, 1.5, 3.0, -2.0],
        vec![2, 4],
    ));
    let gy = create_test_tensor_f64(vec![0.1, 0.2, -0.3, 0.4, 0.5, -0.6, 0.7, 0.8], vec![2, 4]);
    let mut node = FunctionNode::new(Dropout::new(0.5).unwrap(), &config);
    check_node_grad(&mut node, &[x], &[gy], 1e-6, 1e-6).unwrap();
}

#[test]
fn test_dropout_grad_check_with_acceleration_enabled() {
    // F32 rank 2 would take the accelerated path and redraw its mask.
    let config = Config::default().with_seed(4);
    let x = Variable::new(create_test_tensor(
        vec![0.5, -1.0, 2.0, 0.25, -0.75, 1.5, 3.0, -2.0],
        vec![2, 4],
    ));
    let gy = create_test_tensor(vec![0.1, 0.2, -0.3, 0.4, 0.5, -0.6, 0.7, 0.8], vec![2, 4]);
    let mut node = FunctionNode::new(Dropout::new(0.5).unwrap(), &config);
    check_node_grad(&mut node, &[x], &[gy], 1e-2, 1e-3).unwrap();
    assert!(node.config().accelerate);
}

#[test]
fn test_dropout_validation() {
    let x = Variable::from(Tensor::new_i32(vec![1, 2, 3, 4], vec![2, 2]).unwrap());
    assert!(matches!(
        dropout(&x, 0.5, &Config::default()),
        Err(GradNodeError::Validation { .. })
    ));

    let mut node = FunctionNode::new(Dropout::new(0.5).unwrap(), &Config::default());
    let a = ones(&[2, 2], DType::F32);
    assert!(matches!(
        node.forward(&[a.clone(), a]),
        Err(GradNodeError::Validation { .. })
    ));

    let on_device = Variable::new(Tensor::placeholder_on_gpu(vec![2, 2], DType::F32));
    assert!(matches!(
        dropout(&on_device, 0.5, &Config::default()),
        Err(GradNodeError::UnsupportedOperation(_))
    ));
}
