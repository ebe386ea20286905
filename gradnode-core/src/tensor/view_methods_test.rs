use crate::error::GradNodeError;
use crate::tensor::Tensor;

fn matrix_2x3() -> Tensor {
    Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap()
}

#[test]
fn test_transpose_is_a_view() {
    let t = matrix_2x3();
    let tt = t.transpose().unwrap();
    assert_eq!(tt.shape(), vec![3, 2]);
    assert_eq!(tt.strides(), vec![1, 3]);
    assert!(tt.shares_buffer(&t));
    assert!(!tt.is_contiguous());
    assert!(tt.is_f_contiguous());
    assert_eq!(tt.get_f32_data().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
}

#[test]
fn test_contiguous_copies_only_when_needed() {
    let t = matrix_2x3();
    assert!(t.contiguous().unwrap().ptr_eq(&t));
    let tt = t.transpose().unwrap().contiguous().unwrap();
    assert!(tt.is_contiguous());
    assert!(!tt.shares_buffer(&t));
    assert_eq!(tt.get_f32_data().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
}

#[test]
fn test_as_strided_bounds() {
    let t = matrix_2x3();
    let v = t.as_strided(vec![1, 2], vec![3, 2], 0).unwrap();
    assert_eq!(v.get_f32_data().unwrap(), vec![1.0, 3.0]);
    assert!(!v.is_contiguous());
    assert!(!v.is_f_contiguous());
    assert!(t.as_strided(vec![2, 2], vec![3, 2], 1).is_err());
}

#[test]
fn test_reshape() {
    let t = matrix_2x3();
    let r = t.reshape(vec![3, 2]).unwrap();
    assert!(r.shares_buffer(&t));
    assert_eq!(r.get_f32_data().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let bad = t.reshape(vec![4, 2]);
    assert!(matches!(bad, Err(GradNodeError::ShapeMismatch { .. })));
}

#[test]
fn test_reshape_non_contiguous_copies() {
    let t = matrix_2x3().transpose().unwrap();
    let r = t.reshape(vec![6]).unwrap();
    assert_eq!(r.get_f32_data().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
}
