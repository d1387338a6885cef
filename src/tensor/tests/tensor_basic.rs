use crate::assert_err;
use crate::errors::BackendError;
use crate::tensor::{DType, Tensor};

#[test]
fn test_new_and_accessors() {
    let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
    assert_eq!(t.shape(), &[2, 2]);
    assert_eq!(t.dimension(), 2);
    assert_eq!(t.len(), 4);
    assert_eq!(t.dtype(), DType::Float64);
    assert!(!t.is_scalar());
    assert_eq!(t.flat(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_scalar_is_rank_zero() {
    let s = Tensor::scalar(2.5);
    assert_eq!(s.shape(), &[] as &[usize]);
    assert!(s.is_scalar());
    assert_eq!(s.to_scalar(), Some(2.5));
    // 非标量取不出标量值
    assert_eq!(Tensor::new(&[1.0], &[1]).to_scalar(), None);
}

#[test]
fn test_zeros_ones_filled() {
    let z = Tensor::zeros(&[3], DType::Float64);
    assert_eq!(z.flat(), vec![0.0, 0.0, 0.0]);

    let o = Tensor::ones(&[2, 1], DType::Float64);
    assert_eq!(o.flat(), vec![1.0, 1.0]);

    // filled 按 dtype 折算填充值（int32 截断小数）
    let f = Tensor::filled(&[2], 2.7, DType::Int32);
    assert_eq!(f.flat(), vec![2.0, 2.0]);
    assert_eq!(f.dtype(), DType::Int32);
}

#[test]
fn test_cast() {
    let t = Tensor::new(&[1.5, -2.5, 0.0], &[3]);
    let i = t.cast(DType::Int64);
    assert_eq!(i.dtype(), DType::Int64);
    assert_eq!(i.flat(), vec![1.0, -2.0, 0.0]);

    let b = t.cast(DType::Bool);
    assert_eq!(b.flat(), vec![1.0, 1.0, 0.0]);

    // 无符号截断后钳到 0
    let u = t.cast(DType::UInt32);
    assert_eq!(u.flat(), vec![1.0, 0.0, 0.0]);
}

#[test]
fn test_assign() {
    let mut t = Tensor::zeros(&[2], DType::Float64);
    t.assign(&Tensor::new(&[1.0, 2.0], &[2])).unwrap();
    assert_eq!(t.flat(), vec![1.0, 2.0]);

    // 形状不一致拒绝写入
    assert_err!(
        t.assign(&Tensor::new(&[1.0, 2.0, 3.0], &[3])),
        BackendError::ShapeMismatch { .. }
    );
}

#[test]
fn test_assign_coerces_by_dtype() {
    // int dtype 的缓冲写入时按截断语义落值
    let mut t = Tensor::zeros(&[2], DType::Int32);
    t.assign(&Tensor::new(&[1.9, -2.9], &[2])).unwrap();
    assert_eq!(t.flat(), vec![1.0, -2.0]);
}

#[test]
fn test_assign_add() {
    let mut t = Tensor::new(&[1.0, 2.0], &[2]);
    t.assign_add(&Tensor::new(&[0.5, 0.5], &[2])).unwrap();
    assert_eq!(t.flat(), vec![1.5, 2.5]);

    assert_err!(
        t.assign_add(&Tensor::scalar(1.0)),
        BackendError::ShapeMismatch { .. }
    );
}

#[test]
fn test_nbytes() {
    assert_eq!(Tensor::zeros(&[4], DType::Float64).nbytes(), 32);
    assert_eq!(Tensor::scalar(0.0).nbytes(), 8);
}
