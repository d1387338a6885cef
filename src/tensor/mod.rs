/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 带 dtype 标签的数值缓冲。其可以是标量（0 阶）、向量、
 *                 矩阵或更高维度的数组，一律以 f64 存储。
 */

use ndarray::{Array, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;

mod dtype;
pub mod ops;

pub use dtype::{BUILTIN_DTYPES, DType, DTypeTable};

#[cfg(test)]
mod tests;

/// 定义张量的结构体。
/// 注：与 only_torch 的 Tensor 不同，这里标量就是 0 阶张量（shape 为 []），
/// dtype 仅是声明层标签，缓冲一律为 f64（见 `DType` 说明）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: ArrayD<f64>,
    dtype: DType,
}

impl Tensor {
    /// 创建一个张量。`data`的长度必须和`shape`中所有元素的乘积相等
    /// （标量则`shape`为`[]`且`data`长度为 1）。
    pub fn new(data: &[f64], shape: &[usize]) -> Self {
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec()).unwrap();
        Self {
            data,
            dtype: DType::Float64,
        }
    }

    pub fn from_array(data: ArrayD<f64>, dtype: DType) -> Self {
        Self { data, dtype }
    }

    /// 创建一个标量张量（0 阶）
    pub fn scalar(value: f64) -> Self {
        Self::new(&[value], &[])
    }

    /// 创建一个全零张量
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
            dtype,
        }
    }

    /// 创建一个全一张量
    pub fn ones(shape: &[usize], dtype: DType) -> Self {
        Self {
            data: ArrayD::ones(IxDyn(shape)),
            dtype,
        }
    }

    /// 创建一个以`value`填满`shape`的张量（对应「标量值 + 指定形状」的变量创建）
    pub fn filled(shape: &[usize], value: f64, dtype: DType) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), dtype.coerce(value)),
            dtype,
        }
    }

    // ========== 基础访问器 ==========

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 返回张量的维度（阶数），标量为 0
    pub fn dimension(&self) -> usize {
        self.data.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.data.ndim() == 0
    }

    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    /// 若为标量（0 阶），返回其值
    pub fn to_scalar(&self) -> Option<f64> {
        if self.is_scalar() {
            self.data.iter().next().copied()
        } else {
            None
        }
    }

    /// 以扁平顺序读取所有元素
    pub fn flat(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// 缓冲占用的字节数估计（用于 run 的内存剖析）
    pub fn nbytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }

    // ========== dtype 相关 ==========

    /// 转换到目标 dtype：整型截断、布尔以非零为 1，浮点/复数不改动缓冲值
    pub fn cast(&self, dtype: DType) -> Self {
        Self {
            data: self.data.mapv(|x| dtype.coerce(x)),
            dtype,
        }
    }

    // ========== 缓冲写入 ==========

    /// 原地替换缓冲内容（形状必须一致，dtype 标签不变）。
    /// 这是变量节点唯一合法的变更方式。
    pub fn assign(&mut self, other: &Self) -> Result<(), BackendError> {
        if self.shape() != other.shape() {
            return Err(BackendError::ShapeMismatch {
                name: String::new(),
                expected: self.shape().to_vec(),
                got: other.shape().to_vec(),
            });
        }
        let dtype = self.dtype;
        self.data.zip_mut_with(&other.data, |dst, &src| {
            *dst = dtype.coerce(src);
        });
        Ok(())
    }

    /// 原地累加（`+=`算子的落点）
    pub fn assign_add(&mut self, other: &Self) -> Result<(), BackendError> {
        if self.shape() != other.shape() {
            return Err(BackendError::ShapeMismatch {
                name: String::new(),
                expected: self.shape().to_vec(),
                got: other.shape().to_vec(),
            });
        }
        let dtype = self.dtype;
        self.data.zip_mut_with(&other.data, |dst, &src| {
            *dst = dtype.coerce(*dst + src);
        });
        Ok(())
    }
}
