/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 张量数值运算（逐元素二元/一元、矩阵乘、形状变换、归约）。
 *                 这些是算子表核函数的落点，全部显式返回 Result。
 */

use ndarray::{Array, ArrayD, ArrayViewD, Axis, Ix1, Ix2, IxDyn, Zip};

use super::{DType, Tensor};
use crate::errors::BackendError;

/// 计算 numpy 式广播后的目标形状（尾部对齐，维长相等或其一为 1）
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, BackendError> {
    let rank = a.len().max(b.len());
    let mut out = vec![0usize; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        if da == db || da == 1 || db == 1 {
            out[i] = da.max(db);
        } else {
            return Err(BackendError::ShapeIncompatible {
                op: "broadcast".to_string(),
                shape1: a.to_vec(),
                shape2: b.to_vec(),
            });
        }
    }
    Ok(out)
}

fn broadcast_to<'a>(
    t: &'a Tensor,
    shape: &[usize],
    other: &Tensor,
    op: &str,
) -> Result<ArrayViewD<'a, f64>, BackendError> {
    t.data()
        .broadcast(IxDyn(shape))
        .ok_or_else(|| BackendError::ShapeIncompatible {
            op: op.to_string(),
            shape1: t.shape().to_vec(),
            shape2: other.shape().to_vec(),
        })
}

impl Tensor {
    // ========== 逐元素二元运算 ==========

    /// 逐元素二元运算（带广播）。结果 dtype 取第一个操作数的 dtype。
    pub fn binary_with(
        &self,
        other: &Self,
        op: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, BackendError> {
        let shape = broadcast_shape(self.shape(), other.shape())?;
        let a = broadcast_to(self, &shape, other, op)?;
        let b = broadcast_to(other, &shape, self, op)?;
        // 结果随 dtype 标签折算落值，整型标签的缓冲不得携带小数
        let dtype = self.dtype();
        let data = Zip::from(&a).and(&b).map_collect(|&x, &y| dtype.coerce(f(x, y)));
        Ok(Self::from_array(data, dtype))
    }

    /// 逐元素比较（带广播），结果 dtype 为 bool
    pub fn compare_with(
        &self,
        other: &Self,
        op: &str,
        f: impl Fn(f64, f64) -> bool,
    ) -> Result<Self, BackendError> {
        let result = self.binary_with(other, op, |x, y| if f(x, y) { 1.0 } else { 0.0 })?;
        Ok(Self::from_array(result.data().clone(), DType::Bool))
    }

    /// 逐元素一元运算，dtype 保持不变
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::from_array(self.data().mapv(&f), self.dtype())
    }

    // ========== 矩阵运算 ==========

    /// 矩阵/向量乘（`@`算子）：支持 1/2 阶操作数的四种组合
    pub fn dot(&self, other: &Self) -> Result<Self, BackendError> {
        let incompatible = || BackendError::ShapeIncompatible {
            op: "@".to_string(),
            shape1: self.shape().to_vec(),
            shape2: other.shape().to_vec(),
        };
        let result: ArrayD<f64> = match (self.dimension(), other.dimension()) {
            (1, 1) => {
                let a = self.data().view().into_dimensionality::<Ix1>().unwrap();
                let b = other.data().view().into_dimensionality::<Ix1>().unwrap();
                if a.len() != b.len() {
                    return Err(incompatible());
                }
                Array::from_elem(IxDyn(&[]), a.dot(&b))
            }
            (2, 1) => {
                let a = self.data().view().into_dimensionality::<Ix2>().unwrap();
                let b = other.data().view().into_dimensionality::<Ix1>().unwrap();
                if a.ncols() != b.len() {
                    return Err(incompatible());
                }
                a.dot(&b).into_dyn()
            }
            (1, 2) => {
                let a = self.data().view().into_dimensionality::<Ix1>().unwrap();
                let b = other.data().view().into_dimensionality::<Ix2>().unwrap();
                if a.len() != b.nrows() {
                    return Err(incompatible());
                }
                a.dot(&b).into_dyn()
            }
            (2, 2) => {
                let a = self.data().view().into_dimensionality::<Ix2>().unwrap();
                let b = other.data().view().into_dimensionality::<Ix2>().unwrap();
                if a.ncols() != b.nrows() {
                    return Err(incompatible());
                }
                a.dot(&b).into_dyn()
            }
            _ => return Err(incompatible()),
        };
        Ok(Self::from_array(result, self.dtype()))
    }

    /// 转置（`.T`算子）：反转所有轴
    pub fn transpose(&self) -> Self {
        Self::from_array(self.data().clone().reversed_axes(), self.dtype())
    }

    // ========== 形状变换 ==========

    pub fn reshape(&self, shape: &[usize]) -> Result<Self, BackendError> {
        if shape.iter().product::<usize>() != self.len() {
            return Err(BackendError::ShapeIncompatible {
                op: "reshape".to_string(),
                shape1: self.shape().to_vec(),
                shape2: shape.to_vec(),
            });
        }
        let data = self
            .data()
            .as_standard_layout()
            .to_owned()
            .into_shape(IxDyn(shape))
            .map_err(|e| BackendError::Computation(e.to_string()))?;
        Ok(Self::from_array(data, self.dtype()))
    }

    /// 去掉指定的单例维度
    pub fn squeeze(&self, axis: usize) -> Result<Self, BackendError> {
        if axis >= self.dimension() || self.shape()[axis] != 1 {
            return Err(BackendError::ShapeIncompatible {
                op: "squeeze".to_string(),
                shape1: self.shape().to_vec(),
                shape2: vec![axis],
            });
        }
        let data = self.data().clone().index_axis_move(Axis(axis), 0);
        Ok(Self::from_array(data, self.dtype()))
    }

    /// 沿扁平顺序循环移位
    pub fn roll(&self, shift: i64) -> Self {
        let n = self.len() as i64;
        if n == 0 {
            return self.clone();
        }
        let flat = self.flat();
        let offset = ((-shift % n) + n) % n;
        let rolled: Vec<f64> = (0..n)
            .map(|i| flat[((i + offset) % n) as usize])
            .collect();
        let data = Array::from_shape_vec(IxDyn(self.shape()), rolled).unwrap();
        Self::from_array(data, self.dtype())
    }

    /// 沿指定轴拼接
    pub fn concat(parts: &[Self], axis: usize) -> Result<Self, BackendError> {
        if parts.is_empty() {
            return Err(BackendError::Computation("concat 的张量列表为空".to_string()));
        }
        let views: Vec<ArrayViewD<f64>> = parts.iter().map(|t| t.data().view()).collect();
        let data = ndarray::concatenate(Axis(axis), &views)
            .map_err(|e| BackendError::Computation(e.to_string()))?;
        Ok(Self::from_array(data, parts[0].dtype()))
    }

    // ========== 归约 ==========

    pub fn sum(&self, axis: Option<usize>) -> Result<Self, BackendError> {
        match axis {
            None => Ok(Self::from_array(
                Array::from_elem(IxDyn(&[]), self.data().sum()),
                self.dtype(),
            )),
            Some(ax) => {
                self.check_axis(ax, "sum")?;
                Ok(Self::from_array(self.data().sum_axis(Axis(ax)), self.dtype()))
            }
        }
    }

    pub fn mean(&self, axis: Option<usize>) -> Result<Self, BackendError> {
        match axis {
            None => {
                let m = self.data().mean().ok_or_else(|| {
                    BackendError::Computation("空张量无法求均值".to_string())
                })?;
                Ok(Self::from_array(Array::from_elem(IxDyn(&[]), m), self.dtype()))
            }
            Some(ax) => {
                self.check_axis(ax, "mean")?;
                let m = self.data().mean_axis(Axis(ax)).ok_or_else(|| {
                    BackendError::Computation("空张量无法求均值".to_string())
                })?;
                Ok(Self::from_array(m, self.dtype()))
            }
        }
    }

    pub fn max(&self) -> Result<Self, BackendError> {
        let m = self
            .data()
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if self.is_empty() {
            return Err(BackendError::Computation("空张量无法求最大值".to_string()));
        }
        Ok(Self::from_array(Array::from_elem(IxDyn(&[]), m), self.dtype()))
    }

    pub fn min(&self) -> Result<Self, BackendError> {
        let m = self.data().iter().copied().fold(f64::INFINITY, f64::min);
        if self.is_empty() {
            return Err(BackendError::Computation("空张量无法求最小值".to_string()));
        }
        Ok(Self::from_array(Array::from_elem(IxDyn(&[]), m), self.dtype()))
    }

    /// 扁平顺序下最大元素的下标
    pub fn argmax(&self) -> Result<Self, BackendError> {
        let idx = self
            .data()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .ok_or_else(|| BackendError::Computation("空张量无法求 argmax".to_string()))?;
        Ok(Self::from_array(
            Array::from_elem(IxDyn(&[]), idx as f64),
            DType::Int64,
        ))
    }

    /// 扁平顺序下最小元素的下标
    pub fn argmin(&self) -> Result<Self, BackendError> {
        let idx = self
            .data()
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .ok_or_else(|| BackendError::Computation("空张量无法求 argmin".to_string()))?;
        Ok(Self::from_array(
            Array::from_elem(IxDyn(&[]), idx as f64),
            DType::Int64,
        ))
    }

    /// softmax（整体归一化，与原始 numpy 表的行为一致）
    pub fn softmax(&self) -> Self {
        let exp = self.data().mapv(f64::exp);
        let total = exp.sum();
        Self::from_array(exp / total, self.dtype())
    }

    fn check_axis(&self, axis: usize, op: &str) -> Result<(), BackendError> {
        if axis >= self.dimension() {
            return Err(BackendError::ShapeIncompatible {
                op: op.to_string(),
                shape1: self.shape().to_vec(),
                shape2: vec![axis],
            });
        }
        Ok(())
    }
}
