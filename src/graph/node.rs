/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 图中的两类节点：变量节点（Variable）与操作节点（Operation）
 */

use super::types::{CallForm, Operand, VarKind};
use crate::errors::BackendError;
use crate::tensor::{DType, Tensor};

/// 变量节点：命名的数值缓冲，形状/dtype 创建后固定。
/// 变更只能替换缓冲内容，绝不改变形状/dtype；常量创建后完全不可变。
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    kind: VarKind,
    value: Tensor,
}

impl Variable {
    pub fn new(name: String, kind: VarKind, value: Tensor) -> Self {
        Self { name, kind, value }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> VarKind {
        self.kind
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn dtype(&self) -> DType {
        self.value.dtype()
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// 替换缓冲内容。标量来源会铺满整个缓冲；形状不符则报错。
    pub fn set_value(&mut self, value: &Tensor) -> Result<(), BackendError> {
        if self.kind == VarKind::Constant {
            return Err(BackendError::InvalidOperation(format!(
                "常量{}不可变更",
                self.name
            )));
        }
        if value.is_scalar() && !self.value.is_scalar() {
            let fill = value.to_scalar().unwrap();
            self.value = Tensor::filled(self.shape(), fill, self.dtype());
            return Ok(());
        }
        self.value.assign(value).map_err(|_| BackendError::ShapeMismatch {
            name: self.name.clone(),
            expected: self.shape().to_vec(),
            got: value.shape().to_vec(),
        })
    }

    /// 缓冲累加（`+=`）
    pub fn add_assign_value(&mut self, value: &Tensor) -> Result<(), BackendError> {
        if self.kind == VarKind::Constant {
            return Err(BackendError::InvalidOperation(format!(
                "常量{}不可变更",
                self.name
            )));
        }
        self.value.assign_add(value).map_err(|_| BackendError::ShapeMismatch {
            name: self.name.clone(),
            expected: self.shape().to_vec(),
            got: value.shape().to_vec(),
        })
    }

    /// 广播协调专用：将缓冲整体重铸到新 dtype（形状不变）。
    /// 这是 dtype 固定不变原则唯一的例外口子。
    pub(in crate::graph) fn recast(&mut self, dtype: DType) {
        self.value = self.value.cast(dtype);
    }
}

/// 操作节点：命名的延迟计算。形状/dtype 在构建时经一次试算缓存，
/// 之后不再重算（操作数缓冲的形状本就不会变）。
#[derive(Debug, Clone)]
pub struct Operation {
    name: String,
    key: String,
    operands: Vec<Operand>,
    /// 构建时回退链选中的调用形式，求值时原样重放
    call_form: CallForm,
    shape: Vec<usize>,
    dtype: DType,
}

impl Operation {
    pub fn new(
        name: String,
        key: String,
        operands: Vec<Operand>,
        call_form: CallForm,
        shape: Vec<usize>,
        dtype: DType,
    ) -> Self {
        Self {
            name,
            key,
            operands,
            call_form,
            shape,
            dtype,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub const fn call_form(&self) -> CallForm {
        self.call_form
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub const fn dtype(&self) -> DType {
        self.dtype
    }
}
