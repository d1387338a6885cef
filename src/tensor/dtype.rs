/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 数据类型标签与 dtype 名称解析表
 */

use crate::errors::BackendError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 后端支持的原始数值类型。
///
/// 注意：这是**声明层**的标签。实际缓冲一律以 f64 存储（与 only_torch
/// 的 Tensor 一律 f32 同理）；整型/布尔 dtype 通过 `cast` 语义落到缓冲值上，
/// 复数宽度仅保留实部（本后端的算子全部是实值运算）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    Float16,
    Float32,
    Float64,
    Int16,
    Int32,
    Int64,
    UInt16,
    UInt32,
    UInt64,
    Complex64,
    Complex128,
    Bool,
}

/// 内置 dtype 表的固定遍历顺序（子串匹配时先到先得）
pub const BUILTIN_DTYPES: [DType; 12] = [
    DType::Float16,
    DType::Float32,
    DType::Float64,
    DType::Int16,
    DType::Int32,
    DType::Int64,
    DType::UInt16,
    DType::UInt32,
    DType::UInt64,
    DType::Complex64,
    DType::Complex128,
    DType::Bool,
];

impl DType {
    /// 规范名称（与解析表的键一致）
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
            Self::Bool => "bool",
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    pub const fn is_int(&self) -> bool {
        matches!(
            self,
            Self::Int16 | Self::Int32 | Self::Int64 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    /// 按 dtype 语义折算单个元素值：
    /// 整型截断小数（无符号再钳到 0 以上），布尔以非零为 1.0
    pub fn coerce(&self, x: f64) -> f64 {
        if self.is_int() {
            let t = x.trunc();
            if self.is_unsigned() && t < 0.0 { 0.0 } else { t }
        } else if *self == Self::Bool {
            if x != 0.0 { 1.0 } else { 0.0 }
        } else {
            x
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// dtype 名称解析表：内置 12 种类型 + 后端构建时合并的额外别名
#[derive(Debug, Clone, Default)]
pub struct DTypeTable {
    extra: HashMap<String, DType>,
}

impl DTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在内置表之上合并额外的「别名 -> dtype」映射
    pub fn with_extras(extra: HashMap<String, DType>) -> Self {
        Self { extra }
    }

    /// 解析 dtype 字符串：
    /// 1. 与规范名称精确匹配；
    /// 2. 子串匹配（规范名称包含于请求串中，如 "float32_ref" -> float32）；
    /// 3. 查额外别名表；
    /// 均不命中则返回 `UnsupportedDtype`。
    pub fn resolve(&self, name: &str) -> Result<DType, BackendError> {
        for dtype in BUILTIN_DTYPES {
            if dtype.name() == name {
                return Ok(dtype);
            }
        }
        for dtype in BUILTIN_DTYPES {
            if name.contains(dtype.name()) {
                return Ok(dtype);
            }
        }
        if let Some(&dtype) = self.extra.get(name) {
            return Ok(dtype);
        }
        Err(BackendError::UnsupportedDtype(name.to_string()))
    }
}
