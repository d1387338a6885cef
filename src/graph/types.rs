/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 图的基础类型：变量种类、操作数、分发模式、调用形式与各类句柄
 */

use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::tensor::{DType, Tensor};

/// 变量节点的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// 随仿真步变化的状态量
    State,
    /// 创建后不可变的常量（含常量折叠的产物）
    Constant,
    /// 初始化时值未知、由 run 的 inputs 逐步喂入
    Placeholder,
}

impl VarKind {
    /// 从前端的字符串标识解析（`state_var`/`constant`/`placeholder`）
    pub fn parse(s: &str) -> Result<Self, BackendError> {
        match s {
            "state_var" => Ok(Self::State),
            "constant" => Ok(Self::Constant),
            "placeholder" => Ok(Self::Placeholder),
            _ => Err(BackendError::InvalidVarKind(s.to_string())),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state_var",
            Self::Constant => "constant",
            Self::Placeholder => "placeholder",
        }
    }
}

/// 裸字面量操作数（非图驻留）。
/// `Num`不携带形状信息；`Array`总是携带（包括 0 阶张量）。
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Num(f64),
    Shape(Vec<usize>),
    DType(DType),
    Array(Tensor),
}

/// 操作节点的操作数：图驻留节点按名引用，或裸字面量
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(String),
    Op(String),
    Literal(Literal),
}

impl Operand {
    pub fn num(x: f64) -> Self {
        Self::Literal(Literal::Num(x))
    }

    pub fn array(t: Tensor) -> Self {
        Self::Literal(Literal::Array(t))
    }

    pub fn shape(s: &[usize]) -> Self {
        Self::Literal(Literal::Shape(s.to_vec()))
    }

    pub fn dtype(d: DType) -> Self {
        Self::Literal(Literal::DType(d))
    }

    /// 是否为图驻留（可延迟求值）的操作数
    pub fn is_evaluable(&self) -> bool {
        matches!(self, Self::Var(_) | Self::Op(_))
    }

    pub fn kind(&self) -> OperandKind {
        if self.is_evaluable() {
            OperandKind::Node
        } else {
            OperandKind::Constant
        }
    }
}

/// 操作数类别：图驻留节点 vs 裸常量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Node,
    Constant,
}

/// 前两个操作数的类别模式。
/// 一元时只区分是否可求值，二元时区分全部四种组合；
/// `Binary{Constant, Constant}`（或一元 Constant）即常量折叠分支。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandPattern {
    Nullary,
    Unary(OperandKind),
    Binary(OperandKind, OperandKind),
}

impl OperandPattern {
    pub fn of(args: &[Operand]) -> Self {
        match args {
            [] => Self::Nullary,
            [a] => Self::Unary(a.kind()),
            [a, b, ..] => Self::Binary(a.kind(), b.kind()),
        }
    }

    /// 没有任何可求值操作数时立即折叠
    pub fn is_constant(&self) -> bool {
        match self {
            Self::Nullary => true,
            Self::Unary(k) => *k == OperandKind::Constant,
            Self::Binary(a, b) => {
                *a == OperandKind::Constant && *b == OperandKind::Constant
            }
        }
    }
}

/// 核函数的调用形式（参数元数回退链：展开 -> 打包 -> 打包+尾参）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallForm {
    /// 操作数按位置展开传入
    Spread,
    /// 所有操作数打包成一个列表传入
    Packed,
    /// 末位操作数降级为尾参，其余打包成列表
    PackedTail,
}

// ========== add_var / add_op 的请求与结果 ==========

/// `add_var`的初值
#[derive(Debug, Clone)]
pub enum VarValue {
    /// 裸标量：按请求形状铺满
    Num(f64),
    Array(Tensor),
}

/// `add_var`的请求参数
#[derive(Debug, Clone, Default)]
pub struct VarSpec {
    pub name: String,
    pub value: Option<VarValue>,
    pub shape: Option<Vec<usize>>,
    pub dtype: Option<String>,
    /// 命名空间前缀，拼为 `{scope}/{name}`
    pub scope: Option<String>,
}

impl VarSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: Tensor) -> Self {
        self.value = Some(VarValue::Array(value));
        self
    }

    pub fn with_scalar(mut self, value: f64) -> Self {
        self.value = Some(VarValue::Num(value));
        self
    }

    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.shape = Some(shape.to_vec());
        self
    }

    pub fn with_dtype(mut self, dtype: &str) -> Self {
        self.dtype = Some(dtype.to_string());
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }
}

/// `add_op`的关键字参数
#[derive(Debug, Clone, Default)]
pub struct OpKwargs {
    pub scope: Option<String>,
    /// 依赖的操作名列表：未被任何已注册层覆盖的依赖会被收进一个新层
    pub dependencies: Vec<String>,
    /// 为 true 时，结果绑定到一个新建状态变量而非返回裸操作节点
    pub assign_to_var: bool,
}

impl OpKwargs {
    pub fn with_dependencies(deps: &[&str]) -> Self {
        Self {
            dependencies: deps.iter().map(|s| (*s).to_string()).collect(),
            ..Self::default()
        }
    }
}

/// 变量节点句柄：携带最终（可能被加后缀的）名称与固定的形状/dtype
#[derive(Debug, Clone, PartialEq)]
pub struct VarHandle {
    pub name: String,
    pub kind: VarKind,
    pub shape: Vec<usize>,
    pub dtype: DType,
}

/// 操作节点句柄
#[derive(Debug, Clone, PartialEq)]
pub struct OpHandle {
    pub name: String,
    pub key: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
}

/// `add_op`的返回：操作节点、（折叠出的）常量变量或裸标量
#[derive(Debug, Clone, PartialEq)]
pub enum OpResult {
    Op(OpHandle),
    Var(VarHandle),
    Scalar(f64),
}

impl OpResult {
    /// 转成可继续入图的操作数
    pub fn as_operand(&self) -> Operand {
        match self {
            Self::Op(h) => Operand::Op(h.name.clone()),
            Self::Var(h) => Operand::Var(h.name.clone()),
            Self::Scalar(x) => Operand::num(*x),
        }
    }

    pub fn unwrap_op(self) -> OpHandle {
        match self {
            Self::Op(h) => h,
            other => panic!("预期 OpResult::Op，实际得到 {other:?}"),
        }
    }

    pub fn unwrap_var(self) -> VarHandle {
        match self {
            Self::Var(h) => h,
            other => panic!("预期 OpResult::Var，实际得到 {other:?}"),
        }
    }
}
