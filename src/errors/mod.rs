/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 后端/计算图的错误类型
 */

use thiserror::Error;

/// 后端操作错误类型
///
/// 所有错误均在图构建点或首次求值点同步抛出，不做自动重试；
/// 构建失败的 `add_var`/`add_op` 不会在图中留下任何节点。
#[derive(Error, Debug, PartialEq)]
pub enum BackendError {
    // ========== 变量创建 ==========
    #[error("变量{name}缺少必要参数：须提供`value`，或同时提供`shape`与`dtype`")]
    Configuration { name: String },
    #[error("无效的数据类型：{0}。请检查后端 dtype 表支持的类型名")]
    UnsupportedDtype(String),
    #[error("无效的变量类型：{0}。须为`state_var`、`constant`或`placeholder`之一")]
    InvalidVarKind(String),

    // ========== 算子 ==========
    #[error("算子{0}不存在于后端算子表中")]
    UnknownOperator(String),
    #[error("算子{op}的参数无效：三种调用形式（展开/打包/打包+尾参）均失败")]
    InvalidOperatorArguments { op: String },

    // ========== 形状/dtype ==========
    #[error("形状不兼容，故无法{op}：第一个操作数形状为{shape1:?}，第二个为{shape2:?}")]
    ShapeIncompatible {
        op: String,
        shape1: Vec<usize>,
        shape2: Vec<usize>,
    },
    #[error("新缓冲形状{got:?}与变量{name}既有形状{expected:?}不匹配")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    // ========== 图结构 ==========
    #[error("变量{0}在图中不存在")]
    VariableNotFound(String),
    #[error("操作{0}在图中不存在")]
    OperationNotFound(String),
    #[error("{0}")]
    InvalidOperation(String),

    // ========== 运行 ==========
    #[error("计算错误：{0}")]
    Computation(String),
}
