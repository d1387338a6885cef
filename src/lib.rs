//! # Only Rates
//!
//! `only_rates`项目旨在用纯rust仿造[PyRates](https://github.com/pyrates-neuroscience/PyRates)
//! 这类神经群体动力学仿真框架的数值后端：由符号化模型声明构建一次计算图，
//! 之后每个仿真步重复求值以推进动力系统状态。
//!
//! 核心组成：
//! - `tensor`: 带 dtype 标签的数值缓冲（基于 ndarray）
//! - `graph`: 变量/操作节点、层调度与广播协调
//! - `ops`: 算子表与核函数
//! - `backend`: 即时求值与会话式求值两种后端（同一契约）

pub mod backend;
pub mod errors;
pub mod graph;
pub mod ops;
pub mod tensor;
pub mod utils;
