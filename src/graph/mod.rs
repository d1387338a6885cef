/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : Graph 模块：计算图的核心实现
 *
 * 公开 API：
 * - `Graph`: 节点竞技场 + 层调度（变量/操作一律按稳定名称互相引用）
 * - `Variable`/`Operation`: 两类节点
 * - 各类操作数/句柄/请求类型见 `types`
 */

mod broadcast;
mod core;
mod describe;
mod node;
mod types;

pub use core::Graph;
pub use node::{Operation, Variable};
pub use types::{
    CallForm, Literal, OpHandle, OpKwargs, OpResult, Operand, OperandKind, OperandPattern,
    VarHandle, VarKind, VarSpec, VarValue,
};

#[cfg(test)]
mod tests;
