/*
 * @Author       : 老董
 * @Date         : 2026-08-22
 * @Description  : 后端门面：图构建 + 仿真 run 的统一契约。
 *
 * 两个内置实现：
 * - `EagerBackend`: 即时求值，操作直接作用于图内缓冲
 * - `SessionBackend`: 会话式求值，编译后的层降低为指令带，
 *   值存取走会话私有的存储（模拟外部执行引擎的委托语义）
 */

use std::collections::HashMap;

use enum_dispatch::enum_dispatch;

use crate::errors::BackendError;
use crate::graph::{OpKwargs, OpResult, Operand, VarHandle, VarSpec};
use crate::tensor::Tensor;

mod eager;
mod session;

pub use eager::EagerBackend;
pub use session::{Device, SessionBackend};

#[cfg(test)]
mod tests;

/// 剖析请求：`t`计时、`m`内存峰值、`tm`/`mt`两者兼有
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Profile {
    pub time: bool,
    pub memory: bool,
}

impl Profile {
    pub fn parse(s: &str) -> Self {
        Self {
            time: s.contains('t'),
            memory: s.contains('m'),
        }
    }
}

/// 一次仿真的请求参数
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// 仿真步数
    pub steps: usize,
    /// 预留的逐步操作组；内置后端一律按编译后的层调度求值
    pub ops: Vec<String>,
    /// 每步喂入 placeholder 的值（变量名 -> 值），不足的步不喂入
    pub inputs: Vec<HashMap<String, Tensor>>,
    /// 输出申领：标签 -> 变量名，run 结束时捕获各变量的终值
    pub outputs: HashMap<String, String>,
    /// 采样周期：步号是其整数倍时，本步只求值 sampling_ops
    pub sampling_steps: Option<usize>,
    pub sampling_ops: Vec<String>,
    pub profile: Profile,
}

impl RunRequest {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<HashMap<String, Tensor>>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_output(mut self, label: &str, var_name: &str) -> Self {
        self.outputs.insert(label.to_string(), var_name.to_string());
        self
    }

    pub fn with_sampling(mut self, every: usize, ops: &[&str]) -> Self {
        self.sampling_steps = Some(every);
        self.sampling_ops = ops.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = Profile::parse(profile);
        self
    }
}

/// 一次仿真的结果
#[derive(Debug, Clone)]
pub struct RunResult {
    /// 标签 -> 对应变量在最后一步之后的缓冲值
    pub outputs: HashMap<String, Tensor>,
    /// 请求了`t`时的总耗时（秒）
    pub sim_time: Option<f64>,
    /// 请求了`m`时的缓冲内存峰值（字节）
    pub peak_memory: Option<usize>,
}

/// 后端契约：图构建（add_var/add_op/add_layer/broadcast）+ 执行（run/clear）。
/// 任何实现都必须保证：同一张图、同一 inputs 序列、无随机算子时，
/// clear 后重建再 run 的输出逐位一致。
#[enum_dispatch(BackendKind)]
pub trait Backend {
    /// 注册变量节点；`vtype` ∈ {`state_var`, `constant`, `placeholder`}
    fn add_var(&mut self, vtype: &str, spec: VarSpec) -> Result<VarHandle, BackendError>;

    /// 注册操作节点（或常量折叠）
    fn add_op(
        &mut self,
        key: &str,
        args: Vec<Operand>,
        kwargs: OpKwargs,
    ) -> Result<OpResult, BackendError>;

    /// 注册一个层（求值屏障）
    fn add_layer(&mut self, op_names: Vec<String>) -> Result<(), BackendError>;

    /// 广播协调两个操作数（见 Graph::broadcast）
    fn broadcast(
        &mut self,
        op1: Operand,
        op2: Operand,
        assign: bool,
        kwargs: &OpKwargs,
    ) -> Result<(Operand, Operand), BackendError>;

    /// 驱动一次仿真：编译层调度，逐步喂入 inputs 并求值各层，
    /// 结束时捕获 outputs 申领的变量终值
    fn run(&mut self, request: RunRequest) -> Result<RunResult, BackendError>;

    /// 清空图（独立仿真之间不得共享状态）
    fn clear(&mut self);

    /// 图结构摘要（JSON）
    fn describe(&self) -> serde_json::Value;
}

/// 后端的封闭集合，静态分发
#[enum_dispatch]
pub enum BackendKind {
    EagerBackend,
    SessionBackend,
}
