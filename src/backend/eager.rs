/*
 * @Author       : 老董
 * @Date         : 2026-08-22
 * @Description  : 即时后端：图构建与求值都直接作用于图内缓冲
 */

use std::collections::HashMap;
use std::time::Instant;

use super::{Backend, RunRequest, RunResult};
use crate::errors::BackendError;
use crate::graph::{Graph, OpKwargs, OpResult, Operand, VarHandle, VarKind, VarSpec};
use crate::ops::Kernel;
use crate::tensor::{DType, Tensor};

/// 即时后端：持有一张图，所有调用 1:1 落到图上
pub struct EagerBackend {
    graph: Graph,
}

impl EagerBackend {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
        }
    }

    /// 带用户扩展算子/dtype 的构造
    pub fn with_extras(
        extra_ops: HashMap<String, Kernel>,
        extra_dtypes: HashMap<String, DType>,
    ) -> Self {
        Self {
            graph: Graph::with_extras(extra_ops, extra_dtypes),
        }
    }

    /// 直接访问底层图（检查节点/层用）
    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

impl Default for EagerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for EagerBackend {
    fn add_var(&mut self, vtype: &str, spec: VarSpec) -> Result<VarHandle, BackendError> {
        self.graph.add_var(VarKind::parse(vtype)?, spec)
    }

    fn add_op(
        &mut self,
        key: &str,
        args: Vec<Operand>,
        kwargs: OpKwargs,
    ) -> Result<OpResult, BackendError> {
        self.graph.add_op(key, args, kwargs)
    }

    fn add_layer(&mut self, op_names: Vec<String>) -> Result<(), BackendError> {
        self.graph.add_layer(op_names)
    }

    fn broadcast(
        &mut self,
        op1: Operand,
        op2: Operand,
        assign: bool,
        kwargs: &OpKwargs,
    ) -> Result<(Operand, Operand), BackendError> {
        self.graph.broadcast(op1, op2, assign, kwargs)
    }

    fn run(&mut self, request: RunRequest) -> Result<RunResult, BackendError> {
        let started = request.profile.time.then(Instant::now);
        let mut peak_memory: usize = 0;

        self.graph.compile();
        let n_layers = self.graph.layers().len();

        for step in 0..request.steps {
            // 采样步只求值采样操作组
            if let Some(every) = request.sampling_steps {
                if every > 0 && step % every == 0 {
                    self.graph.eval_ops(&request.sampling_ops)?;
                    continue;
                }
            }
            if let Some(feed) = request.inputs.get(step) {
                for (name, value) in feed {
                    self.graph.set_var_value(name, value)?;
                }
            }
            for layer in 0..n_layers {
                self.graph.eval_layer(layer)?;
            }
            if request.profile.memory {
                peak_memory = peak_memory.max(self.graph.memory_bytes());
            }
        }

        let mut outputs: HashMap<String, Tensor> = HashMap::new();
        for (label, var_name) in &request.outputs {
            outputs.insert(label.clone(), self.graph.eval_var(var_name)?);
        }

        Ok(RunResult {
            outputs,
            sim_time: started.map(|t0| t0.elapsed().as_secs_f64()),
            peak_memory: request.profile.memory.then_some(peak_memory),
        })
    }

    fn clear(&mut self) {
        self.graph.clear();
    }

    fn describe(&self) -> serde_json::Value {
        self.graph.describe()
    }
}
