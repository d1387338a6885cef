/*
 * @Author       : 老董
 * @Date         : 2026-08-22
 * @Description  : 会话后端：图构建与即时后端共用同一张图，run 时把编译后的
 *                 层调度降低为指令带，交给一个持有私有值存储的会话执行。
 *                 仿真期间图内缓冲不被触碰（委托外部引擎的语义）。
 */

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::{Backend, RunRequest, RunResult};
use crate::errors::BackendError;
use crate::graph::{
    CallForm, Graph, Literal, OpKwargs, OpResult, Operand, VarHandle, VarKind, VarSpec,
};
use crate::ops::{ArgValue, AssignKind, Invocation, Kernel, KernelError, OpFunction};
use crate::tensor::{DType, Tensor};

/// 会话的目标设备。内置实现都在 CPU 上执行，
/// 设备选择只作为会话元信息透传（外部引擎自行解释）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu,
    Custom(String),
}

impl Device {
    pub fn parse(selector: &str) -> Self {
        match selector {
            "cpu" => Self::Cpu,
            "gpu" => Self::Gpu,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Custom(s) => s,
        }
    }
}

/// 会话后端
pub struct SessionBackend {
    graph: Graph,
    device: Device,
}

impl SessionBackend {
    pub fn new(device: &str) -> Self {
        Self {
            graph: Graph::new(),
            device: Device::parse(device),
        }
    }

    pub fn with_extras(
        extra_ops: HashMap<String, Kernel>,
        extra_dtypes: HashMap<String, DType>,
        device: &str,
    ) -> Self {
        Self {
            graph: Graph::with_extras(extra_ops, extra_dtypes),
            device: Device::parse(device),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

impl Backend for SessionBackend {
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
        let mut session = Session::build(&self.graph, &request.sampling_ops)?;

        for step in 0..request.steps {
            if let Some(every) = request.sampling_steps {
                if every > 0 && step % every == 0 {
                    session.exec_sampling()?;
                    continue;
                }
            }
            if let Some(feed) = request.inputs.get(step) {
                for (name, value) in feed {
                    session.feed(name, value)?;
                }
            }
            session.exec_step()?;
            if request.profile.memory {
                peak_memory = peak_memory.max(session.memory_bytes());
            }
        }

        let mut outputs: HashMap<String, Tensor> = HashMap::new();
        for (label, var_name) in &request.outputs {
            outputs.insert(label.clone(), session.fetch(var_name)?);
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
        let mut summary = self.graph.describe();
        if let Some(obj) = summary.as_object_mut() {
            obj.insert(
                "device".to_string(),
                serde_json::Value::String(self.device.as_str().to_string()),
            );
        }
        summary
    }
}

/// 指令的操作数来源：会话值存储（变量）、指令槽（上游操作）或字面量
enum SlotRef {
    Var(String),
    Op(String),
    Lit(ArgValue),
}

/// 指令带中的一条指令：求值一个操作节点并写入其结果槽
struct Instr {
    slot: String,
    key: String,
    func: OpFunction,
    form: CallForm,
    operands: Vec<SlotRef>,
}

/// 一次 run 的会话：私有值存储 + 按层降低的指令带。
/// 每个操作节点每步恰好求值一次（层屏障只体现为指令顺序）。
struct Session {
    store: HashMap<String, Tensor>,
    slots: HashMap<String, Tensor>,
    tape: Vec<Instr>,
    sampling_tape: Vec<Instr>,
}

impl Session {
    /// 从编译后的图降低会话：拷贝全部变量缓冲，
    /// 把各层操作（连同其操作数子树，后序）铺成指令带
    fn build(graph: &Graph, sampling_ops: &[String]) -> Result<Self, BackendError> {
        let store = graph
            .var_iter()
            .map(|v| (v.name().to_string(), v.value().clone()))
            .collect();

        let mut tape = Vec::new();
        let mut emitted = HashSet::new();
        for layer in graph.layers() {
            for op_name in layer {
                lower_op(graph, op_name, &mut emitted, &mut tape)?;
            }
        }

        let mut sampling_tape = Vec::new();
        let mut sampling_emitted = HashSet::new();
        for op_name in sampling_ops {
            lower_op(graph, op_name, &mut sampling_emitted, &mut sampling_tape)?;
        }

        Ok(Self {
            store,
            slots: HashMap::new(),
            tape,
            sampling_tape,
        })
    }

    fn feed(&mut self, name: &str, value: &Tensor) -> Result<(), BackendError> {
        let buffer = self
            .store
            .get_mut(name)
            .ok_or_else(|| BackendError::VariableNotFound(name.to_string()))?;
        if value.is_scalar() && !buffer.is_scalar() {
            *buffer = Tensor::filled(buffer.shape(), value.to_scalar().unwrap(), buffer.dtype());
        } else if value.shape() == buffer.shape() {
            *buffer = value.cast(buffer.dtype());
        } else {
            return Err(BackendError::ShapeMismatch {
                name: name.to_string(),
                expected: buffer.shape().to_vec(),
                got: value.shape().to_vec(),
            });
        }
        Ok(())
    }

    fn fetch(&self, name: &str) -> Result<Tensor, BackendError> {
        self.store
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::VariableNotFound(name.to_string()))
    }

    fn exec_step(&mut self) -> Result<(), BackendError> {
        for idx in 0..self.tape.len() {
            self.exec_instr(idx, false)?;
        }
        Ok(())
    }

    fn exec_sampling(&mut self) -> Result<(), BackendError> {
        for idx in 0..self.sampling_tape.len() {
            self.exec_instr(idx, true)?;
        }
        Ok(())
    }

    fn exec_instr(&mut self, idx: usize, sampling: bool) -> Result<(), BackendError> {
        let instr = if sampling {
            &self.sampling_tape[idx]
        } else {
            &self.tape[idx]
        };

        let mut args: Vec<ArgValue> = Vec::with_capacity(instr.operands.len());
        for operand in &instr.operands {
            args.push(match operand {
                SlotRef::Var(name) => ArgValue::Tensor(
                    self.store
                        .get(name)
                        .cloned()
                        .ok_or_else(|| BackendError::VariableNotFound(name.clone()))?,
                ),
                SlotRef::Op(name) => ArgValue::Tensor(
                    self.slots
                        .get(name)
                        .cloned()
                        .ok_or_else(|| BackendError::OperationNotFound(name.clone()))?,
                ),
                SlotRef::Lit(value) => value.clone(),
            });
        }

        let result = match instr.func {
            OpFunction::Map(kernel) => match kernel(&Invocation::new(instr.form, &args)) {
                Ok(result) => result,
                Err(KernelError::Arity) => {
                    return Err(BackendError::InvalidOperatorArguments {
                        op: instr.key.clone(),
                    });
                }
                Err(KernelError::Backend(e)) => return Err(e),
            },
            OpFunction::Assign(kind) => {
                let target = match &instr.operands[0] {
                    SlotRef::Var(name) => name.clone(),
                    _ => {
                        return Err(BackendError::InvalidOperatorArguments {
                            op: instr.key.clone(),
                        });
                    }
                };
                let rhs = match &args[1] {
                    ArgValue::Tensor(t) => t.clone(),
                    _ => {
                        return Err(BackendError::InvalidOperatorArguments {
                            op: instr.key.clone(),
                        });
                    }
                };
                let buffer = self
                    .store
                    .get_mut(&target)
                    .ok_or_else(|| BackendError::VariableNotFound(target.clone()))?;
                let rhs = if rhs.is_scalar() && !buffer.is_scalar() {
                    Tensor::filled(buffer.shape(), rhs.to_scalar().unwrap(), buffer.dtype())
                } else {
                    rhs
                };
                match kind {
                    AssignKind::Replace => buffer.assign(&rhs)?,
                    AssignKind::Add => buffer.assign_add(&rhs)?,
                }
                buffer.clone()
            }
        };
        let slot = instr.slot.clone();
        self.slots.insert(slot, result);
        Ok(())
    }

    fn memory_bytes(&self) -> usize {
        self.store.values().map(Tensor::nbytes).sum::<usize>()
            + self.slots.values().map(Tensor::nbytes).sum::<usize>()
    }
}

/// 后序降低一个操作节点：先铺其上游操作，再铺自身；已铺过的跳过
fn lower_op(
    graph: &Graph,
    op_name: &str,
    emitted: &mut HashSet<String>,
    tape: &mut Vec<Instr>,
) -> Result<(), BackendError> {
    if emitted.contains(op_name) {
        return Ok(());
    }
    emitted.insert(op_name.to_string());

    let operation = graph.op(op_name)?;
    let mut operands = Vec::with_capacity(operation.operands().len());
    for operand in operation.operands() {
        operands.push(match operand {
            Operand::Var(name) => SlotRef::Var(name.clone()),
            Operand::Op(name) => {
                lower_op(graph, name, emitted, tape)?;
                SlotRef::Op(name.clone())
            }
            Operand::Literal(Literal::Num(x)) => SlotRef::Lit(ArgValue::Tensor(Tensor::scalar(*x))),
            Operand::Literal(Literal::Array(t)) => SlotRef::Lit(ArgValue::Tensor(t.clone())),
            Operand::Literal(Literal::Shape(s)) => SlotRef::Lit(ArgValue::Shape(s.clone())),
            Operand::Literal(Literal::DType(d)) => SlotRef::Lit(ArgValue::DType(*d)),
        });
    }

    tape.push(Instr {
        slot: op_name.to_string(),
        key: operation.key().to_string(),
        func: graph.op_function(operation.key())?,
        form: operation.call_form(),
        operands,
    });
    Ok(())
}
