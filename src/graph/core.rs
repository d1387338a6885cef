/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : Graph 核心：节点竞技场、SSA 式命名、add_var/add_op、
 *                 层调度（compile/clear）与逐节点求值
 */

use std::collections::HashMap;

use super::node::{Operation, Variable};
use super::types::{
    CallForm, Literal, OpHandle, OpKwargs, OpResult, Operand, OperandPattern, VarHandle, VarKind,
    VarSpec, VarValue,
};
use crate::errors::BackendError;
use crate::ops::{apply_with_fallback, ArgValue, AssignKind, Invocation, Kernel, KernelError, OpFunction, OperatorTable};
use crate::tensor::{DType, DTypeTable, Tensor};

/// 计算图：按唯一名称持有全部变量/操作节点，外加有序的层列表。
/// 节点之间只按名称交叉引用，所有权全部归图（竞技场式设计）。
pub struct Graph {
    vars: HashMap<String, Variable>,
    ops: HashMap<String, Operation>,
    /// 已声明的层（操作名列表）；compile 去重后冻结为执行顺序
    layers: Vec<Vec<String>>,
    /// compile 后置位，阻止进一步的图变更；clear 复位
    frozen: bool,
    /// 变量/操作各自独立的按基名计数器，clear 时一并复位
    var_counter: HashMap<String, usize>,
    op_counter: HashMap<String, usize>,
    op_table: OperatorTable,
    dtype_table: DTypeTable,
}

impl Graph {
    // ========== 创建 ==========

    pub fn new() -> Self {
        Self::with_extras(HashMap::new(), HashMap::new())
    }

    /// 创建时在内置算子表/dtype 表之上合并用户扩展
    pub fn with_extras(
        extra_ops: HashMap<String, Kernel>,
        extra_dtypes: HashMap<String, DType>,
    ) -> Self {
        Self {
            vars: HashMap::new(),
            ops: HashMap::new(),
            layers: Vec::new(),
            frozen: false,
            var_counter: HashMap::new(),
            op_counter: HashMap::new(),
            op_table: OperatorTable::with_extras(extra_ops),
            dtype_table: DTypeTable::with_extras(extra_dtypes),
        }
    }

    // ========== 基础访问器 ==========

    pub fn vars_count(&self) -> usize {
        self.vars.len()
    }

    pub fn ops_count(&self) -> usize {
        self.ops.len()
    }

    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn var(&self, name: &str) -> Result<&Variable, BackendError> {
        self.vars
            .get(name)
            .ok_or_else(|| BackendError::VariableNotFound(name.to_string()))
    }

    pub fn op(&self, name: &str) -> Result<&Operation, BackendError> {
        self.ops
            .get(name)
            .ok_or_else(|| BackendError::OperationNotFound(name.to_string()))
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn has_op(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// 查询算子键对应的核函数条目（会话后端降低指令带时使用）
    pub fn op_function(&self, key: &str) -> Result<OpFunction, BackendError> {
        self.op_table.get(key)
    }

    pub fn var_iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }

    pub fn op_iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.values()
    }

    /// 全部变量缓冲的字节占用估计（run 的内存剖析用）
    pub fn memory_bytes(&self) -> usize {
        self.vars.values().map(|v| v.value().nbytes()).sum()
    }

    fn check_mutable(&self) -> Result<(), BackendError> {
        if self.frozen {
            return Err(BackendError::InvalidOperation(
                "图已编译冻结，如需重建请先 clear()".to_string(),
            ));
        }
        Ok(())
    }

    // ========== 命名（SSA 式后缀消歧）==========

    /// 首次使用基名原样返回；之后依次产生 `<base>_1`、`<base>_2`…
    /// 候选名若与既有节点撞车则继续推进计数器，保证返回从未用过的名字。
    fn next_var_name(&mut self, base: &str) -> String {
        let taken = |vars: &HashMap<String, Variable>, ops: &HashMap<String, Operation>, n: &str| {
            vars.contains_key(n) || ops.contains_key(n)
        };
        if !self.var_counter.contains_key(base) && !taken(&self.vars, &self.ops, base) {
            self.var_counter.insert(base.to_string(), 1);
            return base.to_string();
        }
        let mut count = self.var_counter.get(base).copied().unwrap_or(1);
        loop {
            let candidate = format!("{base}_{count}");
            count += 1;
            if !taken(&self.vars, &self.ops, &candidate) {
                self.var_counter.insert(base.to_string(), count);
                return candidate;
            }
        }
    }

    fn next_op_name(&mut self, base: &str) -> String {
        let taken = |vars: &HashMap<String, Variable>, ops: &HashMap<String, Operation>, n: &str| {
            vars.contains_key(n) || ops.contains_key(n)
        };
        if !self.op_counter.contains_key(base) && !taken(&self.vars, &self.ops, base) {
            self.op_counter.insert(base.to_string(), 1);
            return base.to_string();
        }
        let mut count = self.op_counter.get(base).copied().unwrap_or(1);
        loop {
            let candidate = format!("{base}_{count}");
            count += 1;
            if !taken(&self.vars, &self.ops, &candidate) {
                self.op_counter.insert(base.to_string(), count);
                return candidate;
            }
        }
    }

    // ========== 变量节点 ==========

    /// 向图中注册一个变量节点。
    /// 形状/dtype 解析失败不会留下任何节点（构造全部成功后才登记）。
    pub fn add_var(&mut self, kind: VarKind, spec: VarSpec) -> Result<VarHandle, BackendError> {
        self.check_mutable()?;

        let base_name = match &spec.scope {
            Some(scope) => format!("{}/{}", scope, spec.name),
            None => spec.name.clone(),
        };

        // 须提供 value，或同时提供 shape 与 dtype
        if spec.value.is_none() && spec.shape.is_none() {
            return Err(BackendError::Configuration { name: base_name });
        }

        // dtype：显式字符串查表，否则从 value 推断
        let dtype = match &spec.dtype {
            Some(s) => self.dtype_table.resolve(s)?,
            None => match &spec.value {
                Some(VarValue::Array(t)) => t.dtype(),
                Some(VarValue::Num(_)) => DType::Float64,
                None => return Err(BackendError::Configuration { name: base_name }),
            },
        };

        // shape：显式优先，否则从 value 推断（裸标量视作 0 阶）
        let shape: Vec<usize> = match &spec.shape {
            Some(s) => s.clone(),
            None => match &spec.value {
                Some(VarValue::Array(t)) => t.shape().to_vec(),
                _ => vec![],
            },
        };

        // 缓冲：缺省全零；裸标量铺满请求形状；数组须与形状吻合
        let buffer = match spec.value {
            None => Tensor::zeros(&shape, dtype),
            Some(VarValue::Num(x)) => Tensor::filled(&shape, x, dtype),
            Some(VarValue::Array(t)) => {
                if t.shape() == shape.as_slice() {
                    t.cast(dtype)
                } else if t.is_scalar() {
                    Tensor::filled(&shape, t.to_scalar().unwrap(), dtype)
                } else {
                    return Err(BackendError::ShapeMismatch {
                        name: base_name,
                        expected: shape,
                        got: t.shape().to_vec(),
                    });
                }
            }
        };

        let final_name = self.next_var_name(&base_name);
        let var = Variable::new(final_name.clone(), kind, buffer);
        let handle = VarHandle {
            name: final_name.clone(),
            kind,
            shape: var.shape().to_vec(),
            dtype: var.dtype(),
        };
        self.vars.insert(final_name, var);
        Ok(handle)
    }

    /// 读取变量当前缓冲值
    pub fn eval_var(&self, name: &str) -> Result<Tensor, BackendError> {
        Ok(self.var(name)?.value().clone())
    }

    /// 替换变量缓冲内容（run 喂入 placeholder 的通道）
    pub fn set_var_value(&mut self, name: &str, value: &Tensor) -> Result<(), BackendError> {
        self.vars
            .get_mut(name)
            .ok_or_else(|| BackendError::VariableNotFound(name.to_string()))?
            .set_value(value)
    }

    /// 广播协调专用：把变量缓冲整体重铸到新 dtype
    pub(in crate::graph) fn recast_var(
        &mut self,
        name: &str,
        dtype: DType,
    ) -> Result<(), BackendError> {
        self.vars
            .get_mut(name)
            .ok_or_else(|| BackendError::VariableNotFound(name.to_string()))?
            .recast(dtype);
        Ok(())
    }

    // ========== 操作节点 ==========

    /// 向图中注册一个操作节点（或按常量折叠直接产出值）。
    /// 操作数引用必须已存在于图中（不允许前向引用）；
    /// 任何一步失败都不会在图中留下节点或层。
    pub fn add_op(
        &mut self,
        key: &str,
        args: Vec<Operand>,
        kwargs: OpKwargs,
    ) -> Result<OpResult, BackendError> {
        self.check_mutable()?;

        // 操作数引用检查（无前向引用）
        for arg in &args {
            match arg {
                Operand::Var(name) if !self.vars.contains_key(name) => {
                    return Err(BackendError::VariableNotFound(name.clone()));
                }
                Operand::Op(name) if !self.ops.contains_key(name) => {
                    return Err(BackendError::OperationNotFound(name.clone()));
                }
                _ => {}
            }
        }

        let func = self.op_table.get(key)?;
        let pattern = OperandPattern::of(&args);

        // 构建时试算一次：既是元数回退链的判定，也是形状/dtype 缓存的来源
        let arg_values = self.eval_operands(&args)?;
        let (form, trial) = match func {
            OpFunction::Map(kernel) => apply_with_fallback(key, kernel, &arg_values)?,
            OpFunction::Assign(_) => {
                // 赋值类：目标必须是可变更的变量节点；试算不写回
                let trial = self.assign_trial(key, &args, &arg_values)?;
                (CallForm::Spread, trial)
            }
        };

        // 依赖登记：未被任何已注册层覆盖的依赖收进一个新层。
        // 这只保证这些依赖先于后续层求值，并不把新节点挂进该层；
        // 须在常量折叠之前登记，折叠提前返回不得丢弃依赖。
        let uncovered: Vec<String> = kwargs
            .dependencies
            .iter()
            .filter(|dep| !self.layers.iter().any(|l| l.contains(dep)))
            .cloned()
            .collect();
        if !uncovered.is_empty() {
            self.layers.push(uncovered);
        }

        // 常量折叠：没有任何图驻留操作数时立即求值。
        // 结果带形状则包成常量变量，裸标量则直接返回（不产生节点）。
        if pattern.is_constant() && matches!(func, OpFunction::Map(_)) {
            if trial.is_scalar() {
                return Ok(OpResult::Scalar(trial.to_scalar().unwrap()));
            }
            let const_name = match &kwargs.scope {
                Some(scope) => format!("{scope}/{key}_evaluated"),
                None => format!("{key}_evaluated"),
            };
            let handle = self.add_var(
                VarKind::Constant,
                VarSpec::new(&const_name).with_value(trial),
            )?;
            return Ok(OpResult::Var(handle));
        }

        let final_name = self.next_op_name(key);
        let operation = Operation::new(
            final_name.clone(),
            key.to_string(),
            args,
            form,
            trial.shape().to_vec(),
            trial.dtype(),
        );
        let handle = OpHandle {
            name: final_name.clone(),
            key: key.to_string(),
            shape: operation.shape().to_vec(),
            dtype: operation.dtype(),
        };
        self.ops.insert(final_name.clone(), operation);

        // assign_to_var：结果绑定到新建状态变量，返回写入该变量的赋值操作
        if kwargs.assign_to_var {
            let var_handle = self.add_var(
                VarKind::State,
                VarSpec::new(&format!("{final_name}_tmp"))
                    .with_value(Tensor::zeros(&handle.shape, handle.dtype)),
            )?;
            return self.add_op(
                "=",
                vec![Operand::Var(var_handle.name), Operand::Op(final_name)],
                OpKwargs::default(),
            );
        }

        Ok(OpResult::Op(handle))
    }

    /// 赋值类算子的试算：校验目标可写、右值形状可落，返回落点后的值
    fn assign_trial(
        &self,
        key: &str,
        args: &[Operand],
        arg_values: &[ArgValue],
    ) -> Result<Tensor, BackendError> {
        if args.len() != 2 {
            return Err(BackendError::InvalidOperatorArguments {
                op: key.to_string(),
            });
        }
        let target = match &args[0] {
            Operand::Var(name) => self.var(name)?,
            _ => {
                return Err(BackendError::InvalidOperatorArguments {
                    op: key.to_string(),
                });
            }
        };
        if target.kind() == VarKind::Constant {
            return Err(BackendError::InvalidOperation(format!(
                "常量{}不可作为{key}的赋值目标",
                target.name()
            )));
        }
        let rhs = match &arg_values[1] {
            ArgValue::Tensor(t) => t,
            _ => {
                return Err(BackendError::InvalidOperatorArguments {
                    op: key.to_string(),
                });
            }
        };
        if !rhs.is_scalar() && rhs.shape() != target.shape() {
            return Err(BackendError::ShapeIncompatible {
                op: key.to_string(),
                shape1: target.shape().to_vec(),
                shape2: rhs.shape().to_vec(),
            });
        }
        // 落点后的值与目标同形状同 dtype
        Ok(Tensor::zeros(target.shape(), target.dtype()))
    }

    // ========== 层调度 ==========

    /// 注册一个层：一组应在后续层之前全部完成求值的操作
    pub fn add_layer(&mut self, op_names: Vec<String>) -> Result<(), BackendError> {
        self.check_mutable()?;
        for name in &op_names {
            if !self.ops.contains_key(name) {
                return Err(BackendError::OperationNotFound(name.clone()));
            }
        }
        self.layers.push(op_names);
        Ok(())
    }

    /// 去重并冻结执行顺序：与更早的层逐元素相等的层被丢弃，
    /// 保留首次出现的顺序。可重复调用（每次 run 调一次也不会翻倍）。
    pub fn compile(&mut self) {
        let mut compiled: Vec<Vec<String>> = Vec::new();
        for layer in self.layers.drain(..) {
            if !compiled.iter().any(|existing| *existing == layer) {
                compiled.push(layer);
            }
        }
        self.layers = compiled;
        self.frozen = true;
    }

    /// 清空全部节点、层与计数器，图回到初始空状态
    pub fn clear(&mut self) {
        self.vars.clear();
        self.ops.clear();
        self.layers.clear();
        self.var_counter.clear();
        self.op_counter.clear();
        self.frozen = false;
    }

    // ========== 求值 ==========

    /// 求值单个操作节点：按当前操作数值重放构建时选中的调用形式。
    /// 赋值类算子在此写回目标变量。
    pub fn eval_op(&mut self, name: &str) -> Result<Tensor, BackendError> {
        let operation = self
            .ops
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::OperationNotFound(name.to_string()))?;
        let func = self.op_table.get(operation.key())?;
        let arg_values = self.eval_operands(operation.operands())?;

        match func {
            OpFunction::Map(kernel) => {
                match kernel(&Invocation::new(operation.call_form(), &arg_values)) {
                    Ok(result) => Ok(result),
                    Err(KernelError::Arity) => Err(BackendError::InvalidOperatorArguments {
                        op: operation.key().to_string(),
                    }),
                    Err(KernelError::Backend(e)) => Err(e),
                }
            }
            OpFunction::Assign(kind) => {
                let target_name = match &operation.operands()[0] {
                    Operand::Var(n) => n.clone(),
                    _ => {
                        return Err(BackendError::InvalidOperatorArguments {
                            op: operation.key().to_string(),
                        });
                    }
                };
                let rhs = match &arg_values[1] {
                    ArgValue::Tensor(t) => t.clone(),
                    _ => {
                        return Err(BackendError::InvalidOperatorArguments {
                            op: operation.key().to_string(),
                        });
                    }
                };
                let var = self
                    .vars
                    .get_mut(&target_name)
                    .ok_or_else(|| BackendError::VariableNotFound(target_name.clone()))?;
                match kind {
                    AssignKind::Replace => var.set_value(&rhs)?,
                    AssignKind::Add => {
                        let rhs = if rhs.is_scalar() && !var.value().is_scalar() {
                            Tensor::filled(var.shape(), rhs.to_scalar().unwrap(), var.dtype())
                        } else {
                            rhs
                        };
                        var.add_assign_value(&rhs)?;
                    }
                }
                Ok(var.value().clone())
            }
        }
    }

    /// 求值一组操作（采样步用）
    pub fn eval_ops(&mut self, names: &[String]) -> Result<(), BackendError> {
        for name in names {
            self.eval_op(name)?;
        }
        Ok(())
    }

    /// 按下标求值一个已编译层。层内操作之间没有顺序承诺
    /// （前端须自行保证层内互不依赖），此处按声明顺序执行。
    pub fn eval_layer(&mut self, idx: usize) -> Result<(), BackendError> {
        let layer = self
            .layers
            .get(idx)
            .cloned()
            .ok_or_else(|| BackendError::Computation(format!("层下标{idx}越界")))?;
        for op_name in &layer {
            self.eval_op(op_name)?;
        }
        Ok(())
    }

    /// 求值操作数列表（嵌套的操作引用会被递归重新求值）
    pub(in crate::graph) fn eval_operands(
        &mut self,
        operands: &[Operand],
    ) -> Result<Vec<ArgValue>, BackendError> {
        operands
            .iter()
            .map(|operand| self.eval_operand(operand))
            .collect()
    }

    fn eval_operand(&mut self, operand: &Operand) -> Result<ArgValue, BackendError> {
        match operand {
            Operand::Var(name) => Ok(ArgValue::Tensor(self.eval_var(name)?)),
            Operand::Op(name) => Ok(ArgValue::Tensor(self.eval_op(name)?)),
            Operand::Literal(Literal::Num(x)) => Ok(ArgValue::Tensor(Tensor::scalar(*x))),
            Operand::Literal(Literal::Array(t)) => Ok(ArgValue::Tensor(t.clone())),
            Operand::Literal(Literal::Shape(s)) => Ok(ArgValue::Shape(s.clone())),
            Operand::Literal(Literal::DType(d)) => Ok(ArgValue::DType(*d)),
        }
    }

    // ========== 句柄 ==========

    pub fn var_handle(&self, name: &str) -> Result<VarHandle, BackendError> {
        let var = self.var(name)?;
        Ok(VarHandle {
            name: var.name().to_string(),
            kind: var.kind(),
            shape: var.shape().to_vec(),
            dtype: var.dtype(),
        })
    }

    pub fn op_handle(&self, name: &str) -> Result<OpHandle, BackendError> {
        let operation = self.op(name)?;
        Ok(OpHandle {
            name: operation.name().to_string(),
            key: operation.key().to_string(),
            shape: operation.shape().to_vec(),
            dtype: operation.dtype(),
        })
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
