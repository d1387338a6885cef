/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 算子表与分发骨架。
 *
 * 原则：一个算子键对应**一个**核函数；操作数是图驻留节点还是裸常量，
 * 由 `OperandPattern` 在 add_op 时一次性判定（决定是否常量折叠），
 * 核函数本身只面对已求值的参数，不再按操作数来源分裂成多套表。
 */

use std::collections::HashMap;

use crate::errors::BackendError;
use crate::graph::CallForm;
use crate::tensor::{DType, Tensor};

mod kernels;


/// 已求值的调用参数
#[derive(Debug, Clone)]
pub enum ArgValue {
    Tensor(Tensor),
    Shape(Vec<usize>),
    DType(DType),
}

/// 核函数收到的一次调用：回退链选中的调用形式 + 扁平参数表。
/// - `Spread`: 参数按位置一一对应
/// - `Packed`: 整个参数表视作单个列表参数
/// - `PackedTail`: 末位参数是尾参，其余视作列表
#[derive(Debug)]
pub struct Invocation<'a> {
    pub form: CallForm,
    pub args: &'a [ArgValue],
}

impl<'a> Invocation<'a> {
    pub fn new(form: CallForm, args: &'a [ArgValue]) -> Self {
        Self { form, args }
    }

    /// 参数个数不符/类型不符均视作元数不匹配，驱动回退链重试
    pub fn tensor(&self, idx: usize) -> Result<&Tensor, KernelError> {
        match self.args.get(idx) {
            Some(ArgValue::Tensor(t)) => Ok(t),
            _ => Err(KernelError::Arity),
        }
    }

    pub fn shape_arg(&self, idx: usize) -> Result<&[usize], KernelError> {
        match self.args.get(idx) {
            Some(ArgValue::Shape(s)) => Ok(s),
            _ => Err(KernelError::Arity),
        }
    }

    pub fn dtype_arg(&self, idx: usize) -> Result<DType, KernelError> {
        match self.args.get(idx) {
            Some(ArgValue::DType(d)) => Ok(*d),
            _ => Err(KernelError::Arity),
        }
    }

    /// 读取一个数值参数（0 阶张量）
    pub fn num(&self, idx: usize) -> Result<f64, KernelError> {
        match self.args.get(idx) {
            Some(ArgValue::Tensor(t)) if t.is_scalar() => Ok(t.to_scalar().unwrap()),
            _ => Err(KernelError::Arity),
        }
    }

    pub fn arity(&self, n: usize) -> Result<(), KernelError> {
        if self.args.len() == n {
            Ok(())
        } else {
            Err(KernelError::Arity)
        }
    }
}

/// 核函数错误：`Arity`触发下一种调用形式的重试，其余直接上抛
#[derive(Debug)]
pub enum KernelError {
    Arity,
    Backend(BackendError),
}

impl From<BackendError> for KernelError {
    fn from(e: BackendError) -> Self {
        Self::Backend(e)
    }
}

/// 核函数签名（内置与用户扩展算子共用）
pub type Kernel = fn(&Invocation<'_>) -> Result<Tensor, KernelError>;

/// 赋值类算子的落点：求值时写回第一个操作数（变量节点）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignKind {
    /// `=`：整体替换缓冲内容
    Replace,
    /// `+=`：缓冲累加
    Add,
}

/// 算子表中的一个条目
#[derive(Debug, Clone, Copy)]
pub enum OpFunction {
    /// 纯函数核：读操作数、产出新张量
    Map(Kernel),
    /// 赋值核：写回第一个操作数
    Assign(AssignKind),
}

/// 算子键 -> 核函数的表。内置表在下，用户扩展在上合并。
pub struct OperatorTable {
    map: HashMap<String, OpFunction>,
}

impl OperatorTable {
    /// 内置算子表（基础数学运算，取自原始 numpy 后端的算子集）
    pub fn builtin() -> Self {
        let mut map: HashMap<String, OpFunction> = HashMap::new();
        let entries: &[(&str, OpFunction)] = &[
            // ========== 二元算术 ==========
            ("+", OpFunction::Map(kernels::add)),
            ("-", OpFunction::Map(kernels::subtract)),
            ("*", OpFunction::Map(kernels::multiply)),
            ("/", OpFunction::Map(kernels::divide)),
            ("%", OpFunction::Map(kernels::modulo)),
            ("^", OpFunction::Map(kernels::power)),
            ("**", OpFunction::Map(kernels::power)),
            ("@", OpFunction::Map(kernels::matmul)),
            (".T", OpFunction::Map(kernels::transpose)),
            // ========== 比较 ==========
            (">", OpFunction::Map(kernels::greater)),
            ("<", OpFunction::Map(kernels::less)),
            ("==", OpFunction::Map(kernels::equal)),
            ("!=", OpFunction::Map(kernels::not_equal)),
            (">=", OpFunction::Map(kernels::greater_equal)),
            ("<=", OpFunction::Map(kernels::less_equal)),
            // ========== 赋值 ==========
            ("=", OpFunction::Assign(AssignKind::Replace)),
            ("+=", OpFunction::Assign(AssignKind::Add)),
            // ========== 一元 ==========
            ("neg", OpFunction::Map(kernels::neg)),
            ("sin", OpFunction::Map(kernels::sin)),
            ("cos", OpFunction::Map(kernels::cos)),
            ("tan", OpFunction::Map(kernels::tan)),
            ("atan", OpFunction::Map(kernels::atan)),
            ("abs", OpFunction::Map(kernels::abs)),
            ("sqrt", OpFunction::Map(kernels::sqrt)),
            ("sq", OpFunction::Map(kernels::square)),
            ("exp", OpFunction::Map(kernels::exp)),
            ("round", OpFunction::Map(kernels::round)),
            ("roundto", OpFunction::Map(kernels::roundto)),
            ("sigmoid", OpFunction::Map(kernels::sigmoid)),
            ("tanh", OpFunction::Map(kernels::tanh)),
            ("softmax", OpFunction::Map(kernels::softmax)),
            // ========== 归约 ==========
            ("max", OpFunction::Map(kernels::max)),
            ("min", OpFunction::Map(kernels::min)),
            ("argmax", OpFunction::Map(kernels::argmax)),
            ("argmin", OpFunction::Map(kernels::argmin)),
            ("sum", OpFunction::Map(kernels::sum)),
            ("mean", OpFunction::Map(kernels::mean)),
            // ========== 形状 ==========
            ("concat", OpFunction::Map(kernels::concat)),
            ("reshape", OpFunction::Map(kernels::reshape)),
            ("squeeze", OpFunction::Map(kernels::squeeze)),
            ("roll", OpFunction::Map(kernels::roll)),
            ("cast", OpFunction::Map(kernels::cast)),
            // ========== 构造 ==========
            ("randn", OpFunction::Map(kernels::randn)),
            ("ones", OpFunction::Map(kernels::ones)),
            ("zeros", OpFunction::Map(kernels::zeros)),
            ("range", OpFunction::Map(kernels::range)),
            // ========== 其它 ==========
            ("mask", OpFunction::Map(kernels::mask)),
            ("no_op", OpFunction::Map(kernels::no_op)),
        ];
        for (key, f) in entries {
            map.insert((*key).to_string(), *f);
        }
        Self { map }
    }

    /// 在内置表之上合并用户扩展算子（同名覆盖内置）
    pub fn with_extras(extras: HashMap<String, Kernel>) -> Self {
        let mut table = Self::builtin();
        for (key, kernel) in extras {
            table.map.insert(key, OpFunction::Map(kernel));
        }
        table
    }

    pub fn get(&self, key: &str) -> Result<OpFunction, BackendError> {
        self.map
            .get(key)
            .copied()
            .ok_or_else(|| BackendError::UnknownOperator(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// 按回退链依次尝试三种调用形式，返回成功的形式与结果；
/// 全部元数失败时以 `InvalidOperatorArguments` 报出算子键。
pub fn apply_with_fallback(
    key: &str,
    kernel: Kernel,
    args: &[ArgValue],
) -> Result<(CallForm, Tensor), BackendError> {
    for form in [CallForm::Spread, CallForm::Packed, CallForm::PackedTail] {
        match kernel(&Invocation::new(form, args)) {
            Ok(result) => return Ok((form, result)),
            Err(KernelError::Arity) => continue,
            Err(KernelError::Backend(e)) => return Err(e),
        }
    }
    Err(BackendError::InvalidOperatorArguments {
        op: key.to_string(),
    })
}
