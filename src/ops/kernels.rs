/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 内置算子的核函数。每个核自行声明接受哪几种调用形式，
 *                 不接受的形式一律返回 Arity，由回退链转入下一形式。
 */

use ndarray::{Array, IxDyn};

use self::normal::standard_normal;

use super::{ArgValue, Invocation, KernelError};
use crate::graph::CallForm;
use crate::tensor::{DType, Tensor};

// ========== 二元逐元素 ==========

macro_rules! binary_kernel {
    ($name:ident, $key:literal, $f:expr) => {
        pub fn $name(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
            if inv.form != CallForm::Spread {
                return Err(KernelError::Arity);
            }
            inv.arity(2)?;
            let a = inv.tensor(0)?;
            let b = inv.tensor(1)?;
            Ok(a.binary_with(b, $key, $f)?)
        }
    };
}

macro_rules! compare_kernel {
    ($name:ident, $key:literal, $f:expr) => {
        pub fn $name(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
            if inv.form != CallForm::Spread {
                return Err(KernelError::Arity);
            }
            inv.arity(2)?;
            let a = inv.tensor(0)?;
            let b = inv.tensor(1)?;
            Ok(a.compare_with(b, $key, $f)?)
        }
    };
}

binary_kernel!(add, "+", |x, y| x + y);
binary_kernel!(subtract, "-", |x, y| x - y);
binary_kernel!(multiply, "*", |x, y| x * y);
binary_kernel!(divide, "/", |x, y| x / y);
binary_kernel!(modulo, "%", |x, y| x.rem_euclid(y));
binary_kernel!(power, "^", f64::powf);

compare_kernel!(greater, ">", |x, y| x > y);
compare_kernel!(less, "<", |x, y| x < y);
compare_kernel!(equal, "==", |x, y| x == y);
compare_kernel!(not_equal, "!=", |x, y| x != y);
compare_kernel!(greater_equal, ">=", |x, y| x >= y);
compare_kernel!(less_equal, "<=", |x, y| x <= y);

pub fn matmul(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(2)?;
    Ok(inv.tensor(0)?.dot(inv.tensor(1)?)?)
}

// ========== 一元 ==========

macro_rules! unary_kernel {
    ($name:ident, $f:expr) => {
        pub fn $name(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
            if inv.form != CallForm::Spread {
                return Err(KernelError::Arity);
            }
            inv.arity(1)?;
            Ok(inv.tensor(0)?.map($f))
        }
    };
}

unary_kernel!(neg, |x| -x);
unary_kernel!(sin, f64::sin);
unary_kernel!(cos, f64::cos);
unary_kernel!(tan, f64::tan);
unary_kernel!(atan, f64::atan);
unary_kernel!(abs, f64::abs);
unary_kernel!(sqrt, f64::sqrt);
unary_kernel!(square, |x| x * x);
unary_kernel!(exp, f64::exp);
unary_kernel!(round, f64::round);
unary_kernel!(sigmoid, |x| 1.0 / (1.0 + (-x).exp()));
unary_kernel!(tanh, f64::tanh);

pub fn transpose(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(1)?;
    Ok(inv.tensor(0)?.transpose())
}

pub fn softmax(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(1)?;
    Ok(inv.tensor(0)?.softmax())
}

/// 四舍五入到指定小数位：单参退化为整数舍入
pub fn roundto(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    match inv.args.len() {
        1 => Ok(inv.tensor(0)?.map(f64::round)),
        2 => {
            let decimals = inv.num(1)?;
            let factor = 10f64.powf(decimals);
            Ok(inv.tensor(0)?.map(|x| (x * factor).round() / factor))
        }
        _ => Err(KernelError::Arity),
    }
}

// ========== 归约 ==========

pub fn max(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(1)?;
    Ok(inv.tensor(0)?.max()?)
}

pub fn min(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(1)?;
    Ok(inv.tensor(0)?.min()?)
}

pub fn argmax(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(1)?;
    Ok(inv.tensor(0)?.argmax()?)
}

pub fn argmin(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(1)?;
    Ok(inv.tensor(0)?.argmin()?)
}

/// 求和：展开单参求全和；打包形式 `[x, axis]` 沿轴求和
pub fn sum(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    reduce(inv, Tensor::sum)
}

/// 均值：同 `sum` 的调用形式
pub fn mean(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    reduce(inv, Tensor::mean)
}

fn reduce(
    inv: &Invocation<'_>,
    f: impl Fn(&Tensor, Option<usize>) -> Result<Tensor, crate::errors::BackendError>,
) -> Result<Tensor, KernelError> {
    match inv.form {
        CallForm::Spread => {
            inv.arity(1)?;
            Ok(f(inv.tensor(0)?, None)?)
        }
        CallForm::Packed | CallForm::PackedTail => {
            inv.arity(2)?;
            let axis = inv.num(1)? as usize;
            Ok(f(inv.tensor(0)?, Some(axis))?)
        }
    }
}

// ========== 形状 ==========

/// 拼接：仅接受打包+尾参形式（列表为待拼接张量，尾参为轴）
pub fn concat(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::PackedTail || inv.args.len() < 2 {
        return Err(KernelError::Arity);
    }
    let axis = inv.num(inv.args.len() - 1)? as usize;
    let parts: Vec<Tensor> = inv.args[..inv.args.len() - 1]
        .iter()
        .map(|a| match a {
            ArgValue::Tensor(t) => Ok(t.clone()),
            _ => Err(KernelError::Arity),
        })
        .collect::<Result<_, _>>()?;
    Ok(Tensor::concat(&parts, axis)?)
}

pub fn reshape(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(2)?;
    let t = inv.tensor(0)?;
    let shape = inv.shape_arg(1)?;
    Ok(t.reshape(shape)?)
}

pub fn squeeze(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(2)?;
    let t = inv.tensor(0)?;
    let axis = inv.num(1)? as usize;
    Ok(t.squeeze(axis)?)
}

pub fn roll(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(2)?;
    let t = inv.tensor(0)?;
    let shift = inv.num(1)? as i64;
    Ok(t.roll(shift))
}

pub fn cast(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(2)?;
    let t = inv.tensor(0)?;
    let dtype = inv.dtype_arg(1)?;
    Ok(t.cast(dtype))
}

// ========== 构造 ==========

pub fn zeros(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    filled_ctor(inv, 0.0)
}

pub fn ones(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    filled_ctor(inv, 1.0)
}

fn filled_ctor(inv: &Invocation<'_>, value: f64) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    match inv.args.len() {
        1 => Ok(Tensor::filled(inv.shape_arg(0)?, value, DType::Float64)),
        2 => Ok(Tensor::filled(
            inv.shape_arg(0)?,
            value,
            inv.dtype_arg(1)?,
        )),
        _ => Err(KernelError::Arity),
    }
}

/// 标准正态随机张量（非确定性；确定性仿真请勿在图中使用）
pub fn randn(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(1)?;
    let shape = inv.shape_arg(0)?;
    let mut rng = rand::thread_rng();
    let data: Vec<f64> = (0..shape.iter().product::<usize>())
        .map(|_| standard_normal(&mut rng))
        .collect();
    let array = Array::from_shape_vec(IxDyn(shape), data)
        .map_err(|e| crate::errors::BackendError::Computation(e.to_string()))?;
    Ok(Tensor::from_array(array, DType::Float64))
}

/// 等差序列：`range(stop)` 或 `range(start, stop, step)`
pub fn range(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    let (start, stop, step) = match inv.args.len() {
        1 => (0.0, inv.num(0)?, 1.0),
        3 => (inv.num(0)?, inv.num(1)?, inv.num(2)?),
        _ => return Err(KernelError::Arity),
    };
    if step == 0.0 {
        return Err(KernelError::Backend(crate::errors::BackendError::Computation(
            "range 的步长不能为 0".to_string(),
        )));
    }
    let mut data = Vec::new();
    let mut x = start;
    while (step > 0.0 && x < stop) || (step < 0.0 && x > stop) {
        data.push(x);
        x += step;
    }
    let n = data.len();
    let array = Array::from_shape_vec(IxDyn(&[n]), data).unwrap();
    Ok(Tensor::from_array(array, DType::Float64))
}

// ========== 其它 ==========

/// 掩码：`x * (y > 0)`
pub fn mask(inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    if inv.form != CallForm::Spread {
        return Err(KernelError::Arity);
    }
    inv.arity(2)?;
    let x = inv.tensor(0)?;
    let y = inv.tensor(1)?;
    Ok(x.binary_with(y, "mask", |a, b| if b > 0.0 { a } else { 0.0 })?)
}

/// 空操作（可用作采样步的占位算子）
pub fn no_op(_inv: &Invocation<'_>) -> Result<Tensor, KernelError> {
    Ok(Tensor::scalar(0.0))
}

// ========== 随机数辅助 ==========

/// Box-Muller 标准正态采样
mod normal {
    use rand::Rng;

    pub fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
        let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}
