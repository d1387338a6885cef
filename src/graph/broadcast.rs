/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 广播协调器：二元算子分发前对齐两个操作数的形状与 dtype。
 *                 这是一套刻意受限的启发式，只处理单例维插删与标量展开，
 *                 处理不了的组合原样放行、留给下游数值调用报错。
 */

use super::core::Graph;
use super::types::{Literal, OpKwargs, Operand};
use crate::errors::BackendError;
use crate::tensor::{DType, Tensor};

/// 改写用的 kwargs：只继承命名空间，不继承依赖与 assign_to_var
fn rewrite_kwargs(kwargs: &OpKwargs) -> OpKwargs {
    OpKwargs {
        scope: kwargs.scope.clone(),
        ..OpKwargs::default()
    }
}

impl Graph {
    /// 协调两个操作数的形状与 dtype。
    /// `assign` 为 true 时允许把标量展开成目标形状的满数组（赋值场景）。
    /// 先调整第二个操作数，仍不兼容再调整第一个；两轮后仍不兼容则回退原样。
    /// dtype 不一致时无条件把第二个操作数重铸为第一个的 dtype。
    pub fn broadcast(
        &mut self,
        op1: Operand,
        op2: Operand,
        assign: bool,
        kwargs: &OpKwargs,
    ) -> Result<(Operand, Operand), BackendError> {
        let (mut out1, mut out2) = (op1.clone(), op2.clone());

        // 赋值场景先行处理标量右值：兼容判定对 0 阶一律放行，
        // 但赋值落点要求满形状，须在判定前展开
        if assign {
            if let (Some(s1), Some(s2)) = (self.shape_of(&out1)?, self.shape_of(&out2)?) {
                if s2.is_empty() && !s1.is_empty() {
                    out2 = self.match_shapes(&out1, &out2, true, true, kwargs)?;
                }
            }
        }

        if !self.shapes_compatible(&out1, &out2)? {
            let adjusted2 = self.match_shapes(&out1, &out2, true, assign, kwargs)?;
            if self.shapes_compatible(&out1, &adjusted2)? {
                out2 = adjusted2;
            } else {
                let adjusted1 = self.match_shapes(&out1, &adjusted2, false, assign, kwargs)?;
                if self.shapes_compatible(&adjusted1, &adjusted2)? {
                    out1 = adjusted1;
                    out2 = adjusted2;
                } else {
                    // 启发式用尽，放行原始操作数
                    out1 = op1;
                    out2 = op2;
                }
            }
        }

        // dtype 协调：以第一个操作数为准重铸第二个
        if let (Some(d1), Some(d2)) = (self.dtype_of(&out1)?, self.dtype_of(&out2)?) {
            if d1 != d2 {
                out2 = self.recast_operand(out2, d1, kwargs)?;
            }
        }

        Ok((out1, out2))
    }

    /// 形状兼容判定：完全相等、双方秩都大于 1、或任一方是 0 阶标量。
    /// 拿不到形状的操作数（Shape/DType 字面量）视作兼容。
    fn shapes_compatible(&self, op1: &Operand, op2: &Operand) -> Result<bool, BackendError> {
        let (s1, s2) = (self.shape_of(op1)?, self.shape_of(op2)?);
        match (s1, s2) {
            (Some(s1), Some(s2)) => {
                Ok(s1 == s2 || (s1.len() > 1 && s2.len() > 1) || s1.is_empty() || s2.is_empty())
            }
            _ => Ok(true),
        }
    }

    /// 按启发式调整一侧操作数，返回（可能被改写的）该侧操作数。
    /// `adjust_second` 决定哪侧是被调整方、哪侧是目标方。
    fn match_shapes(
        &mut self,
        op1: &Operand,
        op2: &Operand,
        adjust_second: bool,
        assign: bool,
        kwargs: &OpKwargs,
    ) -> Result<Operand, BackendError> {
        let (target, adjust) = if adjust_second {
            (op1, op2)
        } else {
            (op2, op1)
        };
        let (Some(target_shape), Some(adjust_shape)) =
            (self.shape_of(target)?, self.shape_of(adjust)?)
        else {
            return Ok(adjust.clone());
        };
        let target_dtype = self.dtype_of(target)?.unwrap_or(DType::Float64);

        if adjust_shape.is_empty() && !target_shape.is_empty() && assign {
            // 标量展开：零数组 + 标量（广播加法铺满目标形状）
            let zeros = self
                .add_op(
                    "zeros",
                    vec![Operand::shape(&target_shape), Operand::dtype(target_dtype)],
                    rewrite_kwargs(kwargs),
                )?
                .as_operand();
            let expanded = self.add_op(
                "+",
                vec![zeros, adjust.clone()],
                rewrite_kwargs(kwargs),
            )?;
            return Ok(expanded.as_operand());
        }

        if target_shape.len() > adjust_shape.len()
            && target_shape.contains(&1)
            && !adjust_shape.is_empty()
        {
            // 被调整方插入单例维，行/列取向跟随目标方单例维的位置
            let n = adjust_shape[0];
            let new_shape = if target_shape.iter().position(|&d| d == 1) == Some(0) {
                vec![1, n]
            } else {
                vec![n, 1]
            };
            let reshaped = self.add_op(
                "reshape",
                vec![adjust.clone(), Operand::shape(&new_shape)],
                rewrite_kwargs(kwargs),
            )?;
            return Ok(reshaped.as_operand());
        }

        let mismatched_rank2 = target_shape.len() == 2
            && adjust_shape.len() == 2
            && target_shape[1] != adjust_shape[0];
        if (adjust_shape.len() > target_shape.len() || mismatched_rank2)
            && adjust_shape.contains(&1)
        {
            // 被调整方裁掉首个单例维
            let idx = adjust_shape
                .iter()
                .position(|&d| d == 1)
                .unwrap_or_default();
            let squeezed = self.add_op(
                "squeeze",
                vec![adjust.clone(), Operand::num(idx as f64)],
                rewrite_kwargs(kwargs),
            )?;
            return Ok(squeezed.as_operand());
        }

        Ok(adjust.clone())
    }

    /// 操作数的形状：图驻留节点查其缓存，数组字面量取自身，
    /// 裸数值视作 0 阶；Shape/DType 字面量没有形状概念。
    fn shape_of(&self, operand: &Operand) -> Result<Option<Vec<usize>>, BackendError> {
        match operand {
            Operand::Var(name) => Ok(Some(self.var(name)?.shape().to_vec())),
            Operand::Op(name) => Ok(Some(self.op(name)?.shape().to_vec())),
            Operand::Literal(Literal::Num(_)) => Ok(Some(vec![])),
            Operand::Literal(Literal::Array(t)) => Ok(Some(t.shape().to_vec())),
            Operand::Literal(_) => Ok(None),
        }
    }

    fn dtype_of(&self, operand: &Operand) -> Result<Option<DType>, BackendError> {
        match operand {
            Operand::Var(name) => Ok(Some(self.var(name)?.dtype())),
            Operand::Op(name) => Ok(Some(self.op(name)?.dtype())),
            Operand::Literal(Literal::Num(_)) => Ok(Some(DType::Float64)),
            Operand::Literal(Literal::Array(t)) => Ok(Some(t.dtype())),
            Operand::Literal(_) => Ok(None),
        }
    }

    /// 把第二个操作数重铸为给定 dtype：
    /// 变量原地重铸缓冲，字面量直接转换，操作节点则包一层 cast 操作。
    fn recast_operand(
        &mut self,
        operand: Operand,
        dtype: DType,
        kwargs: &OpKwargs,
    ) -> Result<Operand, BackendError> {
        match operand {
            Operand::Var(name) => {
                self.recast_var(&name, dtype)?;
                Ok(Operand::Var(name))
            }
            Operand::Op(name) => {
                let cast = self.add_op(
                    "cast",
                    vec![Operand::Op(name), Operand::dtype(dtype)],
                    rewrite_kwargs(kwargs),
                )?;
                Ok(cast.as_operand())
            }
            Operand::Literal(Literal::Num(x)) => {
                Ok(Operand::array(Tensor::scalar(x).cast(dtype)))
            }
            Operand::Literal(Literal::Array(t)) => Ok(Operand::array(t.cast(dtype))),
            other => Ok(other),
        }
    }
}
