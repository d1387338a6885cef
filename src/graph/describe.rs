/*
 * @Author       : 老董
 * @Date         : 2026-08-21
 * @Description  : 图结构摘要：以 JSON 形式导出节点与层的静态信息（调试用）
 */

use serde_json::{json, Value};

use super::core::Graph;
use super::types::{Literal, Operand};

impl Graph {
    /// 导出图的静态结构摘要。只含元信息，不含缓冲数据。
    pub fn describe(&self) -> Value {
        let mut vars: Vec<Value> = self
            .var_iter()
            .map(|v| {
                json!({
                    "name": v.name(),
                    "kind": v.kind().as_str(),
                    "shape": v.shape(),
                    "dtype": v.dtype().name(),
                })
            })
            .collect();
        vars.sort_by_key(|v| v["name"].as_str().unwrap_or_default().to_string());

        let mut ops: Vec<Value> = self
            .op_iter()
            .map(|o| {
                let operands: Vec<Value> = o.operands().iter().map(describe_operand).collect();
                json!({
                    "name": o.name(),
                    "op": o.key(),
                    "operands": operands,
                    "shape": o.shape(),
                    "dtype": o.dtype().name(),
                })
            })
            .collect();
        ops.sort_by_key(|o| o["name"].as_str().unwrap_or_default().to_string());

        json!({
            "vars": vars,
            "ops": ops,
            "layers": self.layers(),
            "compiled": self.is_frozen(),
        })
    }
}

fn describe_operand(operand: &Operand) -> Value {
    match operand {
        Operand::Var(name) => json!({ "var": name }),
        Operand::Op(name) => json!({ "op": name }),
        Operand::Literal(Literal::Num(x)) => json!({ "num": x }),
        Operand::Literal(Literal::Shape(s)) => json!({ "shape": s }),
        Operand::Literal(Literal::DType(d)) => json!({ "dtype": d.name() }),
        Operand::Literal(Literal::Array(t)) => json!({ "array_shape": t.shape() }),
    }
}
