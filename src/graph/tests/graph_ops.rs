use crate::assert_err;
use crate::errors::BackendError;
use crate::graph::{CallForm, Graph, OpKwargs, OpResult, Operand, VarKind, VarSpec};
use crate::tensor::Tensor;

fn state(graph: &mut Graph, name: &str, value: Tensor) -> String {
    graph
        .add_var(VarKind::State, VarSpec::new(name).with_value(value))
        .unwrap()
        .name
}

#[test]
fn test_constant_folding_to_scalar() {
    let mut graph = Graph::new();

    // 全字面量操作数：立即求值，返回裸标量，不产生任何节点
    let result = graph
        .add_op(
            "+",
            vec![Operand::num(2.0), Operand::num(3.0)],
            OpKwargs::default(),
        )
        .unwrap();
    assert_eq!(result, OpResult::Scalar(5.0));
    assert_eq!(graph.ops_count(), 0);
    assert_eq!(graph.vars_count(), 0);
}

#[test]
fn test_constant_folding_to_constant_var() {
    let mut graph = Graph::new();

    // 字面量运算产出带形状的结果：包成常量变量
    let result = graph
        .add_op(
            "+",
            vec![
                Operand::num(2.0),
                Operand::array(Tensor::new(&[1.0, 2.0], &[2])),
            ],
            OpKwargs::default(),
        )
        .unwrap();
    let handle = result.unwrap_var();
    assert_eq!(handle.name, "+_evaluated");
    assert_eq!(handle.kind, VarKind::Constant);
    assert_eq!(graph.eval_var("+_evaluated").unwrap().flat(), vec![3.0, 4.0]);
    assert_eq!(graph.ops_count(), 0);
    assert_eq!(graph.vars_count(), 1);
}

#[test]
fn test_constant_folding_respects_scope() {
    let mut graph = Graph::new();
    let result = graph
        .add_op(
            "ones",
            vec![Operand::shape(&[2])],
            OpKwargs {
                scope: Some("n0".to_string()),
                ..OpKwargs::default()
            },
        )
        .unwrap();
    assert_eq!(result.unwrap_var().name, "n0/ones_evaluated");
}

#[test]
fn test_op_with_node_operand_stays_deferred() {
    let mut graph = Graph::new();
    let v = state(&mut graph, "v", Tensor::scalar(1.0));

    let result = graph
        .add_op(
            "+",
            vec![Operand::Var(v), Operand::num(2.0)],
            OpKwargs::default(),
        )
        .unwrap();
    let handle = result.unwrap_op();
    assert_eq!(handle.name, "+");
    assert_eq!(handle.key, "+");
    assert_eq!(graph.ops_count(), 1);
    // 形状/dtype 在构建时已缓存到操作节点
    assert!(handle.shape.is_empty());
}

#[test]
fn test_arity_fallback_is_cached() {
    let mut graph = Graph::new();
    let m = state(&mut graph, "m", Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]));

    // sum 带轴：回退链应选中打包形式并缓存在节点上
    let result = graph
        .add_op(
            "sum",
            vec![Operand::Var(m), Operand::num(0.0)],
            OpKwargs::default(),
        )
        .unwrap();
    let handle = result.unwrap_op();
    assert_eq!(graph.op(&handle.name).unwrap().call_form(), CallForm::Packed);
    assert_eq!(handle.shape, vec![2]);
}

#[test]
fn test_unknown_operator() {
    let mut graph = Graph::new();
    let result = graph.add_op("bogus", vec![Operand::num(1.0)], OpKwargs::default());
    assert_err!(result, BackendError::UnknownOperator("bogus"));
}

#[test]
fn test_invalid_arguments_leave_graph_untouched() {
    let mut graph = Graph::new();
    let v = state(&mut graph, "v", Tensor::scalar(1.0));

    // sin 是一元算子，两个操作数在三种调用形式下都失败
    let result = graph.add_op(
        "sin",
        vec![Operand::Var(v.clone()), Operand::Var(v)],
        OpKwargs::default(),
    );
    assert_err!(result, BackendError::InvalidOperatorArguments("sin"));
    assert_eq!(graph.ops_count(), 0);
    assert!(graph.layers().is_empty());
}

#[test]
fn test_operands_must_exist() {
    let mut graph = Graph::new();
    assert_err!(
        graph.add_op("neg", vec![Operand::Var("ghost".to_string())], OpKwargs::default()),
        BackendError::VariableNotFound("ghost")
    );
    assert_err!(
        graph.add_op("neg", vec![Operand::Op("ghost".to_string())], OpKwargs::default()),
        BackendError::OperationNotFound("ghost")
    );
}

#[test]
fn test_assign_requires_mutable_var_target() {
    let mut graph = Graph::new();
    graph
        .add_var(VarKind::Constant, VarSpec::new("c").with_value(Tensor::scalar(1.0)))
        .unwrap();

    let result = graph.add_op(
        "=",
        vec![Operand::Var("c".to_string()), Operand::num(2.0)],
        OpKwargs::default(),
    );
    assert_err!(result, BackendError::InvalidOperation { .. });

    // 赋值目标必须是变量节点
    let result = graph.add_op(
        "=",
        vec![Operand::num(1.0), Operand::num(2.0)],
        OpKwargs::default(),
    );
    assert_err!(result, BackendError::InvalidOperatorArguments("="));
}

#[test]
fn test_assign_rejects_incompatible_shapes() {
    let mut graph = Graph::new();
    let v = state(&mut graph, "v", Tensor::new(&[0.0, 0.0], &[2]));

    let result = graph.add_op(
        "=",
        vec![
            Operand::Var(v),
            Operand::array(Tensor::new(&[1.0, 2.0, 3.0], &[3])),
        ],
        OpKwargs::default(),
    );
    assert_err!(result, BackendError::ShapeIncompatible { .. });
    assert_eq!(graph.ops_count(), 0);
}

#[test]
fn test_assign_to_var_binds_result() {
    let mut graph = Graph::new();
    let v = state(&mut graph, "v", Tensor::scalar(3.0));

    let result = graph
        .add_op(
            "sq",
            vec![Operand::Var(v)],
            OpKwargs {
                assign_to_var: true,
                ..OpKwargs::default()
            },
        )
        .unwrap();
    let handle = result.unwrap_op();

    // 返回的是写入新建状态变量的赋值操作
    assert_eq!(handle.key, "=");
    assert!(graph.has_var("sq_tmp"));
    assert!(graph.has_op("sq"));

    // 求值赋值操作后，绑定变量持有平方结果
    graph.eval_op(&handle.name).unwrap();
    assert_eq!(graph.eval_var("sq_tmp").unwrap().to_scalar(), Some(9.0));
}

#[test]
fn test_add_op_rejected_after_compile() {
    let mut graph = Graph::new();
    let v = state(&mut graph, "v", Tensor::scalar(1.0));
    graph.compile();

    assert_err!(
        graph.add_op("neg", vec![Operand::Var(v)], OpKwargs::default()),
        BackendError::InvalidOperation { .. }
    );
    assert_err!(
        graph.add_var(VarKind::State, VarSpec::new("w").with_value(Tensor::scalar(0.0))),
        BackendError::InvalidOperation { .. }
    );

    // clear 解除冻结
    graph.clear();
    assert!(!graph.is_frozen());
    graph
        .add_var(VarKind::State, VarSpec::new("w").with_value(Tensor::scalar(0.0)))
        .unwrap();
}
