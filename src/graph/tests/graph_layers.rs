use crate::assert_err;
use crate::errors::BackendError;
use crate::graph::{Graph, OpKwargs, Operand, VarKind, VarSpec};
use crate::tensor::Tensor;

fn graph_with_ops(names: &[&str]) -> (Graph, Vec<String>) {
    let mut graph = Graph::new();
    let v = graph
        .add_var(VarKind::State, VarSpec::new("v").with_value(Tensor::scalar(1.0)))
        .unwrap();
    let ops = names
        .iter()
        .map(|key| {
            graph
                .add_op(*key, vec![Operand::Var(v.name.clone())], OpKwargs::default())
                .unwrap()
                .unwrap_op()
                .name
        })
        .collect();
    (graph, ops)
}

#[test]
fn test_add_layer_checks_ops() {
    let (mut graph, ops) = graph_with_ops(&["sin", "cos"]);

    graph.add_layer(ops.clone()).unwrap();
    assert_eq!(graph.layers().len(), 1);

    assert_err!(
        graph.add_layer(vec!["ghost".to_string()]),
        BackendError::OperationNotFound("ghost")
    );
    // 失败的 add_layer 不追加任何层
    assert_eq!(graph.layers().len(), 1);
}

#[test]
fn test_compile_dedupes_identical_layers() {
    let (mut graph, ops) = graph_with_ops(&["sin", "cos"]);

    // 两次注册逐元素相等的层，compile 后只剩一层
    graph.add_layer(ops.clone()).unwrap();
    graph.add_layer(ops.clone()).unwrap();
    graph.compile();

    assert_eq!(graph.layers().len(), 1);
    assert_eq!(graph.layers()[0], ops);
    assert!(graph.is_frozen());
}

#[test]
fn test_compile_preserves_declared_order() {
    let (mut graph, ops) = graph_with_ops(&["sin", "cos", "neg"]);

    // 元素相同但顺序不同的层不算重复
    graph.add_layer(vec![ops[0].clone(), ops[1].clone()]).unwrap();
    graph.add_layer(vec![ops[1].clone(), ops[0].clone()]).unwrap();
    graph.add_layer(vec![ops[2].clone()]).unwrap();
    graph.add_layer(vec![ops[0].clone(), ops[1].clone()]).unwrap();
    graph.compile();

    assert_eq!(graph.layers().len(), 3);
    assert_eq!(graph.layers()[0], vec![ops[0].clone(), ops[1].clone()]);
    assert_eq!(graph.layers()[1], vec![ops[1].clone(), ops[0].clone()]);
    assert_eq!(graph.layers()[2], vec![ops[2].clone()]);
}

#[test]
fn test_compile_is_idempotent() {
    let (mut graph, ops) = graph_with_ops(&["sin"]);
    graph.add_layer(ops.clone()).unwrap();

    // 每次 run 都可能调一次 compile，层数不得翻倍
    graph.compile();
    graph.compile();
    graph.compile();
    assert_eq!(graph.layers().len(), 1);
}

#[test]
fn test_dependencies_spawn_layer() {
    let mut graph = Graph::new();
    let v = graph
        .add_var(VarKind::State, VarSpec::new("v").with_value(Tensor::scalar(1.0)))
        .unwrap();
    let dep = graph
        .add_op("sin", vec![Operand::Var(v.name.clone())], OpKwargs::default())
        .unwrap()
        .unwrap_op();

    // 未被任何层覆盖的依赖在 add_op 时收进新层
    graph
        .add_op(
            "neg",
            vec![Operand::Var(v.name.clone())],
            OpKwargs::with_dependencies(&[&dep.name]),
        )
        .unwrap();
    assert_eq!(graph.layers().len(), 1);
    assert_eq!(graph.layers()[0], vec![dep.name.clone()]);

    // 已覆盖的依赖不再重复成层
    graph
        .add_op(
            "cos",
            vec![Operand::Var(v.name)],
            OpKwargs::with_dependencies(&[&dep.name]),
        )
        .unwrap();
    assert_eq!(graph.layers().len(), 1);
}

#[test]
fn test_dependencies_survive_constant_folding() {
    let mut graph = Graph::new();
    let v = graph
        .add_var(VarKind::State, VarSpec::new("v").with_value(Tensor::scalar(1.0)))
        .unwrap();
    let dep = graph
        .add_op("sin", vec![Operand::Var(v.name)], OpKwargs::default())
        .unwrap()
        .unwrap_op();

    // 全字面量操作数触发常量折叠，但依赖层必须照常登记
    let result = graph
        .add_op(
            "+",
            vec![Operand::num(2.0), Operand::num(3.0)],
            OpKwargs::with_dependencies(&[&dep.name]),
        )
        .unwrap();
    assert_eq!(result, crate::graph::OpResult::Scalar(5.0));
    assert_eq!(graph.layers().len(), 1);
    assert_eq!(graph.layers()[0], vec![dep.name]);
}

#[test]
fn test_clear_discards_layers() {
    let (mut graph, ops) = graph_with_ops(&["sin"]);
    graph.add_layer(ops).unwrap();
    graph.compile();

    graph.clear();
    assert!(graph.layers().is_empty());
    assert_eq!(graph.vars_count(), 0);
    assert_eq!(graph.ops_count(), 0);
}
