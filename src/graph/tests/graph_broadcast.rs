use crate::graph::{Graph, OpKwargs, Operand, VarKind, VarSpec};
use crate::tensor::{DType, Tensor};

fn var(graph: &mut Graph, name: &str, value: Tensor) -> Operand {
    let h = graph
        .add_var(VarKind::State, VarSpec::new(name).with_value(value))
        .unwrap();
    Operand::Var(h.name)
}

#[test]
fn test_equal_shapes_pass_through() {
    let mut graph = Graph::new();
    let a = var(&mut graph, "a", Tensor::new(&[1.0, 2.0], &[2]));
    let b = var(&mut graph, "b", Tensor::new(&[3.0, 4.0], &[2]));

    let (out1, out2) = graph
        .broadcast(a.clone(), b.clone(), false, &OpKwargs::default())
        .unwrap();
    assert_eq!(out1, a);
    assert_eq!(out2, b);
    assert_eq!(graph.ops_count(), 0);
}

#[test]
fn test_scalar_operand_passes_through() {
    // 0 阶操作数按兼容判定直接放行（非赋值场景）
    let mut graph = Graph::new();
    let a = var(&mut graph, "a", Tensor::new(&[1.0, 2.0, 3.0], &[3]));

    let (out1, out2) = graph
        .broadcast(a.clone(), Operand::num(2.0), false, &OpKwargs::default())
        .unwrap();
    assert_eq!(out1, a);
    assert_eq!(out2, Operand::num(2.0));
    assert_eq!(graph.ops_count(), 0);
}

#[test]
fn test_squeeze_adjusts_second_operand() {
    let mut graph = Graph::new();
    let a = var(&mut graph, "a", Tensor::new(&[1.0, 2.0, 3.0], &[3]));
    let b = var(&mut graph, "b", Tensor::new(&[4.0, 5.0, 6.0], &[3, 1]));

    // (3,) 对 (3,1)：第二个操作数被裁掉单例维
    let (out1, out2) = graph
        .broadcast(a.clone(), b, false, &OpKwargs::default())
        .unwrap();
    assert_eq!(out1, a);
    let Operand::Op(name) = out2 else {
        panic!("预期改写为 squeeze 操作，实际得到 {out2:?}");
    };
    let op = graph.op(&name).unwrap();
    assert_eq!(op.key(), "squeeze");
    assert_eq!(op.shape(), &[3]);
}

#[test]
fn test_reshape_adjusts_lower_rank_operand() {
    let mut graph = Graph::new();
    let a = var(&mut graph, "a", Tensor::new(&[1.0, 2.0, 3.0], &[3, 1]));
    let b = var(&mut graph, "b", Tensor::new(&[4.0, 5.0, 6.0], &[3]));

    // 目标 (3,1) 秩更高且含单例维：第二个操作数插入列向单例维
    let (_, out2) = graph
        .broadcast(a, b, false, &OpKwargs::default())
        .unwrap();
    let Operand::Op(name) = out2 else {
        panic!("预期改写为 reshape 操作，实际得到 {out2:?}");
    };
    let op = graph.op(&name).unwrap();
    assert_eq!(op.key(), "reshape");
    assert_eq!(op.shape(), &[3, 1]);
}

#[test]
fn test_assign_expands_scalar() {
    let mut graph = Graph::new();
    let target = var(&mut graph, "s", Tensor::zeros(&[4], DType::Float64));

    // 赋值场景：标量右值展开为目标形状的满数组
    let (_, out2) = graph
        .broadcast(target, Operand::num(2.0), true, &OpKwargs::default())
        .unwrap();
    let Operand::Op(name) = out2 else {
        panic!("预期改写为展开操作，实际得到 {out2:?}");
    };
    let expanded = graph.eval_op(&name).unwrap();
    assert_eq!(expanded.shape(), &[4]);
    assert_eq!(expanded.flat(), vec![2.0; 4]);
}

#[test]
fn test_dtype_recast_of_second_operand() {
    let mut graph = Graph::new();
    let a = var(&mut graph, "a", Tensor::new(&[1.0, 2.0], &[2]).cast(DType::Int32));
    let b = var(&mut graph, "b", Tensor::new(&[1.5, 2.5], &[2]));

    // dtype 不一致：第二个操作数的缓冲被原地重铸为第一个的 dtype
    let (_, out2) = graph
        .broadcast(a, b.clone(), false, &OpKwargs::default())
        .unwrap();
    assert_eq!(out2, b);
    let recast = graph.var("b").unwrap();
    assert_eq!(recast.dtype(), DType::Int32);
    assert_eq!(recast.value().flat(), vec![1.0, 2.0]);
}

#[test]
fn test_unresolvable_shapes_left_unchanged() {
    let mut graph = Graph::new();
    let a = var(&mut graph, "a", Tensor::new(&[1.0, 2.0], &[2]));
    let b = var(&mut graph, "b", Tensor::new(&[1.0, 2.0, 3.0], &[3]));

    // 启发式处理不了的组合原样放行（由下游数值调用报错）
    let (out1, out2) = graph
        .broadcast(a.clone(), b.clone(), false, &OpKwargs::default())
        .unwrap();
    assert_eq!(out1, a);
    assert_eq!(out2, b);
}
