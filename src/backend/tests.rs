use std::collections::HashMap;

use crate::assert_err;
use crate::backend::{Backend, Device, EagerBackend, Profile, RunRequest, SessionBackend};
use crate::errors::BackendError;
use crate::graph::{OpKwargs, Operand, VarSpec};
use crate::tensor::Tensor;

#[test]
fn test_profile_parse() {
    assert_eq!(Profile::parse(""), Profile { time: false, memory: false });
    assert_eq!(Profile::parse("t"), Profile { time: true, memory: false });
    assert_eq!(Profile::parse("m"), Profile { time: false, memory: true });
    assert_eq!(Profile::parse("tm"), Profile { time: true, memory: true });
    assert_eq!(Profile::parse("mt"), Profile { time: true, memory: true });
}

#[test]
fn test_device_parse() {
    assert_eq!(Device::parse("cpu"), Device::Cpu);
    assert_eq!(Device::parse("gpu"), Device::Gpu);
    assert_eq!(
        Device::parse("/device:XLA_CPU:0"),
        Device::Custom("/device:XLA_CPU:0".to_string())
    );
    assert_eq!(Device::parse("gpu").as_str(), "gpu");
}

#[test]
fn test_add_var_vtype_parsing() {
    let mut backend = EagerBackend::new();
    backend
        .add_var("state_var", VarSpec::new("s").with_value(Tensor::scalar(0.0)))
        .unwrap();
    backend
        .add_var("constant", VarSpec::new("c").with_value(Tensor::scalar(1.0)))
        .unwrap();
    backend
        .add_var(
            "placeholder",
            VarSpec::new("p").with_shape(&[2]).with_dtype("float64"),
        )
        .unwrap();

    assert_err!(
        backend.add_var("tensor", VarSpec::new("t").with_value(Tensor::scalar(0.0))),
        BackendError::InvalidVarKind("tensor")
    );
}

/// 构建一个最小的累加图：每步 s = s + 1
fn build_counter(backend: &mut impl Backend) -> String {
    let s = backend
        .add_var("state_var", VarSpec::new("s").with_value(Tensor::scalar(0.0)))
        .unwrap();
    let step = backend
        .add_op(
            "+=",
            vec![Operand::Var(s.name.clone()), Operand::num(1.0)],
            OpKwargs::default(),
        )
        .unwrap()
        .unwrap_op();
    backend.add_layer(vec![step.name]).unwrap();
    s.name
}

#[test]
fn test_eager_run_basic() {
    let mut backend = EagerBackend::new();
    let s = build_counter(&mut backend);

    let result = backend
        .run(RunRequest::new(5).with_output("s", &s))
        .unwrap();
    assert_eq!(result.outputs["s"].to_scalar(), Some(5.0));
    assert_eq!(result.sim_time, None);
    assert_eq!(result.peak_memory, None);
}

#[test]
fn test_session_run_basic() {
    let mut backend = SessionBackend::new("cpu");
    let s = build_counter(&mut backend);

    let result = backend
        .run(RunRequest::new(5).with_output("s", &s))
        .unwrap();
    assert_eq!(result.outputs["s"].to_scalar(), Some(5.0));

    // 会话式求值不触碰图内缓冲
    assert_eq!(backend.graph().eval_var(&s).unwrap().to_scalar(), Some(0.0));
}

#[test]
fn test_sampling_steps_skip_layers() {
    // 采样周期为 2：第 0/2 步只求值采样操作组，不推进状态
    let mut backend = EagerBackend::new();
    let s = build_counter(&mut backend);
    let probe = backend
        .add_op(
            "no_op",
            vec![Operand::Var(s.clone())],
            OpKwargs::default(),
        )
        .unwrap()
        .unwrap_op();

    let result = backend
        .run(
            RunRequest::new(4)
                .with_output("s", &s)
                .with_sampling(2, &[&probe.name]),
        )
        .unwrap();
    assert_eq!(result.outputs["s"].to_scalar(), Some(2.0));
}

#[test]
fn test_run_profile() {
    let mut backend = EagerBackend::new();
    let s = build_counter(&mut backend);

    let result = backend
        .run(RunRequest::new(2).with_output("s", &s).with_profile("tm"))
        .unwrap();
    assert!(result.sim_time.is_some());
    // 图中只有一个 0 阶状态变量
    assert_eq!(result.peak_memory, Some(8));
}

#[test]
fn test_run_unknown_output() {
    let mut backend = EagerBackend::new();
    build_counter(&mut backend);
    let result = backend.run(RunRequest::new(1).with_output("x", "ghost"));
    assert_err!(result, BackendError::VariableNotFound("ghost"));
}

#[test]
fn test_run_feeds_inputs() {
    let mut backend = EagerBackend::new();
    let s = backend
        .add_var("state_var", VarSpec::new("s").with_value(Tensor::scalar(0.0)))
        .unwrap();
    let p = backend
        .add_var("placeholder", VarSpec::new("p").with_value(Tensor::scalar(0.0)))
        .unwrap();
    let step = backend
        .add_op(
            "+=",
            vec![Operand::Var(s.name.clone()), Operand::Var(p.name.clone())],
            OpKwargs::default(),
        )
        .unwrap()
        .unwrap_op();
    backend.add_layer(vec![step.name]).unwrap();

    let inputs: Vec<HashMap<String, Tensor>> = (1..=3)
        .map(|i| {
            let mut feed = HashMap::new();
            feed.insert(p.name.clone(), Tensor::scalar(f64::from(i)));
            feed
        })
        .collect();

    let result = backend
        .run(RunRequest::new(3).with_inputs(inputs).with_output("s", &s.name))
        .unwrap();
    // 1 + 2 + 3
    assert_eq!(result.outputs["s"].to_scalar(), Some(6.0));
}

#[test]
fn test_clear_between_runs() {
    let mut backend = EagerBackend::new();
    let s = build_counter(&mut backend);
    backend.run(RunRequest::new(3).with_output("s", &s)).unwrap();

    backend.clear();
    assert_eq!(backend.graph().vars_count(), 0);

    // 重建后互不影响
    let s = build_counter(&mut backend);
    let result = backend.run(RunRequest::new(2).with_output("s", &s)).unwrap();
    assert_eq!(result.outputs["s"].to_scalar(), Some(2.0));
}

#[test]
fn test_describe_reports_device() {
    let backend = SessionBackend::new("gpu");
    assert_eq!(backend.describe()["device"], "gpu");

    let eager = EagerBackend::new();
    assert_eq!(eager.describe()["device"], serde_json::Value::Null);
}
