//! End-to-end compilation through the public API.

use nnc_aot::aot::{CompileOptions, InputSpec, OutputSpec};
use nnc_aot::backend::KernelCompiler;
use nnc_aot::codegen::RustKernelCompiler;
use nnc_aot::error::BackendError;
use nnc_aot::ir::{
    evaluate, static_dims, BinaryKind, DType, Dim, Graph, HostTensor, Op, RuntimeValue, UnaryKind, ValueId,
    ValueType,
};
use nnc_aot::{aot_compile, specialize, AotCompiler, CompileError, RawGraph};

/// `aot_compile` output for `affine_relu()` at `[1, 10]`, checked in so the
/// generated code is built and called like any other module.
#[path = "generated/affine_relu.rs"]
mod generated_affine_relu;

fn dims(spec: &[&str]) -> ValueType {
    let dims = spec
        .iter()
        .map(|d| match d.parse() {
            Ok(n) => Dim::Static(n),
            Err(_) => Dim::Symbolic(d.to_string()),
        })
        .collect();
    ValueType::tensor(DType::F32, dims)
}

fn unknown() -> ValueType {
    ValueType::unranked(DType::F32)
}

fn binary(graph: &mut Graph, kind: BinaryKind, lhs: ValueId, rhs: ValueId) -> ValueId {
    graph.push_op(unknown(), |output| Op::Binary {
        kind,
        lhs,
        rhs,
        output,
    })
}

fn constant(graph: &mut Graph, value: HostTensor) -> ValueId {
    let ty = ValueType::tensor(DType::F32, static_dims(value.shape()));
    graph.push_op(ty, |output| Op::Constant { value, output })
}

/// y = relu(w * x + b), x: f32[batch, 10]
fn affine_relu() -> (RawGraph, Vec<f32>, Vec<f32>) {
    let w: Vec<f32> = (0..10).map(|i| i as f32 * 0.25 - 1.0).collect();
    let b: Vec<f32> = (0..10).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();

    let mut graph = Graph::new();
    let x = graph.add_input("x", dims(&["batch", "10"]));
    let wv = constant(&mut graph, HostTensor::from_slice(&[10], &w).unwrap());
    let bv = constant(&mut graph, HostTensor::from_slice(&[10], &b).unwrap());
    let wx = binary(&mut graph, BinaryKind::Mul, wv, x);
    let z = binary(&mut graph, BinaryKind::Add, wx, bv);
    let y = graph.push_op(unknown(), |output| Op::Unary {
        kind: UnaryKind::Relu,
        input: z,
        output,
    });
    graph.outputs.push(y);
    (RawGraph::new(graph).unwrap(), w, b)
}

/// A method with a bound `self`, in-place updates and a reduction:
///
/// h = x @ w; h += bias; relu_(h); return (h, sum(h))
fn mlp_with_mutation() -> RawGraph {
    let mut graph = Graph::new();
    graph.add_input(
        "self",
        ValueType::Module {
            class: "Mlp".into(),
        },
    );
    let x = graph.add_input("x", dims(&["batch", "4"]));
    let w = constant(
        &mut graph,
        HostTensor::new(vec![4, 3], (0..12).map(|i| (i as f32 - 6.0) / 4.0).collect()).unwrap(),
    );
    let h = graph.push_op(dims(&["batch", "3"]), |output| Op::MatMul {
        lhs: x,
        rhs: w,
        output,
    });
    let bias = graph.push_op(dims(&["3"]), |output| Op::Full {
        shape: vec![3],
        value: 0.1,
        output,
    });
    let h1 = graph.push_op(dims(&["batch", "3"]), |output| Op::BinaryInplace {
        kind: BinaryKind::Add,
        target: h,
        other: bias,
        output,
    });
    graph.push_op(dims(&["batch", "3"]), |output| Op::UnaryInplace {
        kind: UnaryKind::Relu,
        target: h1,
        output,
    });
    let s = graph.push_op(unknown(), |output| Op::Sum { input: h, output });
    graph.outputs.extend([h, s]);
    RawGraph::new(graph).unwrap()
}

fn assert_close(want: &RuntimeValue, got: &RuntimeValue) {
    match (want, got) {
        (RuntimeValue::Tensor(a), RuntimeValue::Tensor(b)) => {
            assert_eq!(a.shape(), b.shape());
            for (x, y) in a.data().iter().zip(b.data()) {
                assert!((x - y).abs() <= 1e-5, "want {a:?}, got {b:?}");
            }
        }
        (RuntimeValue::Scalar(a), RuntimeValue::Scalar(b)) => assert!((a - b).abs() <= 1e-5),
        _ => panic!("want {want:?}, got {got:?}"),
    }
}

#[test]
fn forward_affine_relu() {
    let (raw, w, b) = affine_relu();
    let mut code = String::new();
    let function = aot_compile("forward", &raw, &[1, 10], &mut code).unwrap();

    assert_eq!(function.name, "forward");
    assert_eq!(
        function.input_specs,
        vec![InputSpec {
            shape: vec![1, 10],
            dtype: DType::F32
        }]
    );
    assert_eq!(
        function.output_specs,
        vec![OutputSpec {
            shape: vec![1, 10],
            dtype: DType::F32
        }]
    );
    assert_eq!(function.parameters.len(), 2);
    assert_eq!(function.parameters[0].data(), &w[..]);
    assert_eq!(function.parameters[1].data(), &b[..]);
    assert!(function.memory_plan.is_empty());

    assert!(!code.is_empty());
    assert_eq!(code, function.code);
    syn::parse_file(&code).unwrap();
}

fn normalized(code: &str) -> String {
    prettyplease::unparse(&syn::parse_file(code).unwrap())
}

#[test]
fn checked_in_kernel_matches_current_output() {
    let (raw, _, _) = affine_relu();
    let mut code = String::new();
    aot_compile("forward", &raw, &[1, 10], &mut code).unwrap();

    let checked_in = include_str!("generated/affine_relu.rs");
    assert_eq!(
        normalized(checked_in),
        normalized(&code),
        "generated code changed; regenerate tests/generated/affine_relu.rs"
    );
}

#[test]
fn generated_kernel_matches_reference_evaluator() {
    let (raw, _, _) = affine_relu();
    let mut code = String::new();
    let function = aot_compile("forward", &raw, &[1, 10], &mut code).unwrap();
    assert_eq!(function.parameters.len(), generated_affine_relu::NUM_PARAMS);

    let x = HostTensor::new(vec![1, 10], (0..10).map(|i| (i as f32 * 0.7).cos() * 3.0).collect())
        .unwrap();
    let params: Vec<&[f32]> = function.parameters.iter().map(HostTensor::data).collect();
    let mut out = vec![0.0f32; 10];
    generated_affine_relu::nnc_kernel(x.data(), &mut out, &params);

    let want = evaluate(raw.graph(), &[RuntimeValue::Tensor(x)]).unwrap();
    let got = RuntimeValue::Tensor(HostTensor::new(vec![1, 10], out).unwrap());
    assert_eq!(want.len(), 1);
    assert_close(&want[0], &got);
    // relu zeroes some lanes and passes others through
    let RuntimeValue::Tensor(y) = &got else { unreachable!() };
    assert!(y.data().iter().any(|&v| v == 0.0));
    assert!(y.data().iter().any(|&v| v > 0.0));
}

#[test]
fn executed_plan_matches_reference_evaluator() {
    let raw = mlp_with_mutation();
    let shape = vec![5, 4];
    let function = AotCompiler::new(RustKernelCompiler::new())
        .compile("forward", &raw, &shape)
        .unwrap();
    assert_eq!(function.input_specs.len(), 1);
    assert_eq!(function.output_specs[0].shape, vec![5, 3]);
    assert_eq!(function.output_specs[1].shape, Vec::<usize>::new());

    let specialized = specialize(&raw, &[shape.clone()], &CompileOptions::default()).unwrap();
    let kernel = RustKernelCompiler::new().compile(&specialized).unwrap();

    let x = HostTensor::new(shape, (0..20).map(|i| (i as f32).sin()).collect()).unwrap();
    let want = evaluate(
        raw.graph(),
        &[RuntimeValue::Module, RuntimeValue::Tensor(x.clone())],
    )
    .unwrap();
    let got = kernel.plan().execute(&[x], &function.parameters).unwrap();

    assert_eq!(want.len(), got.len());
    for (w, g) in want.iter().zip(&got) {
        assert_close(w, g);
    }
}

#[test]
fn spec_counts_survive_folding() {
    // out0 = eye(3) * 2 depends on constants only; out1 = x + full(1)
    let mut graph = Graph::new();
    let x = graph.add_input("x", dims(&["n", "n"]));
    let eye = graph.push_op(dims(&["3", "3"]), |output| Op::Eye { n: 3, output });
    let two = graph.push_op(ValueType::Scalar { dtype: DType::F32 }, |output| {
        Op::ScalarConstant { value: 2.0, output }
    });
    let scaled = binary(&mut graph, BinaryKind::Mul, eye, two);
    let ones = graph.push_op(dims(&["3", "3"]), |output| Op::Full {
        shape: vec![3, 3],
        value: 1.0,
        output,
    });
    let shifted = binary(&mut graph, BinaryKind::Add, x, ones);
    graph.outputs.extend([scaled, shifted]);
    let raw = RawGraph::new(graph).unwrap();

    let function = AotCompiler::new(RustKernelCompiler::new())
        .compile("forward", &raw, &[3, 3])
        .unwrap();

    assert_eq!(function.input_specs.len(), raw.declared_inputs());
    assert_eq!(function.output_specs.len(), raw.declared_outputs());

    let scaled_eye = [2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0];
    assert!(
        function.parameters.iter().any(|p| p.data() == scaled_eye),
        "parameters: {:?}",
        function.parameters
    );
    assert!(function.parameters.iter().any(|p| p.data() == [1.0; 9]));
    // the generated code reads both from `params` instead of rebuilding them
    assert!(!function.code.contains("eye"), "got:\n{}", function.code);
}

#[test]
fn compilation_is_deterministic() {
    let raw = mlp_with_mutation();
    let compiler = AotCompiler::new(RustKernelCompiler::new())
        .with_options(CompileOptions::default().with_seed(7));

    let a = compiler.compile("forward", &raw, &[2, 4]).unwrap();
    let b = compiler.compile("forward", &raw, &[2, 4]).unwrap();
    assert_eq!(a.input_specs, b.input_specs);
    assert_eq!(a.output_specs, b.output_specs);
    assert_eq!(a.parameters, b.parameters);
    assert_eq!(a.code, b.code);
}

#[test]
fn size_vector_must_match_declared_rank() {
    let (raw, _, _) = affine_relu();
    let compiler = AotCompiler::new(RustKernelCompiler::new());

    for sizes in [&[10][..], &[1, 10, 1][..]] {
        let err = compiler.compile("forward", &raw, sizes).unwrap_err();
        assert!(matches!(err.error, CompileError::InputRank { .. }), "got: {err}");
        assert!(err.to_string().contains("`forward`"), "got: {err}");
    }

    let err = compiler
        .compile_with_shapes("forward", &raw, &[vec![1, 10], vec![1, 10]])
        .unwrap_err();
    assert!(matches!(err.error, CompileError::InputArity { .. }), "got: {err}");
}

#[test]
fn static_dims_must_agree() {
    let (raw, _, _) = affine_relu();
    let err = AotCompiler::new(RustKernelCompiler::new())
        .compile("forward", &raw, &[1, 9])
        .unwrap_err();
    assert!(matches!(err.error, CompileError::ShapeMismatch { .. }), "got: {err}");
}

#[test]
fn scalar_outputs_are_rejected() {
    let mut graph = Graph::new();
    let x = graph.add_input("x", dims(&["n"]));
    let s = graph.push_op(unknown(), |output| Op::Sum { input: x, output });
    let v = graph.push_op(unknown(), |output| Op::Item { input: s, output });
    graph.outputs.push(v);
    let raw = RawGraph::new(graph).unwrap();

    let err = aot_compile("total", &raw, &[4], &mut String::new()).unwrap_err();
    assert_eq!(err.method, "total");
    assert_eq!(
        err.error,
        CompileError::UnsupportedOutputKind {
            index: 0,
            kind: "scalar".into()
        }
    );
}

#[test]
fn unresolved_shapes_are_reported() {
    let mut graph = Graph::new();
    let x = graph.add_input("x", dims(&["n"]));
    let y = graph.push_op(unknown(), |output| Op::Custom {
        name: "mystery".into(),
        inputs: vec![x],
        output_shape: None,
        output,
    });
    graph.outputs.push(y);
    let raw = RawGraph::new(graph).unwrap();

    let err = aot_compile("forward", &raw, &[3], &mut String::new()).unwrap_err();
    let CompileError::ShapeResolution { node, .. } = &err.error else {
        panic!("got: {err}");
    };
    assert!(node.contains("custom::mystery"), "got: {err}");
}

#[test]
fn backend_rejections_propagate() {
    // a custom op with a known shape gets past specialization
    let mut graph = Graph::new();
    let x = graph.add_input("x", dims(&["n"]));
    let y = graph.push_op(unknown(), |output| Op::Custom {
        name: "mystery".into(),
        inputs: vec![x],
        output_shape: Some(vec![3]),
        output,
    });
    graph.outputs.push(y);
    let raw = RawGraph::new(graph).unwrap();

    let err = aot_compile("forward", &raw, &[3], &mut String::new()).unwrap_err();
    assert!(
        matches!(
            &err.error,
            CompileError::Backend(BackendError::UnsupportedOperator { op, .. }) if op == "custom::mystery"
        ),
        "got: {err}"
    );

    // mutating an input is observable, so it is never rewritten
    let mut graph = Graph::new();
    let x = graph.add_input("x", dims(&["n"]));
    let y = graph.push_op(dims(&["n"]), |output| Op::UnaryInplace {
        kind: UnaryKind::Relu,
        target: x,
        output,
    });
    graph.outputs.push(y);
    let raw = RawGraph::new(graph).unwrap();

    let err = aot_compile("forward", &raw, &[3], &mut String::new()).unwrap_err();
    assert!(err.to_string().contains("relu_"), "got: {err}");
}

#[test]
fn demo_graph_compiles() {
    let raw = nnc_aot::parse::parse_graph(include_str!("../demos/affine_relu.json").as_bytes())
        .unwrap();
    assert_eq!(raw.declared_inputs(), 1);

    let function = aot_compile("forward", &raw, &[2, 10], &mut String::new()).unwrap();
    assert_eq!(function.input_specs[0].shape, vec![2, 10]);
    assert_eq!(function.output_specs[0].shape, vec![2, 10]);
    // w as written, b materialized from its fill
    assert_eq!(function.parameters.len(), 2);
    assert_eq!(function.parameters[1].data(), [0.1; 10]);
}
