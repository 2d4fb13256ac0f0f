//! Cargo subcommand: `cargo nnc-aot`
//!
//! Usage:
//!   cargo nnc-aot compile graph.json --sizes 1,10 -o src/
//!   cargo nnc-aot check graph.json --shape 4,3 --shape 3,2

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use nnc_aot::aot::{extract_constants, CompileOptions, IntermediateBufferPlanner};
use nnc_aot::backend::KernelCompiler;
use nnc_aot::codegen::RustKernelCompiler;
use nnc_aot::ir::{evaluate, HostTensor, RuntimeValue, ValueType};
use nnc_aot::{specialize, AotCompiler, CompiledFunction, RawGraph};

fn main() {
    env_logger::init();

    // When invoked as `cargo nnc-aot`, cargo passes "nnc-aot" as argv[1]. Strip it.
    let args: Vec<String> = std::env::args().collect();
    let args = if args.get(1).map(|s| s.as_str()) == Some("nnc-aot") {
        &args[2..]
    } else {
        &args[1..]
    };

    match args.first().map(|s| s.as_str()) {
        Some("compile") => cmd_compile(&args[1..]),
        Some("check") => cmd_check(&args[1..]),
        Some("--help") | Some("-h") | None => print_usage(),
        Some(other) => {
            eprintln!("error: unknown subcommand '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("cargo nnc-aot: ahead-of-time tensor graph compiler");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cargo nnc-aot compile <graph.json> [--sizes <DIMS> | --shape <DIMS>...] [-o <dir>]");
    eprintln!("  cargo nnc-aot check <graph.json> [--sizes <DIMS> | --shape <DIMS>...]");
    eprintln!();
    eprintln!("Subcommands:");
    eprintln!("  compile   Specialize a graph and generate Rust code for it");
    eprintln!("  check     Run the compiled kernel on the host against the reference evaluator");
}

/// Flags shared by both subcommands.
struct Common {
    graph_path: String,
    method: String,
    sizes: Option<Vec<usize>>,
    shapes: Vec<Vec<usize>>,
    options: CompileOptions,
}

impl Common {
    fn load(&self) -> RawGraph {
        let data = fs::read(&self.graph_path).unwrap_or_else(|err| {
            eprintln!("error: failed to read {}: {err}", self.graph_path);
            process::exit(1);
        });
        nnc_aot::parse::parse_graph(&data).unwrap_or_else(|err| {
            eprintln!("error: {}: {err}", self.graph_path);
            process::exit(1);
        })
    }

    /// One shape per tensor input. `--sizes` is shared by every input.
    fn input_shapes(&self, raw: &RawGraph) -> Vec<Vec<usize>> {
        match &self.sizes {
            Some(sizes) => vec![sizes.clone(); raw.declared_inputs()],
            None => self.shapes.clone(),
        }
    }
}

fn parse_dims(flag: &str, value: Option<&String>) -> Vec<usize> {
    let value = value.unwrap_or_else(|| {
        eprintln!("{flag} requires a comma-separated list of sizes");
        process::exit(1);
    });
    if value.is_empty() {
        return Vec::new();
    }
    value
        .split(',')
        .map(|d| {
            d.trim().parse().unwrap_or_else(|_| {
                eprintln!("error: invalid size '{d}' in {flag} {value}");
                process::exit(1);
            })
        })
        .collect()
}

/// Parses the flags both subcommands accept. Anything else is handed to `extra`,
/// which returns false for arguments it does not know either.
fn parse_common(
    args: &[String],
    usage: &str,
    mut extra: impl FnMut(&str, &mut dyn FnMut() -> Option<String>) -> bool,
) -> Common {
    let mut graph_path: Option<String> = None;
    let mut method = String::from("forward");
    let mut sizes: Option<Vec<usize>> = None;
    let mut shapes = Vec::new();
    let mut options = CompileOptions::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--method" => {
                i += 1;
                method = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--method requires a name");
                    process::exit(1);
                });
            }
            "--sizes" => {
                i += 1;
                sizes = Some(parse_dims("--sizes", args.get(i)));
            }
            "--shape" => {
                i += 1;
                shapes.push(parse_dims("--shape", args.get(i)));
            }
            "--seed" => {
                i += 1;
                let seed = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--seed requires an integer");
                    process::exit(1);
                });
                options = options.with_seed(seed);
            }
            "--dump-graphs" => options = options.with_dump_graphs(true),
            "--help" | "-h" => {
                eprintln!("{usage}");
                process::exit(0);
            }
            other => {
                let mut next = || {
                    i += 1;
                    args.get(i).cloned()
                };
                if extra(other, &mut next) {
                    // handled
                } else if other.starts_with('-') || graph_path.is_some() {
                    eprintln!("unexpected argument: {other}");
                    eprintln!("{usage}");
                    process::exit(1);
                } else {
                    graph_path = Some(other.to_string());
                }
            }
        }
        i += 1;
    }

    if sizes.is_some() && !shapes.is_empty() {
        eprintln!("error: --sizes and --shape cannot be combined");
        process::exit(1);
    }
    let graph_path = graph_path.unwrap_or_else(|| {
        eprintln!("{usage}");
        process::exit(1);
    });

    Common {
        graph_path,
        method,
        sizes,
        shapes,
        options,
    }
}

// ---------------------------------------------------------------------------
// compile
// ---------------------------------------------------------------------------

const COMPILE_USAGE: &str = "\
Usage: cargo nnc-aot compile <graph.json> [OPTIONS]

Specialize a graph to concrete input sizes and generate Rust code for it.

Options:
  --method <NAME>     Name of the compiled function (default: forward)
  --sizes <DIMS>      Sizes shared by every tensor input, e.g. 1,10
  --shape <DIMS>      Sizes of the next tensor input (repeat once per input)
  -o, --out <DIR>     Output directory (default: current directory)
  --seed <N>          Seed for the example inputs (default: 0)
  --dump-graphs       Log the graph after each specialization step (RUST_LOG=debug)
  --plan-temps        Record one memory-plan slot per temporary buffer
  --descriptor        Also write <method>.json with the full descriptor";

fn cmd_compile(args: &[String]) {
    let mut out_dir = PathBuf::from(".");
    let mut plan_temps = false;
    let mut descriptor = false;

    let common = parse_common(args, COMPILE_USAGE, |arg, next| match arg {
        "-o" | "--out" => {
            out_dir = PathBuf::from(next().unwrap_or_else(|| {
                eprintln!("{COMPILE_USAGE}");
                process::exit(1);
            }));
            true
        }
        "--plan-temps" => {
            plan_temps = true;
            true
        }
        "--descriptor" => {
            descriptor = true;
            true
        }
        _ => false,
    });

    let raw = common.load();
    let shapes = common.input_shapes(&raw);

    let mut compiler =
        AotCompiler::new(RustKernelCompiler::new()).with_options(common.options.clone());
    if plan_temps {
        compiler = compiler.with_memory_planner(IntermediateBufferPlanner);
    }
    let function = compiler
        .compile_with_shapes(&common.method, &raw, &shapes)
        .unwrap_or_else(|err| {
            eprintln!("error: {err}");
            process::exit(1);
        });

    let code_path = out_dir.join(format!("{}.rs", function.name));
    write_file(&code_path, &function.code);

    if descriptor {
        let json = serde_json::to_string_pretty(&function).unwrap_or_else(|err| {
            eprintln!("error: failed to serialize descriptor: {err}");
            process::exit(1);
        });
        write_file(&out_dir.join(format!("{}.json", function.name)), &json);
    }

    print_summary(&function);
    eprintln!("Generated {}", code_path.display());
}

fn write_file(path: &Path, contents: &str) {
    if let Err(err) = fs::write(path, contents) {
        eprintln!("Error writing {}: {err}", path.display());
        process::exit(1);
    }
}

fn print_summary(function: &CompiledFunction) {
    println!("function `{}`", function.name);
    for (i, spec) in function.input_specs.iter().enumerate() {
        println!("  input  {i}: {}{:?}", spec.dtype, spec.shape);
    }
    for (i, spec) in function.output_specs.iter().enumerate() {
        println!("  output {i}: {}{:?}", spec.dtype, spec.shape);
    }
    let param_elems: usize = function.parameters.iter().map(HostTensor::numel).sum();
    println!(
        "  {} parameters ({} elements)",
        function.parameters.len(),
        param_elems
    );
    if !function.memory_plan.is_empty() {
        println!(
            "  {} scratch buffers ({} bytes)",
            function.memory_plan.buffer_sizes.len(),
            function.memory_plan.total_bytes()
        );
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

const CHECK_USAGE: &str = "\
Usage: cargo nnc-aot check <graph.json> [OPTIONS]

Compile a graph, run the kernel plan on random inputs and compare every
output with the reference evaluator on the original graph.

Options:
  --sizes <DIMS>      Sizes shared by every tensor input, e.g. 1,10
  --shape <DIMS>      Sizes of the next tensor input (repeat once per input)
  --seed <N>          Seed for the example and test inputs (default: 0)
  --tolerance <EPS>   Maximum absolute difference (default: 1e-5)
  --dump-graphs       Log the graph after each specialization step (RUST_LOG=debug)";

fn cmd_check(args: &[String]) {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let mut tolerance = 1e-5f32;
    let common = parse_common(args, CHECK_USAGE, |arg, next| match arg {
        "--tolerance" => {
            tolerance = next().and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                eprintln!("--tolerance requires a number");
                process::exit(1);
            });
            true
        }
        _ => false,
    });

    let raw = common.load();
    let shapes = common.input_shapes(&raw);

    let specialized = specialize(&raw, &shapes, &common.options).unwrap_or_else(|err| {
        eprintln!("error: {err}");
        process::exit(1);
    });
    let kernel = RustKernelCompiler::new()
        .compile(&specialized)
        .unwrap_or_else(|err| {
            eprintln!("error: {err}");
            process::exit(1);
        });
    let params = extract_constants(&kernel).unwrap_or_else(|err| {
        eprintln!("error: {err}");
        process::exit(1);
    });

    // Fresh inputs, so the check does not just replay the specialization examples.
    let mut rng = StdRng::seed_from_u64(common.options.example_seed.wrapping_add(1));
    let inputs: Vec<HostTensor> = shapes.iter().map(|s| HostTensor::rand(s, &mut rng)).collect();
    let mut tensors = inputs.iter();
    let raw_inputs: Vec<RuntimeValue> = raw
        .graph()
        .inputs
        .iter()
        .map(|&id| match &raw.graph().value(id).ty {
            ValueType::Tensor { .. } => tensors
                .next()
                .cloned()
                .map(RuntimeValue::Tensor)
                .unwrap_or(RuntimeValue::Module),
            _ => RuntimeValue::Module,
        })
        .collect();

    let expected = evaluate(raw.graph(), &raw_inputs).unwrap_or_else(|err| {
        eprintln!("error: reference evaluation failed: {err}");
        process::exit(1);
    });
    let actual = kernel.plan().execute(&inputs, &params).unwrap_or_else(|err| {
        eprintln!("error: kernel execution failed: {err}");
        process::exit(1);
    });

    let mut failed = false;
    for (i, (want, got)) in expected.iter().zip(&actual).enumerate() {
        match max_abs_diff(want, got) {
            Some(diff) if diff <= tolerance => println!("  output {i}: ok (max diff {diff:e})"),
            Some(diff) => {
                println!("  output {i}: MISMATCH (max diff {diff:e})");
                failed = true;
            }
            None => {
                println!("  output {i}: MISMATCH (shape or kind differs)");
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
    eprintln!("==> `{}` matches the reference evaluator", common.method);
}

fn max_abs_diff(a: &RuntimeValue, b: &RuntimeValue) -> Option<f32> {
    match (a, b) {
        (RuntimeValue::Tensor(a), RuntimeValue::Tensor(b)) if a.shape() == b.shape() => Some(
            a.data()
                .iter()
                .zip(b.data())
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f32::max),
        ),
        (RuntimeValue::Scalar(a), RuntimeValue::Scalar(b)) => Some((a - b).abs()),
        _ => None,
    }
}
