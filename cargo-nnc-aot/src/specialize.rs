//! Graph specialization: from a graph with symbolic shapes to one where every
//! tensor shape is concrete for a single set of input sizes.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::aot::CompileOptions;
use crate::error::CompileError;
use crate::ir::tensor::checked_numel;
use crate::ir::{Graph, HostTensor, ValueType};
use crate::passes::{self, op_label};

/// A validated graph as supplied by the caller. Never mutated by the pipeline;
/// it defines the public input/output contract of the compiled function.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGraph(Graph);

impl RawGraph {
    pub fn new(graph: Graph) -> Result<Self, CompileError> {
        graph.validate().map_err(CompileError::InvalidGraph)?;
        Ok(Self(graph))
    }

    pub fn graph(&self) -> &Graph {
        &self.0
    }

    /// Number of data-carrying (tensor) inputs. Self/context arguments do not count.
    pub fn declared_inputs(&self) -> usize {
        self.0.tensor_inputs().count()
    }

    pub fn declared_outputs(&self) -> usize {
        self.0.outputs.len()
    }
}

/// The working copy after specialization: mutation-free, with every tensor
/// shape concrete. Only [`specialize`] produces one.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecializedGraph(Graph);

impl SpecializedGraph {
    pub fn graph(&self) -> &Graph {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn new_unchecked(graph: Graph) -> Self {
        Self(graph)
    }
}

/// Runs the specialization pipeline on a copy of `raw`.
///
/// `input_shapes` has one entry per tensor input of the graph, in order.
pub fn specialize(
    raw: &RawGraph,
    input_shapes: &[Vec<usize>],
    options: &CompileOptions,
) -> Result<SpecializedGraph, CompileError> {
    let mut graph = raw.graph().clone();
    let dump = |step: &str, graph: &Graph| {
        if options.dump_graphs {
            log::debug!("after {step}:\n{graph}");
        }
    };

    passes::remove_tensor_mutation(&mut graph);
    dump("remove_tensor_mutation", &graph);
    passes::eliminate_dead_code(&mut graph);
    passes::remove_unused_self_argument(&mut graph);
    dump("remove_unused_self_argument", &graph);

    let examples = synthesize_examples(&graph, input_shapes, options.example_seed)?;
    passes::annotate_input_shapes(&mut graph, &examples)?;
    passes::propagate_shapes(&mut graph)?;
    dump("propagate_shapes", &graph);

    passes::peephole_optimize(&mut graph);
    passes::constant_propagation(&mut graph)?;
    passes::propagate_shapes(&mut graph)?;
    dump("constant_propagation", &graph);

    graph.validate().map_err(|e| {
        CompileError::ContractViolation(format!("specialization produced an invalid graph: {e}"))
    })?;
    check_concrete(&graph)?;
    Ok(SpecializedGraph(graph))
}

/// One random example per tensor input; other inputs get `None`.
fn synthesize_examples(
    graph: &Graph,
    input_shapes: &[Vec<usize>],
    seed: u64,
) -> Result<Vec<Option<HostTensor>>, CompileError> {
    let expected = graph.tensor_inputs().count();
    if input_shapes.len() != expected {
        return Err(CompileError::InputArity {
            expected,
            got: input_shapes.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut shapes = input_shapes.iter();
    let mut examples = Vec::with_capacity(graph.inputs.len());
    for &id in &graph.inputs {
        let value = graph.value(id);
        let shape = match &value.ty {
            ValueType::Tensor { .. } => shapes.next(),
            _ => None,
        };
        let example = match shape {
            Some(shape) => {
                if checked_numel(shape).is_none() {
                    return Err(CompileError::ShapeMismatch {
                        node: format!("input {}", value.label()),
                        detail: format!("element count of {shape:?} overflows"),
                    });
                }
                Some(HostTensor::rand(shape, &mut rng))
            }
            None => None,
        };
        examples.push(example);
    }
    Ok(examples)
}

fn check_concrete(graph: &Graph) -> Result<(), CompileError> {
    for &id in &graph.inputs {
        let value = graph.value(id);
        if !value.ty.is_concrete() {
            return Err(CompileError::ShapeResolution {
                node: format!("input {}", value.label()),
                value: format!("{} : {}", value.label(), value.ty),
            });
        }
    }
    for (i, op) in graph.ops.iter().enumerate() {
        let value = graph.value(op.output());
        if !value.ty.is_concrete() {
            return Err(CompileError::ShapeResolution {
                node: op_label(graph, i),
                value: format!("{} : {}", value.label(), value.ty),
            });
        }
        if let Some(shape) = value.ty.concrete_shape() {
            if checked_numel(&shape).is_none() {
                return Err(CompileError::ShapeMismatch {
                    node: op_label(graph, i),
                    detail: format!("element count of {shape:?} overflows"),
                });
            }
        }
    }
    Ok(())
}
