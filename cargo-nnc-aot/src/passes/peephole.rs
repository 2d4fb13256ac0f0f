use std::collections::HashMap;

use crate::ir::{BinaryKind, Graph, Op, UnaryKind, ValueId};

use super::{eliminate_dead_code, mutated_values};

/// Local algebraic simplifications that forward an existing value.
///
/// A rewrite only fires when the forwarded value has exactly the same concrete
/// type as the result it replaces and neither side is written in place.
pub fn peephole_optimize(graph: &mut Graph) -> usize {
    let mutated = mutated_values(graph);
    let producers: HashMap<ValueId, usize> = graph
        .ops
        .iter()
        .enumerate()
        .map(|(i, op)| (op.output(), i))
        .collect();

    let mut rewrites = 0;
    for i in 0..graph.ops.len() {
        let Some(replacement) = simplify(graph, &producers, i) else {
            continue;
        };
        let out = graph.ops[i].output();
        if mutated.contains(&out) || mutated.contains(&replacement) {
            continue;
        }
        let (from, to) = (&graph.value(out).ty, &graph.value(replacement).ty);
        if from != to || !from.is_concrete() {
            continue;
        }

        log::trace!(
            "peephole: {} forwards {}",
            graph.ops[i].name(),
            graph.value(replacement).label()
        );
        graph.replace_uses_from(i + 1, out, replacement);
        rewrites += 1;
    }

    if rewrites > 0 {
        eliminate_dead_code(graph);
    }
    log::debug!("peephole_optimize: {rewrites} rewrites");
    rewrites
}

fn simplify(graph: &Graph, producers: &HashMap<ValueId, usize>, index: usize) -> Option<ValueId> {
    let producer = |id: ValueId| producers.get(&id).map(|&i| &graph.ops[i]);
    let is = |id: ValueId, v: f32| splat_value(producer(id)) == Some(v);

    match &graph.ops[index] {
        Op::Binary { kind, lhs, rhs, .. } => match kind {
            BinaryKind::Mul if is(*rhs, 1.0) => Some(*lhs),
            BinaryKind::Mul if is(*lhs, 1.0) => Some(*rhs),
            BinaryKind::Div if is(*rhs, 1.0) => Some(*lhs),
            BinaryKind::Add if is(*rhs, 0.0) => Some(*lhs),
            BinaryKind::Add if is(*lhs, 0.0) => Some(*rhs),
            BinaryKind::Sub if is(*rhs, 0.0) => Some(*lhs),
            _ => None,
        },
        Op::Unary { kind, input, .. } => match (kind, producer(*input)) {
            (
                UnaryKind::Neg,
                Some(Op::Unary {
                    kind: UnaryKind::Neg,
                    input: inner,
                    ..
                }),
            ) => Some(*inner),
            // relu is idempotent: forward the inner result.
            (
                UnaryKind::Relu,
                Some(Op::Unary {
                    kind: UnaryKind::Relu,
                    ..
                }),
            ) => Some(*input),
            _ => None,
        },
        Op::Transpose { input, .. } => match producer(*input) {
            Some(Op::Transpose { input: inner, .. }) => Some(*inner),
            _ => None,
        },
        Op::Reshape { input, .. } => Some(*input),
        _ => None,
    }
}

/// The single value every element of a literal takes, if any.
fn splat_value(op: Option<&Op>) -> Option<f32> {
    match op? {
        Op::ScalarConstant { value, .. } | Op::Full { value, .. } => Some(*value),
        Op::Constant { value, .. } => {
            let (first, rest) = value.data().split_first()?;
            rest.iter().all(|v| v == first).then_some(*first)
        }
        _ => None,
    }
}
