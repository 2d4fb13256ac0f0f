use std::collections::{HashMap, HashSet};

use crate::ir::{Graph, Op, ValueId};

/// Rewrites in-place ops into their pure equivalents.
///
/// After the rewrite, every later read of the mutated storage (through the
/// original value or any alias) reads the new value instead. Mutations whose
/// storage belongs to a graph input are observable by the caller and stay
/// in place.
pub fn remove_tensor_mutation(graph: &mut Graph) -> usize {
    let pinned: HashSet<ValueId> = graph.inputs.iter().copied().collect();
    let mut root: HashMap<ValueId, ValueId> = HashMap::new();
    let mut latest: HashMap<ValueId, ValueId> = HashMap::new();
    let mut rewrites = 0;

    for i in 0..graph.ops.len() {
        for input in graph.ops[i].inputs_mut() {
            let r = root.get(input).copied().unwrap_or(*input);
            if let Some(&current) = latest.get(&r) {
                *input = current;
            }
        }

        let out = graph.ops[i].output();
        let Some(target) = graph.ops[i].mutated() else {
            continue;
        };
        let r = root.get(&target).copied().unwrap_or(target);
        root.insert(out, r);

        if pinned.contains(&r) {
            log::warn!(
                "keeping {} on graph input {}",
                graph.ops[i].name(),
                graph.value(r).label()
            );
            continue;
        }

        let pure = match graph.ops[i].clone() {
            Op::BinaryInplace {
                kind,
                target,
                other,
                output,
            } => Op::Binary {
                kind,
                lhs: target,
                rhs: other,
                output,
            },
            Op::UnaryInplace {
                kind,
                target,
                output,
            } => Op::Unary {
                kind,
                input: target,
                output,
            },
            other => other,
        };
        graph.ops[i] = pure;
        latest.insert(r, out);
        rewrites += 1;
    }

    for output in &mut graph.outputs {
        let r = root.get(output).copied().unwrap_or(*output);
        if let Some(&current) = latest.get(&r) {
            *output = current;
        }
    }

    log::debug!("remove_tensor_mutation: {rewrites} in-place ops rewritten");
    rewrites
}
