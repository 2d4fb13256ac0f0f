//! Graph transformations run by the specializer.
//!
//! Each pass mutates the graph in place and reports how much it changed.
//! Passes assume a validated graph whose ops are in definition order.

mod constant_propagation;
mod dce;
mod peephole;
mod remove_mutation;
mod self_argument;
mod shape_inference;

use std::collections::{HashMap, HashSet};

use crate::ir::{Graph, ValueId};

pub use constant_propagation::constant_propagation;
pub use dce::eliminate_dead_code;
pub use peephole::peephole_optimize;
pub use remove_mutation::remove_tensor_mutation;
pub use self_argument::remove_unused_self_argument;
pub use shape_inference::{annotate_input_shapes, propagate_shapes};

/// Storage root of every value: in-place outputs share their target's root.
fn alias_roots(graph: &Graph) -> HashMap<ValueId, ValueId> {
    let mut root = HashMap::new();
    for op in &graph.ops {
        let out = op.output();
        let r = match op.mutated() {
            Some(target) => root.get(&target).copied().unwrap_or(target),
            None => out,
        };
        root.insert(out, r);
    }
    root
}

/// Values whose storage is written by some in-place op.
fn mutated_values(graph: &Graph) -> HashSet<ValueId> {
    let root = alias_roots(graph);
    let root_of = |id: ValueId| root.get(&id).copied().unwrap_or(id);
    let written: HashSet<ValueId> = graph
        .ops
        .iter()
        .filter_map(|op| op.mutated())
        .map(root_of)
        .collect();
    (0..graph.values.len())
        .filter(|&id| written.contains(&root_of(id)))
        .collect()
}

/// Label used in diagnostics for the op at `index`.
pub(crate) fn op_label(graph: &Graph, index: usize) -> String {
    let op = &graph.ops[index];
    format!(
        "op {index} ({}) -> {}",
        op.name(),
        graph.value(op.output()).label()
    )
}
