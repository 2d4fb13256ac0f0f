use std::collections::HashSet;

use crate::ir::{Graph, ValueId};

/// Removes ops whose results cannot reach a graph output.
/// Side-effecting ops are always kept.
pub fn eliminate_dead_code(graph: &mut Graph) -> usize {
    let mut live: HashSet<ValueId> = graph.outputs.iter().copied().collect();
    let mut keep = vec![false; graph.ops.len()];

    // Ops are in definition order, so one backwards sweep settles liveness.
    for (i, op) in graph.ops.iter().enumerate().rev() {
        if live.contains(&op.output()) || op.has_side_effects() {
            keep[i] = true;
            live.extend(op.inputs());
        }
    }

    let before = graph.ops.len();
    let mut flags = keep.into_iter();
    graph.ops.retain(|_| flags.next().unwrap_or(true));
    let removed = before - graph.ops.len();

    log::debug!("eliminate_dead_code: {removed} ops removed");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DType, Op, UnaryKind, ValueType};

    #[test]
    fn removes_unreachable_chain_and_keeps_side_effects() {
        let mut graph = Graph::new();
        let x = graph.add_input("x", ValueType::unranked(DType::F32));
        let dead = graph.push_op(ValueType::unranked(DType::F32), |output| Op::Unary {
            kind: UnaryKind::Exp,
            input: x,
            output,
        });
        graph.push_op(ValueType::unranked(DType::F32), |output| Op::Unary {
            kind: UnaryKind::Neg,
            input: dead,
            output,
        });
        graph.push_op(ValueType::unranked(DType::F32), |output| Op::Custom {
            name: "print".into(),
            inputs: vec![x],
            output_shape: None,
            output,
        });
        let live = graph.push_op(ValueType::unranked(DType::F32), |output| Op::Unary {
            kind: UnaryKind::Relu,
            input: x,
            output,
        });
        graph.outputs.push(live);

        assert_eq!(eliminate_dead_code(&mut graph), 2);
        let names: Vec<String> = graph.ops.iter().map(|op| op.name()).collect();
        assert_eq!(names, ["custom::print", "relu"]);
    }
}
