use crate::ir::Graph;

/// Drops a leading module-typed input that no op reads.
pub fn remove_unused_self_argument(graph: &mut Graph) -> bool {
    let Some(&first) = graph.inputs.first() else {
        return false;
    };
    if !graph.value(first).ty.is_module() || graph.has_uses(first) {
        return false;
    }
    graph.inputs.remove(0);
    log::debug!("removed unused self argument {}", graph.value(first).label());
    true
}
