//! JSON graph files.
//!
//! The format is the serde form of [`Graph`]: a list of values, a list of ops
//! tagged by `"op"`, and the input/output value ids.
//!
//! ```json
//! {
//!   "values": [
//!     { "id": 0, "name": "x", "type": { "kind": "tensor", "dtype": "f32", "shape": ["n", 10] } },
//!     { "id": 1, "type": { "kind": "tensor", "dtype": "f32" } }
//!   ],
//!   "ops": [ { "op": "unary", "kind": "relu", "input": 0, "output": 1 } ],
//!   "inputs": [0],
//!   "outputs": [1]
//! }
//! ```

use crate::error::{CompileError, ParseError};
use crate::ir::Graph;
use crate::specialize::RawGraph;

/// Parse and validate a graph.
pub fn parse_graph(bytes: &[u8]) -> Result<RawGraph, ParseError> {
    let graph: Graph = serde_json::from_slice(bytes)?;
    RawGraph::new(graph).map_err(|e| match e {
        CompileError::InvalidGraph(msg) => ParseError::Invalid(msg),
        other => ParseError::Invalid(other.to_string()),
    })
}

pub fn to_json(graph: &Graph) -> Result<String, ParseError> {
    Ok(serde_json::to_string_pretty(graph)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Dim, Op, UnaryKind, ValueType};

    const RELU: &str = r#"{
        "values": [
            { "id": 0, "name": "x", "type": { "kind": "tensor", "dtype": "f32", "shape": ["n", 10] } },
            { "id": 1, "type": { "kind": "tensor", "dtype": "f32" } }
        ],
        "ops": [ { "op": "unary", "kind": "relu", "input": 0, "output": 1 } ],
        "inputs": [0],
        "outputs": [1]
    }"#;

    #[test]
    fn parses_symbolic_and_unranked_types() {
        let raw = parse_graph(RELU.as_bytes()).unwrap();
        let graph = raw.graph();

        assert_eq!(
            graph.value(0).ty.dims(),
            Some(&[Dim::Symbolic("n".into()), Dim::Static(10)][..])
        );
        assert_eq!(graph.value(1).ty.dims(), None);
        assert!(matches!(
            graph.ops[0],
            Op::Unary {
                kind: UnaryKind::Relu,
                input: 0,
                output: 1
            }
        ));
        assert_eq!(raw.declared_inputs(), 1);
    }

    #[test]
    fn written_graphs_read_back() {
        let raw = parse_graph(RELU.as_bytes()).unwrap();
        let text = to_json(raw.graph()).unwrap();
        assert_eq!(parse_graph(text.as_bytes()).unwrap(), raw);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = parse_graph(b"{ \"values\": [").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)), "got: {err}");
    }

    #[test]
    fn use_before_definition_is_rejected() {
        let text = RELU.replace("\"input\": 0", "\"input\": 1");
        let err = parse_graph(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::Invalid(_)), "got: {err}");
    }

    fn single_op(op: &str) -> String {
        format!(
            r#"{{
                "values": [ {{ "id": 0, "type": {{ "kind": "tensor", "dtype": "f32" }} }} ],
                "ops": [ {op} ],
                "inputs": [],
                "outputs": [0]
            }}"#
        )
    }

    #[test]
    fn overflowing_element_counts_are_rejected() {
        let ops = [
            r#"{ "op": "constant", "value": { "shape": [18446744073709551615, 2], "data": [] }, "output": 0 }"#,
            r#"{ "op": "full", "shape": [18446744073709551615, 2], "value": 1.0, "output": 0 }"#,
            r#"{ "op": "eye", "n": 18446744073709551615, "output": 0 }"#,
        ];
        for op in ops {
            let err = parse_graph(single_op(op).as_bytes()).unwrap_err();
            assert!(matches!(err, ParseError::Invalid(_)), "got: {err}");
            assert!(err.to_string().contains("overflows"), "got: {err}");
        }
    }

    #[test]
    fn constant_with_wrong_element_count_is_rejected() {
        let op = r#"{ "op": "constant", "value": { "shape": [2, 2], "data": [1.0] }, "output": 0 }"#;
        let err = parse_graph(single_op(op).as_bytes()).unwrap_err();
        assert!(err.to_string().contains("but 1 elements"), "got: {err}");
    }

    #[test]
    fn module_inputs_parse() {
        let text = r#"{
            "values": [
                { "id": 0, "name": "self", "type": { "kind": "module", "class": "Net" } },
                { "id": 1, "name": "x", "type": { "kind": "tensor", "dtype": "f32", "shape": [2] } }
            ],
            "ops": [],
            "inputs": [0, 1],
            "outputs": [1]
        }"#;
        let raw = parse_graph(text.as_bytes()).unwrap();
        assert!(matches!(raw.graph().value(0).ty, ValueType::Module { .. }));
        assert_eq!(raw.declared_inputs(), 1);
    }
}
