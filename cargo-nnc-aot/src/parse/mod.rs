//! Graph front-ends.

pub mod json;

pub use json::{parse_graph, to_json};
