//! Ahead-of-time compiler for tensor graph methods: specializes a graph to
//! concrete input sizes, generates native Rust for it and packages the result
//! with its constant parameters and I/O specs.

pub mod aot;
pub mod backend;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod kernels;
pub mod parse;
pub mod passes;
pub mod specialize;

pub use aot::{aot_compile, AotCompiler, CompileOptions, CompiledFunction};
pub use error::{AotError, CompileError};
pub use specialize::{specialize, RawGraph, SpecializedGraph};
