//! pyzig: an ahead-of-time Python-to-Zig translator.
//!
//! The translator consumes a parsed Python AST (see `pyzig_ast`) and emits
//! a single Zig source file that an external `zig build-exe` invocation
//! turns into a native executable. Runtime behavior the target language
//! cannot express statically (big integers, dynamic values, numeric
//! arrays) is delegated to a prebuilt runtime library, called by name.
//!
//! # Architecture
//!
//! ```text
//! AST → registries pre-pass → allocator analysis → type inference → Zig source
//! ```
//!
//! - [`types`]: the inferred type lattice and `widen`
//! - [`infer`]: on-demand expression type inference
//! - [`registry`]: class / function / variable tables
//! - [`call_graph`]: allocator-need and fallibility fixed point
//! - [`dispatch`]: the import dispatch registry
//! - [`codegen`]: the Zig emitter

// Library code reports through CompileError; only the CLI binary prints.
#![deny(clippy::print_stderr)]

pub mod call_graph;
pub mod codegen;
pub mod dispatch;
pub mod infer;
pub mod registry;
pub mod types;

use thiserror::Error;

pub use codegen::{CodegenConfig, ZigCodeGenerator};

/// Translation error.
///
/// These abort translation with a diagnostic naming the offending node
/// kind; no partial output is produced.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A construct the translator does not lower.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// Tuple subscript with a non-constant index.
    #[error("tuple index must be a constant integer")]
    TupleIndex,

    /// An invariant violated at a specific node kind.
    #[error("translation error at {node}: {message}")]
    Node {
        node: &'static str,
        message: String,
    },

    /// A broken internal invariant.
    #[error("internal translator error: {0}")]
    Internal(String),

    /// The frontend AST document could not be loaded.
    #[error(transparent)]
    Frontend(#[from] pyzig_ast::json::AstError),
}

/// Result type for translation operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Statistics collected during translation.
#[derive(Debug, Default, Clone)]
pub struct CompileStats {
    pub functions_emitted: usize,
    pub classes_emitted: usize,
    pub lambdas_hoisted: usize,
    pub closures_synthesized: usize,
    pub bigint_routes: usize,
    pub comptime_literals: usize,
    pub runtime_literals: usize,
    pub type_inferences: usize,
}

/// Result of a successful translation.
#[derive(Debug)]
pub struct CompileOutput {
    /// The complete Zig source file.
    pub zig_code: String,
    pub stats: CompileStats,
    pub warnings: Vec<String>,
}

/// Translate a parsed module with the default configuration.
pub fn compile_module(module: &pyzig_ast::Module) -> CompileResult<CompileOutput> {
    let mut generator = ZigCodeGenerator::new(CodegenConfig::default());
    generator.generate_module(module)
}

/// Parse a frontend JSON dump and translate it.
pub fn compile_json(src: &str) -> CompileResult<CompileOutput> {
    let module = pyzig_ast::json::parse_module(src)?;
    compile_module(&module)
}
