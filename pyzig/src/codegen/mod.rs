//! The Zig code emitter.
//!
//! `ZigCodeGenerator` walks the AST and writes Zig source text into a
//! growable buffer. The impl is split by node family:
//!
//! - `constants.rs`: literals
//! - `operations.rs`: binary/unary/boolean operators, BigInt routing
//! - `compare.rs`: comparisons, containment, identity
//! - `collections.rs`: list/dict/set/tuple literals and comprehensions
//! - `subscript.rs`: indexing and slicing
//! - `lambdas.rs`: hoisted lambdas, capturing structs, inline structs
//! - `calls.rs`: call dispatch
//! - `statements.rs`: statements
//! - `program.rs`: whole-module emission and the registry pre-pass

mod calls;
mod collections;
mod compare;
mod constants;
mod expressions;
mod lambdas;
mod operations;
mod program;
mod statements;
mod subscript;
#[cfg(test)]
mod tests;

use crate::infer::{InferCtx, TypeInferencer};
use crate::registry::{ClassRegistry, ProgramFacts, SignatureTable, VarClasses};
use crate::types::PyType;
use crate::{CompileResult, CompileStats};
use once_cell::sync::Lazy;
use pyzig_ast::Expr;
use std::collections::HashSet;

/// Configuration for code generation.
#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Emit `// python: ...` breadcrumbs above statements.
    pub emit_comments: bool,
    /// Indentation unit.
    pub indent: String,
    /// Import path of the runtime library in the emitted file.
    pub runtime_import: String,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            emit_comments: false,
            indent: "    ".to_string(),
            runtime_import: "runtime.zig".to_string(),
        }
    }
}

/// Zig reserved words and primitive value names; user identifiers that
/// collide are emitted through the `@"..."` quoted syntax.
static ZIG_RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "addrspace", "align", "allowzero", "and", "anyframe", "anytype", "asm", "async",
        "await", "break", "callconv", "catch", "comptime", "const", "continue", "defer",
        "else", "enum", "errdefer", "error", "export", "extern", "fn", "for", "if",
        "inline", "linksection", "noalias", "noinline", "nosuspend", "opaque", "or",
        "orelse", "packed", "pub", "resume", "return", "struct", "suspend", "switch",
        "test", "threadlocal", "try", "union", "unreachable", "usingnamespace", "var",
        "volatile", "while",
        // Primitive values and names the prelude claims.
        "true", "false", "null", "undefined", "std", "runtime", "allocator", "main",
    ]
    .into_iter()
    .collect()
});

/// Escape a user identifier against the target reserved-word set.
pub fn escape_ident(name: &str) -> String {
    if ZIG_RESERVED.contains(name) {
        format!("@\"{}\"", name)
    } else {
        name.to_string()
    }
}

/// The code generator.
///
/// One instance per translation; holds the output buffer, emission state
/// and every registry the emitters consult.
#[derive(Debug)]
pub struct ZigCodeGenerator {
    pub(crate) config: CodegenConfig,
    /// Output buffer for the current emission region.
    pub(crate) out: String,
    pub(crate) indent_level: usize,
    /// 0 at module scope, >= 1 inside any function.
    pub(crate) scope_depth: usize,
    /// Running counter for labelled block expressions.
    label_counter: usize,
    /// Running counter for synthesized temporaries.
    tmp_counter: usize,
    /// Hoisted lambda/closure definitions, in insertion order.
    pub(crate) hoisted: Vec<String>,
    pub(crate) lambda_counter: usize,
    pub(crate) closure_counter: usize,

    pub(crate) classes: ClassRegistry,
    pub(crate) sigs: SignatureTable,
    /// Plain-function bodies retained for return-type iteration.
    pub(crate) fn_bodies: std::collections::HashMap<String, Vec<pyzig_ast::Stmt>>,
    pub(crate) facts: ProgramFacts,
    /// Classification sets for the scope currently being emitted.
    pub(crate) vars: VarClasses,
    pub(crate) infer: TypeInferencer,

    pub(crate) current_function: Option<String>,
    pub(crate) current_class: Option<String>,
    /// Set inside a `try` body: fallible operations break to this label
    /// instead of propagating.
    pub(crate) error_label: Option<String>,
    /// Names already declared in the scope being emitted.
    pub(crate) declared_vars: HashSet<String>,
    /// Names that need `var` rather than `const` in the current scope.
    pub(crate) mutable_vars: HashSet<String>,
    /// Renames applied to defaulted/reassigned parameters.
    pub(crate) param_renames: Vec<(String, String)>,

    pub(crate) stats: CompileStats,
    pub(crate) warnings: Vec<String>,
}

impl ZigCodeGenerator {
    pub fn new(config: CodegenConfig) -> Self {
        Self {
            config,
            out: String::new(),
            indent_level: 0,
            scope_depth: 0,
            label_counter: 0,
            tmp_counter: 0,
            hoisted: Vec::new(),
            lambda_counter: 0,
            closure_counter: 0,
            classes: ClassRegistry::new(),
            sigs: SignatureTable::new(),
            fn_bodies: std::collections::HashMap::new(),
            facts: ProgramFacts::new(),
            vars: VarClasses::default(),
            infer: TypeInferencer::new(),
            current_function: None,
            current_class: None,
            error_label: None,
            declared_vars: HashSet::new(),
            mutable_vars: HashSet::new(),
            param_renames: Vec::new(),
            stats: CompileStats::default(),
            warnings: Vec::new(),
        }
    }

    pub fn default_config() -> Self {
        Self::new(CodegenConfig::default())
    }

    // ========== Buffer helpers ==========

    pub(crate) fn write_line(&mut self, line: &str) {
        for _ in 0..self.indent_level {
            self.out.push_str(&self.config.indent);
        }
        self.out.push_str(line);
        self.out.push('\n');
    }

    pub(crate) fn blank_line(&mut self) {
        self.out.push('\n');
    }

    pub(crate) fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub(crate) fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    /// Fresh label for a block expression.
    pub(crate) fn next_label(&mut self) -> String {
        let label = format!("blk_{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    /// Fresh temporary name with the given stem.
    pub(crate) fn next_tmp(&mut self, stem: &str) -> String {
        let name = format!("__{}_{}", stem, self.tmp_counter);
        self.tmp_counter += 1;
        name
    }

    // ========== Scope helpers ==========

    /// The allocator reference valid at the current scope.
    pub(crate) fn allocator_name(&self) -> &'static str {
        if self.scope_depth == 0 {
            "allocator"
        } else {
            "__global_allocator"
        }
    }

    /// Resolve a (possibly dotted) expression to an imported module name.
    pub(crate) fn dotted_module_of(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Name { id } => self.facts.module_of(id).map(str::to_string),
            Expr::Attribute { value, attr } => {
                let base = self.dotted_module_of(value)?;
                let dotted = format!("{}.{}", base, attr);
                if self.facts.imported_modules.contains_key(&dotted)
                    || self.facts.imported_modules.values().any(|m| *m == dotted)
                {
                    Some(dotted)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Resolve a user identifier: parameter renames first, then escaping.
    pub(crate) fn resolve_name(&self, name: &str) -> String {
        if let Some((_, renamed)) = self.param_renames.iter().rev().find(|(n, _)| n == name) {
            return renamed.clone();
        }
        escape_ident(name)
    }

    // ========== Inference bridge ==========

    /// Infer an expression's type against the current scope.
    pub(crate) fn infer_ty(&mut self, expr: &Expr) -> PyType {
        self.stats.type_inferences += 1;
        let ctx = InferCtx {
            classes: &self.classes,
            sigs: &self.sigs,
            facts: &self.facts,
            vars: &self.vars,
        };
        self.infer.infer_expr_scoped(expr, &ctx)
    }

    /// Element type produced by iterating `iter` in the current scope.
    pub(crate) fn iter_element_ty(&mut self, iter: &Expr) -> PyType {
        let ctx = InferCtx {
            classes: &self.classes,
            sigs: &self.sigs,
            facts: &self.facts,
            vars: &self.vars,
        };
        self.infer.iterator_element(iter, &ctx, true)
    }

    // ========== Fallibility ==========

    /// Wrap a fallible call for the current error context.
    ///
    /// Inside a `try` body the error breaks to the handler label; anywhere
    /// else inside a function it propagates with `try`. Module-level
    /// initializers must not reach this path.
    pub(crate) fn fallible(&self, call: String) -> String {
        match &self.error_label {
            Some(label) => format!("({} catch break :{})", call, label),
            None => format!("(try {})", call),
        }
    }

    /// Wrap a call the runtime promises cannot fail once allocation
    /// succeeded.
    pub(crate) fn infallible(&self, call: String) -> String {
        format!("({} catch unreachable)", call)
    }

    // ========== Block-expression recognition ==========

    /// Node kinds whose emission produces a labelled block expression (or
    /// another form that must be parenthesized under an operator).
    pub(crate) fn is_block_expr(expr: &Expr) -> bool {
        match expr {
            Expr::Subscript { .. }
            | Expr::List { .. }
            | Expr::Dict { .. }
            | Expr::Set { .. }
            | Expr::ListComp { .. }
            | Expr::SetComp { .. }
            | Expr::DictComp { .. }
            | Expr::GeneratorExp { .. }
            | Expr::IfExp { .. }
            | Expr::Call { .. }
            | Expr::Compare { .. } => true,
            Expr::Attribute { value, .. } => Self::is_block_expr(value),
            _ => false,
        }
    }

    /// Emit a subexpression, parenthesized when its lowering is a block
    /// expression used under an operator.
    pub(crate) fn emit_operand(&mut self, expr: &Expr) -> CompileResult<String> {
        let text = self.emit_expr(expr)?;
        if Self::is_block_expr(expr) && !text.starts_with('(') {
            Ok(format!("({})", text))
        } else {
            Ok(text)
        }
    }
}
