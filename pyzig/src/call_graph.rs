//! Call graph construction and allocator-need analysis.
//!
//! A pre-pass scans every user function (and class method) once, recording
//! call edges and the syntactic facts that force an allocator or make the
//! emitted body fallible. A least fixed point then propagates both flags
//! through the call graph; recursion converges because the flags only ever
//! move upward.
//!
//! The facts seeded here:
//! - allocation: list/dict/set literals, comprehensions, string
//!   concatenation/repetition, `%` formatting, user class instantiation,
//!   allocator-needing registry functions;
//! - fallibility: subscripts (bounds checks), `/`/`//`/`%` (division by
//!   zero), `raise`, fallible registry functions.

use crate::dispatch;
use pyzig_ast::{BinOp, Const, Expr, Module, Slice, Stmt};
use std::collections::{HashMap, HashSet};

/// Key used for the module-level statement scan.
pub const MODULE_SCOPE: &str = "__module__";

/// Builtins whose emission allocates.
const ALLOCATING_BUILTINS: &[&str] = &["str", "sorted", "list", "dict", "set", "enumerate", "zip"];

/// String methods whose emission allocates a fresh string or list.
const ALLOCATING_STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "split", "join", "replace", "format",
];

#[derive(Debug, Default)]
struct ScanFacts {
    calls: HashSet<String>,
    allocates: bool,
    errors: bool,
}

/// Call graph with per-function allocator/error labels.
#[derive(Debug, Default)]
pub struct CallGraph {
    edges: HashMap<String, HashSet<String>>,
    allocating: HashSet<String>,
    erroring: HashSet<String>,
}

impl CallGraph {
    /// Build the graph and run the fixed point over a whole module.
    pub fn from_module(module: &Module) -> Self {
        let mut graph = Self::default();

        let mut module_facts = ScanFacts::default();
        for stmt in &module.body {
            match stmt {
                Stmt::FunctionDef { name, body, .. } => {
                    graph.scan_function(name.clone(), body, None);
                }
                Stmt::ClassDef {
                    name: class_name,
                    body: class_body,
                    ..
                } => {
                    for member in class_body {
                        if let Stmt::FunctionDef { name, body, .. } = member {
                            let key = format!("{}.{}", class_name, name);
                            graph.scan_function(key.clone(), body, Some(class_name));
                            // Instantiation always heap-allocates the struct.
                            if name == "__init__" {
                                graph.allocating.insert(key);
                            }
                        }
                    }
                }
                other => scan_stmt(other, None, &mut module_facts),
            }
        }
        graph.record(MODULE_SCOPE.to_string(), module_facts);

        graph.propagate();
        graph
    }

    fn scan_function(&mut self, key: String, body: &[Stmt], class: Option<&str>) {
        let mut facts = ScanFacts::default();
        for stmt in body {
            scan_stmt(stmt, class, &mut facts);
        }
        self.record(key, facts);
    }

    fn record(&mut self, key: String, facts: ScanFacts) {
        if facts.allocates {
            self.allocating.insert(key.clone());
        }
        if facts.errors {
            self.erroring.insert(key.clone());
        }
        self.edges.insert(key, facts.calls);
    }

    /// Least fixed point: a caller inherits each flag from its callees.
    fn propagate(&mut self) {
        loop {
            let mut changed = false;
            for (caller, callees) in &self.edges {
                for callee in callees {
                    if self.allocating.contains(callee) && !self.allocating.contains(caller) {
                        self.allocating.insert(caller.clone());
                        changed = true;
                    }
                    if self.erroring.contains(callee) && !self.erroring.contains(caller) {
                        self.erroring.insert(caller.clone());
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    pub fn needs_allocator(&self, name: &str) -> bool {
        self.allocating.contains(name)
    }

    pub fn returns_error(&self, name: &str) -> bool {
        self.erroring.contains(name)
    }

    /// Whether the module-level statements themselves need the arena.
    pub fn module_needs_allocator(&self) -> bool {
        self.needs_allocator(MODULE_SCOPE)
            || self
                .edges
                .get(MODULE_SCOPE)
                .is_some_and(|callees| callees.iter().any(|c| self.needs_allocator(c)))
    }
}

/// Syntactic `(allocates, errors)` facts for a standalone expression.
///
/// Used when a lambda body is hoisted into its own function and needs its
/// own allocator/fallibility decision.
pub fn expr_facts(expr: &Expr) -> (bool, bool) {
    let mut facts = ScanFacts::default();
    scan_expr(expr, None, &mut facts);
    (facts.allocates, facts.errors)
}

fn scan_stmt(stmt: &Stmt, class: Option<&str>, facts: &mut ScanFacts) {
    match stmt {
        Stmt::Expr { value } => scan_expr(value, class, facts),
        Stmt::Return { value } => {
            if let Some(v) = value {
                scan_expr(v, class, facts);
            }
        }
        Stmt::Assign { targets, value } => {
            for t in targets {
                scan_expr(t, class, facts);
            }
            scan_expr(value, class, facts);
        }
        Stmt::AugAssign { target, op, value } => {
            scan_expr(target, class, facts);
            scan_expr(value, class, facts);
            if matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
                facts.errors = true;
            }
        }
        Stmt::If { test, body, orelse } => {
            scan_expr(test, class, facts);
            for s in body.iter().chain(orelse) {
                scan_stmt(s, class, facts);
            }
        }
        Stmt::While { test, body } => {
            scan_expr(test, class, facts);
            for s in body {
                scan_stmt(s, class, facts);
            }
        }
        Stmt::For { target, iter, body } => {
            scan_expr(target, class, facts);
            scan_expr(iter, class, facts);
            for s in body {
                scan_stmt(s, class, facts);
            }
        }
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            for s in body.iter().chain(orelse).chain(finalbody) {
                scan_stmt(s, class, facts);
            }
            for handler in handlers {
                for s in &handler.body {
                    scan_stmt(s, class, facts);
                }
            }
        }
        Stmt::Raise { exc } => {
            facts.errors = true;
            if let Some(e) = exc {
                scan_expr(e, class, facts);
            }
        }
        Stmt::FunctionDef { .. }
        | Stmt::ClassDef { .. }
        | Stmt::Import { .. }
        | Stmt::ImportFrom { .. }
        | Stmt::Pass
        | Stmt::Break
        | Stmt::Continue => {}
    }
}

fn is_str_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Constant {
            value: Const::Str(_),
        } => true,
        Expr::BinOp { left, op, right } => {
            matches!(op, BinOp::Add | BinOp::Mod | BinOp::Mult)
                && (is_str_expr(left) || is_str_expr(right))
        }
        Expr::Call { func, .. } => {
            // str(...) and string-method results.
            if func.as_name() == Some("str") {
                return true;
            }
            if let Expr::Attribute { attr, .. } = func.as_ref() {
                return ALLOCATING_STR_METHODS.contains(&attr.as_str());
            }
            false
        }
        _ => false,
    }
}

fn scan_slice(slice: &Slice, class: Option<&str>, facts: &mut ScanFacts) {
    match slice {
        Slice::Index { value } => scan_expr(value, class, facts),
        Slice::Slice { lower, upper, step } => {
            facts.allocates = true;
            for bound in [lower, upper, step].into_iter().flatten() {
                scan_expr(bound, class, facts);
            }
        }
        Slice::ExtSlice { dims } => {
            for dim in dims {
                scan_slice(dim, class, facts);
            }
        }
    }
}

fn scan_expr(expr: &Expr, class: Option<&str>, facts: &mut ScanFacts) {
    match expr {
        Expr::Constant {
            value: Const::Big { .. },
        } => {
            // Oversized literals build a runtime big integer.
            facts.allocates = true;
        }
        Expr::Constant { .. } | Expr::Name { .. } => {}
        Expr::List { elts } | Expr::Set { elts } | Expr::Tuple { elts } => {
            if !matches!(expr, Expr::Tuple { .. }) {
                facts.allocates = true;
            }
            for e in elts {
                scan_expr(e, class, facts);
            }
        }
        Expr::Dict { keys, values } => {
            facts.allocates = true;
            for k in keys.iter().flatten() {
                scan_expr(k, class, facts);
            }
            for v in values {
                scan_expr(v, class, facts);
            }
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            facts.allocates = true;
            scan_expr(elt, class, facts);
            for g in generators {
                scan_expr(&g.iter, class, facts);
                for cond in &g.ifs {
                    scan_expr(cond, class, facts);
                }
            }
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            facts.allocates = true;
            scan_expr(key, class, facts);
            scan_expr(value, class, facts);
            for g in generators {
                scan_expr(&g.iter, class, facts);
                for cond in &g.ifs {
                    scan_expr(cond, class, facts);
                }
            }
        }
        Expr::BinOp { left, op, right } => {
            scan_expr(left, class, facts);
            scan_expr(right, class, facts);
            match op {
                BinOp::Div | BinOp::FloorDiv => facts.errors = true,
                BinOp::Mod => {
                    facts.errors = true;
                    if is_str_expr(left) {
                        facts.allocates = true;
                    }
                }
                BinOp::Add | BinOp::Mult => {
                    if is_str_expr(left) || is_str_expr(right) {
                        facts.allocates = true;
                    }
                }
                BinOp::LShift => {
                    // Oversized shifts route through the big-integer runtime.
                    let shift = right.as_int();
                    if shift.map_or(true, |s| s >= crate::infer::BIGINT_SHIFT_BOUND) {
                        facts.allocates = true;
                    }
                }
                _ => {}
            }
        }
        Expr::UnaryOp { operand, .. } => scan_expr(operand, class, facts),
        Expr::BoolOp { values, .. } => {
            for v in values {
                scan_expr(v, class, facts);
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            scan_expr(left, class, facts);
            for c in comparators {
                scan_expr(c, class, facts);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            scan_expr(test, class, facts);
            scan_expr(body, class, facts);
            scan_expr(orelse, class, facts);
        }
        Expr::Lambda { body, .. } => scan_expr(body, class, facts),
        Expr::Starred { value } => scan_expr(value, class, facts),
        Expr::Attribute { value, .. } => scan_expr(value, class, facts),
        Expr::Subscript { value, slice } => {
            facts.errors = true;
            scan_expr(value, class, facts);
            scan_slice(slice, class, facts);
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            for a in args {
                scan_expr(a, class, facts);
            }
            for kw in keywords {
                scan_expr(&kw.value, class, facts);
            }
            if !keywords.is_empty() {
                // Keyword arguments ride a runtime dict.
                facts.allocates = true;
            }
            match func.as_ref() {
                Expr::Name { id } => {
                    if ALLOCATING_BUILTINS.contains(&id.as_str()) {
                        facts.allocates = true;
                    } else if id.chars().next().is_some_and(char::is_uppercase) {
                        facts.calls.insert(format!("{}.__init__", id));
                    } else {
                        facts.calls.insert(id.clone());
                    }
                }
                Expr::Attribute { value, attr } => {
                    scan_expr(value, class, facts);
                    if ALLOCATING_STR_METHODS.contains(&attr.as_str()) {
                        facts.allocates = true;
                    }
                    match value.as_ref() {
                        Expr::Name { id } if id == "self" => {
                            if let Some(c) = class {
                                facts.calls.insert(format!("{}.{}", c, attr));
                            }
                        }
                        Expr::Name { id } => {
                            // Module-qualified call: consult the registry.
                            let module = if id == "np" { "numpy" } else { id.as_str() };
                            if let Some(entry) = dispatch::module_function(module, attr) {
                                if entry.needs_allocator {
                                    facts.allocates = true;
                                }
                                if entry.returns_error {
                                    facts.errors = true;
                                }
                            }
                        }
                        _ => {}
                    }
                }
                other => scan_expr(other, class, facts),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyzig_ast::json::parse_module;

    fn graph(src: &str) -> CallGraph {
        CallGraph::from_module(&parse_module(src).unwrap())
    }

    #[test]
    fn test_pure_arithmetic_function_is_allocator_free() {
        let g = graph(
            r#"{"body": [{"_type": "FunctionDef", "name": "fib",
                "args": {"args": [{"arg": "n"}]},
                "body": [{"_type": "Return", "value":
                    {"_type": "BinOp",
                     "left": {"_type": "Name", "id": "n"},
                     "op": {"_type": "Add"},
                     "right": {"_type": "Constant", "value": 1}}}]}]}"#,
        );
        assert!(!g.needs_allocator("fib"));
        assert!(!g.returns_error("fib"));
    }

    #[test]
    fn test_list_literal_forces_allocator() {
        let g = graph(
            r#"{"body": [{"_type": "FunctionDef", "name": "make",
                "args": {"args": []},
                "body": [{"_type": "Return", "value":
                    {"_type": "List", "elts": [{"_type": "Constant", "value": 1}]}}]}]}"#,
        );
        assert!(g.needs_allocator("make"));
    }

    #[test]
    fn test_allocation_propagates_through_calls() {
        let g = graph(
            r#"{"body": [
                {"_type": "FunctionDef", "name": "inner", "args": {"args": []},
                 "body": [{"_type": "Return", "value":
                    {"_type": "List", "elts": []}}]},
                {"_type": "FunctionDef", "name": "outer", "args": {"args": []},
                 "body": [{"_type": "Return", "value":
                    {"_type": "Call", "func": {"_type": "Name", "id": "inner"},
                     "args": [], "keywords": []}}]}]}"#,
        );
        assert!(g.needs_allocator("inner"));
        assert!(g.needs_allocator("outer"));
    }

    #[test]
    fn test_recursive_function_converges() {
        let g = graph(
            r#"{"body": [{"_type": "FunctionDef", "name": "f",
                "args": {"args": [{"arg": "n"}]},
                "body": [{"_type": "Return", "value":
                    {"_type": "Call", "func": {"_type": "Name", "id": "f"},
                     "args": [{"_type": "Name", "id": "n"}], "keywords": []}}]}]}"#,
        );
        assert!(!g.needs_allocator("f"));
        assert!(!g.returns_error("f"));
    }

    #[test]
    fn test_division_marks_fallible() {
        let g = graph(
            r#"{"body": [{"_type": "FunctionDef", "name": "half",
                "args": {"args": [{"arg": "n"}]},
                "body": [{"_type": "Return", "value":
                    {"_type": "BinOp",
                     "left": {"_type": "Name", "id": "n"},
                     "op": {"_type": "Div"},
                     "right": {"_type": "Constant", "value": 2}}}]}]}"#,
        );
        assert!(g.returns_error("half"));
        assert!(!g.needs_allocator("half"));
    }

    #[test]
    fn test_raise_marks_fallible() {
        let g = graph(
            r#"{"body": [{"_type": "FunctionDef", "name": "boom",
                "args": {"args": []},
                "body": [{"_type": "Raise", "exc":
                    {"_type": "Call",
                     "func": {"_type": "Name", "id": "ValueError"},
                     "args": [], "keywords": []}}]}]}"#,
        );
        assert!(g.returns_error("boom"));
    }

    #[test]
    fn test_class_init_allocates_and_instantiation_propagates() {
        let g = graph(
            r#"{"body": [
                {"_type": "ClassDef", "name": "Counter", "bases": [], "body": [
                    {"_type": "FunctionDef", "name": "__init__",
                     "args": {"args": [{"arg": "self"}, {"arg": "n"}]},
                     "body": [{"_type": "Pass"}]}]},
                {"_type": "FunctionDef", "name": "fresh", "args": {"args": []},
                 "body": [{"_type": "Return", "value":
                    {"_type": "Call", "func": {"_type": "Name", "id": "Counter"},
                     "args": [{"_type": "Constant", "value": 0}], "keywords": []}}]}]}"#,
        );
        assert!(g.needs_allocator("Counter.__init__"));
        assert!(g.needs_allocator("fresh"));
    }

    #[test]
    fn test_string_concat_forces_allocator() {
        let g = graph(
            r#"{"body": [{"_type": "FunctionDef", "name": "greet",
                "args": {"args": [{"arg": "name"}]},
                "body": [{"_type": "Return", "value":
                    {"_type": "BinOp",
                     "left": {"_type": "Constant", "value": "hello "},
                     "op": {"_type": "Add"},
                     "right": {"_type": "Name", "id": "name"}}}]}]}"#,
        );
        assert!(g.needs_allocator("greet"));
    }

    #[test]
    fn test_module_scope_allocation() {
        let g = graph(
            r#"{"body": [{"_type": "Assign",
                "targets": [{"_type": "Name", "id": "xs"}],
                "value": {"_type": "List", "elts": []}}]}"#,
        );
        assert!(g.module_needs_allocator());
    }
}
