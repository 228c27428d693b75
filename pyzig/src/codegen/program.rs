//! Whole-module emission and the registry pre-pass.
//!
//! The pre-pass populates the class registry, signature table and
//! program facts, runs the allocator/error fixed point, seeds parameter
//! types from call sites and iterates return types to a fixed point.
//! Emission then produces the final file as
//! (prelude + globals) → (classes) → (hoisted lambdas) → (functions) →
//! (entry point), matching hoist insertion order to call-site references.

use super::ZigCodeGenerator;
use crate::call_graph::CallGraph;
use crate::infer::InferCtx;
use crate::registry::{ClassInfo, FunctionSig, MethodInfo};
use crate::types::PyType;
use crate::{CompileOutput, CompileResult};
use pyzig_ast::{BinOp, Const, Expr, Keyword, Module, Slice, Stmt, UnaryOp};

impl ZigCodeGenerator {
    /// Translate a whole module into a Zig source file.
    pub fn generate_module(&mut self, module: &Module) -> CompileResult<CompileOutput> {
        let graph = self.run_prepass(module);

        // Partition the top level.
        let mut class_defs: Vec<&Stmt> = Vec::new();
        let mut function_defs: Vec<&Stmt> = Vec::new();
        let mut main_stmts: Vec<&Stmt> = Vec::new();
        for (i, stmt) in module.body.iter().enumerate() {
            match stmt {
                Stmt::ClassDef { .. } => class_defs.push(stmt),
                Stmt::FunctionDef { .. } => function_defs.push(stmt),
                Stmt::Import { .. } | Stmt::ImportFrom { .. } => {}
                Stmt::Expr {
                    value:
                        Expr::Constant {
                            value: Const::Str(_),
                        },
                } if i == 0 => {}
                other => main_stmts.push(other),
            }
        }

        // Module-level constant initializers become scope-0 globals; the
        // rest of the module body runs inside the entry point.
        let mut global_assigns: Vec<&Stmt> = Vec::new();
        let mut body_stmts: Vec<&Stmt> = Vec::new();
        for stmt in main_stmts {
            if let Stmt::Assign { targets, value } = stmt {
                if targets.len() == 1
                    && targets[0].as_name().is_some()
                    && self.is_const_expr(value)
                {
                    global_assigns.push(stmt);
                    continue;
                }
            }
            body_stmts.push(stmt);
        }

        // Module-body variables reassigned later need `var` declarations.
        self.mutable_vars = super::statements::collect_mutated(&module.body);

        // Globals.
        self.scope_depth = 0;
        self.indent_level = 0;
        for stmt in &global_assigns {
            self.emit_stmt(stmt)?;
        }
        let globals_text = std::mem::take(&mut self.out);

        // Classes.
        for stmt in &class_defs {
            self.emit_stmt(stmt)?;
        }
        let classes_text = std::mem::take(&mut self.out);

        // User functions.
        for stmt in &function_defs {
            self.emit_stmt(stmt)?;
        }
        let functions_text = std::mem::take(&mut self.out);

        // Entry point.
        self.write_line("pub fn main() !void {");
        self.indent();
        self.scope_depth = 1;
        if graph.module_needs_allocator() {
            self.write_line(
                "var __arena = std.heap.ArenaAllocator.init(std.heap.page_allocator);",
            );
            self.write_line("defer __arena.deinit();");
            self.write_line("const __global_allocator = __arena.allocator();");
        }
        for stmt in &body_stmts {
            self.emit_stmt(stmt)?;
        }
        self.dedent();
        self.write_line("}");
        self.scope_depth = 0;
        let main_text = std::mem::take(&mut self.out);

        // Assemble in the guaranteed order.
        let mut out = String::new();
        out.push_str("//! Generated by pyzig. Do not edit manually.\n\n");
        out.push_str("const std = @import(\"std\");\n");
        out.push_str(&format!(
            "const runtime = @import(\"{}\");\n\n",
            self.config.runtime_import
        ));
        out.push_str("const allocator = std.heap.page_allocator;\n\n");
        if !globals_text.is_empty() {
            out.push_str(&globals_text);
            out.push('\n');
        }
        if !classes_text.is_empty() {
            out.push_str(&classes_text);
        }
        for definition in &self.hoisted {
            out.push_str(definition);
            out.push_str("\n\n");
        }
        if !functions_text.is_empty() {
            out.push_str(&functions_text);
        }
        out.push_str(&main_text);

        Ok(CompileOutput {
            zig_code: out,
            stats: self.stats.clone(),
            warnings: std::mem::take(&mut self.warnings),
        })
    }

    // ========== Pre-pass ==========

    fn run_prepass(&mut self, module: &Module) -> CallGraph {
        self.collect_imports(&module.body);
        self.register_classes(&module.body, false);
        self.register_functions(&module.body, None);

        let graph = CallGraph::from_module(module);
        self.apply_call_graph(&graph);

        self.seed_param_types(&module.body);
        self.collect_class_fields();
        self.infer_return_types();
        self.seed_module_globals(&module.body);
        graph
    }

    fn collect_imports(&mut self, body: &[Stmt]) {
        for stmt in body {
            match stmt {
                Stmt::Import { names } => {
                    for alias in names {
                        let bound = alias.asname.clone().unwrap_or_else(|| alias.name.clone());
                        self.facts
                            .imported_modules
                            .insert(bound, alias.name.clone());
                        // `import os.path` binds the root name too.
                        if let Some(root) = alias.name.split('.').next() {
                            if alias.asname.is_none() && root != alias.name {
                                self.facts
                                    .imported_modules
                                    .insert(root.to_string(), root.to_string());
                            }
                        }
                    }
                }
                Stmt::ImportFrom { module, names } => {
                    for alias in names {
                        let bound = alias.asname.clone().unwrap_or_else(|| alias.name.clone());
                        self.facts
                            .from_imports
                            .insert(bound.clone(), (module.clone(), alias.name.clone()));
                        if let Some(entry) =
                            crate::dispatch::module_function(module, &alias.name)
                        {
                            if entry.needs_allocator {
                                self.facts.from_import_alloc.insert(bound);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn register_classes(&mut self, body: &[Stmt], nested: bool) {
        for stmt in body {
            match stmt {
                Stmt::ClassDef {
                    name,
                    bases,
                    body: class_body,
                } => {
                    if nested {
                        self.facts.nested_class_names.insert(name.clone());
                    }
                    let info = self.build_class_info(name, bases, class_body);
                    self.classes.register(info);
                    // Classes nest inside methods too.
                    for member in class_body {
                        if let Stmt::FunctionDef { body, .. } = member {
                            self.register_classes(body, true);
                        }
                    }
                }
                Stmt::FunctionDef { body, .. } => self.register_classes(body, true),
                _ => {}
            }
        }
    }

    fn build_class_info(&mut self, name: &str, bases: &[Expr], body: &[Stmt]) -> ClassInfo {
        let mut info = ClassInfo {
            name: name.to_string(),
            base: bases.first().and_then(Expr::as_name).map(str::to_string),
            ..Default::default()
        };

        for stmt in body {
            if let Stmt::FunctionDef {
                name: method_name,
                args,
                body: method_body,
                decorator_list,
                ..
            } = stmt
            {
                let is_property = decorator_list
                    .iter()
                    .any(|d| d.as_name() == Some("property"));
                info.methods.insert(
                    method_name.clone(),
                    MethodInfo {
                        args: args.clone(),
                        body: method_body.clone(),
                        is_property,
                        return_type: PyType::Bottom,
                        needs_allocator: false,
                        returns_error: false,
                    },
                );
                if method_name == "__init__" {
                    info.init_params = args.args.iter().skip(1).map(|a| a.arg.clone()).collect();
                }
            }
        }
        info
    }

    /// Fill each class's field table from `self.x = ...` stores, with
    /// method parameters typed from the seeded signatures (`__init__`
    /// first so later methods see the established field types).
    fn collect_class_fields(&mut self) {
        let class_names: Vec<String> = self.classes.names().cloned().collect();
        for class in class_names {
            let mut methods: Vec<(String, MethodInfo)> = self
                .classes
                .get(&class)
                .map(|c| {
                    c.methods
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();
            methods.sort_by_key(|(name, _)| (name != "__init__", name.clone()));

            for (method_name, method) in methods {
                let key = format!("{}.{}", class, method_name);
                let param_types = self
                    .sigs
                    .get(&key)
                    .map(|s| s.param_types.clone())
                    .unwrap_or_default();
                self.infer
                    .register_param("self", PyType::Instance(class.clone()));
                let mut registered = vec!["self".to_string()];
                for (i, arg) in method.args.args.iter().enumerate().skip(1) {
                    let ty = match param_types.get(i) {
                        Some(PyType::Bottom) | None => PyType::Unknown,
                        Some(other) => other.clone(),
                    };
                    self.infer.register_param(&arg.arg, ty);
                    registered.push(arg.arg.clone());
                }
                collect_field_stores(&method.body, self, &class);
                for name in registered.iter().rev() {
                    self.infer.unregister_param(name);
                }
            }
        }
    }

    fn register_functions(&mut self, body: &[Stmt], class: Option<&str>) {
        for stmt in body {
            match stmt {
                Stmt::FunctionDef {
                    name,
                    args,
                    body: fn_body,
                    is_async,
                    ..
                } => {
                    let key = match class {
                        Some(c) => format!("{}.{}", c, name),
                        None => name.clone(),
                    };
                    let param_names: Vec<String> =
                        args.args.iter().map(|a| a.arg.clone()).collect();
                    let required = param_names.len().saturating_sub(args.defaults.len());
                    let mut sig = FunctionSig::new(&key, param_names, required);
                    sig.is_async = *is_async;
                    sig.is_vararg = args.vararg.is_some();
                    sig.is_kwarg = args.kwarg.is_some();
                    if let Some(c) = class {
                        if let Some(slot) = sig.param_types.first_mut() {
                            *slot = PyType::Instance(c.to_string());
                        }
                    } else {
                        self.fn_bodies.insert(key.clone(), fn_body.clone());
                    }
                    if *is_async {
                        self.facts.async_functions.insert(key.clone());
                    }
                    if sig.is_vararg {
                        self.facts.vararg_functions.insert(key.clone());
                    }
                    if sig.is_kwarg {
                        self.facts.kwarg_functions.insert(key.clone());
                    }
                    self.sigs.insert(sig);
                    // Nested defs are hoisted and called by bare name.
                    self.register_functions(fn_body, None);
                }
                Stmt::ClassDef {
                    name, body: class_body, ..
                } => {
                    self.register_functions(class_body, Some(name));
                }
                _ => {}
            }
        }
    }

    fn apply_call_graph(&mut self, graph: &CallGraph) {
        let names: Vec<String> = self.classes.names().cloned().collect();
        for class in &names {
            let methods: Vec<String> = self
                .classes
                .get(class)
                .map(|c| c.methods.keys().cloned().collect())
                .unwrap_or_default();
            for method in methods {
                let key = format!("{}.{}", class, method);
                let needs_allocator =
                    graph.needs_allocator(&key) || method == "__init__";
                let returns_error = graph.returns_error(&key);
                if let Some(sig) = self.sigs.get_mut(&key) {
                    sig.needs_allocator = needs_allocator;
                    sig.returns_error = returns_error;
                }
                if let Some(info) = self.classes.get_mut(class) {
                    if let Some(m) = info.methods.get_mut(&method) {
                        m.needs_allocator = needs_allocator;
                        m.returns_error = returns_error;
                    }
                }
            }
        }
        let sig_names: Vec<String> = self
            .sigs_names()
            .into_iter()
            .filter(|n| !n.contains('.'))
            .collect();
        for name in sig_names {
            let needs_allocator = graph.needs_allocator(&name);
            let returns_error = graph.returns_error(&name);
            if let Some(sig) = self.sigs.get_mut(&name) {
                sig.needs_allocator = needs_allocator;
                sig.returns_error = returns_error;
            }
        }
    }

    fn sigs_names(&self) -> Vec<String> {
        self.sigs.names().map(String::from).collect()
    }

    /// Widen each user function's parameter types over the argument types
    /// observed at its call sites (literal-derived facts only; unknown
    /// arguments do not erase what literals established).
    fn seed_param_types(&mut self, body: &[Stmt]) {
        let mut calls: Vec<(String, Vec<Expr>)> = Vec::new();
        collect_calls(body, &mut calls);
        for (name, args) in calls {
            // Constructor calls seed the `__init__` signature, whose first
            // parameter is the instance.
            let (name, offset) = if self.classes.contains(&name) {
                (format!("{}.__init__", name), 1)
            } else {
                (name, 0)
            };
            for (i, arg) in args.iter().enumerate() {
                let i = i + offset;
                let ctx = InferCtx {
                    classes: &self.classes,
                    sigs: &self.sigs,
                    facts: &self.facts,
                    vars: &self.vars,
                };
                let ty = self.infer.infer_expr(arg, &ctx);
                if matches!(ty, PyType::Unknown | PyType::Bottom) {
                    continue;
                }
                if let Some(sig) = self.sigs.get_mut(&name) {
                    if let Some(slot) = sig.param_types.get_mut(i) {
                        *slot = slot.widen(&ty);
                    }
                }
            }
        }
    }

    /// Iterate return types to a fixed point; recursion starts from
    /// `Bottom` (the widen identity) and settles within a few rounds.
    fn infer_return_types(&mut self) {
        for _ in 0..3 {
            let keys = self.sigs_names();
            for key in keys {
                let Some(sig) = self.sigs.get(&key).cloned() else {
                    continue;
                };
                // The method body lives in the class registry; plain
                // functions re-read their AST via the signature's name at
                // emission, so only returns recorded here matter.
                let body = self.lookup_body(&key);
                let Some(body) = body else { continue };

                for (pname, pty) in sig.param_names.iter().zip(sig.param_types.iter()) {
                    // Unseeded parameters emit as i64; infer them the same way.
                    let effective = match pty {
                        PyType::Bottom | PyType::Unknown => PyType::Int,
                        other => other.clone(),
                    };
                    self.infer.register_param(pname, effective);
                }
                let mut ret = PyType::Bottom;
                let mut saw_return = false;
                collect_return_types(&body, self, &mut ret, &mut saw_return);
                for pname in sig.param_names.iter().rev() {
                    self.infer.unregister_param(pname);
                }

                let final_ty = if !saw_return {
                    PyType::NoneType
                } else if matches!(ret, PyType::Bottom) {
                    PyType::NoneType
                } else {
                    ret
                };
                if let Some(sig) = self.sigs.get_mut(&key) {
                    sig.return_type = final_ty.clone();
                }
                if let Some((class, method)) = key.split_once('.') {
                    let class = class.to_string();
                    let method = method.to_string();
                    if let Some(info) = self.classes.get_mut(&class) {
                        if let Some(m) = info.methods.get_mut(&method) {
                            m.return_type = final_ty;
                        }
                    }
                }
            }
        }
    }

    fn lookup_body(&self, key: &str) -> Option<Vec<Stmt>> {
        if let Some((class, method)) = key.split_once('.') {
            return self
                .classes
                .find_method(class, method)
                .map(|m| m.body.clone());
        }
        self.fn_bodies.get(key).cloned()
    }

    /// Record module-level assignment types so functions emitted before
    /// the entry point see global variable facts.
    fn seed_module_globals(&mut self, body: &[Stmt]) {
        for stmt in body {
            if let Stmt::Assign { targets, value } = stmt {
                if let Some(name) = targets.first().and_then(Expr::as_name) {
                    let ctx = InferCtx {
                        classes: &self.classes,
                        sigs: &self.sigs,
                        facts: &self.facts,
                        vars: &self.vars,
                    };
                    let ty = self.infer.infer_expr(value, &ctx);
                    self.infer.record_assignment(name, ty);
                }
            }
        }
    }

    /// Whether an expression folds at the target's compile time (and so
    /// may initialize a scope-0 global).
    fn is_const_expr(&mut self, expr: &Expr) -> bool {
        fn leaves_const(expr: &Expr) -> bool {
            match expr {
                Expr::Constant {
                    value: Const::Big { .. },
                } => false,
                Expr::Constant { .. } => true,
                Expr::UnaryOp {
                    op: UnaryOp::USub | UnaryOp::UAdd,
                    operand,
                } => leaves_const(operand),
                Expr::BinOp { left, op, right } => {
                    matches!(
                        op,
                        BinOp::Add
                            | BinOp::Sub
                            | BinOp::Mult
                            | BinOp::Div
                            | BinOp::Mod
                            | BinOp::FloorDiv
                            | BinOp::Pow
                    ) && leaves_const(left)
                        && leaves_const(right)
                }
                _ => false,
            }
        }
        if !leaves_const(expr) {
            return false;
        }
        // String algebra and big integers allocate at runtime even over
        // constant operands; only scalar results fold.
        match self.infer_ty(expr) {
            PyType::Int | PyType::Float | PyType::Bool => true,
            PyType::Str { .. } => expr.is_constant(),
            _ => false,
        }
    }
}

/// Record `self.x = value` field types into the class registry.
fn collect_field_stores(body: &[Stmt], generator: &mut ZigCodeGenerator, class: &str) {
    for stmt in body {
        match stmt {
            Stmt::Assign { targets, value } => {
                for target in targets {
                    if let Expr::Attribute { value: obj, attr } = target {
                        if obj.as_name() == Some("self") {
                            let ty = generator.infer_ty(value);
                            let ty = match ty {
                                PyType::Bottom => PyType::Unknown,
                                other => other,
                            };
                            if let Some(info) = generator.classes.get_mut(class) {
                                info.set_field(attr, ty);
                            }
                        }
                    }
                }
            }
            Stmt::If { body, orelse, .. } => {
                collect_field_stores(body, generator, class);
                collect_field_stores(orelse, generator, class);
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } => {
                collect_field_stores(body, generator, class);
            }
            _ => {}
        }
    }
}

/// Collect `(callee, args)` for every identifier call in the module.
fn collect_calls(body: &[Stmt], out: &mut Vec<(String, Vec<Expr>)>) {
    fn walk_expr(expr: &Expr, out: &mut Vec<(String, Vec<Expr>)>) {
        match expr {
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                if let Some(name) = func.as_name() {
                    out.push((name.to_string(), args.clone()));
                }
                walk_expr(func, out);
                for a in args {
                    walk_expr(a, out);
                }
                for Keyword { value, .. } in keywords {
                    walk_expr(value, out);
                }
            }
            Expr::BinOp { left, right, .. } => {
                walk_expr(left, out);
                walk_expr(right, out);
            }
            Expr::UnaryOp { operand, .. } => walk_expr(operand, out),
            Expr::BoolOp { values, .. } => {
                for v in values {
                    walk_expr(v, out);
                }
            }
            Expr::Compare {
                left, comparators, ..
            } => {
                walk_expr(left, out);
                for c in comparators {
                    walk_expr(c, out);
                }
            }
            Expr::Attribute { value, .. } | Expr::Starred { value } => walk_expr(value, out),
            Expr::Subscript { value, slice } => {
                walk_expr(value, out);
                if let Slice::Index { value: idx } = slice.as_ref() {
                    walk_expr(idx, out);
                }
            }
            Expr::Tuple { elts } | Expr::List { elts } | Expr::Set { elts } => {
                for e in elts {
                    walk_expr(e, out);
                }
            }
            Expr::Dict { keys, values } => {
                for k in keys.iter().flatten() {
                    walk_expr(k, out);
                }
                for v in values {
                    walk_expr(v, out);
                }
            }
            Expr::IfExp { test, body, orelse } => {
                walk_expr(test, out);
                walk_expr(body, out);
                walk_expr(orelse, out);
            }
            Expr::Lambda { body, .. } => walk_expr(body, out),
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                walk_expr(elt, out);
                for g in generators {
                    walk_expr(&g.iter, out);
                }
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                walk_expr(key, out);
                walk_expr(value, out);
                for g in generators {
                    walk_expr(&g.iter, out);
                }
            }
            Expr::Constant { .. } | Expr::Name { .. } => {}
        }
    }

    for stmt in body {
        match stmt {
            Stmt::Expr { value } => walk_expr(value, out),
            Stmt::Assign { value, .. } => walk_expr(value, out),
            Stmt::AugAssign { target, value, .. } => {
                walk_expr(target, out);
                walk_expr(value, out);
            }
            Stmt::Return { value } => {
                if let Some(v) = value {
                    walk_expr(v, out);
                }
            }
            Stmt::If { test, body, orelse } => {
                walk_expr(test, out);
                collect_calls(body, out);
                collect_calls(orelse, out);
            }
            Stmt::While { test, body } => {
                walk_expr(test, out);
                collect_calls(body, out);
            }
            Stmt::For { iter, body, .. } => {
                walk_expr(iter, out);
                collect_calls(body, out);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_calls(body, out);
                for h in handlers {
                    collect_calls(&h.body, out);
                }
                collect_calls(orelse, out);
                collect_calls(finalbody, out);
            }
            Stmt::FunctionDef { body, .. } | Stmt::ClassDef { body, .. } => {
                collect_calls(body, out);
            }
            Stmt::Raise { exc } => {
                if let Some(e) = exc {
                    walk_expr(e, out);
                }
            }
            _ => {}
        }
    }
}

/// Fold each `return` expression's type into the accumulator.
fn collect_return_types(
    body: &[Stmt],
    generator: &mut ZigCodeGenerator,
    ret: &mut PyType,
    saw_return: &mut bool,
) {
    for stmt in body {
        match stmt {
            Stmt::Return { value } => {
                *saw_return = true;
                match value {
                    Some(v) => {
                        let ty = generator.infer_ty(v);
                        *ret = ret.widen(&ty);
                    }
                    None => *ret = ret.widen(&PyType::NoneType),
                }
            }
            Stmt::If { body, orelse, .. } => {
                collect_return_types(body, generator, ret, saw_return);
                collect_return_types(orelse, generator, ret, saw_return);
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } => {
                collect_return_types(body, generator, ret, saw_return);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_return_types(body, generator, ret, saw_return);
                for h in handlers {
                    collect_return_types(&h.body, generator, ret, saw_return);
                }
                collect_return_types(orelse, generator, ret, saw_return);
                collect_return_types(finalbody, generator, ret, saw_return);
            }
            // Nested definitions own their returns.
            Stmt::FunctionDef { .. } | Stmt::ClassDef { .. } => {}
            _ => {}
        }
    }
}
