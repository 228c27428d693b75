//! Lambda and closure emission.
//!
//! Three compilation modes, tried in order:
//!
//! 1. Plain hoisted function: no captured free variables and no reference
//!    to a type declared inside the enclosing function. Emitted as a
//!    uniquely named top-level function, referenced as `&__lambda_N`.
//! 2. Capturing struct: free variables from an enclosing scope become
//!    fields of a synthesized struct whose `call` method holds the body;
//!    uses of the bound name go through `.call(...)`.
//! 3. Inline struct: the body references a class declared inside the
//!    enclosing function, so hoisting would put the type out of scope; the
//!    lambda becomes an anonymous struct expression.
//!
//! Parameter types are inferred from use sites: subscripting, arithmetic
//! against operands of known type, and method names that pin the receiver.

use super::ZigCodeGenerator;
use crate::call_graph::expr_facts;
use crate::registry::FunctionSig;
use crate::types::PyType;
use crate::CompileResult;
use pyzig_ast::{Arguments, BinOp, CmpOp, Expr};
use std::collections::HashSet;

const LIST_METHODS: &[&str] = &["append", "extend", "insert", "pop", "remove", "sort", "reverse"];
const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "split", "join", "replace", "startswith", "endswith",
];

/// Synthesized lambda value: its instantiation text plus enough typing for
/// the surrounding assignment to classify the binding.
#[derive(Debug)]
pub(crate) struct LambdaValue {
    pub text: String,
    /// Hoisted function name for mode 1.
    pub hoisted_name: Option<String>,
    /// Closure struct name for mode 2.
    pub closure_name: Option<String>,
    pub return_type: PyType,
}

impl ZigCodeGenerator {
    /// Emit a lambda in expression position.
    pub(crate) fn emit_lambda_expr(
        &mut self,
        args: &Arguments,
        body: &Expr,
    ) -> CompileResult<String> {
        Ok(self.emit_lambda_value(args, body)?.text)
    }

    /// Emit a lambda and report how it was compiled.
    pub(crate) fn emit_lambda_value(
        &mut self,
        args: &Arguments,
        body: &Expr,
    ) -> CompileResult<LambdaValue> {
        let captures = self.captured_variables(args, body);

        if self.references_nested_class(body) {
            return self.emit_inline_lambda(args, body);
        }
        if captures.is_empty() {
            self.emit_hoisted_lambda(args, body)
        } else {
            self.emit_capturing_struct(args, body, &captures)
        }
    }

    // ========== Mode 1: plain hoisted function ==========

    fn emit_hoisted_lambda(
        &mut self,
        args: &Arguments,
        body: &Expr,
    ) -> CompileResult<LambdaValue> {
        let name = format!("__lambda_{}", self.lambda_counter);
        self.lambda_counter += 1;
        self.stats.lambdas_hoisted += 1;

        let param_types = self.lambda_param_types(args, body);
        for (param, ty) in args.args.iter().zip(param_types.iter()) {
            self.infer.register_param(&param.arg, ty.clone());
        }
        let (allocates, errors) = expr_facts(body);
        let emitted = self.emit_lambda_body(body);
        for param in args.args.iter().rev() {
            self.infer.unregister_param(&param.arg);
        }
        let (body_text, return_type) = emitted?;

        let mut params = Vec::new();
        if allocates {
            params.push("__global_allocator: std.mem.Allocator".to_string());
        }
        for (param, ty) in args.args.iter().zip(param_types.iter()) {
            let used = expr_uses_name(body, &param.arg);
            let pname = if used {
                super::escape_ident(&param.arg)
            } else {
                "_".to_string()
            };
            params.push(format!("{}: {}", pname, ty.zig_type()));
        }

        let ret = zig_return_type(&return_type);
        let ret = if allocates || errors {
            format!("!{}", ret)
        } else {
            ret
        };
        let definition = format!(
            "fn {}({}) {} {{\n    return {};\n}}",
            name,
            params.join(", "),
            ret,
            body_text
        );
        self.hoisted.push(definition);

        let mut sig = FunctionSig::new(&name, args.args.iter().map(|a| a.arg.clone()).collect(),
            args.args.len());
        sig.needs_allocator = allocates;
        sig.returns_error = allocates || errors;
        sig.return_type = return_type.clone();
        self.sigs.insert(sig);

        Ok(LambdaValue {
            text: format!("&{}", name),
            hoisted_name: Some(name),
            closure_name: None,
            return_type,
        })
    }

    // ========== Mode 2: capturing struct ==========

    fn emit_capturing_struct(
        &mut self,
        args: &Arguments,
        body: &Expr,
        captures: &[String],
    ) -> CompileResult<LambdaValue> {
        let name = format!("__Closure_{}", self.closure_counter);
        self.closure_counter += 1;
        self.stats.closures_synthesized += 1;

        // Field types come from the enclosing scope's bindings.
        let capture_types: Vec<(String, PyType)> = captures
            .iter()
            .map(|c| {
                let ty = self
                    .infer
                    .infer_expr_scoped(
                        &Expr::name(c),
                        &crate::infer::InferCtx {
                            classes: &self.classes,
                            sigs: &self.sigs,
                            facts: &self.facts,
                            vars: &self.vars,
                        },
                    );
                (c.clone(), ty)
            })
            .collect();

        let param_types = self.lambda_param_types(args, body);
        for (param, ty) in args.args.iter().zip(param_types.iter()) {
            self.infer.register_param(&param.arg, ty.clone());
        }
        for (capture, ty) in &capture_types {
            self.infer.register_param(capture, ty.clone());
        }

        // Captured names read through `self.` inside the call body.
        for (capture, _) in &capture_types {
            self.param_renames
                .push((capture.clone(), format!("self.{}", super::escape_ident(capture))));
        }
        let emitted = self.emit_lambda_body(body);
        for _ in &capture_types {
            self.param_renames.pop();
        }
        for (capture, _) in capture_types.iter().rev() {
            self.infer.unregister_param(capture);
        }
        for param in args.args.iter().rev() {
            self.infer.unregister_param(&param.arg);
        }
        let (body_text, return_type) = emitted?;

        let mut fields = String::new();
        for (capture, ty) in &capture_types {
            fields.push_str(&format!(
                "    {}: {},\n",
                super::escape_ident(capture),
                ty.zig_type()
            ));
        }
        let mut params = vec!["self: @This()".to_string()];
        for (param, ty) in args.args.iter().zip(param_types.iter()) {
            let used = expr_uses_name(body, &param.arg);
            let pname = if used {
                super::escape_ident(&param.arg)
            } else {
                "_".to_string()
            };
            params.push(format!("{}: {}", pname, ty.zig_type()));
        }

        let definition = format!(
            "const {} = struct {{\n{}    pub fn call({}) {} {{\n        return {};\n    }}\n}};",
            name,
            fields,
            params.join(", "),
            zig_return_type(&return_type),
            body_text
        );
        self.hoisted.push(definition);

        self.vars
            .closure_call_returns
            .insert(name.clone(), return_type.clone());

        let inits: Vec<String> = capture_types
            .iter()
            .map(|(c, _)| {
                format!(
                    ".{} = {}",
                    super::escape_ident(c),
                    self.resolve_name(c)
                )
            })
            .collect();
        Ok(LambdaValue {
            text: format!("{}{{ {} }}", name, inits.join(", ")),
            hoisted_name: None,
            closure_name: Some(name),
            return_type,
        })
    }

    // ========== Mode 3: inline struct lambda ==========

    fn emit_inline_lambda(
        &mut self,
        args: &Arguments,
        body: &Expr,
    ) -> CompileResult<LambdaValue> {
        let param_types = self.lambda_param_types(args, body);
        for (param, ty) in args.args.iter().zip(param_types.iter()) {
            self.infer.register_param(&param.arg, ty.clone());
        }
        let emitted = self.emit_lambda_body(body);
        for param in args.args.iter().rev() {
            self.infer.unregister_param(&param.arg);
        }
        let (body_text, return_type) = emitted?;

        let params: Vec<String> = args
            .args
            .iter()
            .zip(param_types.iter())
            .map(|(param, ty)| {
                let used = expr_uses_name(body, &param.arg);
                let pname = if used {
                    super::escape_ident(&param.arg)
                } else {
                    "_".to_string()
                };
                format!("{}: {}", pname, ty.zig_type())
            })
            .collect();
        Ok(LambdaValue {
            text: format!(
                "(struct {{ fn call({}) {} {{ return {}; }} }}).call",
                params.join(", "),
                zig_return_type(&return_type),
                body_text
            ),
            hoisted_name: None,
            closure_name: None,
            return_type,
        })
    }

    /// Emit a lambda body at function scope.
    ///
    /// A body that is itself a lambda (a factory) is synthesized first so
    /// the enclosing function's return type can name the closure struct.
    fn emit_lambda_body(&mut self, body: &Expr) -> CompileResult<(String, PyType)> {
        let outer_scope = self.scope_depth;
        self.scope_depth += 1;
        let result = if let Expr::Lambda { args, body: inner } = body {
            self.emit_lambda_value(args, inner).map(|lv| {
                let ty = lv
                    .closure_name
                    .as_ref()
                    .map(|n| PyType::Closure(n.clone()))
                    .unwrap_or(lv.return_type.clone());
                (lv.text, ty)
            })
        } else {
            let ty = self.infer_ty(body);
            self.emit_expr(body).map(|text| (text, ty))
        };
        self.scope_depth = outer_scope;
        result
    }

    // ========== Analysis ==========

    /// Free variables of the lambda that resolve in an enclosing function
    /// scope (module globals stay visible to hoisted functions and are not
    /// captured).
    fn captured_variables(&self, args: &Arguments, body: &Expr) -> Vec<String> {
        let params: HashSet<&str> = args.args.iter().map(|a| a.arg.as_str()).collect();
        let mut seen = HashSet::new();
        let mut captures = Vec::new();
        let mut names = Vec::new();
        collect_expr_names(body, &mut names);
        for name in names {
            if params.contains(name.as_str()) || !seen.insert(name.clone()) {
                continue;
            }
            let in_function_scope = self
                .current_function
                .as_ref()
                .and_then(|f| self.infer.locals.get(f))
                .is_some_and(|env| env.contains_key(&name));
            if in_function_scope || self.infer.has_param(&name) {
                captures.push(name);
            }
        }
        captures
    }

    fn references_nested_class(&self, body: &Expr) -> bool {
        let mut names = Vec::new();
        collect_expr_names(body, &mut names);
        names
            .iter()
            .any(|n| self.facts.nested_class_names.contains(n))
    }

    /// Infer each parameter's type from how the body uses it.
    fn lambda_param_types(&mut self, args: &Arguments, body: &Expr) -> Vec<PyType> {
        args.args
            .iter()
            .map(|param| {
                let ty = self.param_type_from_uses(body, &param.arg);
                if matches!(ty, PyType::Unknown) {
                    self.warnings.push(format!(
                        "lambda parameter `{}` has no inferable type, defaulting to int",
                        param.arg
                    ));
                    PyType::Int
                } else {
                    ty
                }
            })
            .collect()
    }

    fn param_type_from_uses(&mut self, expr: &Expr, name: &str) -> PyType {
        let mut ty = PyType::Bottom;
        self.walk_param_uses(expr, name, &mut ty);
        match ty {
            PyType::Bottom => PyType::Unknown,
            other => other,
        }
    }

    fn walk_param_uses(&mut self, expr: &Expr, name: &str, ty: &mut PyType) {
        match expr {
            Expr::BinOp { left, op, right } => {
                let involves = left.as_name() == Some(name) || right.as_name() == Some(name);
                if involves {
                    let other = if left.as_name() == Some(name) {
                        right
                    } else {
                        left
                    };
                    let other_ty = self.infer_ty(other);
                    if other_ty.is_numeric() || other_ty.is_str() {
                        *ty = ty.widen(&other_ty);
                    } else if matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mult) {
                        *ty = ty.widen(&PyType::Int);
                    }
                }
                self.walk_param_uses(left, name, ty);
                self.walk_param_uses(right, name, ty);
            }
            Expr::Compare {
                left, comparators, ops,
            } => {
                let mut lhs: &Expr = left;
                for (op, rhs) in ops.iter().zip(comparators.iter()) {
                    if !matches!(op, CmpOp::In | CmpOp::NotIn) {
                        if lhs.as_name() == Some(name) {
                            let other_ty = self.infer_ty(rhs);
                            if other_ty.is_numeric() || other_ty.is_str() {
                                *ty = ty.widen(&other_ty);
                            }
                        } else if rhs.as_name() == Some(name) {
                            let other_ty = self.infer_ty(lhs);
                            if other_ty.is_numeric() || other_ty.is_str() {
                                *ty = ty.widen(&other_ty);
                            }
                        }
                    }
                    lhs = rhs;
                }
                self.walk_param_uses(left, name, ty);
                for c in comparators {
                    self.walk_param_uses(c, name, ty);
                }
            }
            Expr::Subscript { value, slice } => {
                if value.as_name() == Some(name) {
                    // Subscripting pins the parameter to a sequence.
                    *ty = ty.widen(&PyType::list_of(PyType::Unknown));
                }
                self.walk_param_uses(value, name, ty);
                if let pyzig_ast::Slice::Index { value: idx } = slice.as_ref() {
                    self.walk_param_uses(idx, name, ty);
                }
            }
            Expr::Call { func, args, .. } => {
                if let Expr::Attribute { value, attr } = func.as_ref() {
                    if value.as_name() == Some(name) {
                        if STR_METHODS.contains(&attr.as_str()) {
                            *ty = ty.widen(&PyType::runtime_str());
                        } else if LIST_METHODS.contains(&attr.as_str()) {
                            *ty = ty.widen(&PyType::list_of(PyType::Unknown));
                        }
                    }
                    self.walk_param_uses(value, name, ty);
                }
                for a in args {
                    self.walk_param_uses(a, name, ty);
                }
            }
            Expr::UnaryOp { operand, .. } => {
                if operand.as_name() == Some(name) {
                    *ty = ty.widen(&PyType::Int);
                }
                self.walk_param_uses(operand, name, ty);
            }
            Expr::IfExp { test, body, orelse } => {
                self.walk_param_uses(test, name, ty);
                self.walk_param_uses(body, name, ty);
                self.walk_param_uses(orelse, name, ty);
            }
            Expr::BoolOp { values, .. } => {
                for v in values {
                    self.walk_param_uses(v, name, ty);
                }
            }
            Expr::Attribute { value, .. } | Expr::Starred { value } => {
                self.walk_param_uses(value, name, ty);
            }
            Expr::Tuple { elts } | Expr::List { elts } | Expr::Set { elts } => {
                for e in elts {
                    self.walk_param_uses(e, name, ty);
                }
            }
            Expr::Lambda { body, .. } => self.walk_param_uses(body, name, ty),
            _ => {}
        }
    }
}

/// Zig return type text, mapping `None` to `void`.
fn zig_return_type(ty: &PyType) -> String {
    match ty {
        PyType::NoneType | PyType::Bottom => "void".to_string(),
        other => other.zig_type(),
    }
}

/// Collect every name referenced in an expression.
pub(crate) fn collect_expr_names(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Name { id } => out.push(id.clone()),
        Expr::BinOp { left, right, .. } => {
            collect_expr_names(left, out);
            collect_expr_names(right, out);
        }
        Expr::UnaryOp { operand, .. } => collect_expr_names(operand, out),
        Expr::BoolOp { values, .. } => {
            for v in values {
                collect_expr_names(v, out);
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            collect_expr_names(left, out);
            for c in comparators {
                collect_expr_names(c, out);
            }
        }
        Expr::Call { func, args, keywords } => {
            // A called bare name is a function reference, not a capture,
            // unless it is a local binding; keep it and let the capture
            // filter decide.
            collect_expr_names(func, out);
            for a in args {
                collect_expr_names(a, out);
            }
            for kw in keywords {
                collect_expr_names(&kw.value, out);
            }
        }
        Expr::Attribute { value, .. } | Expr::Starred { value } => collect_expr_names(value, out),
        Expr::Subscript { value, slice } => {
            collect_expr_names(value, out);
            collect_slice_names(slice, out);
        }
        Expr::Tuple { elts } | Expr::List { elts } | Expr::Set { elts } => {
            for e in elts {
                collect_expr_names(e, out);
            }
        }
        Expr::Dict { keys, values } => {
            for k in keys.iter().flatten() {
                collect_expr_names(k, out);
            }
            for v in values {
                collect_expr_names(v, out);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            collect_expr_names(test, out);
            collect_expr_names(body, out);
            collect_expr_names(orelse, out);
        }
        Expr::Lambda { args, body } => {
            // Inner lambda params shadow; filter them out of its free names.
            let mut inner = Vec::new();
            collect_expr_names(body, &mut inner);
            let params: HashSet<&str> = args.args.iter().map(|a| a.arg.as_str()).collect();
            out.extend(inner.into_iter().filter(|n| !params.contains(n.as_str())));
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            collect_expr_names(elt, out);
            for g in generators {
                collect_expr_names(&g.iter, out);
                for i in &g.ifs {
                    collect_expr_names(i, out);
                }
            }
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            collect_expr_names(key, out);
            collect_expr_names(value, out);
            for g in generators {
                collect_expr_names(&g.iter, out);
                for i in &g.ifs {
                    collect_expr_names(i, out);
                }
            }
        }
        Expr::Constant { .. } => {}
    }
}

fn collect_slice_names(slice: &pyzig_ast::Slice, out: &mut Vec<String>) {
    match slice {
        pyzig_ast::Slice::Index { value } => collect_expr_names(value, out),
        pyzig_ast::Slice::Slice { lower, upper, step } => {
            for bound in [lower, upper, step].into_iter().flatten() {
                collect_expr_names(bound, out);
            }
        }
        pyzig_ast::Slice::ExtSlice { dims } => {
            for dim in dims {
                collect_slice_names(dim, out);
            }
        }
    }
}

/// Whether the body reads the given name.
fn expr_uses_name(expr: &Expr, name: &str) -> bool {
    let mut names = Vec::new();
    collect_expr_names(expr, &mut names);
    names.iter().any(|n| n == name)
}
