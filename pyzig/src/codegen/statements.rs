//! Statement emission.

use super::ZigCodeGenerator;
use crate::registry::VarClasses;
use crate::types::PyType;
use crate::{CompileError, CompileResult};
use pyzig_ast::{Arguments, BinOp, Const, Expr, Slice, Stmt};
use std::collections::HashSet;

impl ZigCodeGenerator {
    pub(crate) fn emit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expr { value } => self.emit_expr_stmt(value),
            Stmt::Assign { targets, value } => self.emit_assign(targets, value),
            Stmt::AugAssign { target, op, value } => self.emit_aug_assign(target, *op, value),
            Stmt::Return { value } => self.emit_return(value.as_ref()),
            Stmt::If { test, body, orelse } => self.emit_if(test, body, orelse),
            Stmt::While { test, body } => self.emit_while(test, body),
            Stmt::For { target, iter, body } => self.emit_for(target, iter, body),
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => self.emit_try(body, handlers, orelse, finalbody),
            Stmt::Raise { exc } => self.emit_raise(exc.as_ref()),
            Stmt::FunctionDef {
                name,
                args,
                body,
                decorator_list,
                is_async,
            } => self.emit_function(name, args, body, decorator_list, *is_async),
            Stmt::ClassDef { name, bases, body } => self.emit_class(name, bases, body),
            Stmt::Import { .. } | Stmt::ImportFrom { .. } => Ok(()),
            Stmt::Pass => Ok(()),
            Stmt::Break => {
                self.write_line("break;");
                Ok(())
            }
            Stmt::Continue => {
                self.write_line("continue;");
                Ok(())
            }
        }
    }

    pub(crate) fn emit_body(&mut self, body: &[Stmt]) -> CompileResult<()> {
        for (i, stmt) in body.iter().enumerate() {
            // A leading bare string is a docstring, not code.
            if i == 0 {
                if let Stmt::Expr {
                    value:
                        Expr::Constant {
                            value: Const::Str(_),
                        },
                } = stmt
                {
                    continue;
                }
            }
            self.emit_stmt(stmt)?;
        }
        Ok(())
    }

    fn emit_expr_stmt(&mut self, value: &Expr) -> CompileResult<()> {
        let ty = self.infer_ty(value);
        let text = self.emit_expr(value)?;
        if matches!(ty, PyType::NoneType | PyType::Bottom) {
            self.write_line(&format!("{};", text));
        } else {
            self.write_line(&format!("_ = {};", text));
        }
        Ok(())
    }

    // ========== Assignment ==========

    fn emit_assign(&mut self, targets: &[Expr], value: &Expr) -> CompileResult<()> {
        if targets.len() > 1 {
            // `a = b = expr` evaluates once.
            let ty = self.infer_ty(value);
            let text = self.emit_expr(value)?;
            let tmp = self.next_tmp("chain");
            self.write_line(&format!("const {} = {};", tmp, text));
            for target in targets {
                self.emit_store(target, tmp.clone(), &ty)?;
            }
            return Ok(());
        }
        let target = &targets[0];

        // Lambda bindings pick their compilation mode here.
        if let Expr::Lambda { args, body } = value {
            if let Some(name) = target.as_name() {
                let name = name.to_string();
                let lv = self.emit_lambda_value(args, body)?;
                if let Some(hoisted) = &lv.hoisted_name {
                    self.vars.lambda_vars.insert(name.clone());
                    self.vars
                        .lambda_targets
                        .insert(name.clone(), hoisted.clone());
                } else if lv.closure_name.is_some() {
                    self.vars.closure_vars.insert(name.clone());
                }
                self.vars
                    .lambda_returns
                    .insert(name.clone(), lv.return_type.clone());
                let var_ty = lv
                    .closure_name
                    .as_ref()
                    .map(|n| PyType::Closure(n.clone()))
                    .unwrap_or(PyType::Unknown);
                self.infer.record_assignment(&name, var_ty);
                self.declared_vars.insert(name.clone());
                self.write_line(&format!(
                    "const {} = {};",
                    super::escape_ident(&name),
                    lv.text
                ));
                return Ok(());
            }
        }

        // An empty list binding uses the element type seeded from later
        // appends rather than the bare literal's unknown element.
        if let Some(n) = target.as_name() {
            if matches!(value, Expr::List { elts } if elts.is_empty()) {
                let seeded = self
                    .current_function
                    .as_ref()
                    .and_then(|f| self.infer.locals.get(f))
                    .and_then(|env| env.get(n))
                    .cloned();
                if let Some(ty @ PyType::List(_)) = seeded {
                    let text = format!("{}.init({})", ty.zig_type(), self.allocator_name());
                    return self.emit_store(target, text, &ty);
                }
            }
        }

        let ty = self.infer_ty(value);
        let text = self.emit_expr(value)?;
        self.emit_store(target, text, &ty)
    }

    /// Store `text` (of inferred type `ty`) into an assignment target.
    fn emit_store(&mut self, target: &Expr, text: String, ty: &PyType) -> CompileResult<()> {
        match target {
            Expr::Name { id } => {
                self.infer.record_assignment(id, ty.clone());
                let escaped = self.resolve_name(id);
                if self.declared_vars.contains(id) {
                    self.write_line(&format!("{} = {};", escaped, text));
                } else {
                    self.declared_vars.insert(id.to_string());
                    let keyword = if self.mutable_vars.contains(id) {
                        "var"
                    } else {
                        "const"
                    };
                    if matches!(ty, PyType::Unknown | PyType::Bottom) {
                        self.write_line(&format!("{} {} = {};", keyword, escaped, text));
                    } else {
                        self.write_line(&format!(
                            "{} {}: {} = {};",
                            keyword,
                            escaped,
                            ty.zig_type(),
                            text
                        ));
                    }
                }
                Ok(())
            }
            Expr::Attribute { value, attr } => {
                let obj = self.emit_operand(value)?;
                self.write_line(&format!(
                    "{}.{} = {};",
                    obj,
                    super::escape_ident(attr),
                    text
                ));
                Ok(())
            }
            Expr::Subscript { value, slice } => self.emit_subscript_store(value, slice, text),
            Expr::Tuple { elts } => {
                // Unpacking: bind the tuple once, then each element.
                let tmp = self.next_tmp("unpack");
                self.write_line(&format!("const {} = {};", tmp, text));
                let item_types = match ty {
                    PyType::Tuple(items) => items.clone(),
                    _ => vec![PyType::Unknown; elts.len()],
                };
                for (i, elt) in elts.iter().enumerate() {
                    let item_ty = item_types.get(i).cloned().unwrap_or(PyType::Unknown);
                    self.emit_store(elt, format!("{}[{}]", tmp, i), &item_ty)?;
                }
                Ok(())
            }
            other => Err(CompileError::Node {
                node: "Assign",
                message: format!("unsupported assignment target `{}`", other.kind()),
            }),
        }
    }

    fn emit_subscript_store(
        &mut self,
        value: &Expr,
        slice: &Slice,
        text: String,
    ) -> CompileResult<()> {
        let receiver_ty = self.infer_ty(value);
        let Slice::Index { value: idx } = slice else {
            return Err(CompileError::Node {
                node: "Assign",
                message: "cannot assign into a slice".to_string(),
            });
        };
        match receiver_ty {
            PyType::List(_) => {
                let list = self.emit_operand(value)?;
                if let Some(i) = idx.as_int() {
                    if i < 0 {
                        self.write_line(&format!(
                            "{l}.items[{l}.items.len - {k}] = {v};",
                            l = list,
                            k = -i,
                            v = text
                        ));
                    } else {
                        self.write_line(&format!("{}.items[{}] = {};", list, i, text));
                    }
                } else {
                    // Dynamic-index stores normalize length-relative and
                    // carry the same bounds check as reads.
                    let idx_ty = self.infer_ty(idx);
                    let idx_text = self.emit_operand(idx)?;
                    let idx_text = self.coerce(idx_text, &idx_ty, &PyType::Int);
                    let seq = self.next_tmp("seq");
                    let i = self.next_tmp("i");
                    let len = self.next_tmp("len");
                    let real = self.next_tmp("real");
                    let err = if self.scope_depth == 0 {
                        "unreachable".to_string()
                    } else {
                        self.raise_error("IndexError")
                    };
                    self.write_line(&format!(
                        "{{ const {seq} = {list}; const {i}: i64 = {idx}; const {len}: i64 = @intCast({seq}.items.len); const {real}: i64 = if ({i} < 0) {len} + {i} else {i}; if ({real} < 0 or {real} >= {len}) {err}; {seq}.items[@intCast({real})] = {v}; }}",
                        seq = seq,
                        list = list,
                        i = i,
                        idx = idx_text,
                        len = len,
                        real = real,
                        err = err,
                        v = text
                    ));
                }
                Ok(())
            }
            PyType::Dict { key, .. } => {
                let map = self.emit_operand(value)?;
                let idx_ty = self.infer_ty(idx);
                let k = self.emit_operand(idx)?;
                let k = self.coerce(k, &idx_ty, &key);
                self.write_line(&format!(
                    "{}.put({}, {}) catch unreachable;",
                    map, k, text
                ));
                Ok(())
            }
            PyType::NumpyArray => {
                let array = self.emit_operand(value)?;
                let i = self.emit_operand(idx)?;
                let call = format!("runtime.setIndex({}, {}, {})", array, i, text);
                let wrapped = self.fallible(call);
                self.write_line(&format!("_ = {};", wrapped));
                Ok(())
            }
            _ => Err(CompileError::Node {
                node: "Assign",
                message: "unsupported subscript store target".to_string(),
            }),
        }
    }

    fn emit_aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr) -> CompileResult<()> {
        // Read-modify-write through the general binop path so BigInt and
        // string routing apply.
        let combined = self.emit_binop(target, op, value)?;
        let ty = self.infer_ty(target);
        let new_ty = {
            let value_ty = self.infer_ty(value);
            crate::infer::numeric_result(op, &ty, &value_ty, value)
        };
        match target {
            Expr::Name { id } => {
                self.infer.record_assignment(id, new_ty);
                self.write_line(&format!("{} = {};", self.resolve_name(id), combined));
                Ok(())
            }
            Expr::Attribute { value: obj, attr } => {
                let obj = self.emit_operand(obj)?;
                self.write_line(&format!(
                    "{}.{} = {};",
                    obj,
                    super::escape_ident(attr),
                    combined
                ));
                Ok(())
            }
            Expr::Subscript { value: recv, slice } => {
                self.emit_subscript_store(recv, slice, combined)
            }
            other => Err(CompileError::Node {
                node: "AugAssign",
                message: format!("unsupported target `{}`", other.kind()),
            }),
        }
    }

    // ========== Control flow ==========

    fn emit_if(&mut self, test: &Expr, body: &[Stmt], orelse: &[Stmt]) -> CompileResult<()> {
        let cond = self.emit_truthy(test)?;
        self.write_line(&format!("if ({}) {{", cond));
        self.indent();
        self.emit_body(body)?;
        self.dedent();
        if orelse.is_empty() {
            self.write_line("}");
        } else {
            self.write_line("} else {");
            self.indent();
            self.emit_body(orelse)?;
            self.dedent();
            self.write_line("}");
        }
        Ok(())
    }

    fn emit_while(&mut self, test: &Expr, body: &[Stmt]) -> CompileResult<()> {
        let cond = self.emit_truthy(test)?;
        self.write_line(&format!("while ({}) {{", cond));
        self.indent();
        self.emit_body(body)?;
        self.dedent();
        self.write_line("}");
        Ok(())
    }

    fn emit_for(&mut self, target: &Expr, iter: &Expr, body: &[Stmt]) -> CompileResult<()> {
        // Loop targets ride the parameter scope for the body's inference.
        let elem_ty = self.iter_element_ty(iter);
        let mut bound = Vec::new();
        match target {
            Expr::Name { id } => {
                self.infer.register_param(id, elem_ty.clone());
                bound.push(id.clone());
            }
            Expr::Tuple { elts } => {
                for (i, t) in elts.iter().enumerate() {
                    if let Some(name) = t.as_name() {
                        let ty = match &elem_ty {
                            PyType::Tuple(items) => {
                                items.get(i).cloned().unwrap_or(PyType::Unknown)
                            }
                            _ => PyType::Unknown,
                        };
                        self.infer.register_param(name, ty);
                        bound.push(name.to_string());
                    }
                }
            }
            _ => {}
        }

        let result = self.emit_for_inner(target, iter, body);
        for name in bound.iter().rev() {
            self.infer.unregister_param(name);
        }
        result
    }

    fn emit_for_inner(&mut self, target: &Expr, iter: &Expr, body: &[Stmt]) -> CompileResult<()> {
        // range(...) compiles to a counting loop inside its own block so
        // the counter name cannot collide across sibling loops.
        if let Expr::Call { func, args, .. } = iter {
            if func.as_name() == Some("range") {
                let name = target
                    .as_name()
                    .map(super::escape_ident)
                    .unwrap_or_else(|| "_".to_string());
                let (start, stop, step, cmp) = self.range_parts(args)?;
                self.write_line("{");
                self.indent();
                self.write_line(&format!("var {}: i64 = {};", name, start));
                self.write_line(&format!(
                    "while ({} {} {}) : ({} += {}) {{",
                    name, cmp, stop, name, step
                ));
                self.indent();
                self.emit_body(body)?;
                self.dedent();
                self.write_line("}");
                self.dedent();
                self.write_line("}");
                return Ok(());
            }
            if func.as_name() == Some("enumerate") {
                if let (Some(arg), Expr::Tuple { elts }) = (args.first(), target) {
                    if let [idx, val] = elts.as_slice() {
                        let seq = self.emit_operand(arg)?;
                        let idx_name = idx
                            .as_name()
                            .map(super::escape_ident)
                            .unwrap_or_else(|| "_".to_string());
                        let val_name = val
                            .as_name()
                            .map(super::escape_ident)
                            .unwrap_or_else(|| "_".to_string());
                        self.write_line(&format!(
                            "for ({}.items, 0..) |{}, {}| {{",
                            seq, val_name, idx_name
                        ));
                        self.indent();
                        self.emit_body(body)?;
                        self.dedent();
                        self.write_line("}");
                        return Ok(());
                    }
                }
            }
            if func.as_name() == Some("zip") {
                if let Expr::Tuple { elts } = target {
                    if elts.len() == args.len() && !args.is_empty() {
                        let mut seqs = Vec::new();
                        for a in args {
                            let s = self.emit_operand(a)?;
                            seqs.push(format!("{}.items", s));
                        }
                        let names: Vec<String> = elts
                            .iter()
                            .map(|e| {
                                e.as_name()
                                    .map(super::escape_ident)
                                    .unwrap_or_else(|| "_".to_string())
                            })
                            .collect();
                        self.write_line(&format!(
                            "for ({}) |{}| {{",
                            seqs.join(", "),
                            names.join(", ")
                        ));
                        self.indent();
                        self.emit_body(body)?;
                        self.dedent();
                        self.write_line("}");
                        return Ok(());
                    }
                }
            }
            if let Expr::Attribute { value, attr } = func.as_ref() {
                if attr == "items" {
                    if let Expr::Tuple { elts } = target {
                        if let [k, v] = elts.as_slice() {
                            let map = self.emit_operand(value)?;
                            let it = self.next_tmp("it");
                            let entry = self.next_tmp("entry");
                            let k_name = k
                                .as_name()
                                .map(super::escape_ident)
                                .unwrap_or_else(|| "_".to_string());
                            let v_name = v
                                .as_name()
                                .map(super::escape_ident)
                                .unwrap_or_else(|| "_".to_string());
                            self.write_line("{");
                            self.indent();
                            self.write_line(&format!("var {} = {}.iterator();", it, map));
                            self.write_line(&format!("while ({}.next()) |{}| {{", it, entry));
                            self.indent();
                            self.write_line(&format!("const {} = {}.key_ptr.*;", k_name, entry));
                            self.write_line(&format!(
                                "const {} = {}.value_ptr.*;",
                                v_name, entry
                            ));
                            self.emit_body(body)?;
                            self.dedent();
                            self.write_line("}");
                            self.dedent();
                            self.write_line("}");
                            return Ok(());
                        }
                    }
                }
                if attr == "keys" || attr == "values" {
                    let map = self.emit_operand(value)?;
                    let it = self.next_tmp("it");
                    let ptr = self.next_tmp("ptr");
                    let name = target
                        .as_name()
                        .map(super::escape_ident)
                        .unwrap_or_else(|| "_".to_string());
                    let iter_fn = if attr == "keys" {
                        "keyIterator"
                    } else {
                        "valueIterator"
                    };
                    self.write_line("{");
                    self.indent();
                    self.write_line(&format!("var {} = {}.{}();", it, map, iter_fn));
                    self.write_line(&format!("while ({}.next()) |{}| {{", it, ptr));
                    self.indent();
                    self.write_line(&format!("const {} = {}.*;", name, ptr));
                    self.emit_body(body)?;
                    self.dedent();
                    self.write_line("}");
                    self.dedent();
                    self.write_line("}");
                    return Ok(());
                }
            }
        }

        let iter_ty = self.infer_ty(iter);
        let name = target
            .as_name()
            .map(super::escape_ident)
            .unwrap_or_else(|| "_".to_string());
        match iter_ty {
            PyType::Str { .. } => {
                let s = self.emit_operand(iter)?;
                let i = self.next_tmp("i");
                self.write_line("{");
                self.indent();
                self.write_line(&format!("var {}: usize = 0;", i));
                self.write_line(&format!(
                    "while ({i} < {s}.len) : ({i} += 1) {{",
                    i = i,
                    s = s
                ));
                self.indent();
                self.write_line(&format!(
                    "const {} = {s}[{i}..{i} + 1];",
                    name,
                    s = s,
                    i = i
                ));
                self.emit_body(body)?;
                self.dedent();
                self.write_line("}");
                self.dedent();
                self.write_line("}");
                Ok(())
            }
            PyType::Dict { .. } | PyType::Set(_) => {
                let map = self.emit_operand(iter)?;
                let it = self.next_tmp("it");
                let ptr = self.next_tmp("ptr");
                self.write_line("{");
                self.indent();
                self.write_line(&format!("var {} = {}.keyIterator();", it, map));
                self.write_line(&format!("while ({}.next()) |{}| {{", it, ptr));
                self.indent();
                self.write_line(&format!("const {} = {}.*;", name, ptr));
                self.emit_body(body)?;
                self.dedent();
                self.write_line("}");
                self.dedent();
                self.write_line("}");
                Ok(())
            }
            _ => {
                let seq = self.emit_operand(iter)?;
                self.write_line(&format!("for ({}.items) |{}| {{", seq, name));
                self.indent();
                self.emit_body(body)?;
                self.dedent();
                self.write_line("}");
                Ok(())
            }
        }
    }

    /// `(start, stop, step, comparison)` parts of a `range(...)` call.
    fn range_parts(
        &mut self,
        args: &[Expr],
    ) -> CompileResult<(String, String, String, &'static str)> {
        match args {
            [stop] => Ok((
                "0".to_string(),
                self.emit_operand(stop)?,
                "1".to_string(),
                "<",
            )),
            [start, stop] => Ok((
                self.emit_operand(start)?,
                self.emit_operand(stop)?,
                "1".to_string(),
                "<",
            )),
            [start, stop, step] => {
                let cmp = match step.as_int() {
                    Some(s) if s < 0 => ">",
                    _ => "<",
                };
                Ok((
                    self.emit_operand(start)?,
                    self.emit_operand(stop)?,
                    self.emit_operand(step)?,
                    cmp,
                ))
            }
            _ => Err(CompileError::Node {
                node: "Call",
                message: "range() takes 1 to 3 arguments".to_string(),
            }),
        }
    }

    // ========== Return / raise / try ==========

    fn emit_return(&mut self, value: Option<&Expr>) -> CompileResult<()> {
        match value {
            None
            | Some(Expr::Constant {
                value: Const::None,
            }) => {
                self.write_line("return;");
            }
            Some(v) => {
                let ty = self.infer_ty(v);
                let text = self.emit_expr(v)?;
                let expected = self
                    .current_function
                    .as_ref()
                    .and_then(|f| self.sigs.get(f))
                    .map(|s| s.return_type.clone())
                    .unwrap_or(PyType::Unknown);
                let text = if expected.is_numeric() {
                    self.coerce(text, &ty, &expected)
                } else {
                    text
                };
                self.write_line(&format!("return {};", text));
            }
        }
        Ok(())
    }

    fn emit_raise(&mut self, exc: Option<&Expr>) -> CompileResult<()> {
        let tag = match exc {
            Some(Expr::Call { func, .. }) => func.as_name().unwrap_or("Exception").to_string(),
            Some(Expr::Name { id }) => id.clone(),
            _ => "Exception".to_string(),
        };
        match &self.error_label {
            Some(label) => self.write_line(&format!("break :{};", label)),
            None => self.write_line(&format!("return error.{};", tag)),
        }
        Ok(())
    }

    /// Two-label lowering: fallible operations in the body break to the
    /// inner label, which falls through into the handler; a normal exit
    /// breaks past it.
    fn emit_try(
        &mut self,
        body: &[Stmt],
        handlers: &[pyzig_ast::ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> CompileResult<()> {
        let ok_label = format!("__ok_{}", self.next_label_index());
        let err_label = format!("__err_{}", self.next_label_index());

        if handlers.len() > 1 {
            self.warnings
                .push("multiple except clauses run the first handler body".to_string());
        }

        self.write_line(&format!("{}: {{", ok_label));
        self.indent();
        self.write_line(&format!("{}: {{", err_label));
        self.indent();

        let saved = self.error_label.replace(err_label.clone());
        let body_result = self.emit_body(body);
        self.error_label = saved;
        body_result?;

        // No error: the else clause runs, then control skips the handler.
        self.emit_body(orelse)?;
        self.write_line(&format!("break :{};", ok_label));
        self.dedent();
        self.write_line("}");

        if let Some(handler) = handlers.first() {
            self.emit_body(&handler.body)?;
        }
        self.dedent();
        self.write_line("}");

        self.emit_body(finalbody)?;
        Ok(())
    }

    // ========== Functions ==========

    pub(crate) fn emit_function(
        &mut self,
        name: &str,
        args: &Arguments,
        body: &[Stmt],
        decorator_list: &[Expr],
        is_async: bool,
    ) -> CompileResult<()> {
        let _ = decorator_list;
        let sig_key = match &self.current_class {
            Some(class) => format!("{}.{}", class, name),
            None => name.to_string(),
        };
        if !self.sigs.contains(&sig_key) {
            return Err(CompileError::Internal(format!(
                "function `{}` missing from the signature table",
                sig_key
            )));
        }

        // Nested function definitions hoist to module level.
        let nested = self.scope_depth > 0 && self.current_class.is_none();
        let saved_out = if nested {
            Some(std::mem::take(&mut self.out))
        } else {
            None
        };
        let saved_indent = self.indent_level;
        if nested {
            self.indent_level = 0;
        }

        let saved_function = self.infer.current_function.replace(sig_key.clone());
        let saved_current = self.current_function.replace(sig_key.clone());
        let saved_declared = std::mem::take(&mut self.declared_vars);
        let saved_mutable = std::mem::take(&mut self.mutable_vars);
        let saved_vars = std::mem::replace(&mut self.vars, VarClasses::default());
        self.scope_depth += 1;

        let result = self.emit_function_inner(name, &sig_key, args, body, is_async);

        self.scope_depth -= 1;
        self.vars = saved_vars;
        self.mutable_vars = saved_mutable;
        self.declared_vars = saved_declared;
        self.current_function = saved_current;
        self.infer.current_function = saved_function;

        if nested {
            self.indent_level = saved_indent;
            let definition = std::mem::take(&mut self.out);
            self.out = saved_out.unwrap_or_default();
            self.hoisted.push(definition.trim_end().to_string());
        }
        result?;
        self.stats.functions_emitted += 1;
        Ok(())
    }

    fn emit_function_inner(
        &mut self,
        name: &str,
        sig_key: &str,
        args: &Arguments,
        body: &[Stmt],
        is_async: bool,
    ) -> CompileResult<()> {
        let sig = self.sigs.get(sig_key).cloned().ok_or_else(|| {
            CompileError::Internal(format!("signature for `{}` vanished", sig_key))
        })?;

        let in_class = self.current_class.is_some();
        let method_params: Vec<_> = if in_class {
            args.args.iter().skip(1).collect()
        } else {
            args.args.iter().collect()
        };

        // Variables written more than once (or mutated through methods)
        // need `var`; the rest declare `const`.
        self.mutable_vars = collect_mutated(body);
        let assigned = collect_assigned_names(body);
        let default_count = args.defaults.len();
        let first_default = method_params.len().saturating_sub(default_count);

        let mut params: Vec<String> = Vec::new();
        if in_class {
            let class = self.current_class.clone().unwrap_or_default();
            if name == "__init__" {
                params.push("__global_allocator: std.mem.Allocator".to_string());
            } else {
                params.push(format!("self: *{}", class));
                if sig.needs_allocator {
                    params.push("__global_allocator: std.mem.Allocator".to_string());
                }
            }
            self.infer.set_var("self", PyType::Instance(class));
        } else if sig.needs_allocator {
            params.push("__global_allocator: std.mem.Allocator".to_string());
        }

        let mut prologue: Vec<String> = Vec::new();
        for (i, param) in method_params.iter().enumerate() {
            let pname = &param.arg;
            let ty = sig
                .param_types
                .get(if in_class { i + 1 } else { i })
                .cloned()
                .unwrap_or(PyType::Unknown);
            let zig_ty = match &ty {
                PyType::Unknown | PyType::Bottom => "i64".to_string(),
                other => other.zig_type(),
            };
            let effective_ty = if matches!(ty, PyType::Unknown | PyType::Bottom) {
                PyType::Int
            } else {
                ty.clone()
            };
            self.infer.set_var(pname, effective_ty);
            self.declared_vars.insert(pname.clone());

            let has_default = i >= first_default;
            let reassigned = assigned.contains(pname);
            if has_default {
                // Defaulted parameters arrive as optionals padded with the
                // none sentinel and resolve in the prologue.
                let default_expr = &args.defaults[i - first_default];
                let default_ty = self.infer_ty(default_expr);
                let default_text = self.emit_expr(default_expr)?;
                let default_text = self.coerce(default_text, &default_ty, &ty);
                let opt = format!("__opt_{}", pname);
                params.push(format!("{}: ?{}", opt, zig_ty));
                let keyword = if reassigned { "var" } else { "const" };
                prologue.push(format!(
                    "{} {}: {} = {} orelse {};",
                    keyword,
                    super::escape_ident(pname),
                    zig_ty,
                    opt,
                    default_text
                ));
            } else if reassigned {
                let raw = format!("{}_param", pname);
                params.push(format!("{}: {}", raw, zig_ty));
                prologue.push(format!(
                    "var {}: {} = {};",
                    super::escape_ident(pname),
                    zig_ty,
                    raw
                ));
            } else {
                params.push(format!("{}: {}", super::escape_ident(pname), zig_ty));
                if !stmts_use_name(body, pname) {
                    prologue.push(format!("_ = {};", super::escape_ident(pname)));
                }
            }
        }

        if let Some(vararg) = &args.vararg {
            self.vars.array_slice_vars.insert(vararg.arg.clone());
            self.infer
                .set_var(&vararg.arg, PyType::list_of(PyType::Int));
            self.declared_vars.insert(vararg.arg.clone());
            params.push(format!("{}: []const i64", super::escape_ident(&vararg.arg)));
        }
        if let Some(kwarg) = &args.kwarg {
            self.infer.set_var(&kwarg.arg, PyType::Unknown);
            self.declared_vars.insert(kwarg.arg.clone());
            params.push(format!("{}: runtime.PyDict", super::escape_ident(&kwarg.arg)));
        }

        // Seed element types for `x = []` bindings from later appends.
        self.seed_empty_lists(body);

        let emitted_name = if is_async {
            format!("{}_async", super::escape_ident(name))
        } else {
            super::escape_ident(name)
        };

        let (return_text, is_init) = if in_class && name == "__init__" {
            let class = self.current_class.clone().unwrap_or_default();
            (format!("*{}", class), true)
        } else {
            let base = match &sig.return_type {
                PyType::NoneType | PyType::Bottom => "void".to_string(),
                other => other.zig_type(),
            };
            (base, false)
        };
        // Instance construction itself is `catch unreachable`; an init is
        // only fallible when its body raises.
        let fallible = if is_init {
            sig.returns_error
        } else {
            sig.needs_allocator || sig.returns_error
        };
        let return_text = if fallible {
            format!("!{}", return_text)
        } else {
            return_text
        };

        let keyword = if in_class { "pub fn" } else { "fn" };
        self.write_line(&format!(
            "{} {}({}) {} {{",
            keyword,
            emitted_name,
            params.join(", "),
            return_text
        ));
        self.indent();
        for line in &prologue {
            self.write_line(line);
        }
        if is_init {
            let class = self.current_class.clone().unwrap_or_default();
            self.write_line(&format!(
                "const self = __global_allocator.create({}) catch unreachable;",
                class
            ));
            self.write_line("self.* = undefined;");
        }
        self.emit_body(body)?;
        if is_init {
            self.write_line("return self;");
        }
        self.dedent();
        self.write_line("}");
        self.blank_line();
        Ok(())
    }

    /// Infer element types for empty-list bindings from later `append`s.
    fn seed_empty_lists(&mut self, body: &[Stmt]) {
        let mut empties: Vec<String> = Vec::new();
        for stmt in body {
            if let Stmt::Assign { targets, value } = stmt {
                if let (Some(name), Expr::List { elts }) = (
                    targets.first().and_then(Expr::as_name),
                    value,
                ) {
                    if elts.is_empty() {
                        empties.push(name.to_string());
                    }
                }
            }
        }
        for name in empties {
            let mut elem = PyType::Bottom;
            collect_append_types(body, &name, self, &mut elem);
            if !matches!(elem, PyType::Bottom) {
                self.infer.set_var(&name, PyType::list_of(elem));
                self.vars.arraylist_vars.insert(name);
            }
        }
    }

    // ========== Classes ==========

    fn emit_class(&mut self, name: &str, bases: &[Expr], body: &[Stmt]) -> CompileResult<()> {
        let _ = bases;
        // Classes declared inside a function stay local; lambdas that
        // reference them compile to inline structs.
        self.write_line(&format!("const {} = struct {{", name));
        self.indent();

        // Flattened field table: base-chain fields first.
        let fields = self.flattened_fields(name);
        for (field, ty) in &fields {
            self.write_line(&format!(
                "{}: {},",
                super::escape_ident(field),
                ty.zig_type()
            ));
        }
        if !fields.is_empty() {
            self.blank_line();
        }

        let saved_class = self.current_class.replace(name.to_string());

        // Own methods.
        let mut emitted: HashSet<String> = HashSet::new();
        for stmt in body {
            if let Stmt::FunctionDef {
                name: method_name,
                args,
                body: method_body,
                decorator_list,
                is_async,
            } = stmt
            {
                emitted.insert(method_name.clone());
                self.emit_function(method_name, args, method_body, decorator_list, *is_async)?;
            }
        }

        // Parent methods not overridden regenerate with this class's type.
        let inherited = self.inherited_methods(name, &emitted);
        for (method_name, info) in inherited {
            self.emit_function(&method_name, &info.args, &info.body, &[], false)?;
        }

        self.current_class = saved_class;
        self.dedent();
        self.write_line("};");
        self.blank_line();
        self.stats.classes_emitted += 1;
        Ok(())
    }

    /// Field table with base-chain fields flattened in, parents first.
    fn flattened_fields(&self, class: &str) -> Vec<(String, PyType)> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(class);
        while let Some(info) = current {
            chain.push(info);
            current = info.base.as_deref().and_then(|b| self.classes.get(b));
        }
        let mut fields: Vec<(String, PyType)> = Vec::new();
        for info in chain.iter().rev() {
            for (field, ty) in &info.fields {
                if let Some(slot) = fields.iter_mut().find(|(f, _)| f == field) {
                    slot.1 = ty.clone();
                } else {
                    fields.push((field.clone(), ty.clone()));
                }
            }
        }
        fields
    }

    fn inherited_methods(
        &self,
        class: &str,
        own: &HashSet<String>,
    ) -> Vec<(String, crate::registry::MethodInfo)> {
        let mut out = Vec::new();
        let mut seen: HashSet<String> = own.clone();
        let mut current = self
            .classes
            .get(class)
            .and_then(|c| c.base.as_deref())
            .and_then(|b| self.classes.get(b));
        while let Some(info) = current {
            for (method_name, method) in &info.methods {
                if method_name == "__init__" || !seen.insert(method_name.clone()) {
                    continue;
                }
                out.push((method_name.clone(), method.clone()));
            }
            current = info.base.as_deref().and_then(|b| self.classes.get(b));
        }
        // Stable output order regardless of hash iteration.
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Fresh label index shared with block labels.
    fn next_label_index(&mut self) -> usize {
        let label = self.next_label();
        label
            .rsplit('_')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

/// Names assigned anywhere in a body (targets of `=`, `+=`, `for`).
pub(crate) fn collect_assigned_names(body: &[Stmt]) -> HashSet<String> {
    let mut names = HashSet::new();
    walk_assigned(body, &mut names);
    names
}

fn walk_assigned(body: &[Stmt], names: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Assign { targets, .. } => {
                for t in targets {
                    collect_target_names(t, names);
                }
            }
            Stmt::AugAssign { target, .. } => collect_target_names(target, names),
            Stmt::For { target, body, .. } => {
                collect_target_names(target, names);
                walk_assigned(body, names);
            }
            Stmt::If { body, orelse, .. } => {
                walk_assigned(body, names);
                walk_assigned(orelse, names);
            }
            Stmt::While { body, .. } => walk_assigned(body, names),
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                walk_assigned(body, names);
                for h in handlers {
                    walk_assigned(&h.body, names);
                }
                walk_assigned(orelse, names);
                walk_assigned(finalbody, names);
            }
            _ => {}
        }
    }
}

fn collect_target_names(target: &Expr, names: &mut HashSet<String>) {
    match target {
        Expr::Name { id } => {
            names.insert(id.clone());
        }
        Expr::Tuple { elts } => {
            for e in elts {
                collect_target_names(e, names);
            }
        }
        _ => {}
    }
}

/// Names that must declare `var`: assigned more than once, augmented, or
/// mutated through container methods.
pub(crate) fn collect_mutated(body: &[Stmt]) -> HashSet<String> {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut mutated = HashSet::new();
    walk_mutated(body, &mut counts, &mut mutated);
    for (name, count) in counts {
        if count > 1 {
            mutated.insert(name);
        }
    }
    mutated
}

fn walk_mutated(
    body: &[Stmt],
    counts: &mut std::collections::HashMap<String, usize>,
    mutated: &mut HashSet<String>,
) {
    for stmt in body {
        match stmt {
            Stmt::Assign { targets, .. } => {
                for t in targets {
                    if let Some(name) = t.as_name() {
                        *counts.entry(name.to_string()).or_insert(0) += 1;
                    }
                    // Assignment through a subscript mutates the base.
                    if let Expr::Subscript { value, .. } = t {
                        if let Some(name) = value.as_name() {
                            mutated.insert(name.to_string());
                        }
                    }
                }
            }
            Stmt::AugAssign { target, .. } => {
                if let Some(name) = target.as_name() {
                    mutated.insert(name.to_string());
                }
                if let Expr::Subscript { value, .. } = target {
                    if let Some(name) = value.as_name() {
                        mutated.insert(name.to_string());
                    }
                }
            }
            Stmt::Expr { value } => collect_method_mutations(value, mutated),
            Stmt::If { body, orelse, .. } => {
                walk_mutated(body, counts, mutated);
                walk_mutated(orelse, counts, mutated);
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } => {
                // Assignments inside loops re-execute.
                let mut inner: std::collections::HashMap<String, usize> =
                    std::collections::HashMap::new();
                walk_mutated(body, &mut inner, mutated);
                for (name, count) in inner {
                    *counts.entry(name.clone()).or_insert(0) += count;
                    mutated.insert(name);
                }
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                walk_mutated(body, counts, mutated);
                for h in handlers {
                    walk_mutated(&h.body, counts, mutated);
                }
                walk_mutated(orelse, counts, mutated);
                walk_mutated(finalbody, counts, mutated);
            }
            _ => {}
        }
    }
}

const MUTATING_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "clear", "sort", "reverse", "add",
    "discard", "update", "put",
];

fn collect_method_mutations(expr: &Expr, mutated: &mut HashSet<String>) {
    if let Expr::Call { func, .. } = expr {
        if let Expr::Attribute { value, attr } = func.as_ref() {
            if MUTATING_METHODS.contains(&attr.as_str()) {
                if let Some(name) = value.as_name() {
                    mutated.insert(name.to_string());
                }
            }
        }
    }
}

/// Element types observed in `name.append(...)` calls.
fn collect_append_types(
    body: &[Stmt],
    name: &str,
    generator: &mut ZigCodeGenerator,
    elem: &mut PyType,
) {
    for stmt in body {
        match stmt {
            Stmt::Expr { value } => {
                if let Expr::Call { func, args, .. } = value {
                    if let Expr::Attribute { value: recv, attr } = func.as_ref() {
                        if attr == "append" && recv.as_name() == Some(name) {
                            if let Some(arg) = args.first() {
                                let ty = generator.infer_ty(arg);
                                *elem = elem.widen(&ty);
                            }
                        }
                    }
                }
            }
            Stmt::If { body, orelse, .. } => {
                collect_append_types(body, name, generator, elem);
                collect_append_types(orelse, name, generator, elem);
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } => {
                collect_append_types(body, name, generator, elem);
            }
            _ => {}
        }
    }
}

/// Whether any statement in the body reads `name`.
fn stmts_use_name(body: &[Stmt], name: &str) -> bool {
    fn expr_uses(expr: &Expr, name: &str) -> bool {
        let mut names = Vec::new();
        super::lambdas::collect_expr_names(expr, &mut names);
        names.iter().any(|n| n == name)
    }
    fn stmt_uses(stmt: &Stmt, name: &str) -> bool {
        match stmt {
            Stmt::Expr { value } => expr_uses(value, name),
            Stmt::Assign { targets, value } => {
                expr_uses(value, name)
                    || targets.iter().any(|t| match t {
                        Expr::Name { .. } => false,
                        other => expr_uses(other, name),
                    })
            }
            Stmt::AugAssign { target, value, .. } => {
                expr_uses(target, name) || expr_uses(value, name)
            }
            Stmt::Return { value } => value.as_ref().is_some_and(|v| expr_uses(v, name)),
            Stmt::If { test, body, orelse } => {
                expr_uses(test, name)
                    || body.iter().any(|s| stmt_uses(s, name))
                    || orelse.iter().any(|s| stmt_uses(s, name))
            }
            Stmt::While { test, body } => {
                expr_uses(test, name) || body.iter().any(|s| stmt_uses(s, name))
            }
            Stmt::For { target, iter, body } => {
                let _ = target;
                expr_uses(iter, name) || body.iter().any(|s| stmt_uses(s, name))
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                body.iter().any(|s| stmt_uses(s, name))
                    || handlers
                        .iter()
                        .any(|h| h.body.iter().any(|s| stmt_uses(s, name)))
                    || orelse.iter().any(|s| stmt_uses(s, name))
                    || finalbody.iter().any(|s| stmt_uses(s, name))
            }
            Stmt::Raise { exc } => exc.as_ref().is_some_and(|e| expr_uses(e, name)),
            _ => false,
        }
    }
    body.iter().any(|s| stmt_uses(s, name))
}
