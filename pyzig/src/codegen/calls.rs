//! Call emission.
//!
//! Dispatch order: the import dispatch registry first, then immediate
//! lambda invocation, then method calls on receivers of known type, and
//! finally identifier calls (lambda variables, closures, class
//! constructors, ordinary user functions with allocator threading, `try`
//! prefixing, async suffixing, vararg/kwarg wrapping and default padding).

use super::ZigCodeGenerator;
use crate::dispatch::{self, ArgConv, ModuleFn};
use crate::types::PyType;
use crate::{CompileError, CompileResult};
use pyzig_ast::{Expr, Keyword};

impl ZigCodeGenerator {
    pub(crate) fn emit_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> CompileResult<String> {
        // 1. Specialised module functions from the dispatch registry.
        if let Expr::Attribute { value, attr } = func {
            if let Some(module) = self.dotted_module_of(value) {
                if let Some(entry) = dispatch::module_function(&module, attr) {
                    let entry = entry.clone();
                    return self.emit_registry_call(&entry, args);
                }
            }
            // unittest assertion namespace.
            if let Some(runtime_name) = dispatch::unittest_assertion(attr) {
                let mut rendered = Vec::with_capacity(args.len());
                for a in args {
                    rendered.push(self.emit_operand(a)?);
                }
                return Ok(self.fallible(format!(
                    "{}({})",
                    runtime_name,
                    rendered.join(", ")
                )));
            }
        }
        if let Some(id) = func.as_name() {
            if let Some((module, function)) = self.facts.from_imports.get(id).cloned() {
                if let Some(entry) = dispatch::module_function(&module, &function) {
                    let entry = entry.clone();
                    return self.emit_registry_call(&entry, args);
                }
            }
        }

        // 2. Immediate lambda invocation.
        if let Expr::Lambda { args: la, body } = func {
            let value = self.emit_lambda_value(la, body)?;
            let mut rendered = Vec::with_capacity(args.len());
            for a in args {
                rendered.push(self.emit_operand(a)?);
            }
            let arg_list = rendered.join(", ");
            return Ok(match (&value.hoisted_name, &value.closure_name) {
                (Some(name), _) => {
                    if self.sigs.needs_allocator(name) {
                        let call = format!(
                            "{}({}, {})",
                            name,
                            self.allocator_name(),
                            arg_list
                        );
                        self.fallible(call)
                    } else {
                        format!("{}({})", name, arg_list)
                    }
                }
                (_, Some(_)) => format!("({}).call({})", value.text, arg_list),
                _ => format!("{}({})", value.text, arg_list),
            });
        }

        // 3. Method calls on receivers of known type.
        if let Expr::Attribute { value, attr } = func {
            if self.dotted_module_of(value).is_some() {
                // Recognized module, unrecognized function: the registry is
                // a closed table.
                return Err(CompileError::Node {
                    node: "Call",
                    message: format!("unknown module function `{}`", attr),
                });
            }
            return self.emit_method_call(value, attr, args, keywords);
        }

        // 4. Identifier calls.
        if let Some(id) = func.as_name() {
            return self.emit_identifier_call(id, args, keywords);
        }

        // Anything else (calling a call result, a subscript, ...). A value
        // of closure type dispatches through its `call` method.
        let callee_ty = self.infer_ty(func);
        let callee = self.emit_operand(func)?;
        let mut rendered = Vec::with_capacity(args.len());
        for a in args {
            rendered.push(self.emit_operand(a)?);
        }
        if matches!(callee_ty, PyType::Closure(_)) {
            Ok(format!("{}.call({})", callee, rendered.join(", ")))
        } else {
            Ok(format!("{}({})", callee, rendered.join(", ")))
        }
    }

    // ========== Registry calls ==========

    fn emit_registry_call(&mut self, entry: &ModuleFn, args: &[Expr]) -> CompileResult<String> {
        let mut rendered = Vec::with_capacity(args.len() + 1);
        for a in args {
            let ty = self.infer_ty(a);
            let mut text = self.emit_operand(a)?;
            if entry.arg_conv == ArgConv::Floats {
                text = self.coerce(text, &ty, &PyType::Float);
            }
            rendered.push(text);
        }
        // Foreign convention: the allocator rides as the trailing argument.
        if entry.needs_allocator {
            rendered.push(self.allocator_name().to_string());
        }
        let call = format!("{}({})", entry.zig_name, rendered.join(", "));
        Ok(if entry.returns_error {
            self.fallible(call)
        } else {
            call
        })
    }

    // ========== Identifier calls ==========

    fn emit_identifier_call(
        &mut self,
        name: &str,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> CompileResult<String> {
        if let Some(text) = self.emit_builtin_call(name, args)? {
            return Ok(text);
        }

        // Lambda variable: direct function-pointer call.
        if self.vars.lambda_vars.contains(name) {
            let mut rendered = Vec::with_capacity(args.len());
            for a in args {
                rendered.push(self.emit_operand(a)?);
            }
            let target = self.vars.lambda_targets.get(name).cloned();
            let needs_alloc = target
                .as_deref()
                .is_some_and(|t| self.sigs.needs_allocator(t));
            let callee = self.resolve_name(name);
            if needs_alloc {
                let call = format!(
                    "{}({}, {})",
                    callee,
                    self.allocator_name(),
                    rendered.join(", ")
                );
                return Ok(self.fallible(call));
            }
            return Ok(format!("{}({})", callee, rendered.join(", ")));
        }

        // Closure variable: `.call(...)`.
        if self.vars.closure_vars.contains(name) {
            let mut rendered = Vec::with_capacity(args.len());
            for a in args {
                rendered.push(self.emit_operand(a)?);
            }
            return Ok(format!(
                "{}.call({})",
                self.resolve_name(name),
                rendered.join(", ")
            ));
        }

        // Uppercase-leading: class constructor.
        if name.chars().next().is_some_and(char::is_uppercase) {
            return self.emit_constructor_call(name, args);
        }

        // Ordinary user function.
        self.emit_user_call(name, args, keywords)
    }

    fn emit_constructor_call(&mut self, name: &str, args: &[Expr]) -> CompileResult<String> {
        let init_key = format!("{}.__init__", name);
        let mut rendered = Vec::with_capacity(args.len() + 1);
        rendered.push(self.allocator_name().to_string());
        for a in args {
            rendered.push(self.emit_operand(a)?);
        }
        let call = format!("{}.init({})", name, rendered.join(", "));
        Ok(if self.sigs.returns_error(&init_key) {
            self.fallible(call)
        } else {
            call
        })
    }

    fn emit_user_call(
        &mut self,
        name: &str,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> CompileResult<String> {
        let sig = self.sigs.get(name).cloned();
        let Some(sig) = sig else {
            // Unknown callee: plain call with the arguments as given.
            let mut rendered = Vec::with_capacity(args.len());
            for a in args {
                rendered.push(self.emit_operand(a)?);
            }
            return Ok(format!(
                "{}({})",
                self.resolve_name(name),
                rendered.join(", ")
            ));
        };

        let mut rendered: Vec<String> = Vec::new();
        if sig.needs_allocator {
            rendered.push(self.allocator_name().to_string());
        }

        let fixed = if sig.is_vararg {
            sig.total_params.min(args.len())
        } else {
            args.len().min(sig.total_params)
        };
        let mut positional: Vec<Option<String>> = vec![None; sig.total_params];
        for (i, a) in args.iter().take(fixed).enumerate() {
            let ty = self.infer_ty(a);
            let text = self.emit_operand(a)?;
            let expected = sig.param_types.get(i).cloned().unwrap_or(PyType::Unknown);
            positional[i] = Some(self.coerce(text, &ty, &expected));
        }
        // Keyword arguments bind to named parameters for non-kwarg callees.
        if !sig.is_kwarg {
            for kw in keywords {
                if let Some(arg_name) = &kw.arg {
                    if let Some(pos) = sig.param_names.iter().position(|p| p == arg_name) {
                        let text = self.emit_operand(&kw.value)?;
                        positional[pos] = Some(text);
                    }
                }
            }
        }
        // Trailing defaults are padded with the none sentinel.
        for (i, slot) in positional.iter_mut().enumerate() {
            if slot.is_none() {
                if i >= sig.required_params {
                    *slot = Some("null".to_string());
                } else {
                    return Err(CompileError::Node {
                        node: "Call",
                        message: format!(
                            "missing required argument {} of `{}`",
                            i + 1,
                            name
                        ),
                    });
                }
            }
        }
        rendered.extend(positional.into_iter().flatten());

        // Extra positional arguments ride a slice literal.
        if sig.is_vararg {
            let extras = &args[fixed.min(args.len())..];
            let mut elem_ty = PyType::Bottom;
            let mut texts = Vec::with_capacity(extras.len());
            for e in extras {
                elem_ty = elem_ty.widen(&self.infer_ty(e));
                texts.push(self.emit_operand(e)?);
            }
            let elem_ty = match elem_ty {
                PyType::Bottom | PyType::Unknown => PyType::Int,
                other => other,
            };
            rendered.push(format!(
                "&[_]{}{{ {} }}",
                elem_ty.zig_type(),
                texts.join(", ")
            ));
        }

        // Keyword arguments ride the runtime dict bridge.
        if sig.is_kwarg {
            let label = self.next_label();
            let kw_map = self.next_tmp("kwargs");
            let mut body = String::new();
            for kw in keywords {
                if let Some(arg_name) = &kw.arg {
                    let value = self.emit_operand(&kw.value)?;
                    body.push_str(&format!(
                        " {}.set(\"{}\", {}) catch unreachable;",
                        kw_map, arg_name, value
                    ));
                }
            }
            rendered.push(format!(
                "{l}: {{ var {m} = runtime.PyDict.create({a});{body} break :{l} {m}; }}",
                l = label,
                m = kw_map,
                a = self.allocator_name(),
                body = body
            ));
        }

        let callee = if sig.is_async {
            format!("{}_async", self.resolve_name(name))
        } else {
            self.resolve_name(name)
        };
        let call = format!("{}({})", callee, rendered.join(", "));
        Ok(if sig.needs_allocator || sig.returns_error {
            self.fallible(call)
        } else {
            call
        })
    }

    // ========== Method calls ==========

    fn emit_method_call(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        _keywords: &[Keyword],
    ) -> CompileResult<String> {
        let receiver_ty = self.infer_ty(receiver);
        match receiver_ty {
            PyType::List(element) => self.emit_list_method(receiver, method, args, &element),
            PyType::Str { .. } => self.emit_str_method(receiver, method, args),
            PyType::Dict { key, value } => {
                self.emit_dict_method(receiver, method, args, &key, &value)
            }
            PyType::Set(element) => self.emit_set_method(receiver, method, args, &element),
            PyType::Instance(class) => self.emit_class_method(receiver, &class, method, args),
            PyType::NumpyArray => self.emit_array_method(receiver, method, args),
            PyType::BigInt => {
                // Explicit big-integer method calls pass through.
                let obj = self.emit_operand(receiver)?;
                let mut rendered = vec![self.allocator_name().to_string()];
                for a in args {
                    rendered.push(self.emit_operand(a)?);
                }
                Ok(self.infallible(format!("{}.{}({})", obj, method, rendered.join(", "))))
            }
            _ => {
                // Dynamic receiver: runtime attribute call.
                let obj = self.emit_operand(receiver)?;
                let mut rendered = Vec::with_capacity(args.len());
                for a in args {
                    rendered.push(self.emit_operand(a)?);
                }
                Ok(format!(
                    "runtime.callMethod({}, \"{}\", .{{ {} }})",
                    obj,
                    method,
                    rendered.join(", ")
                ))
            }
        }
    }

    fn emit_class_method(
        &mut self,
        receiver: &Expr,
        class: &str,
        method: &str,
        args: &[Expr],
    ) -> CompileResult<String> {
        let info = self.classes.find_method(class, method).cloned();
        let obj = self.emit_operand(receiver)?;
        let mut rendered = Vec::new();
        let (needs_alloc, fallible) = info
            .map(|m| (m.needs_allocator, m.needs_allocator || m.returns_error))
            .unwrap_or((false, false));
        if needs_alloc {
            rendered.push(self.allocator_name().to_string());
        }
        for a in args {
            rendered.push(self.emit_operand(a)?);
        }
        let call = format!(
            "{}.{}({})",
            obj,
            super::escape_ident(method),
            rendered.join(", ")
        );
        Ok(if fallible { self.fallible(call) } else { call })
    }

    fn emit_list_method(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        element: &PyType,
    ) -> CompileResult<String> {
        // Mutating methods mark the variable as arraylist-backed.
        if let Some(name) = receiver.as_name() {
            if matches!(
                method,
                "append" | "extend" | "insert" | "pop" | "remove" | "clear" | "sort" | "reverse"
            ) {
                self.vars.arraylist_vars.insert(name.to_string());
            }
        }
        let list = self.emit_operand(receiver)?;
        match method {
            "append" => {
                let ty = self.infer_ty(&args[0]);
                let v = self.emit_operand(&args[0])?;
                let v = self.coerce(v, &ty, element);
                Ok(self.infallible(format!("{}.append({})", list, v)))
            }
            "extend" => {
                let other = self.emit_operand(&args[0])?;
                Ok(self.infallible(format!("{}.appendSlice({}.items)", list, other)))
            }
            "insert" => {
                let i = self.emit_operand(&args[0])?;
                let v = self.emit_operand(&args[1])?;
                Ok(self.infallible(format!("{}.insert(@intCast({}), {})", list, i, v)))
            }
            "pop" => {
                if let Some(idx) = args.first() {
                    let i = self.emit_operand(idx)?;
                    Ok(format!("{}.orderedRemove(@intCast({}))", list, i))
                } else {
                    Ok(format!("{}.pop()", list))
                }
            }
            "remove" => {
                let scalar = match element {
                    PyType::Float => "f64",
                    _ => "i64",
                };
                let v = self.emit_operand(&args[0])?;
                Ok(format!(
                    "_ = {l}.orderedRemove(std.mem.indexOfScalar({t}, {l}.items, {v}).?)",
                    l = list,
                    t = scalar,
                    v = v
                ))
            }
            "clear" => Ok(format!("{}.clearRetainingCapacity()", list)),
            "reverse" => Ok(format!(
                "std.mem.reverse({}, {}.items)",
                element.zig_type(),
                list
            )),
            "sort" => {
                let t = element.zig_type();
                Ok(format!(
                    "std.mem.sort({t}, {l}.items, {{}}, comptime std.sort.asc({t}))",
                    t = t,
                    l = list
                ))
            }
            "index" => {
                let scalar = match element {
                    PyType::Float => "f64",
                    _ => "i64",
                };
                let v = self.emit_operand(&args[0])?;
                Ok(format!(
                    "@as(i64, @intCast(std.mem.indexOfScalar({}, {}.items, {}).?))",
                    scalar, list, v
                ))
            }
            "copy" => {
                let label = self.next_label();
                let out = self.next_tmp("out");
                Ok(format!(
                    "{l}: {{ var {o} = std.ArrayList({t}).init({a}); {o}.appendSlice({src}.items) catch unreachable; break :{l} {o}; }}",
                    l = label,
                    o = out,
                    t = element.zig_type(),
                    a = self.allocator_name(),
                    src = list
                ))
            }
            "count" => {
                let v = self.emit_operand(&args[0])?;
                let label = self.next_label();
                let n = self.next_tmp("count");
                let item = self.next_tmp("item");
                Ok(format!(
                    "{l}: {{ var {n}: usize = 0; for ({src}.items) |{i}| {{ if ({i} == {v}) {n} += 1; }} break :{l} {n}; }}",
                    l = label,
                    n = n,
                    src = list,
                    i = item,
                    v = v
                ))
            }
            other => Err(CompileError::Node {
                node: "Call",
                message: format!("unsupported list method `{}`", other),
            }),
        }
    }

    fn emit_str_method(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
    ) -> CompileResult<String> {
        let s = self.emit_operand(receiver)?;
        let alloc = self.allocator_name().to_string();
        match method {
            "upper" => Ok(self.infallible(format!("runtime.strUpper({}, {})", alloc, s))),
            "lower" => Ok(self.infallible(format!("runtime.strLower({}, {})", alloc, s))),
            "strip" => Ok(format!("std.mem.trim(u8, {}, \" \\t\\r\\n\")", s)),
            "lstrip" => Ok(format!("std.mem.trimLeft(u8, {}, \" \\t\\r\\n\")", s)),
            "rstrip" => Ok(format!("std.mem.trimRight(u8, {}, \" \\t\\r\\n\")", s)),
            "startswith" => {
                let p = self.emit_operand(&args[0])?;
                Ok(format!("std.mem.startsWith(u8, {}, {})", s, p))
            }
            "endswith" => {
                let p = self.emit_operand(&args[0])?;
                Ok(format!("std.mem.endsWith(u8, {}, {})", s, p))
            }
            "find" => {
                let p = self.emit_operand(&args[0])?;
                let hit = self.next_tmp("found");
                Ok(format!(
                    "(if (std.mem.indexOf(u8, {s}, {p})) |{h}| @as(i64, @intCast({h})) else -1)",
                    s = s,
                    p = p,
                    h = hit
                ))
            }
            "split" => {
                let sep = match args.first() {
                    Some(a) => self.emit_operand(a)?,
                    None => "\" \"".to_string(),
                };
                Ok(self.infallible(format!("runtime.strSplit({}, {}, {})", alloc, s, sep)))
            }
            "join" => {
                let parts = self.emit_operand(&args[0])?;
                Ok(self.infallible(format!("runtime.strJoin({}, {}, {})", alloc, s, parts)))
            }
            "replace" => {
                let old = self.emit_operand(&args[0])?;
                let new = self.emit_operand(&args[1])?;
                Ok(self.infallible(format!(
                    "runtime.strReplace({}, {}, {}, {})",
                    alloc, s, old, new
                )))
            }
            "isdigit" => Ok(format!(
                "(blk_isdigit: {{ for ({s}) |__c| {{ if (!std.ascii.isDigit(__c)) break :blk_isdigit false; }} break :blk_isdigit {s}.len != 0; }})",
                s = s
            )),
            "count" => {
                let p = self.emit_operand(&args[0])?;
                Ok(format!("std.mem.count(u8, {}, {})", s, p))
            }
            other => Err(CompileError::Node {
                node: "Call",
                message: format!("unsupported string method `{}`", other),
            }),
        }
    }

    fn emit_dict_method(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        key: &PyType,
        value: &PyType,
    ) -> CompileResult<String> {
        let map = self.emit_operand(receiver)?;
        match method {
            "get" => {
                let k = self.emit_operand(&args[0])?;
                match args.get(1) {
                    Some(default) => {
                        let d = self.emit_operand(default)?;
                        Ok(format!("({}.get({}) orelse {})", map, k, d))
                    }
                    None => Ok(format!("{}.get({}).?", map, k)),
                }
            }
            "pop" => {
                let k = self.emit_operand(&args[0])?;
                Ok(format!("{}.fetchRemove({}).?.value", map, k))
            }
            "update" => {
                let other = self.emit_operand(&args[0])?;
                let it = self.next_tmp("it");
                let entry = self.next_tmp("entry");
                Ok(format!(
                    "{{ var {it} = {o}.iterator(); while ({it}.next()) |{e}| {{ {m}.put({e}.key_ptr.*, {e}.value_ptr.*) catch unreachable; }} }}",
                    it = it,
                    o = other,
                    e = entry,
                    m = map
                ))
            }
            "clear" => Ok(format!("{}.clearRetainingCapacity()", map)),
            "keys" | "values" => {
                let elem = if method == "keys" { key } else { value };
                let iter_fn = if method == "keys" {
                    "keyIterator"
                } else {
                    "valueIterator"
                };
                let label = self.next_label();
                let out = self.next_tmp("out");
                let it = self.next_tmp("it");
                let ptr = self.next_tmp("ptr");
                Ok(format!(
                    "{l}: {{ var {o} = std.ArrayList({t}).init({a}); var {it} = {m}.{f}(); while ({it}.next()) |{p}| {{ {o}.append({p}.*) catch unreachable; }} break :{l} {o}; }}",
                    l = label,
                    o = out,
                    t = elem.zig_type(),
                    a = self.allocator_name(),
                    it = it,
                    m = map,
                    f = iter_fn,
                    p = ptr
                ))
            }
            "items" => {
                let tuple_ty = PyType::Tuple(vec![key.clone(), value.clone()]).zig_type();
                let label = self.next_label();
                let out = self.next_tmp("out");
                let it = self.next_tmp("it");
                let entry = self.next_tmp("entry");
                Ok(format!(
                    "{l}: {{ var {o} = std.ArrayList({t}).init({a}); var {it} = {m}.iterator(); while ({it}.next()) |{e}| {{ {o}.append(.{{ {e}.key_ptr.*, {e}.value_ptr.* }}) catch unreachable; }} break :{l} {o}; }}",
                    l = label,
                    o = out,
                    t = tuple_ty,
                    a = self.allocator_name(),
                    it = it,
                    m = map,
                    e = entry
                ))
            }
            other => Err(CompileError::Node {
                node: "Call",
                message: format!("unsupported dict method `{}`", other),
            }),
        }
    }

    fn emit_set_method(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        element: &PyType,
    ) -> CompileResult<String> {
        if let Some(name) = receiver.as_name() {
            if matches!(method, "add" | "discard" | "remove" | "clear") {
                self.vars.arraylist_vars.insert(name.to_string());
            }
        }
        let set = self.emit_operand(receiver)?;
        match method {
            "add" => {
                let ty = self.infer_ty(&args[0]);
                let v = self.emit_operand(&args[0])?;
                let v = self.coerce(v, &ty, element);
                Ok(self.infallible(format!("{}.put({}, {{}})", set, v)))
            }
            "discard" | "remove" => {
                let v = self.emit_operand(&args[0])?;
                Ok(format!("_ = {}.remove({})", set, v))
            }
            "clear" => Ok(format!("{}.clearRetainingCapacity()", set)),
            other => Err(CompileError::Node {
                node: "Call",
                message: format!("unsupported set method `{}`", other),
            }),
        }
    }

    fn emit_array_method(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
    ) -> CompileResult<String> {
        let array = self.emit_operand(receiver)?;
        let alloc = self.allocator_name().to_string();
        match method {
            "transpose" => Ok(self.fallible(format!("runtime.transpose({}, {})", alloc, array))),
            "sum" | "mean" | "min" | "max" => Ok(format!("{}.{}()", array, method)),
            "reshape" => {
                let mut rendered = vec![alloc, array];
                for a in args {
                    rendered.push(self.emit_operand(a)?);
                }
                Ok(self.fallible(format!("runtime.reshape({})", rendered.join(", "))))
            }
            other => Err(CompileError::Node {
                node: "Call",
                message: format!("unsupported array method `{}`", other),
            }),
        }
    }

    // ========== Builtins ==========

    /// Emit a builtin call, or `None` if the name is not a builtin.
    fn emit_builtin_call(&mut self, name: &str, args: &[Expr]) -> CompileResult<Option<String>> {
        let text = match name {
            "print" => self.emit_print(args)?,
            "len" => {
                let arg = args.first().ok_or_else(|| CompileError::Node {
                    node: "Call",
                    message: "len() requires an argument".to_string(),
                })?;
                let ty = self.infer_ty(arg);
                let v = self.emit_operand(arg)?;
                match ty {
                    PyType::List(_) => format!("{}.items.len", v),
                    PyType::Str { .. } => format!("{}.len", v),
                    PyType::Dict { .. } | PyType::Set(_) => format!("{}.count()", v),
                    PyType::Tuple(items) => format!("{}", items.len()),
                    PyType::NumpyArray => format!("{}.size", v),
                    _ => format!("runtime.pyLen({})", v),
                }
            }
            "range" => {
                // A materialized range outside loop position.
                let label = self.next_label();
                let list = self.next_tmp("list");
                let i = self.next_tmp("i");
                let body = format!("{}.append({}) catch unreachable;", list, i);
                let target = Expr::name(&i);
                let loop_text = self.build_range_loop(&target, args, &body)?;
                format!(
                    "{l}: {{ var {v} = std.ArrayList(i64).init({a}); {loop_text} break :{l} {v}; }}",
                    l = label,
                    v = list,
                    a = self.allocator_name(),
                    loop_text = loop_text
                )
            }
            "sum" => {
                let arg = args.first().ok_or_else(|| CompileError::Node {
                    node: "Call",
                    message: "sum() requires an argument".to_string(),
                })?;
                let elem_ty = self.iter_element_ty(arg);
                let acc_ty = match elem_ty {
                    PyType::Float => "f64",
                    _ => "i64",
                };
                let seq = self.emit_operand(arg)?;
                let label = self.next_label();
                let total = self.next_tmp("total");
                let tmp = self.next_tmp("seq");
                let item = self.next_tmp("item");
                format!(
                    "{l}: {{ const {t} = {seq}; var {acc}: {ty} = 0; for ({t}.items) |{i}| {{ {acc} += {i}; }} break :{l} {acc}; }}",
                    l = label,
                    t = tmp,
                    seq = seq,
                    acc = total,
                    ty = acc_ty,
                    i = item
                )
            }
            "abs" => {
                let ty = self.infer_ty(&args[0]);
                let v = self.emit_operand(&args[0])?;
                if ty.is_float() {
                    format!("@abs({})", v)
                } else {
                    format!("@as(i64, @intCast(@abs({})))", v)
                }
            }
            "min" | "max" => {
                let builtin = if name == "min" { "@min" } else { "@max" };
                if args.len() == 1 {
                    let elem_ty = self.iter_element_ty(&args[0]);
                    let scalar = match elem_ty {
                        PyType::Float => "f64",
                        _ => "i64",
                    };
                    let seq = self.emit_operand(&args[0])?;
                    let fn_name = if name == "min" {
                        "std.mem.min"
                    } else {
                        "std.mem.max"
                    };
                    format!("{}({}, {}.items)", fn_name, scalar, seq)
                } else {
                    let mut rendered = Vec::with_capacity(args.len());
                    for a in args {
                        rendered.push(self.emit_operand(a)?);
                    }
                    format!("{}({})", builtin, rendered.join(", "))
                }
            }
            "str" => {
                let ty = self.infer_ty(&args[0]);
                let v = self.emit_operand(&args[0])?;
                let alloc = self.allocator_name();
                match ty {
                    PyType::Str { .. } => v,
                    PyType::Bool => format!("(if ({}) \"True\" else \"False\")", v),
                    PyType::NoneType => "\"None\"".to_string(),
                    PyType::BigInt => {
                        self.infallible(format!("{}.toString({})", v, alloc))
                    }
                    _ => self.infallible(format!(
                        "std.fmt.allocPrint({}, \"{{d}}\", .{{ {} }})",
                        alloc, v
                    )),
                }
            }
            "int" => {
                let ty = self.infer_ty(&args[0]);
                let v = self.emit_operand(&args[0])?;
                match ty {
                    PyType::Int => v,
                    PyType::Bool => format!("@as(i64, @intFromBool({}))", v),
                    PyType::Float => format!("@as(i64, @intFromFloat({}))", v),
                    PyType::Str { .. } => {
                        self.infallible(format!("std.fmt.parseInt(i64, {}, 10)", v))
                    }
                    PyType::Usize => format!("@as(i64, @intCast({}))", v),
                    _ => format!("runtime.pyObjToInt({})", v),
                }
            }
            "float" => {
                let ty = self.infer_ty(&args[0]);
                let v = self.emit_operand(&args[0])?;
                match ty {
                    PyType::Float => v,
                    PyType::Str { .. } => {
                        self.infallible(format!("std.fmt.parseFloat(f64, {})", v))
                    }
                    _ => self.coerce(v, &ty, &PyType::Float),
                }
            }
            "bool" => self.emit_truthy(&args[0])?,
            "sorted" => {
                let elem_ty = self.iter_element_ty(&args[0]);
                let scalar = elem_ty.zig_type();
                let seq = self.emit_operand(&args[0])?;
                let label = self.next_label();
                let out = self.next_tmp("out");
                format!(
                    "{l}: {{ var {o} = std.ArrayList({t}).init({a}); {o}.appendSlice({seq}.items) catch unreachable; std.mem.sort({t}, {o}.items, {{}}, comptime std.sort.asc({t})); break :{l} {o}; }}",
                    l = label,
                    o = out,
                    t = scalar,
                    a = self.allocator_name(),
                    seq = seq
                )
            }
            _ => return Ok(None),
        };
        Ok(Some(text))
    }

    /// Emit `print(...)`: stdout formatting specialised on argument types.
    fn emit_print(&mut self, args: &[Expr]) -> CompileResult<String> {
        let mut fmt = String::new();
        let mut rendered: Vec<String> = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                fmt.push(' ');
            }
            let ty = self.infer_ty(arg);
            let text = self.emit_operand(arg)?;
            match ty {
                PyType::Int | PyType::Usize | PyType::Float => {
                    fmt.push_str("{d}");
                    rendered.push(text);
                }
                PyType::Bool => {
                    fmt.push_str("{s}");
                    rendered.push(format!("(if ({}) \"True\" else \"False\")", text));
                }
                PyType::Str { .. } => {
                    fmt.push_str("{s}");
                    rendered.push(text);
                }
                PyType::BigInt => {
                    fmt.push_str("{s}");
                    let alloc = self.allocator_name();
                    rendered.push(self.infallible(format!("{}.toString({})", text, alloc)));
                }
                PyType::NoneType => {
                    fmt.push_str("{s}");
                    rendered.push("\"None\"".to_string());
                }
                _ => {
                    fmt.push_str("{any}");
                    rendered.push(text);
                }
            }
        }
        fmt.push_str("\\n");
        Ok(format!(
            "std.io.getStdOut().writer().print(\"{}\", .{{ {} }}) catch unreachable",
            fmt,
            rendered.join(", ")
        ))
    }
}
