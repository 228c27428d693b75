//! Composite literal and comprehension emission.
//!
//! Literals take one of two paths. The comptime path fires when every
//! element is a compile-time constant of a widening-compatible type: the
//! values are inlined into an array literal and populated with `inline
//! for`, letting the target compiler eliminate the loop. Everything else
//! takes the runtime path, a labelled block that creates an empty
//! container and appends/puts stepwise, casting where the widened element
//! type requires it.

use super::ZigCodeGenerator;
use crate::types::PyType;
use crate::CompileResult;
use pyzig_ast::{Comprehension, Const, Expr};

impl ZigCodeGenerator {
    // ========== Tuples ==========

    pub(crate) fn emit_tuple_literal(&mut self, elts: &[Expr]) -> CompileResult<String> {
        let mut parts = Vec::with_capacity(elts.len());
        for e in elts {
            parts.push(self.emit_operand(e)?);
        }
        Ok(format!(".{{ {} }}", parts.join(", ")))
    }

    // ========== Lists ==========

    pub(crate) fn emit_list_literal(&mut self, elts: &[Expr]) -> CompileResult<String> {
        let elem_ty = self.literal_element_type(elts);
        let zig_elem = elem_ty.zig_type();
        let alloc = self.allocator_name().to_string();

        if elts.is_empty() {
            return Ok(format!("std.ArrayList({}).init({})", zig_elem, alloc));
        }

        if self.is_comptime_scalar_list(elts, &elem_ty) {
            self.stats.comptime_literals += 1;
            let values: Vec<String> = elts
                .iter()
                .map(|e| self.render_scalar_const(e, &elem_ty))
                .collect::<CompileResult<_>>()?;
            let label = self.next_label();
            let list = self.next_tmp("list");
            let item = self.next_tmp("item");
            return Ok(format!(
                "{l}: {{ var {v} = std.ArrayList({t}).init({a}); inline for ([_]{t}{{ {vals} }}) |{i}| {{ {v}.append({i}) catch unreachable; }} break :{l} {v}; }}",
                l = label,
                v = list,
                t = zig_elem,
                a = alloc,
                vals = values.join(", "),
                i = item
            ));
        }

        self.stats.runtime_literals += 1;
        let label = self.next_label();
        let list = self.next_tmp("list");
        let mut body = String::new();
        for e in elts {
            if let Expr::Starred { value } = e {
                let inner = self.emit_operand(value)?;
                let item = self.next_tmp("item");
                body.push_str(&format!(
                    " for ({}.items) |{i}| {{ {v}.append({i}) catch unreachable; }}",
                    inner,
                    i = item,
                    v = list
                ));
                continue;
            }
            let value = self.emit_element(e, &elem_ty, false)?;
            body.push_str(&format!(" {}.append({}) catch unreachable;", list, value));
        }
        Ok(format!(
            "{l}: {{ var {v} = std.ArrayList({t}).init({a});{body} break :{l} {v}; }}",
            l = label,
            v = list,
            t = zig_elem,
            a = alloc,
            body = body
        ))
    }

    // ========== Sets ==========

    pub(crate) fn emit_set_literal(&mut self, elts: &[Expr]) -> CompileResult<String> {
        let elem_ty = self.literal_element_type(elts);
        let set_ty = PyType::set_of(elem_ty.clone()).zig_type();
        let alloc = self.allocator_name().to_string();
        if elts.is_empty() {
            return Ok(format!("{}.init({})", set_ty, alloc));
        }
        self.stats.runtime_literals += 1;
        let label = self.next_label();
        let set = self.next_tmp("set");
        let mut body = String::new();
        for e in elts {
            let value = self.emit_element(e, &elem_ty, false)?;
            body.push_str(&format!(" {}.put({}, {{}}) catch unreachable;", set, value));
        }
        Ok(format!(
            "{l}: {{ var {s} = {t}.init({a});{body} break :{l} {s}; }}",
            l = label,
            s = set,
            t = set_ty,
            a = alloc,
            body = body
        ))
    }

    // ========== Dicts ==========

    pub(crate) fn emit_dict_literal(
        &mut self,
        keys: &[Option<Expr>],
        values: &[Expr],
    ) -> CompileResult<String> {
        // The first real (non-unpacking) key decides integer vs byte-string
        // keying.
        let key_ty = keys
            .iter()
            .flatten()
            .next()
            .map(|k| self.infer_ty(k))
            .map(|t| match t {
                PyType::Int | PyType::Bool | PyType::Usize => PyType::Int,
                _ => PyType::static_str(),
            })
            .unwrap_or(PyType::static_str());

        let value_types: Vec<PyType> = values.iter().map(|v| self.infer_ty(v)).collect();
        let mut value_ty = PyType::Bottom;
        for (k, t) in keys.iter().zip(value_types.iter()) {
            match k {
                Some(_) => value_ty = value_ty.widen(t),
                None => {
                    if let PyType::Dict { value, .. } = t {
                        value_ty = value_ty.widen(value);
                    }
                }
            }
        }
        // Values of mixed incompatible types are lowered to formatted
        // byte strings rather than a sum type.
        let mixed_to_str = matches!(value_ty, PyType::Unknown)
            && value_types.iter().any(|t| !matches!(t, PyType::Unknown));
        if mixed_to_str {
            value_ty = PyType::runtime_str();
        }
        if matches!(value_ty, PyType::Bottom | PyType::Unknown) {
            value_ty = PyType::Unknown;
        }

        let map_ty = PyType::dict_of(key_ty.clone(), value_ty.clone()).zig_type();
        let alloc = self.allocator_name().to_string();

        if keys.is_empty() {
            return Ok(format!("{}.init({})", map_ty, alloc));
        }

        let all_const = keys.iter().all(|k| {
            k.as_ref().is_some_and(|key| key.is_constant())
        }) && values.iter().all(Expr::is_constant)
            && !mixed_to_str;

        if all_const {
            self.stats.comptime_literals += 1;
            let key_zig = key_ty.zig_type();
            let value_zig = value_ty.zig_type();
            let mut pairs = Vec::with_capacity(keys.len());
            for (k, v) in keys.iter().zip(values.iter()) {
                let key = self.emit_element(k.as_ref().expect("checked const"), &key_ty, false)?;
                let value = self.emit_element(v, &value_ty, false)?;
                pairs.push(format!(".{{ {}, {} }}", key, value));
            }
            let label = self.next_label();
            let map = self.next_tmp("map");
            let entry = self.next_tmp("entry");
            return Ok(format!(
                "{l}: {{ var {m} = {t}.init({a}); inline for ([_]struct {{ {kt}, {vt} }}{{ {pairs} }}) |{e}| {{ {m}.put({e}[0], {e}[1]) catch unreachable; }} break :{l} {m}; }}",
                l = label,
                m = map,
                t = map_ty,
                a = alloc,
                kt = key_zig,
                vt = value_zig,
                pairs = pairs.join(", "),
                e = entry
            ));
        }

        self.stats.runtime_literals += 1;
        let label = self.next_label();
        let map = self.next_tmp("map");
        let mut body = String::new();
        for (k, v) in keys.iter().zip(values.iter()) {
            match k {
                Some(key) => {
                    let key_text = self.emit_element(key, &key_ty, false)?;
                    let value_text = self.emit_element(v, &value_ty, mixed_to_str)?;
                    body.push_str(&format!(
                        " {}.put({}, {}) catch unreachable;",
                        map, key_text, value_text
                    ));
                }
                None => {
                    // `**other`: iterate the source map and merge entries.
                    let source = self.emit_operand(v)?;
                    let it = self.next_tmp("it");
                    let entry = self.next_tmp("entry");
                    body.push_str(&format!(
                        " var {it} = {src}.iterator(); while ({it}.next()) |{e}| {{ {m}.put({e}.key_ptr.*, {e}.value_ptr.*) catch unreachable; }}",
                        it = it,
                        src = source,
                        e = entry,
                        m = map
                    ));
                }
            }
        }
        Ok(format!(
            "{l}: {{ var {m} = {t}.init({a});{body} break :{l} {m}; }}",
            l = label,
            m = map,
            t = map_ty,
            a = alloc,
            body = body
        ))
    }

    // ========== Comprehensions ==========

    pub(crate) fn emit_list_comp(
        &mut self,
        elt: &Expr,
        generators: &[Comprehension],
    ) -> CompileResult<String> {
        let bound = self.bind_generators(generators);
        let elem_ty = self.infer_ty(elt);
        let result = (|| -> CompileResult<String> {
            let elem_text = self.emit_operand(elt)?;
            let label = self.next_label();
            let list = self.next_tmp("list");
            let body = format!("{}.append({}) catch unreachable;", list, elem_text);
            let loops = self.build_comp_loops(generators, &body)?;
            Ok(format!(
                "{l}: {{ var {v} = std.ArrayList({t}).init({a}); {loops} break :{l} {v}; }}",
                l = label,
                v = list,
                t = elem_ty.zig_type(),
                a = self.allocator_name(),
                loops = loops
            ))
        })();
        self.unbind_generators(&bound);
        self.stats.runtime_literals += 1;
        result
    }

    pub(crate) fn emit_set_comp(
        &mut self,
        elt: &Expr,
        generators: &[Comprehension],
    ) -> CompileResult<String> {
        let bound = self.bind_generators(generators);
        let elem_ty = self.infer_ty(elt);
        let result = (|| -> CompileResult<String> {
            let elem_text = self.emit_operand(elt)?;
            let label = self.next_label();
            let set = self.next_tmp("set");
            let body = format!("{}.put({}, {{}}) catch unreachable;", set, elem_text);
            let loops = self.build_comp_loops(generators, &body)?;
            Ok(format!(
                "{l}: {{ var {s} = {t}.init({a}); {loops} break :{l} {s}; }}",
                l = label,
                s = set,
                t = PyType::set_of(elem_ty.clone()).zig_type(),
                a = self.allocator_name(),
                loops = loops
            ))
        })();
        self.unbind_generators(&bound);
        self.stats.runtime_literals += 1;
        result
    }

    pub(crate) fn emit_dict_comp(
        &mut self,
        key: &Expr,
        value: &Expr,
        generators: &[Comprehension],
    ) -> CompileResult<String> {
        let bound = self.bind_generators(generators);
        let key_ty = self.infer_ty(key);
        let value_ty = self.infer_ty(value);
        let result = (|| -> CompileResult<String> {
            let key_text = self.emit_operand(key)?;
            let value_text = self.emit_operand(value)?;
            let label = self.next_label();
            let map = self.next_tmp("map");
            let body = format!(
                "{}.put({}, {}) catch unreachable;",
                map, key_text, value_text
            );
            let loops = self.build_comp_loops(generators, &body)?;
            Ok(format!(
                "{l}: {{ var {m} = {t}.init({a}); {loops} break :{l} {m}; }}",
                l = label,
                m = map,
                t = PyType::dict_of(key_ty.clone(), value_ty.clone()).zig_type(),
                a = self.allocator_name(),
                loops = loops
            ))
        })();
        self.unbind_generators(&bound);
        self.stats.runtime_literals += 1;
        result
    }

    /// Register comprehension targets in the inferrer's parameter scope.
    fn bind_generators(&mut self, generators: &[Comprehension]) -> Vec<String> {
        let mut bound = Vec::new();
        for gen in generators {
            let elem = self.iter_element_ty(&gen.iter);
            match &gen.target {
                Expr::Name { id } => {
                    self.infer.register_param(id, elem);
                    bound.push(id.clone());
                }
                Expr::Tuple { elts } => {
                    for (i, t) in elts.iter().enumerate() {
                        if let Some(name) = t.as_name() {
                            let ty = match &elem {
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
        }
        bound
    }

    fn unbind_generators(&mut self, bound: &[String]) {
        for name in bound.iter().rev() {
            self.infer.unregister_param(name);
        }
    }

    /// Build nested single-line loops around `body` for a generator chain.
    pub(crate) fn build_comp_loops(
        &mut self,
        generators: &[Comprehension],
        body: &str,
    ) -> CompileResult<String> {
        let mut text = body.to_string();
        for gen in generators.iter().rev() {
            let mut inner = text;
            for cond in gen.ifs.iter().rev() {
                let test = self.emit_truthy(cond)?;
                inner = format!("if (!{}) continue; {}", test, inner);
            }
            text = self.build_one_loop(&gen.target, &gen.iter, &inner)?;
        }
        Ok(text)
    }

    /// One `for`/`while` header around a single-line body.
    fn build_one_loop(&mut self, target: &Expr, iter: &Expr, body: &str) -> CompileResult<String> {
        // range(...) compiles to a counting while loop.
        if let Expr::Call { func, args, .. } = iter {
            if func.as_name() == Some("range") {
                return self.build_range_loop(target, args, body);
            }
            if func.as_name() == Some("enumerate") {
                if let (Some(arg), Expr::Tuple { elts }) = (args.first(), target) {
                    if let [idx, val] = elts.as_slice() {
                        let seq = self.emit_operand(arg)?;
                        let idx_name = idx.as_name().map(escape_or_discard).unwrap_or_default();
                        let val_name = val.as_name().map(escape_or_discard).unwrap_or_default();
                        return Ok(format!(
                            "for ({}.items, 0..) |{}, {}| {{ {} }}",
                            seq, val_name, idx_name, body
                        ));
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
                            .map(|e| e.as_name().map(escape_or_discard).unwrap_or_default())
                            .collect();
                        return Ok(format!(
                            "for ({}) |{}| {{ {} }}",
                            seqs.join(", "),
                            names.join(", "),
                            body
                        ));
                    }
                }
            }
            // d.items() iteration binds both entry pointers.
            if let Expr::Attribute { value, attr } = func.as_ref() {
                if attr == "items" {
                    if let Expr::Tuple { elts } = target {
                        if let [k, v] = elts.as_slice() {
                            let map = self.emit_operand(value)?;
                            let it = self.next_tmp("it");
                            let entry = self.next_tmp("entry");
                            let k_name = k.as_name().map(escape_or_discard).unwrap_or_default();
                            let v_name = v.as_name().map(escape_or_discard).unwrap_or_default();
                            return Ok(format!(
                                "var {it} = {m}.iterator(); while ({it}.next()) |{e}| {{ const {k} = {e}.key_ptr.*; const {v} = {e}.value_ptr.*; {body} }}",
                                it = it,
                                m = map,
                                e = entry,
                                k = k_name,
                                v = v_name,
                                body = body
                            ));
                        }
                    }
                }
                if attr == "keys" || attr == "values" {
                    let map = self.emit_operand(value)?;
                    let it = self.next_tmp("it");
                    let ptr = self.next_tmp("ptr");
                    let name = target.as_name().map(escape_or_discard).unwrap_or_default();
                    let iter_fn = if attr == "keys" {
                        "keyIterator"
                    } else {
                        "valueIterator"
                    };
                    return Ok(format!(
                        "var {it} = {m}.{f}(); while ({it}.next()) |{p}| {{ const {n} = {p}.*; {body} }}",
                        it = it,
                        m = map,
                        f = iter_fn,
                        p = ptr,
                        n = name,
                        body = body
                    ));
                }
            }
        }

        let iter_ty = self.infer_ty(iter);
        let name = target.as_name().map(escape_or_discard).unwrap_or_default();
        match iter_ty {
            PyType::List(_) => {
                let seq = self.emit_operand(iter)?;
                Ok(format!("for ({}.items) |{}| {{ {} }}", seq, name, body))
            }
            PyType::Str { .. } => {
                // Each element is a one-character slice, not a byte.
                let s = self.emit_operand(iter)?;
                let i = self.next_tmp("i");
                Ok(format!(
                    "var {i}: usize = 0; while ({i} < {s}.len) : ({i} += 1) {{ const {n} = {s}[{i}..{i} + 1]; {body} }}",
                    i = i,
                    s = s,
                    n = name,
                    body = body
                ))
            }
            PyType::Dict { .. } => {
                let map = self.emit_operand(iter)?;
                let it = self.next_tmp("it");
                let ptr = self.next_tmp("ptr");
                Ok(format!(
                    "var {it} = {m}.keyIterator(); while ({it}.next()) |{p}| {{ const {n} = {p}.*; {body} }}",
                    it = it,
                    m = map,
                    p = ptr,
                    n = name,
                    body = body
                ))
            }
            PyType::Set(_) => {
                let set = self.emit_operand(iter)?;
                let it = self.next_tmp("it");
                let ptr = self.next_tmp("ptr");
                Ok(format!(
                    "var {it} = {s}.keyIterator(); while ({it}.next()) |{p}| {{ const {n} = {p}.*; {body} }}",
                    it = it,
                    s = set,
                    p = ptr,
                    n = name,
                    body = body
                ))
            }
            _ => {
                let seq = self.emit_operand(iter)?;
                Ok(format!("for ({}.items) |{}| {{ {} }}", seq, name, body))
            }
        }
    }

    /// Counting loop for `range(...)` with 1/2/3-argument forms.
    pub(crate) fn build_range_loop(
        &mut self,
        target: &Expr,
        args: &[Expr],
        body: &str,
    ) -> CompileResult<String> {
        let name = target.as_name().map(escape_or_discard).unwrap_or_default();
        let (start, stop, step) = match args {
            [stop] => ("0".to_string(), self.emit_operand(stop)?, None),
            [start, stop] => (
                self.emit_operand(start)?,
                self.emit_operand(stop)?,
                None,
            ),
            [start, stop, step] => (
                self.emit_operand(start)?,
                self.emit_operand(stop)?,
                Some((self.emit_operand(step)?, step.as_int())),
            ),
            _ => ("0".to_string(), "0".to_string(), None),
        };
        match step {
            None => Ok(format!(
                "var {n}: i64 = {start}; while ({n} < {stop}) : ({n} += 1) {{ {body} }}",
                n = name,
                start = start,
                stop = stop,
                body = body
            )),
            Some((step_text, step_const)) => {
                let cmp = match step_const {
                    Some(s) if s < 0 => ">",
                    _ => "<",
                };
                Ok(format!(
                    "var {n}: i64 = {start}; while ({n} {cmp} {stop}) : ({n} += {step}) {{ {body} }}",
                    n = name,
                    start = start,
                    cmp = cmp,
                    stop = stop,
                    step = step_text,
                    body = body
                ))
            }
        }
    }

    // ========== Element helpers ==========

    /// Widened element type of a literal's members.
    fn literal_element_type(&mut self, elts: &[Expr]) -> PyType {
        if elts.is_empty() {
            return PyType::Unknown;
        }
        let mut ty = PyType::Bottom;
        for e in elts {
            let t = match e {
                Expr::Starred { value } => match self.infer_ty(value) {
                    PyType::List(element) | PyType::Set(element) => *element,
                    _ => PyType::Unknown,
                },
                other => self.infer_ty(other),
            };
            ty = ty.widen(&t);
        }
        if matches!(ty, PyType::Bottom) {
            PyType::Unknown
        } else {
            ty
        }
    }

    fn is_comptime_scalar_list(&self, elts: &[Expr], elem_ty: &PyType) -> bool {
        let scalar = matches!(
            elem_ty,
            PyType::Int | PyType::Float | PyType::Bool | PyType::Str { .. }
        );
        scalar && elts.iter().all(Expr::is_constant)
    }

    /// Render a constant element cast to the widened type.
    fn render_scalar_const(&mut self, expr: &Expr, elem_ty: &PyType) -> CompileResult<String> {
        let value = expr.as_constant().cloned();
        match (value, elem_ty) {
            (Some(c), PyType::Float) => {
                if let Some(text) = self.render_const_as_float(&c) {
                    return Ok(text);
                }
                self.emit_expr(expr)
            }
            (Some(c), PyType::Str { .. }) => {
                if let Some(text) = self.render_const_as_str(&c) {
                    return Ok(text);
                }
                self.emit_expr(expr)
            }
            _ => self.emit_expr(expr),
        }
    }

    /// Emit one literal element coerced to the container's widened type.
    ///
    /// `dupe_strings` duplicates pre-existing strings so the container's
    /// values can be freed uniformly.
    fn emit_element(
        &mut self,
        expr: &Expr,
        elem_ty: &PyType,
        dupe_strings: bool,
    ) -> CompileResult<String> {
        let ty = self.infer_ty(expr);

        // Constants fold their conversion at emission time.
        if let Some(c) = expr.as_constant() {
            let c = c.clone();
            if elem_ty.is_float() {
                if let Some(text) = self.render_const_as_float(&c) {
                    return Ok(text);
                }
            }
            if elem_ty.is_str() {
                if let Some(text) = self.render_const_as_str(&c) {
                    if dupe_strings && matches!(c, Const::Str(_)) {
                        let alloc = self.allocator_name();
                        return Ok(self
                            .infallible(format!("{}.dupe(u8, {})", alloc, text)));
                    }
                    return Ok(text);
                }
            }
        }

        let text = self.emit_operand(expr)?;
        if elem_ty.is_str() && !ty.is_str() {
            // Format non-string values into the string domain.
            let alloc = self.allocator_name();
            return Ok(match ty {
                PyType::Bool => self.infallible(format!(
                    "std.fmt.allocPrint({}, \"{{s}}\", .{{ if ({}) \"True\" else \"False\" }})",
                    alloc, text
                )),
                PyType::NoneType => "\"None\"".to_string(),
                _ => self.infallible(format!(
                    "std.fmt.allocPrint({}, \"{{d}}\", .{{ {} }})",
                    alloc, text
                )),
            });
        }
        if elem_ty.is_str() && ty.is_str() && dupe_strings {
            let alloc = self.allocator_name();
            return Ok(self.infallible(format!("{}.dupe(u8, {})", alloc, text)));
        }
        Ok(self.coerce(text, &ty, elem_ty))
    }
}

/// Loop capture name: reserved-word-escaped, `_` for unnamed targets.
fn escape_or_discard(name: &str) -> String {
    if name == "_" {
        "_".to_string()
    } else {
        super::escape_ident(name)
    }
}
