//! On-demand type inference over the source AST.
//!
//! Structural recursion assigning a [`PyType`] to every expression.
//! Inference is total: ambiguous cases return `Unknown` rather than
//! failing, which steers the emitter onto the runtime-polymorphic path.
//!
//! Variable facts live in a module-level environment plus one local
//! environment per function; `infer_expr_scoped` consults the current
//! function's locals first so one function's assignments never pollute
//! another's. Lambda and comprehension targets ride a push/pop stack.

#[cfg(test)]
mod tests;

use crate::dispatch;
use crate::registry::{ClassRegistry, ProgramFacts, SignatureTable, VarClasses};
use crate::types::PyType;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use pyzig_ast::{BinOp, CmpOp, Const, Expr, Slice, UnaryOp};
use std::collections::HashMap;

/// Shift widths at or above this force the big-integer representation.
pub const BIGINT_SHIFT_BOUND: i64 = 63;

/// Read-only registry views the inferrer consults.
#[derive(Debug, Clone, Copy)]
pub struct InferCtx<'a> {
    pub classes: &'a ClassRegistry,
    pub sigs: &'a SignatureTable,
    pub facts: &'a ProgramFacts,
    pub vars: &'a VarClasses,
}

/// The type inference engine.
#[derive(Debug, Default)]
pub struct TypeInferencer {
    /// Module-level variable types.
    pub globals: HashMap<String, PyType>,
    /// Per-function local variable types.
    pub locals: HashMap<String, HashMap<String, PyType>>,
    /// Function whose locals `infer_expr_scoped` consults.
    pub current_function: Option<String>,
    /// Lambda / comprehension parameter scope stack.
    lambda_params: Vec<(String, PyType)>,
}

impl TypeInferencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infer against the module environment only.
    pub fn infer_expr(&mut self, expr: &Expr, ctx: &InferCtx<'_>) -> PyType {
        self.infer_in(expr, ctx, false)
    }

    /// Infer consulting the current function's locals first.
    pub fn infer_expr_scoped(&mut self, expr: &Expr, ctx: &InferCtx<'_>) -> PyType {
        self.infer_in(expr, ctx, true)
    }

    /// Push a lambda/comprehension parameter binding.
    pub fn register_param(&mut self, name: &str, ty: PyType) {
        self.lambda_params.push((name.to_string(), ty));
    }

    /// Pop the most recent binding for `name`.
    pub fn unregister_param(&mut self, name: &str) {
        if let Some(pos) = self.lambda_params.iter().rposition(|(n, _)| n == name) {
            self.lambda_params.remove(pos);
        }
    }

    /// Whether `name` is bound on the parameter scope stack.
    pub fn has_param(&self, name: &str) -> bool {
        self.lambda_params.iter().any(|(n, _)| n == name)
    }

    /// Record `lhs = rhs`: the variable's type widens over the new value.
    pub fn record_assignment(&mut self, name: &str, ty: PyType) {
        let env = match &self.current_function {
            Some(f) => self.locals.entry(f.clone()).or_default(),
            None => &mut self.globals,
        };
        let widened = match env.get(name) {
            Some(old) => old.widen(&ty),
            None => ty,
        };
        env.insert(name.to_string(), widened);
    }

    /// Overwrite a binding without widening (parameter registration).
    pub fn set_var(&mut self, name: &str, ty: PyType) {
        match &self.current_function {
            Some(f) => {
                self.locals
                    .entry(f.clone())
                    .or_default()
                    .insert(name.to_string(), ty);
            }
            None => {
                self.globals.insert(name.to_string(), ty);
            }
        }
    }

    fn lookup_var(&self, name: &str, scoped: bool) -> Option<PyType> {
        if let Some((_, ty)) = self.lambda_params.iter().rev().find(|(n, _)| n == name) {
            return Some(ty.clone());
        }
        if scoped {
            if let Some(f) = &self.current_function {
                if let Some(ty) = self.locals.get(f).and_then(|env| env.get(name)) {
                    return Some(ty.clone());
                }
            }
        }
        self.globals.get(name).cloned()
    }

    fn infer_in(&mut self, expr: &Expr, ctx: &InferCtx<'_>, scoped: bool) -> PyType {
        match expr {
            Expr::Constant { value } => infer_constant(value),
            Expr::Name { id } => self.lookup_var(id, scoped).unwrap_or(PyType::Unknown),

            Expr::BinOp { left, op, right } => {
                let l = self.infer_in(left, ctx, scoped);
                let r = self.infer_in(right, ctx, scoped);
                numeric_result(*op, &l, &r, right)
            }

            Expr::UnaryOp { op, operand } => {
                let t = self.infer_in(operand, ctx, scoped);
                match op {
                    UnaryOp::Not => PyType::Bool,
                    UnaryOp::USub | UnaryOp::UAdd => match t {
                        PyType::Usize | PyType::Bool => PyType::Int,
                        other if other.is_numeric() => other,
                        _ => PyType::Unknown,
                    },
                    UnaryOp::Invert => match t {
                        PyType::BigInt => PyType::BigInt,
                        t if t.is_integer() => PyType::Int,
                        _ => PyType::Unknown,
                    },
                }
            }

            Expr::BoolOp { op: _, values } => values
                .iter()
                .map(|v| self.infer_in(v, ctx, scoped))
                .fold(PyType::Bottom, |acc, t| acc.widen(&t)),

            Expr::Compare {
                left, comparators, ..
            } => {
                let l = self.infer_in(left, ctx, scoped);
                let any_array = matches!(l, PyType::NumpyArray)
                    || comparators
                        .iter()
                        .any(|c| matches!(self.infer_in(c, ctx, scoped), PyType::NumpyArray));
                if any_array {
                    PyType::BoolArray
                } else {
                    PyType::Bool
                }
            }

            Expr::Call {
                func,
                args,
                keywords: _,
            } => self.infer_call(func, args, ctx, scoped),

            Expr::Attribute { value, attr } => self.infer_attribute(value, attr, ctx, scoped),

            Expr::Subscript { value, slice } => self.infer_subscript(value, slice, ctx, scoped),

            Expr::Tuple { elts } => PyType::Tuple(
                elts.iter()
                    .map(|e| self.infer_in(e, ctx, scoped))
                    .collect(),
            ),

            Expr::List { elts } => {
                if elts.is_empty() {
                    return PyType::list_of(PyType::Unknown);
                }
                let element = elts
                    .iter()
                    .map(|e| self.infer_in(e, ctx, scoped))
                    .fold(PyType::Bottom, |acc, t| acc.widen(&t));
                PyType::list_of(element)
            }

            Expr::Set { elts } => {
                if elts.is_empty() {
                    return PyType::set_of(PyType::Unknown);
                }
                let element = elts
                    .iter()
                    .map(|e| self.infer_in(e, ctx, scoped))
                    .fold(PyType::Bottom, |acc, t| acc.widen(&t));
                PyType::set_of(element)
            }

            Expr::Dict { keys, values } => {
                let mut key_ty = PyType::Bottom;
                let mut value_ty = PyType::Bottom;
                for (k, v) in keys.iter().zip(values.iter()) {
                    match k {
                        Some(key) => {
                            key_ty = key_ty.widen(&self.infer_in(key, ctx, scoped));
                            value_ty = value_ty.widen(&self.infer_in(v, ctx, scoped));
                        }
                        None => {
                            // `**other`: fold in the unpacked mapping's types.
                            if let PyType::Dict { key, value } = self.infer_in(v, ctx, scoped) {
                                key_ty = key_ty.widen(&key);
                                value_ty = value_ty.widen(&value);
                            }
                        }
                    }
                }
                if matches!(key_ty, PyType::Bottom) {
                    key_ty = PyType::Unknown;
                }
                if matches!(value_ty, PyType::Bottom) {
                    value_ty = PyType::Unknown;
                }
                PyType::dict_of(key_ty, value_ty)
            }

            Expr::IfExp {
                test: _,
                body,
                orelse,
            } => {
                let a = self.infer_in(body, ctx, scoped);
                let b = self.infer_in(orelse, ctx, scoped);
                a.widen(&b)
            }

            Expr::ListComp { elt, generators } | Expr::GeneratorExp { elt, generators } => {
                let element = self.infer_comp_element(elt, generators, ctx, scoped);
                PyType::list_of(element)
            }

            Expr::SetComp { elt, generators } => {
                let element = self.infer_comp_element(elt, generators, ctx, scoped);
                PyType::set_of(element)
            }

            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let bound = self.bind_comp_targets(generators, ctx, scoped);
                let k = self.infer_in(key, ctx, scoped);
                let v = self.infer_in(value, ctx, scoped);
                self.unbind_comp_targets(&bound);
                PyType::dict_of(k, v)
            }

            Expr::Lambda { .. } => PyType::Unknown,
            Expr::Starred { value } => self.infer_in(value, ctx, scoped),
        }
    }

    fn infer_comp_element(
        &mut self,
        elt: &Expr,
        generators: &[pyzig_ast::Comprehension],
        ctx: &InferCtx<'_>,
        scoped: bool,
    ) -> PyType {
        let bound = self.bind_comp_targets(generators, ctx, scoped);
        let element = self.infer_in(elt, ctx, scoped);
        self.unbind_comp_targets(&bound);
        element
    }

    fn bind_comp_targets(
        &mut self,
        generators: &[pyzig_ast::Comprehension],
        ctx: &InferCtx<'_>,
        scoped: bool,
    ) -> Vec<String> {
        let mut bound = Vec::new();
        for gen in generators {
            let elem = self.iterator_element(&gen.iter, ctx, scoped);
            match &gen.target {
                Expr::Name { id } => {
                    self.register_param(id, elem);
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
                            self.register_param(name, ty);
                            bound.push(name.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        bound
    }

    fn unbind_comp_targets(&mut self, bound: &[String]) {
        for name in bound.iter().rev() {
            self.unregister_param(name);
        }
    }

    /// Element type produced by iterating `iter`.
    pub fn iterator_element(&mut self, iter: &Expr, ctx: &InferCtx<'_>, scoped: bool) -> PyType {
        // range(...) iterates native integers.
        if let Expr::Call { func, args, .. } = iter {
            match func.as_name() {
                Some("range") => return PyType::Int,
                Some("enumerate") => {
                    let inner = args
                        .first()
                        .map(|a| self.iterator_element(a, ctx, scoped))
                        .unwrap_or(PyType::Unknown);
                    return PyType::Tuple(vec![PyType::Usize, inner]);
                }
                Some("zip") => {
                    let items = args
                        .iter()
                        .map(|a| self.iterator_element(a, ctx, scoped))
                        .collect();
                    return PyType::Tuple(items);
                }
                _ => {}
            }
            // d.keys() / d.values() / d.items()
            if let Expr::Attribute { value, attr } = func.as_ref() {
                if let PyType::Dict { key, value: val } = self.infer_in(value, ctx, scoped) {
                    match attr.as_str() {
                        "keys" => return *key,
                        "values" => return *val,
                        "items" => return PyType::Tuple(vec![*key, *val]),
                        _ => {}
                    }
                }
            }
        }

        match self.infer_in(iter, ctx, scoped) {
            PyType::List(element) | PyType::Set(element) => *element,
            PyType::Dict { key, .. } => *key,
            PyType::Str { mode } => PyType::Str { mode },
            PyType::Tuple(items) => {
                if items.is_empty() {
                    PyType::Unknown
                } else {
                    let first = items[0].clone();
                    items.iter().fold(first, |acc, t| acc.widen(t))
                }
            }
            PyType::NumpyArray => PyType::Float,
            _ => PyType::Unknown,
        }
    }

    fn infer_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        ctx: &InferCtx<'_>,
        scoped: bool,
    ) -> PyType {
        match func {
            Expr::Name { id } => {
                if let Some(ty) = self.infer_builtin_call(id, args, ctx, scoped) {
                    return ty;
                }
                // Class constructor.
                if ctx.classes.contains(id) {
                    return PyType::Instance(id.clone());
                }
                // Lambda / closure variables carry a recorded return type.
                if ctx.vars.lambda_vars.contains(id) || ctx.vars.closure_vars.contains(id) {
                    return ctx
                        .vars
                        .lambda_returns
                        .get(id)
                        .cloned()
                        .unwrap_or(PyType::Unknown);
                }
                // From-imported functions go through the registry.
                if let Some((module, function)) = ctx.facts.from_imports.get(id) {
                    if let Some(entry) = dispatch::module_function(module, function) {
                        return entry.ret.clone();
                    }
                }
                // User function: the signature's inferred return type.
                if let Some(sig) = ctx.sigs.get(id) {
                    return sig.return_type.clone();
                }
                PyType::Unknown
            }
            Expr::Attribute { value, attr } => {
                // Module-qualified call.
                if let Some(alias) = value.as_name() {
                    if let Some(module) = ctx.facts.module_of(alias) {
                        if let Some(entry) = dispatch::module_function(module, attr) {
                            return entry.ret.clone();
                        }
                    }
                }
                let receiver = self.infer_in(value, ctx, scoped);
                self.infer_method_call(&receiver, attr, args, ctx, scoped)
            }
            Expr::Call { .. } => {
                // Calling a call result: a closure value dispatches through
                // its recorded `call` return type.
                match self.infer_in(func, ctx, scoped) {
                    PyType::Closure(name) => ctx
                        .vars
                        .closure_call_returns
                        .get(&name)
                        .cloned()
                        .unwrap_or(PyType::Unknown),
                    _ => PyType::Unknown,
                }
            }
            Expr::Lambda { args: la, body } => {
                // Immediately-invoked lambda: the body's type with parameters
                // bound to the argument types.
                let mut bound = Vec::new();
                for (param, arg) in la.args.iter().zip(args.iter()) {
                    let ty = self.infer_in(arg, ctx, scoped);
                    self.register_param(&param.arg, ty);
                    bound.push(param.arg.clone());
                }
                let result = self.infer_in(body, ctx, scoped);
                for name in bound.iter().rev() {
                    self.unregister_param(name);
                }
                result
            }
            _ => PyType::Unknown,
        }
    }

    fn infer_builtin_call(
        &mut self,
        name: &str,
        args: &[Expr],
        ctx: &InferCtx<'_>,
        scoped: bool,
    ) -> Option<PyType> {
        let arg_ty = |me: &mut Self, i: usize| {
            args.get(i)
                .map(|a| me.infer_in(a, ctx, scoped))
                .unwrap_or(PyType::Unknown)
        };
        let ty = match name {
            "len" => PyType::Usize,
            "range" => PyType::list_of(PyType::Int),
            "print" => PyType::NoneType,
            "abs" => match arg_ty(self, 0) {
                PyType::Usize | PyType::Bool => PyType::Int,
                t if t.is_numeric() => t,
                _ => PyType::Unknown,
            },
            "int" => PyType::Int,
            "float" => PyType::Float,
            "bool" => PyType::Bool,
            "str" => PyType::runtime_str(),
            "sum" => {
                let element = match args.first() {
                    Some(a) => self.iterator_element(a, ctx, scoped),
                    None => PyType::Unknown,
                };
                match element {
                    PyType::Float => PyType::Float,
                    PyType::BigInt => PyType::BigInt,
                    t if t.is_integer() => PyType::Int,
                    _ => PyType::Unknown,
                }
            }
            "min" | "max" => {
                if args.len() == 1 {
                    self.iterator_element(&args[0], ctx, scoped)
                } else {
                    args.iter()
                        .map(|a| self.infer_in(a, ctx, scoped))
                        .fold(PyType::Bottom, |acc, t| acc.widen(&t))
                }
            }
            "sorted" | "list" => {
                let element = match args.first() {
                    Some(a) => self.iterator_element(a, ctx, scoped),
                    None => PyType::Unknown,
                };
                PyType::list_of(element)
            }
            "set" => {
                let element = match args.first() {
                    Some(a) => self.iterator_element(a, ctx, scoped),
                    None => PyType::Unknown,
                };
                PyType::set_of(element)
            }
            "enumerate" => {
                let element = match args.first() {
                    Some(a) => self.iterator_element(a, ctx, scoped),
                    None => PyType::Unknown,
                };
                PyType::list_of(PyType::Tuple(vec![PyType::Usize, element]))
            }
            "zip" => {
                let items: Vec<_> = args
                    .iter()
                    .map(|a| self.iterator_element(a, ctx, scoped))
                    .collect();
                PyType::list_of(PyType::Tuple(items))
            }
            _ => return None,
        };
        Some(ty)
    }

    fn infer_method_call(
        &mut self,
        receiver: &PyType,
        method: &str,
        args: &[Expr],
        ctx: &InferCtx<'_>,
        scoped: bool,
    ) -> PyType {
        match receiver {
            PyType::Instance(class) => ctx
                .classes
                .find_method(class, method)
                .map(|m| m.return_type.clone())
                .unwrap_or(PyType::Unknown),
            PyType::List(element) => match method {
                "pop" => (**element).clone(),
                "count" | "index" => PyType::Usize,
                "copy" => receiver.clone(),
                "append" | "extend" | "insert" | "remove" | "clear" | "sort" | "reverse" => {
                    PyType::NoneType
                }
                _ => PyType::Unknown,
            },
            PyType::Str { .. } => match method {
                "upper" | "lower" | "strip" | "lstrip" | "rstrip" | "replace" | "format"
                | "join" => PyType::runtime_str(),
                "split" => PyType::list_of(PyType::runtime_str()),
                "startswith" | "endswith" | "isdigit" | "isalpha" => PyType::Bool,
                "find" => PyType::Int,
                "count" => PyType::Usize,
                _ => PyType::Unknown,
            },
            PyType::Dict { key, value } => match method {
                "get" => {
                    if args.len() > 1 {
                        let default = self.infer_in(&args[1], ctx, scoped);
                        value.widen(&default)
                    } else {
                        (**value).clone()
                    }
                }
                "pop" => (**value).clone(),
                "keys" => PyType::list_of((**key).clone()),
                "values" => PyType::list_of((**value).clone()),
                "items" => {
                    PyType::list_of(PyType::Tuple(vec![(**key).clone(), (**value).clone()]))
                }
                "update" | "clear" => PyType::NoneType,
                _ => PyType::Unknown,
            },
            PyType::Set(_) => match method {
                "add" | "discard" | "remove" | "clear" => PyType::NoneType,
                _ => PyType::Unknown,
            },
            PyType::NumpyArray => match method {
                "sum" | "mean" | "min" | "max" => PyType::Float,
                "transpose" | "reshape" | "copy" => PyType::NumpyArray,
                _ => PyType::Unknown,
            },
            PyType::BigInt => PyType::BigInt,
            _ => PyType::Unknown,
        }
    }

    fn infer_attribute(
        &mut self,
        value: &Expr,
        attr: &str,
        ctx: &InferCtx<'_>,
        scoped: bool,
    ) -> PyType {
        // Module constants (math.pi and friends).
        if let Some(alias) = value.as_name() {
            if let Some(module) = ctx.facts.module_of(alias) {
                if let Some((_, ty)) = dispatch::module_constant(module, attr) {
                    return ty;
                }
            }
        }
        match self.infer_in(value, ctx, scoped) {
            PyType::Instance(class) => {
                if let Some(ty) = ctx.classes.get_field(&class, attr) {
                    return ty.clone();
                }
                // Property-decorated methods read as their return type.
                if let Some(m) = ctx.classes.find_method(&class, attr) {
                    if m.is_property {
                        return m.return_type.clone();
                    }
                }
                PyType::Unknown
            }
            PyType::NumpyArray => match attr {
                "T" => PyType::NumpyArray,
                "shape" => PyType::Tuple(vec![PyType::Usize, PyType::Usize]),
                "size" => PyType::Usize,
                _ => PyType::Unknown,
            },
            _ => PyType::Unknown,
        }
    }

    fn infer_subscript(
        &mut self,
        value: &Expr,
        slice: &Slice,
        ctx: &InferCtx<'_>,
        scoped: bool,
    ) -> PyType {
        let receiver = self.infer_in(value, ctx, scoped);
        match (&receiver, slice) {
            (PyType::NumpyArray, _) => infer_numpy_subscript(slice, self, ctx, scoped),
            (PyType::List(element), Slice::Index { .. }) => (**element).clone(),
            (PyType::List(_), Slice::Slice { .. }) => receiver.clone(),
            (PyType::Str { mode }, Slice::Index { .. } | Slice::Slice { .. }) => {
                // A one-character slice, not a char.
                PyType::Str { mode: *mode }
            }
            (PyType::Dict { value: v, .. }, Slice::Index { .. }) => (**v).clone(),
            (PyType::Tuple(items), Slice::Index { value: idx }) => match idx.as_int() {
                Some(i) => {
                    let len = items.len() as i64;
                    let real = if i < 0 { len + i } else { i };
                    items
                        .get(real.max(0) as usize)
                        .cloned()
                        .unwrap_or(PyType::Unknown)
                }
                None => PyType::Unknown,
            },
            _ => PyType::Unknown,
        }
    }
}

fn infer_numpy_subscript(
    slice: &Slice,
    inferencer: &mut TypeInferencer,
    ctx: &InferCtx<'_>,
    scoped: bool,
) -> PyType {
    match slice {
        Slice::Index { value } => match value.as_ref() {
            // a[i, j] selects a scalar.
            Expr::Tuple { elts } if elts.len() == 2 => PyType::Float,
            other => {
                // Boolean mask indexing keeps the array shape.
                if matches!(
                    inferencer.infer_in(other, ctx, scoped),
                    PyType::BoolArray
                ) {
                    PyType::NumpyArray
                } else {
                    PyType::Float
                }
            }
        },
        Slice::Slice { .. } => PyType::NumpyArray,
        Slice::ExtSlice { dims } => match dims.as_slice() {
            // a[i, :] is a row slice, a[:, j] a column slice.
            [Slice::Index { .. }, Slice::Index { .. }] => PyType::Float,
            _ => PyType::NumpyArray,
        },
    }
}

fn infer_constant(value: &Const) -> PyType {
    match value {
        Const::None => PyType::NoneType,
        Const::Bool(_) => PyType::Bool,
        Const::Int(_) => PyType::Int,
        Const::Float(_) => PyType::Float,
        Const::Str(_) => PyType::static_str(),
        Const::Big { .. } => PyType::BigInt,
    }
}

/// Result type of a numeric binary operation under the promotion rules.
pub fn numeric_result(op: BinOp, left: &PyType, right: &PyType, right_expr: &Expr) -> PyType {
    use PyType::{BigInt as Big, Float, Int};

    // A not-yet-inferred operand (recursive calls mid fixed point) stays
    // neutral so the enclosing widen can settle on the other branch.
    if matches!(left, PyType::Bottom) || matches!(right, PyType::Bottom) {
        return PyType::Bottom;
    }

    // Array arithmetic broadcasts.
    if matches!(left, PyType::NumpyArray) || matches!(right, PyType::NumpyArray) {
        return PyType::NumpyArray;
    }
    if op == BinOp::MatMult {
        return PyType::NumpyArray;
    }

    // String and list algebra.
    if left.is_str() {
        return match op {
            BinOp::Add | BinOp::Mult | BinOp::Mod => PyType::runtime_str(),
            _ => PyType::Unknown,
        };
    }
    if right.is_str() && op == BinOp::Mult {
        return PyType::runtime_str();
    }
    if let PyType::List(_) = left {
        return match op {
            BinOp::Add => left.widen(right),
            BinOp::Mult => left.clone(),
            _ => PyType::Unknown,
        };
    }

    // Large shifts route to the big-integer runtime even for native operands.
    if op == BinOp::LShift && left.is_integer() {
        let shift = right_expr.as_int();
        if shift.map_or(true, |s| s >= BIGINT_SHIFT_BOUND) {
            return Big;
        }
    }

    let either_big = matches!(left, Big) || matches!(right, Big);
    let either_float = left.is_float() || right.is_float();
    let both_numeric = left.is_numeric() && right.is_numeric();
    if !both_numeric {
        return PyType::Unknown;
    }

    match op {
        BinOp::Div => Float,
        BinOp::FloorDiv | BinOp::Mod => {
            if either_big {
                Big
            } else if either_float {
                Float
            } else {
                Int
            }
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::LShift | BinOp::RShift => {
            if either_big {
                Big
            } else {
                Int
            }
        }
        _ => {
            if either_big {
                Big
            } else if either_float {
                Float
            } else if matches!(left, PyType::Usize) && matches!(right, PyType::Usize) {
                PyType::Usize
            } else {
                Int
            }
        }
    }
}

/// True when the constant cannot be held in a native integer.
pub fn exceeds_native_width(value: &BigInt) -> bool {
    value.to_i64().is_none()
}

/// Whether a comparison between these operand types is array-broadcasted.
pub fn is_array_compare(left: &PyType, right: &PyType) -> bool {
    matches!(left, PyType::NumpyArray) || matches!(right, PyType::NumpyArray)
}

/// Fold `x is None` / `x == None` style comparisons at inference time.
///
/// Returns the known boolean when one side is the `None` literal and the
/// other side's type rules the answer out; `None` when the comparison must
/// be emitted.
pub fn fold_none_compare(op: CmpOp, left: &PyType, right: &PyType) -> Option<bool> {
    let other = match (left, right) {
        (PyType::NoneType, t) | (t, PyType::NoneType) => t,
        _ => return None,
    };
    match op {
        CmpOp::Is | CmpOp::Eq => match other {
            PyType::NoneType => Some(true),
            PyType::Unknown => None,
            _ => Some(false),
        },
        CmpOp::IsNot | CmpOp::NotEq => match other {
            PyType::NoneType => Some(false),
            PyType::Unknown => None,
            _ => Some(true),
        },
        _ => None,
    }
}

/// Short-circuit truthiness classification used by `BoolOp` emission.
pub fn truthy_kind(ty: &PyType) -> TruthyKind {
    match ty {
        PyType::Bool => TruthyKind::Direct,
        PyType::Int | PyType::Usize => TruthyKind::NonZeroInt,
        PyType::Float => TruthyKind::NonZeroFloat,
        PyType::Str { .. } => TruthyKind::NonEmptyStr,
        PyType::List(_) => TruthyKind::NonEmptyList,
        PyType::Dict { .. } | PyType::Set(_) => TruthyKind::NonEmptyMap,
        PyType::NoneType => TruthyKind::AlwaysFalse,
        _ => TruthyKind::Runtime,
    }
}

/// How a condition of a given type lowers to a Zig boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruthyKind {
    Direct,
    NonZeroInt,
    NonZeroFloat,
    NonEmptyStr,
    NonEmptyList,
    NonEmptyMap,
    AlwaysFalse,
    Runtime,
}
