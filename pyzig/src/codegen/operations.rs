//! Binary operation emission: numeric operators, BigInt routing, string
//! concatenation flattening and `%` format expansion.

use super::ZigCodeGenerator;
use crate::infer::numeric_result;
use crate::types::PyType;
use crate::{CompileError, CompileResult};
use pyzig_ast::{BinOp, Const, Expr};

/// Runtime method name for a big-integer operation.
fn bigint_method(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mult => "mul",
        BinOp::FloorDiv => "floorDiv",
        BinOp::Mod => "mod",
        BinOp::BitAnd => "bitAnd",
        BinOp::BitOr => "bitOr",
        BinOp::BitXor => "bitXor",
        BinOp::LShift => "shl",
        BinOp::RShift => "shr",
        BinOp::Pow => "pow",
        _ => return None,
    })
}

fn zig_op(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mult => "*",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::BitAnd => "&",
        BinOp::LShift => "<<",
        BinOp::RShift => ">>",
        // The remaining operators never reach the direct path.
        _ => "+",
    }
}

impl ZigCodeGenerator {
    pub(crate) fn emit_binop(
        &mut self,
        left: &Expr,
        op: BinOp,
        right: &Expr,
    ) -> CompileResult<String> {
        let l_ty = self.infer_ty(left);
        let r_ty = self.infer_ty(right);

        // Numeric-array arithmetic broadcasts through the runtime.
        if matches!(l_ty, PyType::NumpyArray) || matches!(r_ty, PyType::NumpyArray) {
            return self.emit_array_binop(left, op, right);
        }

        // String algebra.
        if l_ty.is_str() {
            match op {
                BinOp::Add if r_ty.is_str() => {
                    return self.emit_str_concat(left, right);
                }
                BinOp::Mod => return self.emit_percent_format(left, right),
                BinOp::Mult => {
                    let s = self.emit_operand(left)?;
                    let n = self.emit_operand(right)?;
                    let alloc = self.allocator_name();
                    return Ok(
                        self.infallible(format!("runtime.strRepeat({}, {}, {})", alloc, s, n))
                    );
                }
                _ => {}
            }
        }
        if r_ty.is_str() && op == BinOp::Mult {
            let n = self.emit_operand(left)?;
            let s = self.emit_operand(right)?;
            let alloc = self.allocator_name();
            return Ok(self.infallible(format!("runtime.strRepeat({}, {}, {})", alloc, s, n)));
        }

        // List algebra.
        if let PyType::List(_) = l_ty {
            let a = self.emit_operand(left)?;
            let b = self.emit_operand(right)?;
            let alloc = self.allocator_name();
            return Ok(match op {
                BinOp::Add => self.fallible(format!("runtime.concat({}, {}, {})", alloc, a, b)),
                BinOp::Mult => {
                    self.fallible(format!("runtime.listRepeat({}, {}, {})", alloc, a, b))
                }
                _ => {
                    return Err(CompileError::Node {
                        node: "BinOp",
                        message: "unsupported list operator".to_string(),
                    })
                }
            });
        }

        let result_ty = numeric_result(op, &l_ty, &r_ty, right);

        // BigInt routing: either operand already big, or a statically-known
        // large result (oversized shifts).
        if matches!(result_ty, PyType::BigInt)
            && (matches!(l_ty, PyType::BigInt)
                || matches!(r_ty, PyType::BigInt)
                || op == BinOp::LShift)
        {
            return self.emit_bigint_binop(left, op, right, &l_ty, &r_ty);
        }

        match op {
            BinOp::Div => self.emit_true_division(left, right, &l_ty, &r_ty),
            BinOp::FloorDiv => self.emit_floor_division(left, right, &l_ty, &r_ty),
            BinOp::Mod => self.emit_modulo(left, right, &l_ty, &r_ty),
            BinOp::Pow => self.emit_power(left, right, &l_ty, &r_ty, &result_ty),
            BinOp::MatMult => self.emit_array_binop(left, op, right),
            _ => self.emit_direct_binop(left, op, right, &l_ty, &r_ty, &result_ty),
        }
    }

    fn emit_direct_binop(
        &mut self,
        left: &Expr,
        op: BinOp,
        right: &Expr,
        l_ty: &PyType,
        r_ty: &PyType,
        result_ty: &PyType,
    ) -> CompileResult<String> {
        // Dynamic operands degrade to the runtime integer view.
        if matches!(l_ty, PyType::Unknown) || matches!(r_ty, PyType::Unknown) {
            let l = self.emit_operand(left)?;
            let r = self.emit_operand(right)?;
            let l = wrap_dynamic(&l, l_ty);
            let r = wrap_dynamic(&r, r_ty);
            return Ok(format!("({} {} {})", l, zig_op(op), r));
        }

        let l = self.emit_operand(left)?;
        let r = self.emit_operand(right)?;
        let l = self.coerce(l, l_ty, result_ty);
        let r = if matches!(op, BinOp::LShift | BinOp::RShift) {
            // Shift widths take the target's narrow unsigned type.
            match right.as_int() {
                Some(_) => r,
                None => format!("@intCast({})", r),
            }
        } else {
            self.coerce(r, r_ty, result_ty)
        };
        Ok(format!("({} {} {})", l, zig_op(op), r))
    }

    fn emit_bigint_binop(
        &mut self,
        left: &Expr,
        op: BinOp,
        right: &Expr,
        l_ty: &PyType,
        r_ty: &PyType,
    ) -> CompileResult<String> {
        self.stats.bigint_routes += 1;
        let alloc = self.allocator_name().to_string();

        // True division leaves the big-integer domain.
        if op == BinOp::Div {
            let l = self.emit_bigint_operand(left, l_ty)?;
            let r = self.emit_bigint_operand(right, r_ty)?;
            return Ok(self.fallible(format!(
                "runtime.divideFloat({}.toFloat(), {}.toFloat())",
                l, r
            )));
        }

        let method = bigint_method(op).ok_or_else(|| CompileError::Node {
            node: "BinOp",
            message: "operator has no big-integer routing".to_string(),
        })?;

        let l = self.emit_bigint_operand(left, l_ty)?;
        // Shift counts stay native.
        let r = if matches!(op, BinOp::LShift | BinOp::RShift) {
            self.emit_operand(right)?
        } else {
            self.emit_bigint_operand(right, r_ty)?
        };
        Ok(self.infallible(format!("{}.{}({}, {})", l, method, alloc, r)))
    }

    /// Promote a native operand into the big-integer domain.
    fn emit_bigint_operand(&mut self, expr: &Expr, ty: &PyType) -> CompileResult<String> {
        let text = self.emit_operand(expr)?;
        if matches!(ty, PyType::BigInt) {
            Ok(text)
        } else {
            let alloc = self.allocator_name();
            Ok(self.infallible(format!("runtime.BigInt.fromInt({}, {})", alloc, text)))
        }
    }

    fn emit_true_division(
        &mut self,
        left: &Expr,
        right: &Expr,
        l_ty: &PyType,
        r_ty: &PyType,
    ) -> CompileResult<String> {
        let l = self.emit_operand(left)?;
        let r = self.emit_operand(right)?;
        let l = self.coerce(l, l_ty, &PyType::Float);
        let r = self.coerce(r, r_ty, &PyType::Float);
        if self.scope_depth == 0 {
            // Module-level initializers cannot be fallible.
            Ok(format!("({} / {})", l, r))
        } else {
            Ok(self.fallible(format!("runtime.divideFloat({}, {})", l, r)))
        }
    }

    fn emit_floor_division(
        &mut self,
        left: &Expr,
        right: &Expr,
        l_ty: &PyType,
        r_ty: &PyType,
    ) -> CompileResult<String> {
        let l = self.emit_operand(left)?;
        let r = self.emit_operand(right)?;
        if l_ty.is_float() || r_ty.is_float() {
            let l = self.coerce(l, l_ty, &PyType::Float);
            let r = self.coerce(r, r_ty, &PyType::Float);
            if self.scope_depth == 0 {
                return Ok(format!("std.math.floor({} / {})", l, r));
            }
            let div = self.fallible(format!("runtime.divideFloat({}, {})", l, r));
            return Ok(format!("std.math.floor({})", div));
        }
        let l = self.coerce(l, l_ty, &PyType::Int);
        let r = self.coerce(r, r_ty, &PyType::Int);
        if self.scope_depth == 0 {
            Ok(format!("@divFloor({}, {})", l, r))
        } else {
            Ok(self.fallible(format!("runtime.divideInt({}, {})", l, r)))
        }
    }

    fn emit_modulo(
        &mut self,
        left: &Expr,
        right: &Expr,
        l_ty: &PyType,
        r_ty: &PyType,
    ) -> CompileResult<String> {
        let l = self.emit_operand(left)?;
        let r = self.emit_operand(right)?;
        if l_ty.is_float() || r_ty.is_float() {
            let l = self.coerce(l, l_ty, &PyType::Float);
            let r = self.coerce(r, r_ty, &PyType::Float);
            return Ok(format!("@mod({}, {})", l, r));
        }
        let l = self.coerce(l, l_ty, &PyType::Int);
        let r = self.coerce(r, r_ty, &PyType::Int);
        if self.scope_depth == 0 {
            Ok(format!("@mod({}, {})", l, r))
        } else {
            Ok(self.fallible(format!("runtime.moduloInt({}, {})", l, r)))
        }
    }

    fn emit_power(
        &mut self,
        left: &Expr,
        right: &Expr,
        l_ty: &PyType,
        r_ty: &PyType,
        result_ty: &PyType,
    ) -> CompileResult<String> {
        let l = self.emit_operand(left)?;
        let r = self.emit_operand(right)?;
        if matches!(result_ty, PyType::Float) {
            let l = self.coerce(l, l_ty, &PyType::Float);
            let r = self.coerce(r, r_ty, &PyType::Float);
            Ok(format!("std.math.pow(f64, {}, {})", l, r))
        } else {
            let l = self.coerce(l, l_ty, &PyType::Int);
            let r = self.coerce(r, r_ty, &PyType::Int);
            Ok(format!("std.math.pow(i64, {}, {})", l, r))
        }
    }

    fn emit_array_binop(&mut self, left: &Expr, op: BinOp, right: &Expr) -> CompileResult<String> {
        let a = self.emit_operand(left)?;
        let b = self.emit_operand(right)?;
        let alloc = self.allocator_name();
        if op == BinOp::MatMult {
            return Ok(self.fallible(format!("runtime.matmul({}, {}, {})", alloc, a, b)));
        }
        let tag = match op {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mult => "mul",
            BinOp::Div => "div",
            _ => {
                return Err(CompileError::Node {
                    node: "BinOp",
                    message: "unsupported array operator".to_string(),
                })
            }
        };
        Ok(self.fallible(format!(
            "runtime.broadcastOp({}, .{}, {}, {})",
            alloc, tag, a, b
        )))
    }

    // ========== String concatenation ==========

    /// Flatten `a + b + c + d` into one multi-argument concat call rather
    /// than three pairwise allocations.
    fn emit_str_concat(&mut self, left: &Expr, right: &Expr) -> CompileResult<String> {
        let mut parts: Vec<&Expr> = Vec::new();
        self.collect_concat_parts(left, &mut parts);
        self.collect_concat_parts(right, &mut parts);

        let mut rendered = Vec::with_capacity(parts.len());
        for part in parts {
            rendered.push(self.emit_operand(part)?);
        }
        let alloc = self.allocator_name();
        Ok(self.infallible(format!(
            "runtime.strConcat({}, &[_][]const u8{{ {} }})",
            alloc,
            rendered.join(", ")
        )))
    }

    fn collect_concat_parts<'e>(&mut self, expr: &'e Expr, parts: &mut Vec<&'e Expr>) {
        if let Expr::BinOp {
            left,
            op: BinOp::Add,
            right,
        } = expr
        {
            let l_ty = self.infer_ty(left);
            let r_ty = self.infer_ty(right);
            if l_ty.is_str() && r_ty.is_str() {
                self.collect_concat_parts(left, parts);
                self.collect_concat_parts(right, parts);
                return;
            }
        }
        parts.push(expr);
    }

    // ========== `%` formatting ==========

    /// Expand a printf-like format string into a `std.fmt.allocPrint` call.
    ///
    /// Supported conversions: `d i s f x X o r %`. Unknown specifiers are
    /// emitted verbatim.
    fn emit_percent_format(&mut self, left: &Expr, right: &Expr) -> CompileResult<String> {
        let Some(Const::Str(pattern)) = left.as_constant() else {
            return Err(CompileError::Node {
                node: "BinOp",
                message: "% formatting requires a literal format string".to_string(),
            });
        };
        let pattern = pattern.clone();

        let args: Vec<&Expr> = match right {
            Expr::Tuple { elts } => elts.iter().collect(),
            other => vec![other],
        };

        let mut fmt = String::new();
        let mut used = 0usize;
        let mut rendered_args: Vec<String> = Vec::new();
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                match c {
                    '{' => fmt.push_str("{{"),
                    '}' => fmt.push_str("}}"),
                    other => fmt.push(other),
                }
                continue;
            }
            match chars.next() {
                Some('%') => fmt.push('%'),
                Some(spec @ ('d' | 'i' | 's' | 'f' | 'x' | 'X' | 'o' | 'r')) => {
                    let arg = args.get(used).ok_or_else(|| CompileError::Node {
                        node: "BinOp",
                        message: "not enough arguments for format string".to_string(),
                    })?;
                    used += 1;
                    let arg_ty = self.infer_ty(arg);
                    let mut text = self.emit_operand(arg)?;
                    match spec {
                        'd' | 'i' => fmt.push_str("{d}"),
                        'f' => {
                            fmt.push_str("{d:.6}");
                            text = self.coerce(text, &arg_ty, &PyType::Float);
                        }
                        'x' => fmt.push_str("{x}"),
                        'X' => fmt.push_str("{X}"),
                        'o' => fmt.push_str("{o}"),
                        's' | 'r' => {
                            fmt.push_str("{s}");
                            if matches!(arg_ty, PyType::Bool) {
                                text = format!("(if ({}) \"True\" else \"False\")", text);
                            }
                        }
                        _ => unreachable!("specifier set is closed"),
                    }
                    rendered_args.push(text);
                }
                Some(other) => {
                    // Unknown specifier: emitted verbatim.
                    fmt.push('%');
                    match other {
                        '{' => fmt.push_str("{{"),
                        '}' => fmt.push_str("}}"),
                        c => fmt.push(c),
                    }
                }
                None => fmt.push('%'),
            }
        }

        let alloc = self.allocator_name();
        Ok(self.infallible(format!(
            "std.fmt.allocPrint({}, {}, .{{ {} }})",
            alloc,
            super::constants::zig_string_literal(&fmt),
            rendered_args.join(", ")
        )))
    }
}

/// Degrade a dynamic operand to the runtime integer view.
fn wrap_dynamic(text: &str, ty: &PyType) -> String {
    if matches!(ty, PyType::Unknown) {
        format!("runtime.pyObjToInt({})", text)
    } else {
        text.to_string()
    }
}
