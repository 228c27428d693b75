//! Comparison, containment and identity emission.
//!
//! Chained comparisons expand to a parenthesized conjunction. String
//! equality is byte equality; `in` dispatches on the container's element
//! type; `None` comparisons against statically known non-`None` types fold
//! to their constant answer while keeping the operand reads alive.

use super::ZigCodeGenerator;
use crate::infer::{fold_none_compare, is_array_compare};
use crate::types::PyType;
use crate::{CompileError, CompileResult};
use pyzig_ast::{CmpOp, Expr};

fn zig_cmp(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq | CmpOp::Is => "==",
        CmpOp::NotEq | CmpOp::IsNot => "!=",
        CmpOp::Lt => "<",
        CmpOp::LtE => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtE => ">=",
        CmpOp::In | CmpOp::NotIn => "==",
    }
}

/// Runtime tag for broadcasted array predicates.
fn array_cmp_tag(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "eq",
        CmpOp::NotEq => "ne",
        CmpOp::Lt => "lt",
        CmpOp::LtE => "le",
        CmpOp::Gt => "gt",
        CmpOp::GtE => "ge",
        _ => "eq",
    }
}

impl ZigCodeGenerator {
    /// Emit a (possibly chained) comparison.
    ///
    /// `a < b < c` expands to `((a < b) and (b < c))`.
    pub(crate) fn emit_compare(
        &mut self,
        left: &Expr,
        ops: &[CmpOp],
        comparators: &[Expr],
    ) -> CompileResult<String> {
        if ops.len() != comparators.len() || ops.is_empty() {
            return Err(CompileError::Node {
                node: "Compare",
                message: "operator/comparator arity mismatch".to_string(),
            });
        }
        let mut parts = Vec::with_capacity(ops.len());
        let mut lhs = left;
        for (op, rhs) in ops.iter().zip(comparators.iter()) {
            parts.push(self.emit_single_compare(lhs, *op, rhs)?);
            lhs = rhs;
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap_or_default())
        } else {
            Ok(format!("({})", parts.join(" and ")))
        }
    }

    fn emit_single_compare(&mut self, left: &Expr, op: CmpOp, right: &Expr) -> CompileResult<String> {
        let l_ty = self.infer_ty(left);
        let r_ty = self.infer_ty(right);

        // None comparisons against known non-None types fold at emit time.
        if matches!(op, CmpOp::Is | CmpOp::IsNot | CmpOp::Eq | CmpOp::NotEq) {
            if let Some(answer) = fold_none_compare(op, &l_ty, &r_ty) {
                return self.emit_folded_compare(left, right, answer);
            }
        }

        match op {
            CmpOp::In | CmpOp::NotIn => {
                let test = self.emit_containment(left, right, &l_ty, &r_ty)?;
                Ok(if op == CmpOp::NotIn {
                    format!("!{}", test)
                } else {
                    test
                })
            }
            _ => {
                // Broadcasted array predicates return a boolean array.
                if is_array_compare(&l_ty, &r_ty) {
                    let arr = self.emit_operand(left)?;
                    let other = self.emit_operand(right)?;
                    let both_arrays = matches!(l_ty, PyType::NumpyArray)
                        && matches!(r_ty, PyType::NumpyArray);
                    let callee = if both_arrays {
                        "runtime.compareArrays"
                    } else {
                        "runtime.compareScalar"
                    };
                    return Ok(format!(
                        "{}({}, .{}, {})",
                        callee,
                        arr,
                        array_cmp_tag(op),
                        other
                    ));
                }

                // Byte-slice equality and ordering for strings.
                if l_ty.is_str() && r_ty.is_str() {
                    let a = self.emit_operand(left)?;
                    let b = self.emit_operand(right)?;
                    return Ok(match op {
                        CmpOp::Eq | CmpOp::Is => format!("std.mem.eql(u8, {}, {})", a, b),
                        CmpOp::NotEq | CmpOp::IsNot => {
                            format!("!std.mem.eql(u8, {}, {})", a, b)
                        }
                        CmpOp::Lt => format!("(std.mem.order(u8, {}, {}) == .lt)", a, b),
                        CmpOp::Gt => format!("(std.mem.order(u8, {}, {}) == .gt)", a, b),
                        CmpOp::LtE => format!("(std.mem.order(u8, {}, {}) != .gt)", a, b),
                        CmpOp::GtE => format!("(std.mem.order(u8, {}, {}) != .lt)", a, b),
                        _ => unreachable!("containment handled above"),
                    });
                }

                // Dynamic-value equality against a native integer.
                if matches!(op, CmpOp::Eq | CmpOp::NotEq) {
                    if matches!(l_ty, PyType::Unknown) && matches!(r_ty, PyType::Int) {
                        let a = self.emit_operand(left)?;
                        let b = self.emit_operand(right)?;
                        let call = format!("runtime.pyObjEqInt({}, {})", a, b);
                        return Ok(if op == CmpOp::NotEq {
                            format!("!{}", call)
                        } else {
                            call
                        });
                    }
                    if matches!(r_ty, PyType::Unknown) && matches!(l_ty, PyType::Int) {
                        let a = self.emit_operand(left)?;
                        let b = self.emit_operand(right)?;
                        let call = format!("runtime.pyObjEqInt({}, {})", b, a);
                        return Ok(if op == CmpOp::NotEq {
                            format!("!{}", call)
                        } else {
                            call
                        });
                    }
                }

                // Numeric comparison with widening between the operands.
                let common = l_ty.widen(&r_ty);
                let a = self.emit_operand(left)?;
                let b = self.emit_operand(right)?;
                let (a, b) = if common.is_numeric() {
                    (
                        self.coerce(a, &l_ty, &common),
                        self.coerce(b, &r_ty, &common),
                    )
                } else {
                    (a, b)
                };
                Ok(format!("({} {} {})", a, zig_cmp(op), b))
            }
        }
    }

    /// Emit a comparison folded to a known constant, keeping the operand
    /// reads so the target's unused-variable checks stay satisfied.
    fn emit_folded_compare(
        &mut self,
        left: &Expr,
        right: &Expr,
        answer: bool,
    ) -> CompileResult<String> {
        let mut reads = Vec::new();
        for side in [left, right] {
            if side.as_name().is_some() {
                reads.push(self.emit_expr(side)?);
            }
        }
        if reads.is_empty() {
            return Ok(answer.to_string());
        }
        let label = self.next_label();
        let discards: Vec<String> = reads.iter().map(|r| format!("_ = {};", r)).collect();
        Ok(format!(
            "{l}: {{ {d} break :{l} {v}; }}",
            l = label,
            d = discards.join(" "),
            v = answer
        ))
    }

    fn emit_containment(
        &mut self,
        needle: &Expr,
        haystack: &Expr,
        needle_ty: &PyType,
        haystack_ty: &PyType,
    ) -> CompileResult<String> {
        match haystack_ty {
            // Substring search.
            PyType::Str { .. } => {
                let n = self.emit_operand(needle)?;
                let h = self.emit_operand(haystack)?;
                Ok(format!("(std.mem.indexOf(u8, {}, {}) != null)", h, n))
            }
            PyType::List(element) => match element.as_ref() {
                PyType::Str { .. } => {
                    // Explicit loop with byte equality.
                    let n = self.emit_operand(needle)?;
                    let h = self.emit_operand(haystack)?;
                    let label = self.next_label();
                    let found = self.next_tmp("found");
                    let item = self.next_tmp("item");
                    Ok(format!(
                        "{l}: {{ var {f} = false; for ({h}.items) |{i}| {{ if (std.mem.eql(u8, {i}, {n})) {{ {f} = true; break; }} }} break :{l} {f}; }}",
                        l = label,
                        f = found,
                        h = h,
                        i = item,
                        n = n
                    ))
                }
                elem => {
                    // Integer scalar search.
                    let scalar_ty = match elem {
                        PyType::Float => "f64",
                        _ => "i64",
                    };
                    let n = self.emit_operand(needle)?;
                    let n = self.coerce(n, needle_ty, elem);
                    let h = self.emit_operand(haystack)?;
                    Ok(format!(
                        "(std.mem.indexOfScalar({}, {}.items, {}) != null)",
                        scalar_ty, h, n
                    ))
                }
            },
            PyType::Dict { .. } | PyType::Set(_) => {
                let n = self.emit_operand(needle)?;
                let h = self.emit_operand(haystack)?;
                Ok(format!("{}.contains({})", h, n))
            }
            _ => {
                let n = self.emit_operand(needle)?;
                let h = self.emit_operand(haystack)?;
                Ok(format!("runtime.contains({}, {})", h, n))
            }
        }
    }
}
