//! Expression dispatch and the simple expression emitters.

use super::ZigCodeGenerator;
use crate::infer::{truthy_kind, TruthyKind};
use crate::types::PyType;
use crate::{CompileError, CompileResult};
use pyzig_ast::{BoolOpKind, Expr, UnaryOp};

impl ZigCodeGenerator {
    /// Emit an expression and return its Zig text.
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> CompileResult<String> {
        match expr {
            Expr::Constant { value } => self.emit_constant(value),
            Expr::Name { id } => Ok(self.resolve_name(id)),
            Expr::BinOp { left, op, right } => self.emit_binop(left, *op, right),
            Expr::UnaryOp { op, operand } => self.emit_unaryop(*op, operand),
            Expr::BoolOp { op, values } => self.emit_boolop(*op, values),
            Expr::Compare {
                left,
                ops,
                comparators,
            } => self.emit_compare(left, ops, comparators),
            Expr::Call {
                func,
                args,
                keywords,
            } => self.emit_call(func, args, keywords),
            Expr::Attribute { value, attr } => self.emit_attribute(value, attr),
            Expr::Subscript { value, slice } => self.emit_subscript(value, slice),
            Expr::Tuple { elts } => self.emit_tuple_literal(elts),
            Expr::List { elts } => self.emit_list_literal(elts),
            Expr::Set { elts } => self.emit_set_literal(elts),
            Expr::Dict { keys, values } => self.emit_dict_literal(keys, values),
            Expr::Lambda { args, body } => self.emit_lambda_expr(args, body),
            Expr::IfExp { test, body, orelse } => self.emit_ifexp(test, body, orelse),
            Expr::ListComp { elt, generators } | Expr::GeneratorExp { elt, generators } => {
                self.emit_list_comp(elt, generators)
            }
            Expr::SetComp { elt, generators } => self.emit_set_comp(elt, generators),
            Expr::DictComp {
                key,
                value,
                generators,
            } => self.emit_dict_comp(key, value, generators),
            Expr::Starred { .. } => Err(CompileError::Node {
                node: "Starred",
                message: "starred expression outside a call".to_string(),
            }),
        }
    }

    fn emit_unaryop(&mut self, op: UnaryOp, operand: &Expr) -> CompileResult<String> {
        let ty = self.infer_ty(operand);
        let text = self.emit_operand(operand)?;
        Ok(match op {
            UnaryOp::Not => {
                let cond = self.emit_truthy(operand)?;
                format!("!{}", cond)
            }
            UnaryOp::UAdd => text,
            UnaryOp::USub => match ty {
                PyType::BigInt => {
                    self.stats.bigint_routes += 1;
                    self.infallible(format!("{}.neg({})", text, self.allocator_name()))
                }
                _ => format!("-{}", text),
            },
            UnaryOp::Invert => format!("~{}", text),
        })
    }

    fn emit_boolop(&mut self, op: BoolOpKind, values: &[Expr]) -> CompileResult<String> {
        let joiner = match op {
            BoolOpKind::And => " and ",
            BoolOpKind::Or => " or ",
        };
        let mut parts = Vec::with_capacity(values.len());
        for value in values {
            parts.push(self.emit_truthy(value)?);
        }
        Ok(format!("({})", parts.join(joiner)))
    }

    fn emit_ifexp(&mut self, test: &Expr, body: &Expr, orelse: &Expr) -> CompileResult<String> {
        let cond = self.emit_truthy(test)?;
        let then_ty = self.infer_ty(body);
        let else_ty = self.infer_ty(orelse);
        let result_ty = then_ty.widen(&else_ty);
        let then_text = self.emit_operand(body)?;
        let else_text = self.emit_operand(orelse)?;
        let then_text = self.coerce(then_text, &then_ty, &result_ty);
        let else_text = self.coerce(else_text, &else_ty, &result_ty);
        Ok(format!(
            "(if ({}) {} else {})",
            cond, then_text, else_text
        ))
    }

    /// Emit an attribute read.
    pub(crate) fn emit_attribute(&mut self, value: &Expr, attr: &str) -> CompileResult<String> {
        // Module constants (math.pi and friends).
        if let Some(alias) = value.as_name() {
            if let Some(module) = self.facts.module_of(alias) {
                if let Some((text, _)) = crate::dispatch::module_constant(module, attr) {
                    return Ok(text.to_string());
                }
            }
        }

        let receiver_ty = self.infer_ty(value);
        let receiver = self.emit_operand(value)?;
        match &receiver_ty {
            PyType::Instance(class) => {
                let class = class.clone();
                if self.classes.get_field(&class, attr).is_some() {
                    return Ok(format!("{}.{}", receiver, escape_field(attr)));
                }
                // Property-decorated methods read as a call.
                if let Some(method) = self.classes.find_method(&class, attr) {
                    if method.is_property {
                        let name = format!("{}.{}()", receiver, escape_field(attr));
                        return Ok(if method.returns_error || method.needs_allocator {
                            self.fallible(name)
                        } else {
                            name
                        });
                    }
                }
                // Unknown attribute: dynamic `__dict__` lookup.
                Ok(format!("runtime.getAttr({}, \"{}\")", receiver, attr))
            }
            PyType::NumpyArray => match attr {
                "T" => {
                    let alloc = self.allocator_name();
                    Ok(self.fallible(format!("runtime.transpose({}, {})", alloc, receiver)))
                }
                "shape" => Ok(format!("{}.shape", receiver)),
                "size" => Ok(format!("{}.size", receiver)),
                _ => Ok(format!("{}.{}", receiver, escape_field(attr))),
            },
            PyType::Tuple(_) | PyType::Closure(_) => {
                Ok(format!("{}.{}", receiver, escape_field(attr)))
            }
            _ => Ok(format!("runtime.getAttr({}, \"{}\")", receiver, attr)),
        }
    }

    /// Lower an expression used as a boolean condition.
    pub(crate) fn emit_truthy(&mut self, expr: &Expr) -> CompileResult<String> {
        let ty = self.infer_ty(expr);
        let kind = truthy_kind(&ty);
        let text = self.emit_operand(expr)?;
        Ok(match kind {
            TruthyKind::Direct => text,
            TruthyKind::NonZeroInt => format!("({} != 0)", text),
            TruthyKind::NonZeroFloat => format!("({} != 0.0)", text),
            TruthyKind::NonEmptyStr => format!("({}.len != 0)", text),
            TruthyKind::NonEmptyList => format!("({}.items.len != 0)", text),
            TruthyKind::NonEmptyMap => format!("({}.count() != 0)", text),
            TruthyKind::AlwaysFalse => {
                // Keep the variable read so the target's unused checks pass.
                if expr.as_name().is_some() {
                    let label = self.next_label();
                    format!("{l}: {{ _ = {t}; break :{l} false; }}", l = label, t = text)
                } else {
                    "false".to_string()
                }
            }
            TruthyKind::Runtime => format!("runtime.pyTruthy({})", text),
        })
    }

    /// Insert a widening cast when the inferred and required types differ.
    pub(crate) fn coerce(&self, text: String, from: &PyType, to: &PyType) -> String {
        match (from, to) {
            (PyType::Int | PyType::Bool | PyType::Usize, PyType::Float) => {
                format!("@as(f64, @floatFromInt({}))", text)
            }
            (PyType::Usize, PyType::Int) => format!("@as(i64, @intCast({}))", text),
            (PyType::Int, PyType::Usize) => format!("@as(usize, @intCast({}))", text),
            (PyType::Bool, PyType::Int) => format!("@as(i64, @intFromBool({}))", text),
            _ => text,
        }
    }
}

/// Struct fields never collide with the prelude names, only with keywords.
fn escape_field(name: &str) -> String {
    super::escape_ident(name)
}
