//! Subscript and slice emission.
//!
//! Indexing dispatches on the inferred container type; negative indices
//! rewrite length-relative; list indexing carries a runtime bounds check
//! that surfaces a typed error. Slices form block expressions computing
//! start/end/step, with non-unit steps lowered to an explicit copy loop.

use super::ZigCodeGenerator;
use crate::types::PyType;
use crate::{CompileError, CompileResult};
use pyzig_ast::{Expr, Slice};

impl ZigCodeGenerator {
    pub(crate) fn emit_subscript(&mut self, value: &Expr, slice: &Slice) -> CompileResult<String> {
        let receiver_ty = self.infer_ty(value);
        match (&receiver_ty, slice) {
            (PyType::NumpyArray, _) => self.emit_array_subscript(value, slice),

            (PyType::Tuple(items), Slice::Index { value: idx }) => {
                let Some(i) = idx.as_int() else {
                    return Err(CompileError::TupleIndex);
                };
                let len = items.len() as i64;
                let real = if i < 0 { len + i } else { i };
                if real < 0 || real >= len {
                    return Err(CompileError::Node {
                        node: "Subscript",
                        message: format!("tuple index {} out of range", i),
                    });
                }
                let tuple = self.emit_operand(value)?;
                Ok(format!("{}[{}]", tuple, real))
            }

            (PyType::Dict { key, .. }, Slice::Index { value: idx }) => {
                let key_ty = (**key).clone();
                let idx_ty = self.infer_ty(idx);
                let map = self.emit_operand(value)?;
                let k = self.emit_operand(idx)?;
                let k = self.coerce(k, &idx_ty, &key_ty);
                Ok(format!("{}.get({}).?", map, k))
            }

            (PyType::List(_), Slice::Index { value: idx }) => {
                self.emit_list_index(value, idx)
            }
            (PyType::List(element), Slice::Slice { lower, upper, step }) => {
                let element = (**element).clone();
                self.emit_list_slice(value, &element, lower, upper, step)
            }

            (PyType::Str { .. }, Slice::Index { value: idx }) => {
                self.emit_str_index(value, idx)
            }
            (PyType::Str { .. }, Slice::Slice { lower, upper, step }) => {
                self.emit_str_slice(value, lower, upper, step)
            }

            _ => {
                // Dynamic receiver: runtime lookup.
                let obj = self.emit_operand(value)?;
                match slice {
                    Slice::Index { value: idx } => {
                        let i = self.emit_operand(idx)?;
                        Ok(self.fallible(format!("runtime.getIndex({}, {})", obj, i)))
                    }
                    _ => Err(CompileError::Node {
                        node: "Subscript",
                        message: "cannot slice a value of unknown type".to_string(),
                    }),
                }
            }
        }
    }

    /// Statement that surfaces a runtime index/key error in the current
    /// error context.
    pub(crate) fn raise_error(&self, tag: &str) -> String {
        match &self.error_label {
            Some(label) => format!("break :{}", label),
            None => format!("return error.{}", tag),
        }
    }

    fn emit_list_index(&mut self, value: &Expr, idx: &Expr) -> CompileResult<String> {
        let list = self.emit_operand(value)?;

        // Constant indices compile length-relative without the block.
        if let Some(i) = idx.as_int() {
            if i < 0 {
                return Ok(format!("{}.items[{}.items.len - {}]", list, list, -i));
            }
            return Ok(format!("{}.items[{}]", list, i));
        }

        // Dynamic indices always normalize length-relative and carry the
        // bounds check; module-level initializers cannot surface the typed
        // error, so the failure arm degrades to unreachable there.
        let idx_ty = self.infer_ty(idx);
        let idx_text = self.emit_operand(idx)?;
        let idx_text = self.coerce(idx_text, &idx_ty, &PyType::Int);
        let label = self.next_label();
        let seq = self.next_tmp("seq");
        let i = self.next_tmp("i");
        let len = self.next_tmp("len");
        let real = self.next_tmp("real");
        let err = if self.scope_depth == 0 {
            "unreachable".to_string()
        } else {
            self.raise_error("IndexError")
        };
        Ok(format!(
            "{l}: {{ const {seq} = {list}; const {i}: i64 = {idx}; const {len}: i64 = @intCast({seq}.items.len); const {real}: i64 = if ({i} < 0) {len} + {i} else {i}; if ({real} < 0 or {real} >= {len}) {err}; break :{l} {seq}.items[@intCast({real})]; }}",
            l = label,
            seq = seq,
            list = list,
            i = i,
            idx = idx_text,
            len = len,
            real = real,
            err = err
        ))
    }

    fn emit_str_index(&mut self, value: &Expr, idx: &Expr) -> CompileResult<String> {
        let s = self.emit_operand(value)?;

        // A one-character slice, not a byte.
        if let Some(i) = idx.as_int() {
            if i < 0 {
                return Ok(format!(
                    "{s}[{s}.len - {k}..{s}.len - {k} + 1]",
                    s = s,
                    k = -i
                ));
            }
            return Ok(format!("{s}[{i}..{j}]", s = s, i = i, j = i + 1));
        }

        let idx_ty = self.infer_ty(idx);
        let idx_text = self.emit_operand(idx)?;
        let idx_text = self.coerce(idx_text, &idx_ty, &PyType::Int);
        let label = self.next_label();
        let str_tmp = self.next_tmp("str");
        let i = self.next_tmp("i");
        let len = self.next_tmp("len");
        let real = self.next_tmp("real");
        let err = if self.scope_depth == 0 {
            "unreachable".to_string()
        } else {
            self.raise_error("IndexError")
        };
        Ok(format!(
            "{l}: {{ const {st} = {s}; const {i}: i64 = {idx}; const {len}: i64 = @intCast({st}.len); const {real}: i64 = if ({i} < 0) {len} + {i} else {i}; if ({real} < 0 or {real} >= {len}) {err}; break :{l} {st}[@intCast({real})..@intCast({real} + 1)]; }}",
            l = label,
            st = str_tmp,
            s = s,
            i = i,
            idx = idx_text,
            len = len,
            real = real,
            err = err
        ))
    }

    fn emit_list_slice(
        &mut self,
        value: &Expr,
        element: &PyType,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
    ) -> CompileResult<String> {
        let list = self.emit_operand(value)?;
        let alloc = self.allocator_name().to_string();
        let step_const = step.as_ref().and_then(|s| s.as_int());

        let label = self.next_label();
        let seq = self.next_tmp("seq");
        let len = self.next_tmp("len");
        let out = self.next_tmp("out");
        let (start, end) = self.emit_slice_bounds(&len, lower, upper, step_const)?;

        match step {
            None => Ok(format!(
                "{l}: {{ const {seq} = {list}; const {len}: i64 = @intCast({seq}.items.len); {start} {end} var {out} = std.ArrayList({t}).init({a}); {out}.appendSlice({seq}.items[@intCast(__start)..@intCast(__end)]) catch unreachable; break :{l} {out}; }}",
                l = label,
                seq = seq,
                list = list,
                len = len,
                start = start,
                end = end,
                out = out,
                t = element.zig_type(),
                a = alloc
            )),
            Some(step_expr) => {
                // Non-unit step: explicit loop into a fresh buffer.
                let step_text = self.emit_operand(step_expr)?;
                let i = self.next_tmp("i");
                let cmp = match step_const {
                    Some(s) if s < 0 => ">",
                    _ => "<",
                };
                Ok(format!(
                    "{l}: {{ const {seq} = {list}; const {len}: i64 = @intCast({seq}.items.len); {start} {end} var {out} = std.ArrayList({t}).init({a}); var {i}: i64 = __start; while ({i} {cmp} __end) : ({i} += {step}) {{ {out}.append({seq}.items[@intCast({i})]) catch unreachable; }} break :{l} {out}; }}",
                    l = label,
                    seq = seq,
                    list = list,
                    len = len,
                    start = start,
                    end = end,
                    out = out,
                    t = element.zig_type(),
                    a = alloc,
                    i = i,
                    cmp = cmp,
                    step = step_text
                ))
            }
        }
    }

    fn emit_str_slice(
        &mut self,
        value: &Expr,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
    ) -> CompileResult<String> {
        let s = self.emit_operand(value)?;
        let step_const = step.as_ref().and_then(|e| e.as_int());

        let label = self.next_label();
        let str_tmp = self.next_tmp("str");
        let len = self.next_tmp("len");
        let (start, end) = self.emit_slice_bounds(&len, lower, upper, step_const)?;

        match step {
            None => Ok(format!(
                "{l}: {{ const {st} = {s}; const {len}: i64 = @intCast({st}.len); {start} {end} break :{l} {st}[@intCast(__start)..@intCast(__end)]; }}",
                l = label,
                st = str_tmp,
                s = s,
                len = len,
                start = start,
                end = end
            )),
            Some(step_expr) => {
                let alloc = self.allocator_name().to_string();
                let step_text = self.emit_operand(step_expr)?;
                let out = self.next_tmp("out");
                let i = self.next_tmp("i");
                let cmp = match step_const {
                    Some(v) if v < 0 => ">",
                    _ => "<",
                };
                Ok(format!(
                    "{l}: {{ const {st} = {s}; const {len}: i64 = @intCast({st}.len); {start} {end} var {out} = std.ArrayList(u8).init({a}); var {i}: i64 = __start; while ({i} {cmp} __end) : ({i} += {step}) {{ {out}.append({st}[@intCast({i})]) catch unreachable; }} break :{l} {out}.items; }}",
                    l = label,
                    st = str_tmp,
                    s = s,
                    len = len,
                    start = start,
                    end = end,
                    out = out,
                    a = alloc,
                    i = i,
                    cmp = cmp,
                    step = step_text
                ))
            }
        }
    }

    /// `__start`/`__end` declarations for a slice, with negative bounds
    /// saturating against the length and defaults per step direction.
    fn emit_slice_bounds(
        &mut self,
        len: &str,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step_const: Option<i64>,
    ) -> CompileResult<(String, String)> {
        let negative = matches!(step_const, Some(s) if s < 0);
        let start = match lower {
            Some(e) => {
                let ty = self.infer_ty(e);
                let text = self.emit_operand(e)?;
                let text = self.coerce(text, &ty, &PyType::Int);
                format!(
                    "var __start: i64 = {t}; if (__start < 0) __start = @max({len} + __start, 0); if (__start > {len}) __start = {len};",
                    t = text,
                    len = len
                )
            }
            None if negative => format!("var __start: i64 = {} - 1;", len),
            None => "var __start: i64 = 0;".to_string(),
        };
        let end = match upper {
            Some(e) => {
                let ty = self.infer_ty(e);
                let text = self.emit_operand(e)?;
                let text = self.coerce(text, &ty, &PyType::Int);
                format!(
                    "var __end: i64 = {t}; if (__end < 0) __end = @max({len} + __end, 0); if (__end > {len}) __end = {len};",
                    t = text,
                    len = len
                )
            }
            None if negative => "var __end: i64 = -1;".to_string(),
            None => format!("var __end: i64 = {};", len),
        };
        Ok((start, end))
    }

    fn emit_array_subscript(&mut self, value: &Expr, slice: &Slice) -> CompileResult<String> {
        let array = self.emit_operand(value)?;
        let alloc = self.allocator_name().to_string();
        match slice {
            Slice::Index { value: idx } => {
                if let Expr::Tuple { elts } = idx.as_ref() {
                    if elts.len() == 2 {
                        let i = self.emit_operand(&elts[0])?;
                        let j = self.emit_operand(&elts[1])?;
                        return Ok(
                            self.fallible(format!("runtime.getIndex2D({}, {}, {})", array, i, j))
                        );
                    }
                }
                let idx_ty = self.infer_ty(idx);
                let i = self.emit_operand(idx)?;
                if matches!(idx_ty, PyType::BoolArray) {
                    Ok(self.fallible(format!(
                        "runtime.booleanIndex({}, {}, {})",
                        alloc, array, i
                    )))
                } else {
                    Ok(self.fallible(format!("runtime.getIndex({}, {})", array, i)))
                }
            }
            Slice::Slice { lower, upper, .. } => {
                let start = match lower {
                    Some(e) => self.emit_operand(e)?,
                    None => "0".to_string(),
                };
                let end = match upper {
                    Some(e) => self.emit_operand(e)?,
                    None => format!("@intCast({}.size)", array),
                };
                Ok(self.fallible(format!(
                    "runtime.slice1D({}, {}, {}, {})",
                    alloc, array, start, end
                )))
            }
            Slice::ExtSlice { dims } => match dims.as_slice() {
                [Slice::Index { value: i }, Slice::Slice { .. }] => {
                    let i = self.emit_operand(i)?;
                    Ok(self.fallible(format!("runtime.getRow({}, {}, {})", alloc, array, i)))
                }
                [Slice::Slice { .. }, Slice::Index { value: j }] => {
                    let j = self.emit_operand(j)?;
                    Ok(self.fallible(format!("runtime.getColumn({}, {}, {})", alloc, array, j)))
                }
                [Slice::Index { value: i }, Slice::Index { value: j }] => {
                    let i = self.emit_operand(i)?;
                    let j = self.emit_operand(j)?;
                    Ok(self.fallible(format!("runtime.getIndex2D({}, {}, {})", array, i, j)))
                }
                _ => Err(CompileError::Node {
                    node: "Subscript",
                    message: "unsupported multi-dimensional selector".to_string(),
                }),
            },
        }
    }
}
