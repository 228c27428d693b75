//! Constant emission.

use super::ZigCodeGenerator;
use crate::CompileResult;
use pyzig_ast::Const;

impl ZigCodeGenerator {
    /// Emit a literal constant.
    pub(crate) fn emit_constant(&mut self, value: &Const) -> CompileResult<String> {
        Ok(match value {
            Const::None => "{}".to_string(),
            Const::Bool(v) => v.to_string(),
            Const::Int(v) => v.to_string(),
            Const::Float(v) => render_float(*v),
            Const::Str(s) => zig_string_literal(s),
            Const::Big { big } => {
                // Literals beyond the native width construct a runtime
                // big integer from their decimal spelling.
                self.stats.bigint_routes += 1;
                self.infallible(format!(
                    "runtime.parseIntToBigInt({}, \"{}\", 10)",
                    self.allocator_name(),
                    big
                ))
            }
        })
    }

    /// Render a constant coerced to float position (`2` becomes `2.0`).
    pub(crate) fn render_const_as_float(&self, value: &Const) -> Option<String> {
        match value {
            Const::Int(v) => Some(format!("{}.0", v)),
            Const::Float(v) => Some(render_float(*v)),
            Const::Bool(v) => Some(if *v { "1.0" } else { "0.0" }.to_string()),
            _ => None,
        }
    }

    /// Render a constant in string position, formatting scalars to their
    /// Python spelling (`True`, `None`, digits).
    pub(crate) fn render_const_as_str(&self, value: &Const) -> Option<String> {
        match value {
            Const::Str(s) => Some(zig_string_literal(s)),
            Const::Int(v) => Some(zig_string_literal(&v.to_string())),
            Const::Bool(v) => Some(zig_string_literal(if *v { "True" } else { "False" })),
            Const::None => Some(zig_string_literal("None")),
            Const::Float(v) => Some(zig_string_literal(&render_float(*v))),
            Const::Big { big } => Some(zig_string_literal(&big.to_string())),
        }
    }
}

/// Render a float so it always reads as a Zig float literal.
pub(crate) fn render_float(v: f64) -> String {
    if v.is_nan() {
        "std.math.nan(f64)".to_string()
    } else if v.is_infinite() {
        if v > 0.0 {
            "std.math.inf(f64)".to_string()
        } else {
            "-std.math.inf(f64)".to_string()
        }
    } else if v == v.trunc() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Escape a byte string into a Zig string literal.
pub(crate) fn zig_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
