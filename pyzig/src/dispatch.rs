//! The import dispatch registry.
//!
//! A closed table steering calls to recognized standard-library and
//! third-party functions to named runtime primitives, with the argument
//! and return conversion rules the emitter applies. Built once per
//! process; never mutated after initialization.

use crate::types::PyType;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Argument conversion applied before handing values to the runtime call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgConv {
    /// Pass arguments through unchanged.
    AsIs,
    /// Cast integer arguments to `f64` (the math namespace).
    Floats,
}

/// One entry of the registry.
#[derive(Debug, Clone)]
pub struct ModuleFn {
    /// Fully qualified Zig-side callee.
    pub zig_name: &'static str,
    /// Allocator appended as the trailing argument (foreign convention).
    pub needs_allocator: bool,
    /// Emitted call is fallible.
    pub returns_error: bool,
    pub ret: PyType,
    pub arg_conv: ArgConv,
}

impl ModuleFn {
    fn new(zig_name: &'static str, ret: PyType) -> Self {
        Self {
            zig_name,
            needs_allocator: false,
            returns_error: false,
            ret,
            arg_conv: ArgConv::AsIs,
        }
    }

    fn alloc(mut self) -> Self {
        self.needs_allocator = true;
        self
    }

    fn fallible(mut self) -> Self {
        self.returns_error = true;
        self
    }

    fn floats(mut self) -> Self {
        self.arg_conv = ArgConv::Floats;
        self
    }
}

static REGISTRY: Lazy<HashMap<(&'static str, &'static str), ModuleFn>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let mut put = |module: &'static str, func: &'static str, entry: ModuleFn| {
        table.insert((module, func), entry);
    };

    // math
    put("math", "sqrt", ModuleFn::new("std.math.sqrt", PyType::Float).floats());
    put("math", "floor", ModuleFn::new("std.math.floor", PyType::Float).floats());
    put("math", "ceil", ModuleFn::new("std.math.ceil", PyType::Float).floats());
    put("math", "fabs", ModuleFn::new("@abs", PyType::Float).floats());
    put("math", "pow", ModuleFn::new("runtime.mathPow", PyType::Float).floats());
    put("math", "log", ModuleFn::new("@log", PyType::Float).floats());
    put("math", "exp", ModuleFn::new("@exp", PyType::Float).floats());
    put("math", "sin", ModuleFn::new("@sin", PyType::Float).floats());
    put("math", "cos", ModuleFn::new("@cos", PyType::Float).floats());
    put("math", "gcd", ModuleFn::new("std.math.gcd", PyType::Int));

    // json
    put(
        "json",
        "dumps",
        ModuleFn::new("runtime.jsonDumps", PyType::runtime_str())
            .alloc()
            .fallible(),
    );
    put(
        "json",
        "loads",
        ModuleFn::new("runtime.jsonLoads", PyType::Unknown)
            .alloc()
            .fallible(),
    );

    // os.path / pathlib
    put(
        "os.path",
        "exists",
        ModuleFn::new("runtime.pathExists", PyType::Bool),
    );
    put(
        "os.path",
        "join",
        ModuleFn::new("runtime.pathJoin", PyType::runtime_str())
            .alloc()
            .fallible(),
    );
    put(
        "pathlib",
        "Path",
        ModuleFn::new("runtime.Path.init", PyType::Path).alloc(),
    );

    // numpy
    put(
        "numpy",
        "array",
        ModuleFn::new("runtime.NdArray.fromSlice", PyType::NumpyArray)
            .alloc()
            .fallible(),
    );
    put(
        "numpy",
        "zeros",
        ModuleFn::new("runtime.NdArray.zeros", PyType::NumpyArray)
            .alloc()
            .fallible(),
    );
    put(
        "numpy",
        "ones",
        ModuleFn::new("runtime.NdArray.ones", PyType::NumpyArray)
            .alloc()
            .fallible(),
    );
    put(
        "numpy",
        "arange",
        ModuleFn::new("runtime.NdArray.arange", PyType::NumpyArray)
            .alloc()
            .fallible(),
    );
    put(
        "numpy",
        "matmul",
        ModuleFn::new("runtime.matmul", PyType::NumpyArray)
            .alloc()
            .fallible(),
    );
    put(
        "numpy",
        "transpose",
        ModuleFn::new("runtime.transpose", PyType::NumpyArray)
            .alloc()
            .fallible(),
    );
    put(
        "numpy",
        "dot",
        ModuleFn::new("runtime.matmul", PyType::NumpyArray)
            .alloc()
            .fallible(),
    );

    // pandas
    put(
        "pandas",
        "DataFrame",
        ModuleFn::new("runtime.DataFrame.init", PyType::DataFrame)
            .alloc()
            .fallible(),
    );

    table
});

/// Look up a `(module, function)` pair in the registry.
pub fn module_function(module: &str, func: &str) -> Option<&'static ModuleFn> {
    REGISTRY
        .iter()
        .find(|((m, f), _)| *m == module && *f == func)
        .map(|(_, v)| v)
}

/// Module-level constants recognized on attribute access.
pub fn module_constant(module: &str, name: &str) -> Option<(&'static str, PyType)> {
    match (module, name) {
        ("math", "pi") => Some(("std.math.pi", PyType::Float)),
        ("math", "e") => Some(("std.math.e", PyType::Float)),
        ("math", "inf") => Some(("std.math.inf(f64)", PyType::Float)),
        ("math", "nan") => Some(("std.math.nan(f64)", PyType::Float)),
        _ => None,
    }
}

/// `unittest.TestCase` assertion method to runtime namespace mapping.
pub fn unittest_assertion(method: &str) -> Option<&'static str> {
    match method {
        "assertEqual" => Some("runtime.unittest.assertEqual"),
        "assertNotEqual" => Some("runtime.unittest.assertNotEqual"),
        "assertTrue" => Some("runtime.unittest.assertTrue"),
        "assertFalse" => Some("runtime.unittest.assertFalse"),
        "assertIn" => Some("runtime.unittest.assertIn"),
        "assertIsNone" => Some("runtime.unittest.assertIsNone"),
        "assertRaises" => Some("runtime.unittest.assertRaises"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_entries_cast_to_float() {
        let sqrt = module_function("math", "sqrt").unwrap();
        assert_eq!(sqrt.zig_name, "std.math.sqrt");
        assert_eq!(sqrt.arg_conv, ArgConv::Floats);
        assert_eq!(sqrt.ret, PyType::Float);
        assert!(!sqrt.needs_allocator);
    }

    #[test]
    fn test_numpy_entries_thread_allocator() {
        let array = module_function("numpy", "array").unwrap();
        assert!(array.needs_allocator);
        assert!(array.returns_error);
        assert_eq!(array.ret, PyType::NumpyArray);
    }

    #[test]
    fn test_unknown_pair_is_absent() {
        assert!(module_function("math", "frobnicate").is_none());
        assert!(module_function("socket", "create", ).is_none());
    }

    #[test]
    fn test_module_constants() {
        let (text, ty) = module_constant("math", "pi").unwrap();
        assert_eq!(text, "std.math.pi");
        assert_eq!(ty, PyType::Float);
        assert!(module_constant("math", "tau").is_none());
    }

    #[test]
    fn test_unittest_namespace() {
        assert_eq!(
            unittest_assertion("assertEqual"),
            Some("runtime.unittest.assertEqual")
        );
        assert!(unittest_assertion("assertAlmostNever").is_none());
    }
}
