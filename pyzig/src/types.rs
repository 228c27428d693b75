//! The inferred type lattice.
//!
//! `PyType` is the algebra the inferrer assigns to every expression,
//! parameter, return and container element. `widen` is the least upper
//! bound used at merge points (branches, container elements, repeated
//! assignments); `Bottom` is its neutral element and `Unknown` its top.
//! `zig_type` maps every lattice point to the Zig type the emitter
//! declares for it.

use std::fmt;

/// Provenance of a string value.
///
/// `Static` marks literal-derived strings that may live as borrowed
/// constants in the emitted code; `Runtime` marks strings built at
/// execution time, which the generated code owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrMode {
    Static,
    Runtime,
}

/// Inferred type of a source expression.
#[derive(Debug, Clone, PartialEq)]
pub enum PyType {
    /// Top: no facts known; forces the runtime-polymorphic representation.
    Unknown,
    /// Neutral element for `widen`; never emitted.
    Bottom,
    Int,
    Float,
    Bool,
    NoneType,
    /// Values originating as indices or lengths. Mixing with signed
    /// integers requires explicit widening casts at emission.
    Usize,
    /// Arbitrary-precision integer, handled through runtime calls.
    BigInt,
    Str {
        mode: StrMode,
    },
    List(Box<PyType>),
    Dict {
        key: Box<PyType>,
        value: Box<PyType>,
    },
    Tuple(Vec<PyType>),
    Set(Box<PyType>),
    NumpyArray,
    BoolArray,
    DataFrame,
    Path,
    /// Instance of a user-declared class.
    Instance(String),
    /// Instance of a synthesized capturing struct.
    Closure(String),
}

impl PyType {
    /// Literal-derived string.
    pub fn static_str() -> Self {
        PyType::Str {
            mode: StrMode::Static,
        }
    }

    /// Runtime-built string.
    pub fn runtime_str() -> Self {
        PyType::Str {
            mode: StrMode::Runtime,
        }
    }

    pub fn list_of(element: PyType) -> Self {
        PyType::List(Box::new(element))
    }

    pub fn dict_of(key: PyType, value: PyType) -> Self {
        PyType::Dict {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn set_of(element: PyType) -> Self {
        PyType::Set(Box::new(element))
    }

    pub fn is_str(&self) -> bool {
        matches!(self, PyType::Str { .. })
    }

    /// Native integer class (excludes `BigInt`, which routes to the runtime).
    pub fn is_integer(&self) -> bool {
        matches!(self, PyType::Int | PyType::Bool | PyType::Usize)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PyType::Float)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, PyType::Float | PyType::BigInt)
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            PyType::List(_) | PyType::Dict { .. } | PyType::Tuple(_) | PyType::Set(_)
        )
    }

    /// Least upper bound of two lattice points.
    ///
    /// Commutative and idempotent, with `Bottom` as identity. Incompatible
    /// pairs widen to `Unknown`, which downstream emission treats as the
    /// runtime-polymorphic representation.
    pub fn widen(&self, other: &PyType) -> PyType {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (PyType::Bottom, t) | (t, PyType::Bottom) => t.clone(),
            (PyType::Unknown, _) | (_, PyType::Unknown) => PyType::Unknown,

            (PyType::Str { .. }, PyType::Str { .. }) => PyType::runtime_str(),

            (PyType::BigInt, t) | (t, PyType::BigInt) if t.is_integer() => PyType::BigInt,
            (PyType::Int, PyType::Float) | (PyType::Float, PyType::Int) => PyType::Float,
            (PyType::Bool, PyType::Float) | (PyType::Float, PyType::Bool) => PyType::Float,
            (PyType::Usize, PyType::Float) | (PyType::Float, PyType::Usize) => PyType::Float,
            (PyType::Int, PyType::Bool) | (PyType::Bool, PyType::Int) => PyType::Int,
            (PyType::Int, PyType::Usize) | (PyType::Usize, PyType::Int) => PyType::Int,
            (PyType::Bool, PyType::Usize) | (PyType::Usize, PyType::Bool) => PyType::Int,

            (PyType::NoneType, t) | (t, PyType::NoneType) if t.is_container() => t.clone(),

            (PyType::List(a), PyType::List(b)) => PyType::List(Box::new(a.widen(b))),
            (PyType::Set(a), PyType::Set(b)) => PyType::Set(Box::new(a.widen(b))),
            (
                PyType::Dict { key: ka, value: va },
                PyType::Dict { key: kb, value: vb },
            ) => PyType::Dict {
                key: Box::new(ka.widen(kb)),
                value: Box::new(va.widen(vb)),
            },
            (PyType::Tuple(a), PyType::Tuple(b)) if a.len() == b.len() => {
                PyType::Tuple(a.iter().zip(b.iter()).map(|(x, y)| x.widen(y)).collect())
            }

            _ => PyType::Unknown,
        }
    }

    /// The Zig type the emitter declares for a value of this lattice point.
    pub fn zig_type(&self) -> String {
        match self {
            PyType::Unknown => "runtime.PyObject".to_string(),
            PyType::Bottom | PyType::NoneType => "void".to_string(),
            PyType::Int => "i64".to_string(),
            PyType::Float => "f64".to_string(),
            PyType::Bool => "bool".to_string(),
            PyType::Usize => "usize".to_string(),
            PyType::BigInt => "runtime.BigInt".to_string(),
            PyType::Str { .. } => "[]const u8".to_string(),
            PyType::List(element) => format!("std.ArrayList({})", element.zig_type()),
            PyType::Dict { key, value } => match key.as_ref() {
                PyType::Int => format!("std.AutoHashMap(i64, {})", value.zig_type()),
                PyType::Str { .. } => format!("std.StringHashMap({})", value.zig_type()),
                _ => "runtime.PyDict".to_string(),
            },
            PyType::Set(element) => match element.as_ref() {
                PyType::Str { .. } => "std.StringHashMap(void)".to_string(),
                other => format!("std.AutoHashMap({}, void)", other.zig_type()),
            },
            PyType::Tuple(elements) => {
                let inner: Vec<_> = elements.iter().map(PyType::zig_type).collect();
                format!("std.meta.Tuple(&.{{ {} }})", inner.join(", "))
            }
            PyType::NumpyArray => "runtime.NdArray".to_string(),
            PyType::BoolArray => "runtime.BoolArray".to_string(),
            PyType::DataFrame => "runtime.DataFrame".to_string(),
            PyType::Path => "runtime.Path".to_string(),
            PyType::Instance(name) => format!("*{}", name),
            PyType::Closure(name) => name.clone(),
        }
    }
}

impl fmt::Display for PyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PyType::Unknown => write!(f, "object"),
            PyType::Bottom => write!(f, "<bottom>"),
            PyType::Int => write!(f, "int"),
            PyType::Float => write!(f, "float"),
            PyType::Bool => write!(f, "bool"),
            PyType::NoneType => write!(f, "None"),
            PyType::Usize => write!(f, "index"),
            PyType::BigInt => write!(f, "bigint"),
            PyType::Str { .. } => write!(f, "str"),
            PyType::List(e) => write!(f, "list[{}]", e),
            PyType::Dict { key, value } => write!(f, "dict[{}, {}]", key, value),
            PyType::Tuple(elements) => {
                let inner: Vec<_> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "tuple[{}]", inner.join(", "))
            }
            PyType::Set(e) => write!(f, "set[{}]", e),
            PyType::NumpyArray => write!(f, "ndarray"),
            PyType::BoolArray => write!(f, "ndarray[bool]"),
            PyType::DataFrame => write!(f, "DataFrame"),
            PyType::Path => write!(f, "Path"),
            PyType::Instance(name) => write!(f, "{}", name),
            PyType::Closure(name) => write!(f, "<closure {}>", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_identity_and_idempotence() {
        let samples = [
            PyType::Int,
            PyType::Float,
            PyType::Bool,
            PyType::static_str(),
            PyType::list_of(PyType::Int),
            PyType::dict_of(PyType::static_str(), PyType::Int),
            PyType::Unknown,
        ];
        for ty in &samples {
            assert_eq!(&ty.widen(ty), ty);
            assert_eq!(&PyType::Bottom.widen(ty), ty);
            assert_eq!(&ty.widen(&PyType::Bottom), ty);
        }
    }

    #[test]
    fn test_widen_is_commutative() {
        let samples = [
            PyType::Int,
            PyType::Float,
            PyType::Bool,
            PyType::Usize,
            PyType::BigInt,
            PyType::NoneType,
            PyType::static_str(),
            PyType::runtime_str(),
            PyType::list_of(PyType::Int),
            PyType::list_of(PyType::Float),
            PyType::Unknown,
            PyType::Bottom,
        ];
        for a in &samples {
            for b in &samples {
                assert_eq!(a.widen(b), b.widen(a), "widen({}, {})", a, b);
            }
        }
    }

    #[test]
    fn test_widen_numeric_rules() {
        assert_eq!(PyType::Int.widen(&PyType::Float), PyType::Float);
        assert_eq!(PyType::Int.widen(&PyType::Bool), PyType::Int);
        assert_eq!(PyType::Int.widen(&PyType::BigInt), PyType::BigInt);
        assert_eq!(PyType::Usize.widen(&PyType::Int), PyType::Int);
        assert_eq!(PyType::Float.widen(&PyType::BigInt), PyType::Unknown);
    }

    #[test]
    fn test_widen_none_and_incompatible() {
        assert_eq!(PyType::Int.widen(&PyType::NoneType), PyType::Unknown);
        assert_eq!(
            PyType::list_of(PyType::Int).widen(&PyType::NoneType),
            PyType::list_of(PyType::Int)
        );
        assert_eq!(
            PyType::static_str().widen(&PyType::Int),
            PyType::Unknown
        );
    }

    #[test]
    fn test_widen_containers_pointwise() {
        assert_eq!(
            PyType::list_of(PyType::Int).widen(&PyType::list_of(PyType::Float)),
            PyType::list_of(PyType::Float)
        );
        assert_eq!(
            PyType::Tuple(vec![PyType::Int, PyType::static_str()])
                .widen(&PyType::Tuple(vec![PyType::Float, PyType::static_str()])),
            PyType::Tuple(vec![PyType::Float, PyType::static_str()])
        );
        assert_eq!(
            PyType::Tuple(vec![PyType::Int])
                .widen(&PyType::Tuple(vec![PyType::Int, PyType::Int])),
            PyType::Unknown
        );
    }

    #[test]
    fn test_widen_str_modes() {
        assert_eq!(
            PyType::static_str().widen(&PyType::runtime_str()),
            PyType::runtime_str()
        );
    }

    #[test]
    fn test_zig_type_scalars() {
        assert_eq!(PyType::Int.zig_type(), "i64");
        assert_eq!(PyType::Float.zig_type(), "f64");
        assert_eq!(PyType::Bool.zig_type(), "bool");
        assert_eq!(PyType::static_str().zig_type(), "[]const u8");
        assert_eq!(PyType::BigInt.zig_type(), "runtime.BigInt");
        assert_eq!(PyType::Unknown.zig_type(), "runtime.PyObject");
    }

    #[test]
    fn test_zig_type_containers() {
        assert_eq!(
            PyType::list_of(PyType::Int).zig_type(),
            "std.ArrayList(i64)"
        );
        assert_eq!(
            PyType::dict_of(PyType::static_str(), PyType::Int).zig_type(),
            "std.StringHashMap(i64)"
        );
        assert_eq!(
            PyType::dict_of(PyType::Int, PyType::Float).zig_type(),
            "std.AutoHashMap(i64, f64)"
        );
        assert_eq!(
            PyType::Tuple(vec![PyType::Int, PyType::Float]).zig_type(),
            "std.meta.Tuple(&.{ i64, f64 })"
        );
        assert_eq!(
            PyType::Instance("Counter".to_string()).zig_type(),
            "*Counter"
        );
    }
}
