//! Python AST data model for the pyzig translator.
//!
//! This crate defines the node kinds the translator consumes. The AST is
//! produced by an external frontend (a small helper around Python's own
//! `ast` module) and shipped to the translator as a JSON document; the
//! [`json`] module holds the loader for that format.
//!
//! The shapes follow CPython's `ast` field names (`elts`, `orelse`,
//! `comparators`, ...) so the frontend dump stays a mechanical walk.
//! Integer literals that do not fit `i64` ride the [`Const::Big`] carrier
//! as decimal strings and are surfaced as `num_bigint::BigInt`.

pub mod json;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// A parsed module: the top-level statement list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// Constant carried by a `Constant` expression node.
///
/// Deserialized untagged: `null`, booleans, integers, floats and strings map
/// directly; integers outside the `i64` range arrive as `{"big": "<digits>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Big {
        #[serde(with = "big_serde")]
        big: BigInt,
    },
}

impl Const {
    /// True for the numeric carriers (including the big-integer one).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Const::Int(_) | Const::Float(_) | Const::Bool(_) | Const::Big { .. }
        )
    }
}

/// Binary operator tokens, one per CPython `ast.BinOp` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum UnaryOp {
    Invert,
    Not,
    UAdd,
    USub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

/// One formal parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub arg: String,
}

/// Formal parameter list of a function or lambda.
///
/// `defaults` aligns with the trailing entries of `args`, as in CPython.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub args: Vec<Arg>,
    #[serde(default)]
    pub defaults: Vec<Expr>,
    #[serde(default)]
    pub vararg: Option<Arg>,
    #[serde(default)]
    pub kwarg: Option<Arg>,
}

/// A keyword argument at a call site; `arg: None` is `**kwargs` unpacking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    #[serde(default)]
    pub arg: Option<String>,
    pub value: Expr,
}

/// One `for target in iter if ...` clause of a comprehension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    #[serde(default)]
    pub ifs: Vec<Expr>,
}

/// `import x` / `from m import x` binding, with optional rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    #[serde(default)]
    pub asname: Option<String>,
}

/// One `except` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    #[serde(rename = "type", default)]
    pub exc_type: Option<Expr>,
    #[serde(default)]
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

/// Subscript selector: a plain index, a `lower:upper:step` slice, or a
/// multi-dimensional selector such as `a[i, :]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum Slice {
    Index {
        value: Box<Expr>,
    },
    Slice {
        #[serde(default)]
        lower: Option<Box<Expr>>,
        #[serde(default)]
        upper: Option<Box<Expr>>,
        #[serde(default)]
        step: Option<Box<Expr>>,
    },
    ExtSlice {
        dims: Vec<Slice>,
    },
}

/// Expression node kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum Expr {
    Constant {
        value: Const,
    },
    Name {
        id: String,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        keywords: Vec<Keyword>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Slice>,
    },
    Tuple {
        elts: Vec<Expr>,
    },
    List {
        elts: Vec<Expr>,
    },
    Set {
        elts: Vec<Expr>,
    },
    Dict {
        /// `None` marks a `**mapping` unpacking entry.
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Lambda {
        args: Arguments,
        body: Box<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Starred {
        value: Box<Expr>,
    },
}

impl Expr {
    /// Shorthand for a constant node.
    pub fn constant(value: Const) -> Self {
        Expr::Constant { value }
    }

    /// Shorthand for a name node.
    pub fn name(id: &str) -> Self {
        Expr::Name { id: id.to_string() }
    }

    /// True when this expression is a literal constant.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant { .. })
    }

    /// The constant payload, if this is a constant node.
    pub fn as_constant(&self) -> Option<&Const> {
        match self {
            Expr::Constant { value } => Some(value),
            _ => None,
        }
    }

    /// The constant integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expr::Constant {
                value: Const::Int(v),
            } => Some(*v),
            _ => None,
        }
    }

    /// The identifier, if this is a name node.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name { id } => Some(id),
            _ => None,
        }
    }

    /// A short label for diagnostics ("BinOp", "ListComp", ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Constant { .. } => "Constant",
            Expr::Name { .. } => "Name",
            Expr::BinOp { .. } => "BinOp",
            Expr::UnaryOp { .. } => "UnaryOp",
            Expr::BoolOp { .. } => "BoolOp",
            Expr::Compare { .. } => "Compare",
            Expr::Call { .. } => "Call",
            Expr::Attribute { .. } => "Attribute",
            Expr::Subscript { .. } => "Subscript",
            Expr::Tuple { .. } => "Tuple",
            Expr::List { .. } => "List",
            Expr::Set { .. } => "Set",
            Expr::Dict { .. } => "Dict",
            Expr::Lambda { .. } => "Lambda",
            Expr::IfExp { .. } => "IfExp",
            Expr::ListComp { .. } => "ListComp",
            Expr::SetComp { .. } => "SetComp",
            Expr::DictComp { .. } => "DictComp",
            Expr::GeneratorExp { .. } => "GeneratorExp",
            Expr::Starred { .. } => "Starred",
        }
    }
}

/// Statement node kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum Stmt {
    FunctionDef {
        name: String,
        args: Arguments,
        body: Vec<Stmt>,
        #[serde(default)]
        decorator_list: Vec<Expr>,
        #[serde(default)]
        is_async: bool,
    },
    ClassDef {
        name: String,
        #[serde(default)]
        bases: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        #[serde(default)]
        handlers: Vec<ExceptHandler>,
        #[serde(default)]
        orelse: Vec<Stmt>,
        #[serde(default)]
        finalbody: Vec<Stmt>,
    },
    Raise {
        #[serde(default)]
        exc: Option<Expr>,
    },
    Import {
        names: Vec<Alias>,
    },
    ImportFrom {
        module: String,
        names: Vec<Alias>,
    },
    Expr {
        value: Expr,
    },
    Pass,
    Break,
    Continue,
}

impl Stmt {
    /// A short label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Stmt::FunctionDef { .. } => "FunctionDef",
            Stmt::ClassDef { .. } => "ClassDef",
            Stmt::Return { .. } => "Return",
            Stmt::Assign { .. } => "Assign",
            Stmt::AugAssign { .. } => "AugAssign",
            Stmt::If { .. } => "If",
            Stmt::While { .. } => "While",
            Stmt::For { .. } => "For",
            Stmt::Try { .. } => "Try",
            Stmt::Raise { .. } => "Raise",
            Stmt::Import { .. } => "Import",
            Stmt::ImportFrom { .. } => "ImportFrom",
            Stmt::Expr { .. } => "Expr",
            Stmt::Pass => "Pass",
            Stmt::Break => "Break",
            Stmt::Continue => "Continue",
        }
    }
}

/// Decimal-string serde representation for big integer literals.
mod big_serde {
    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<BigInt>()
            .map_err(|e| de::Error::custom(format!("invalid big integer literal: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_is_numeric() {
        assert!(Const::Int(1).is_numeric());
        assert!(Const::Float(1.5).is_numeric());
        assert!(Const::Bool(true).is_numeric());
        assert!(!Const::Str("x".to_string()).is_numeric());
        assert!(!Const::None.is_numeric());
    }

    #[test]
    fn test_expr_kind_labels() {
        assert_eq!(Expr::name("x").kind(), "Name");
        assert_eq!(Expr::constant(Const::Int(1)).kind(), "Constant");
        assert_eq!(
            Expr::List {
                elts: vec![Expr::constant(Const::Int(1))]
            }
            .kind(),
            "List"
        );
    }

    #[test]
    fn test_expr_as_int() {
        assert_eq!(Expr::constant(Const::Int(7)).as_int(), Some(7));
        assert_eq!(Expr::name("x").as_int(), None);
    }
}
