use super::*;
use crate::registry::{ClassInfo, ClassRegistry, FunctionSig, MethodInfo, ProgramFacts, SignatureTable, VarClasses};
use pyzig_ast::{Arguments, Const, Expr};

struct Fixture {
    classes: ClassRegistry,
    sigs: SignatureTable,
    facts: ProgramFacts,
    vars: VarClasses,
}

impl Fixture {
    fn new() -> Self {
        Self {
            classes: ClassRegistry::new(),
            sigs: SignatureTable::new(),
            facts: ProgramFacts::new(),
            vars: VarClasses::default(),
        }
    }

    fn ctx(&self) -> InferCtx<'_> {
        InferCtx {
            classes: &self.classes,
            sigs: &self.sigs,
            facts: &self.facts,
            vars: &self.vars,
        }
    }
}

fn int(v: i64) -> Expr {
    Expr::constant(Const::Int(v))
}

fn float(v: f64) -> Expr {
    Expr::constant(Const::Float(v))
}

fn string(s: &str) -> Expr {
    Expr::constant(Const::Str(s.to_string()))
}

fn binop(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::BinOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

#[test]
fn test_literal_types() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    assert_eq!(inf.infer_expr(&int(1), &fx.ctx()), PyType::Int);
    assert_eq!(inf.infer_expr(&float(1.5), &fx.ctx()), PyType::Float);
    assert_eq!(
        inf.infer_expr(&Expr::constant(Const::Bool(true)), &fx.ctx()),
        PyType::Bool
    );
    assert_eq!(
        inf.infer_expr(&string("hi"), &fx.ctx()),
        PyType::static_str()
    );
    assert_eq!(
        inf.infer_expr(&Expr::constant(Const::None), &fx.ctx()),
        PyType::NoneType
    );
}

#[test]
fn test_bigint_literal_carrier() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    let big = Expr::constant(Const::Big {
        big: "18446744073709551616".parse().unwrap(),
    });
    assert_eq!(inf.infer_expr(&big, &fx.ctx()), PyType::BigInt);
}

#[test]
fn test_numeric_promotion() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    assert_eq!(
        inf.infer_expr(&binop(int(1), BinOp::Add, int(2)), &fx.ctx()),
        PyType::Int
    );
    assert_eq!(
        inf.infer_expr(&binop(int(1), BinOp::Add, float(2.0)), &fx.ctx()),
        PyType::Float
    );
    // True division always yields float.
    assert_eq!(
        inf.infer_expr(&binop(int(1), BinOp::Div, int(2)), &fx.ctx()),
        PyType::Float
    );
    // Floor division keeps the operand class.
    assert_eq!(
        inf.infer_expr(&binop(int(7), BinOp::FloorDiv, int(2)), &fx.ctx()),
        PyType::Int
    );
    assert_eq!(
        inf.infer_expr(&binop(float(7.0), BinOp::Mod, int(2)), &fx.ctx()),
        PyType::Float
    );
}

#[test]
fn test_large_shift_routes_to_bigint() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    assert_eq!(
        inf.infer_expr(&binop(int(1), BinOp::LShift, int(200)), &fx.ctx()),
        PyType::BigInt
    );
    assert_eq!(
        inf.infer_expr(&binop(int(1), BinOp::LShift, int(10)), &fx.ctx()),
        PyType::Int
    );
    // Shift by a non-constant also routes.
    assert_eq!(
        inf.infer_expr(&binop(int(1), BinOp::LShift, Expr::name("n")), &fx.ctx()),
        PyType::BigInt
    );
}

#[test]
fn test_bigint_contaminates_arithmetic() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    let big = Expr::constant(Const::Big {
        big: "99999999999999999999".parse().unwrap(),
    });
    assert_eq!(
        inf.infer_expr(&binop(big, BinOp::Mod, int(1000)), &fx.ctx()),
        PyType::BigInt
    );
}

#[test]
fn test_string_concat_and_repeat() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    assert_eq!(
        inf.infer_expr(&binop(string("a"), BinOp::Add, string("b")), &fx.ctx()),
        PyType::runtime_str()
    );
    assert_eq!(
        inf.infer_expr(&binop(string("ab"), BinOp::Mult, int(3)), &fx.ctx()),
        PyType::runtime_str()
    );
}

#[test]
fn test_list_literal_widens_elements() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    let xs = Expr::List {
        elts: vec![int(1), float(2.0), int(3)],
    };
    assert_eq!(
        inf.infer_expr(&xs, &fx.ctx()),
        PyType::list_of(PyType::Float)
    );
}

#[test]
fn test_dict_literal_key_and_value() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    let d = Expr::Dict {
        keys: vec![Some(string("a")), Some(string("b"))],
        values: vec![int(1), int(2)],
    };
    assert_eq!(
        inf.infer_expr(&d, &fx.ctx()),
        PyType::dict_of(PyType::static_str(), PyType::Int)
    );
}

#[test]
fn test_subscript_dispatch() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    inf.set_var("xs", PyType::list_of(PyType::Int));
    inf.set_var("d", PyType::dict_of(PyType::static_str(), PyType::Float));
    inf.set_var("s", PyType::static_str());
    inf.set_var("t", PyType::Tuple(vec![PyType::Int, PyType::static_str()]));

    let index = |name: &str, i: i64| Expr::Subscript {
        value: Box::new(Expr::name(name)),
        slice: Box::new(Slice::Index {
            value: Box::new(int(i)),
        }),
    };

    assert_eq!(inf.infer_expr(&index("xs", 0), &fx.ctx()), PyType::Int);
    assert_eq!(inf.infer_expr(&index("d", 0), &fx.ctx()), PyType::Float);
    // Subscript on a string is a one-character string, not a char.
    assert_eq!(
        inf.infer_expr(&index("s", 0), &fx.ctx()),
        PyType::static_str()
    );
    assert_eq!(inf.infer_expr(&index("t", 1), &fx.ctx()), PyType::static_str());
    assert_eq!(inf.infer_expr(&index("t", -1), &fx.ctx()), PyType::static_str());
}

#[test]
fn test_comparison_yields_bool_except_arrays() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    inf.set_var("a", PyType::NumpyArray);
    let plain = Expr::Compare {
        left: Box::new(int(1)),
        ops: vec![CmpOp::Lt],
        comparators: vec![int(2)],
    };
    assert_eq!(inf.infer_expr(&plain, &fx.ctx()), PyType::Bool);
    let broadcast = Expr::Compare {
        left: Box::new(Expr::name("a")),
        ops: vec![CmpOp::Gt],
        comparators: vec![int(0)],
    };
    assert_eq!(inf.infer_expr(&broadcast, &fx.ctx()), PyType::BoolArray);
}

#[test]
fn test_scoped_lookup_prefers_locals() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    inf.set_var("x", PyType::static_str());
    inf.current_function = Some("f".to_string());
    inf.set_var("x", PyType::Int);

    assert_eq!(
        inf.infer_expr_scoped(&Expr::name("x"), &fx.ctx()),
        PyType::Int
    );
    // The unscoped variant sees only the module binding.
    assert_eq!(
        inf.infer_expr(&Expr::name("x"), &fx.ctx()),
        PyType::static_str()
    );
}

#[test]
fn test_register_param_scoping() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    inf.register_param("y", PyType::Float);
    assert_eq!(inf.infer_expr(&Expr::name("y"), &fx.ctx()), PyType::Float);
    inf.unregister_param("y");
    assert_eq!(inf.infer_expr(&Expr::name("y"), &fx.ctx()), PyType::Unknown);
}

#[test]
fn test_record_assignment_widens() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    inf.record_assignment("x", PyType::Int);
    inf.record_assignment("x", PyType::Float);
    assert_eq!(inf.infer_expr(&Expr::name("x"), &fx.ctx()), PyType::Float);
}

#[test]
fn test_user_function_return_type() {
    let mut fx = Fixture::new();
    let mut sig = FunctionSig::new("f", vec!["n".to_string()], 1);
    sig.return_type = PyType::Int;
    fx.sigs.insert(sig);

    let mut inf = TypeInferencer::new();
    let call = Expr::Call {
        func: Box::new(Expr::name("f")),
        args: vec![int(1)],
        keywords: vec![],
    };
    assert_eq!(inf.infer_expr(&call, &fx.ctx()), PyType::Int);
}

#[test]
fn test_class_instantiation_and_attribute() {
    let mut fx = Fixture::new();
    let mut info = ClassInfo {
        name: "Counter".to_string(),
        ..Default::default()
    };
    info.set_field("n", PyType::Int);
    info.methods.insert(
        "total".to_string(),
        MethodInfo {
            args: Arguments::default(),
            body: Vec::new(),
            is_property: true,
            return_type: PyType::Int,
            needs_allocator: false,
            returns_error: false,
        },
    );
    fx.classes.register(info);

    let mut inf = TypeInferencer::new();
    let make = Expr::Call {
        func: Box::new(Expr::name("Counter")),
        args: vec![int(0)],
        keywords: vec![],
    };
    assert_eq!(
        inf.infer_expr(&make, &fx.ctx()),
        PyType::Instance("Counter".to_string())
    );

    inf.set_var("c", PyType::Instance("Counter".to_string()));
    let field = Expr::Attribute {
        value: Box::new(Expr::name("c")),
        attr: "n".to_string(),
    };
    assert_eq!(inf.infer_expr(&field, &fx.ctx()), PyType::Int);

    // Property-decorated methods read as their return type.
    let prop = Expr::Attribute {
        value: Box::new(Expr::name("c")),
        attr: "total".to_string(),
    };
    assert_eq!(inf.infer_expr(&prop, &fx.ctx()), PyType::Int);

    // Unknown attributes fall back to the dynamic representation.
    let missing = Expr::Attribute {
        value: Box::new(Expr::name("c")),
        attr: "ghost".to_string(),
    };
    assert_eq!(inf.infer_expr(&missing, &fx.ctx()), PyType::Unknown);
}

#[test]
fn test_listcomp_element_type() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    // [i * i for i in range(5)]
    let comp = Expr::ListComp {
        elt: Box::new(binop(Expr::name("i"), BinOp::Mult, Expr::name("i"))),
        generators: vec![pyzig_ast::Comprehension {
            target: Expr::name("i"),
            iter: Expr::Call {
                func: Box::new(Expr::name("range")),
                args: vec![int(5)],
                keywords: vec![],
            },
            ifs: vec![],
        }],
    };
    assert_eq!(
        inf.infer_expr(&comp, &fx.ctx()),
        PyType::list_of(PyType::Int)
    );
}

#[test]
fn test_builtin_calls() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    inf.set_var("xs", PyType::list_of(PyType::Int));

    let call = |name: &str, args: Vec<Expr>| Expr::Call {
        func: Box::new(Expr::name(name)),
        args,
        keywords: vec![],
    };
    assert_eq!(
        inf.infer_expr(&call("len", vec![Expr::name("xs")]), &fx.ctx()),
        PyType::Usize
    );
    assert_eq!(
        inf.infer_expr(&call("sum", vec![Expr::name("xs")]), &fx.ctx()),
        PyType::Int
    );
    assert_eq!(
        inf.infer_expr(&call("str", vec![int(5)]), &fx.ctx()),
        PyType::runtime_str()
    );
    assert_eq!(
        inf.infer_expr(&call("print", vec![int(5)]), &fx.ctx()),
        PyType::NoneType
    );
}

#[test]
fn test_numpy_subscript_shapes() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    inf.set_var("a", PyType::NumpyArray);

    // a[i, j] selects a scalar.
    let scalar = Expr::Subscript {
        value: Box::new(Expr::name("a")),
        slice: Box::new(Slice::Index {
            value: Box::new(Expr::Tuple {
                elts: vec![int(0), int(1)],
            }),
        }),
    };
    assert_eq!(inf.infer_expr(&scalar, &fx.ctx()), PyType::Float);

    // a[:, j] is a column slice.
    let column = Expr::Subscript {
        value: Box::new(Expr::name("a")),
        slice: Box::new(Slice::ExtSlice {
            dims: vec![
                Slice::Slice {
                    lower: None,
                    upper: None,
                    step: None,
                },
                Slice::Index {
                    value: Box::new(int(1)),
                },
            ],
        }),
    };
    assert_eq!(inf.infer_expr(&column, &fx.ctx()), PyType::NumpyArray);
}

#[test]
fn test_fold_none_compare() {
    assert_eq!(
        fold_none_compare(CmpOp::Is, &PyType::Int, &PyType::NoneType),
        Some(false)
    );
    assert_eq!(
        fold_none_compare(CmpOp::IsNot, &PyType::Int, &PyType::NoneType),
        Some(true)
    );
    assert_eq!(
        fold_none_compare(CmpOp::Is, &PyType::NoneType, &PyType::NoneType),
        Some(true)
    );
    assert_eq!(
        fold_none_compare(CmpOp::Is, &PyType::Unknown, &PyType::NoneType),
        None
    );
    assert_eq!(
        fold_none_compare(CmpOp::Lt, &PyType::Int, &PyType::Int),
        None
    );
}

#[test]
fn test_inference_is_total() {
    let fx = Fixture::new();
    let mut inf = TypeInferencer::new();
    // A nonsense mix still yields a lattice value rather than failing.
    let odd = binop(string("a"), BinOp::Sub, int(1));
    assert_eq!(inf.infer_expr(&odd, &fx.ctx()), PyType::Unknown);
}
