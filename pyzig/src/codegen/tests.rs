use super::*;
use crate::CompileError;
use pyzig_ast::{
    Arguments, BinOp, CmpOp, Comprehension, Const, Expr, Module, Slice, Stmt,
};

fn int(v: i64) -> Expr {
    Expr::constant(Const::Int(v))
}

fn string(s: &str) -> Expr {
    Expr::constant(Const::Str(s.to_string()))
}

fn name(id: &str) -> Expr {
    Expr::name(id)
}

fn binop(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::BinOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn call(func: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        func: Box::new(name(func)),
        args,
        keywords: vec![],
    }
}

fn method(receiver: Expr, method_name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        func: Box::new(Expr::Attribute {
            value: Box::new(receiver),
            attr: method_name.to_string(),
        }),
        args,
        keywords: vec![],
    }
}

fn expr_stmt(value: Expr) -> Stmt {
    Stmt::Expr { value }
}

fn assign(target: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        targets: vec![name(target)],
        value,
    }
}

fn params(names: &[&str]) -> Arguments {
    Arguments {
        args: names
            .iter()
            .map(|n| pyzig_ast::Arg {
                arg: n.to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

fn def(fn_name: &str, args: &[&str], body: Vec<Stmt>) -> Stmt {
    Stmt::FunctionDef {
        name: fn_name.to_string(),
        args: params(args),
        body,
        decorator_list: vec![],
        is_async: false,
    }
}

fn ret(value: Expr) -> Stmt {
    Stmt::Return { value: Some(value) }
}

fn compile(body: Vec<Stmt>) -> String {
    let mut generator = ZigCodeGenerator::default_config();
    generator
        .generate_module(&Module { body })
        .expect("translation should succeed")
        .zig_code
}

#[test]
fn test_escape_reserved_identifiers() {
    assert_eq!(escape_ident("while"), "@\"while\"");
    assert_eq!(escape_ident("error"), "@\"error\"");
    assert_eq!(escape_ident("allocator"), "@\"allocator\"");
    assert_eq!(escape_ident("count"), "count");
}

#[test]
fn test_prelude_and_module_allocator() {
    let out = compile(vec![assign("x", int(1))]);
    assert!(out.contains("const std = @import(\"std\");"));
    assert!(out.contains("const runtime = @import(\"runtime.zig\");"));
    assert!(out.contains("const allocator = std.heap.page_allocator;"));
    // A constant scalar initializer lands at module scope.
    assert!(out.contains("const x: i64 = 1;"));
}

#[test]
fn test_reserved_user_name_is_escaped() {
    let out = compile(vec![assign("const", int(1))]);
    assert!(out.contains("@\"const\""));
}

#[test]
fn test_sum_of_squares_comprehension() {
    // print(sum([i * i for i in range(5)]))
    let comp = Expr::ListComp {
        elt: Box::new(binop(name("i"), BinOp::Mult, name("i"))),
        generators: vec![Comprehension {
            target: name("i"),
            iter: call("range", vec![int(5)]),
            ifs: vec![],
        }],
    };
    let out = compile(vec![expr_stmt(call("print", vec![call("sum", vec![comp])]))]);
    assert!(out.contains("std.ArrayList(i64)"));
    assert!(out.contains("while (i < 5) : (i += 1)"));
    assert!(out.contains(".append((i * i)) catch unreachable"));
    // The summed result prints as a native integer.
    assert!(out.contains("print(\"{d}\\n\""));
    // The module body allocates, so main owns the arena.
    assert!(out.contains("std.heap.ArenaAllocator.init"));
    assert!(out.contains("const __global_allocator = __arena.allocator();"));
}

#[test]
fn test_string_keyed_dict_comptime_literal() {
    // d = {"a": 1, "b": 2}; print(d["a"] + d["b"])
    let dict = Expr::Dict {
        keys: vec![Some(string("a")), Some(string("b"))],
        values: vec![int(1), int(2)],
    };
    let index = |key: &str| Expr::Subscript {
        value: Box::new(name("d")),
        slice: Box::new(Slice::Index {
            value: Box::new(string(key)),
        }),
    };
    let out = compile(vec![
        assign("d", dict),
        expr_stmt(call(
            "print",
            vec![binop(index("a"), BinOp::Add, index("b"))],
        )),
    ]);
    assert!(out.contains("std.StringHashMap(i64)"));
    // All-constant entries take the comptime path.
    assert!(out.contains("inline for"));
    assert!(out.contains(".get(\"a\").?"));
}

#[test]
fn test_integer_keyed_dict() {
    let dict = Expr::Dict {
        keys: vec![Some(int(1))],
        values: vec![string("one")],
    };
    let out = compile(vec![assign("d", dict)]);
    assert!(out.contains("std.AutoHashMap(i64, []const u8)"));
}

#[test]
fn test_recursive_function_is_allocator_free() {
    // def f(n): return 1 if n < 2 else f(n - 1) + f(n - 2)
    // print(f(10))
    let cond = Expr::Compare {
        left: Box::new(name("n")),
        ops: vec![CmpOp::Lt],
        comparators: vec![int(2)],
    };
    let body = Expr::IfExp {
        test: Box::new(cond),
        body: Box::new(int(1)),
        orelse: Box::new(binop(
            call("f", vec![binop(name("n"), BinOp::Sub, int(1))]),
            BinOp::Add,
            call("f", vec![binop(name("n"), BinOp::Sub, int(2))]),
        )),
    };
    let out = compile(vec![
        def("f", &["n"], vec![ret(body)]),
        expr_stmt(call("print", vec![call("f", vec![int(10)])])),
    ]);
    // The signature carries no allocator and a concrete return type.
    assert!(out.contains("fn f(n: i64) i64 {"));
    assert!(!out.contains("fn f(__global_allocator"));
    assert!(out.contains("f((n - 1))"));
    assert!(out.contains("f((n - 2))"));
    // No allocation anywhere: main needs no arena.
    assert!(!out.contains("ArenaAllocator"));
}

#[test]
fn test_lambda_factory_builds_capturing_struct() {
    // make_adder = lambda x: lambda y: x + y
    // print(make_adder(3)(4))
    let inner = Expr::Lambda {
        args: params(&["y"]),
        body: Box::new(binop(name("x"), BinOp::Add, name("y"))),
    };
    let outer = Expr::Lambda {
        args: params(&["x"]),
        body: Box::new(inner),
    };
    let out = compile(vec![
        assign("make_adder", outer),
        expr_stmt(call(
            "print",
            vec![Expr::Call {
                func: Box::new(call("make_adder", vec![int(3)])),
                args: vec![int(4)],
                keywords: vec![],
            }],
        )),
    ]);
    assert!(out.contains("const __Closure_0 = struct {"));
    assert!(out.contains("pub fn call(self: @This(), y: i64) i64"));
    assert!(out.contains("self.x"));
    assert!(out.contains("fn __lambda_0(x: i64) __Closure_0"));
    assert!(out.contains("__Closure_0{ .x = x }"));
    assert!(out.contains("const make_adder = &__lambda_0;"));
    assert!(out.contains(".call(4)"));
    // The closure result feeds print as a native integer.
    assert!(out.contains("print(\"{d}\\n\""));
}

#[test]
fn test_hoisted_definitions_precede_main() {
    let lambda = Expr::Lambda {
        args: params(&["x"]),
        body: Box::new(binop(name("x"), BinOp::Add, int(1))),
    };
    let out = compile(vec![
        assign("inc", lambda),
        expr_stmt(call("print", vec![call("inc", vec![int(1)])])),
    ]);
    let hoisted_at = out.find("fn __lambda_0").expect("hoisted lambda emitted");
    let main_at = out.find("pub fn main").expect("main emitted");
    assert!(hoisted_at < main_at);
}

#[test]
fn test_class_with_mutating_method() {
    // class Counter: __init__(self, n) stores n; inc(self) bumps it.
    let init = Stmt::FunctionDef {
        name: "__init__".to_string(),
        args: params(&["self", "n"]),
        body: vec![Stmt::Assign {
            targets: vec![Expr::Attribute {
                value: Box::new(name("self")),
                attr: "n".to_string(),
            }],
            value: name("n"),
        }],
        decorator_list: vec![],
        is_async: false,
    };
    let inc = Stmt::FunctionDef {
        name: "inc".to_string(),
        args: params(&["self"]),
        body: vec![Stmt::Assign {
            targets: vec![Expr::Attribute {
                value: Box::new(name("self")),
                attr: "n".to_string(),
            }],
            value: binop(
                Expr::Attribute {
                    value: Box::new(name("self")),
                    attr: "n".to_string(),
                },
                BinOp::Add,
                int(1),
            ),
        }],
        decorator_list: vec![],
        is_async: false,
    };
    let class = Stmt::ClassDef {
        name: "Counter".to_string(),
        bases: vec![],
        body: vec![init, inc],
    };
    let out = compile(vec![
        class,
        assign("c", call("Counter", vec![int(0)])),
        expr_stmt(method(name("c"), "inc", vec![])),
        expr_stmt(method(name("c"), "inc", vec![])),
        expr_stmt(method(name("c"), "inc", vec![])),
        expr_stmt(call(
            "print",
            vec![Expr::Attribute {
                value: Box::new(name("c")),
                attr: "n".to_string(),
            }],
        )),
    ]);
    assert!(out.contains("const Counter = struct {"));
    assert!(out.contains("n: i64,"));
    assert!(out.contains(
        "pub fn init(__global_allocator: std.mem.Allocator, n: i64) *Counter"
    ));
    assert!(out.contains("pub fn inc(self: *Counter) void"));
    assert!(out.contains("self.n = (self.n + 1);"));
    assert!(out.contains("Counter.init(__global_allocator, 0)"));
    assert!(out.contains("c.inc();"));
    assert!(out.contains("print(\"{d}\\n\""));
}

#[test]
fn test_large_shift_routes_through_bigint() {
    // a = 1 << 200; print(a % 1000)
    let out = compile(vec![
        assign("a", binop(int(1), BinOp::LShift, int(200))),
        expr_stmt(call(
            "print",
            vec![binop(name("a"), BinOp::Mod, int(1000))],
        )),
    ]);
    assert!(out.contains("runtime.BigInt.fromInt(__global_allocator, 1)"));
    assert!(out.contains(".shl(__global_allocator, 200)"));
    assert!(out.contains(".mod(__global_allocator"));
    assert!(out.contains(".toString(__global_allocator)"));
    assert!(out.contains("catch unreachable"));
}

#[test]
fn test_oversized_literal_uses_runtime_parse() {
    let big = Expr::constant(Const::Big {
        big: "18446744073709551616".parse().unwrap(),
    });
    let out = compile(vec![expr_stmt(call("print", vec![big]))]);
    assert!(out.contains(
        "runtime.parseIntToBigInt(__global_allocator, \"18446744073709551616\", 10)"
    ));
}

#[test]
fn test_chained_comparison_expands_to_conjunction() {
    let chain = Expr::Compare {
        left: Box::new(name("a")),
        ops: vec![CmpOp::Lt, CmpOp::Lt],
        comparators: vec![name("b"), name("c")],
    };
    let out = compile(vec![
        def("between", &["a", "b", "c"], vec![ret(chain)]),
        expr_stmt(call("between", vec![int(1), int(2), int(3)])),
    ]);
    assert!(out.contains("((a < b) and (b < c))"));
    assert!(out.contains("fn between(a: i64, b: i64, c: i64) bool"));
}

#[test]
fn test_string_equality_is_byte_equality() {
    let cmp = Expr::Compare {
        left: Box::new(name("a")),
        ops: vec![CmpOp::Eq],
        comparators: vec![name("b")],
    };
    let out = compile(vec![
        def("same", &["a", "b"], vec![ret(cmp)]),
        expr_stmt(call("same", vec![string("x"), string("y")])),
    ]);
    assert!(out.contains("std.mem.eql(u8, a, b)"));
}

#[test]
fn test_integer_containment_uses_scalar_search() {
    let test = Expr::Compare {
        left: Box::new(name("v")),
        ops: vec![CmpOp::In],
        comparators: vec![name("xs")],
    };
    let out = compile(vec![
        def("has", &["xs", "v"], vec![ret(test)]),
        expr_stmt(call(
            "has",
            vec![Expr::List {
                elts: vec![int(1), int(2)],
            },
            int(3)],
        )),
    ]);
    assert!(out.contains("std.mem.indexOfScalar(i64, xs.items, v) != null"));
}

#[test]
fn test_none_comparison_folds_but_reads_operands() {
    let cmp = Expr::Compare {
        left: Box::new(name("x")),
        ops: vec![CmpOp::Is],
        comparators: vec![Expr::constant(Const::None)],
    };
    let out = compile(vec![
        def("is_none", &["x"], vec![ret(cmp)]),
        expr_stmt(call("is_none", vec![int(1)])),
    ]);
    // Folded to false, with the variable still read.
    assert!(out.contains("_ = x;"));
    assert!(out.contains("false"));
}

#[test]
fn test_negative_index_is_length_relative() {
    let sub = Expr::Subscript {
        value: Box::new(name("xs")),
        slice: Box::new(Slice::Index {
            value: Box::new(int(-1)),
        }),
    };
    let out = compile(vec![
        def("last", &["xs"], vec![ret(sub)]),
        expr_stmt(call(
            "last",
            vec![Expr::List {
                elts: vec![int(1), int(2), int(3)],
            }],
        )),
    ]);
    assert!(out.contains("xs.items[xs.items.len - 1]"));
}

#[test]
fn test_runtime_index_carries_bounds_check() {
    let sub = Expr::Subscript {
        value: Box::new(name("xs")),
        slice: Box::new(Slice::Index {
            value: Box::new(name("i")),
        }),
    };
    let out = compile(vec![
        def("at", &["xs", "i"], vec![ret(sub)]),
        expr_stmt(call(
            "at",
            vec![
                Expr::List {
                    elts: vec![int(1)],
                },
                int(0),
            ],
        )),
    ]);
    assert!(out.contains("return error.IndexError"));
    // Fallibility propagates into the signature.
    assert!(out.contains("!i64"));
}

#[test]
fn test_dynamic_index_store_carries_bounds_check() {
    // def put(xs, i, v): xs[i] = v
    let store = Stmt::Assign {
        targets: vec![Expr::Subscript {
            value: Box::new(name("xs")),
            slice: Box::new(Slice::Index {
                value: Box::new(name("i")),
            }),
        }],
        value: name("v"),
    };
    let out = compile(vec![
        def("put", &["xs", "i", "v"], vec![store]),
        expr_stmt(call(
            "put",
            vec![
                Expr::List {
                    elts: vec![int(1), int(2)],
                },
                int(0),
                int(5),
            ],
        )),
    ]);
    // The store normalizes length-relative and checks bounds, like reads.
    assert!(out.contains("return error.IndexError"));
    assert!(out.contains(".items.len)"));
    assert!(out.contains("] = v; }"));
    assert!(!out.contains("xs.items[@intCast(i)] = v"));
    // Fallibility propagates into the signature.
    assert!(out.contains("!void"));
}

#[test]
fn test_module_scope_dynamic_index_still_normalizes() {
    // At scope 0 the bounds-check block stays; only the error arm
    // degrades to unreachable (initializers cannot be fallible).
    let mut generator = ZigCodeGenerator::default_config();
    generator.infer.set_var("xs", PyType::list_of(PyType::Int));
    generator.infer.set_var("i", PyType::Int);
    let sub = Expr::Subscript {
        value: Box::new(name("xs")),
        slice: Box::new(Slice::Index {
            value: Box::new(name("i")),
        }),
    };
    let out = generator.emit_expr(&sub).unwrap();
    assert!(out.contains("= if ("));
    assert!(out.contains("unreachable;"));
    assert!(!out.contains("return error"));
    assert!(!out.contains("xs.items[@intCast(i)]"));
}

#[test]
fn test_unit_step_slice() {
    let sub = Expr::Subscript {
        value: Box::new(name("xs")),
        slice: Box::new(Slice::Slice {
            lower: Some(Box::new(int(1))),
            upper: None,
            step: None,
        }),
    };
    let out = compile(vec![
        def("tail", &["xs"], vec![ret(sub)]),
        expr_stmt(call(
            "tail",
            vec![Expr::List {
                elts: vec![int(1), int(2), int(3)],
            }],
        )),
    ]);
    assert!(out.contains("var __start: i64 = 1;"));
    assert!(out.contains("appendSlice"));
}

#[test]
fn test_tuple_subscript_requires_constant_index() {
    let sub = Expr::Subscript {
        value: Box::new(name("t")),
        slice: Box::new(Slice::Index {
            value: Box::new(name("i")),
        }),
    };
    let module = Module {
        body: vec![
            def("pick", &["t", "i"], vec![ret(sub)]),
            expr_stmt(call(
                "pick",
                vec![
                    Expr::Tuple {
                        elts: vec![int(1), string("x")],
                    },
                    int(0),
                ],
            )),
        ],
    };
    let mut generator = ZigCodeGenerator::default_config();
    let err = generator.generate_module(&module).unwrap_err();
    assert!(matches!(err, CompileError::TupleIndex));
}

#[test]
fn test_percent_format_expands_to_alloc_print() {
    let fmt = binop(string("x=%d y=%s"), BinOp::Mod, Expr::Tuple {
        elts: vec![name("n"), string("hi")],
    });
    let out = compile(vec![
        def("fmt", &["n"], vec![ret(fmt)]),
        expr_stmt(call("fmt", vec![int(5)])),
    ]);
    assert!(out.contains("std.fmt.allocPrint(__global_allocator, \"x={d} y={s}\""));
    // A formatting function allocates, so it takes the allocator first.
    assert!(out.contains("fn fmt(__global_allocator: std.mem.Allocator, n: i64)"));
}

#[test]
fn test_unknown_format_specifier_is_verbatim() {
    let fmt = binop(string("%q"), BinOp::Mod, int(5));
    let out = compile(vec![
        def("fmt", &["n"], vec![ret(fmt)]),
        expr_stmt(call("fmt", vec![int(5)])),
    ]);
    assert!(out.contains("\"%q\""));
}

#[test]
fn test_string_concat_flattens_chain() {
    // a + b + c compiles to one concat call.
    let chain = binop(
        binop(name("a"), BinOp::Add, name("b")),
        BinOp::Add,
        name("c"),
    );
    let out = compile(vec![
        def("cat", &["a", "b", "c"], vec![ret(chain)]),
        expr_stmt(call(
            "cat",
            vec![string("x"), string("y"), string("z")],
        )),
    ]);
    assert!(out.contains("runtime.strConcat(__global_allocator, &[_][]const u8{ a, b, c })"));
    // One call, not pairwise.
    assert_eq!(out.matches("runtime.strConcat").count(), 1);
}

#[test]
fn test_division_is_fallible_in_functions_and_direct_at_module_scope() {
    let out = compile(vec![
        assign("half", binop(int(1), BinOp::Div, int(2))),
        def(
            "div",
            &["a", "b"],
            vec![ret(binop(name("a"), BinOp::Div, name("b")))],
        ),
        expr_stmt(call("div", vec![int(1), int(2)])),
    ]);
    // Module scope folds to a direct cast; function scope goes fallible.
    assert!(out.contains("const half: f64 ="));
    assert!(out.contains("(try runtime.divideFloat("));
    assert!(out.contains("!f64"));
}

#[test]
fn test_list_literal_mixing_int_and_float_widens() {
    let xs = Expr::List {
        elts: vec![int(1), Expr::constant(Const::Float(2.5))],
    };
    let out = compile(vec![assign("xs", xs)]);
    assert!(out.contains("std.ArrayList(f64)"));
    // The integer element is rendered in float position.
    assert!(out.contains("1.0"));
}

#[test]
fn test_dict_unpacking_merges_entries() {
    let merged = Expr::Dict {
        keys: vec![None, Some(string("c"))],
        values: vec![name("d"), int(3)],
    };
    let dict = Expr::Dict {
        keys: vec![Some(string("a"))],
        values: vec![int(1)],
    };
    let out = compile(vec![
        def("merge", &["d"], vec![ret(merged)]),
        expr_stmt(call("merge", vec![dict])),
    ]);
    assert!(out.contains("key_ptr.*"));
    assert!(out.contains("put(\"c\", 3) catch unreachable"));
}

#[test]
fn test_reassigned_parameter_gets_var_prologue() {
    // def loop(n): while n: n = n - 1
    let body = vec![Stmt::While {
        test: name("n"),
        body: vec![assign("n", binop(name("n"), BinOp::Sub, int(1)))],
    }];
    let out = compile(vec![
        def("countdown", &["n"], body),
        expr_stmt(call("countdown", vec![int(3)])),
    ]);
    assert!(out.contains("n_param: i64"));
    assert!(out.contains("var n: i64 = n_param;"));
    assert!(out.contains("while ((n != 0))"));
}

#[test]
fn test_augmented_assignment_reuses_binop_path() {
    let body = vec![
        assign("n", int(0)),
        Stmt::AugAssign {
            target: name("n"),
            op: BinOp::Add,
            value: int(2),
        },
        ret(name("n")),
    ];
    let out = compile(vec![
        def("bump", &[], body),
        expr_stmt(call("bump", vec![])),
    ]);
    assert!(out.contains("var n: i64 = 0;"));
    assert!(out.contains("n = (n + 2);"));
}

#[test]
fn test_try_except_uses_two_label_scheme() {
    let body = vec![Stmt::Try {
        body: vec![expr_stmt(call("boom", vec![]))],
        handlers: vec![pyzig_ast::ExceptHandler {
            exc_type: Some(name("ValueError")),
            name: None,
            body: vec![expr_stmt(call("print", vec![string("caught")]))],
        }],
        orelse: vec![],
        finalbody: vec![],
    }];
    let out = compile(vec![
        def(
            "boom",
            &[],
            vec![Stmt::Raise {
                exc: Some(call("ValueError", vec![])),
            }],
        ),
        def("guard", &[], body),
        expr_stmt(call("guard", vec![])),
    ]);
    assert!(out.contains("return error.ValueError;"));
    assert!(out.contains("__ok_"));
    assert!(out.contains("__err_"));
    assert!(out.contains("catch break :__err_"));
}

#[test]
fn test_async_function_gains_suffix() {
    let module = vec![
        Stmt::FunctionDef {
            name: "fetch".to_string(),
            args: params(&["n"]),
            body: vec![ret(name("n"))],
            decorator_list: vec![],
            is_async: true,
        },
        expr_stmt(call("fetch", vec![int(1)])),
    ];
    let out = compile(module);
    assert!(out.contains("fn fetch_async(n: i64) i64"));
    assert!(out.contains("fetch_async(1)"));
}

#[test]
fn test_default_parameters_pad_with_null() {
    let mut args = params(&["a", "b"]);
    args.defaults = vec![int(10)];
    let module = vec![
        Stmt::FunctionDef {
            name: "padded".to_string(),
            args,
            body: vec![ret(binop(name("a"), BinOp::Add, name("b")))],
            decorator_list: vec![],
            is_async: false,
        },
        expr_stmt(call("padded", vec![int(1)])),
    ];
    let out = compile(module);
    assert!(out.contains("__opt_b: ?i64"));
    assert!(out.contains("__opt_b orelse 10"));
    assert!(out.contains("padded(1, null)"));
}

#[test]
fn test_math_dispatch_and_constant() {
    let module = vec![
        Stmt::Import {
            names: vec![pyzig_ast::Alias {
                name: "math".to_string(),
                asname: None,
            }],
        },
        expr_stmt(call(
            "print",
            vec![method(name("math"), "sqrt", vec![int(2)])],
        )),
        expr_stmt(call(
            "print",
            vec![Expr::Attribute {
                value: Box::new(name("math")),
                attr: "pi".to_string(),
            }],
        )),
    ];
    let out = compile(module);
    // Integer arguments cast to float per the registry's conversion rule.
    assert!(out.contains("std.math.sqrt(@as(f64, @floatFromInt(2)))"));
    assert!(out.contains("std.math.pi"));
}

#[test]
fn test_stats_track_emission() {
    let mut generator = ZigCodeGenerator::default_config();
    let module = Module {
        body: vec![
            def("f", &["n"], vec![ret(name("n"))]),
            assign(
                "xs",
                Expr::List {
                    elts: vec![int(1), int(2)],
                },
            ),
            expr_stmt(call("f", vec![int(1)])),
        ],
    };
    let output = generator.generate_module(&module).unwrap();
    assert_eq!(output.stats.functions_emitted, 1);
    assert_eq!(output.stats.comptime_literals, 1);
    assert!(output.stats.type_inferences > 0);
}
