//! End-to-end translation tests over the frontend JSON format.

use pyzig::{compile_json, CompileError};

#[test]
fn test_sum_of_squares_end_to_end() {
    let out = compile_json(
        r#"{"body": [
            {"_type": "Expr", "value":
                {"_type": "Call", "func": {"_type": "Name", "id": "print"},
                 "args": [
                    {"_type": "Call", "func": {"_type": "Name", "id": "sum"},
                     "args": [
                        {"_type": "ListComp",
                         "elt": {"_type": "BinOp",
                                 "left": {"_type": "Name", "id": "i"},
                                 "op": {"_type": "Mult"},
                                 "right": {"_type": "Name", "id": "i"}},
                         "generators": [{"target": {"_type": "Name", "id": "i"},
                                         "iter": {"_type": "Call",
                                                  "func": {"_type": "Name", "id": "range"},
                                                  "args": [{"_type": "Constant", "value": 5}]}}]}
                     ]}
                 ]}}
        ]}"#,
    )
    .unwrap();
    let zig = &out.zig_code;
    assert!(zig.contains("const std = @import(\"std\");"));
    assert!(zig.contains("std.ArrayList(i64)"));
    assert!(zig.contains("while (i < 5) : (i += 1)"));
    assert!(zig.contains("pub fn main() !void"));
}

#[test]
fn test_dict_access_end_to_end() {
    let out = compile_json(
        r#"{"body": [
            {"_type": "Assign",
             "targets": [{"_type": "Name", "id": "d"}],
             "value": {"_type": "Dict",
                       "keys": [{"_type": "Constant", "value": "a"},
                                {"_type": "Constant", "value": "b"}],
                       "values": [{"_type": "Constant", "value": 1},
                                  {"_type": "Constant", "value": 2}]}},
            {"_type": "Expr", "value":
                {"_type": "Call", "func": {"_type": "Name", "id": "print"},
                 "args": [{"_type": "BinOp",
                           "left": {"_type": "Subscript",
                                    "value": {"_type": "Name", "id": "d"},
                                    "slice": {"_type": "Index",
                                              "value": {"_type": "Constant", "value": "a"}}},
                           "op": {"_type": "Add"},
                           "right": {"_type": "Subscript",
                                     "value": {"_type": "Name", "id": "d"},
                                     "slice": {"_type": "Index",
                                               "value": {"_type": "Constant", "value": "b"}}}}]}}
        ]}"#,
    )
    .unwrap();
    let zig = &out.zig_code;
    assert!(zig.contains("std.StringHashMap(i64)"));
    assert!(zig.contains(".get(\"a\").?"));
    assert!(zig.contains(".get(\"b\").?"));
}

#[test]
fn test_recursive_function_end_to_end() {
    let out = compile_json(
        r#"{"body": [
            {"_type": "FunctionDef", "name": "f",
             "args": {"args": [{"arg": "n"}]},
             "body": [{"_type": "Return", "value":
                {"_type": "IfExp",
                 "test": {"_type": "Compare",
                          "left": {"_type": "Name", "id": "n"},
                          "ops": [{"_type": "Lt"}],
                          "comparators": [{"_type": "Constant", "value": 2}]},
                 "body": {"_type": "Constant", "value": 1},
                 "orelse": {"_type": "BinOp",
                            "left": {"_type": "Call", "func": {"_type": "Name", "id": "f"},
                                     "args": [{"_type": "BinOp",
                                               "left": {"_type": "Name", "id": "n"},
                                               "op": {"_type": "Sub"},
                                               "right": {"_type": "Constant", "value": 1}}]},
                            "op": {"_type": "Add"},
                            "right": {"_type": "Call", "func": {"_type": "Name", "id": "f"},
                                      "args": [{"_type": "BinOp",
                                                "left": {"_type": "Name", "id": "n"},
                                                "op": {"_type": "Sub"},
                                                "right": {"_type": "Constant", "value": 2}}]}}}}]},
            {"_type": "Expr", "value":
                {"_type": "Call", "func": {"_type": "Name", "id": "print"},
                 "args": [{"_type": "Call", "func": {"_type": "Name", "id": "f"},
                           "args": [{"_type": "Constant", "value": 10}]}]}}
        ]}"#,
    )
    .unwrap();
    let zig = &out.zig_code;
    // Allocator-free and recursive, with a concrete native signature.
    assert!(zig.contains("fn f(n: i64) i64 {"));
    assert!(!zig.contains("fn f(__global_allocator"));
    assert!(zig.contains("f((n - 1))"));
}

#[test]
fn test_class_instantiation_end_to_end() {
    let out = compile_json(
        r#"{"body": [
            {"_type": "ClassDef", "name": "Counter", "bases": [], "body": [
                {"_type": "FunctionDef", "name": "__init__",
                 "args": {"args": [{"arg": "self"}, {"arg": "n"}]},
                 "body": [{"_type": "Assign",
                           "targets": [{"_type": "Attribute",
                                        "value": {"_type": "Name", "id": "self"},
                                        "attr": "n"}],
                           "value": {"_type": "Name", "id": "n"}}]},
                {"_type": "FunctionDef", "name": "inc",
                 "args": {"args": [{"arg": "self"}]},
                 "body": [{"_type": "Assign",
                           "targets": [{"_type": "Attribute",
                                        "value": {"_type": "Name", "id": "self"},
                                        "attr": "n"}],
                           "value": {"_type": "BinOp",
                                     "left": {"_type": "Attribute",
                                              "value": {"_type": "Name", "id": "self"},
                                              "attr": "n"},
                                     "op": {"_type": "Add"},
                                     "right": {"_type": "Constant", "value": 1}}}]}
            ]},
            {"_type": "Assign", "targets": [{"_type": "Name", "id": "c"}],
             "value": {"_type": "Call", "func": {"_type": "Name", "id": "Counter"},
                       "args": [{"_type": "Constant", "value": 0}]}},
            {"_type": "Expr", "value":
                {"_type": "Call",
                 "func": {"_type": "Attribute", "value": {"_type": "Name", "id": "c"},
                          "attr": "inc"},
                 "args": []}},
            {"_type": "Expr", "value":
                {"_type": "Call", "func": {"_type": "Name", "id": "print"},
                 "args": [{"_type": "Attribute",
                           "value": {"_type": "Name", "id": "c"}, "attr": "n"}]}}
        ]}"#,
    )
    .unwrap();
    let zig = &out.zig_code;
    assert!(zig.contains("const Counter = struct {"));
    assert!(zig.contains("pub fn init(__global_allocator: std.mem.Allocator, n: i64) *Counter"));
    assert!(zig.contains("Counter.init(__global_allocator, 0)"));
    assert!(zig.contains("c.inc();"));
    assert_eq!(out.stats.classes_emitted, 1);
}

#[test]
fn test_lambda_factory_end_to_end() {
    let out = compile_json(
        r#"{"body": [
            {"_type": "Assign", "targets": [{"_type": "Name", "id": "make_adder"}],
             "value": {"_type": "Lambda",
                       "args": {"args": [{"arg": "x"}]},
                       "body": {"_type": "Lambda",
                                "args": {"args": [{"arg": "y"}]},
                                "body": {"_type": "BinOp",
                                         "left": {"_type": "Name", "id": "x"},
                                         "op": {"_type": "Add"},
                                         "right": {"_type": "Name", "id": "y"}}}}},
            {"_type": "Expr", "value":
                {"_type": "Call", "func": {"_type": "Name", "id": "print"},
                 "args": [{"_type": "Call",
                           "func": {"_type": "Call",
                                    "func": {"_type": "Name", "id": "make_adder"},
                                    "args": [{"_type": "Constant", "value": 3}]},
                           "args": [{"_type": "Constant", "value": 4}]}]}}
        ]}"#,
    )
    .unwrap();
    let zig = &out.zig_code;
    assert!(zig.contains("const __Closure_0 = struct {"));
    assert!(zig.contains("fn __lambda_0(x: i64) __Closure_0"));
    assert!(zig.contains(".call(4)"));
    // Hoisted definitions precede their first textual use.
    let closure_at = zig.find("const __Closure_0").unwrap();
    let main_at = zig.find("pub fn main").unwrap();
    assert!(closure_at < main_at);
    assert_eq!(out.stats.lambdas_hoisted, 1);
    assert_eq!(out.stats.closures_synthesized, 1);
}

#[test]
fn test_bigint_shift_end_to_end() {
    let out = compile_json(
        r#"{"body": [
            {"_type": "Assign", "targets": [{"_type": "Name", "id": "a"}],
             "value": {"_type": "BinOp",
                       "left": {"_type": "Constant", "value": 1},
                       "op": {"_type": "LShift"},
                       "right": {"_type": "Constant", "value": 200}}},
            {"_type": "Expr", "value":
                {"_type": "Call", "func": {"_type": "Name", "id": "print"},
                 "args": [{"_type": "BinOp",
                           "left": {"_type": "Name", "id": "a"},
                           "op": {"_type": "Mod"},
                           "right": {"_type": "Constant", "value": 1000}}]}}
        ]}"#,
    )
    .unwrap();
    let zig = &out.zig_code;
    assert!(zig.contains("runtime.BigInt.fromInt"));
    assert!(zig.contains(".shl(__global_allocator, 200)"));
    assert!(zig.contains(".mod(__global_allocator"));
    assert!(out.stats.bigint_routes >= 2);
}

#[test]
fn test_malformed_document_reports_frontend_error() {
    let err = compile_json("{\"body\": [{\"_type\": \"Nope\"}]}").unwrap_err();
    assert!(matches!(err, CompileError::Frontend(_)));
}

#[test]
fn test_driver_roundtrip_through_files() {
    // The driver reads the dump from disk and writes the Zig source next
    // to it; model that flow.
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("prog.ast.json");
    std::fs::write(
        &input,
        r#"{"body": [{"_type": "Expr", "value":
            {"_type": "Call", "func": {"_type": "Name", "id": "print"},
             "args": [{"_type": "Constant", "value": "hello"}]}}]}"#,
    )
    .unwrap();

    let source = std::fs::read_to_string(&input).unwrap();
    let out = compile_json(&source).unwrap();
    let zig_path = dir.path().join("prog.zig");
    std::fs::write(&zig_path, &out.zig_code).unwrap();

    let written = std::fs::read_to_string(&zig_path).unwrap();
    assert!(written.contains("pub fn main() !void"));
    assert!(written.contains("hello"));
}
