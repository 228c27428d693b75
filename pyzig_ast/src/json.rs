//! Loader for the frontend's JSON AST dump.
//!
//! The frontend helper walks a CPython `ast.Module` and emits one JSON
//! object per node with a `"_type"` discriminator, CPython field names,
//! and big integers as `{"big": "<decimal digits>"}`. This module turns
//! that document back into a [`Module`].

use crate::Module;
use thiserror::Error;

/// Error raised while loading a frontend AST dump.
#[derive(Debug, Error)]
pub enum AstError {
    /// The document is not valid JSON or does not match the node schema.
    #[error("malformed AST document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse a frontend JSON dump into a module.
pub fn parse_module(src: &str) -> Result<Module, AstError> {
    Ok(serde_json::from_str(src)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Const, Expr, Stmt};

    #[test]
    fn test_parse_minimal_module() {
        let module = parse_module(
            r#"{"body": [{"_type": "Expr", "value": {"_type": "Constant", "value": 42}}]}"#,
        )
        .unwrap();
        assert_eq!(module.body.len(), 1);
        assert_eq!(
            module.body[0],
            Stmt::Expr {
                value: Expr::constant(Const::Int(42))
            }
        );
    }

    #[test]
    fn test_parse_constants() {
        let module = parse_module(
            r#"{"body": [
                {"_type": "Expr", "value": {"_type": "Constant", "value": null}},
                {"_type": "Expr", "value": {"_type": "Constant", "value": true}},
                {"_type": "Expr", "value": {"_type": "Constant", "value": 2.5}},
                {"_type": "Expr", "value": {"_type": "Constant", "value": "hi"}},
                {"_type": "Expr", "value": {"_type": "Constant", "value": {"big": "18446744073709551616"}}}
            ]}"#,
        )
        .unwrap();
        let consts: Vec<_> = module
            .body
            .iter()
            .map(|s| match s {
                Stmt::Expr { value } => value.as_constant().unwrap().clone(),
                other => panic!("unexpected statement {:?}", other),
            })
            .collect();
        assert_eq!(consts[0], Const::None);
        assert_eq!(consts[1], Const::Bool(true));
        assert_eq!(consts[2], Const::Float(2.5));
        assert_eq!(consts[3], Const::Str("hi".to_string()));
        match &consts[4] {
            Const::Big { big } => assert_eq!(big.to_string(), "18446744073709551616"),
            other => panic!("expected big integer, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_binop_expression() {
        let module = parse_module(
            r#"{"body": [{"_type": "Assign",
                "targets": [{"_type": "Name", "id": "x"}],
                "value": {"_type": "BinOp",
                    "left": {"_type": "Constant", "value": 1},
                    "op": {"_type": "Add"},
                    "right": {"_type": "Constant", "value": 2}}}]}"#,
        )
        .unwrap();
        match &module.body[0] {
            Stmt::Assign { targets, value } => {
                assert_eq!(targets[0].as_name(), Some("x"));
                assert_eq!(value.kind(), "BinOp");
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_def_with_defaults() {
        let module = parse_module(
            r#"{"body": [{"_type": "FunctionDef", "name": "f",
                "args": {"args": [{"arg": "a"}, {"arg": "b"}],
                         "defaults": [{"_type": "Constant", "value": 1}]},
                "body": [{"_type": "Return", "value": {"_type": "Name", "id": "a"}}]}]}"#,
        )
        .unwrap();
        match &module.body[0] {
            Stmt::FunctionDef {
                name, args, body, ..
            } => {
                assert_eq!(name, "f");
                assert_eq!(args.args.len(), 2);
                assert_eq!(args.defaults.len(), 1);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        assert!(parse_module("{").is_err());
        assert!(parse_module(r#"{"body": [{"_type": "Nope"}]}"#).is_err());
    }
}
