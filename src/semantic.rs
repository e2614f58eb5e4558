// semantic.rs - Type checking for predicate and transform scripts.
//
// A single forward pass assigns a type to every expression. Variables take
// the type of their last assignment; names never assigned (captures, for
// instance) are strings.

use std::collections::HashMap;

use crate::ast::{BinaryOp, ProcExpr, Statement, UnaryOp};
use crate::error::SemanticError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

/// Where a script runs, which decides what it may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptContext {
    Predicate,
    Transform,
}

pub type TypeEnv = HashMap<String, ValueType>;

/// Bindings visible to a pattern predicate.
pub fn predicate_env() -> TypeEnv {
    let mut env = TypeEnv::new();
    env.insert("match".to_string(), ValueType::String);
    env.insert("matchLength".to_string(), ValueType::Number);
    env
}

/// Bindings visible to a transform, in addition to the match's captures.
pub fn transform_env() -> TypeEnv {
    let mut env = predicate_env();
    for name in [
        "matchNumber",
        "totalMatches",
        "startOffset",
        "endOffset",
        "lineNumber",
        "columnNumber",
    ] {
        env.insert(name.to_string(), ValueType::Number);
    }
    env.insert("value".to_string(), ValueType::String);
    env.insert("filename".to_string(), ValueType::String);
    env
}

struct Checker {
    context: ScriptContext,
    env: TypeEnv,
    loop_depth: usize,
}

/// Check `statements` for use in `context`.
pub fn check(
    statements: &[Statement],
    context: ScriptContext,
    initial: TypeEnv,
) -> Result<(), SemanticError> {
    let mut checker = Checker {
        context,
        env: initial,
        loop_depth: 0,
    };
    checker.statements(statements)
}

impl Checker {
    fn statements(&mut self, statements: &[Statement]) -> Result<(), SemanticError> {
        for stmt in statements {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> Result<(), SemanticError> {
        match stmt {
            Statement::Set { name, expr } => {
                let ty = self.expr(expr)?;
                self.env.insert(name.clone(), ty);
            }
            Statement::Return(expr) => {
                let ty = self.expr(expr)?;
                match self.context {
                    ScriptContext::Predicate if ty != ValueType::Boolean => {
                        return Err(SemanticError::new(
                            "Since we are in the predicate of a pattern, return values must be a boolean",
                            stmt,
                        ));
                    }
                    ScriptContext::Transform if ty == ValueType::Boolean => {
                        return Err(SemanticError::new(
                            "Since we are in a transform function, return values must be a string or a number",
                            stmt,
                        ));
                    }
                    _ => {}
                }
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.expr(condition)? != ValueType::Boolean {
                    return Err(SemanticError::new(
                        "Condition of an if statement must be a boolean",
                        condition,
                    ));
                }
                self.statements(then_body)?;
                self.statements(else_body)?;
            }
            Statement::Loop(body) => {
                self.loop_depth += 1;
                let result = self.statements(body);
                self.loop_depth -= 1;
                result?;
            }
            Statement::Break if self.loop_depth == 0 => {
                return Err(SemanticError::new(
                    "Cannot use 'break' outside of a loop",
                    stmt,
                ));
            }
            Statement::Continue if self.loop_depth == 0 => {
                return Err(SemanticError::new(
                    "Cannot use 'continue' outside of a loop",
                    stmt,
                ));
            }
            Statement::Break | Statement::Continue => {}
            Statement::Debug(expr) | Statement::Expr(expr) => {
                self.expr(expr)?;
            }
        }
        Ok(())
    }

    fn expr(&self, expr: &ProcExpr) -> Result<ValueType, SemanticError> {
        match expr {
            ProcExpr::String(_) => Ok(ValueType::String),
            ProcExpr::Number(_) => Ok(ValueType::Number),
            ProcExpr::Boolean(_) => Ok(ValueType::Boolean),
            ProcExpr::Variable(name) => {
                Ok(self.env.get(name).copied().unwrap_or(ValueType::String))
            }
            ProcExpr::Unary { op, operand } => {
                let ty = self.expr(operand)?;
                unary_type(*op, ty).ok_or_else(|| {
                    SemanticError::new("Operator not defined for type", expr)
                })
            }
            ProcExpr::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                binary_type(*op, lhs, rhs).ok_or_else(|| {
                    SemanticError::new("Operator not defined for type", expr)
                })
            }
        }
    }
}

/// Result type of a unary operator, or `None` if it is not defined.
pub fn unary_type(op: UnaryOp, operand: ValueType) -> Option<ValueType> {
    match (op, operand) {
        (UnaryOp::Not, ValueType::Boolean) => Some(ValueType::Boolean),
        (UnaryOp::Head | UnaryOp::Tail, ValueType::String) => Some(ValueType::String),
        _ => None,
    }
}

/// Result type of a binary operator, or `None` if it is not defined.
pub fn binary_type(op: BinaryOp, lhs: ValueType, rhs: ValueType) -> Option<ValueType> {
    use ValueType::*;
    match (lhs, rhs) {
        (String, String | Number) if op == BinaryOp::Add => Some(String),
        (Number, Number) if op.is_arithmetic() => Some(Number),
        (Boolean, Boolean) if op.is_logical() => Some(Boolean),
        (l, r) if l == r && op.is_comparison() => Some(Boolean),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ret(expr: ProcExpr) -> Vec<Statement> {
        vec![Statement::Return(expr)]
    }

    #[test]
    fn predicate_must_return_boolean() {
        let body = ret(ProcExpr::string("nope"));
        let err = check(&body, ScriptContext::Predicate, predicate_env()).unwrap_err();
        assert!(err.message.contains("predicate"));
        assert!(err.message.contains("boolean"));

        let ok = ret(ProcExpr::binary(
            BinaryOp::GreaterEqual,
            ProcExpr::var("matchLength"),
            ProcExpr::Number(3),
        ));
        assert!(check(&ok, ScriptContext::Predicate, predicate_env()).is_ok());
    }

    #[test]
    fn transform_rejects_boolean_return() {
        let body = ret(ProcExpr::Boolean(true));
        let err = check(&body, ScriptContext::Transform, transform_env()).unwrap_err();
        assert!(err.message.contains("transform"));
        assert!(check(&ret(ProcExpr::Number(1)), ScriptContext::Transform, transform_env()).is_ok());
        assert!(check(&ret(ProcExpr::var("match")), ScriptContext::Transform, transform_env()).is_ok());
    }

    #[test]
    fn if_condition_must_be_boolean() {
        let body = vec![Statement::If {
            condition: ProcExpr::var("match"),
            then_body: vec![],
            else_body: vec![],
        }];
        let err = check(&body, ScriptContext::Predicate, predicate_env()).unwrap_err();
        assert_eq!(err.message, "Condition of an if statement must be a boolean");
    }

    #[test]
    fn break_requires_loop() {
        let err = check(&[Statement::Break], ScriptContext::Transform, TypeEnv::new()).unwrap_err();
        assert_eq!(err.message, "Cannot use 'break' outside of a loop");
        let err =
            check(&[Statement::Continue], ScriptContext::Transform, TypeEnv::new()).unwrap_err();
        assert_eq!(err.message, "Cannot use 'continue' outside of a loop");

        let nested = vec![Statement::Loop(vec![Statement::If {
            condition: ProcExpr::Boolean(true),
            then_body: vec![Statement::Break],
            else_body: vec![Statement::Continue],
        }])];
        assert!(check(&nested, ScriptContext::Transform, TypeEnv::new()).is_ok());
        // depth restored after the loop
        let after = vec![Statement::Loop(vec![]), Statement::Break];
        assert!(check(&after, ScriptContext::Transform, TypeEnv::new()).is_err());
    }

    #[test]
    fn set_tracks_types() {
        let body = vec![
            Statement::Set {
                name: "n".to_string(),
                expr: ProcExpr::Number(2),
            },
            Statement::Return(ProcExpr::binary(
                BinaryOp::Less,
                ProcExpr::var("n"),
                ProcExpr::var("matchLength"),
            )),
        ];
        assert!(check(&body, ScriptContext::Predicate, predicate_env()).is_ok());
    }

    #[test]
    fn operator_table() {
        use ValueType::*;
        assert_eq!(binary_type(BinaryOp::Add, String, Number), Some(String));
        assert_eq!(binary_type(BinaryOp::Add, Number, String), None);
        assert_eq!(binary_type(BinaryOp::Modulo, Number, Number), Some(Number));
        assert_eq!(binary_type(BinaryOp::Subtract, String, String), None);
        assert_eq!(binary_type(BinaryOp::Equal, String, String), Some(Boolean));
        assert_eq!(binary_type(BinaryOp::Less, String, Number), None);
        assert_eq!(binary_type(BinaryOp::And, Boolean, Boolean), Some(Boolean));
        assert_eq!(binary_type(BinaryOp::And, Number, Number), None);
        assert_eq!(unary_type(UnaryOp::Not, Boolean), Some(Boolean));
        assert_eq!(unary_type(UnaryOp::Tail, Number), None);
    }

    #[test]
    fn operator_error_names_node() {
        let body = ret(ProcExpr::unary(UnaryOp::Not, ProcExpr::Number(1)));
        let err = check(&body, ScriptContext::Predicate, predicate_env()).unwrap_err();
        assert_eq!(err.message, "Operator not defined for type");
        assert!(err.node.contains("Unary"));
    }
}
