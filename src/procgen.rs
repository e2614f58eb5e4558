// procgen.rs - Code generation for predicate and transform scripts.
//
// Statements lower to a flat stack-machine program. Control flow is first
// emitted against symbolic labels, then `resolve_labels` rewrites every
// label jump to an absolute PC and drops the labels.

use std::collections::HashMap;

use crate::ast::{ProcExpr, Statement};
use crate::bytecode::ProcInstruction;
use crate::error::GenError;
use crate::value::Value;

struct LoopLabels {
    start: usize,
    end: usize,
}

struct ProcGen {
    code: Vec<ProcInstruction>,
    next_label: usize,
    loops: Vec<LoopLabels>,
}

impl ProcGen {
    fn new() -> Self {
        ProcGen {
            code: Vec::new(),
            next_label: 0,
            loops: Vec::new(),
        }
    }

    fn new_label(&mut self) -> usize {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn emit(&mut self, inst: ProcInstruction) {
        self.code.push(inst);
    }

    fn statements(&mut self, statements: &[Statement]) -> Result<(), GenError> {
        for stmt in statements {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> Result<(), GenError> {
        match stmt {
            Statement::Set { name, expr } => {
                self.expr(expr);
                self.emit(ProcInstruction::Store(name.clone()));
            }
            Statement::Return(expr) => {
                self.expr(expr);
                self.emit(ProcInstruction::Return);
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.expr(condition);
                self.emit(ProcInstruction::LabelConditionalJump(else_label));
                self.statements(then_body)?;
                self.emit(ProcInstruction::LabelJump(end_label));
                self.emit(ProcInstruction::Label(else_label));
                self.statements(else_body)?;
                self.emit(ProcInstruction::Label(end_label));
            }
            Statement::Loop(body) => {
                let start = self.new_label();
                let end = self.new_label();
                self.emit(ProcInstruction::Label(start));
                self.loops.push(LoopLabels { start, end });
                let result = self.statements(body);
                self.loops.pop();
                result?;
                self.emit(ProcInstruction::LabelJump(start));
                self.emit(ProcInstruction::Label(end));
            }
            Statement::Break => {
                let end = self.innermost_loop(stmt)?.end;
                self.emit(ProcInstruction::LabelJump(end));
            }
            Statement::Continue => {
                let start = self.innermost_loop(stmt)?.start;
                self.emit(ProcInstruction::LabelJump(start));
            }
            Statement::Debug(expr) => {
                self.expr(expr);
                self.emit(ProcInstruction::Debug);
            }
            Statement::Expr(expr) => self.expr(expr),
        }
        Ok(())
    }

    fn innermost_loop(&self, stmt: &Statement) -> Result<&LoopLabels, GenError> {
        self.loops.last().ok_or_else(|| GenError::Unsupported {
            message: "loop control outside of a loop".to_string(),
            node: format!("{:?}", stmt),
        })
    }

    fn expr(&mut self, expr: &ProcExpr) {
        match expr {
            ProcExpr::String(s) => self.emit(ProcInstruction::Push(Value::String(s.clone()))),
            ProcExpr::Number(n) => self.emit(ProcInstruction::Push(Value::Number(*n))),
            ProcExpr::Boolean(b) => self.emit(ProcInstruction::Push(Value::Boolean(*b))),
            ProcExpr::Variable(name) => self.emit(ProcInstruction::Load(name.clone())),
            ProcExpr::Unary { op, operand } => {
                self.expr(operand);
                self.emit(ProcInstruction::Unary(*op));
            }
            ProcExpr::Binary { op, lhs, rhs } => {
                self.expr(lhs);
                self.expr(rhs);
                self.emit(ProcInstruction::Binary(*op));
            }
        }
    }
}

/// Lower a script to process instructions with all jumps resolved.
pub fn generate_process(statements: &[Statement]) -> Result<Vec<ProcInstruction>, GenError> {
    let mut gen = ProcGen::new();
    gen.statements(statements)?;
    resolve_labels(gen.code)
}

/// Replace label pseudo-instructions with absolute jump targets.
pub fn resolve_labels(code: Vec<ProcInstruction>) -> Result<Vec<ProcInstruction>, GenError> {
    let mut positions: HashMap<usize, usize> = HashMap::new();
    let mut pc = 0;
    for inst in &code {
        match inst {
            ProcInstruction::Label(id) => {
                positions.insert(*id, pc);
            }
            _ => pc += 1,
        }
    }

    let lookup = |id: usize| {
        positions
            .get(&id)
            .copied()
            .ok_or_else(|| GenError::Unsupported {
                message: format!("jump to undefined label {}", id),
                node: "script".to_string(),
            })
    };

    let mut resolved = Vec::with_capacity(pc);
    for inst in code {
        match inst {
            ProcInstruction::Label(_) => {}
            ProcInstruction::LabelJump(id) => resolved.push(ProcInstruction::Jump(lookup(id)?)),
            ProcInstruction::LabelConditionalJump(id) => {
                resolved.push(ProcInstruction::ConditionalJump(lookup(id)?))
            }
            other => resolved.push(other),
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, UnaryOp};

    #[test]
    fn expression_is_postfix() {
        let code = generate_process(&[Statement::Return(ProcExpr::binary(
            BinaryOp::Add,
            ProcExpr::var("a"),
            ProcExpr::unary(UnaryOp::Head, ProcExpr::string("xyz")),
        ))])
        .unwrap();
        assert_eq!(
            code,
            vec![
                ProcInstruction::Load("a".to_string()),
                ProcInstruction::Push(Value::from("xyz")),
                ProcInstruction::Unary(UnaryOp::Head),
                ProcInstruction::Binary(BinaryOp::Add),
                ProcInstruction::Return,
            ]
        );
    }

    #[test]
    fn if_else_targets() {
        let code = generate_process(&[Statement::If {
            condition: ProcExpr::Boolean(true),
            then_body: vec![Statement::Return(ProcExpr::Number(1))],
            else_body: vec![Statement::Return(ProcExpr::Number(2))],
        }])
        .unwrap();
        assert_eq!(
            code,
            vec![
                ProcInstruction::Push(Value::Boolean(true)),
                ProcInstruction::ConditionalJump(5),
                ProcInstruction::Push(Value::Number(1)),
                ProcInstruction::Return,
                ProcInstruction::Jump(7),
                ProcInstruction::Push(Value::Number(2)),
                ProcInstruction::Return,
            ]
        );
    }

    #[test]
    fn loop_break_and_continue() {
        let code = generate_process(&[Statement::Loop(vec![
            Statement::If {
                condition: ProcExpr::var("done"),
                then_body: vec![Statement::Break],
                else_body: vec![Statement::Continue],
            },
        ])])
        .unwrap();
        // 0 load, 1 cjump else, 2 jump end(break), 3 jump endif,
        // 4 jump start(continue), 5 jump start(loop back)
        assert_eq!(code[1], ProcInstruction::ConditionalJump(4));
        assert_eq!(code[2], ProcInstruction::Jump(6));
        assert_eq!(code[3], ProcInstruction::Jump(5));
        assert_eq!(code[4], ProcInstruction::Jump(0));
        assert_eq!(code[5], ProcInstruction::Jump(0));
        assert!(code
            .iter()
            .all(|i| !matches!(i, ProcInstruction::Label(_) | ProcInstruction::LabelJump(_))));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let err = generate_process(&[Statement::Break]).unwrap_err();
        assert!(matches!(err, GenError::Unsupported { .. }));
    }

    #[test]
    fn undefined_label() {
        let err = resolve_labels(vec![ProcInstruction::LabelJump(9)]).unwrap_err();
        assert!(err.to_string().contains("undefined label 9"));
    }
}
