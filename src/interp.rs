// interp.rs - Stack machine for predicate and transform scripts.

use smallvec::SmallVec;
use tracing::info;

use crate::ast::{BinaryOp, UnaryOp};
use crate::bytecode::ProcInstruction;
use crate::error::ExecError;
use crate::value::{Value, ValueMap};

/// Values shown in an ExecError.
const STACK_CONTEXT: usize = 5;

struct Machine {
    stack: SmallVec<[Value; 8]>,
    environment: ValueMap,
    pc: usize,
}

/// Run `program` against `environment`.
///
/// The result is the operand of the first `Return`, or whatever is on top of
/// the stack when the program runs off its end. A script that leaves nothing
/// behind yields `true`, so an empty predicate accepts every match.
pub fn execute(program: &[ProcInstruction], environment: ValueMap) -> Result<Value, ExecError> {
    let mut m = Machine {
        stack: SmallVec::new(),
        environment,
        pc: 0,
    };

    while m.pc < program.len() {
        let mut next = m.pc + 1;
        match &program[m.pc] {
            ProcInstruction::Push(value) => m.stack.push(value.clone()),
            ProcInstruction::Load(name) => {
                // Unset names read as empty text, like an unmatched capture.
                let value = m
                    .environment
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new()));
                m.stack.push(value);
            }
            ProcInstruction::Store(name) => {
                let value = m.pop()?;
                m.environment.insert(name.clone(), value);
            }
            ProcInstruction::Unary(op) => {
                let operand = m.pop()?;
                let result = m.unary(*op, operand)?;
                m.stack.push(result);
            }
            ProcInstruction::Binary(op) => {
                let rhs = m.pop()?;
                let lhs = m.pop()?;
                let result = m.binary(*op, lhs, rhs)?;
                m.stack.push(result);
            }
            ProcInstruction::Jump(target) => next = *target,
            ProcInstruction::ConditionalJump(target) => {
                if !m.pop()?.is_truthy() {
                    next = *target;
                }
            }
            ProcInstruction::Debug => {
                let value = m.pop()?;
                info!(target: "vore::script", value = %value, "debug");
            }
            ProcInstruction::Return => return m.pop(),
            ProcInstruction::Label(_)
            | ProcInstruction::LabelJump(_)
            | ProcInstruction::LabelConditionalJump(_) => {
                return Err(m.fault("unresolved label in process program"));
            }
        }
        m.pc = next;
    }

    Ok(m.stack.pop().unwrap_or(Value::Boolean(true)))
}

impl Machine {
    fn fault(&self, message: impl Into<String>) -> ExecError {
        ExecError {
            message: message.into(),
            pc: self.pc,
            stack: self.stack.iter().rev().take(STACK_CONTEXT).cloned().collect(),
            environment: self.environment.clone(),
        }
    }

    fn pop(&mut self) -> Result<Value, ExecError> {
        self.stack
            .pop()
            .ok_or_else(|| self.fault("stack underflow"))
    }

    fn unary(&self, op: UnaryOp, operand: Value) -> Result<Value, ExecError> {
        match (op, operand) {
            (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
            (UnaryOp::Head, Value::String(s)) => {
                Ok(Value::String(s.chars().next().map(String::from).unwrap_or_default()))
            }
            (UnaryOp::Tail, Value::String(s)) => {
                let mut chars = s.chars();
                chars.next();
                Ok(Value::String(chars.as_str().to_string()))
            }
            (op, operand) => Err(self.fault(format!(
                "operator {:?} is not defined for {}",
                op,
                operand.type_name()
            ))),
        }
    }

    fn binary(&self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExecError> {
        use std::cmp::Ordering;

        if op.is_comparison() {
            let ordering = match (&lhs, &rhs) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                (Value::Number(a), Value::Number(b)) => a.cmp(b),
                (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
                _ => return Err(self.type_mismatch(op, &lhs, &rhs)),
            };
            let result = match op {
                BinaryOp::Less => ordering == Ordering::Less,
                BinaryOp::LessEqual => ordering != Ordering::Greater,
                BinaryOp::Greater => ordering == Ordering::Greater,
                BinaryOp::GreaterEqual => ordering != Ordering::Less,
                BinaryOp::Equal => ordering == Ordering::Equal,
                _ => ordering != Ordering::Equal,
            };
            return Ok(Value::Boolean(result));
        }

        match (op, &lhs, &rhs) {
            (BinaryOp::Add, Value::String(a), Value::String(b)) => {
                Ok(Value::String(format!("{}{}", a, b)))
            }
            (BinaryOp::Add, Value::String(a), Value::Number(n)) => {
                Ok(Value::String(format!("{}{}", a, n)))
            }
            (BinaryOp::And, Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(*a && *b)),
            (BinaryOp::Or, Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(*a || *b)),
            (_, Value::Number(a), Value::Number(b)) if op.is_arithmetic() => {
                let (a, b) = (*a, *b);
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Subtract => a.checked_sub(b),
                    BinaryOp::Multiply => a.checked_mul(b),
                    BinaryOp::Divide if b == 0 => return Err(self.fault("division by zero")),
                    BinaryOp::Divide => a.checked_div(b),
                    BinaryOp::Modulo if b == 0 => return Err(self.fault("modulo by zero")),
                    _ => a.checked_rem(b),
                };
                result
                    .map(Value::Number)
                    .ok_or_else(|| self.fault("integer overflow"))
            }
            _ => Err(self.type_mismatch(op, &lhs, &rhs)),
        }
    }

    fn type_mismatch(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> ExecError {
        self.fault(format!(
            "operator {:?} is not defined for {} and {}",
            op,
            lhs.type_name(),
            rhs.type_name()
        ))
    }
}
