// error.rs - Error taxonomy for compiling and running vore programs.
//
// Compilation problems (GenError, SemanticError) abort a command before any
// matching happens. ExecError means the process interpreter hit a state the
// compiler should never produce. A pattern that simply does not match is not
// an error at all.

use thiserror::Error;

use crate::value::{Value, ValueMap};

/// Malformed or invalid AST encountered while generating bytecode.
#[derive(Debug, Error)]
pub enum GenError {
    /// A pattern referenced a name that is neither a capture nor a pattern.
    #[error("identifier '{name}' is not defined")]
    UndefinedIdentifier { name: String, node: String },

    /// A capture or subroutine name was declared twice in one scope.
    #[error("name clash: '{name}' is already declared in this scope")]
    NameClash { name: String, node: String },

    /// A construct that cannot be lowered in its position.
    #[error("cannot generate code for {node}: {message}")]
    Unsupported { message: String, node: String },

    /// A predicate or transform attached to a `set` failed type checking.
    #[error("in definition of '{name}': {source}")]
    Semantic {
        name: String,
        #[source]
        source: SemanticError,
    },
}

impl GenError {
    /// Debug rendering of the AST node that caused the error.
    pub fn node(&self) -> &str {
        match self {
            GenError::UndefinedIdentifier { node, .. }
            | GenError::NameClash { node, .. }
            | GenError::Unsupported { node, .. } => node,
            GenError::Semantic { source, .. } => &source.node,
        }
    }
}

/// Type-checking failure in a predicate or transform script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SemanticError {
    pub message: String,
    pub node: String,
}

impl SemanticError {
    pub(crate) fn new(message: impl Into<String>, node: &impl std::fmt::Debug) -> Self {
        SemanticError {
            message: message.into(),
            node: format!("{:?}", node),
        }
    }
}

/// Runtime fault inside the process interpreter.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (instruction {pc}, stack top {stack:?}, environment {environment:?})")]
pub struct ExecError {
    pub message: String,
    /// Index of the faulting instruction.
    pub pc: usize,
    /// Up to five values from the top of the stack, topmost first.
    pub stack: Vec<Value>,
    pub environment: ValueMap,
}

/// Top-level error returned by [`crate::engine::Vore`].
#[derive(Debug, Error)]
pub enum VoreError {
    #[error("code generation failed: {0}")]
    Gen(#[from] GenError),

    #[error("execution failed: {0}")]
    Exec(#[from] ExecError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_error_display() {
        let err = GenError::UndefinedIdentifier {
            name: "foo".to_string(),
            node: "Variable(\"foo\")".to_string(),
        };
        assert_eq!(err.to_string(), "identifier 'foo' is not defined");
        assert_eq!(err.node(), "Variable(\"foo\")");
    }

    #[test]
    fn semantic_error_keeps_node() {
        let err = SemanticError::new("Condition of an if statement must be a boolean", &42);
        assert_eq!(err.to_string(), "Condition of an if statement must be a boolean");
        assert_eq!(err.node, "42");
    }

    #[test]
    fn vore_error_from_gen() {
        let err: VoreError = GenError::Unsupported {
            message: "empty list".to_string(),
            node: "List".to_string(),
        }
        .into();
        assert!(matches!(err, VoreError::Gen(_)));
        assert!(err.to_string().starts_with("code generation failed"));
    }

    #[test]
    fn exec_error_reports_context() {
        let err = ExecError {
            message: "stack underflow".to_string(),
            pc: 3,
            stack: vec![],
            environment: ValueMap::new(),
        };
        let text = err.to_string();
        assert!(text.contains("stack underflow"));
        assert!(text.contains("instruction 3"));
    }

    #[test]
    fn vore_error_is_std_error() {
        let err: Box<dyn std::error::Error> =
            Box::new(VoreError::Io(std::io::Error::other("boom")));
        assert!(err.to_string().contains("boom"));
    }
}
