// prelude.rs - Convenient re-exports for building and running patterns.
//
//! # Prelude
//!
//! ```
//! use vore::prelude::*;
//!
//! let vore = Vore::compile(&[Command::find_all(vec![Literal::string("42").into()])]).unwrap();
//! let matches = vore.run("answer: 42").unwrap();
//! assert_eq!(matches[0].start(), 8);
//! ```

pub use crate::ast::{
    Atom, BinaryOp, CharClass, Command, Expression, Listable, Literal, MatchWindow, ProcExpr,
    Statement, UnaryOp,
};
pub use crate::engine::{ReplaceMode, RunOptions, Vore};
pub use crate::error::{ExecError, GenError, SemanticError, VoreError};
pub use crate::matches::{Match, Matches};
pub use crate::value::{Value, ValueMap};
