//! # Vore
//!
//! A declarative pattern language for searching and rewriting text, compiled
//! to bytecode and executed on a backtracking virtual machine.
//!
//! Patterns read like sentences (`at least 1 digit`, `'this' or 'that'`,
//! `not in 'a'-'c', 'x'-'z'`) and may capture named variables, define
//! recursive subroutines, filter matches with predicate scripts and build
//! replacements with transform scripts. Parsing the surface syntax is done
//! elsewhere; this crate starts from the AST.
//!
//! ## Quick Start
//!
//! ```rust
//! use vore::prelude::*;
//!
//! // find all at least 1 digit
//! let vore = Vore::compile(&[Command::find_all(vec![Expression::at_least(
//!     1,
//!     Literal::class(CharClass::Digit),
//! )])])
//! .unwrap();
//!
//! let matches = vore.run("please 1234567890 wow").unwrap();
//! assert_eq!(matches.len(), 1);
//! assert_eq!(matches[0].as_str(), "1234567890");
//! assert_eq!(matches[0].start(), 7);
//! ```
//!
//! Replacements use [`RunOptions`](engine::RunOptions) to decide what happens
//! to the searched files:
//!
//! ```rust
//! use vore::prelude::*;
//!
//! // replace all ('wow' = w) with '<' w '>'
//! let vore = Vore::compile(&[Command::replace(
//!     MatchWindow::all(),
//!     vec![Expression::capture("w", Literal::string("wow"))],
//!     vec![Atom::String("<".into()), Atom::Variable("w".into()), Atom::String(">".into())],
//! )])
//! .unwrap();
//!
//! let matches = vore.run_with("wow", &RunOptions::new().label("inline")).unwrap();
//! assert_eq!(matches[0].replacement.as_deref(), Some("<wow>"));
//! assert_eq!(matches[0].filename, "inline");
//! ```
//!
//! ## Module Structure
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ast`] | Commands, search expressions and scripts |
//! | [`compile`] | AST-to-bytecode compiler |
//! | [`procgen`] | Script code generation |
//! | [`semantic`] | Script type checking |
//! | [`bytecode`] | Instruction sets and compiled programs |
//! | [`search`] | Backtracking VM and match finding |
//! | [`interp`] | Script interpreter |
//! | [`replace`] | Replacement evaluation and splicing |
//! | [`engine`] | `Vore` facade and run options |
//! | [`files`] | Positional readers and writers |
//! | [`matches`] | Match records, text and JSON output |
//! | [`value`] | Runtime values |
//! | [`stack`] | Persistent stack backing VM state |
//! | [`error`] | Error types |

pub mod ast;
pub mod bytecode;
pub mod compile;
pub mod engine;
pub mod error;
pub mod files;
pub mod interp;
pub mod matches;
pub mod prelude;
pub mod procgen;
pub mod replace;
pub mod search;
pub mod semantic;
pub mod stack;
pub mod value;
