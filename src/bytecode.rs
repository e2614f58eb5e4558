// bytecode.rs - Instruction families produced by the compiler.
//
// Search instructions drive the backtracking VM, process instructions drive
// the script stack machine, replace instructions assemble replacement text.
// All program counters are absolute indices into the owning vector.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::ast::{BinaryOp, CharClass, MatchWindow, UnaryOp};
use crate::value::Value;

bitflags! {
    /// Modifiers on the matching instructions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MatchFlags: u8 {
        /// Succeed where the plain instruction would fail.
        const NOT = 1 << 0;
        /// ASCII case-insensitive comparison.
        const CASELESS = 1 << 1;
    }
}

impl MatchFlags {
    pub fn from_modifiers(not: bool, caseless: bool) -> Self {
        let mut flags = MatchFlags::empty();
        flags.set(MatchFlags::NOT, not);
        flags.set(MatchFlags::CASELESS, caseless);
        flags
    }
}

/// Candidate list of a Branch. Alternations rarely exceed a handful of arms.
pub type Candidates = SmallVec<[usize; 4]>;

// ============================================================================
// Search instructions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SearchInstruction {
    MatchLiteral {
        value: String,
        flags: MatchFlags,
    },
    MatchCharClass {
        class: CharClass,
        flags: MatchFlags,
    },
    MatchRange {
        from: String,
        to: String,
        flags: MatchFlags,
    },
    /// Backreference to a captured variable.
    MatchVariable {
        name: String,
    },
    CallSubroutine {
        id: usize,
        name: String,
        target: usize,
    },
    /// Try each candidate in order.
    Branch {
        candidates: Candidates,
    },
    StartNotIn {
        next_checkpoint: usize,
    },
    FailNotIn,
    EndNotIn {
        max_width: usize,
    },
    StartLoop {
        id: usize,
        name: Option<String>,
        min: usize,
        /// `None` is unbounded.
        max: Option<usize>,
        fewest: bool,
        /// PC of the matching StopLoop.
        exit: usize,
    },
    StopLoop {
        id: usize,
        start: usize,
    },
    StartVarDec {
        name: String,
    },
    EndVarDec {
        name: String,
    },
    StartSubroutine {
        id: usize,
        name: String,
        /// PC of the matching EndSubroutine.
        end: usize,
    },
    EndSubroutine {
        name: String,
        predicate: Vec<ProcInstruction>,
    },
    Jump {
        target: usize,
    },
}

impl SearchInstruction {
    /// Copy of this instruction with every program counter shifted by
    /// `delta`. Used when a precompiled pattern body is placed at a new
    /// address.
    pub fn relocated(&self, delta: usize) -> SearchInstruction {
        let mut inst = self.clone();
        match &mut inst {
            SearchInstruction::CallSubroutine { target, .. } => *target += delta,
            SearchInstruction::Branch { candidates } => {
                for c in candidates.iter_mut() {
                    *c += delta;
                }
            }
            SearchInstruction::StartNotIn { next_checkpoint } => *next_checkpoint += delta,
            SearchInstruction::StartLoop { exit, .. } => *exit += delta,
            SearchInstruction::StopLoop { start, .. } => *start += delta,
            SearchInstruction::StartSubroutine { end, .. } => *end += delta,
            SearchInstruction::Jump { target } => *target += delta,
            _ => {}
        }
        inst
    }
}

impl fmt::Display for SearchInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchInstruction::MatchLiteral { value, flags } => {
                write!(f, "MATCH '{}' {:?}", value, flags)
            }
            SearchInstruction::MatchCharClass { class, flags } => {
                write!(f, "CLASS {:?} {:?}", class, flags)
            }
            SearchInstruction::MatchRange { from, to, flags } => {
                write!(f, "RANGE '{}'..'{}' {:?}", from, to, flags)
            }
            SearchInstruction::MatchVariable { name } => write!(f, "MATCHVAR {}", name),
            SearchInstruction::CallSubroutine { id, name, target } => {
                write!(f, "CALL {} #{} -> {}", name, id, target)
            }
            SearchInstruction::Branch { candidates } => {
                write!(f, "BRANCH {:?}", candidates.as_slice())
            }
            SearchInstruction::StartNotIn { next_checkpoint } => {
                write!(f, "STARTNOTIN next {}", next_checkpoint)
            }
            SearchInstruction::FailNotIn => f.write_str("FAILNOTIN"),
            SearchInstruction::EndNotIn { max_width } => write!(f, "ENDNOTIN {}", max_width),
            SearchInstruction::StartLoop {
                id,
                name,
                min,
                max,
                fewest,
                exit,
            } => {
                write!(f, "STARTLOOP #{} {}..", id, min)?;
                if let Some(max) = max {
                    write!(f, "{}", max)?;
                }
                if *fewest {
                    f.write_str(" fewest")?;
                }
                if let Some(name) = name {
                    write!(f, " = {}", name)?;
                }
                write!(f, " exit {}", exit)
            }
            SearchInstruction::StopLoop { id, start } => {
                write!(f, "STOPLOOP #{} start {}", id, start)
            }
            SearchInstruction::StartVarDec { name } => write!(f, "STARTVAR {}", name),
            SearchInstruction::EndVarDec { name } => write!(f, "ENDVAR {}", name),
            SearchInstruction::StartSubroutine { id, name, end } => {
                write!(f, "STARTSUB {} #{} end {}", name, id, end)
            }
            SearchInstruction::EndSubroutine { name, predicate } => {
                write!(f, "ENDSUB {} ({} predicate ops)", name, predicate.len())
            }
            SearchInstruction::Jump { target } => write!(f, "JUMP {}", target),
        }
    }
}

// ============================================================================
// Process instructions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ProcInstruction {
    Push(Value),
    Load(String),
    Store(String),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Jump(usize),
    /// Pop; jump when the value is falsy.
    ConditionalJump(usize),
    /// Placeholders resolved into Jump/ConditionalJump before execution.
    Label(usize),
    LabelJump(usize),
    LabelConditionalJump(usize),
    /// Pop and log.
    Debug,
    Return,
}

// ============================================================================
// Replace instructions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceInstruction {
    String(String),
    Variable(String),
    Process {
        name: String,
        program: Vec<ProcInstruction>,
    },
}

// ============================================================================
// Compiled commands
// ============================================================================

/// A search program plus the window of matches it reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub window: MatchWindow,
    pub instructions: Vec<SearchInstruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, inst) in self.instructions.iter().enumerate() {
            writeln!(f, "{:4}: {}", pc, inst)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledCommand {
    Find(Program),
    Replace {
        program: Program,
        result: Vec<ReplaceInstruction>,
    },
    /// Definitions are consumed at compile time and produce no matches.
    Set { id: String },
}
