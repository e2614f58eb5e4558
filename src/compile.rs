// compile.rs - Lower commands and search expressions to bytecode.
//
// Instructions are appended to one vector, so the next free PC is always its
// length. Forward targets (branch exits, loop exits, subroutine ends) are
// emitted as placeholders and patched once the body is in place.
//
// Named patterns (`set X to pattern`) are compiled once into a standalone
// subroutine block starting at PC 0. The first reference inside a command
// copies that block in, shifted to its new address; later references call it.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{
    Atom, CharClass, Command, Expression, Listable, Literal, LoopExpr, SetBody, Statement,
};
use crate::bytecode::{
    Candidates, CompiledCommand, MatchFlags, ProcInstruction, Program, ReplaceInstruction,
    SearchInstruction,
};
use crate::error::GenError;
use crate::procgen::generate_process;
use crate::semantic::{self, ScriptContext};

/// Placeholder for a forward address that is patched later.
const UNRESOLVED: usize = usize::MAX;

/// A `set X to pattern` definition ready to be placed into a command.
#[derive(Debug, Clone)]
struct NamedPattern {
    /// StartSubroutine .. EndSubroutine, addressed from 0.
    block: Vec<SearchInstruction>,
}

/// State that lives across all commands of one compilation.
#[derive(Debug, Default)]
pub struct CompilerContext {
    next_subroutine_id: usize,
    next_loop_id: usize,
    patterns: HashMap<String, NamedPattern>,
    transforms: HashMap<String, Vec<ProcInstruction>>,
}

/// What a name means inside the command being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Capture,
    Subroutine { id: usize, start: usize },
}

type Scope = HashMap<String, Binding>;

/// Code buffer for one command (or one named pattern body).
struct CodeGen<'a> {
    ctx: &'a mut CompilerContext,
    code: Vec<SearchInstruction>,
    scope: Scope,
}

impl CompilerContext {
    pub fn new() -> Self {
        CompilerContext::default()
    }

    fn subroutine_id(&mut self) -> usize {
        let id = self.next_subroutine_id;
        self.next_subroutine_id += 1;
        id
    }

    fn loop_id(&mut self) -> usize {
        let id = self.next_loop_id;
        self.next_loop_id += 1;
        id
    }

    pub fn has_pattern(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    /// Compile every command in order. Definitions made by `set` are visible
    /// to the commands after them.
    pub fn compile(&mut self, commands: &[Command]) -> Result<Vec<CompiledCommand>, GenError> {
        commands.iter().map(|c| self.compile_command(c)).collect()
    }

    pub fn compile_command(&mut self, command: &Command) -> Result<CompiledCommand, GenError> {
        match command {
            Command::Find(find) => {
                let instructions = compile_search(self, &find.body)?;
                debug!(instructions = instructions.len(), "compiled find command");
                Ok(CompiledCommand::Find(Program {
                    window: find.window,
                    instructions,
                }))
            }
            Command::Replace(replace) => {
                let instructions = compile_search(self, &replace.body)?;
                let result = replace
                    .result
                    .iter()
                    .map(|atom| self.compile_atom(atom))
                    .collect::<Result<Vec<_>, _>>()?;
                debug!(
                    instructions = instructions.len(),
                    replace_ops = result.len(),
                    "compiled replace command"
                );
                Ok(CompiledCommand::Replace {
                    program: Program {
                        window: replace.window,
                        instructions,
                    },
                    result,
                })
            }
            Command::Set(set) => {
                match &set.body {
                    SetBody::Pattern { body, predicate } => {
                        self.define_pattern(&set.id, body, predicate)?
                    }
                    SetBody::Transform(statements) => self.define_transform(&set.id, statements)?,
                    SetBody::Matches(inner) => {
                        self.compile_command(inner)?;
                    }
                }
                Ok(CompiledCommand::Set { id: set.id.clone() })
            }
        }
    }

    fn compile_atom(&self, atom: &Atom) -> Result<ReplaceInstruction, GenError> {
        Ok(match atom {
            Atom::String(s) => ReplaceInstruction::String(s.clone()),
            Atom::Variable(name) => match self.transforms.get(name) {
                Some(program) => ReplaceInstruction::Process {
                    name: name.clone(),
                    program: program.clone(),
                },
                None => ReplaceInstruction::Variable(name.clone()),
            },
        })
    }

    fn define_pattern(
        &mut self,
        name: &str,
        body: &[Expression],
        predicate: &[Statement],
    ) -> Result<(), GenError> {
        semantic::check(predicate, ScriptContext::Predicate, semantic::predicate_env()).map_err(
            |source| GenError::Semantic {
                name: name.to_string(),
                source,
            },
        )?;
        let predicate = generate_process(predicate)?;

        let id = self.subroutine_id();
        let mut cg = CodeGen::new(self);
        // The body may refer to the pattern itself.
        cg.scope
            .insert(name.to_string(), Binding::Subroutine { id, start: 0 });
        cg.emit(SearchInstruction::StartSubroutine {
            id,
            name: name.to_string(),
            end: UNRESOLVED,
        });
        compile_expressions(&mut cg, body)?;
        let end = cg.emit(SearchInstruction::EndSubroutine {
            name: name.to_string(),
            predicate,
        });
        cg.patch(0, end);
        let block = cg.code;

        debug!(name, instructions = block.len(), "defined pattern");
        self.patterns.insert(name.to_string(), NamedPattern { block });
        Ok(())
    }

    fn define_transform(&mut self, name: &str, statements: &[Statement]) -> Result<(), GenError> {
        semantic::check(statements, ScriptContext::Transform, semantic::transform_env()).map_err(
            |source| GenError::Semantic {
                name: name.to_string(),
                source,
            },
        )?;
        let program = generate_process(statements)?;
        debug!(name, instructions = program.len(), "defined transform");
        self.transforms.insert(name.to_string(), program);
        Ok(())
    }
}

impl<'a> CodeGen<'a> {
    fn new(ctx: &'a mut CompilerContext) -> Self {
        CodeGen {
            ctx,
            code: Vec::new(),
            scope: Scope::new(),
        }
    }

    /// PC the next emitted instruction will occupy.
    fn offset(&self) -> usize {
        self.code.len()
    }

    fn emit(&mut self, inst: SearchInstruction) -> usize {
        self.code.push(inst);
        self.code.len() - 1
    }

    /// Fill in the forward address of the placeholder at `at`.
    fn patch(&mut self, at: usize, address: usize) {
        match &mut self.code[at] {
            SearchInstruction::Jump { target } => *target = address,
            SearchInstruction::StartLoop { exit, .. } => *exit = address,
            SearchInstruction::StartSubroutine { end, .. } => *end = address,
            SearchInstruction::StartNotIn { next_checkpoint } => *next_checkpoint = address,
            other => debug_assert!(false, "cannot patch {}", other),
        }
    }

    fn declare(
        &mut self,
        name: &str,
        binding: Binding,
        node: &impl std::fmt::Debug,
    ) -> Result<(), GenError> {
        if self.scope.contains_key(name) {
            return Err(GenError::NameClash {
                name: name.to_string(),
                node: format!("{:?}", node),
            });
        }
        self.scope.insert(name.to_string(), binding);
        Ok(())
    }
}

fn compile_search(
    ctx: &mut CompilerContext,
    body: &[Expression],
) -> Result<Vec<SearchInstruction>, GenError> {
    let mut cg = CodeGen::new(ctx);
    compile_expressions(&mut cg, body)?;
    Ok(cg.code)
}

// ============================================================================
// Expressions
// ============================================================================

fn compile_expressions(cg: &mut CodeGen<'_>, exprs: &[Expression]) -> Result<(), GenError> {
    for expr in exprs {
        compile_expression(cg, expr)?;
    }
    Ok(())
}

fn compile_expression(cg: &mut CodeGen<'_>, expr: &Expression) -> Result<(), GenError> {
    match expr {
        Expression::Loop(l) => compile_loop(cg, l, expr),
        Expression::Branch { .. } => compile_branch(cg, expr),
        Expression::Dec { name, body } => {
            cg.declare(name, Binding::Capture, expr)?;
            cg.emit(SearchInstruction::StartVarDec { name: name.clone() });
            compile_literal(cg, body)?;
            cg.emit(SearchInstruction::EndVarDec { name: name.clone() });
            Ok(())
        }
        Expression::Sub { name, body } => {
            let id = cg.ctx.subroutine_id();
            let start = cg.offset();
            cg.declare(name, Binding::Subroutine { id, start }, expr)?;
            cg.emit(SearchInstruction::StartSubroutine {
                id,
                name: name.clone(),
                end: UNRESOLVED,
            });
            compile_expressions(cg, body)?;
            let end = cg.emit(SearchInstruction::EndSubroutine {
                name: name.clone(),
                predicate: Vec::new(),
            });
            cg.patch(start, end);
            Ok(())
        }
        Expression::List { not, contents } => {
            if contents.is_empty() {
                return Err(GenError::Unsupported {
                    message: "list has no members".to_string(),
                    node: format!("{:?}", expr),
                });
            }
            if *not {
                compile_not_in(cg, contents);
            } else {
                compile_in(cg, contents);
            }
            Ok(())
        }
        Expression::Primary(literal) => compile_literal(cg, literal),
    }
}

fn compile_literal(cg: &mut CodeGen<'_>, literal: &Literal) -> Result<(), GenError> {
    match literal {
        Literal::String {
            value,
            not,
            caseless,
        } => {
            cg.emit(SearchInstruction::MatchLiteral {
                value: value.clone(),
                flags: MatchFlags::from_modifiers(*not, *caseless),
            });
        }
        Literal::Range { from, to, not } => {
            cg.emit(SearchInstruction::MatchRange {
                from: from.clone(),
                to: to.clone(),
                flags: MatchFlags::from_modifiers(*not, false),
            });
        }
        Literal::CharClass { class, not } => {
            cg.emit(SearchInstruction::MatchCharClass {
                class: *class,
                flags: MatchFlags::from_modifiers(*not, false),
            });
        }
        Literal::Variable(name) => compile_reference(cg, name, literal)?,
        Literal::SubExpr(body) => compile_expressions(cg, body)?,
    }
    Ok(())
}

/// A bare name in a pattern: backreference, call, or first use of a named
/// pattern.
fn compile_reference(cg: &mut CodeGen<'_>, name: &str, node: &Literal) -> Result<(), GenError> {
    match cg.scope.get(name).copied() {
        Some(Binding::Capture) => {
            cg.emit(SearchInstruction::MatchVariable {
                name: name.to_string(),
            });
        }
        Some(Binding::Subroutine { id, start }) => {
            cg.emit(SearchInstruction::CallSubroutine {
                id,
                name: name.to_string(),
                target: start,
            });
        }
        None => {
            let pattern = cg.ctx.patterns.get(name).cloned().ok_or_else(|| {
                GenError::UndefinedIdentifier {
                    name: name.to_string(),
                    node: format!("{:?}", node),
                }
            })?;
            let start = cg.offset();
            let id = match pattern.block.first() {
                Some(SearchInstruction::StartSubroutine { id, .. }) => *id,
                _ => {
                    return Err(GenError::Unsupported {
                        message: format!("pattern '{}' has no subroutine header", name),
                        node: format!("{:?}", node),
                    })
                }
            };
            cg.scope
                .insert(name.to_string(), Binding::Subroutine { id, start });
            cg.code
                .extend(pattern.block.iter().map(|inst| inst.relocated(start)));
        }
    }
    Ok(())
}

// ============================================================================
// Repetition
// ============================================================================

fn compile_loop(cg: &mut CodeGen<'_>, l: &LoopExpr, node: &Expression) -> Result<(), GenError> {
    if let Some(max) = l.max {
        if max < l.min {
            return Err(GenError::Unsupported {
                message: format!("maximum {} is below minimum {}", max, l.min),
                node: format!("{:?}", node),
            });
        }
    }

    // Every copy of the body declares the same names; each copy starts from
    // the scope as it was before the first one.
    let outer_scope = cg.scope.clone();
    let mut copies = 0;
    let mut body_copy = |cg: &mut CodeGen<'_>| -> Result<(), GenError> {
        if copies > 0 {
            cg.scope = outer_scope.clone();
        }
        copies += 1;
        compile_literal(cg, &l.body)
    };

    let (min, max) = if l.name.is_none() {
        for _ in 0..l.min {
            body_copy(cg)?;
        }
        (0, l.max.map(|max| max - l.min))
    } else {
        (l.min, l.max)
    };

    if max == Some(0) {
        return Ok(());
    }

    let id = cg.ctx.loop_id();
    let start = cg.emit(SearchInstruction::StartLoop {
        id,
        name: l.name.clone(),
        min,
        max,
        fewest: l.fewest,
        exit: UNRESOLVED,
    });
    body_copy(cg)?;
    let stop = cg.emit(SearchInstruction::StopLoop { id, start });
    cg.patch(start, stop);
    Ok(())
}

// ============================================================================
// Alternation and lists
// ============================================================================

/// `a or b or c` nests to the right; flatten it into one Branch.
fn compile_branch(cg: &mut CodeGen<'_>, expr: &Expression) -> Result<(), GenError> {
    let mut arms: Vec<Arm<'_>> = Vec::new();
    let mut rest = expr;
    while let Expression::Branch { left, right } = rest {
        arms.push(Arm::Literal(left));
        rest = right.as_ref();
    }
    arms.push(Arm::Expression(rest));

    let branch = cg.emit(SearchInstruction::Branch {
        candidates: Candidates::new(),
    });
    let mut candidates = Candidates::new();
    let mut exits = Vec::with_capacity(arms.len());
    for arm in arms {
        candidates.push(cg.offset());
        match arm {
            Arm::Literal(lit) => compile_literal(cg, lit)?,
            Arm::Expression(e) => compile_expression(cg, e)?,
        }
        exits.push(cg.emit(SearchInstruction::Jump { target: UNRESOLVED }));
    }
    let end = cg.offset();
    for exit in exits {
        cg.patch(exit, end);
    }
    cg.code[branch] = SearchInstruction::Branch { candidates };
    Ok(())
}

enum Arm<'e> {
    Literal(&'e Literal),
    Expression(&'e Expression),
}

fn compile_in(cg: &mut CodeGen<'_>, contents: &[Listable]) {
    let branch = cg.emit(SearchInstruction::Branch {
        candidates: Candidates::new(),
    });
    let mut candidates = Candidates::new();
    let mut exits = Vec::with_capacity(contents.len());
    for member in contents {
        candidates.push(cg.offset());
        cg.emit(listable_instruction(member));
        exits.push(cg.emit(SearchInstruction::Jump { target: UNRESOLVED }));
    }
    let end = cg.offset();
    for exit in exits {
        cg.patch(exit, end);
    }
    cg.code[branch] = SearchInstruction::Branch { candidates };
}

/// Each member runs under a checkpoint that resumes at the next member; a
/// member that matches hits FailNotIn, which discards that checkpoint and
/// fails the whole list. Surviving every member reaches EndNotIn.
fn compile_not_in(cg: &mut CodeGen<'_>, contents: &[Listable]) {
    for member in contents {
        let start = cg.emit(SearchInstruction::StartNotIn {
            next_checkpoint: UNRESOLVED,
        });
        cg.emit(listable_instruction(member));
        cg.emit(SearchInstruction::FailNotIn);
        let next = cg.offset();
        cg.patch(start, next);
    }
    let max_width = contents.iter().map(listable_width).max().unwrap_or(0);
    cg.emit(SearchInstruction::EndNotIn { max_width });
}

fn listable_instruction(member: &Listable) -> SearchInstruction {
    match member {
        Listable::String { value, caseless } => SearchInstruction::MatchLiteral {
            value: value.clone(),
            flags: MatchFlags::from_modifiers(false, *caseless),
        },
        Listable::Range { from, to } => SearchInstruction::MatchRange {
            from: from.clone(),
            to: to.clone(),
            flags: MatchFlags::empty(),
        },
        Listable::CharClass(class) => SearchInstruction::MatchCharClass {
            class: *class,
            flags: MatchFlags::empty(),
        },
    }
}

/// Widest input a list member can cover, in bytes.
fn listable_width(member: &Listable) -> usize {
    match member {
        Listable::String { value, .. } => value.len(),
        Listable::Range { from, to } => from.len().max(to.len()),
        Listable::CharClass(class) => class_width(*class),
    }
}

fn class_width(class: CharClass) -> usize {
    match class {
        CharClass::Any
        | CharClass::Whitespace
        | CharClass::Digit
        | CharClass::Upper
        | CharClass::Lower
        | CharClass::Letter => 1,
        // Anchors are zero width; whole-* classes have no fixed width.
        CharClass::FileStart
        | CharClass::FileEnd
        | CharClass::LineStart
        | CharClass::LineEnd
        | CharClass::WordStart
        | CharClass::WordEnd
        | CharClass::WholeFile
        | CharClass::WholeLine
        | CharClass::WholeWord => 0,
    }
}
