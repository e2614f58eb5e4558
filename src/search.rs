// search.rs - Backtracking VM for search programs.
//
// A trial starts at one input offset with a fresh SearchEngineState and
// executes instructions until the PC runs off the end of the program
// (success) or no checkpoint is left to return to (failure). A checkpoint
// is a clone of the whole state; the loop, call and capture stacks are
// persistent lists, so cloning is cheap.
//
// Matched text is not accumulated: matching only ever moves forward from
// the trial start, so it is always the input between the start and current
// offsets and is read back from the reader when needed.

use std::collections::VecDeque;

use tracing::trace;

use crate::ast::{CharClass, MatchWindow};
use crate::bytecode::{MatchFlags, ProcInstruction, SearchInstruction};
use crate::error::{ExecError, VoreError};
use crate::files::Reader;
use crate::interp;
use crate::matches::Match;
use crate::stack::PStack;
use crate::value::{Value, ValueMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    InProcess,
    Success,
    Failed,
}

/// Input position. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    offset: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn start() -> Self {
        Cursor {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Move past `bytes`, counting newlines and characters.
    fn advance(&mut self, bytes: &[u8]) {
        self.offset += bytes.len();
        match memchr::memrchr(b'\n', bytes) {
            Some(last) => {
                self.line += memchr::memchr_iter(b'\n', bytes).count();
                self.column = 1 + char_count(&bytes[last + 1..]);
            }
            None => self.column += char_count(bytes),
        }
    }
}

/// UTF-8 continuation bytes do not start a character.
fn char_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| (b & 0xC0) != 0x80).count()
}

#[derive(Debug, Clone)]
struct LoopState {
    id: usize,
    name: Option<String>,
    /// Call-stack depth when the loop was entered.
    call_depth: usize,
    /// Completed iterations.
    iteration: usize,
    /// Input offset when the current iteration began.
    entry_offset: usize,
    /// Named loops: iteration index -> captures of that iteration.
    variables: ValueMap,
}

#[derive(Debug, Clone)]
struct VariableRecord {
    name: String,
    start_offset: usize,
}

#[derive(Debug, Clone)]
struct CallState {
    id: usize,
    return_pc: usize,
    start_offset: usize,
}

/// Complete execution context of one trial.
#[derive(Debug, Clone)]
struct SearchEngineState {
    status: Status,
    pc: usize,
    start: Cursor,
    current: Cursor,
    loop_stack: PStack<LoopState>,
    capture_stack: PStack<VariableRecord>,
    call_stack: PStack<CallState>,
    environment: ValueMap,
}

impl SearchEngineState {
    fn new(start: Cursor) -> Self {
        SearchEngineState {
            status: Status::InProcess,
            pc: 0,
            start,
            current: start,
            loop_stack: PStack::new(),
            capture_stack: PStack::new(),
            call_stack: PStack::new(),
            environment: ValueMap::new(),
        }
    }

    /// Length of the text matched so far.
    fn match_len(&self) -> usize {
        self.current.offset - self.start.offset
    }

    /// Bind a captured value in the innermost named loop's current
    /// iteration, or in the top-level environment outside named loops.
    fn insert_variable(&mut self, name: &str, value: Value) {
        if !self.loop_stack.iter().any(|l| l.name.is_some()) {
            self.environment.insert(name, value);
            return;
        }
        self.loop_stack.update_first(
            |l| l.name.is_some(),
            |l| {
                let key = l.iteration.to_string();
                match l.variables.get_mut(&key) {
                    Some(Value::Map(scope)) => scope.insert(name, value),
                    _ => {
                        let mut scope = ValueMap::new();
                        scope.insert(name, value);
                        l.variables.insert(key, scope);
                    }
                }
            },
        );
    }

    /// Look a variable up the way `insert_variable` stores it.
    fn lookup_variable(&self, name: &str) -> Option<&Value> {
        let scoped = self
            .loop_stack
            .iter()
            .find(|l| l.name.is_some())
            .and_then(|l| l.variables.get(&l.iteration.to_string()))
            .and_then(Value::as_map)
            .and_then(|scope| scope.get(name));
        scoped.or_else(|| self.environment.get(name))
    }

    /// Start the loop body for the current iteration.
    fn enter_loop_body(&mut self) {
        if let Some(l) = self.loop_stack.peek_mut() {
            if l.name.is_some() {
                let key = l.iteration.to_string();
                l.variables.insert(key, ValueMap::new());
            }
        }
        self.pc += 1;
    }

    /// Leave the loop whose StopLoop sits at `exit`.
    fn exit_loop(&mut self, exit: usize) {
        if let Some(l) = self.loop_stack.pop() {
            if let Some(name) = &l.name {
                self.insert_variable(name, Value::Map(l.variables.clone()));
            }
        }
        self.pc = exit + 1;
    }
}

// ============================================================================
// Trial execution
// ============================================================================

struct Trial<'a> {
    program: &'a [SearchInstruction],
    reader: &'a mut dyn Reader,
    state: SearchEngineState,
    backtrack: Vec<SearchEngineState>,
}

impl<'a> Trial<'a> {
    fn new(program: &'a [SearchInstruction], reader: &'a mut dyn Reader, start: Cursor) -> Self {
        Trial {
            program,
            reader,
            state: SearchEngineState::new(start),
            backtrack: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<Status, VoreError> {
        while self.state.status == Status::InProcess {
            if self.state.pc >= self.program.len() {
                self.state.status = Status::Success;
                break;
            }
            self.step()?;
        }
        Ok(self.state.status)
    }

    // ---- State primitives ----

    fn next(&mut self) {
        self.state.pc += 1;
    }

    fn checkpoint(&mut self) {
        self.backtrack.push(self.state.clone());
    }

    fn backtrack(&mut self) {
        match self.backtrack.pop() {
            Some(saved) => self.state = saved,
            None => self.state.status = Status::Failed,
        }
    }

    fn read(&mut self, length: usize) -> Result<Vec<u8>, VoreError> {
        Ok(self.reader.read_at(self.state.current.offset, length)?)
    }

    fn byte_at(&mut self, offset: usize) -> Result<Option<u8>, VoreError> {
        Ok(self.reader.read_at(offset, 1)?.first().copied())
    }

    fn current_byte(&mut self) -> Result<Option<u8>, VoreError> {
        self.byte_at(self.state.current.offset)
    }

    fn previous_byte(&mut self) -> Result<Option<u8>, VoreError> {
        match self.state.current.offset {
            0 => Ok(None),
            offset => self.byte_at(offset - 1),
        }
    }

    /// Consume up to `length` bytes; returns how many were consumed.
    fn consume(&mut self, length: usize) -> Result<usize, VoreError> {
        let bytes = self.read(length)?;
        self.state.current.advance(&bytes);
        Ok(bytes.len())
    }

    fn at_end(&self) -> bool {
        self.state.current.offset >= self.reader.size()
    }

    fn at_line_end(&mut self) -> Result<bool, VoreError> {
        if self.at_end() {
            return Ok(true);
        }
        let next = self.read(2)?;
        Ok(next.first() == Some(&b'\n') || next.as_slice() == b"\r\n")
    }

    /// Zero-width assertion.
    fn assert(&mut self, holds: bool, flags: MatchFlags) {
        if holds != flags.contains(MatchFlags::NOT) {
            self.next();
        } else {
            self.backtrack();
        }
    }

    fn fault(&self, message: &str) -> VoreError {
        VoreError::Exec(ExecError {
            message: message.to_string(),
            pc: self.state.pc,
            stack: Vec::new(),
            environment: self.state.environment.clone(),
        })
    }

    // ---- Instruction dispatch ----

    fn step(&mut self) -> Result<(), VoreError> {
        let program = self.program;
        let pc = self.state.pc;
        match &program[pc] {
            SearchInstruction::MatchLiteral { value, flags } => {
                self.match_literal(value.as_bytes(), *flags)?
            }
            SearchInstruction::MatchCharClass { class, flags } => {
                self.match_class(*class, *flags)?
            }
            SearchInstruction::MatchRange { from, to, flags } => {
                self.match_range(from.as_bytes(), to.as_bytes(), *flags)?
            }
            SearchInstruction::MatchVariable { name } => {
                let text = match self.state.lookup_variable(name) {
                    Some(Value::Map(_)) | None => None,
                    Some(value) => Some(value.to_string()),
                };
                match text {
                    Some(text) => self.match_literal(text.as_bytes(), MatchFlags::empty())?,
                    None => self.backtrack(),
                }
            }
            SearchInstruction::CallSubroutine { id, target, .. } => {
                let call = CallState {
                    id: *id,
                    return_pc: pc + 1,
                    start_offset: self.state.current.offset,
                };
                self.state.call_stack.push(call);
                self.state.pc = *target;
            }
            SearchInstruction::Branch { candidates } => match candidates.split_first() {
                Some((first, rest)) => {
                    for &candidate in rest.iter().rev() {
                        self.state.pc = candidate;
                        self.checkpoint();
                    }
                    self.state.pc = *first;
                }
                None => self.backtrack(),
            },
            SearchInstruction::StartNotIn { next_checkpoint } => {
                self.state.pc = *next_checkpoint;
                self.checkpoint();
                self.state.pc = pc + 1;
            }
            SearchInstruction::FailNotIn => {
                // Drop the resume-at-next-member checkpoint, then fail.
                self.backtrack();
                if self.state.status == Status::InProcess {
                    self.backtrack();
                }
            }
            SearchInstruction::EndNotIn { max_width } => {
                if self.consume(*max_width)? == 0 {
                    self.backtrack();
                } else {
                    self.next();
                }
            }
            SearchInstruction::StartLoop {
                id,
                min,
                max,
                fewest,
                exit,
                name,
            } => self.start_loop(*id, name, *min, *max, *fewest, *exit),
            SearchInstruction::StopLoop { start, .. } => self.state.pc = *start,
            SearchInstruction::StartVarDec { name } => {
                let record = VariableRecord {
                    name: name.clone(),
                    start_offset: self.state.current.offset,
                };
                self.state.capture_stack.push(record);
                self.next();
            }
            SearchInstruction::EndVarDec { name } => {
                let record = match self.state.capture_stack.pop() {
                    Some(record) if record.name == *name => record,
                    _ => return Err(self.fault("capture end without matching start")),
                };
                let len = self.state.current.offset - record.start_offset;
                let bytes = self.reader.read_at(record.start_offset, len)?;
                let value = String::from_utf8_lossy(&bytes).into_owned();
                self.state.insert_variable(name, Value::String(value));
                self.next();
            }
            SearchInstruction::StartSubroutine { id, end, .. } => {
                let active = self.state.call_stack.peek().map(|c| c.id);
                if active != Some(*id) {
                    let call = CallState {
                        id: *id,
                        return_pc: end + 1,
                        start_offset: self.state.current.offset,
                    };
                    self.state.call_stack.push(call);
                }
                self.next();
            }
            SearchInstruction::EndSubroutine { predicate, .. } => {
                self.end_subroutine(predicate)?
            }
            SearchInstruction::Jump { target } => self.state.pc = *target,
        }
        Ok(())
    }

    fn match_literal(&mut self, value: &[u8], flags: MatchFlags) -> Result<(), VoreError> {
        let found = self.read(value.len())?;
        if found.len() != value.len() {
            self.backtrack();
            return Ok(());
        }
        let equal = if flags.contains(MatchFlags::CASELESS) {
            found.eq_ignore_ascii_case(value)
        } else {
            found == value
        };
        if equal != flags.contains(MatchFlags::NOT) {
            self.state.current.advance(&found);
            self.next();
        } else {
            self.backtrack();
        }
        Ok(())
    }

    /// Try the longest candidate length first, down to the shortest.
    fn match_range(&mut self, from: &[u8], to: &[u8], flags: MatchFlags) -> Result<(), VoreError> {
        let not = flags.contains(MatchFlags::NOT);
        for len in (from.len()..=to.len()).rev() {
            let found = self.read(len)?;
            if found.len() != len {
                continue;
            }
            let inside = from <= found.as_slice() && found.as_slice() <= to;
            if inside != not {
                self.state.current.advance(&found);
                self.next();
                return Ok(());
            }
        }
        self.backtrack();
        Ok(())
    }

    /// Single-byte class test.
    fn match_byte(&mut self, flags: MatchFlags, test: fn(u8) -> bool) -> Result<(), VoreError> {
        match self.current_byte()? {
            Some(b) if test(b) != flags.contains(MatchFlags::NOT) => {
                self.state.current.advance(&[b]);
                self.next();
            }
            _ => self.backtrack(),
        }
        Ok(())
    }

    fn match_class(&mut self, class: CharClass, flags: MatchFlags) -> Result<(), VoreError> {
        let not = flags.contains(MatchFlags::NOT);
        match class {
            CharClass::Any => {
                if not {
                    self.backtrack();
                } else {
                    self.match_byte(flags, |_| true)?;
                }
            }
            CharClass::Whitespace => {
                self.match_byte(flags, |b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))?
            }
            CharClass::Digit => self.match_byte(flags, |b| b.is_ascii_digit())?,
            CharClass::Upper => self.match_byte(flags, |b| b.is_ascii_uppercase())?,
            CharClass::Lower => self.match_byte(flags, |b| b.is_ascii_lowercase())?,
            CharClass::Letter => self.match_byte(flags, |b| b.is_ascii_alphabetic())?,
            CharClass::FileStart => {
                let holds = self.state.current.offset == 0;
                self.assert(holds, flags);
            }
            CharClass::FileEnd => {
                let holds = self.at_end();
                self.assert(holds, flags);
            }
            CharClass::LineStart => {
                let holds = self.at_line_start()?;
                self.assert(holds, flags);
            }
            CharClass::LineEnd => {
                let holds = self.at_line_end()?;
                self.assert(holds, flags);
            }
            CharClass::WordStart => {
                let holds = self.at_word_start()?;
                self.assert(holds, flags);
            }
            CharClass::WordEnd => {
                let prev = self.previous_byte()?;
                let cur = self.current_byte()?;
                let holds = prev.is_some_and(is_word_byte) && !cur.is_some_and(is_word_byte);
                self.assert(holds, flags);
            }
            CharClass::WholeFile => {
                if self.state.current.offset != 0 || not {
                    // `not whole file` is a zero-width test for "not at the start".
                    let holds = self.state.current.offset == 0;
                    self.assert(holds, flags);
                } else {
                    let size = self.reader.size();
                    self.consume(size)?;
                    self.next();
                }
            }
            CharClass::WholeLine => {
                let holds = self.at_line_start()? && !self.at_end();
                if !holds || not {
                    self.assert(holds, flags);
                } else {
                    // Always takes the first byte, so an empty line runs on
                    // into the next one.
                    self.consume(1)?;
                    while !self.at_line_end()? {
                        self.consume(1)?;
                    }
                    self.next();
                }
            }
            CharClass::WholeWord => {
                let holds = self.at_word_start()?;
                if !holds || not {
                    self.assert(holds, flags);
                } else {
                    while self.current_byte()?.is_some_and(is_word_byte) {
                        self.consume(1)?;
                    }
                    self.next();
                }
            }
        }
        Ok(())
    }

    fn at_line_start(&mut self) -> Result<bool, VoreError> {
        Ok(match self.previous_byte()? {
            None => true,
            Some(b) => b == b'\n',
        })
    }

    fn at_word_start(&mut self) -> Result<bool, VoreError> {
        let prev = self.previous_byte()?;
        let cur = self.current_byte()?;
        Ok(cur.is_some_and(is_word_byte) && !prev.is_some_and(is_word_byte))
    }

    fn start_loop(
        &mut self,
        id: usize,
        name: &Option<String>,
        min: usize,
        max: Option<usize>,
        fewest: bool,
        exit: usize,
    ) {
        let depth = self.state.call_stack.len();
        let offset = self.state.current.offset;
        let resumed = matches!(
            self.state.loop_stack.peek(),
            Some(top) if top.id == id && top.call_depth == depth
        );

        if resumed {
            let Some(top) = self.state.loop_stack.peek_mut() else {
                return;
            };
            // An iteration that consumed nothing would repeat forever.
            if top.entry_offset == offset {
                self.backtrack();
                return;
            }
            top.iteration += 1;
            top.entry_offset = offset;
        } else {
            self.state.loop_stack.push(LoopState {
                id,
                name: name.clone(),
                call_depth: depth,
                iteration: 0,
                entry_offset: offset,
                variables: ValueMap::new(),
            });
        }

        let iteration = self
            .state
            .loop_stack
            .peek()
            .map(|l| l.iteration)
            .unwrap_or(0);

        if iteration < min {
            self.state.enter_loop_body();
        } else if max.map_or(true, |max| iteration < max) {
            if fewest {
                let mut more = self.state.clone();
                more.enter_loop_body();
                self.backtrack.push(more);
                self.state.exit_loop(exit);
            } else {
                let mut done = self.state.clone();
                done.exit_loop(exit);
                self.backtrack.push(done);
                self.state.enter_loop_body();
            }
        } else if max == Some(iteration) {
            self.state.exit_loop(exit);
        } else {
            self.backtrack();
        }
    }

    fn end_subroutine(&mut self, predicate: &[ProcInstruction]) -> Result<(), VoreError> {
        let Some(call) = self.state.call_stack.peek().cloned() else {
            return Err(self.fault("subroutine end without an active call"));
        };
        if !predicate.is_empty() {
            let len = self.state.current.offset - call.start_offset;
            let bytes = self.reader.read_at(call.start_offset, len)?;
            let mut env = ValueMap::new();
            env.insert("match", String::from_utf8_lossy(&bytes).into_owned());
            env.insert("matchLength", len as i64);
            if !interp::execute(predicate, env)?.is_truthy() {
                self.backtrack();
                return Ok(());
            }
        }
        self.state.call_stack.pop();
        self.state.pc = call.return_pc;
        Ok(())
    }

    fn into_state(self) -> SearchEngineState {
        self.state
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

// ============================================================================
// Match finding
// ============================================================================

/// Run `program` over the whole input and collect the matches selected by
/// `window`.
///
/// Trials start at successive offsets. A non-empty success counts as a match.
/// Once past `skip`, the match is reported and the next trial starts where it
/// ended, so reported matches never overlap. Skipped matches, failures and
/// empty successes advance by one byte.
pub fn find_matches(
    program: &[SearchInstruction],
    window: MatchWindow,
    reader: &mut dyn Reader,
    filename: &str,
) -> Result<Vec<Match>, VoreError> {
    let size = reader.size();
    let mut found: VecDeque<Match> = VecDeque::new();
    if size == 0 {
        return Ok(Vec::new());
    }

    let mut match_number = 0;
    let mut cursor = Cursor::start();
    let limit = window.skip.saturating_add(window.take);
    while window.all || match_number < limit {
        trace!(offset = cursor.offset, "trial");
        let mut trial = Trial::new(program, &mut *reader, cursor);
        let status = trial.run()?;
        let state = trial.into_state();

        let counted = status == Status::Success && state.match_len() > 0;
        if counted {
            match_number += 1;
        }
        if counted && match_number > window.skip {
            found.push_back(make_match(&state, match_number, filename, reader)?);
            if window.last != 0 && found.len() > window.last {
                found.pop_front();
            }
            cursor = state.current;
        } else {
            let skipped = reader.read_at(cursor.offset, 1)?;
            if skipped.is_empty() {
                break;
            }
            cursor.advance(&skipped);
        }

        if cursor.offset >= size {
            break;
        }
    }

    Ok(found.into())
}

fn make_match(
    state: &SearchEngineState,
    match_number: usize,
    filename: &str,
    reader: &mut dyn Reader,
) -> Result<Match, VoreError> {
    let start = state.start;
    let end = state.current;
    let bytes = reader.read_at(start.offset, state.match_len())?;
    Ok(Match {
        filename: filename.to_string(),
        match_number,
        offset: start.offset..end.offset,
        line: start.line..end.line,
        column: start.column..end.column,
        value: String::from_utf8_lossy(&bytes).into_owned(),
        replacement: None,
        variables: state.environment.clone(),
    })
}
