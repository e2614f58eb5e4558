// engine.rs - Compile an AST once and run it over text or files.
//
// Wraps the compiler, the search VM and the replacement stage with
// Rust-native types: Vore, RunOptions, ReplaceMode.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::ast::Command;
use crate::bytecode::{CompiledCommand, Program};
use crate::compile::CompilerContext;
use crate::error::VoreError;
use crate::files::{FileReader, FileWriter, MemoryReader, MemoryWriter, Reader};
use crate::matches::{Match, Matches};
use crate::replace::{apply_replacements, splice};
use crate::search::find_matches;

/// Suffix of the file written by [`ReplaceMode::New`].
pub const VORED_SUFFIX: &str = ".vored";

/// Filename reported for in-memory text unless overridden.
pub const DEFAULT_LABEL: &str = "text";

/// What a replace command does with the file it searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceMode {
    /// Rewrite the file in place.
    Overwrite,
    /// Write the result next to the file, as `<file>.vored`.
    New,
    /// Only report replacements.
    #[default]
    Nothing,
}

/// Options for a single run.
///
/// # Examples
///
/// ```
/// use vore::engine::{ReplaceMode, RunOptions};
///
/// let options = RunOptions::new()
///     .replace_mode(ReplaceMode::New)
///     .label("input");
/// assert_eq!(options.mode(), ReplaceMode::New);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    replace_mode: ReplaceMode,
    process_filenames: bool,
    label: String,
}

impl RunOptions {
    pub fn new() -> Self {
        RunOptions {
            replace_mode: ReplaceMode::default(),
            process_filenames: false,
            label: DEFAULT_LABEL.to_string(),
        }
    }

    pub fn replace_mode(mut self, mode: ReplaceMode) -> Self {
        self.replace_mode = mode;
        self
    }

    /// Search file names instead of file contents. A replace command then
    /// renames each file to the replacement of its first match.
    pub fn process_filenames(mut self, yes: bool) -> Self {
        self.process_filenames = yes;
        self
    }

    /// Filename reported for matches in in-memory text.
    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn mode(&self) -> ReplaceMode {
        self.replace_mode
    }

    pub fn processes_filenames(&self) -> bool {
        self.process_filenames
    }

    pub fn label_text(&self) -> &str {
        &self.label
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions::new()
    }
}

/// A compiled list of commands.
///
/// # Examples
///
/// ```
/// use vore::prelude::*;
///
/// let vore = Vore::compile(&[Command::find_all(vec![Literal::string("yay").into()])]).unwrap();
/// let matches = vore.run("OMG yay :)").unwrap();
/// assert_eq!(matches.len(), 1);
/// assert_eq!(matches[0].start(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct Vore {
    commands: Vec<CompiledCommand>,
}

impl Vore {
    /// Compile `commands` in order. Patterns and transforms defined by `set`
    /// are visible to every command after them.
    pub fn compile(commands: &[Command]) -> Result<Vore, VoreError> {
        let mut ctx = CompilerContext::new();
        let commands = ctx.compile(commands)?;
        debug!(commands = commands.len(), "compiled");
        Ok(Vore { commands })
    }

    pub fn commands(&self) -> &[CompiledCommand] {
        &self.commands
    }

    /// Run every command against `text`.
    pub fn run(&self, text: &str) -> Result<Matches, VoreError> {
        self.run_with(text, &RunOptions::default())
    }

    /// Run every command against `text`. Replace commands report their
    /// replacements; there is no file to write back to.
    pub fn run_with(&self, text: &str, options: &RunOptions) -> Result<Matches, VoreError> {
        let mut all = Matches::new();
        for (index, command) in self.commands.iter().enumerate() {
            let mut reader = MemoryReader::new(text);
            let found = execute_command(command, &mut reader, &options.label)?;
            info!(command = index, file = %options.label, matches = found.len(), "run");
            all.extend(found);
        }
        Ok(all)
    }

    /// Run every command against each file in `paths`, command by command.
    pub fn run_files<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: &RunOptions,
    ) -> Result<Matches, VoreError> {
        let mut all = Matches::new();
        for (index, command) in self.commands.iter().enumerate() {
            for path in paths {
                let path = path.as_ref();
                let found = if options.process_filenames {
                    run_on_filename(command, path)?
                } else {
                    run_on_file(command, path, options.replace_mode)?
                };
                info!(
                    command = index,
                    file = %path.display(),
                    matches = found.len(),
                    "run"
                );
                all.extend(found);
            }
        }
        Ok(all)
    }
}

/// Search one input and evaluate replacements. Definitions yield nothing.
fn execute_command(
    command: &CompiledCommand,
    reader: &mut dyn Reader,
    filename: &str,
) -> Result<Vec<Match>, VoreError> {
    match command {
        CompiledCommand::Find(program) => search(program, reader, filename),
        CompiledCommand::Replace { program, result } => {
            let mut found = search(program, reader, filename)?;
            apply_replacements(result, &mut found)?;
            Ok(found)
        }
        CompiledCommand::Set { .. } => Ok(Vec::new()),
    }
}

fn search(
    program: &Program,
    reader: &mut dyn Reader,
    filename: &str,
) -> Result<Vec<Match>, VoreError> {
    find_matches(&program.instructions, program.window, reader, filename)
}

fn run_on_file(
    command: &CompiledCommand,
    path: &Path,
    mode: ReplaceMode,
) -> Result<Vec<Match>, VoreError> {
    let filename = path.to_string_lossy();
    let mut reader = FileReader::open(path)?;
    let found = execute_command(command, &mut reader, &filename);
    reader.close()?;
    let found = found?;

    if let CompiledCommand::Replace { .. } = command {
        write_back(path, mode, &found)?;
    }
    Ok(found)
}

/// Splice replacements into the file according to `mode`.
fn write_back(path: &Path, mode: ReplaceMode, found: &[Match]) -> Result<(), VoreError> {
    let target = match mode {
        ReplaceMode::Nothing => return Ok(()),
        ReplaceMode::New => vored_path(path),
        ReplaceMode::Overwrite => path.to_path_buf(),
    };
    // Overwriting reads ahead of the write position, so the whole input is
    // loaded before the file is truncated.
    let mut reader: Box<dyn Reader> = match mode {
        ReplaceMode::Overwrite => Box::new(MemoryReader::from_file(path)?),
        _ => Box::new(FileReader::open(path)?),
    };
    let mut writer = match FileWriter::create(&target) {
        Ok(writer) => writer,
        Err(e) => {
            reader.close()?;
            return Err(e.into());
        }
    };
    splice(reader.as_mut(), &mut writer, found)?;
    debug!(path = %target.display(), replaced = found.len(), "wrote replacements");
    Ok(())
}

fn vored_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(VORED_SUFFIX);
    PathBuf::from(name)
}

/// Search the path itself. A replace command renames the file to the
/// replaced path of its first match.
fn run_on_filename(command: &CompiledCommand, path: &Path) -> Result<Vec<Match>, VoreError> {
    let filename = path.to_string_lossy();
    let mut reader = MemoryReader::new(filename.as_bytes());
    let found = execute_command(command, &mut reader, &filename)?;

    if let CompiledCommand::Replace { .. } = command {
        if let Some(first) = found.first() {
            let renamed = spliced_name(&filename, first)?;
            if !first.replacement.as_deref().unwrap_or("").is_empty() && renamed != *filename {
                if let Err(e) = std::fs::rename(path, &renamed) {
                    warn!(from = %path.display(), to = %renamed, error = %e, "rename failed");
                }
            }
        }
    }
    Ok(found)
}

/// The filename with only its first match replaced.
fn spliced_name(filename: &str, first: &Match) -> Result<String, VoreError> {
    let mut reader = MemoryReader::new(filename);
    let mut writer = MemoryWriter::new();
    splice(&mut reader, &mut writer, std::slice::from_ref(first))?;
    Ok(String::from_utf8_lossy(writer.contents()).into_owned())
}
