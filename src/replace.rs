// replace.rs - Replacement text and splicing it into the output.

use std::io;

use crate::bytecode::ReplaceInstruction;
use crate::error::ExecError;
use crate::files::{Reader, Writer};
use crate::interp;
use crate::matches::Match;
use crate::value::{Value, ValueMap};

/// Fill in `replacement` on every match.
pub fn apply_replacements(
    result: &[ReplaceInstruction],
    matches: &mut [Match],
) -> Result<(), ExecError> {
    let total = matches.len();
    for m in matches.iter_mut() {
        let text = replacement_for(result, m, total)?;
        m.replacement = Some(text);
    }
    Ok(())
}

/// Evaluate the replacement instructions for one match.
///
/// Variables that are unset or not strings contribute nothing. A transform
/// contributes the text of its result.
pub fn replacement_for(
    result: &[ReplaceInstruction],
    m: &Match,
    total_matches: usize,
) -> Result<String, ExecError> {
    let mut out = String::new();
    for inst in result {
        match inst {
            ReplaceInstruction::String(s) => out.push_str(s),
            ReplaceInstruction::Variable(name) => {
                if let Some(Value::String(s)) = m.get(name) {
                    out.push_str(s);
                }
            }
            ReplaceInstruction::Process { program, .. } => {
                let env = transform_environment(m, total_matches);
                let value = interp::execute(program, env)?;
                out.push_str(&value.to_string());
            }
        }
    }
    Ok(out)
}

/// Bindings visible to a transform script.
pub fn transform_environment(m: &Match, total_matches: usize) -> ValueMap {
    let mut env: ValueMap = m
        .variables
        .iter()
        .filter(|(_, v)| matches!(v, Value::String(_)))
        .map(|(k, v)| (k, v.clone()))
        .collect();
    let number = |n: usize| Value::Number(n as i64);
    env.insert("match", m.value.as_str());
    env.insert("value", m.value.as_str());
    env.insert("matchLength", number(m.len()));
    env.insert("matchNumber", number(m.match_number));
    env.insert("totalMatches", number(total_matches));
    env.insert("startOffset", number(m.offset.start));
    env.insert("endOffset", number(m.offset.end));
    env.insert("lineNumber", number(m.line.start));
    env.insert("columnNumber", number(m.column.start));
    env.insert("filename", m.filename.as_str());
    env
}

/// Write the input to `writer` with every match replaced. Matches must be in
/// offset order and must not overlap. Both ends are closed even when the
/// copy fails.
pub fn splice(
    reader: &mut dyn Reader,
    writer: &mut dyn Writer,
    matches: &[Match],
) -> io::Result<()> {
    let copied = copy_spliced(reader, writer, matches);
    let writer_closed = writer.close();
    let reader_closed = reader.close();
    copied.and(writer_closed).and(reader_closed)
}

fn copy_spliced(
    reader: &mut dyn Reader,
    writer: &mut dyn Writer,
    matches: &[Match],
) -> io::Result<()> {
    let mut read_offset = 0;
    let mut write_offset = 0;
    for m in matches {
        let before = reader.read_at(read_offset, m.start().saturating_sub(read_offset))?;
        writer.write_at(write_offset, &before)?;
        write_offset += before.len();

        let replacement = m.replacement.as_deref().unwrap_or("");
        writer.write_at(write_offset, replacement.as_bytes())?;
        write_offset += replacement.len();
        read_offset = m.end();
    }
    let size = reader.size();
    if read_offset < size {
        let tail = reader.read_at(read_offset, size - read_offset)?;
        writer.write_at(write_offset, &tail)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{MemoryReader, MemoryWriter};

    fn found(start: usize, value: &str, number: usize) -> Match {
        let mut variables = ValueMap::new();
        variables.insert("w", value);
        variables.insert("nested", ValueMap::new());
        Match {
            filename: "text".to_string(),
            match_number: number,
            offset: start..start + value.len(),
            line: 1..1,
            column: start + 1..start + 1 + value.len(),
            value: value.to_string(),
            replacement: None,
            variables,
        }
    }

    #[test]
    fn strings_and_variables() {
        let m = found(0, "wow", 1);
        let result = vec![
            ReplaceInstruction::String("<".to_string()),
            ReplaceInstruction::Variable("w".to_string()),
            ReplaceInstruction::Variable("missing".to_string()),
            ReplaceInstruction::Variable("nested".to_string()),
            ReplaceInstruction::String(">".to_string()),
        ];
        assert_eq!(replacement_for(&result, &m, 1).unwrap(), "<wow>");
    }

    #[test]
    fn environment_bindings() {
        let env = transform_environment(&found(4, "abc", 2), 5);
        assert_eq!(env.get("match"), Some(&Value::from("abc")));
        assert_eq!(env.get("w"), Some(&Value::from("abc")));
        assert_eq!(env.get("matchLength"), Some(&Value::Number(3)));
        assert_eq!(env.get("matchNumber"), Some(&Value::Number(2)));
        assert_eq!(env.get("totalMatches"), Some(&Value::Number(5)));
        assert_eq!(env.get("startOffset"), Some(&Value::Number(4)));
        assert_eq!(env.get("endOffset"), Some(&Value::Number(7)));
        assert_eq!(env.get("columnNumber"), Some(&Value::Number(5)));
        assert!(!env.contains_key("nested"));
    }

    #[test]
    fn process_result_is_stringified() {
        use crate::ast::{BinaryOp, ProcExpr, Statement};
        use crate::procgen::generate_process;

        let program = generate_process(&[Statement::Return(ProcExpr::binary(
            BinaryOp::Multiply,
            ProcExpr::var("matchNumber"),
            ProcExpr::Number(10),
        ))])
        .unwrap();
        let result = vec![ReplaceInstruction::Process {
            name: "tens".to_string(),
            program,
        }];
        let mut matches = vec![found(0, "a", 1), found(2, "b", 2)];
        apply_replacements(&result, &mut matches).unwrap();
        assert_eq!(matches[0].replacement.as_deref(), Some("10"));
        assert_eq!(matches[1].replacement.as_deref(), Some("20"));
    }

    #[test]
    fn splice_rewrites_matches() {
        let mut matches = vec![found(0, "wow", 1), found(4, "wow", 2), found(7, "wow", 3)];
        matches[0].replacement = Some(">".to_string());
        matches[1].replacement = Some("[longer]".to_string());
        matches[2].replacement = None;

        let mut reader = MemoryReader::new("wow wowwow tail");
        let mut writer = MemoryWriter::new();
        splice(&mut reader, &mut writer, &matches).unwrap();
        assert_eq!(writer.contents(), b"> [longer] tail");
    }

    #[test]
    fn splice_without_matches_copies() {
        let mut reader = MemoryReader::new("unchanged");
        let mut writer = MemoryWriter::new();
        splice(&mut reader, &mut writer, &[]).unwrap();
        assert_eq!(writer.contents(), b"unchanged");
    }
}
