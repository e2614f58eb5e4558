// matches.rs - Match records and their text/JSON renderings.

use std::fmt;
use std::ops::{Deref, Range};

use serde::Serialize;

use crate::value::{Value, ValueMap};

/// One successful match.
///
/// Offsets are byte positions; lines and columns are 1-based, columns
/// counted in characters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub filename: String,
    /// 1-based position among all matches found, skipped ones included.
    pub match_number: usize,
    pub offset: Range<usize>,
    pub line: Range<usize>,
    pub column: Range<usize>,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    pub variables: ValueMap,
}

impl Match {
    pub fn start(&self) -> usize {
        self.offset.start
    }

    pub fn end(&self) -> usize {
        self.offset.end
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.offset.end - self.offset.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A captured variable by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Filename: {}", self.filename)?;
        writeln!(f, "MatchNumber: {}", self.match_number)?;
        writeln!(f, "Value: '{}'", self.value)?;
        if let Some(replacement) = &self.replacement {
            writeln!(f, "Replaced: {}", replacement)?;
        }
        writeln!(f, "Offset: {} {}", self.offset.start, self.offset.end)?;
        writeln!(f, "Line: {} {}", self.line.start, self.line.end)?;
        writeln!(f, "Column: {} {}", self.column.start, self.column.end)?;
        write!(f, "Variables:\n  [key] = [value]")?;
        write_variables(f, &self.variables, 1)?;
        writeln!(f)
    }
}

fn write_variables(f: &mut fmt::Formatter<'_>, map: &ValueMap, depth: usize) -> fmt::Result {
    for (key, value) in map.iter() {
        write!(f, "\n{}'{}' = ", "  ".repeat(depth), key)?;
        match value {
            Value::Map(inner) => write_variables(f, inner, depth + 1)?,
            Value::String(s) => write!(f, "'{}'", s)?,
            other => write!(f, "{}", other)?,
        }
    }
    Ok(())
}

/// Results of running one or more commands, in command/file/match order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Matches(Vec<Match>);

impl Matches {
    pub fn new() -> Self {
        Matches::default()
    }

    pub fn into_vec(self) -> Vec<Match> {
        self.0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Deref for Matches {
    type Target = [Match];

    fn deref(&self) -> &[Match] {
        &self.0
    }
}

impl From<Vec<Match>> for Matches {
    fn from(v: Vec<Match>) -> Self {
        Matches(v)
    }
}

impl Extend<Match> for Matches {
    fn extend<I: IntoIterator<Item = Match>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl IntoIterator for Matches {
    type Item = Match;
    type IntoIter = std::vec::IntoIter<Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Matches {
    type Item = &'a Match;
    type IntoIter = std::slice::Iter<'a, Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Matches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "============")?;
        for m in &self.0 {
            write!(f, "{}", m)?;
            writeln!(f, "============")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Match {
        let mut variables = ValueMap::new();
        variables.insert("country", "US");
        Match {
            filename: "text".to_string(),
            match_number: 1,
            offset: 0..8,
            line: 1..1,
            column: 1..9,
            value: "US123456".to_string(),
            replacement: None,
            variables,
        }
    }

    #[test]
    fn accessors() {
        let m = sample();
        assert_eq!(m.start(), 0);
        assert_eq!(m.end(), 8);
        assert_eq!(m.len(), 8);
        assert!(!m.is_empty());
        assert_eq!(m.as_str(), "US123456");
        assert_eq!(m.get("country"), Some(&Value::from("US")));
    }

    #[test]
    fn json_shape() {
        let json = sample().to_json().unwrap();
        assert!(json.contains(r#""matchNumber":1"#));
        assert!(json.contains(r#""offset":{"start":0,"end":8}"#));
        assert!(json.contains(r#""variables":{"country":"US"}"#));
        assert!(!json.contains("replacement"));

        let mut replaced = sample();
        replaced.replacement = Some("X".to_string());
        assert!(replaced.to_json().unwrap().contains(r#""replacement":"X""#));
    }

    #[test]
    fn display_lists_variables() {
        let text = sample().to_string();
        assert!(text.contains("Value: 'US123456'"));
        assert!(text.contains("'country' = 'US'"));
        let all = Matches::from(vec![sample()]).to_string();
        assert!(all.starts_with("============\n"));
    }
}
