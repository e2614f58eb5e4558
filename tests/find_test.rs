// find_test.rs - Integration tests for find commands through the Vore facade.

use std::path::PathBuf;

use proptest::prelude::*;
use vore::prelude::*;

fn find(body: Vec<Expression>, text: &str) -> Matches {
    Vore::compile(&[Command::find_all(body)])
        .unwrap()
        .run(text)
        .unwrap()
}

fn spans(matches: &Matches) -> Vec<(usize, String)> {
    matches
        .iter()
        .map(|m| (m.start(), m.as_str().to_string()))
        .collect()
}

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("vore-find-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).unwrap();
    path
}

// === Basic searches ===

#[test]
fn literal_positions() {
    let m = find(vec![Literal::string("yay").into()], "yay, OMG yay :)");
    assert_eq!(spans(&m), vec![(0, "yay".into()), (9, "yay".into())]);
    assert_eq!(m[1].match_number, 2);
    assert_eq!(m[1].end(), 12);
}

#[test]
fn no_matches_is_empty() {
    let m = find(vec![Literal::string("xyz").into()], "abc");
    assert!(m.is_empty());
}

#[test]
fn lines_and_columns() {
    let m = find(
        vec![Expression::at_least(1, Literal::class(CharClass::Digit))],
        "a1\nbb22\n\ncc333",
    );
    let positions: Vec<_> = m
        .iter()
        .map(|m| (m.line.clone(), m.column.clone()))
        .collect();
    assert_eq!(positions, vec![(1..1, 2..3), (2..2, 3..5), (4..4, 3..6)]);
}

#[test]
fn columns_count_characters() {
    let m = find(vec![Literal::string("x").into()], "héé x");
    assert_eq!(m[0].start(), 6);
    assert_eq!(m[0].column, 5..6);
}

#[test]
fn windowed_find() {
    let vore = Vore::compile(&[
        Command::find(MatchWindow::skip_take(1, 2), vec![Literal::string("o").into()]),
        Command::find(MatchWindow::last(1), vec![Literal::string("o").into()]),
    ])
    .unwrap();
    let m = vore.run("o o o o").unwrap();
    let starts: Vec<usize> = m.iter().map(|m| m.start()).collect();
    assert_eq!(starts, vec![2, 4, 6]);
    assert_eq!(m[2].match_number, 4);
}

#[test]
fn skipped_matches_can_overlap_reported_ones() {
    let vore = Vore::compile(&[Command::find(
        MatchWindow::skip_take(1, 1),
        vec![Expression::at_least(1, Literal::class(CharClass::Letter))],
    )])
    .unwrap();
    let m = vore.run("abc de").unwrap();
    assert_eq!(spans(&m), vec![(1, "bc".into())]);
    assert_eq!(m[0].match_number, 2);
}

// === Captures and definitions ===

#[test]
fn captures_are_reported() {
    let m = find(
        vec![
            Expression::capture(
                "key",
                Literal::group(vec![Expression::at_least(1, Literal::class(CharClass::Letter))]),
            ),
            Literal::string("=").into(),
            Expression::capture(
                "val",
                Literal::group(vec![Expression::at_least(1, Literal::class(CharClass::Digit))]),
            ),
        ],
        "a=1, bee=22",
    );
    assert_eq!(m.len(), 2);
    assert_eq!(m[1].get("key"), Some(&Value::from("bee")));
    assert_eq!(m[1].get("val"), Some(&Value::from("22")));
}

#[test]
fn pattern_definitions_are_reusable() {
    let vore = Vore::compile(&[
        Command::set_pattern(
            "pair",
            vec![
                Literal::class(CharClass::Digit).into(),
                Literal::class(CharClass::Digit).into(),
            ],
            vec![],
        ),
        Command::find_all(vec![
            Literal::var("pair").into(),
            Literal::string(":").into(),
            Literal::var("pair").into(),
        ]),
    ])
    .unwrap();
    let m = vore.run("at 12:30 and 7:45").unwrap();
    assert_eq!(spans(&m), vec![(3, "12:30".into())]);
}

#[test]
fn set_matches_produces_no_results() {
    let vore = Vore::compile(&[Command::Set(vore::ast::SetCommand {
        id: "found".to_string(),
        body: vore::ast::SetBody::Matches(Box::new(Command::find_all(vec![Literal::string(
            "a",
        )
        .into()]))),
    })])
    .unwrap();
    assert!(vore.run("aaa").unwrap().is_empty());
}

#[test]
fn undefined_name_fails_to_compile() {
    let err = Vore::compile(&[Command::find_all(vec![Literal::var("nope").into()])]).unwrap_err();
    match err {
        VoreError::Gen(GenError::UndefinedIdentifier { name, .. }) => assert_eq!(name, "nope"),
        other => panic!("expected undefined identifier, got {:?}", other),
    }
}

// === Output ===

#[test]
fn json_output() {
    let m = find(vec![Expression::capture("w", Literal::string("hi"))], "oh hi");
    let json = m.to_json().unwrap();
    assert!(json.starts_with('['));
    assert!(json.contains(r#""filename":"text""#));
    assert!(json.contains(r#""value":"hi""#));
    assert!(json.contains(r#""line":{"start":1,"end":1}"#));
    assert!(json.contains(r#""variables":{"w":"hi"}"#));
    assert!(m.to_json_pretty().unwrap().contains('\n'));
}

#[test]
fn json_keeps_loop_iteration_order() {
    let m = find(
        vec![Expression::at_least(
            1,
            Literal::group(vec![Expression::capture("c", Literal::class(CharClass::Letter))]),
        )
        .named("chars")],
        "abcdefghijkl",
    );
    let json = m.to_json().unwrap();
    let nine = json.find(r#""9":{"c":"j"}"#).unwrap();
    let ten = json.find(r#""10":{"c":"k"}"#).unwrap();
    let eleven = json.find(r#""11":{"c":"l"}"#).unwrap();
    assert!(nine < ten && ten < eleven);
    assert!(json.find(r#""2":{"c":"c"}"#).unwrap() < nine);
}

#[test]
fn text_output() {
    let m = find(vec![Literal::string("hi").into()], "hi");
    let text = m.to_string();
    assert!(text.contains("MatchNumber: 1"));
    assert!(text.contains("Offset: 0 2"));
}

// === Files ===

#[test]
fn files_in_command_then_path_order() {
    let first = temp_file("order-a", "x.x");
    let second = temp_file("order-b", "x");
    let vore = Vore::compile(&[
        Command::find_all(vec![Literal::string("x").into()]),
        Command::find_all(vec![Literal::string(".").into()]),
    ])
    .unwrap();
    let m = vore
        .run_files(&[&first, &second], &RunOptions::default())
        .unwrap();
    let seen: Vec<(String, &str)> = m
        .iter()
        .map(|m| (m.filename.clone(), m.as_str()))
        .collect();
    let a = first.to_string_lossy().into_owned();
    let b = second.to_string_lossy().into_owned();
    assert_eq!(
        seen,
        vec![(a.clone(), "x"), (a.clone(), "x"), (b, "x"), (a, ".")]
    );
    std::fs::remove_file(first).unwrap();
    std::fs::remove_file(second).unwrap();
}

#[test]
fn empty_file_has_no_matches() {
    let path = temp_file("empty", "");
    let vore = Vore::compile(&[Command::find_all(vec![Literal::string("a").into()])]).unwrap();
    assert!(vore
        .run_files(&[&path], &RunOptions::default())
        .unwrap()
        .is_empty());
    std::fs::remove_file(path).unwrap();
}

// === Oracle ===

/// Leftmost, non-overlapping occurrences of `needle`.
fn naive_find(haystack: &str, needle: &str) -> Vec<usize> {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    let mut found = Vec::new();
    let mut i = 0;
    while i + n.len() <= h.len() {
        if &h[i..i + n.len()] == n {
            found.push(i);
            i += n.len();
        } else {
            i += 1;
        }
    }
    found
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn literal_search_agrees_with_scanner(needle in "[ab]{1,3}", haystack in "[ab ]{0,40}") {
        let m = find(vec![Literal::string(&needle).into()], &haystack);
        let starts: Vec<usize> = m.iter().map(|m| m.start()).collect();
        prop_assert_eq!(starts, naive_find(&haystack, &needle));
        prop_assert!(m.iter().all(|m| m.as_str() == needle));
    }

    #[test]
    fn caseless_search_agrees_with_lowered_scanner(needle in "[ab]{1,3}", haystack in "[aAbB]{0,30}") {
        let m = find(vec![Literal::caseless(&needle).into()], &haystack);
        let starts: Vec<usize> = m.iter().map(|m| m.start()).collect();
        prop_assert_eq!(starts, naive_find(&haystack.to_ascii_lowercase(), &needle));
    }
}
