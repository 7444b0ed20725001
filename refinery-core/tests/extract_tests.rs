//! Structured-output recovery on realistic model replies

use proptest::prelude::*;
use refinery_core::extract::{parse_structured, parse_value, Strategy as Extraction, PREVIEW_CHARS};
use serde::Deserialize;
use serde_json::Value;
use test_case::test_case;

#[derive(Debug, Deserialize, PartialEq)]
struct BacklogItem {
    title: String,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
}

#[test_case(r#"[{"title":"Export CSV"}]"#, Extraction::Verbatim ; "clean json")]
#[test_case("```json\n[{\"title\":\"Export CSV\"}]\n```", Extraction::FencedBlock ; "fenced json")]
#[test_case("Here are the items:\n\n```\n[{\"title\":\"Export CSV\"}]\n```\n", Extraction::FencedBlock ; "fence without language")]
#[test_case(r#"I found one item: [{"title":"Export CSV"}] Let me know if you need more."#, Extraction::BracketSpan ; "json in prose")]
#[test_case("[{\"title\":\"Export\tCSV\"}]", Extraction::SanitizedSpan ; "raw tab in string")]
fn test_strategy_selected(text: &str, expected: Extraction) {
    let extracted = parse_structured::<Vec<BacklogItem>>(text).unwrap();
    assert_eq!(extracted.strategy, expected);
    assert_eq!(extracted.value.len(), 1);
    assert!(extracted.value[0].title.starts_with("Export"));
}

#[test]
fn test_multiline_string_values() {
    let reply = "Sure.\n{\n  \"title\": \"Bulk import\",\n  \"acceptance_criteria\": [\"Given a file\nWhen uploaded\nThen rows appear\"]\n}\nDone.";
    let item: BacklogItem = parse_value(reply).unwrap();
    assert_eq!(item.title, "Bulk import");
    assert_eq!(
        item.acceptance_criteria,
        vec!["Given a file\nWhen uploaded\nThen rows appear".to_string()]
    );
}

#[test]
fn test_escaped_quotes_survive_sanitizing() {
    let reply = "{\"title\": \"Rename \\\"Save\\\" to\nSubmit\"}";
    let item: BacklogItem = parse_value(reply).unwrap();
    assert_eq!(item.title, "Rename \"Save\" to\nSubmit");
}

#[test]
fn test_failure_carries_preview() {
    let reply = "I could not find any backlog items in this transcript. ".repeat(10);
    let err = parse_value::<Vec<BacklogItem>>(&reply).unwrap_err();
    assert_eq!(err.preview.chars().count(), PREVIEW_CHARS + 3);
    assert!(err.preview.ends_with("..."));
    assert!(err.to_string().contains("could not find"));
}

proptest! {
    /// Any JSON object wrapped in prose is recovered unchanged
    #[test]
    fn prop_object_in_prose(
        key in "[a-z]{1,8}",
        value in "[a-zA-Z0-9 ]{0,20}",
        prefix in "[a-zA-Z .,:]{0,40}",
        suffix in "[a-zA-Z .,]{0,40}",
    ) {
        let mut object = serde_json::Map::new();
        object.insert(key.clone(), Value::String(value.clone()));
        let json = Value::Object(object);
        let text = format!("{}{}{}", prefix, json, suffix);
        let parsed: Value = parse_value(&text).unwrap();
        prop_assert_eq!(&parsed[&key], &Value::String(value));
    }

    #[test]
    fn prop_never_panics(text in "\\PC{0,300}") {
        let _ = parse_structured::<Value>(&text);
    }
}
