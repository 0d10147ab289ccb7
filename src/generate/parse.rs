//! Repair parsing of model output.
//!
//! Models wrap JSON in code fences, prepend prose, emit stray table rows and
//! leak raw control characters into string values. Recovery runs a fixed
//! chain of increasingly aggressive strategies and stops at the first one
//! that yields a JSON object.

use super::plan::Plan;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to parse model response as JSON")]
pub struct ParseError;

/// The strategy that recovered the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    /// The cleaned text was itself a JSON object.
    Direct,
    /// First `{` through last `}`.
    GreedySpan,
    /// First complete top-level object found by brace scanning.
    BalancedScan,
}

impl RepairStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStrategy::Direct => "direct",
            RepairStrategy::GreedySpan => "greedy_span",
            RepairStrategy::BalancedScan => "balanced_scan",
        }
    }
}

fn opening_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^```(json)?").expect("valid fence regex"))
}

fn table_row() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*-?\s*\|").expect("valid table row regex"))
}

/// Remove a code fence at the very start and/or end of the trimmed text.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = match opening_fence().find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Drop lines that are stray markdown table rows (`| a |` or `- | a`).
pub fn drop_table_rows(text: &str) -> String {
    text.lines()
        .filter(|line| !table_row().is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove the C0 control characters JSON forbids inside string literals,
/// newlines and tabs included. DEL and C1 are legal JSON and kept.
pub fn strip_control_chars(text: &str) -> String {
    text.chars().filter(|c| !matches!(*c, '\u{00}'..='\u{1F}')).collect()
}

/// Apply fence stripping, table-row filtering and control-character removal.
pub fn clean_response(raw: &str) -> String {
    let unfenced = strip_code_fences(raw);
    let filtered = drop_table_rows(unfenced);
    strip_control_chars(&filtered)
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Substring from the first `{` to the last `}`, not balance-checked.
pub fn greedy_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// First complete top-level object, scanning from the first `{`.
///
/// Braces inside string literals don't count, and the character after a
/// backslash is never treated as structural.
pub fn balanced_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Recover a single JSON object from raw model output.
pub fn recover_json_object(raw: &str) -> Result<(Map<String, Value>, RepairStrategy), ParseError> {
    let cleaned = clean_response(raw);

    if let Some(map) = parse_object(&cleaned) {
        return Ok((map, RepairStrategy::Direct));
    }

    if let Some(map) = greedy_brace_span(&cleaned).and_then(parse_object) {
        return Ok((map, RepairStrategy::GreedySpan));
    }

    if let Some(map) = balanced_object_span(&cleaned).and_then(parse_object) {
        return Ok((map, RepairStrategy::BalancedScan));
    }

    Err(ParseError)
}

/// Parse raw model output into a [`Plan`].
pub fn parse_plan(raw: &str) -> Result<Plan, ParseError> {
    let (object, strategy) = recover_json_object(raw)?;
    tracing::debug!(strategy = strategy.as_str(), "Recovered JSON object from model output");
    Ok(Plan::from_object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recover(raw: &str) -> Value {
        Value::Object(recover_json_object(raw).unwrap().0)
    }

    fn strategy(raw: &str) -> RepairStrategy {
        recover_json_object(raw).unwrap().1
    }

    #[test]
    fn test_fenced_json_with_tag() {
        let original = json!({"title": "Ohm's Law", "materials": ["wire"], "procedure": ["connect circuit"]});
        let raw = format!("```json\n{}\n```", serde_json::to_string_pretty(&original).unwrap());
        assert_eq!(recover(&raw), original);
        assert_eq!(strategy(&raw), RepairStrategy::Direct);
    }

    #[test]
    fn test_fenced_json_without_tag_and_uppercase_tag() {
        let original = json!({"a": {"b": [1, 2, 3]}, "c": "d"});
        let body = serde_json::to_string(&original).unwrap();
        assert_eq!(recover(&format!("```\n{}\n```", body)), original);
        assert_eq!(recover(&format!("  ```JSON\n{}\n```  \n", body)), original);
    }

    #[test]
    fn test_leading_and_trailing_prose_uses_greedy_span() {
        let raw = "Sure! Here is your plan:\n{\"title\": \"Pendulum\", \"materials\": [\"bob\"]}\nHope this helps.";
        assert_eq!(recover(raw), json!({"title": "Pendulum", "materials": ["bob"]}));
        assert_eq!(strategy(raw), RepairStrategy::GreedySpan);
    }

    #[test]
    fn test_trailing_brace_noise_uses_balanced_scan() {
        let raw = "{\"title\": \"Lens {convex}\", \"steps\": [\"a\"]}\nNote: use {care}.";
        assert_eq!(
            recover(raw),
            json!({"title": "Lens {convex}", "steps": ["a"]})
        );
        assert_eq!(strategy(raw), RepairStrategy::BalancedScan);
    }

    #[test]
    fn test_balanced_scan_after_leading_prose() {
        let raw = "Plan below {draft}: ignore that.\n{\"title\": \"X\"} trailing }";
        // Greedy span starts at "{draft}" and fails; the scan also starts there
        // and returns "{draft}", which isn't JSON either.
        assert!(recover_json_object(raw).is_err());

        let raw = "Plan below:\n{\"title\": \"X\"} and then {junk";
        assert_eq!(recover(raw), json!({"title": "X"}));
    }

    #[test]
    fn test_escaped_quotes_do_not_end_strings() {
        let text = r#"{"q": "say \"}\" now", "n": 1} extra }"#;
        assert_eq!(
            balanced_object_span(text),
            Some(r#"{"q": "say \"}\" now", "n": 1}"#)
        );
    }

    #[test]
    fn test_control_characters_inside_strings_are_stripped() {
        let raw = "{\"title\": \"Line one\u{0007}\nLine two\", \"theory\": \"tab\there\u{0085}\"}";
        assert_eq!(
            recover(raw),
            json!({"title": "Line oneLine two", "theory": "tabhere\u{0085}"})
        );
    }

    #[test]
    fn test_fenced_object_with_del_and_c1_is_unchanged() {
        let original = json!({"title": "caf\u{0085}e \u{007F}x", "materials": ["\u{009F}wire"]});
        let raw = format!("```json\n{}\n```", serde_json::to_string(&original).unwrap());
        assert_eq!(recover(&raw), original);
        assert_eq!(strategy(&raw), RepairStrategy::Direct);
    }

    #[test]
    fn test_table_rows_are_dropped() {
        let raw = "| Column | Value |\n- | --- |\n{\"title\": \"Truth table\"}\n  | trailing | row |";
        assert_eq!(clean_response(raw), "{\"title\": \"Truth table\"}");
        assert_eq!(recover(raw), json!({"title": "Truth table"}));
    }

    #[test]
    fn test_lines_with_inner_pipes_are_kept() {
        let text = "{\"title\": \"A | B\"}";
        assert_eq!(drop_table_rows(text), text);
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        assert_eq!(recover_json_object("[1, 2, 3]"), Err(ParseError));
        assert_eq!(recover_json_object("\"just a string\""), Err(ParseError));
    }

    #[test]
    fn test_plain_prose_fails() {
        let err = recover_json_object("I'm sorry, I can't help with that.").unwrap_err();
        assert_eq!(err.to_string(), "Failed to parse model response as JSON");
    }

    #[test]
    fn test_unbalanced_braces_fail() {
        assert!(recover_json_object("{\"title\": \"x\", \"materials\": [\"a\"").is_err());
        assert!(recover_json_object("}{").is_err());
        assert!(recover_json_object("{{{").is_err());
        assert!(recover_json_object("").is_err());
    }

    #[test]
    fn test_strip_code_fences_only_touches_edges() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{\"a\": \"```\"}"), "{\"a\": \"```\"}");
    }

    #[test]
    fn test_parse_plan_builds_typed_plan() {
        let raw = "```json\n{\"title\":\"Ohm's Law\",\"materials\":[\"wire\"],\"procedure\":[\"connect circuit\"]}\n```";
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.title, "Ohm's Law");
        assert_eq!(plan.materials, vec!["wire"]);
        assert_eq!(plan.procedure, vec!["connect circuit"]);
    }
}
