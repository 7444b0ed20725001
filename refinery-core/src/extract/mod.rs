//! Structured-output extraction from model text
//!
//! Models wrap JSON in prose, markdown fences, or emit raw control
//! characters inside strings. [`parse_structured`] runs an ordered list of
//! independent strategies, each producing one candidate string, and returns
//! the first candidate that deserializes into the requested type.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Maximum characters of model output kept in a [`StructuredParseError`]
pub const PREVIEW_CHARS: usize = 200;

/// One way of locating structured data in free-form text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The whole text, trimmed
    Verbatim,
    /// The body of the first markdown code fence
    FencedBlock,
    /// From the first `{` or `[` to the last matching closer
    BracketSpan,
    /// The bracket span with control characters escaped inside strings
    SanitizedSpan,
}

impl Strategy {
    /// Every strategy, in the order they are tried
    pub const ORDER: [Strategy; 4] = [
        Strategy::Verbatim,
        Strategy::FencedBlock,
        Strategy::BracketSpan,
        Strategy::SanitizedSpan,
    ];

    /// Produce this strategy's candidate, if it finds one
    pub fn candidate<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        match self {
            Strategy::Verbatim => verbatim(text),
            Strategy::FencedBlock => fenced_block(text),
            Strategy::BracketSpan => bracket_span(text),
            Strategy::SanitizedSpan => sanitized_span(text),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Verbatim => "verbatim",
            Strategy::FencedBlock => "fenced_block",
            Strategy::BracketSpan => "bracket_span",
            Strategy::SanitizedSpan => "sanitized_span",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed value and the strategy that recovered it
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub strategy: Strategy,
}

/// No strategy produced a candidate that parsed
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no structured data could be parsed from model output: {preview}")]
pub struct StructuredParseError {
    /// The start of the offending text
    pub preview: String,
    /// Parse error of the last candidate tried, if any candidate was found
    pub last_error: Option<String>,
}

/// Parse `text` into `T` using every strategy in order
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<Extracted<T>, StructuredParseError> {
    let mut last_error = None;
    for strategy in Strategy::ORDER {
        let Some(candidate) = strategy.candidate(text) else {
            continue;
        };
        match serde_json::from_str::<T>(&candidate) {
            Ok(value) => {
                if strategy != Strategy::Verbatim {
                    debug!(strategy = %strategy, "structured output recovered");
                }
                return Ok(Extracted { value, strategy });
            }
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(StructuredParseError {
        preview: preview(text),
        last_error,
    })
}

/// Convenience wrapper returning only the value
pub fn parse_value<T: DeserializeOwned>(text: &str) -> Result<T, StructuredParseError> {
    parse_structured(text).map(|extracted| extracted.value)
}

fn verbatim(text: &str) -> Option<Cow<'_, str>> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(Cow::Borrowed(trimmed))
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // ```json ... ``` or ``` ... ```; the info string is optional
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
    })
}

fn fenced_block(text: &str) -> Option<Cow<'_, str>> {
    let body = fence_pattern().captures(text)?.get(1)?.as_str().trim();
    (!body.is_empty()).then_some(Cow::Borrowed(body))
}

fn bracket_span(text: &str) -> Option<Cow<'_, str>> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| Cow::Borrowed(&text[start..=end]))
}

fn sanitized_span(text: &str) -> Option<Cow<'_, str>> {
    let span = bracket_span(text)?;
    match escape_controls_in_strings(&span) {
        Cow::Borrowed(_) => None,
        Cow::Owned(fixed) => Some(Cow::Owned(fixed)),
    }
}

/// Escape raw newlines, tabs, carriage returns, backspaces, and form
/// feeds that appear inside JSON string literals. Text outside strings is
/// left alone. Borrows when nothing needs escaping.
pub fn escape_controls_in_strings(text: &str) -> Cow<'_, str> {
    let needs_work = text
        .chars()
        .any(|c| matches!(c, '\n' | '\r' | '\t' | '\u{08}' | '\u{0C}'));
    if !needs_work {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut changed = false;

    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }

        let replacement = match c {
            '\\' => {
                escaped = true;
                None
            }
            '"' => {
                in_string = false;
                None
            }
            '\n' => Some("\\n"),
            '\r' => Some("\\r"),
            '\t' => Some("\\t"),
            '\u{08}' => Some("\\b"),
            '\u{0C}' => Some("\\f"),
            _ => None,
        };
        match replacement {
            Some(escape) => {
                changed = true;
                out.push_str(escape);
            }
            None => out.push(c),
        }
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

/// First [`PREVIEW_CHARS`] characters of `text`, with an ellipsis when cut
fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
