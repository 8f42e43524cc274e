//! Two-stage decoding of model replies into an [`AnalysisVerdict`].
//!
//! | Stage   | Accepts                                                        |
//! |---------|----------------------------------------------------------------|
//! | strict  | a JSON object, optionally fenced or surrounded by prose         |
//! | lenient | a Python-style dict literal: `'…'` strings, `True`/`False`/`None`, trailing commas |
//!
//! Callers branch on [`DecodedVerdict`] rather than on parse errors.

use tracing::debug;

use super::AnalysisVerdict;
use crate::{AppError, Result};

/// Outcome of [`decode_verdict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedVerdict {
    /// Parsed as strict JSON.
    Strict(AnalysisVerdict),
    /// Parsed only after normalising dict-literal syntax.
    Lenient(AnalysisVerdict),
    /// Neither stage produced a verdict; carries the strict-stage error.
    Unparsable(String),
}

impl DecodedVerdict {
    /// Collapse into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Analysis` for [`DecodedVerdict::Unparsable`].
    pub fn into_result(self) -> Result<AnalysisVerdict> {
        match self {
            Self::Strict(verdict) | Self::Lenient(verdict) => Ok(verdict),
            Self::Unparsable(reason) => Err(AppError::Analysis(format!(
                "unparsable verdict: {reason}"
            ))),
        }
    }
}

/// Decode a raw model reply.
#[must_use]
pub fn decode_verdict(content: &str) -> DecodedVerdict {
    let body = strip_code_fence(content);
    let object = extract_object(body);

    let strict_err = match serde_json::from_str::<AnalysisVerdict>(body) {
        Ok(verdict) => return DecodedVerdict::Strict(verdict),
        Err(err) => err,
    };
    if let Some(object) = object {
        if let Ok(verdict) = serde_json::from_str::<AnalysisVerdict>(object) {
            return DecodedVerdict::Strict(verdict);
        }
    }

    let normalized = dict_literal_to_json(object.unwrap_or(body));
    match serde_json::from_str::<AnalysisVerdict>(&normalized) {
        Ok(verdict) => {
            debug!("verdict recovered by lenient decoding");
            DecodedVerdict::Lenient(verdict)
        }
        Err(_) => DecodedVerdict::Unparsable(strict_err.to_string()),
    }
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
#[must_use]
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let without_open = &trimmed[3..];
    // The opening line may carry a language tag (```json).
    let after_open = without_open
        .find('\n')
        .map_or(without_open, |idx| &without_open[idx + 1..]);
    let inner = after_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(after_open);
    inner.trim()
}

/// Slice from the first `{` to the last `}`, if both exist in order.
fn extract_object(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// Rewrite a Python-style dict literal into JSON.
///
/// Single-quoted strings become double-quoted (escaping embedded `"`),
/// the bare words `True`, `False`, and `None` become `true`, `false`, and
/// `null`, and trailing commas before `}` or `]` are dropped. Double-quoted
/// strings pass through untouched.
#[must_use]
pub fn dict_literal_to_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out);
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(',');
                }
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                continue;
            }
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Copy the string literal starting at `chars[start]` into `out` as a JSON
/// string and return the index just past its closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push('"');
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            match chars.get(i + 1) {
                Some('\'') if quote == '\'' => out.push('\''),
                Some(&next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push_str("\\\\"),
            }
            i += 2;
            continue;
        }
        if c == quote {
            out.push('"');
            return i + 1;
        }
        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
        i += 1;
    }

    out.push('"');
    i
}
