// src/plan/extract.rs

//! Tolerant extraction of JSON blocks from model-authored text.
//!
//! Each block between the start and end markers is cleaned before parsing:
//! `//` comments outside strings are dropped, single-quoted keys are
//! double-quoted, trailing commas before `}`/`]` are removed, and control
//! characters plus a leading BOM are stripped.
//!
//! Text between `__PAYLOAD_START__` and `__PAYLOAD_END__` is lifted out
//! before cleaning, replaced by a quoted placeholder, and spliced back
//! verbatim into the parsed value. Authors can embed multi-line code without
//! escaping it.

use std::collections::HashMap;

use anyhow::anyhow;
use regex::{Captures, Regex};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::Result;

/// Start of a fenced block, optionally tagged `json`.
pub const FENCED_START: &str = r"```(?:json)?\s*";
pub const FENCED_END: &str = "```";

pub const PAYLOAD_START: &str = "__PAYLOAD_START__";
pub const PAYLOAD_END: &str = "__PAYLOAD_END__";

/// Per-block parse outcome, in document order. Blank blocks are skipped.
pub type Extracted = Vec<std::result::Result<Value, serde_json::Error>>;

/// Extract every fenced JSON block from `text`.
pub fn extract_json_blocks(text: &str) -> Result<Extracted> {
    extract_json_blocks_between(text, FENCED_START, FENCED_END)
}

/// Extract blocks opened by the regex `start_pattern` and closed by the
/// literal `end_marker`.
pub fn extract_json_blocks_between(text: &str, start_pattern: &str, end_marker: &str) -> Result<Extracted> {
    let block = compile(&format!(
        "(?ms){start_pattern}(.*?){}",
        regex::escape(end_marker)
    ))?;
    let cleaner = Cleaner::new()?;

    let mut results = Vec::new();
    for caps in block.captures_iter(text) {
        let Some(body) = caps.get(1) else { continue };
        if let Some(parsed) = cleaner.parse_block(body.as_str().trim()) {
            results.push(parsed);
        }
    }
    Ok(results)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| anyhow!("invalid extractor pattern {pattern:?}: {e}").into())
}

struct Cleaner {
    payload: Regex,
    quoted_key: Regex,
    trailing_comma: Regex,
    control: Regex,
}

impl Cleaner {
    fn new() -> Result<Self> {
        Ok(Self {
            payload: compile(&format!(
                "(?s){}(.*?){}",
                regex::escape(PAYLOAD_START),
                regex::escape(PAYLOAD_END)
            ))?,
            quoted_key: compile(r"([{,])(\s*)'([^']+)'(\s*:)")?,
            trailing_comma: compile(r",\s*([}\]])")?,
            control: compile(r"[\x00-\x08\x0b\x0c\x0e-\x1f]")?,
        })
    }

    fn parse_block(&self, raw: &str) -> Option<std::result::Result<Value, serde_json::Error>> {
        let mut payloads: HashMap<String, String> = HashMap::new();
        let lifted = self.payload.replace_all(raw, |caps: &Captures| {
            let placeholder = format!("__PLACEHOLDER_{}__", Uuid::new_v4().simple());
            let content = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            payloads.insert(placeholder.clone(), content.to_string());
            format!("\"{placeholder}\"")
        });

        let no_comments = strip_line_comments(&lifted);
        let keys_fixed = self.quoted_key.replace_all(&no_comments, "$1$2\"$3\"$4");
        let commas_fixed = self.trailing_comma.replace_all(&keys_fixed, "$1");
        let cleaned = self.control.replace_all(&commas_fixed, "");
        let cleaned = cleaned.strip_prefix('\u{feff}').unwrap_or(&cleaned);

        if cleaned.trim().is_empty() {
            return None;
        }

        Some(serde_json::from_str::<Value>(cleaned).map(|mut value| {
            if !payloads.is_empty() {
                restore_payloads(&mut value, &payloads);
            }
            value
        }))
    }
}

/// Drop `//` comments that are not inside a string literal, then drop lines
/// left blank.
fn strip_line_comments(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        if line.trim_start().starts_with("//") {
            continue;
        }

        let mut in_quotes = false;
        let mut escaped = false;
        let mut cut = None;
        let mut chars = line.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '"' && !escaped {
                in_quotes = !in_quotes;
            } else if c == '/' && !in_quotes && matches!(chars.peek(), Some((_, '/'))) {
                cut = Some(i);
                break;
            }
            escaped = c == '\\' && !escaped;
        }

        let line = match cut {
            Some(i) => line[..i].trim_end(),
            None => line,
        };
        if !line.trim().is_empty() {
            kept.push(line);
        }
    }
    kept.join("\n")
}

fn restore_payloads(value: &mut Value, payloads: &HashMap<String, String>) {
    match value {
        Value::String(s) => {
            if let Some(original) = payloads.get(s.as_str()) {
                *s = original.clone();
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| restore_payloads(item, payloads)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|item| restore_payloads(item, payloads)),
        _ => {}
    }
}
