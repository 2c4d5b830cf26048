//! # LLM Helpers
//!
//! Shared utilities for turning free-form model text into validated fields.
//!
//! Models are asked for JSON but routinely wrap it in code fences, prepend
//! prose, rename keys between snake_case and camelCase, or send numbers as
//! strings. The decoders here never fail: each takes the default the caller
//! supplies whenever a field is missing or has the wrong shape.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fence pattern is valid")
    })
}

/// Extract the first JSON object from a model response.
///
/// Accepts bare JSON, JSON inside a fenced code block, or an object
/// embedded in surrounding prose. Returns `None` for anything else,
/// including top-level arrays and scalars.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for captures in fence_regex().captures_iter(trimmed) {
        if let Some(body) = captures.get(1) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(body.as_str().trim())
            {
                return Some(value);
            }
        }
    }

    balanced_object(trimmed).and_then(|slice| match serde_json::from_str::<Value>(slice) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    })
}

/// Slice out the first brace-balanced `{...}` span, ignoring braces in strings
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First present, non-null value among several key spellings
pub fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let object = value.as_object()?;
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|v| !v.is_null())
}

/// Whether any of the keys is present on the object
pub fn has_any(value: &Value, keys: &[&str]) -> bool {
    field(value, keys).is_some()
}

/// Nested object under any of the keys
pub fn object<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    field(value, keys).filter(|v| v.is_object())
}

/// Scalar rendered as text; arrays and objects are rejected
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

/// Non-blank text field, or the default
pub fn text_or(value: &Value, keys: &[&str], default: &str) -> String {
    field(value, keys)
        .and_then(scalar_text)
        .unwrap_or_else(|| default.to_string())
}

/// List of non-blank strings, or the default when the list is missing or empty.
///
/// A bare string is accepted as a one-element list.
pub fn string_list_or(value: &Value, keys: &[&str], default: &[&str]) -> Vec<String> {
    let items: Vec<String> = match field(value, keys) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    };
    if items.is_empty() {
        default.iter().map(|s| s.to_string()).collect()
    } else {
        items
    }
}

/// Integer field; floats are rounded and numeric strings parsed
pub fn int_or(value: &Value, keys: &[&str], default: i64) -> i64 {
    field(value, keys).and_then(as_int).unwrap_or(default)
}

/// Interpret a JSON value as an integer score
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
            })
        }
        _ => None,
    }
}

/// Elements of an array field that are objects
pub fn object_list<'a>(value: &'a Value, keys: &[&str]) -> Vec<&'a Map<String, Value>> {
    match field(value, keys) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

/// Truncate text to a character budget for prompt excerpts
pub fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

/// Render a list as markdown bullets
pub fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
