//! Per-block settings text.
//!
//! A block's settings section is a list of `key: value` lines. Values go
//! through a fixed ladder of interpretations: strict JSON, bracketed comma
//! list, numeric literal, boolean literal, and finally raw string.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

/// One layer of the settings cascade, keyed by option name.
pub type SettingsLayer = Map<String, Value>;

/// Keys whose bracketed values are always lists of bare names, never JSON.
const NAME_LIST_KEYS: &[&str] = &["properties", "exclude", "statusOrder", "statusOptions"];

fn numeric_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("regex"))
}

/// Parse a block's settings text into a layer.
///
/// Blank lines and `//` comments are skipped, as are lines without a
/// `key: value` shape. A repeated key keeps its last value.
pub fn parse_block_settings(text: &str) -> SettingsLayer {
    let mut layer = SettingsLayer::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }

        let Some((key, raw_value)) = trimmed.split_once(':') else {
            tracing::debug!("ignoring settings line without a key: {trimmed}");
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            tracing::debug!("ignoring settings line with invalid key: {trimmed}");
            continue;
        }

        let raw_value = raw_value.trim();
        let value = if NAME_LIST_KEYS.contains(&key) && is_bracketed(raw_value) {
            Value::Array(split_bracketed_list(raw_value))
        } else {
            parse_setting_value(raw_value)
        };
        layer.insert(key.to_string(), value);
    }

    layer
}

/// Interpret one raw settings value.
pub fn parse_setting_value(raw: &str) -> Value {
    let raw = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }

    if is_bracketed(raw) {
        return Value::Array(split_bracketed_list(raw));
    }

    if numeric_pattern().is_match(raw)
        && let Ok(number) = raw.parse::<f64>()
        && let Some(number) = Number::from_f64(number)
    {
        return Value::Number(number);
    }

    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    Value::String(raw.to_string())
}

fn is_bracketed(raw: &str) -> bool {
    raw.len() >= 2 && raw.starts_with('[') && raw.ends_with(']')
}

/// `[a, "b", 'c']` → `["a", "b", "c"]`; items are not parsed further.
fn split_bracketed_list(raw: &str) -> Vec<Value> {
    let inner = &raw[1..raw.len() - 1];
    split_outside_quotes(inner)
        .into_iter()
        .map(|item| strip_quotes(item.trim()))
        .filter(|item| !item.is_empty())
        .map(|item| Value::String(item.to_string()))
        .collect()
}

/// Split on commas that are not inside a quoted item.
fn split_outside_quotes(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, c) in inner.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(open), _) if c == open => quote = None,
            (None, ',') => {
                items.push(&inner[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);
    items
}

fn strip_quotes(item: &str) -> &str {
    for quote in ['"', '\''] {
        if item.len() >= 2 && item.starts_with(quote) && item.ends_with(quote) {
            return &item[1..item.len() - 1];
        }
    }
    item
}

/// Merge layers from lowest to highest precedence.
///
/// Later layers replace earlier values key by key. Nested objects and lists
/// are replaced wholesale, never merged.
pub fn merge_layers(layers: &[&SettingsLayer]) -> SettingsLayer {
    let mut merged = SettingsLayer::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
