//! Property values carried by normalized rows.
//!
//! Query results arrive as `serde_json::Value`. Conversion into
//! [`PropertyValue`] happens once, when a row is built, so formatters and the
//! card renderer never inspect raw JSON.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reference to another note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub path: String,
    pub display: Option<String>,
    #[serde(default)]
    pub embed: bool,
}

impl LinkRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display: None,
            embed: false,
        }
    }

    /// Parse `[[path]]`, `[[path|display]]` or `![[path]]`.
    pub fn from_wikilink(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let (embed, rest) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let inner = rest.strip_prefix("[[")?.strip_suffix("]]")?;
        let (path, display) = match inner.split_once('|') {
            Some((path, display)) => (path.trim(), Some(display.trim().to_string())),
            None => (inner.trim(), None),
        };
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path: path.to_string(),
            display: display.filter(|d| !d.is_empty()),
            embed,
        })
    }

    /// Text shown for the link: explicit display, else the file stem.
    pub fn display_text(&self) -> String {
        if let Some(display) = &self.display {
            return display.clone();
        }
        let name = self
            .path
            .rsplit('/')
            .next()
            .unwrap_or(self.path.as_str());
        let name = name.split('#').next().unwrap_or(name);
        name.strip_suffix(".md").unwrap_or(name).to_string()
    }
}

/// One property value of a normalized row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(NaiveDateTime),
    Link(LinkRef),
    List(Vec<PropertyValue>),
    Object(Row),
}

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$")
            .expect("regex")
    })
}

/// Parse an ISO date or date-time string. Offsets are converted to UTC.
pub fn parse_iso_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if !iso_date_pattern().is_match(text) {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M%z",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc).naive_utc());
        }
    }
    None
}

impl PropertyValue {
    /// Convert a raw result value.
    ///
    /// Objects with `path` and `type: "file"` become links; objects carrying
    /// a millisecond `ts` timestamp become dates. Strings stay strings: date
    /// detection for strings happens at formatting time.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => number
                .as_f64()
                .map(Self::Number)
                .unwrap_or_else(|| Self::String(number.to_string())),
            Value::String(text) => Self::String(text.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => {
                if let Some(link) = link_from_object(map) {
                    return Self::Link(link);
                }
                if let Some(date) = date_from_object(map) {
                    return Self::Date(date);
                }
                Self::Object(Row::from_map(map))
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Numeric view of the value; numeric strings are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(text) => text.trim().parse::<f64>().ok(),
            Self::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Plain-text rendering used for grouping keys and fallbacks.
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(flag) => flag.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(text) => text.clone(),
            Self::Date(date) => {
                if date.time() == chrono::NaiveTime::MIN {
                    date.format("%Y-%m-%d").to_string()
                } else {
                    date.format("%Y-%m-%dT%H:%M:%S").to_string()
                }
            }
            Self::Link(link) => link.display_text(),
            Self::List(items) => items
                .iter()
                .map(Self::to_plain_string)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            Self::Object(row) => row
                .iter()
                .map(|(name, value)| format!("{name}: {}", value.to_plain_string()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Decimal rendering without a trailing `.0` for integral values.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn link_from_object(map: &serde_json::Map<String, Value>) -> Option<LinkRef> {
    let path = map.get("path")?.as_str()?;
    let is_file = map
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t == "file" || t == "header" || t == "block");
    if !is_file {
        return None;
    }
    Some(LinkRef {
        path: path.to_string(),
        display: map
            .get("display")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        embed: map.get("embed").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn date_from_object(map: &serde_json::Map<String, Value>) -> Option<NaiveDateTime> {
    let ts = map.get("ts")?.as_f64()?;
    DateTime::<Utc>::from_timestamp_millis(ts as i64).map(|dt| dt.naive_utc())
}

/// Title/file field names, in lookup priority order.
pub const TITLE_FIELDS: &[&str] = &["file", "link", "title", "name"];

/// An ordered record of property values with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    entries: Vec<(String, PropertyValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &serde_json::Map<String, Value>) -> Self {
        let mut row = Self::new();
        for (name, value) in map {
            row.insert(name.clone(), PropertyValue::from_json(value));
        }
        row
    }

    /// Insert or replace `name`, keeping the first position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Exact match first, then a case-insensitive match.
    pub fn get_ci(&self, name: &str) -> Option<(&str, &PropertyValue)> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            })
            .map(|(existing, value)| (existing.as_str(), value))
    }

    /// The title/file reference: first non-null field among [`TITLE_FIELDS`].
    pub fn title_field(&self) -> Option<(&str, &PropertyValue)> {
        TITLE_FIELDS
            .iter()
            .filter_map(|field| self.get_ci(field))
            .find(|(_, value)| !value.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, PropertyValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_link_objects() {
        let value = PropertyValue::from_json(&json!({
            "path": "Books/Dune.md",
            "type": "file",
            "display": "Dune",
            "embed": false
        }));
        assert_eq!(
            value,
            PropertyValue::Link(LinkRef {
                path: "Books/Dune.md".to_string(),
                display: Some("Dune".to_string()),
                embed: false,
            })
        );
    }

    #[test]
    fn converts_timestamp_objects_to_dates() {
        let value = PropertyValue::from_json(&json!({"ts": 1709596800000i64, "zone": "UTC"}));
        let PropertyValue::Date(date) = value else {
            panic!("expected date, got {value:?}");
        };
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2024-03-05");
    }

    #[test]
    fn other_objects_stay_nested_rows() {
        let value = PropertyValue::from_json(&json!({"path": "x", "type": "folder"}));
        assert!(matches!(value, PropertyValue::Object(_)));
    }

    #[test]
    fn parses_iso_dates() {
        assert_eq!(
            parse_iso_date("2024-03-05").unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2024-03-05 00:00"
        );
        assert_eq!(
            parse_iso_date("2024-03-05T14:30:00Z").unwrap().format("%H:%M").to_string(),
            "14:30"
        );
        assert_eq!(
            parse_iso_date("2024-03-05T14:30").unwrap().format("%H:%M").to_string(),
            "14:30"
        );
        assert!(parse_iso_date("March 5").is_none());
        assert!(parse_iso_date("2024-13-45").is_none());
    }

    #[test]
    fn wikilink_parsing() {
        let link = LinkRef::from_wikilink("[[Notes/Note A|Note]]").unwrap();
        assert_eq!(link.path, "Notes/Note A");
        assert_eq!(link.display_text(), "Note");

        let embed = LinkRef::from_wikilink("![[cover.png]]").unwrap();
        assert!(embed.embed);
        assert_eq!(embed.display_text(), "cover.png");

        assert_eq!(LinkRef::new("Books/Dune.md").display_text(), "Dune");
        assert!(LinkRef::from_wikilink("[[]]").is_none());
        assert!(LinkRef::from_wikilink("plain").is_none());
    }

    #[test]
    fn row_lookup_is_case_insensitive_for_title() {
        let row: Row = [
            ("File".to_string(), PropertyValue::Link(LinkRef::new("a.md"))),
            ("rating".to_string(), PropertyValue::Number(4.0)),
        ]
        .into_iter()
        .collect();

        let (name, _) = row.title_field().unwrap();
        assert_eq!(name, "File");
        assert_eq!(row.get_ci("RATING"), Some(("rating", &PropertyValue::Number(4.0))));
    }

    #[test]
    fn row_insert_keeps_names_unique() {
        let mut row = Row::new();
        row.insert("a", PropertyValue::Number(1.0));
        row.insert("b", PropertyValue::Number(2.0));
        row.insert("a", PropertyValue::Number(3.0));
        let names: Vec<&str> = row.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&PropertyValue::Number(3.0)));
    }
}
