//! Result shape classification and normalization.
//!
//! The query engine answers in one of several JSON shapes. [`classify`] picks
//! exactly one [`ShapeKind`] per result, and [`normalize`] turns the result
//! into rows so nothing downstream looks at raw JSON again.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{RenderError, RenderResult};
use crate::value::{PropertyValue, Row};

/// Keys that describe a result rather than carry data.
pub const METADATA_KEYS: &[&str] = &[
    "type",
    "successful",
    "status",
    "headers",
    "idMeaning",
    "primaryMeaning",
    "meta",
];

/// Field name used for scalar items that have no name of their own.
pub const VALUE_FIELD: &str = "value";

/// Field name used for link items of a list result.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// TABLE query with GROUP BY (`idMeaning.type == "group"`).
    GroupedTable,
    /// LIST query with GROUP BY (`primaryMeaning.type == "group"`).
    GroupedList,
    /// Sequence of `{key, rows: [...]}` groups.
    LegacyGrouped,
    Tabular,
    Array,
    Object,
}

impl ShapeKind {
    pub fn is_grouped(&self) -> bool {
        matches!(
            self,
            Self::GroupedTable | Self::GroupedList | Self::LegacyGrouped
        )
    }
}

/// One bucket of a grouped result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultGroup {
    pub key: String,
    pub rows: Vec<Row>,
    /// False when the engine only returned aggregates for this group.
    pub detail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub shape: ShapeKind,
    /// Every row, group rows flattened in group order.
    pub rows: Vec<Row>,
    pub groups: Option<Vec<ResultGroup>>,
    /// Field the engine grouped by, when it says so.
    pub group_key_field: Option<String>,
}

impl NormalizedResult {
    fn flat(shape: ShapeKind, rows: Vec<Row>) -> Self {
        Self {
            shape,
            rows,
            groups: None,
            group_key_field: None,
        }
    }

    fn grouped(shape: ShapeKind, groups: Vec<ResultGroup>, group_key_field: Option<String>) -> Self {
        let rows = groups.iter().flat_map(|g| g.rows.iter().cloned()).collect();
        Self {
            shape,
            rows,
            groups: Some(groups),
            group_key_field,
        }
    }
}

/// The single emptiness check applied to every raw result before rendering.
pub fn is_empty_result(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => {
            let empty_container = ["values", "data", "rows"]
                .iter()
                .any(|key| map.get(*key).and_then(Value::as_array).is_some_and(Vec::is_empty));
            if empty_container {
                return true;
            }
            map.iter()
                .filter(|(key, _)| !METADATA_KEYS.contains(&key.as_str()))
                .all(|(_, value)| value.as_array().is_some_and(Vec::is_empty))
        }
        _ => false,
    }
}

fn group_meaning<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key)
        .and_then(Value::as_object)
        .filter(|meaning| meaning.get("type").and_then(Value::as_str) == Some("group"))
}

fn is_legacy_group(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|group| group.contains_key("key") && group.get("rows").is_some_and(Value::is_array))
}

fn legacy_groups(raw: &Value) -> Option<&Vec<Value>> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Object(map) => map.get("values")?.as_array()?,
        _ => return None,
    };
    (!items.is_empty() && items.iter().all(is_legacy_group)).then_some(items)
}

/// Decide the shape of a raw result. First match wins.
pub fn classify(raw: &Value) -> Option<ShapeKind> {
    if let Value::Object(map) = raw {
        if group_meaning(map, "idMeaning").is_some() {
            return Some(ShapeKind::GroupedTable);
        }
        if group_meaning(map, "primaryMeaning").is_some() {
            return Some(ShapeKind::GroupedList);
        }
    }
    if legacy_groups(raw).is_some() {
        return Some(ShapeKind::LegacyGrouped);
    }
    match raw {
        Value::Object(map)
            if map.get("headers").is_some_and(Value::is_array)
                && map.get("values").is_some_and(Value::is_array) =>
        {
            Some(ShapeKind::Tabular)
        }
        Value::Array(_) => Some(ShapeKind::Array),
        Value::Object(_) => Some(ShapeKind::Object),
        _ => None,
    }
}

/// Normalize a raw result into rows (and groups, for grouped shapes).
pub fn normalize(raw: &Value) -> RenderResult<NormalizedResult> {
    let shape = classify(raw).ok_or_else(|| RenderError::UnsupportedShape(describe(raw)))?;

    let result = match (shape, raw) {
        (ShapeKind::GroupedTable, Value::Object(map)) => grouped_table(map),
        (ShapeKind::GroupedList, Value::Object(map)) => grouped_list(map),
        (ShapeKind::LegacyGrouped, _) => {
            let groups: Vec<ResultGroup> = legacy_groups(raw)
                .map(|items| items.iter().filter_map(legacy_group).collect())
                .unwrap_or_default();
            NormalizedResult::grouped(shape, groups, None)
        }
        (ShapeKind::Tabular, Value::Object(map)) => tabular(map),
        (ShapeKind::Array, Value::Array(items)) => NormalizedResult::flat(shape, item_rows(items)),
        (ShapeKind::Object, Value::Object(map)) => {
            match ["values", "data"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array))
            {
                Some(items) => NormalizedResult::flat(ShapeKind::Array, item_rows(items)),
                None => NormalizedResult::flat(shape, vec![Row::from_map(map)]),
            }
        }
        _ => return Err(RenderError::UnsupportedShape(describe(raw))),
    };

    tracing::debug!(
        shape = ?result.shape,
        rows = result.rows.len(),
        groups = ?result.groups.as_ref().map(Vec::len),
        "normalized query result"
    );
    Ok(result)
}

fn describe(raw: &Value) -> String {
    match raw {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
    }
}

/// Row for one item of a list-like result.
fn item_row(item: &Value) -> Row {
    match item {
        Value::Object(map) => match PropertyValue::from_json(item) {
            value @ (PropertyValue::Link(_) | PropertyValue::Date(_)) => {
                let field = if matches!(value, PropertyValue::Link(_)) {
                    FILE_FIELD
                } else {
                    VALUE_FIELD
                };
                [(field.to_string(), value)].into_iter().collect()
            }
            _ => Row::from_map(map),
        },
        other => [(VALUE_FIELD.to_string(), PropertyValue::from_json(other))]
            .into_iter()
            .collect(),
    }
}

fn item_rows(items: &[Value]) -> Vec<Row> {
    items.iter().map(item_row).collect()
}

fn headers(map: &Map<String, Value>) -> Vec<String> {
    map.get("headers")
        .and_then(Value::as_array)
        .map(|headers| {
            headers
                .iter()
                .map(|h| match h {
                    Value::String(s) => s.clone(),
                    other => PropertyValue::from_json(other).to_plain_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn header_name(headers: &[String], index: usize) -> String {
    headers
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("column{}", index + 1))
}

fn tabular(map: &Map<String, Value>) -> NormalizedResult {
    let headers = headers(map);
    let rows: Vec<Row> = map
        .get("values")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .map(|value| match value {
                    Value::Array(cells) => cells
                        .iter()
                        .enumerate()
                        .map(|(i, cell)| (header_name(&headers, i), PropertyValue::from_json(cell)))
                        .collect::<Row>(),
                    other => item_row(other),
                })
                .collect()
        })
        .unwrap_or_default();
    NormalizedResult::flat(ShapeKind::Tabular, rows)
}

fn group_key(value: &Value) -> String {
    PropertyValue::from_json(value).to_plain_string()
}

/// `values` entries are `[key, column1, column2, ...]`. Array columns hold
/// one value per grouped row and are zipped back into rows; scalar columns
/// are aggregates repeated on every rebuilt row.
fn grouped_table(map: &Map<String, Value>) -> NormalizedResult {
    let headers = headers(map);
    let key_field = group_meaning(map, "idMeaning")
        .and_then(|meaning| meaning.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| headers.first().cloned());

    let groups: Vec<ResultGroup> = map
        .get("values")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_array)
                .filter_map(|entry| {
                    let (key, columns) = entry.split_first()?;
                    Some(zip_group(&headers, key, columns, key_field.as_deref()))
                })
                .collect()
        })
        .unwrap_or_default();

    NormalizedResult::grouped(ShapeKind::GroupedTable, groups, key_field)
}

fn zip_group(headers: &[String], key: &Value, columns: &[Value], key_field: Option<&str>) -> ResultGroup {
    let key_name = key_field
        .map(str::to_string)
        .unwrap_or_else(|| header_name(headers, 0));
    let key_value = PropertyValue::from_json(key);

    let row_count = columns
        .iter()
        .filter_map(Value::as_array)
        .map(Vec::len)
        .max();

    let build_row = |index: Option<usize>| -> Row {
        let mut row = Row::new();
        row.insert(key_name.clone(), key_value.clone());
        for (i, column) in columns.iter().enumerate() {
            let cell = match (column, index) {
                (Value::Array(cells), Some(index)) => cells.get(index).unwrap_or(&Value::Null),
                (other, _) => other,
            };
            row.insert(header_name(headers, i + 1), PropertyValue::from_json(cell));
        }
        row
    };

    match row_count {
        Some(count) => ResultGroup {
            key: group_key(key),
            rows: (0..count).map(|i| build_row(Some(i))).collect(),
            detail: true,
        },
        None => ResultGroup {
            key: group_key(key),
            rows: vec![build_row(None)],
            detail: false,
        },
    }
}

/// `values` entries are `{primary|key, value|rows: [...]}` or `[key, [...]]`.
fn grouped_list(map: &Map<String, Value>) -> NormalizedResult {
    let key_field = group_meaning(map, "primaryMeaning")
        .and_then(|meaning| meaning.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let groups: Vec<ResultGroup> = map
        .get("values")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|entry| {
                    let (key, items) = match entry {
                        Value::Object(group) => (
                            group.get("primary").or_else(|| group.get("key"))?,
                            group.get("value").or_else(|| group.get("rows"))?,
                        ),
                        Value::Array(pair) if pair.len() == 2 => (&pair[0], &pair[1]),
                        _ => return None,
                    };
                    let rows = match items {
                        Value::Array(items) => item_rows(items),
                        other => vec![item_row(other)],
                    };
                    Some(ResultGroup {
                        key: group_key(key),
                        rows,
                        detail: true,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    NormalizedResult::grouped(ShapeKind::GroupedList, groups, key_field)
}

fn legacy_group(value: &Value) -> Option<ResultGroup> {
    let group = value.as_object()?;
    let rows = group.get("rows")?.as_array()?;
    Some(ResultGroup {
        key: group_key(group.get("key")?),
        rows: item_rows(rows),
        detail: true,
    })
}
