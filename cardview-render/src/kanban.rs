//! Kanban grouping, board assembly and new-task notes.
//!
//! Rows are partitioned by the `groupBy` field. Column order follows
//! `statusOrder` when it is set (listed keys first, even when empty, then
//! unlisted keys in encounter order); without it columns sort by key.

use std::path::{Component, Path, PathBuf};

use cardview_core::EffectiveSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::card::{Card, render_cards};
use crate::errors::{RenderError, RenderResult};
use crate::format::{RenderContext, palette_color};
use crate::shape::{NormalizedResult, ShapeKind};
use crate::value::Row;

/// Key of the column holding rows without a group value.
pub const NO_VALUE_KEY: &str = "No value";

/// Shown instead of cards for TABLE queries that group with GROUP BY.
pub const GROUPED_TABLE_NOTICE: &str = "Kanban view cannot show TABLE queries that use GROUP BY. \
     Remove GROUP BY from the query and set groupBy in the block settings instead.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnColor {
    pub hex: String,
    pub rgb: (u8, u8, u8),
}

/// Parse a palette name or a `#rgb` / `#rrggbb` hex color.
pub fn parse_color(value: &str) -> Option<ColumnColor> {
    let hex = palette_color(value).unwrap_or(value).trim();
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok();
    let rgb = (channel(0)?, channel(2)?, channel(4)?);
    Some(ColumnColor {
        hex: format!("#{}", expanded.to_ascii_lowercase()),
        rgb,
    })
}

/// Column identifier: lowercase, non-alphanumeric runs collapsed to `-`.
pub fn column_id(key: &str) -> String {
    let mut id = String::with_capacity(key.len());
    let mut pending_dash = false;
    for c in key.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !id.is_empty() {
                id.push('-');
            }
            pending_dash = false;
            id.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    id
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanColumn {
    pub key: String,
    pub id: String,
    pub rows: Vec<Row>,
    pub color: Option<ColumnColor>,
}

impl KanbanColumn {
    fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            id: column_id(&key),
            key,
            rows: Vec::new(),
            color: None,
        }
    }
}

/// Grouping key of `row`, or [`NO_VALUE_KEY`] when the field is missing
/// or blank.
pub fn group_key(row: &Row, field: &str) -> String {
    let key = row
        .get_ci(field)
        .map(|(_, value)| value.to_plain_string())
        .unwrap_or_default();
    let key = key.trim();
    if key.is_empty() {
        NO_VALUE_KEY.to_string()
    } else {
        key.to_string()
    }
}

/// Partition rows by `field`. Keys with the same [`column_id`] share a
/// column under the first spelling seen. Row order inside a column is
/// first-seen order.
pub fn group_rows(rows: &[Row], field: &str, status_order: Option<&[String]>) -> Vec<KanbanColumn> {
    let mut columns: Vec<KanbanColumn> = Vec::new();
    for row in rows {
        push_rows(&mut columns, group_key(row, field), std::slice::from_ref(row));
    }
    order_columns(columns, status_order)
}

fn push_rows(columns: &mut Vec<KanbanColumn>, key: String, rows: &[Row]) {
    let id = column_id(&key);
    match columns.iter_mut().find(|column| column.id == id) {
        Some(column) => column.rows.extend_from_slice(rows),
        None => {
            let mut column = KanbanColumn::new(key);
            column.rows = rows.to_vec();
            columns.push(column);
        }
    }
}

fn order_columns(mut columns: Vec<KanbanColumn>, status_order: Option<&[String]>) -> Vec<KanbanColumn> {
    let Some(order) = status_order.filter(|order| !order.is_empty()) else {
        columns.sort_by_key(|column| column.key.to_lowercase());
        return columns;
    };

    let mut ordered = Vec::with_capacity(columns.len().max(order.len()));
    for listed in order {
        let id = column_id(listed);
        if ordered.iter().any(|c: &KanbanColumn| c.id == id) {
            continue;
        }
        match columns.iter().position(|column| column.id == id) {
            Some(index) => {
                let mut column = columns.remove(index);
                column.key = listed.clone();
                ordered.push(column);
            }
            None => ordered.push(KanbanColumn::new(listed.clone())),
        }
    }
    ordered.extend(columns);
    ordered
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardColumn {
    pub key: String,
    pub id: String,
    pub color: Option<ColumnColor>,
    pub cards: Vec<Card>,
    /// Message shown instead of cards.
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanBoard {
    pub group_by: String,
    pub columns: Vec<BoardColumn>,
    pub show_new_task_button: bool,
}

fn column_color(settings: &EffectiveSettings, column: &KanbanColumn) -> Option<ColumnColor> {
    let (_, value) = settings
        .kanban
        .column_colors
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&column.key) || **name == column.id)?;
    let color = parse_color(value);
    if color.is_none() {
        tracing::warn!("ignoring invalid color '{value}' for column '{}'", column.key);
    }
    color
}

/// Build the board for a normalized result.
///
/// A TABLE result grouped with GROUP BY only carries per-group aggregates,
/// so it gets a single placeholder column. Other grouped results use the
/// engine's groups as columns.
pub fn build_board(ctx: &RenderContext<'_>, result: &NormalizedResult) -> KanbanBoard {
    let settings = ctx.settings;
    let group_by = result
        .group_key_field
        .clone()
        .filter(|_| result.shape.is_grouped())
        .unwrap_or_else(|| settings.kanban.group_by.clone());
    let show_new_task_button = settings.kanban.show_new_task_button;

    if result.shape == ShapeKind::GroupedTable {
        tracing::debug!("grouped TABLE result in kanban view, rendering placeholder");
        let key = group_by.clone();
        return KanbanBoard {
            columns: vec![BoardColumn {
                id: column_id(&key),
                key,
                color: None,
                cards: Vec::new(),
                placeholder: Some(GROUPED_TABLE_NOTICE.to_string()),
            }],
            group_by,
            show_new_task_button: false,
        };
    }

    let status_order = settings.kanban.status_order.as_deref();
    let columns = match &result.groups {
        Some(groups) => {
            let mut columns = Vec::with_capacity(groups.len());
            for group in groups {
                push_rows(&mut columns, group.key.clone(), &group.rows);
            }
            order_columns(columns, status_order)
        }
        None => group_rows(&result.rows, &group_by, status_order),
    };

    let columns = columns
        .into_iter()
        .map(|mut column| {
            column.color = column_color(settings, &column);
            BoardColumn {
                cards: render_cards(ctx, &column.rows),
                color: column.color,
                key: column.key,
                id: column.id,
                placeholder: None,
            }
        })
        .collect();

    KanbanBoard {
        group_by,
        columns,
        show_new_task_button,
    }
}

// ── new task notes ─────────────────────────────────────────────────

/// A request from a column's "new task" form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaskRequest {
    pub title: String,
    pub column_key: String,
}

/// Writes new notes into the vault.
#[async_trait::async_trait]
pub trait NoteWriter: Send + Sync {
    /// Create `folder/file_name` with `contents`; returns the vault-relative
    /// path. Fails when the note already exists.
    async fn create_note(&self, folder: &str, file_name: &str, contents: &str) -> RenderResult<String>;
}

/// [`NoteWriter`] over a vault directory on disk.
#[derive(Debug, Clone)]
pub struct VaultNoteWriter {
    root: PathBuf,
}

impl VaultNoteWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl NoteWriter for VaultNoteWriter {
    async fn create_note(&self, folder: &str, file_name: &str, contents: &str) -> RenderResult<String> {
        let folder = folder.trim().trim_end_matches('/');
        ensure_inside_vault(folder)?;
        let dir = if folder.is_empty() {
            self.root.clone()
        } else {
            self.root.join(folder)
        };
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(file_name);
        if tokio::fs::try_exists(&path).await? {
            return Err(RenderError::NoteExists(path));
        }

        let tmp_path = dir.join(format!(".{file_name}.tmp"));
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        let relative = if folder.is_empty() {
            file_name.to_string()
        } else {
            format!("{folder}/{file_name}")
        };
        tracing::debug!(path = %relative, "created kanban task note");
        Ok(relative)
    }
}

/// Reject folders that would resolve outside the vault root.
fn ensure_inside_vault(folder: &str) -> RenderResult<()> {
    let escapes = Path::new(folder).components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(RenderError::InvalidFolder(folder.to_string()));
    }
    Ok(())
}

const FORBIDDEN_TITLE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '#', '^', '[', ']'];

fn yaml_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => serde_json::to_string(text).unwrap_or_else(|_| format!("\"{text}\"")),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// File name and contents of the note for `request`.
pub fn new_task_note(settings: &EffectiveSettings, request: &NewTaskRequest) -> RenderResult<(String, String)> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(RenderError::MissingField("title"));
    }
    if title.contains(FORBIDDEN_TITLE_CHARS) || title.starts_with('.') {
        return Err(RenderError::InvalidTitle(title.to_string()));
    }

    let field = settings.kanban.group_by.as_str();
    let mut frontmatter = vec![format!("title: {}", yaml_scalar(&Value::String(title.to_string())))];
    if request.column_key != NO_VALUE_KEY && !request.column_key.trim().is_empty() {
        frontmatter.push(format!(
            "{field}: {}",
            yaml_scalar(&Value::String(request.column_key.clone()))
        ));
    }
    for (name, value) in &settings.kanban.new_task_template {
        if name == "title" || name.eq_ignore_ascii_case(field) {
            continue;
        }
        frontmatter.push(format!("{name}: {}", yaml_scalar(value)));
    }

    let contents = format!("---\n{}\n---\n\n# {title}\n", frontmatter.join("\n"));
    Ok((format!("{title}.md"), contents))
}

/// Write the note for `request` into `newTaskFolder`.
pub async fn create_task(
    settings: &EffectiveSettings,
    writer: &dyn NoteWriter,
    request: &NewTaskRequest,
) -> RenderResult<String> {
    let (file_name, contents) = new_task_note(settings, request)?;
    ensure_inside_vault(settings.kanban.new_task_folder.trim())?;
    writer
        .create_note(&settings.kanban.new_task_folder, &file_name, &contents)
        .await
}
