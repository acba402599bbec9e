//! Rendering of query blocks into cards and kanban boards.
//!
//! The pipeline, leaves first:
//!
//! - [`parser`]: split a block into query and settings, extract column aliases
//! - [`shape`]: classify and normalize query results into rows
//! - [`tokenizer`] and [`format`]: turn property values into [`format::Node`] trees
//! - [`card`] and [`kanban`]: assemble cards, sections and boards
//! - [`image`]: resolve and load card images
//! - [`refresh`]: coalesce index changes and guard concurrent refreshes
//! - [`engine`]: [`BlockRenderer`], the entry point that ties it together

pub mod card;
pub mod engine;
pub mod errors;
pub mod format;
pub mod image;
pub mod kanban;
pub mod parser;
pub mod refresh;
pub mod shape;
pub mod tokenizer;
pub mod value;

pub use card::{Card, CardLayout, CardProperty, CardSection, CardTitle, render_card, render_cards, render_layout};
pub use engine::{BlockRenderer, QueryEngine, RenderOutput};
pub use errors::{RenderError, RenderResult};
pub use format::{Node, RenderContext, format_property};
pub use image::{ImageLoader, ImageOutcome, ImageSource};
pub use kanban::{KanbanBoard, KanbanColumn, NewTaskRequest, NoteWriter, VaultNoteWriter, build_board, group_rows};
pub use parser::{ParsedBlock, QueryType, parse_block};
pub use shape::{NormalizedResult, ShapeKind, is_empty_result, normalize};
pub use tokenizer::{Token, TokenKind, tokenize};
pub use value::{LinkRef, PropertyValue, Row};
