//! Block rendering entry point.
//!
//! [`BlockRenderer::render_block`] runs the whole pipeline for one block:
//! parse, resolve settings, query, emptiness check, normalize, then cards or
//! a kanban board. It never returns an error; failures become
//! [`RenderOutput::Error`].

use std::sync::Arc;
use std::time::Duration;

use cardview_core::config::{ViewMode, builtin_defaults, merge, parse_block_settings};
use cardview_core::{DeviceClass, EffectiveSettings, Settings, SettingsLayer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::card::{CardLayout, render_layout};
use crate::errors::{RenderError, RenderResult};
use crate::format::RenderContext;
use crate::kanban::{KanbanBoard, NewTaskRequest, NoteWriter, build_board, create_task};
use crate::parser::{ParsedBlock, parse_block};
use crate::refresh::{RefreshGuard, run_debounced};
use crate::shape::{is_empty_result, normalize};

/// The external query engine.
#[async_trait::async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, query: &str) -> RenderResult<Value>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output", rename_all = "snake_case")]
pub enum RenderOutput {
    Cards(CardLayout),
    Kanban(KanbanBoard),
    Empty { message: String },
    Error { kind: String, message: String },
}

impl From<RenderError> for RenderOutput {
    fn from(err: RenderError) -> Self {
        Self::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

pub struct BlockRenderer {
    engine: Arc<dyn QueryEngine>,
    plugin: SettingsLayer,
    device: DeviceClass,
    debounce: Duration,
    debug_all: bool,
    refresh: RefreshGuard,
}

impl BlockRenderer {
    pub fn new(engine: Arc<dyn QueryEngine>, plugin: SettingsLayer, device: DeviceClass) -> Self {
        Self {
            engine,
            plugin,
            device,
            debounce: Duration::from_millis(1000),
            debug_all: false,
            refresh: RefreshGuard::new(),
        }
    }

    /// Renderer configured from the settings file.
    pub fn from_settings(engine: Arc<dyn QueryEngine>, settings: &Settings, device: DeviceClass) -> Self {
        Self {
            debounce: Duration::from_millis(settings.refresh.debounce_ms),
            debug_all: settings.logging.debug,
            ..Self::new(engine, settings.cards.clone(), device)
        }
    }

    /// Effective settings for a parsed block. Aliases declared in the query
    /// take precedence over configured ones.
    pub fn effective_settings(&self, parsed: &ParsedBlock) -> EffectiveSettings {
        let block = parse_block_settings(&parsed.settings_text);
        let mut settings = merge(&builtin_defaults(), &self.plugin, &block, self.device);
        if !parsed.aliases.is_empty() {
            let configured = std::mem::take(&mut settings.aliases);
            settings.aliases = parsed.aliases.iter().cloned().chain(configured).collect();
        }
        settings.debug |= self.debug_all;
        settings
    }

    /// Render one block. Every failure is turned into an error output.
    pub async fn render_block(&self, raw: &str) -> RenderOutput {
        match self.try_render(raw).await {
            Ok(output) => output,
            Err(err) => {
                warn!("block render failed ({}): {err}", err.kind());
                err.into()
            }
        }
    }

    async fn try_render(&self, raw: &str) -> RenderResult<RenderOutput> {
        let parsed = parse_block(raw);
        let settings = self.effective_settings(&parsed);
        let ctx = RenderContext::new(&settings);

        if ctx.debug() {
            debug!(
                query = %parsed.query,
                query_type = parsed.query_type.as_str(),
                aliases = parsed.aliases.len(),
                view = ?settings.view,
                preset = settings.preset.as_str(),
                mobile = settings.mobile,
                "rendering block"
            );
        }

        let result = self.engine.query(&parsed.query).await?;
        if let Some(message) = failure_message(&result) {
            return Err(RenderError::Execution(message));
        }

        if is_empty_result(&result) {
            if ctx.debug() {
                debug!("query returned no results");
            }
            return Ok(RenderOutput::Empty {
                message: settings.empty_message.clone(),
            });
        }

        let normalized = normalize(&result)?;
        if ctx.debug() {
            debug!(shape = ?normalized.shape, rows = normalized.rows.len(), "normalized result");
        }

        Ok(match settings.view {
            ViewMode::Cards => RenderOutput::Cards(render_layout(&ctx, &normalized)),
            ViewMode::Kanban => RenderOutput::Kanban(build_board(&ctx, &normalized)),
        })
    }

    /// Re-render every block. Returns `None` when a refresh is already
    /// running; that request is dropped.
    pub async fn refresh_all(&self, blocks: &[String]) -> Option<Vec<RenderOutput>> {
        let Some(_ticket) = self.refresh.try_begin() else {
            debug!("refresh already in progress, dropping request");
            return None;
        };

        let mut outputs = Vec::with_capacity(blocks.len());
        for block in blocks {
            outputs.push(self.render_block(block).await);
        }
        Some(outputs)
    }

    /// Debounce index-change notifications into refreshes of `blocks`,
    /// sending each refresh's outputs on `outputs`. Ends when `changes`
    /// closes.
    pub async fn watch_index(
        &self,
        changes: mpsc::UnboundedReceiver<()>,
        blocks: Vec<String>,
        outputs: mpsc::UnboundedSender<Vec<RenderOutput>>,
    ) {
        run_debounced(changes, self.debounce, || {
            let blocks = blocks.clone();
            let outputs = outputs.clone();
            async move {
                if let Some(rendered) = self.refresh_all(&blocks).await {
                    let _ = outputs.send(rendered);
                }
            }
        })
        .await;
    }

    /// Create the note behind a kanban "new task" form, then re-render the
    /// block it came from. Returns the created note's path, or `None` with an
    /// error output when the note could not be written.
    pub async fn create_task(
        &self,
        raw: &str,
        writer: &dyn NoteWriter,
        request: &NewTaskRequest,
    ) -> (Option<String>, RenderOutput) {
        let parsed = parse_block(raw);
        let settings = self.effective_settings(&parsed);
        match create_task(&settings, writer, request).await {
            Ok(path) => (Some(path), self.render_block(raw).await),
            Err(err) => {
                warn!("new task not created ({}): {err}", err.kind());
                (None, err.into())
            }
        }
    }
}

/// Error message of an engine response that reports failure in-band.
fn failure_message(result: &Value) -> Option<String> {
    let map = result.as_object()?;
    if map.get("successful").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    Some(
        map.get("error")
            .and_then(Value::as_str)
            .unwrap_or("query engine reported failure")
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticEngine(Value);

    #[async_trait::async_trait]
    impl QueryEngine for StaticEngine {
        async fn query(&self, _query: &str) -> RenderResult<Value> {
            Ok(self.0.clone())
        }
    }

    fn renderer(result: Value) -> BlockRenderer {
        BlockRenderer::new(Arc::new(StaticEngine(result)), SettingsLayer::new(), DeviceClass::Desktop)
    }

    #[test]
    fn failure_messages() {
        assert_eq!(
            failure_message(&json!({"successful": false, "error": "bad query"})),
            Some("bad query".to_string())
        );
        assert_eq!(failure_message(&json!({"successful": true, "value": []})), None);
        assert_eq!(failure_message(&json!([])), None);
    }

    #[tokio::test]
    async fn in_band_failure_becomes_execution_error() {
        let output = renderer(json!({"successful": false, "error": "Unrecognized query"}))
            .render_block("FROM #x")
            .await;
        assert_eq!(
            output,
            RenderOutput::Error {
                kind: "execution".into(),
                message: "query failed: Unrecognized query".into()
            }
        );
    }

    #[tokio::test]
    async fn empty_result_uses_configured_message() {
        let output = renderer(json!({"headers": ["File"], "values": []}))
            .render_block("TABLE FROM #x\n---\nemptyMessage: Nothing yet")
            .await;
        assert_eq!(
            output,
            RenderOutput::Empty {
                message: "Nothing yet".into()
            }
        );
    }

    #[tokio::test]
    async fn unsupported_shape_is_an_error_output() {
        let output = renderer(json!("just a string")).render_block("LIST").await;
        assert!(matches!(output, RenderOutput::Error { kind, .. } if kind == "shape"));
    }

    #[test]
    fn block_aliases_come_first() {
        let mut plugin = SettingsLayer::new();
        plugin.insert(
            "aliases".into(),
            json!([{"original": "rating", "alias": "Stars", "expression": "rating"}]),
        );
        let renderer = BlockRenderer::new(Arc::new(StaticEngine(json!([]))), plugin, DeviceClass::Desktop);
        let parsed = parse_block("TABLE rating AS \"Score\" FROM #books");
        let settings = renderer.effective_settings(&parsed);
        assert_eq!(settings.aliases.len(), 2);
        assert_eq!(settings.display_name("rating"), "Score");
    }
}
