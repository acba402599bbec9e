//! Query engine backed by a recorded result file.

use std::path::{Path, PathBuf};

use cardview_render::{QueryEngine, RenderError, RenderResult};
use serde_json::Value;

/// Answers every query with the JSON stored in one file.
pub struct FixtureEngine {
    path: PathBuf,
}

impl FixtureEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl QueryEngine for FixtureEngine {
    async fn query(&self, query: &str) -> RenderResult<Value> {
        tracing::debug!(fixture = %self.path.display(), "answering query: {query}");
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RenderError::Execution(format!("cannot read {}: {e}", self.path.display())))?;
        Ok(serde_json::from_str(&content)?)
    }
}
