use anyhow::{Context, Result};
use doc_translator_core::{AppConfig, Pipeline};

/// Global application state
pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    /// Build the pipeline from configuration (opens the cache; fails fast if
    /// the disk cache is locked by another process).
    pub fn new(config: AppConfig) -> Result<Self> {
        let pipeline = Pipeline::new(config).context("Failed to initialize translation pipeline")?;
        Ok(Self { pipeline })
    }

    pub const fn with_pipeline(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Request body limit: the largest upload plus room for multipart framing.
    pub fn body_limit(&self) -> usize {
        self.pipeline.config().limits.max_upload_bytes + 1024 * 1024
    }
}
