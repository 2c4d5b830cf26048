//! # Pipeline Configuration
//!
//! Everything the orchestrator and the job wrapper need to be built,
//! persisted at `.ideaforge/config.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::ModelConfig;
use crate::skills::market_analysis_skill::MarketDataMode;
use crate::skills::scoring_skill::ScoringConfig;

/// Default on-disk location
pub const DEFAULT_CONFIG_PATH: &str = ".ideaforge/config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model used by every stage
    pub model: ModelConfig,
    /// Market-analysis retrieval mode (degrades on failure)
    pub market_data_mode: MarketDataMode,
    pub scoring: ScoringConfig,
    /// Per-stage limit; `None` relies on the model client's own timeout
    pub stage_timeout_secs: Option<u64>,
    /// Custom SearXNG instance URL (overrides `SEARXNG_URL`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searxng_url: Option<String>,
}

impl PipelineConfig {
    /// Load from a JSON file; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}
