//! # Progress Events
//!
//! Notifications published while an analysis runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stages::{StageProgress, TOTAL_STAGES};

/// An event about one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A stage finished (fired once per stage, in order)
    #[serde(rename_all = "camelCase")]
    StageProgress {
        analysis_id: String,
        current_stage: usize,
        total_stages: usize,
        stage_name: String,
        timestamp: DateTime<Utc>,
    },
    /// The analysis reached `completed`
    #[serde(rename_all = "camelCase")]
    AnalysisCompleted {
        analysis_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn stage_progress(analysis_id: &str, progress: StageProgress) -> Self {
        Self::StageProgress {
            analysis_id: analysis_id.to_string(),
            current_stage: progress.current_stage(),
            total_stages: TOTAL_STAGES,
            stage_name: progress.stage.key().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn completed(analysis_id: &str) -> Self {
        Self::AnalysisCompleted {
            analysis_id: analysis_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn analysis_id(&self) -> &str {
        match self {
            Self::StageProgress { analysis_id, .. } | Self::AnalysisCompleted { analysis_id, .. } => {
                analysis_id
            }
        }
    }

    /// Whether no further events follow for this analysis
    pub fn is_final(&self) -> bool {
        matches!(self, Self::AnalysisCompleted { .. })
    }
}
