//! # Pipeline Stages
//!
//! Defines the five stages of the analysis pipeline and their fixed order.

use serde::{Deserialize, Serialize};

/// Number of stages in one analysis run
pub const TOTAL_STAGES: usize = 5;

/// Stage of the analysis pipeline, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageKind {
    /// Condensing the raw idea
    Summary,
    /// Identifying target users
    TargetUser,
    /// Sizing the market and competition
    MarketAnalysis,
    /// Recommending an execution strategy
    Strategy,
    /// Scoring the venture against the rubric
    #[serde(rename = "score")]
    Scoring,
}

impl StageKind {
    /// All stages in execution order
    pub const ALL: [StageKind; TOTAL_STAGES] = [
        StageKind::Summary,
        StageKind::TargetUser,
        StageKind::MarketAnalysis,
        StageKind::Strategy,
        StageKind::Scoring,
    ];

    /// Key under which the stage's result is stored
    pub fn key(&self) -> &'static str {
        match self {
            StageKind::Summary => "summary",
            StageKind::TargetUser => "targetUser",
            StageKind::MarketAnalysis => "marketAnalysis",
            StageKind::Strategy => "strategy",
            StageKind::Scoring => "score",
        }
    }

    /// 1-based position, as reported to progress observers
    pub fn number(&self) -> usize {
        match self {
            StageKind::Summary => 1,
            StageKind::TargetUser => 2,
            StageKind::MarketAnalysis => 3,
            StageKind::Strategy => 4,
            StageKind::Scoring => 5,
        }
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            StageKind::Summary => "Idea Summary",
            StageKind::TargetUser => "Target Users",
            StageKind::MarketAnalysis => "Market Analysis",
            StageKind::Strategy => "Strategy",
            StageKind::Scoring => "Scoring",
        }
    }

    /// Upstream stages whose results this stage reads
    pub fn dependencies(&self) -> &'static [StageKind] {
        match self {
            StageKind::Summary => &[],
            StageKind::TargetUser => &[StageKind::Summary],
            StageKind::MarketAnalysis => &[StageKind::Summary, StageKind::TargetUser],
            StageKind::Strategy => &[
                StageKind::Summary,
                StageKind::TargetUser,
                StageKind::MarketAnalysis,
            ],
            StageKind::Scoring => &[
                StageKind::Summary,
                StageKind::TargetUser,
                StageKind::MarketAnalysis,
                StageKind::Strategy,
            ],
        }
    }
}

/// Progress notification handed to the stage-complete callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageProgress {
    /// Stage that just finished
    pub stage: StageKind,
    /// Whether it finished with its fallback result
    pub fell_back: bool,
}

impl StageProgress {
    /// 1-based stage number
    pub fn current_stage(&self) -> usize {
        self.stage.number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_matches_numbers() {
        for (i, stage) in StageKind::ALL.iter().enumerate() {
            assert_eq!(stage.number(), i + 1);
        }
    }

    #[test]
    fn test_dependencies_only_point_upstream() {
        for stage in StageKind::ALL {
            for dep in stage.dependencies() {
                assert!(dep < &stage, "{:?} depends on later stage {:?}", stage, dep);
            }
        }
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&StageKind::TargetUser).unwrap();
        assert_eq!(json, "\"targetUser\"");
        let json = serde_json::to_string(&StageKind::Scoring).unwrap();
        assert_eq!(json, "\"score\"");
    }
}
