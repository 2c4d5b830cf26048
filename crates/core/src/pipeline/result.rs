//! # Aggregate Result
//!
//! The union of all five stage results plus run metadata.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stages::{StageKind, TOTAL_STAGES};
use crate::skills::context::{StageContext, StageOutput};
use crate::skills::market_analysis_skill::MarketAnalysisResult;
use crate::skills::scoring_skill::ScoringResult;
use crate::skills::strategy_skill::StrategyResult;
use crate::skills::summary_skill::SummaryResult;
use crate::skills::target_user_skill::TargetUserResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub agents_total: usize,
    pub agents_completed: usize,
    pub agents_failed: usize,
    /// Some but not all stages fell back
    pub partial_success: bool,
}

impl AnalysisMetadata {
    pub fn from_failures(agents_failed: usize) -> Self {
        let agents_failed = agents_failed.min(TOTAL_STAGES);
        Self {
            agents_total: TOTAL_STAGES,
            agents_completed: TOTAL_STAGES - agents_failed,
            agents_failed,
            partial_success: agents_failed > 0 && agents_failed < TOTAL_STAGES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub summary: SummaryResult,
    pub target_user: TargetUserResult,
    pub market_analysis: MarketAnalysisResult,
    pub strategy: StrategyResult,
    pub score: ScoringResult,
    pub analyzed_at: DateTime<Utc>,
    pub metadata: AnalysisMetadata,
}

impl AggregateResult {
    /// Collect every stage's output from a finished run
    pub fn from_context(mut context: StageContext, agents_failed: usize) -> Result<Self> {
        let mut take = |stage: StageKind| {
            context
                .take(stage)
                .ok_or_else(|| anyhow::anyhow!("run finished without a {} result", stage.key()))
        };

        let (
            StageOutput::Summary(summary),
            StageOutput::TargetUser(target_user),
            StageOutput::MarketAnalysis(market_analysis),
            StageOutput::Strategy(strategy),
            StageOutput::Scoring(score),
        ) = (
            take(StageKind::Summary)?,
            take(StageKind::TargetUser)?,
            take(StageKind::MarketAnalysis)?,
            take(StageKind::Strategy)?,
            take(StageKind::Scoring)?,
        )
        else {
            anyhow::bail!("stage results are stored under the wrong keys");
        };

        Ok(Self {
            summary,
            target_user,
            market_analysis,
            strategy,
            score,
            analyzed_at: Utc::now(),
            metadata: AnalysisMetadata::from_failures(agents_failed),
        })
    }
}
