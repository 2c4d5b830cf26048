//! # IdeaForge Skills
//!
//! The five stage agents of the analysis pipeline and their shared plumbing.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator
//!   └── StageAgent (try_analyze + fallback_result, wrapped by fail_soft)
//!         ├── LanguageModelClient (one chat call, or a radkit tool worker)
//!         └── llm_helpers (extract + validate field by field)
//! ```
//!
//! ## Stages
//!
//! - `SummarySkill` - condense the idea
//! - `TargetUserSkill` - segments, personas, pain points
//! - `MarketAnalysisSkill` - market size, competitors, trends (optionally grounded)
//! - `StrategySkill` - MVP scope and three prioritized actions
//! - `ScoringSkill` - deterministic five-dimension rubric

pub mod agent;
pub mod context;
pub mod llm_helpers;
pub mod prompts;
pub mod tools;

// Stage agents, in pipeline order
pub mod summary_skill;
pub mod target_user_skill;
pub mod market_analysis_skill;
pub mod strategy_skill;
pub mod scoring_skill;

pub use agent::{fail_soft, StageAgent, StageOutcome};
pub use context::{AnalysisRequest, FollowUpAnswers, StageContext, StageOutput};
pub use market_analysis_skill::{MarketAnalysisResult, MarketAnalysisSkill, MarketDataMode};
pub use scoring_skill::{Grade, ScoringConfig, ScoringResult, ScoringSkill};
pub use strategy_skill::{StrategyResult, StrategySkill};
pub use summary_skill::{SummaryResult, SummarySkill};
pub use target_user_skill::{TargetUserResult, TargetUserSkill};
