//! # Analysis Pipeline
//!
//! Runs the five stage agents for one idea and records the outcome.
//!
//! ## Flow
//!
//! ```text
//! AnalysisJob → Orchestrator → Summary → TargetUser → MarketAnalysis → Strategy → Scoring
//!      │              └── on_stage_complete ──▶ store.save + ProgressPublisher
//!      └── (no model configured) → mock_analysis
//! ```

pub mod config;
pub mod events;
pub mod job;
pub mod mock;
pub mod orchestrator;
pub mod publisher;
pub mod result;
pub mod stages;

pub use config::{PipelineConfig, DEFAULT_CONFIG_PATH};
pub use events::ProgressEvent;
pub use job::{AnalysisJob, JobOutcome};
pub use mock::mock_analysis;
pub use orchestrator::{AnalysisRunner, Orchestrator, StageCallback};
pub use publisher::{BroadcastPublisher, NullPublisher, ProgressPublisher};
pub use result::{AggregateResult, AnalysisMetadata};
pub use stages::{StageKind, StageProgress, TOTAL_STAGES};
