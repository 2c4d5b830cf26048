//! # IdeaForge Core
//!
//! Business logic of the IdeaForge idea analyzer: the stage agents, the
//! pipeline that runs them, and analysis persistence.
//!
//! ## Architecture
//!
//! - `skills/` - Stage agents (SummarySkill, TargetUserSkill, ScoringSkill, etc.)
//! - `models` - Centralized LLM provider configuration
//! - `pipeline/` - Orchestrator, job wrapper, progress events
//! - `state/` - SQLite-backed analysis records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ideaforge_core::pipeline::{AnalysisJob, NullPublisher, PipelineConfig};
//! use ideaforge_core::state::{AnalysisDb, SqliteAnalysisStore};
//!
//! let store = Arc::new(SqliteAnalysisStore::new(&AnalysisDb::open()?));
//! let job = AnalysisJob::from_config(&PipelineConfig::default(), store, Arc::new(NullPublisher))?;
//! let outcome = job.perform(&analysis_id).await?;
//! ```

pub mod models;
pub mod pipeline;
pub mod skills;
pub mod state;
