//! # Analysis Job
//!
//! Top-level entry point invoked with an analysis id. Chooses between a
//! real run and the mock analysis, persists progress and the final report,
//! and turns anything that escapes the run into a terminal `failed` record.
//!
//! ```text
//! load ──terminal?──▶ no-op
//!   │
//!   ├─ model configured ──▶ Orchestrator.run ──┐
//!   └─ otherwise ─────────▶ mock_analysis ─────┤
//!                                               ├─ ok ──▶ completed + analysis_completed event
//!                                               └─ err ─▶ failed (not re-raised)
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;

use super::config::PipelineConfig;
use super::events::ProgressEvent;
use super::mock::mock_analysis;
use super::orchestrator::{AnalysisRunner, Orchestrator};
use super::publisher::ProgressPublisher;
use super::result::AggregateResult;
use super::stages::{StageKind, StageProgress, TOTAL_STAGES};
use crate::models::ProviderLanguageModel;
use crate::state::{AnalysisStatus, AnalysisStore, PersistedAnalysis};

/// How one invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        score: i64,
        partial_success: bool,
        real_analysis: bool,
    },
    Failed,
    /// The record was already terminal; nothing was done
    Skipped(AnalysisStatus),
}

pub struct AnalysisJob {
    store: Arc<dyn AnalysisStore>,
    /// `None` when no model backend is configured
    runner: Option<Arc<dyn AnalysisRunner>>,
    publisher: Arc<dyn ProgressPublisher>,
}

impl AnalysisJob {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        runner: Option<Arc<dyn AnalysisRunner>>,
        publisher: Arc<dyn ProgressPublisher>,
    ) -> Self {
        Self {
            store,
            runner,
            publisher,
        }
    }

    /// Wire the standard orchestrator when the model is configured,
    /// otherwise fall back to mock analysis.
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn AnalysisStore>,
        publisher: Arc<dyn ProgressPublisher>,
    ) -> Result<Self> {
        let runner: Option<Arc<dyn AnalysisRunner>> = if config.model.is_configured() {
            let llm = Arc::new(ProviderLanguageModel::new(config.model.clone())?);
            Some(Arc::new(Orchestrator::new(llm, config)?))
        } else {
            tracing::warn!(
                provider = config.model.provider.display_name(),
                env_var = config.model.provider.env_var(),
                "Language model not configured, analyses will use mock results"
            );
            None
        };
        Ok(Self::new(store, runner, publisher))
    }

    pub fn is_real(&self) -> bool {
        self.runner.is_some()
    }

    /// Run the analysis stored under `analysis_id`.
    ///
    /// Only a missing record is an error. A run that fails for any other
    /// reason leaves the record `failed` and returns [`JobOutcome::Failed`].
    #[tracing::instrument(skip(self), fields(real = self.is_real()))]
    pub async fn perform(&self, analysis_id: &str) -> Result<JobOutcome> {
        let mut analysis = self
            .store
            .load(analysis_id)
            .with_context(|| format!("Failed to load analysis {}", analysis_id))?;

        if analysis.status.is_terminal() {
            tracing::info!(status = analysis.status.as_str(), "Analysis already finished, skipping");
            return Ok(JobOutcome::Skipped(analysis.status));
        }

        tracing::info!("Analysis started");
        match self.execute(&mut analysis).await {
            Ok(done) => {
                self.publish(ProgressEvent::completed(&done.id));
                tracing::info!(
                    score = ?done.score,
                    partial_success = done.is_partial_success,
                    "Analysis completed"
                );
                Ok(JobOutcome::Completed {
                    score: done.score.unwrap_or_default(),
                    partial_success: done.is_partial_success,
                    real_analysis: done.is_real_analysis,
                })
            }
            Err(e) => {
                tracing::error!(error = ?e, "Analysis failed");
                analysis.status = AnalysisStatus::Failed;
                analysis.error_message = Some(format!("{:#}", e));
                analysis.touch();
                if let Err(save_err) = self.store.save(&analysis) {
                    tracing::error!(error = %save_err, "Failed to persist failed status");
                }
                Ok(JobOutcome::Failed)
            }
        }
    }

    /// Run to completion and persist the completed record.
    ///
    /// `analysis` only ever receives progress updates; the report is written
    /// to a copy so a failure cannot leave a half-applied result behind.
    async fn execute(&self, analysis: &mut PersistedAnalysis) -> Result<PersistedAnalysis> {
        let request = analysis.request()?;
        let store = Arc::clone(&self.store);
        let publisher = Arc::clone(&self.publisher);

        let mut on_stage_complete = |progress: StageProgress| -> Result<()> {
            let stage = progress.current_stage();
            if stage > analysis.current_stage {
                analysis.current_stage = stage;
            }
            analysis.touch();
            store
                .save(analysis)
                .with_context(|| format!("Failed to persist progress at stage {}", stage))?;
            publish_quietly(
                publisher.as_ref(),
                ProgressEvent::stage_progress(&analysis.id, progress),
            );
            Ok(())
        };

        let result: AggregateResult = match &self.runner {
            Some(runner) => runner.run(request, &mut on_stage_complete).await?,
            None => {
                for stage in StageKind::ALL {
                    on_stage_complete(StageProgress {
                        stage,
                        fell_back: false,
                    })?;
                }
                mock_analysis(&request)
            }
        };

        let mut done = analysis.clone();
        done.status = AnalysisStatus::Completed;
        done.current_stage = TOTAL_STAGES;
        done.score = Some(result.score.overall);
        done.is_real_analysis = self.runner.is_some();
        done.is_partial_success = result.metadata.partial_success;
        done.analysis_result = Some(serde_json::to_value(&result)?);
        done.error_message = None;
        done.touch();
        self.store.save(&done).context("Failed to persist analysis result")?;

        *analysis = done.clone();
        Ok(done)
    }

    fn publish(&self, event: ProgressEvent) {
        publish_quietly(self.publisher.as_ref(), event);
    }
}

fn publish_quietly(publisher: &dyn ProgressPublisher, event: ProgressEvent) {
    if let Err(e) = publisher.publish(event) {
        tracing::warn!(error = %e, "Progress publish failed, ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orchestrator::test_support::stub_orchestrator;
    use crate::pipeline::orchestrator::StageCallback;
    use crate::pipeline::publisher::test_support::{FailingPublisher, RecordingPublisher};
    use crate::pipeline::publisher::NullPublisher;
    use crate::skills::context::{AnalysisRequest, FollowUpAnswers};
    use crate::state::{AnalysisDb, AnalysisStoreError, SqliteAnalysisStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn sqlite_store() -> Arc<SqliteAnalysisStore> {
        Arc::new(SqliteAnalysisStore::new(&AnalysisDb::open_in_memory().unwrap()))
    }

    fn create(store: &dyn AnalysisStore, idea: &str) -> PersistedAnalysis {
        let request = AnalysisRequest::new(idea, FollowUpAnswers::new()).unwrap();
        let analysis = PersistedAnalysis::new(&request);
        store.create(&analysis).unwrap();
        analysis
    }

    /// Runner that reports two stages and then hits an infrastructure error
    struct BrokenRunner;

    #[async_trait]
    impl AnalysisRunner for BrokenRunner {
        async fn run(
            &self,
            _request: AnalysisRequest,
            on_stage_complete: StageCallback<'_>,
        ) -> Result<AggregateResult> {
            for stage in [StageKind::Summary, StageKind::TargetUser] {
                on_stage_complete(StageProgress {
                    stage,
                    fell_back: false,
                })?;
            }
            anyhow::bail!("connection reset by peer")
        }
    }

    /// Store that records every saved stage and can fail one progress write
    struct FlakyStore {
        inner: Arc<SqliteAnalysisStore>,
        fail_at_stage: Option<usize>,
        tripped: AtomicBool,
        saved_stages: Mutex<Vec<usize>>,
    }

    impl FlakyStore {
        fn new(fail_at_stage: Option<usize>) -> Self {
            Self {
                inner: sqlite_store(),
                fail_at_stage,
                tripped: AtomicBool::new(false),
                saved_stages: Mutex::new(Vec::new()),
            }
        }
    }

    impl AnalysisStore for FlakyStore {
        fn create(&self, analysis: &PersistedAnalysis) -> Result<(), AnalysisStoreError> {
            self.inner.create(analysis)
        }

        fn load(&self, id: &str) -> Result<PersistedAnalysis, AnalysisStoreError> {
            self.inner.load(id)
        }

        fn save(&self, analysis: &PersistedAnalysis) -> Result<(), AnalysisStoreError> {
            if analysis.status == AnalysisStatus::Analyzing
                && Some(analysis.current_stage) == self.fail_at_stage
                && !self.tripped.swap(true, Ordering::SeqCst)
            {
                return Err(AnalysisStoreError::Lock("disk full".to_string()));
            }
            self.saved_stages.lock().unwrap().push(analysis.current_stage);
            self.inner.save(analysis)
        }
    }

    #[tokio::test]
    async fn test_unconfigured_model_completes_with_mock() {
        let store = sqlite_store();
        let analysis = create(store.as_ref(), "우산 공유 앱");
        let publisher = Arc::new(RecordingPublisher::default());
        let job = AnalysisJob::new(store.clone(), None, publisher.clone());

        let outcome = job.perform(&analysis.id).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Completed {
                score: 70,
                partial_success: false,
                real_analysis: false
            }
        );

        let saved = store.load(&analysis.id).unwrap();
        assert_eq!(saved.status, AnalysisStatus::Completed);
        assert_eq!(saved.score, Some(70));
        assert_eq!(saved.current_stage, 5);
        assert!(!saved.is_real_analysis);
        assert_eq!(saved.analysis_result.unwrap()["score"]["overall"], 70);

        let events = publisher.events();
        assert_eq!(events.len(), 6);
        assert!(events[5].is_final());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_once_per_stage() {
        let store = Arc::new(FlakyStore::new(None));
        let analysis = create(store.as_ref(), "반려동물 산책 대행");
        let publisher = Arc::new(RecordingPublisher::default());
        let runner: Arc<dyn AnalysisRunner> = Arc::new(stub_orchestrator(1));
        let job = AnalysisJob::new(store.clone(), Some(runner), publisher.clone());

        job.perform(&analysis.id).await.unwrap();

        let stages: Vec<usize> = publisher
            .events()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::StageProgress { current_stage, .. } => Some(*current_stage),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec![1, 2, 3, 4, 5]);

        let saved = store.saved_stages.lock().unwrap().clone();
        assert!(saved.windows(2).all(|w| w[0] <= w[1]), "{:?}", saved);
        assert_eq!(saved.last(), Some(&5));
    }

    #[tokio::test]
    async fn test_real_run_records_partial_success() {
        let store = sqlite_store();
        let analysis = create(store.as_ref(), "반려동물 산책 대행");
        let runner: Arc<dyn AnalysisRunner> = Arc::new(stub_orchestrator(2));
        let job = AnalysisJob::new(store.clone(), Some(runner), Arc::new(NullPublisher));

        let outcome = job.perform(&analysis.id).await.unwrap();
        assert!(matches!(
            outcome,
            JobOutcome::Completed {
                partial_success: true,
                real_analysis: true,
                ..
            }
        ));

        let saved = store.load(&analysis.id).unwrap();
        assert!(saved.is_real_analysis);
        assert!(saved.is_partial_success);
        assert_eq!(saved.analysis_result.unwrap()["metadata"]["agentsFailed"], 2);
    }

    #[tokio::test]
    async fn test_total_stage_failure_still_completes() {
        let store = sqlite_store();
        let analysis = create(store.as_ref(), "반려동물 산책 대행");
        let runner: Arc<dyn AnalysisRunner> = Arc::new(stub_orchestrator(5));
        let job = AnalysisJob::new(store.clone(), Some(runner), Arc::new(NullPublisher));

        job.perform(&analysis.id).await.unwrap();
        let saved = store.load(&analysis.id).unwrap();
        assert_eq!(saved.status, AnalysisStatus::Completed);
        assert!(!saved.is_partial_success);
    }

    #[tokio::test]
    async fn test_completed_record_is_not_rerun() {
        let store = sqlite_store();
        let analysis = create(store.as_ref(), "우산 공유 앱");
        let publisher = Arc::new(RecordingPublisher::default());
        let job = AnalysisJob::new(store.clone(), None, publisher.clone());

        job.perform(&analysis.id).await.unwrap();
        let first = store.load(&analysis.id).unwrap();

        let again = job.perform(&analysis.id).await.unwrap();
        assert_eq!(again, JobOutcome::Skipped(AnalysisStatus::Completed));
        assert_eq!(store.load(&analysis.id).unwrap(), first);
        assert_eq!(publisher.events().len(), 6);
    }

    #[tokio::test]
    async fn test_runner_error_marks_failed_and_keeps_prior_result() {
        let store = sqlite_store();
        let mut analysis = create(store.as_ref(), "우산 공유 앱");
        analysis.analysis_result = Some(json!({"previous": true}));
        store.save(&analysis).unwrap();

        let publisher = Arc::new(RecordingPublisher::default());
        let runner: Arc<dyn AnalysisRunner> = Arc::new(BrokenRunner);
        let job = AnalysisJob::new(store.clone(), Some(runner), publisher.clone());

        let outcome = job.perform(&analysis.id).await.unwrap();
        assert_eq!(outcome, JobOutcome::Failed);

        let saved = store.load(&analysis.id).unwrap();
        assert_eq!(saved.status, AnalysisStatus::Failed);
        assert_eq!(saved.analysis_result, Some(json!({"previous": true})));
        assert_eq!(saved.current_stage, 2);
        assert!(saved.score.is_none());
        assert!(saved.error_message.unwrap().contains("connection reset"));
        assert!(publisher.events().iter().all(|e| !e.is_final()));
    }

    #[tokio::test]
    async fn test_persistence_error_mid_run_marks_failed() {
        let store = Arc::new(FlakyStore::new(Some(3)));
        let analysis = create(store.as_ref(), "우산 공유 앱");
        let runner: Arc<dyn AnalysisRunner> = Arc::new(stub_orchestrator(0));
        let job = AnalysisJob::new(store.clone(), Some(runner), Arc::new(NullPublisher));

        let outcome = job.perform(&analysis.id).await.unwrap();
        assert_eq!(outcome, JobOutcome::Failed);

        let saved = store.load(&analysis.id).unwrap();
        assert_eq!(saved.status, AnalysisStatus::Failed);
        assert!(saved.analysis_result.is_none());
        assert!(saved.error_message.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_failed_record_is_terminal() {
        let store = sqlite_store();
        let mut analysis = create(store.as_ref(), "우산 공유 앱");
        analysis.status = AnalysisStatus::Failed;
        store.save(&analysis).unwrap();

        let job = AnalysisJob::new(store.clone(), None, Arc::new(NullPublisher));
        let outcome = job.perform(&analysis.id).await.unwrap();
        assert_eq!(outcome, JobOutcome::Skipped(AnalysisStatus::Failed));
        assert_eq!(store.load(&analysis.id).unwrap().status, AnalysisStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_id_is_propagated() {
        let store = sqlite_store();
        let job = AnalysisJob::new(store, None, Arc::new(NullPublisher));
        let err = job.perform("does-not-exist").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisStoreError>(),
            Some(AnalysisStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_failures_are_swallowed() {
        let store = sqlite_store();
        let analysis = create(store.as_ref(), "우산 공유 앱");
        let job = AnalysisJob::new(store.clone(), None, Arc::new(FailingPublisher));

        let outcome = job.perform(&analysis.id).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Completed { score: 70, .. }));
        assert_eq!(store.load(&analysis.id).unwrap().status, AnalysisStatus::Completed);
    }

    #[test]
    fn test_from_config_without_key_uses_mock() {
        let mut config = PipelineConfig::default();
        config.model.provider = crate::models::LlmProvider::DeepSeek;
        std::env::remove_var("DEEPSEEK_API_KEY");

        let job = AnalysisJob::from_config(&config, sqlite_store(), Arc::new(NullPublisher)).unwrap();
        assert!(!job.is_real());
    }
}
