//! # Pipeline Orchestrator
//!
//! Runs the five stage agents strictly in order. Each stage sees the
//! validated output of every earlier stage; a stage that falls back is
//! counted, merged like any other result, and the run continues.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::config::PipelineConfig;
use super::result::AggregateResult;
use super::stages::{StageKind, StageProgress};
use crate::models::LanguageModelClient;
use crate::skills::agent::{fail_soft, StageAgent};
use crate::skills::context::{AnalysisRequest, StageContext};
use crate::skills::market_analysis_skill::{MarketAnalysisSkill, MarketDataMode};
use crate::skills::scoring_skill::ScoringSkill;
use crate::skills::strategy_skill::StrategySkill;
use crate::skills::summary_skill::SummarySkill;
use crate::skills::target_user_skill::TargetUserSkill;
use crate::skills::tools::{MarketDataset, SearxngSearch};

/// Called after every stage, in stage order. An error aborts the run.
pub type StageCallback<'a> = &'a mut (dyn FnMut(StageProgress) -> Result<()> + Send);

/// Anything that can turn a request into an aggregate result
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    async fn run(
        &self,
        request: AnalysisRequest,
        on_stage_complete: StageCallback<'_>,
    ) -> Result<AggregateResult>;
}

pub struct Orchestrator {
    agents: Vec<Arc<dyn StageAgent>>,
    stage_timeout: Option<Duration>,
}

impl Orchestrator {
    /// Build the standard five agents around one model client
    pub fn new(llm: Arc<dyn LanguageModelClient>, config: &PipelineConfig) -> Result<Self> {
        let dataset = Arc::new(MarketDataset::bundled()?);
        let mut market = MarketAnalysisSkill::new(llm.clone(), config.market_data_mode, dataset);
        if config.market_data_mode == MarketDataMode::WebGrounded {
            let search = SearxngSearch::new(config.searxng_url.clone())
                .context("Failed to build search client")?;
            market = market.with_search(Arc::new(search));
        }

        let agents: Vec<Arc<dyn StageAgent>> = vec![
            Arc::new(SummarySkill::new(llm.clone())),
            Arc::new(TargetUserSkill::new(llm.clone())),
            Arc::new(market),
            Arc::new(StrategySkill::new(llm.clone())),
            Arc::new(ScoringSkill::new(llm, config.scoring.clone())),
        ];
        Self::with_agents(agents, config.stage_timeout())
    }

    /// Use explicit agents; they must cover every stage in pipeline order
    pub fn with_agents(
        agents: Vec<Arc<dyn StageAgent>>,
        stage_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stages: Vec<StageKind> = agents.iter().map(|a| a.stage()).collect();
        anyhow::ensure!(
            stages == StageKind::ALL,
            "agents must run in pipeline order {:?}, got {:?}",
            StageKind::ALL,
            stages
        );
        Ok(Self {
            agents,
            stage_timeout,
        })
    }

    #[tracing::instrument(
        skip_all,
        fields(idea_preview = %request.idea.chars().take(50).collect::<String>())
    )]
    pub async fn run(
        &self,
        request: AnalysisRequest,
        on_stage_complete: StageCallback<'_>,
    ) -> Result<AggregateResult> {
        let mut context = StageContext::new(request);
        let mut failed = 0usize;

        for agent in &self.agents {
            let stage = agent.stage();
            tracing::info!(stage = stage.key(), "Stage started");

            let outcome = fail_soft(
                stage,
                self.stage_timeout,
                agent.try_analyze(&context),
                || agent.fallback_result(),
            )
            .await;

            if outcome.fell_back {
                failed += 1;
            }
            tracing::info!(stage = stage.key(), fell_back = outcome.fell_back, "Stage finished");

            context.merge(outcome.output);
            on_stage_complete(StageProgress {
                stage,
                fell_back: outcome.fell_back,
            })
            .with_context(|| format!("stage-complete callback failed after {}", stage.key()))?;
        }

        let result = AggregateResult::from_context(context, failed)?;
        tracing::info!(
            failed,
            overall = result.score.overall,
            partial_success = result.metadata.partial_success,
            "Pipeline finished"
        );
        Ok(result)
    }
}

#[async_trait]
impl AnalysisRunner for Orchestrator {
    async fn run(
        &self,
        request: AnalysisRequest,
        on_stage_complete: StageCallback<'_>,
    ) -> Result<AggregateResult> {
        Orchestrator::run(self, request, on_stage_complete).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::skills::context::StageOutput;
    use crate::skills::market_analysis_skill::MarketAnalysisResult;
    use crate::skills::scoring_skill::{ScoringConfig, ScoringResult};
    use crate::skills::strategy_skill::StrategyResult;
    use crate::skills::summary_skill::SummaryResult;
    use crate::skills::target_user_skill::TargetUserResult;

    /// Agent that either fails or returns its own fallback as a success
    pub struct StubAgent {
        pub stage: StageKind,
        pub fail: bool,
    }

    #[async_trait]
    impl StageAgent for StubAgent {
        fn stage(&self) -> StageKind {
            self.stage
        }

        fn fallback_result(&self) -> StageOutput {
            match self.stage {
                StageKind::Summary => StageOutput::Summary(SummaryResult::fallback()),
                StageKind::TargetUser => StageOutput::TargetUser(TargetUserResult::fallback()),
                StageKind::MarketAnalysis => {
                    StageOutput::MarketAnalysis(MarketAnalysisResult::fallback())
                }
                StageKind::Strategy => StageOutput::Strategy(StrategyResult::fallback()),
                StageKind::Scoring => {
                    StageOutput::Scoring(ScoringResult::fallback(&ScoringConfig::default()))
                }
            }
        }

        async fn try_analyze(&self, _context: &StageContext) -> Result<StageOutput> {
            if self.fail {
                anyhow::bail!("{} stub failed", self.stage.key());
            }
            Ok(self.fallback_result())
        }
    }

    /// Orchestrator whose first `failures` stages fail
    pub fn stub_orchestrator(failures: usize) -> Orchestrator {
        let agents: Vec<Arc<dyn StageAgent>> = StageKind::ALL
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                Arc::new(StubAgent {
                    stage: *stage,
                    fail: i < failures,
                }) as Arc<dyn StageAgent>
            })
            .collect();
        Orchestrator::with_agents(agents, None).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::skills::agent::test_support::ScriptedLlm;
    use crate::skills::context::FollowUpAnswers;
    use crate::skills::scoring_skill::Grade;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("우산 공유 앱", FollowUpAnswers::new()).unwrap()
    }

    #[tokio::test]
    async fn test_partial_success_across_failure_counts() {
        for failures in 0..=5 {
            let orchestrator = stub_orchestrator(failures);
            let mut noop = |_: StageProgress| -> Result<()> { Ok(()) };
            let result = orchestrator.run(request(), &mut noop).await.unwrap();

            assert_eq!(result.metadata.agents_failed, failures);
            assert_eq!(result.metadata.agents_completed, 5 - failures);
            assert_eq!(
                result.metadata.partial_success,
                failures > 0 && failures < 5,
                "failures = {}",
                failures
            );
        }
    }

    #[tokio::test]
    async fn test_callbacks_fire_once_per_stage_in_order() {
        let orchestrator = stub_orchestrator(2);
        let mut seen = Vec::new();
        let mut record = |p: StageProgress| -> Result<()> {
            seen.push((p.current_stage(), p.fell_back));
            Ok(())
        };
        orchestrator.run(request(), &mut record).await.unwrap();
        assert_eq!(
            seen,
            vec![(1, true), (2, true), (3, false), (4, false), (5, false)]
        );
    }

    #[tokio::test]
    async fn test_callback_error_aborts_run() {
        let orchestrator = stub_orchestrator(0);
        let mut calls = 0;
        let mut failing = |p: StageProgress| -> Result<()> {
            calls += 1;
            if p.current_stage() == 2 {
                anyhow::bail!("disk full");
            }
            Ok(())
        };
        let err = orchestrator.run(request(), &mut failing).await.unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_agents_out_of_order_rejected() {
        let agents: Vec<Arc<dyn StageAgent>> = vec![
            Arc::new(StubAgent {
                stage: StageKind::TargetUser,
                fail: false,
            }),
            Arc::new(StubAgent {
                stage: StageKind::Summary,
                fail: false,
            }),
        ];
        assert!(Orchestrator::with_agents(agents, None).is_err());
    }

    #[tokio::test]
    async fn test_scripted_model_flows_through_every_stage() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"summary": "역사 내 우산 대여", "core_value": "편의", "problem_statement": "갑작스런 비"}"#,
            r#"{"target_users": {"primary": "출퇴근 직장인"}, "pain_points": ["우산 분실"]}"#,
            "not json at all",
            r#"{"actions": [{"title": "파일럿", "description": "1개 역"}]}"#,
            r#"{"scores": {"market": 24, "problem": 20, "moat": 14, "feasibility": 12, "business": 8}}"#,
        ]));
        let orchestrator = Orchestrator::new(llm.clone(), &PipelineConfig::default()).unwrap();
        let mut noop = |_: StageProgress| -> Result<()> { Ok(()) };
        let result = orchestrator.run(request(), &mut noop).await.unwrap();

        assert_eq!(result.summary.summary, "역사 내 우산 대여");
        assert_eq!(result.market_analysis, crate::skills::MarketAnalysisResult::fallback());
        assert_eq!(result.strategy.actions[0].title, "파일럿");
        assert_eq!(result.score.overall, 78);
        assert_eq!(result.score.grade, Grade::B);
        assert_eq!(result.metadata.agents_failed, 1);
        assert!(result.metadata.partial_success);

        // Strategy's prompt carried the upstream results
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 5);
        assert!(prompts[3].1.contains("역사 내 우산 대여"));
        assert!(prompts[3].1.contains("# Market Analysis"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_counts_as_failure() {
        struct SlowAgent(StubAgent);

        #[async_trait]
        impl StageAgent for SlowAgent {
            fn stage(&self) -> StageKind {
                self.0.stage()
            }
            fn fallback_result(&self) -> crate::skills::StageOutput {
                self.0.fallback_result()
            }
            async fn try_analyze(
                &self,
                context: &StageContext,
            ) -> Result<crate::skills::StageOutput> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                self.0.try_analyze(context).await
            }
        }

        let agents: Vec<Arc<dyn StageAgent>> = StageKind::ALL
            .iter()
            .map(|stage| {
                let stub = StubAgent {
                    stage: *stage,
                    fail: false,
                };
                if *stage == StageKind::Strategy {
                    Arc::new(SlowAgent(stub)) as Arc<dyn StageAgent>
                } else {
                    Arc::new(stub) as Arc<dyn StageAgent>
                }
            })
            .collect();
        let orchestrator = Orchestrator::with_agents(agents, Some(Duration::from_secs(30))).unwrap();
        let mut noop = |_: StageProgress| -> Result<()> { Ok(()) };
        let result = orchestrator.run(request(), &mut noop).await.unwrap();
        assert_eq!(result.metadata.agents_failed, 1);
    }
}
