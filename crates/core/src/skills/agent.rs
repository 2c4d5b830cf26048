//! # Stage Agent Contract
//!
//! Every stage agent implements [`StageAgent::try_analyze`], which is free to
//! fail, plus a schema-complete [`StageAgent::fallback_result`]. Callers only
//! ever see the output of [`fail_soft`], which turns any error or timeout
//! into the fallback and reports *that* it happened through
//! [`StageOutcome::fell_back`], never *why*.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::pipeline::stages::StageKind;
use crate::skills::context::{StageContext, StageOutput};
use crate::skills::llm_helpers::extract_json;

/// Result of running one stage through the fail-soft wrapper
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub output: StageOutput,
    /// True when `output` is the agent's fallback result
    pub fell_back: bool,
}

/// One unit of the analysis pipeline
#[async_trait]
pub trait StageAgent: Send + Sync {
    /// Stage this agent produces
    fn stage(&self) -> StageKind;

    /// Statically defined, schema-complete placeholder
    fn fallback_result(&self) -> StageOutput;

    /// Model call, parsing and validation; may fail
    async fn try_analyze(&self, context: &StageContext) -> anyhow::Result<StageOutput>;

    /// Run the stage; never fails
    async fn analyze(&self, context: &StageContext) -> StageOutcome {
        fail_soft(
            self.stage(),
            None,
            self.try_analyze(context),
            || self.fallback_result(),
        )
        .await
    }
}

/// Await `work`, substituting `fallback()` on error, timeout, or an output
/// belonging to a different stage.
pub async fn fail_soft<F, D>(
    stage: StageKind,
    timeout: Option<Duration>,
    work: F,
    fallback: D,
) -> StageOutcome
where
    F: Future<Output = anyhow::Result<StageOutput>>,
    D: FnOnce() -> StageOutput,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("timed out after {}s", limit.as_secs_f32())),
        },
        None => work.await,
    };

    match result {
        Ok(output) if output.stage() == stage => StageOutcome {
            output,
            fell_back: false,
        },
        Ok(output) => {
            tracing::warn!(
                stage = stage.key(),
                produced = output.stage().key(),
                "Stage produced output for the wrong stage, using fallback"
            );
            StageOutcome {
                output: fallback(),
                fell_back: true,
            }
        }
        Err(e) => {
            tracing::warn!(stage = stage.key(), error = %format!("{:#}", e), "Stage failed, using fallback");
            StageOutcome {
                output: fallback(),
                fell_back: true,
            }
        }
    }
}

/// Parse a model response into a JSON object that carries at least one of
/// the stage's top-level keys.
pub(crate) fn parse_response(
    stage: StageKind,
    response: &str,
    expected_keys: &[&str],
) -> anyhow::Result<serde_json::Value> {
    let value = extract_json(response)
        .ok_or_else(|| anyhow::anyhow!("{} response is not a JSON object", stage.key()))?;
    anyhow::ensure!(
        crate::skills::llm_helpers::has_any(&value, expected_keys),
        "{} response has none of the expected keys {:?}",
        stage.key(),
        expected_keys
    );
    Ok(value)
}
