//! # Summary Skill
//!
//! First stage: condenses the founder's free text into a summary, a core
//! value and a problem statement. Reads only the idea and follow-up answers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::models::LanguageModelClient;
use crate::pipeline::stages::StageKind;
use crate::skills::agent::{parse_response, StageAgent};
use crate::skills::context::{StageContext, StageOutput};
use crate::skills::llm_helpers::{excerpt, text_or};
use crate::skills::prompts;

const FALLBACK_SUMMARY: &str = "아이디어 요약 생성에 실패했습니다. 잠시 후 다시 시도해 주세요.";
const FALLBACK_CORE_VALUE: &str = "핵심 가치를 분석하지 못했습니다.";
const FALLBACK_PROBLEM: &str = "해결하려는 문제를 분석하지 못했습니다.";

/// Output of the summary stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub summary: String,
    pub core_value: String,
    pub problem_statement: String,
}

impl SummaryResult {
    pub fn fallback() -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_string(),
            core_value: FALLBACK_CORE_VALUE.to_string(),
            problem_statement: FALLBACK_PROBLEM.to_string(),
        }
    }

    /// Validate a parsed response field by field
    pub fn from_value(value: &Value) -> Self {
        Self {
            summary: text_or(value, &["summary"], FALLBACK_SUMMARY),
            core_value: text_or(value, &["core_value", "coreValue"], FALLBACK_CORE_VALUE),
            problem_statement: text_or(
                value,
                &["problem_statement", "problemStatement"],
                FALLBACK_PROBLEM,
            ),
        }
    }

    pub fn prompt_excerpt(&self) -> String {
        format!(
            "Summary: {}\nCore value: {}\nProblem: {}",
            excerpt(&self.summary, 600),
            excerpt(&self.core_value, 200),
            excerpt(&self.problem_statement, 300)
        )
    }
}

/// Summary stage agent
pub struct SummarySkill {
    llm: Arc<dyn LanguageModelClient>,
}

impl SummarySkill {
    pub fn new(llm: Arc<dyn LanguageModelClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl StageAgent for SummarySkill {
    fn stage(&self) -> StageKind {
        StageKind::Summary
    }

    fn fallback_result(&self) -> StageOutput {
        StageOutput::Summary(SummaryResult::fallback())
    }

    async fn try_analyze(&self, context: &StageContext) -> anyhow::Result<StageOutput> {
        let prompt = context.user_prompt(StageKind::Summary);
        let response = self.llm.chat(SYSTEM_PROMPT, &prompt).await?;
        let value = parse_response(
            StageKind::Summary,
            &response,
            &["summary", "core_value", "coreValue", "problem_statement", "problemStatement"],
        )?;
        Ok(StageOutput::Summary(SummaryResult::from_value(&value)))
    }
}

const SYSTEM_PROMPT: &str = prompts::SUMMARY;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::agent::test_support::ScriptedLlm;
    use crate::skills::context::{AnalysisRequest, FollowUpAnswers};
    use serde_json::json;

    fn context() -> StageContext {
        StageContext::new(AnalysisRequest::new("우산 공유 앱", FollowUpAnswers::new()).unwrap())
    }

    #[test]
    fn test_missing_field_defaults_independently() {
        let result = SummaryResult::from_value(&json!({
            "summary": "지하철역 우산 대여 서비스",
            "coreValue": "갑작스런 비에 대비"
        }));
        assert_eq!(result.summary, "지하철역 우산 대여 서비스");
        assert_eq!(result.core_value, "갑작스런 비에 대비");
        assert_eq!(result.problem_statement, FALLBACK_PROBLEM);
    }

    #[test]
    fn test_wrong_types_fall_back() {
        let result = SummaryResult::from_value(&json!({
            "summary": ["not", "a", "string"],
            "core_value": {"nested": true},
            "problem_statement": ""
        }));
        assert_eq!(result, SummaryResult::fallback());
    }

    #[test]
    fn test_serialized_keys_are_complete() {
        let value = serde_json::to_value(SummaryResult::fallback()).unwrap();
        for key in ["summary", "coreValue", "problemStatement"] {
            assert!(value[key].is_string(), "missing {}", key);
        }
    }

    #[tokio::test]
    async fn test_analyze_parses_fenced_response() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "```json\n{\"summary\": \"요약\", \"core_value\": \"가치\", \"problem_statement\": \"문제\"}\n```",
        ]));
        let skill = SummarySkill::new(llm.clone());

        let outcome = skill.analyze(&context()).await;
        assert!(!outcome.fell_back);
        match outcome.output {
            StageOutput::Summary(r) => {
                assert_eq!(r.summary, "요약");
                assert_eq!(r.problem_statement, "문제");
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert!(llm.prompts()[0].1.contains("우산 공유 앱"));
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_prose() {
        let llm = Arc::new(ScriptedLlm::new(vec!["I'm sorry, I can't do that."]));
        let outcome = SummarySkill::new(llm).analyze(&context()).await;
        assert!(outcome.fell_back);
        assert_eq!(outcome.output, StageOutput::Summary(SummaryResult::fallback()));
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_model_error() {
        let outcome = SummarySkill::new(Arc::new(ScriptedLlm::failing()))
            .analyze(&context())
            .await;
        assert!(outcome.fell_back);
    }
}
