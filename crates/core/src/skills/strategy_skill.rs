//! # Strategy Skill
//!
//! Fourth stage: MVP scope, execution challenges, next steps and exactly
//! three prioritized actions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::models::LanguageModelClient;
use crate::pipeline::stages::StageKind;
use crate::skills::agent::{parse_response, StageAgent};
use crate::skills::context::{StageContext, StageOutput};
use crate::skills::llm_helpers::{bullets, object, object_list, string_list_or, text_or};
use crate::skills::prompts;

/// Number of actions every strategy carries
pub const ACTION_COUNT: usize = 3;

const FALLBACK_MVP_FEATURES: &[&str] = &["MVP 기능을 도출하지 못했습니다."];
const FALLBACK_CHALLENGES: &[&str] = &["실행 과제를 분석하지 못했습니다."];
const FALLBACK_NEXT_STEPS: &[&str] = &["다음 단계를 도출하지 못했습니다."];
const FALLBACK_ACTIONS: [(&str, &str); ACTION_COUNT] = [
    ("고객 인터뷰", "핵심 타겟 고객 10명을 인터뷰해 문제의 심각도를 검증하세요."),
    ("경쟁 서비스 조사", "유사 서비스를 직접 사용해 보고 차별점을 정리하세요."),
    ("랜딩 페이지 테스트", "간단한 랜딩 페이지로 사전 신청 수요를 측정하세요."),
];

/// Recommendations nested under `recommendations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub mvp_features: Vec<String>,
    pub challenges: Vec<String>,
    pub next_steps: Vec<String>,
}

/// One prioritized action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub title: String,
    pub description: String,
}

/// Output of the strategy stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResult {
    pub recommendations: Recommendations,
    /// Always exactly [`ACTION_COUNT`] entries
    pub actions: Vec<ActionItem>,
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn fallback_actions() -> Vec<ActionItem> {
    FALLBACK_ACTIONS
        .iter()
        .map(|(title, description)| ActionItem {
            title: title.to_string(),
            description: description.to_string(),
        })
        .collect()
}

impl StrategyResult {
    pub fn fallback() -> Self {
        Self {
            recommendations: Recommendations {
                mvp_features: to_strings(FALLBACK_MVP_FEATURES),
                challenges: to_strings(FALLBACK_CHALLENGES),
                next_steps: to_strings(FALLBACK_NEXT_STEPS),
            },
            actions: fallback_actions(),
        }
    }

    /// Validate a parsed response field by field.
    ///
    /// Actions without a title are dropped; the list is then truncated or
    /// padded from the fallback actions to exactly three.
    pub fn from_value(value: &Value) -> Self {
        let empty = Value::Null;
        let recs = object(value, &["recommendations"]).unwrap_or(&empty);

        let mut actions: Vec<ActionItem> = object_list(value, &["actions"])
            .into_iter()
            .filter_map(|item| {
                let item = Value::Object(item.clone());
                let title = text_or(&item, &["title", "name"], "");
                if title.is_empty() {
                    return None;
                }
                Some(ActionItem {
                    title,
                    description: text_or(&item, &["description", "detail"], ""),
                })
            })
            .take(ACTION_COUNT)
            .collect();
        actions.extend(fallback_actions().into_iter().skip(actions.len()));

        Self {
            recommendations: Recommendations {
                mvp_features: string_list_or(
                    recs,
                    &["mvp_features", "mvpFeatures"],
                    FALLBACK_MVP_FEATURES,
                ),
                challenges: string_list_or(recs, &["challenges"], FALLBACK_CHALLENGES),
                next_steps: string_list_or(recs, &["next_steps", "nextSteps"], FALLBACK_NEXT_STEPS),
            },
            actions,
        }
    }

    pub fn prompt_excerpt(&self) -> String {
        let actions: Vec<String> = self
            .actions
            .iter()
            .map(|a| format!("{}: {}", a.title, a.description))
            .collect();
        format!(
            "MVP features:\n{}\nChallenges:\n{}\nNext steps:\n{}\nActions:\n{}",
            bullets(&self.recommendations.mvp_features),
            bullets(&self.recommendations.challenges),
            bullets(&self.recommendations.next_steps),
            bullets(&actions)
        )
    }
}

/// Strategy stage agent
pub struct StrategySkill {
    llm: Arc<dyn LanguageModelClient>,
}

impl StrategySkill {
    pub fn new(llm: Arc<dyn LanguageModelClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl StageAgent for StrategySkill {
    fn stage(&self) -> StageKind {
        StageKind::Strategy
    }

    fn fallback_result(&self) -> StageOutput {
        StageOutput::Strategy(StrategyResult::fallback())
    }

    async fn try_analyze(&self, context: &StageContext) -> anyhow::Result<StageOutput> {
        let prompt = context.user_prompt(StageKind::Strategy);
        let response = self.llm.chat(SYSTEM_PROMPT, &prompt).await?;
        let value = parse_response(StageKind::Strategy, &response, &["recommendations", "actions"])?;
        Ok(StageOutput::Strategy(StrategyResult::from_value(&value)))
    }
}

const SYSTEM_PROMPT: &str = prompts::STRATEGY;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::agent::test_support::ScriptedLlm;
    use crate::skills::context::{AnalysisRequest, FollowUpAnswers};
    use serde_json::json;

    #[test]
    fn test_extra_actions_are_truncated() {
        let result = StrategyResult::from_value(&json!({
            "actions": [
                {"title": "a", "description": "1"},
                {"title": "b", "description": "2"},
                {"title": "c", "description": "3"},
                {"title": "d", "description": "4"}
            ]
        }));
        let titles: Vec<&str> = result.actions.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_short_action_list_is_padded() {
        let result = StrategyResult::from_value(&json!({
            "actions": [
                {"title": "파일럿 운영", "description": "강남역 1곳"},
                {"description": "제목 없음"},
                "not an object"
            ]
        }));
        assert_eq!(result.actions.len(), ACTION_COUNT);
        assert_eq!(result.actions[0].title, "파일럿 운영");
        assert_eq!(result.actions[1], fallback_actions()[1]);
        assert_eq!(result.actions[2], fallback_actions()[2]);
    }

    #[test]
    fn test_recommendation_aliases() {
        let result = StrategyResult::from_value(&json!({
            "recommendations": {
                "mvpFeatures": ["QR 대여"],
                "challenges": [],
                "nextSteps": "제휴처 확보"
            }
        }));
        assert_eq!(result.recommendations.mvp_features, vec!["QR 대여"]);
        assert_eq!(result.recommendations.challenges, to_strings(FALLBACK_CHALLENGES));
        assert_eq!(result.recommendations.next_steps, vec!["제휴처 확보"]);
        assert_eq!(result.actions, fallback_actions());
    }

    #[test]
    fn test_serialized_keys_are_complete() {
        let value = serde_json::to_value(StrategyResult::fallback()).unwrap();
        for key in ["mvpFeatures", "challenges", "nextSteps"] {
            assert!(value["recommendations"][key].is_array(), "missing {}", key);
        }
        assert_eq!(value["actions"].as_array().unwrap().len(), ACTION_COUNT);
    }

    #[tokio::test]
    async fn test_analyze_without_recognised_keys_falls_back() {
        let llm = Arc::new(ScriptedLlm::new(vec![r#"{"plan": "just build it"}"#]));
        let ctx = StageContext::new(
            AnalysisRequest::new("우산 공유 앱", FollowUpAnswers::new()).unwrap(),
        );
        let outcome = StrategySkill::new(llm).analyze(&ctx).await;
        assert!(outcome.fell_back);
        assert_eq!(outcome.output, StageOutput::Strategy(StrategyResult::fallback()));
    }
}
