//! # Target User Skill
//!
//! Second stage: identifies the primary segment, personas, pain points and
//! goals. Reads the idea and the summary stage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::models::LanguageModelClient;
use crate::pipeline::stages::StageKind;
use crate::skills::agent::{parse_response, StageAgent};
use crate::skills::context::{StageContext, StageOutput};
use crate::skills::llm_helpers::{bullets, field, object, string_list_or, text_or};
use crate::skills::prompts;

const FALLBACK_PRIMARY: &str = "타겟 사용자 분석에 실패했습니다.";
const FALLBACK_CHARACTERISTICS: &[&str] = &["사용자 특성을 분석하지 못했습니다."];
const FALLBACK_PAIN_POINTS: &[&str] = &["사용자 불편 사항을 분석하지 못했습니다."];
const FALLBACK_GOALS: &[&str] = &["사용자 목표를 분석하지 못했습니다."];
const FALLBACK_PERSONA_NAME: &str = "대표 사용자";
const FALLBACK_PERSONA_DESCRIPTION: &str = "페르소나를 생성하지 못했습니다.";

/// A representative user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub description: String,
}

impl Persona {
    fn fallback() -> Self {
        Self {
            name: FALLBACK_PERSONA_NAME.to_string(),
            description: FALLBACK_PERSONA_DESCRIPTION.to_string(),
        }
    }

    /// Accepts `{name, description}` objects or bare strings
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self {
                name: s.trim().to_string(),
                description: String::new(),
            }),
            Value::Object(_) => {
                let name = text_or(value, &["name", "title"], "");
                let description = text_or(value, &["description", "summary"], "");
                if name.is_empty() && description.is_empty() {
                    None
                } else if name.is_empty() {
                    Some(Self {
                        name: FALLBACK_PERSONA_NAME.to_string(),
                        description,
                    })
                } else {
                    Some(Self { name, description })
                }
            }
            _ => None,
        }
    }
}

/// Segment description nested under `targetUsers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUsers {
    pub primary: String,
    pub characteristics: Vec<String>,
    pub personas: Vec<Persona>,
}

/// Output of the target-user stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetUserResult {
    pub target_users: TargetUsers,
    pub pain_points: Vec<String>,
    pub goals: Vec<String>,
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl TargetUserResult {
    pub fn fallback() -> Self {
        Self {
            target_users: TargetUsers {
                primary: FALLBACK_PRIMARY.to_string(),
                characteristics: to_strings(FALLBACK_CHARACTERISTICS),
                personas: vec![Persona::fallback()],
            },
            pain_points: to_strings(FALLBACK_PAIN_POINTS),
            goals: to_strings(FALLBACK_GOALS),
        }
    }

    /// Validate a parsed response field by field
    pub fn from_value(value: &Value) -> Self {
        let empty = Value::Null;
        let users = object(value, &["target_users", "targetUsers"]).unwrap_or(&empty);

        let personas: Vec<Persona> = match field(users, &["personas"]) {
            Some(Value::Array(items)) => items.iter().filter_map(Persona::from_value).collect(),
            _ => Vec::new(),
        };

        Self {
            target_users: TargetUsers {
                primary: text_or(users, &["primary", "primary_segment"], FALLBACK_PRIMARY),
                characteristics: string_list_or(
                    users,
                    &["characteristics"],
                    FALLBACK_CHARACTERISTICS,
                ),
                personas: if personas.is_empty() {
                    vec![Persona::fallback()]
                } else {
                    personas
                },
            },
            pain_points: string_list_or(value, &["pain_points", "painPoints"], FALLBACK_PAIN_POINTS),
            goals: string_list_or(value, &["goals"], FALLBACK_GOALS),
        }
    }

    pub fn prompt_excerpt(&self) -> String {
        format!(
            "Primary users: {}\nCharacteristics:\n{}\nPain points:\n{}\nGoals:\n{}",
            self.target_users.primary,
            bullets(&self.target_users.characteristics),
            bullets(&self.pain_points),
            bullets(&self.goals)
        )
    }
}

/// Target-user stage agent
pub struct TargetUserSkill {
    llm: Arc<dyn LanguageModelClient>,
}

impl TargetUserSkill {
    pub fn new(llm: Arc<dyn LanguageModelClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl StageAgent for TargetUserSkill {
    fn stage(&self) -> StageKind {
        StageKind::TargetUser
    }

    fn fallback_result(&self) -> StageOutput {
        StageOutput::TargetUser(TargetUserResult::fallback())
    }

    async fn try_analyze(&self, context: &StageContext) -> anyhow::Result<StageOutput> {
        let prompt = context.user_prompt(StageKind::TargetUser);
        let response = self.llm.chat(SYSTEM_PROMPT, &prompt).await?;
        let value = parse_response(
            StageKind::TargetUser,
            &response,
            &["target_users", "targetUsers", "pain_points", "painPoints", "goals"],
        )?;
        Ok(StageOutput::TargetUser(TargetUserResult::from_value(&value)))
    }
}

const SYSTEM_PROMPT: &str = prompts::TARGET_USER;
