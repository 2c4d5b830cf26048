//! # Stage Context
//!
//! The input of one analysis run and the context that accumulates as the
//! stages complete. Each stage reads only the upstream results it declares
//! in [`StageKind::dependencies`] and renders a placeholder for any that are
//! missing.

use anyhow::Result;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::pipeline::stages::StageKind;
use crate::skills::market_analysis_skill::MarketAnalysisResult;
use crate::skills::scoring_skill::ScoringResult;
use crate::skills::strategy_skill::StrategyResult;
use crate::skills::summary_skill::SummaryResult;
use crate::skills::target_user_skill::TargetUserResult;

/// Ordered question → answer pairs collected before the analysis.
///
/// Serialized as a JSON object; document order is preserved on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowUpAnswers(Vec<(String, String)>);

impl FollowUpAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an answer, keeping insertion order
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Answers whose value is not blank, in order
    pub fn non_blank(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(k, v)| (k.as_str(), v.trim()))
            .filter(|(_, v)| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FollowUpAnswers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Serialize for FollowUpAnswers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FollowUpAnswers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AnswersVisitor;

        impl<'de> Visitor<'de> for AnswersVisitor {
            type Value = FollowUpAnswers;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of follow-up answers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut answers = FollowUpAnswers::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    let text = match value {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    answers.push(key, text);
                }
                Ok(answers)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(FollowUpAnswers::new())
            }
        }

        deserializer.deserialize_any(AnswersVisitor)
    }
}

/// Immutable input of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub idea: String,
    #[serde(default)]
    pub follow_up_answers: FollowUpAnswers,
}

impl AnalysisRequest {
    /// Create a request; the idea must not be blank
    pub fn new(idea: impl Into<String>, follow_up_answers: FollowUpAnswers) -> Result<Self> {
        let idea = idea.into().trim().to_string();
        anyhow::ensure!(!idea.is_empty(), "idea must not be empty");
        Ok(Self {
            idea,
            follow_up_answers,
        })
    }
}

/// A validated result of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Summary(SummaryResult),
    TargetUser(TargetUserResult),
    MarketAnalysis(MarketAnalysisResult),
    Strategy(StrategyResult),
    Scoring(ScoringResult),
}

impl StageOutput {
    /// Stage that produced this output
    pub fn stage(&self) -> StageKind {
        match self {
            StageOutput::Summary(_) => StageKind::Summary,
            StageOutput::TargetUser(_) => StageKind::TargetUser,
            StageOutput::MarketAnalysis(_) => StageKind::MarketAnalysis,
            StageOutput::Strategy(_) => StageKind::Strategy,
            StageOutput::Scoring(_) => StageKind::Scoring,
        }
    }

    /// Short rendering used when a downstream stage builds its prompt
    pub fn prompt_excerpt(&self) -> String {
        match self {
            StageOutput::Summary(r) => r.prompt_excerpt(),
            StageOutput::TargetUser(r) => r.prompt_excerpt(),
            StageOutput::MarketAnalysis(r) => r.prompt_excerpt(),
            StageOutput::Strategy(r) => r.prompt_excerpt(),
            StageOutput::Scoring(r) => r.prompt_excerpt(),
        }
    }
}

/// Accumulated input and upstream results for one run.
///
/// Grows monotonically: results are merged in, never removed.
#[derive(Debug, Clone)]
pub struct StageContext {
    request: AnalysisRequest,
    previous_results: BTreeMap<StageKind, StageOutput>,
}

impl StageContext {
    pub fn new(request: AnalysisRequest) -> Self {
        Self {
            request,
            previous_results: BTreeMap::new(),
        }
    }

    pub fn idea(&self) -> &str {
        &self.request.idea
    }

    pub fn follow_up_answers(&self) -> &FollowUpAnswers {
        &self.request.follow_up_answers
    }

    /// Merge a stage's validated output under its stage key
    pub fn merge(&mut self, output: StageOutput) {
        self.previous_results.insert(output.stage(), output);
    }

    /// Number of stages merged so far
    pub fn len(&self) -> usize {
        self.previous_results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous_results.is_empty()
    }

    pub fn get(&self, stage: StageKind) -> Option<&StageOutput> {
        self.previous_results.get(&stage)
    }

    /// Remove a stage's output, consuming the run's accumulated results
    pub(crate) fn take(&mut self, stage: StageKind) -> Option<StageOutput> {
        self.previous_results.remove(&stage)
    }

    pub fn summary(&self) -> Option<&SummaryResult> {
        match self.get(StageKind::Summary) {
            Some(StageOutput::Summary(r)) => Some(r),
            _ => None,
        }
    }

    pub fn target_user(&self) -> Option<&TargetUserResult> {
        match self.get(StageKind::TargetUser) {
            Some(StageOutput::TargetUser(r)) => Some(r),
            _ => None,
        }
    }

    pub fn market_analysis(&self) -> Option<&MarketAnalysisResult> {
        match self.get(StageKind::MarketAnalysis) {
            Some(StageOutput::MarketAnalysis(r)) => Some(r),
            _ => None,
        }
    }

    pub fn strategy(&self) -> Option<&StrategyResult> {
        match self.get(StageKind::Strategy) {
            Some(StageOutput::Strategy(r)) => Some(r),
            _ => None,
        }
    }

    /// Build the user prompt for `stage`: the idea, non-blank answers, and
    /// an excerpt of every declared upstream stage.
    pub fn user_prompt(&self, stage: StageKind) -> String {
        let mut prompt = format!("# Business Idea\n{}\n", self.idea());

        let answers: Vec<String> = self
            .follow_up_answers()
            .non_blank()
            .map(|(question, answer)| format!("- {}: {}", question, answer))
            .collect();
        if !answers.is_empty() {
            prompt.push_str("\n# Follow-up Answers\n");
            prompt.push_str(&answers.join("\n"));
            prompt.push('\n');
        }

        for dep in stage.dependencies() {
            prompt.push_str(&format!("\n# {}\n", dep.display_name()));
            match self.get(*dep) {
                Some(output) => prompt.push_str(&output.prompt_excerpt()),
                None => prompt.push_str("(not available)"),
            }
            prompt.push('\n');
        }

        prompt
    }
}
