//! # Scoring Skill
//!
//! Final stage. The model only supplies raw dimension scores, reasons and
//! optional extras; everything derived from them is computed here by a
//! deterministic rubric:
//!
//! - each dimension score is clamped to `[0, max]`
//! - the total is the clamped sum, itself clamped to `[0, 100]`
//! - the grade comes from descending threshold bands
//! - radar data is `round(score / max * 10)` per dimension
//! - weak areas are standardised against a fixed label vocabulary, or
//!   inferred from the two lowest score ratios when the model gave none

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::models::LanguageModelClient;
use crate::pipeline::stages::StageKind;
use crate::skills::agent::{parse_response, StageAgent};
use crate::skills::context::{StageContext, StageOutput};
use crate::skills::llm_helpers::{as_int, excerpt, field, int_or, object, string_list_or, text_or};
use crate::skills::prompts;

const FALLBACK_REASON: &str = "점수 근거를 분석하지 못했습니다.";
const FALLBACK_COMMENT: &str = "종합 평가를 생성하지 못했습니다.";
const FALLBACK_FIGURE: &str = "추정 불가";
const FALLBACK_BUSINESS_TYPE: &str = "미정";
const FALLBACK_REVENUE_MODEL: &str = "미정";

/// Canonical weak-area labels with the keywords that map onto them.
///
/// Order matters: the first label whose keyword matches wins.
const WEAK_AREA_VOCABULARY: [(&str, &[&str]); 6] = [
    ("시장성", &["시장", "market", "수요", "demand", "성장"]),
    ("문제 정의", &["문제", "problem", "pain", "니즈", "need"]),
    ("차별화", &["차별", "경쟁", "moat", "differentiat", "compet", "진입장벽"]),
    ("실현 가능성", &["실현", "실행", "기술", "feasib", "운영", "execution"]),
    ("수익 모델", &["수익", "revenue", "business model", "비즈니스 모델", "monetiz", "가격"]),
    ("타겟 고객", &["타겟", "고객", "target", "customer", "사용자", "user", "페르소나"]),
];

/// Scored dimension of the rubric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Market,
    Problem,
    Moat,
    Feasibility,
    Business,
}

impl Dimension {
    /// Fixed order used for breakdowns and radar data
    pub const ALL: [Dimension; 5] = [
        Dimension::Market,
        Dimension::Problem,
        Dimension::Moat,
        Dimension::Feasibility,
        Dimension::Business,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Market => "market",
            Dimension::Problem => "problem",
            Dimension::Moat => "moat",
            Dimension::Feasibility => "feasibility",
            Dimension::Business => "business",
        }
    }

    /// Canonical weak-area label for this dimension
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Market => "시장성",
            Dimension::Problem => "문제 정의",
            Dimension::Moat => "차별화",
            Dimension::Feasibility => "실현 가능성",
            Dimension::Business => "수익 모델",
        }
    }

    pub fn default_max(&self) -> i64 {
        match self {
            Dimension::Market => 30,
            Dimension::Problem => 25,
            Dimension::Moat => 20,
            Dimension::Feasibility => 15,
            Dimension::Business => 10,
        }
    }
}

/// Letter grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionWeight {
    pub dimension: Dimension,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBand {
    pub grade: Grade,
    /// Inclusive lower bound
    pub min: i64,
}

/// Rubric tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub dimensions: Vec<DimensionWeight>,
    /// Checked top-down; first band whose `min` is reached wins
    pub grade_bands: Vec<GradeBand>,
    pub floor_grade: Grade,
    pub weak_area_limit: usize,
    pub inferred_weak_areas: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            dimensions: Dimension::ALL
                .iter()
                .map(|d| DimensionWeight {
                    dimension: *d,
                    max: d.default_max(),
                })
                .collect(),
            grade_bands: vec![
                GradeBand { grade: Grade::S, min: 90 },
                GradeBand { grade: Grade::A, min: 80 },
                GradeBand { grade: Grade::B, min: 70 },
                GradeBand { grade: Grade::C, min: 60 },
            ],
            floor_grade: Grade::D,
            weak_area_limit: 3,
            inferred_weak_areas: 2,
        }
    }
}

impl ScoringConfig {
    /// Maximum points for a dimension
    pub fn max_for(&self, dimension: Dimension) -> i64 {
        self.dimensions
            .iter()
            .find(|w| w.dimension == dimension)
            .map(|w| w.max)
            .unwrap_or_else(|| dimension.default_max())
    }

    pub fn clamp(&self, dimension: Dimension, raw: i64) -> i64 {
        raw.clamp(0, self.max_for(dimension).max(0))
    }

    pub fn total(&self, scores: &[i64]) -> i64 {
        scores.iter().sum::<i64>().clamp(0, 100)
    }

    pub fn grade(&self, total: i64) -> Grade {
        self.grade_bands
            .iter()
            .find(|band| total >= band.min)
            .map(|band| band.grade)
            .unwrap_or(self.floor_grade)
    }

    /// Per-dimension score on a 0-10 scale, in [`Dimension::ALL`] order
    pub fn radar(&self, scores: &[i64; 5]) -> Vec<i64> {
        Dimension::ALL
            .iter()
            .zip(scores)
            .map(|(d, score)| ratio(*score, self.max_for(*d)))
            .map(|r| (r * 10.0).round() as i64)
            .collect()
    }

    /// Labels of the lowest-ratio dimensions, lowest first
    pub fn infer_weak_areas(&self, scores: &[i64; 5]) -> Vec<String> {
        let mut ranked: Vec<(Dimension, f64)> = Dimension::ALL
            .iter()
            .zip(scores)
            .map(|(d, score)| (*d, ratio(*score, self.max_for(*d))))
            .collect();
        // stable: ties keep rubric order
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked
            .into_iter()
            .take(self.inferred_weak_areas)
            .map(|(d, _)| d.label().to_string())
            .collect()
    }

    /// Map free-form entries onto canonical labels, dropping duplicates and
    /// entries that match nothing.
    pub fn standardize_weak_areas(&self, entries: &[String]) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for entry in entries {
            let Some(label) = canonical_label(entry) else {
                tracing::debug!(entry = %entry, "Dropping unrecognised weak area");
                continue;
            };
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
            if labels.len() >= self.weak_area_limit {
                break;
            }
        }
        labels
    }
}

fn ratio(score: i64, max: i64) -> f64 {
    if max <= 0 {
        0.0
    } else {
        score as f64 / max as f64
    }
}

fn canonical_label(entry: &str) -> Option<&'static str> {
    let entry = entry.trim().to_lowercase();
    if entry.is_empty() {
        return None;
    }
    WEAK_AREA_VOCABULARY
        .iter()
        .find(|(label, _)| entry.contains(label))
        .or_else(|| {
            WEAK_AREA_VOCABULARY
                .iter()
                .find(|(_, keywords)| keywords.iter().any(|k| entry.contains(k)))
        })
        .map(|(label, _)| *label)
}

/// One dimension's contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: i64,
    pub max: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub market: DimensionScore,
    pub problem: DimensionScore,
    pub moat: DimensionScore,
    pub feasibility: DimensionScore,
    pub business: DimensionScore,
}

impl ScoreBreakdown {
    pub fn get(&self, dimension: Dimension) -> &DimensionScore {
        match dimension {
            Dimension::Market => &self.market,
            Dimension::Problem => &self.problem,
            Dimension::Moat => &self.moat,
            Dimension::Feasibility => &self.feasibility,
            Dimension::Business => &self.business,
        }
    }

    pub fn scores(&self) -> [i64; 5] {
        Dimension::ALL.map(|d| self.get(d).score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSize {
    pub tam: String,
    pub sam: String,
    pub som: String,
}

impl Default for MarketSize {
    fn default() -> Self {
        Self {
            tam: FALLBACK_FIGURE.to_string(),
            sam: FALLBACK_FIGURE.to_string(),
            som: FALLBACK_FIGURE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitors {
    pub direct: Vec<String>,
    pub indirect: Vec<String>,
}

/// Raw material the rubric is applied to, whether it came from the model
/// or from a canned report.
#[derive(Debug, Clone)]
pub struct ScoreInput {
    /// `(raw score, reason)` in [`Dimension::ALL`] order
    pub dimensions: [(i64, String); 5],
    pub market_size: MarketSize,
    pub competitors: Competitors,
    pub business_type: String,
    pub revenue_model: String,
    /// `None` when the model did not supply the field
    pub weak_areas: Option<Vec<String>>,
    pub comment: String,
}

impl ScoreInput {
    /// Decode a model response; every field defaults on its own
    pub fn from_value(value: &Value) -> Self {
        let empty = Value::Null;
        let scores = object(value, &["scores", "breakdown"]).unwrap_or(&empty);

        let dimensions = Dimension::ALL.map(|d| match field(scores, &[d.key()]) {
            Some(entry @ Value::Object(_)) => (
                int_or(entry, &["score", "value"], 0),
                text_or(entry, &["reason", "rationale"], FALLBACK_REASON),
            ),
            Some(entry) => (as_int(entry).unwrap_or(0), FALLBACK_REASON.to_string()),
            None => (0, FALLBACK_REASON.to_string()),
        });

        let market = field(scores, &["market"]).unwrap_or(&empty);
        let market_size = object(market, &["market_size", "marketSize"])
            .or_else(|| object(value, &["market_size", "marketSize"]))
            .map(|m| MarketSize {
                tam: text_or(m, &["tam", "TAM"], FALLBACK_FIGURE),
                sam: text_or(m, &["sam", "SAM"], FALLBACK_FIGURE),
                som: text_or(m, &["som", "SOM"], FALLBACK_FIGURE),
            })
            .unwrap_or_default();

        let moat = field(scores, &["moat"]).unwrap_or(&empty);
        let competitors = object(moat, &["competitors"])
            .or_else(|| object(value, &["competitors"]))
            .map(|c| Competitors {
                direct: string_list_or(c, &["direct"], &[]),
                indirect: string_list_or(c, &["indirect"], &[]),
            })
            .unwrap_or_default();

        let business = field(scores, &["business"]).unwrap_or(&empty);
        let business_type = text_or(
            business,
            &["business_type", "businessType"],
            &text_or(value, &["business_type", "businessType"], FALLBACK_BUSINESS_TYPE),
        );
        let revenue_model = text_or(
            business,
            &["revenue_model", "revenueModel"],
            &text_or(value, &["revenue_model", "revenueModel"], FALLBACK_REVENUE_MODEL),
        );

        let weak_areas = match field(value, &["weak_areas", "weakAreas"]) {
            Some(Value::Array(_)) => Some(string_list_or(value, &["weak_areas", "weakAreas"], &[])),
            _ => None,
        };

        Self {
            dimensions,
            market_size,
            competitors,
            business_type,
            revenue_model,
            weak_areas,
            comment: text_or(value, &["comment", "summary"], FALLBACK_COMMENT),
        }
    }
}

/// Output of the scoring stage (stored under `score`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub overall: i64,
    pub grade: Grade,
    pub breakdown: ScoreBreakdown,
    pub market_size: MarketSize,
    pub competitors: Competitors,
    pub business_type: String,
    pub revenue_model: String,
    pub radar_chart_data: Vec<i64>,
    pub weak_areas: Vec<String>,
    pub comment: String,
}

impl ScoringResult {
    /// Apply the rubric
    pub fn from_input(config: &ScoringConfig, input: ScoreInput) -> Self {
        let rate = |dimension: Dimension, (raw, reason): (i64, String)| DimensionScore {
            score: config.clamp(dimension, raw),
            max: config.max_for(dimension),
            reason,
        };
        let [market, problem, moat, feasibility, business] = input.dimensions;
        let breakdown = ScoreBreakdown {
            market: rate(Dimension::Market, market),
            problem: rate(Dimension::Problem, problem),
            moat: rate(Dimension::Moat, moat),
            feasibility: rate(Dimension::Feasibility, feasibility),
            business: rate(Dimension::Business, business),
        };

        let scores = breakdown.scores();
        let overall = config.total(&scores);

        let weak_areas = input
            .weak_areas
            .map(|entries| config.standardize_weak_areas(&entries))
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(|| config.infer_weak_areas(&scores));

        Self {
            overall,
            grade: config.grade(overall),
            radar_chart_data: config.radar(&scores),
            breakdown,
            market_size: input.market_size,
            competitors: input.competitors,
            business_type: input.business_type,
            revenue_model: input.revenue_model,
            weak_areas,
            comment: input.comment,
        }
    }

    pub fn fallback(config: &ScoringConfig) -> Self {
        Self::from_input(config, ScoreInput::from_value(&Value::Null))
    }

    pub fn prompt_excerpt(&self) -> String {
        format!(
            "Overall: {} ({:?})\nWeak areas: {}\nComment: {}",
            self.overall,
            self.grade,
            self.weak_areas.join(", "),
            excerpt(&self.comment, 300)
        )
    }
}

/// Scoring stage agent
pub struct ScoringSkill {
    llm: Arc<dyn LanguageModelClient>,
    config: ScoringConfig,
}

impl ScoringSkill {
    pub fn new(llm: Arc<dyn LanguageModelClient>, config: ScoringConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl StageAgent for ScoringSkill {
    fn stage(&self) -> StageKind {
        StageKind::Scoring
    }

    fn fallback_result(&self) -> StageOutput {
        StageOutput::Scoring(ScoringResult::fallback(&self.config))
    }

    async fn try_analyze(&self, context: &StageContext) -> anyhow::Result<StageOutput> {
        let prompt = context.user_prompt(StageKind::Scoring);
        let response = self.llm.chat(SYSTEM_PROMPT, &prompt).await?;
        let value = parse_response(
            StageKind::Scoring,
            &response,
            &["scores", "breakdown", "weak_areas", "weakAreas", "comment"],
        )?;
        let input = ScoreInput::from_value(&value);
        Ok(StageOutput::Scoring(ScoringResult::from_input(&self.config, input)))
    }
}

const SYSTEM_PROMPT: &str = prompts::SCORING;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::agent::test_support::ScriptedLlm;
    use crate::skills::context::{AnalysisRequest, FollowUpAnswers};
    use serde_json::json;

    fn score(value: Value) -> ScoringResult {
        ScoringResult::from_input(&ScoringConfig::default(), ScoreInput::from_value(&value))
    }

    fn plain_scores(m: i64, p: i64, o: i64, f: i64, b: i64) -> Value {
        json!({
            "scores": {"market": m, "problem": p, "moat": o, "feasibility": f, "business": b}
        })
    }

    // The band and rounding formulas decide here: 78 is a B (A starts at 80)
    // and 20/25 rounds to 8. DESIGN.md "Rubric example mismatch" records why
    // this differs from the hand-worked "A" / [8,7,7,8,8] example.
    #[test]
    fn test_reference_dimension_scores() {
        let result = score(plain_scores(24, 20, 14, 12, 8));
        assert_eq!(result.overall, 78);
        assert_eq!(result.grade, Grade::B);
        assert_eq!(result.radar_chart_data, vec![8, 8, 7, 8, 8]);
    }

    #[test]
    fn test_grade_band_edges() {
        let config = ScoringConfig::default();
        assert_eq!(config.grade(100), Grade::S);
        assert_eq!(config.grade(90), Grade::S);
        assert_eq!(config.grade(89), Grade::A);
        assert_eq!(config.grade(80), Grade::A);
        assert_eq!(config.grade(70), Grade::B);
        assert_eq!(config.grade(60), Grade::C);
        assert_eq!(config.grade(59), Grade::D);
        assert_eq!(config.grade(0), Grade::D);
    }

    #[test]
    fn test_scores_are_clamped_per_dimension() {
        let result = score(json!({
            "scores": {
                "market": {"score": 45, "reason": "과대평가"},
                "problem": -3,
                "moat": "14",
                "feasibility": 12.4,
                "business": {"score": "8"}
            }
        }));
        assert_eq!(result.breakdown.scores(), [30, 0, 14, 12, 8]);
        assert_eq!(result.overall, 64);
        assert_eq!(result.grade, Grade::C);
        assert_eq!(result.breakdown.market.reason, "과대평가");
        assert_eq!(result.breakdown.problem.reason, FALLBACK_REASON);
        assert_eq!(result.breakdown.moat.max, 20);
    }

    #[test]
    fn test_weak_areas_inferred_when_omitted() {
        let result = score(plain_scores(27, 10, 16, 5, 9));
        assert_eq!(result.weak_areas, vec!["실현 가능성", "문제 정의"]);
    }

    #[test]
    fn test_weak_area_ties_keep_rubric_order() {
        let config = ScoringConfig::default();
        assert_eq!(config.infer_weak_areas(&[24, 20, 14, 12, 8]), vec!["차별화", "시장성"]);
    }

    #[test]
    fn test_weak_areas_standardised_deduplicated_and_capped() {
        let mut value = plain_scores(24, 20, 14, 12, 8);
        value["weak_areas"] = json!([
            "수익 모델이 약함",
            "Market size unclear",
            "타겟 고객 불명확",
            "시장 규모",
            "경쟁 심화"
        ]);
        assert_eq!(score(value).weak_areas, vec!["수익 모델", "시장성", "타겟 고객"]);
    }

    #[test]
    fn test_unrecognised_weak_areas_fall_back_to_inference() {
        let mut value = plain_scores(27, 10, 16, 5, 9);
        value["weakAreas"] = json!(["???", ""]);
        assert_eq!(score(value).weak_areas, vec!["실현 가능성", "문제 정의"]);
    }

    #[test]
    fn test_sub_objects_default_independently() {
        let result = score(json!({
            "scores": {
                "market": {"score": 20, "market_size": {"tam": "1조 원"}},
                "moat": {"score": 10, "competitors": {"direct": ["카카오"]}},
                "business": {"score": 5, "revenue_model": "구독"}
            }
        }));
        assert_eq!(result.market_size.tam, "1조 원");
        assert_eq!(result.market_size.som, FALLBACK_FIGURE);
        assert_eq!(result.competitors.direct, vec!["카카오"]);
        assert!(result.competitors.indirect.is_empty());
        assert_eq!(result.revenue_model, "구독");
        assert_eq!(result.business_type, FALLBACK_BUSINESS_TYPE);
    }

    #[test]
    fn test_fallback_is_schema_complete() {
        let value = serde_json::to_value(ScoringResult::fallback(&ScoringConfig::default())).unwrap();
        for key in [
            "overall",
            "grade",
            "breakdown",
            "marketSize",
            "competitors",
            "businessType",
            "revenueModel",
            "radarChartData",
            "weakAreas",
            "comment",
        ] {
            assert!(!value[key].is_null(), "missing {}", key);
        }
        assert_eq!(value["overall"], 0);
        assert_eq!(value["grade"], "D");
        assert_eq!(value["radarChartData"].as_array().unwrap().len(), 5);
        assert_eq!(value["breakdown"]["market"]["max"], 30);
    }

    #[test]
    fn test_custom_bands_apply() {
        let config = ScoringConfig {
            grade_bands: vec![GradeBand { grade: Grade::A, min: 50 }],
            floor_grade: Grade::C,
            ..ScoringConfig::default()
        };
        assert_eq!(config.grade(55), Grade::A);
        assert_eq!(config.grade(10), Grade::C);
    }

    #[tokio::test]
    async fn test_analyze_applies_rubric_to_model_scores() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"scores": {"market": 24, "problem": 20, "moat": 14, "feasibility": 12, "business": 8},
               "overall": 99, "grade": "S", "comment": "무난함"}"#,
        ]));
        let ctx = StageContext::new(
            AnalysisRequest::new("우산 공유 앱", FollowUpAnswers::new()).unwrap(),
        );
        let outcome = ScoringSkill::new(llm, ScoringConfig::default()).analyze(&ctx).await;
        assert!(!outcome.fell_back);
        match outcome.output {
            StageOutput::Scoring(r) => {
                assert_eq!(r.overall, 78);
                assert_eq!(r.grade, Grade::B);
                assert_eq!(r.comment, "무난함");
            }
            other => panic!("unexpected output {:?}", other),
        }
    }
}
