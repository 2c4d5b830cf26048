//! # Market Analysis Skill
//!
//! Third stage: market potential, size, trends, competitors, opportunities
//! and risks. Reads the idea, the summary and the target-user stages.
//!
//! ## Retrieval modes
//!
//! ```text
//! WebGrounded ──error──▶ StaticTools ──error──▶ Ungrounded ──error──▶ fallback
//! ```
//!
//! - `WebGrounded`: three web lookups (size, competitors, trends) enrich the
//!   prompt; each lookup may fail on its own.
//! - `StaticTools`: the model may call the bundled dataset tools a few
//!   times before answering.
//! - `Ungrounded`: pure model inference.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::models::LanguageModelClient;
use crate::pipeline::stages::StageKind;
use crate::skills::agent::{parse_response, StageAgent};
use crate::skills::context::{StageContext, StageOutput};
use crate::skills::llm_helpers::{bullets, excerpt, object, string_list_or, text_or};
use crate::skills::prompts;
use crate::skills::tools::{market_data_tools, MarketDataset, SearchHit, ToolBudget, WebSearch};

const FALLBACK_POTENTIAL: &str = "시장 잠재력 분석에 실패했습니다.";
const FALLBACK_MARKET_SIZE: &str = "시장 규모를 추정하지 못했습니다.";
const FALLBACK_TRENDS: &str = "시장 트렌드를 분석하지 못했습니다.";
const FALLBACK_COMPETITORS: &[&str] = &["경쟁사 정보를 수집하지 못했습니다."];
const FALLBACK_DIFFERENTIATION: &str = "차별화 전략을 분석하지 못했습니다.";
const FALLBACK_OPPORTUNITIES: &[&str] = &["시장 기회를 분석하지 못했습니다."];
const FALLBACK_RISKS: &[&str] = &["시장 리스크를 분석하지 못했습니다."];

const EXPECTED_KEYS: &[&str] = &["market_analysis", "marketAnalysis", "opportunities", "risks"];

/// Where the market figures in a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketDataMode {
    /// Live web search results
    WebGrounded,
    /// Bundled market dataset queried through tool calls
    StaticTools,
    /// Model knowledge only
    #[default]
    Ungrounded,
}

impl MarketDataMode {
    /// Next mode in the degradation chain
    pub fn degrade(self) -> Option<Self> {
        match self {
            MarketDataMode::WebGrounded => Some(MarketDataMode::StaticTools),
            MarketDataMode::StaticTools => Some(MarketDataMode::Ungrounded),
            MarketDataMode::Ungrounded => None,
        }
    }
}

/// Market overview nested under `marketAnalysis`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    pub potential: String,
    pub market_size: String,
    pub trends: String,
    pub competitors: Vec<String>,
    pub differentiation: String,
}

/// Output of the market-analysis stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalysisResult {
    pub market_analysis: MarketOverview,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
    /// Mode that actually produced this result
    pub data_source: MarketDataMode,
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl MarketAnalysisResult {
    pub fn fallback() -> Self {
        Self {
            market_analysis: MarketOverview {
                potential: FALLBACK_POTENTIAL.to_string(),
                market_size: FALLBACK_MARKET_SIZE.to_string(),
                trends: FALLBACK_TRENDS.to_string(),
                competitors: to_strings(FALLBACK_COMPETITORS),
                differentiation: FALLBACK_DIFFERENTIATION.to_string(),
            },
            opportunities: to_strings(FALLBACK_OPPORTUNITIES),
            risks: to_strings(FALLBACK_RISKS),
            data_source: MarketDataMode::Ungrounded,
        }
    }

    /// Validate a parsed response field by field
    pub fn from_value(value: &Value, data_source: MarketDataMode) -> Self {
        let empty = Value::Null;
        let market = object(value, &["market_analysis", "marketAnalysis"]).unwrap_or(&empty);

        // `trends` is sometimes returned as a list
        let trends = match string_list_or(market, &["trends"], &[]) {
            list if list.len() > 1 => list.join(", "),
            list => list
                .into_iter()
                .next()
                .unwrap_or_else(|| FALLBACK_TRENDS.to_string()),
        };

        Self {
            market_analysis: MarketOverview {
                potential: text_or(market, &["potential"], FALLBACK_POTENTIAL),
                market_size: text_or(market, &["market_size", "marketSize"], FALLBACK_MARKET_SIZE),
                trends,
                competitors: string_list_or(market, &["competitors"], FALLBACK_COMPETITORS),
                differentiation: text_or(market, &["differentiation"], FALLBACK_DIFFERENTIATION),
            },
            opportunities: string_list_or(value, &["opportunities"], FALLBACK_OPPORTUNITIES),
            risks: string_list_or(value, &["risks"], FALLBACK_RISKS),
            data_source,
        }
    }

    pub fn prompt_excerpt(&self) -> String {
        let m = &self.market_analysis;
        format!(
            "Potential: {}\nMarket size: {}\nTrends: {}\nCompetitors: {}\nDifferentiation: {}\nOpportunities:\n{}\nRisks:\n{}",
            excerpt(&m.potential, 300),
            m.market_size,
            excerpt(&m.trends, 300),
            m.competitors.join(", "),
            excerpt(&m.differentiation, 300),
            bullets(&self.opportunities),
            bullets(&self.risks)
        )
    }
}

/// Market-analysis stage agent
pub struct MarketAnalysisSkill {
    llm: Arc<dyn LanguageModelClient>,
    mode: MarketDataMode,
    search: Option<Arc<dyn WebSearch>>,
    dataset: Arc<MarketDataset>,
    max_tool_calls: usize,
}

impl MarketAnalysisSkill {
    pub fn new(
        llm: Arc<dyn LanguageModelClient>,
        mode: MarketDataMode,
        dataset: Arc<MarketDataset>,
    ) -> Self {
        Self {
            llm,
            mode,
            search: None,
            dataset,
            max_tool_calls: 3,
        }
    }

    /// Attach a web search backend for the grounded mode
    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Limit on dataset tool calls in the static-tools mode
    pub fn with_max_tool_calls(mut self, calls: usize) -> Self {
        self.max_tool_calls = calls;
        self
    }

    async fn run_mode(
        &self,
        mode: MarketDataMode,
        context: &StageContext,
    ) -> anyhow::Result<MarketAnalysisResult> {
        match mode {
            MarketDataMode::WebGrounded => self.analyze_grounded(context).await,
            MarketDataMode::StaticTools => self.analyze_with_tools(context).await,
            MarketDataMode::Ungrounded => self.analyze_ungrounded(context).await,
        }
    }

    async fn analyze_grounded(&self, context: &StageContext) -> anyhow::Result<MarketAnalysisResult> {
        let search = self
            .search
            .as_ref()
            .context("web-grounded mode has no search backend")?;

        let topic = excerpt(context.idea(), 60);
        let lookups = [
            ("Market size", format!("{} 시장 규모", topic)),
            ("Competitors", format!("{} 경쟁사", topic)),
            ("Trends", format!("{} 트렌드", topic)),
        ];

        let mut research = String::new();
        for (label, query) in &lookups {
            match search.search(query, 5).await {
                Ok(hits) if !hits.is_empty() => {
                    research.push_str(&format!("\n## {}\n{}\n", label, render_hits(&hits)));
                }
                Ok(_) => tracing::debug!(query = %query, "Web lookup returned no results"),
                Err(e) => tracing::warn!(query = %query, error = %e, "Web lookup failed"),
            }
        }
        anyhow::ensure!(!research.is_empty(), "all web lookups failed");

        let prompt = format!(
            "{}\n# Web Research\n{}",
            context.user_prompt(StageKind::MarketAnalysis),
            research
        );
        let response = self.llm.chat(SYSTEM_PROMPT, &prompt).await?;
        let value = parse_response(StageKind::MarketAnalysis, &response, EXPECTED_KEYS)?;
        Ok(MarketAnalysisResult::from_value(&value, MarketDataMode::WebGrounded))
    }

    async fn analyze_with_tools(&self, context: &StageContext) -> anyhow::Result<MarketAnalysisResult> {
        let system_prompt = format!("{}\n{}", SYSTEM_PROMPT, prompts::MARKET_TOOLS);
        let prompt = context.user_prompt(StageKind::MarketAnalysis);
        let budget = Arc::new(ToolBudget::new(self.max_tool_calls));
        let tools = market_data_tools(self.dataset.clone(), budget.clone());

        let response = self.llm.chat_with_tools(&system_prompt, &prompt, tools).await?;
        tracing::debug!(
            calls = self.max_tool_calls.saturating_sub(budget.remaining()),
            "Market data tools finished"
        );
        let value = parse_response(StageKind::MarketAnalysis, &response, EXPECTED_KEYS)?;
        Ok(MarketAnalysisResult::from_value(&value, MarketDataMode::StaticTools))
    }

    async fn analyze_ungrounded(&self, context: &StageContext) -> anyhow::Result<MarketAnalysisResult> {
        let prompt = context.user_prompt(StageKind::MarketAnalysis);
        let response = self.llm.chat(SYSTEM_PROMPT, &prompt).await?;
        let value = parse_response(StageKind::MarketAnalysis, &response, EXPECTED_KEYS)?;
        Ok(MarketAnalysisResult::from_value(&value, MarketDataMode::Ungrounded))
    }
}

fn render_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("- {} ({}): {}", hit.title, hit.url, excerpt(&hit.snippet, 300)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl StageAgent for MarketAnalysisSkill {
    fn stage(&self) -> StageKind {
        StageKind::MarketAnalysis
    }

    fn fallback_result(&self) -> StageOutput {
        StageOutput::MarketAnalysis(MarketAnalysisResult::fallback())
    }

    async fn try_analyze(&self, context: &StageContext) -> anyhow::Result<StageOutput> {
        let mut mode = self.mode;
        loop {
            match self.run_mode(mode, context).await {
                Ok(result) => return Ok(StageOutput::MarketAnalysis(result)),
                Err(e) => match mode.degrade() {
                    Some(next) => {
                        tracing::warn!(
                            from = ?mode,
                            to = ?next,
                            error = %format!("{:#}", e),
                            "Market data mode failed, degrading"
                        );
                        mode = next;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}

const SYSTEM_PROMPT: &str = prompts::MARKET_ANALYSIS;
