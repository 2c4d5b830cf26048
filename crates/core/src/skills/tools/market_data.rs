//! # Market Data Tools
//!
//! A curated, bundled market dataset exposed to the model as three radkit
//! tools (`market_size`, `competitors`, `trends`). Used by the static-tools
//! market-analysis mode.

use anyhow::Context;
use radkit::tools::{FunctionTool, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BUNDLED_DATASET: &str = include_str!("../defaults/market_data.json");

/// The three lookups the model may call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketTool {
    MarketSize,
    Competitors,
    Trends,
}

impl MarketTool {
    pub const ALL: [MarketTool; 3] = [
        MarketTool::MarketSize,
        MarketTool::Competitors,
        MarketTool::Trends,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MarketTool::MarketSize => "market_size",
            MarketTool::Competitors => "competitors",
            MarketTool::Trends => "trends",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            MarketTool::MarketSize => {
                "Market size figures (TAM/SAM/SOM, growth rate) for an industry. Args: {\"query\": \"industry keywords\"}"
            }
            MarketTool::Competitors => {
                "Known direct and indirect competitors for a product category. Args: {\"query\": \"category keywords\"}"
            }
            MarketTool::Trends => {
                "Current trends for an industry. Args: {\"query\": \"industry keywords\"}"
            }
        }
    }
}

/// TAM/SAM/SOM figures for one industry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSizeFigures {
    pub tam: String,
    pub sam: String,
    pub som: String,
    pub growth_rate: String,
}

/// Known competitors for one industry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorSet {
    pub direct: Vec<String>,
    pub indirect: Vec<String>,
}

/// One industry entry in the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustryRecord {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub market_size: MarketSizeFigures,
    pub competitors: CompetitorSet,
    pub trends: Vec<String>,
}

impl IndustryRecord {
    /// Number of keywords found in the (lowercased) query
    fn relevance(&self, query: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| query.contains(&k.to_lowercase()))
            .count()
    }
}

/// The static dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataset {
    pub version: String,
    pub industries: Vec<IndustryRecord>,
}

impl MarketDataset {
    /// Load the dataset compiled into the binary
    pub fn bundled() -> anyhow::Result<Self> {
        serde_json::from_str(BUNDLED_DATASET).context("Failed to parse bundled market dataset")
    }

    /// Industry whose keywords best match the query
    pub fn lookup(&self, query: &str) -> Option<&IndustryRecord> {
        let query = query.to_lowercase();
        self.industries
            .iter()
            .map(|industry| (industry.relevance(&query), industry))
            .filter(|(score, _)| *score > 0)
            .max_by_key(|(score, _)| *score)
            .map(|(_, industry)| industry)
    }

    /// Answer one tool lookup. A miss is reported in the payload rather
    /// than as an error so the model can retry with other keywords.
    pub fn answer(&self, tool: MarketTool, query: &str) -> Value {
        let Some(industry) = self.lookup(query) else {
            return json!({"tool": tool.name(), "query": query, "found": false});
        };

        let data = match tool {
            MarketTool::MarketSize => json!(industry.market_size),
            MarketTool::Competitors => json!(industry.competitors),
            MarketTool::Trends => json!(industry.trends),
        };
        json!({
            "tool": tool.name(),
            "query": query,
            "found": true,
            "industry": industry.name,
            "data": data,
            "dataset_version": self.version,
        })
    }
}

/// Call allowance shared by the dataset tools of one analysis
#[derive(Debug)]
pub struct ToolBudget {
    remaining: AtomicUsize,
}

impl ToolBudget {
    pub fn new(calls: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(calls),
        }
    }

    /// Spend one call; false once the allowance is used up
    pub fn take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }
}

/// Trimmed string value of one tool argument
fn query_text(args: Option<&Value>) -> String {
    args.and_then(Value::as_str).unwrap_or_default().trim().to_string()
}

/// Build the dataset tools for one analysis. Every call spends from
/// `budget`; once it is exhausted the tools answer with an error telling
/// the model to finish.
pub fn market_data_tools(dataset: Arc<MarketDataset>, budget: Arc<ToolBudget>) -> Vec<FunctionTool> {
    MarketTool::ALL
        .iter()
        .map(|&tool| {
            let dataset = dataset.clone();
            let budget = budget.clone();
            FunctionTool::new(tool.name(), tool.description(), move |args, _ctx| {
                let dataset = dataset.clone();
                let budget = budget.clone();
                Box::pin(async move {
                    if !budget.take() {
                        return ToolResult::error(
                            "Tool call limit reached. Answer with the final analysis now.",
                        );
                    }
                    let query = [
                        args.get("query"),
                        args.get("industry"),
                        args.get("category"),
                    ]
                    .into_iter()
                    .map(query_text)
                    .find(|q| !q.is_empty())
                    .unwrap_or_default();
                    if query.is_empty() {
                        return ToolResult::error("Missing 'query' argument");
                    }
                    tracing::debug!(tool = tool.name(), query = %query, "Market data tool call");
                    ToolResult::success(dataset.answer(tool, &query))
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_dataset_loads() {
        let dataset = MarketDataset::bundled().unwrap();
        assert!(dataset.industries.len() >= 5);
        for industry in &dataset.industries {
            assert!(!industry.keywords.is_empty(), "{} has no keywords", industry.id);
            assert!(!industry.trends.is_empty());
        }
    }

    #[test]
    fn test_lookup_matches_keywords() {
        let dataset = MarketDataset::bundled().unwrap();
        assert_eq!(dataset.lookup("우산 공유 서비스").unwrap().id, "sharing");
        assert_eq!(dataset.lookup("Pet Care").unwrap().id, "pet");
        assert!(dataset.lookup("quantum annealing").is_none());
    }

    #[test]
    fn test_answer_reports_hits_and_misses() {
        let dataset = MarketDataset::bundled().unwrap();

        let hit = dataset.answer(MarketTool::MarketSize, "우산 대여");
        assert_eq!(hit["found"], true);
        assert_eq!(hit["tool"], "market_size");
        assert!(hit["data"]["tam"].is_string());

        let competitors = dataset.answer(MarketTool::Competitors, "우산 대여");
        assert!(competitors["data"]["direct"].is_array());

        let miss = dataset.answer(MarketTool::Trends, "asteroid mining");
        assert_eq!(miss["found"], false);
    }

    #[test]
    fn test_budget_is_shared_and_exhausts() {
        let budget = ToolBudget::new(2);
        assert!(budget.take());
        assert!(budget.take());
        assert!(!budget.take());
        assert_eq!(budget.remaining(), 0);

        let empty = ToolBudget::new(0);
        assert!(!empty.take());
    }

    #[test]
    fn test_one_tool_per_lookup() {
        let dataset = Arc::new(MarketDataset::bundled().unwrap());
        let tools = market_data_tools(dataset, Arc::new(ToolBudget::new(3)));
        assert_eq!(tools.len(), MarketTool::ALL.len());
        let names: Vec<_> = MarketTool::ALL.iter().map(MarketTool::name).collect();
        assert_eq!(names, ["market_size", "competitors", "trends"]);
    }
}
