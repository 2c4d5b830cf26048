//! # Search Tools
//!
//! Web search used by the grounded market-analysis mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One web search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A web search backend
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// SearXNG metasearch client.
///
/// Endpoints are tried in order: `SEARXNG_URL` (or an explicit base URL),
/// a few public instances, then a local instance.
pub struct SearxngSearch {
    endpoints: Vec<String>,
    client: reqwest::Client,
}

impl SearxngSearch {
    /// Build a client; `base_url` overrides the `SEARXNG_URL` env var
    pub fn new(base_url: Option<String>) -> anyhow::Result<Self> {
        let mut endpoints: Vec<String> = Vec::new();

        if let Some(custom_url) = base_url.or_else(|| std::env::var("SEARXNG_URL").ok()) {
            endpoints.push(format!("{}/search", custom_url.trim_end_matches('/')));
        }

        // Full list: https://searx.space/
        endpoints.extend([
            "https://searx.be/search".to_string(),
            "https://search.sapti.me/search".to_string(),
            "https://searx.tiekoetter.com/search".to_string(),
        ]);

        endpoints.push("http://localhost:8888/search".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("ideaforge-research/1.0")
            .build()?;

        Ok(Self { endpoints, client })
    }

    async fn query_endpoint(
        &self,
        endpoint: &str,
        query: &str,
        max_results: usize,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let url = format!("{}?q={}&format=json", endpoint, urlencoding::encode(query));
        let json = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(parse_results(&json, max_results))
    }
}

/// Map a SearXNG JSON payload to hits
fn parse_results(json: &Value, max_results: usize) -> Vec<SearchHit> {
    json.get("results")
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .take(max_results)
                .map(|r| SearchHit {
                    title: r.get("title").and_then(|t| t.as_str()).unwrap_or("").to_string(),
                    url: r.get("url").and_then(|u| u.as_str()).unwrap_or("").to_string(),
                    snippet: r.get("content").and_then(|c| c.as_str()).unwrap_or("").to_string(),
                })
                .filter(|hit| !hit.snippet.is_empty() || !hit.title.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl WebSearch for SearxngSearch {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>> {
        for endpoint in &self.endpoints {
            match self.query_endpoint(endpoint, query, max_results).await {
                Ok(hits) => return Ok(hits),
                Err(e) => tracing::debug!(endpoint = %endpoint, error = %e, "Search endpoint failed"),
            }
        }
        anyhow::bail!("no search backend available for query '{}'", query)
    }
}
