//! # Research Tools
//!
//! External lookups the market-analysis stage uses to ground its prompt.
//! Both are injected, so tests can substitute them.

pub mod market_data;
pub mod search_tools;

pub use market_data::{market_data_tools, MarketDataset, MarketTool, ToolBudget};
pub use search_tools::{SearchHit, SearxngSearch, WebSearch};
