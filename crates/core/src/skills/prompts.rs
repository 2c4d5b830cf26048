//! Default prompt templates bundled at compile time.
//!
//! Each system prompt states the JSON contract of its stage. The validators
//! in the skill modules do not trust the model to honour it.

/// Summary - condenses the raw idea
pub const SUMMARY: &str = include_str!("defaults/summary.md");

/// Target User - segments, personas and pain points
pub const TARGET_USER: &str = include_str!("defaults/target_user.md");

/// Market Analysis - size, trends and competitors
pub const MARKET_ANALYSIS: &str = include_str!("defaults/market_analysis.md");

/// Appendix describing the static market-data tools
pub const MARKET_TOOLS: &str = include_str!("defaults/market_tools.md");

/// Strategy - MVP scope, challenges and next actions
pub const STRATEGY: &str = include_str!("defaults/strategy.md");

/// Scoring - five-dimension rubric
pub const SCORING: &str = include_str!("defaults/scoring.md");

/// All default prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("summary", SUMMARY),
        ("target_user", TARGET_USER),
        ("market_analysis", MARKET_ANALYSIS),
        ("market_tools", MARKET_TOOLS),
        ("strategy", STRATEGY),
        ("scoring", SCORING),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_prompts_non_empty() {
        for (slug, content) in all_defaults() {
            assert!(!content.is_empty(), "Prompt '{}' should not be empty", slug);
            assert!(content.len() > 50, "Prompt '{}' seems too short", slug);
        }
    }

    #[test]
    fn test_prompt_count() {
        assert_eq!(all_defaults().len(), 6, "Should have 6 default prompts");
    }

    #[test]
    fn test_stage_prompts_demand_json() {
        for prompt in [SUMMARY, TARGET_USER, MARKET_ANALYSIS, STRATEGY, SCORING] {
            assert!(prompt.contains("JSON"));
        }
    }
}
