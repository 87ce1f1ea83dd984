//! Context engineering
//!
//! Keeps each chat turn inside the model budget: token-estimated
//! truncation, a rolling-summary trigger for long sessions, persona
//! hints derived from the report, session-memory fact extraction, and
//! the canonical tool cache key.

pub mod memory;
pub mod persona;

pub use memory::{extract_facts, memory_block};
pub use persona::persona_hints;

use crate::gemini::LanguageModel;
use crate::models::ChatTurn;
use serde_json::Value;
use tracing::{debug, warn};

/// Budget and threshold knobs for context management.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Model context budget in estimated tokens.
    pub max_context_tokens: usize,
    /// Reserved for system prompt, tool definitions and model output.
    pub reserved_tokens: usize,
    /// Truncation floor: never drop below this many recent messages.
    pub min_recent_messages: usize,
    /// Fixed per-message token overhead.
    pub per_message_overhead: usize,
    /// History length at which older turns get summarized.
    pub summarize_after: usize,
    /// Recent turns excluded from summarization.
    pub keep_recent: usize,
    /// Rough word cap for the rolling summary.
    pub summary_word_cap: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 6000,
            reserved_tokens: 1500,
            min_recent_messages: 6,
            per_message_overhead: 4,
            summarize_after: 8,
            keep_recent: 8,
            summary_word_cap: 200,
        }
    }
}

/// `ceil(chars / 4)` plus the fixed per-message overhead.
pub fn estimate_tokens(turn: &ChatTurn, overhead: usize) -> usize {
    let chars = turn.content.chars().count();
    (chars + 3) / 4 + overhead
}

fn total_tokens(turns: &[ChatTurn], overhead: usize) -> usize {
    turns.iter().map(|t| estimate_tokens(t, overhead)).sum()
}

/// Drop the oldest user/assistant pair until the history fits the
/// remaining budget, never going below the recent-message floor.
/// Returns how many messages were removed.
pub fn truncate_history(turns: &mut Vec<ChatTurn>, config: &ContextConfig) -> usize {
    let budget = config
        .max_context_tokens
        .saturating_sub(config.reserved_tokens);
    let mut dropped = 0;

    while total_tokens(turns, config.per_message_overhead) > budget
        && turns.len() >= config.min_recent_messages + 2
    {
        // Oldest-first, in pairs, so a user message and its reply leave
        // the window together.
        turns.drain(..2);
        dropped += 2;
    }

    if dropped > 0 {
        debug!(dropped, remaining = turns.len(), "history truncated");
    }
    dropped
}

/// Rolling-summary update. Everything older than the last
/// `keep_recent` turns is folded (together with any prior summary)
/// into a fresh summary via the cheap model. On failure the previous
/// summary is kept unchanged.
pub async fn update_summary(
    prior: Option<&str>,
    turns: &[ChatTurn],
    model: &dyn LanguageModel,
    config: &ContextConfig,
) -> Option<String> {
    if turns.len() < config.summarize_after || turns.len() <= config.keep_recent {
        return prior.map(str::to_string);
    }

    let older = &turns[..turns.len() - config.keep_recent];
    if older.is_empty() {
        return prior.map(str::to_string);
    }

    let mut transcript = String::new();
    for turn in older {
        transcript.push_str(&format!("{:?}: {}\n", turn.role, turn.content));
    }

    let prior_block = prior
        .map(|s| format!("EXISTING SUMMARY:\n{}\n\n", s))
        .unwrap_or_default();

    let prompt = format!(
        "Merge the existing summary and the conversation below into one rolling \
         summary of at most {} words. Keep concrete numbers (prices, payments, \
         rates) and decisions; drop small talk.\n\n{}CONVERSATION:\n{}",
        config.summary_word_cap, prior_block, transcript
    );

    match model.generate(&prompt).await {
        Ok(summary) => {
            let summary = cap_words(summary.trim(), config.summary_word_cap);
            if summary.is_empty() {
                prior.map(str::to_string)
            } else {
                Some(summary)
            }
        }
        Err(error) => {
            warn!(%error, "summarization failed, keeping previous summary");
            prior.map(str::to_string)
        }
    }
}

fn cap_words(text: &str, cap: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= cap {
        text.to_string()
    } else {
        words[..cap].join(" ")
    }
}

/// `tool:<name>:<canonical JSON>` with object keys sorted recursively,
/// so key order in the model's arguments never splits the cache.
pub fn tool_cache_key(tool_name: &str, input: &Value) -> String {
    format!("tool:{}:{}", tool_name, canonical_json(input))
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(key).unwrap_or_default(),
                        canonical_json(&map[key])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let encoded: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", encoded.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::testing::ScriptedModel;
    use serde_json::json;

    fn turn_pair(index: usize, size: usize) -> Vec<ChatTurn> {
        vec![
            ChatTurn::user(format!("q{} {}", index, "x".repeat(size))),
            ChatTurn::assistant(format!("a{} {}", index, "y".repeat(size))),
        ]
    }

    #[test]
    fn test_truncation_never_goes_below_floor() {
        let config = ContextConfig {
            max_context_tokens: 100,
            reserved_tokens: 50,
            ..ContextConfig::default()
        };

        let mut turns: Vec<ChatTurn> = (0..4).flat_map(|i| turn_pair(i, 400)).collect();
        truncate_history(&mut turns, &config);

        assert_eq!(turns.len(), config.min_recent_messages);
    }

    #[test]
    fn test_truncation_removes_oldest_pairs_first() {
        let config = ContextConfig {
            max_context_tokens: 1000,
            reserved_tokens: 100,
            ..ContextConfig::default()
        };

        let mut turns: Vec<ChatTurn> = (0..5).flat_map(|i| turn_pair(i, 500)).collect();
        let dropped = truncate_history(&mut turns, &config);

        assert!(dropped > 0);
        assert_eq!(dropped % 2, 0);
        // The newest turns survive.
        assert!(turns.last().unwrap().content.starts_with("a4"));
        assert!(!turns.iter().any(|t| t.content.starts_with("q0")));
    }

    #[test]
    fn test_truncation_noop_when_under_budget() {
        let config = ContextConfig::default();
        let mut turns: Vec<ChatTurn> = (0..3).flat_map(|i| turn_pair(i, 10)).collect();
        assert_eq!(truncate_history(&mut turns, &config), 0);
        assert_eq!(turns.len(), 6);
    }

    #[tokio::test]
    async fn test_summary_not_triggered_for_short_history() {
        let model = ScriptedModel::generator("should not be used");
        let turns: Vec<ChatTurn> = (0..3).flat_map(|i| turn_pair(i, 10)).collect();

        let summary =
            update_summary(Some("prior"), &turns, &model, &ContextConfig::default()).await;

        assert_eq!(summary.as_deref(), Some("prior"));
        assert_eq!(model.generate_calls(), 0);
    }

    #[tokio::test]
    async fn test_summary_merges_older_turns() {
        let model = ScriptedModel::generator("User is targeting a $400k home in Austin.");
        let turns: Vec<ChatTurn> = (0..6).flat_map(|i| turn_pair(i, 10)).collect();

        let summary = update_summary(None, &turns, &model, &ContextConfig::default()).await;

        assert_eq!(
            summary.as_deref(),
            Some("User is targeting a $400k home in Austin.")
        );
        assert_eq!(model.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_summary_failure_keeps_previous() {
        let model = ScriptedModel::failing();
        let turns: Vec<ChatTurn> = (0..6).flat_map(|i| turn_pair(i, 10)).collect();

        let summary =
            update_summary(Some("the old summary"), &turns, &model, &ContextConfig::default())
                .await;

        assert_eq!(summary.as_deref(), Some("the old summary"));
    }

    #[test]
    fn test_cache_key_is_order_invariant() {
        let a = json!({ "home_price": 400000.0, "down_payment": 80000.0 });
        let b = json!({ "down_payment": 80000.0, "home_price": 400000.0 });

        assert_eq!(
            tool_cache_key("monthly_payment", &a),
            tool_cache_key("monthly_payment", &b)
        );
        assert!(tool_cache_key("monthly_payment", &a).starts_with("tool:monthly_payment:"));
    }

    #[test]
    fn test_cache_key_sorts_nested_objects() {
        let a = json!({ "scenario_a": { "b": 1, "a": 2 } });
        let b = json!({ "scenario_a": { "a": 2, "b": 1 } });
        assert_eq!(
            tool_cache_key("compare_scenarios", &a),
            tool_cache_key("compare_scenarios", &b)
        );
    }

    #[test]
    fn test_cap_words_truncates() {
        assert_eq!(cap_words("one two three", 2), "one two");
        assert_eq!(cap_words("one two", 5), "one two");
    }
}
