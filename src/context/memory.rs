//! Session memory extraction
//!
//! After each tool execution, a small set of named facts is pulled out
//! of the parsed result and merged into the session's fact map. Tools
//! without an extractor contribute nothing; later facts for the same
//! key overwrite earlier ones.

use crate::models::SessionMemory;
use serde_json::Value;

fn dollars(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_f64).map(|v| format!("${:.0}", v))
}

fn rate(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_f64).map(|v| format!("{:.2}%", v))
}

/// Extract the facts a given tool result contributes to session
/// memory. Unknown tools yield nothing.
pub fn extract_facts(tool_name: &str, result: &str) -> Vec<(String, String)> {
    let Ok(parsed) = serde_json::from_str::<Value>(result) else {
        return Vec::new();
    };

    let mut facts = Vec::new();

    match tool_name {
        "calculate_affordability" => {
            if let Some(value) = dollars(&parsed, "max_price") {
                facts.push(("max_price".to_string(), value));
            }
            if let Some(value) = dollars(&parsed, "recommended_price") {
                facts.push(("recommended_price".to_string(), value));
            }
        }
        "monthly_payment" => {
            if let (Some(price), Some(payment)) = (
                parsed.get("home_price").and_then(Value::as_f64),
                dollars(&parsed, "monthly_payment"),
            ) {
                facts.push((format!("payment_{:.0}", price), payment));
            }
        }
        "get_live_rates" => {
            if let Some(value) = rate(&parsed, "rate_30yr") {
                facts.push(("rate_30yr".to_string(), value));
            }
            if let Some(value) = rate(&parsed, "rate_15yr") {
                facts.push(("rate_15yr".to_string(), value));
            }
        }
        "compare_scenarios" => {
            if let Some(value) = dollars(&parsed, "monthly_difference") {
                facts.push(("last_comparison_delta".to_string(), value));
            }
        }
        "rent_vs_buy" => {
            if let Some(verdict) = parsed.get("verdict").and_then(Value::as_str) {
                facts.push(("rent_vs_buy_verdict".to_string(), verdict.to_string()));
            }
        }
        "stress_test" => {
            if let Some(passes) = parsed.get("passes").and_then(Value::as_bool) {
                facts.push((
                    "stress_test_result".to_string(),
                    if passes { "pass" } else { "fail" }.to_string(),
                ));
            }
        }
        _ => {}
    }

    facts
}

/// Render session memory as a system-prompt block. Empty memory
/// renders nothing.
pub fn memory_block(memory: &SessionMemory) -> Option<String> {
    if memory.is_empty() {
        return None;
    }

    let mut block = String::from("Session facts established so far:\n");
    for (key, value) in &memory.facts {
        block.push_str(&format!("- {}: {}\n", key, value));
    }
    if !memory.tools_used.is_empty() {
        block.push_str(&format!(
            "Tools already used: {}\n",
            memory.tools_used.join(", ")
        ));
    }
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affordability_facts_extracted() {
        let result = r#"{"max_price":401000.0,"recommended_price":360900.0}"#;
        let facts = extract_facts("calculate_affordability", result);

        assert!(facts.contains(&("max_price".to_string(), "$401000".to_string())));
        assert!(facts.contains(&("recommended_price".to_string(), "$360900".to_string())));
    }

    #[test]
    fn test_payment_fact_keyed_by_price() {
        let result = r#"{"home_price":400000.0,"monthly_payment":2023.0}"#;
        let facts = extract_facts("monthly_payment", result);
        assert_eq!(facts, vec![("payment_400000".to_string(), "$2023".to_string())]);
    }

    #[test]
    fn test_unknown_tool_contributes_nothing() {
        assert!(extract_facts("area_info", r#"{"median_price":455000.0}"#).is_empty());
        assert!(extract_facts("monthly_payment", "not json").is_empty());
    }

    #[test]
    fn test_stress_and_verdict_facts() {
        let facts = extract_facts("stress_test", r#"{"passes":false}"#);
        assert_eq!(
            facts,
            vec![("stress_test_result".to_string(), "fail".to_string())]
        );

        let facts = extract_facts("rent_vs_buy", r#"{"verdict":"buy"}"#);
        assert_eq!(
            facts,
            vec![("rent_vs_buy_verdict".to_string(), "buy".to_string())]
        );
    }

    #[test]
    fn test_memory_block_rendering() {
        let mut memory = SessionMemory::default();
        assert!(memory_block(&memory).is_none());

        memory.merge_facts([("max_price".to_string(), "$401000".to_string())]);
        memory.record_tool("calculate_affordability");

        let block = memory_block(&memory).unwrap();
        assert!(block.contains("max_price: $401000"));
        assert!(block.contains("calculate_affordability"));
    }
}
