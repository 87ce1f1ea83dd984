//! Tool-parameter validation
//!
//! Every numeric tool input is checked against a named range table
//! before the tool runs. Nested scenario objects are validated with the
//! same rules, their key prefixed to each message. A violation returns
//! a structured error string that goes back to the model as the tool
//! result so it can self-correct; the tool itself is never executed.

use serde_json::Value;

/// Named ranges, versioned together with the tool schemas. Rates are
/// decimal fractions (0.065 = 6.5%).
pub const PARAM_RANGES: &[(&str, f64, f64)] = &[
    ("annual_income", 1.0, 10_000_000.0),
    ("monthly_debts", 0.0, 1_000_000.0),
    ("down_payment", 0.0, 50_000_000.0),
    ("home_price", 10_000.0, 50_000_000.0),
    ("interest_rate", 0.001, 0.30),
    ("credit_score", 300.0, 850.0),
    ("term_years", 5.0, 40.0),
    ("monthly_rent", 0.0, 1_000_000.0),
    ("expected_monthly_rent", 0.0, 1_000_000.0),
    ("vacancy_rate", 0.0, 1.0),
    ("top_k", 1.0, 10.0),
];

fn range_for(field: &str) -> Option<(f64, f64)> {
    PARAM_RANGES
        .iter()
        .find(|(name, _, _)| *name == field)
        .map(|(_, min, max)| (*min, *max))
}

fn collect_violations(input: &Value, prefix: &str, out: &mut Vec<String>) {
    let Some(object) = input.as_object() else {
        out.push(format!("{}input must be a JSON object", prefix));
        return;
    };

    for (key, value) in object {
        if value.is_object() {
            // Sub-scenario: same rule set, key prefixed to messages.
            let nested_prefix = format!("{}{}: ", prefix, key);
            collect_violations(value, &nested_prefix, out);
            continue;
        }

        let Some((min, max)) = range_for(key) else {
            continue;
        };

        match value.as_f64() {
            Some(number) if number.is_finite() => {
                if number < min || number > max {
                    out.push(format!(
                        "{}{} must be between {} and {} (got {})",
                        prefix, key, min, max, number
                    ));
                }
            }
            _ => out.push(format!("{}{} must be a number", prefix, key)),
        }
    }

    // Cross-field rule within each (sub-)object.
    let down = object.get("down_payment").and_then(Value::as_f64);
    let price = object.get("home_price").and_then(Value::as_f64);
    if let (Some(down), Some(price)) = (down, price) {
        if down > price {
            out.push(format!(
                "{}down_payment ({}) must not exceed home_price ({})",
                prefix, down, price
            ));
        }
    }
}

/// Validate a tool input object. `Err` carries the structured error
/// text to hand back to the model in place of a tool result.
pub fn validate_tool_input(tool_name: &str, input: &Value) -> Result<(), String> {
    let mut violations = Vec::new();
    collect_violations(input, "", &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Invalid parameters for {}: {}",
            tool_name,
            violations.join("; ")
        ))
    }
}
