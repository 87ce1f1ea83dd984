//! Tool trait and registry
//!
//! The fixed tool set the chat model may invoke. Financial tools wrap
//! the deterministic finance functions; live tools go through the
//! market feed; `search_knowledge` wraps the retrieval corpus. Dispatch
//! is a closed lookup table keyed by tool name and checked exhaustively
//! against the schema set at startup. `ToolRegistry::execute` is the
//! single `(name, input) -> result string | validation error`
//! implementation shared by every caller.

use crate::error::AdvisorError;
use crate::finance;
use crate::guardrails::validate_tool_input;
use crate::market::{MarketFeed, FALLBACK_INFLATION, FALLBACK_RATE_15Y, FALLBACK_RATE_30Y};
use crate::models::Profile;
use crate::retrieval;
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Cache TTL tiers. Deterministic math barely changes; live feeds do.
pub const MATH_TOOL_TTL: Duration = Duration::from_secs(3600);
pub const LIVE_TOOL_TTL: Duration = Duration::from_secs(300);
pub const AREA_TOOL_TTL: Duration = Duration::from_secs(1800);

/// Declared shape of a tool, handed to the model as a function
/// declaration. Versioned together with the guardrail range table.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Trait for a single tool. Stateless given its input; identical
/// inputs are cache-eligible for `cache_ttl`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn cache_ttl(&self) -> Duration;
    async fn execute(&self, input: &Value) -> Result<String>;
}

/// Tool registry for looking up and executing tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Validate parameters, then run the tool. A range violation is
    /// returned as `InvalidToolInput` without executing anything.
    pub async fn execute(&self, name: &str, input: &Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| AdvisorError::ToolNotFound(name.to_string()))?;

        if let Err(message) = validate_tool_input(name, input) {
            return Err(AdvisorError::InvalidToolInput(message));
        }

        tool.execute(input).await
    }

    /// Startup check: the registry and the declared schema set must
    /// name exactly the same tools.
    pub fn ensure_matches(&self, schemas: &[ToolSchema]) -> Result<()> {
        for schema in schemas {
            if !self.tools.contains_key(schema.name) {
                return Err(AdvisorError::ToolNotFound(format!(
                    "schema '{}' has no registered tool",
                    schema.name
                )));
            }
        }
        for name in self.tools.keys() {
            if !schemas.iter().any(|schema| schema.name == name) {
                return Err(AdvisorError::ToolNotFound(format!(
                    "tool '{}' has no declared schema",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Input helpers =================
//

fn get_f64(input: &Value, key: &str) -> Option<f64> {
    input.get(key).and_then(Value::as_f64)
}

fn require_f64(input: &Value, key: &str) -> Result<f64> {
    get_f64(input, key)
        .ok_or_else(|| AdvisorError::InvalidToolInput(format!("'{}' is required", key)))
}

fn require_str<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AdvisorError::InvalidToolInput(format!("'{}' is required", key)))
}

/// Rate input arrives as a decimal fraction; finance functions take a
/// percentage.
fn rate_pct(input: &Value) -> f64 {
    get_f64(input, "interest_rate")
        .map(|fraction| fraction * 100.0)
        .unwrap_or(FALLBACK_RATE_30Y)
}

fn term_years(input: &Value) -> u32 {
    get_f64(input, "term_years")
        .map(|years| years as u32)
        .unwrap_or(finance::DEFAULT_TERM_YEARS)
}

fn scenario_payment(scenario: &Value) -> Result<(f64, f64)> {
    let price = require_f64(scenario, "home_price")?;
    let down = get_f64(scenario, "down_payment").unwrap_or(0.0);
    let loan = (price - down).max(0.0);
    let payment = finance::monthly_payment(loan, rate_pct(scenario), term_years(scenario));
    Ok((payment, loan))
}

fn encode(value: Value) -> Result<String> {
    Ok(serde_json::to_string(&value)?)
}

//
// ================= Financial-math tools =================
//

pub struct CalculateAffordabilityTool;

#[async_trait]
impl Tool for CalculateAffordabilityTool {
    fn name(&self) -> &'static str {
        "calculate_affordability"
    }

    fn cache_ttl(&self) -> Duration {
        MATH_TOOL_TTL
    }

    async fn execute(&self, input: &Value) -> Result<String> {
        let profile = Profile {
            annual_income: require_f64(input, "annual_income")?,
            monthly_debts: get_f64(input, "monthly_debts").unwrap_or(0.0),
            down_payment: get_f64(input, "down_payment").unwrap_or(0.0),
            credit_score: get_f64(input, "credit_score").map(|s| s as u16).unwrap_or(700),
            location: String::new(),
            monthly_rent: None,
            va_eligible: false,
            listing: None,
            listing_url: None,
            investment: None,
        };

        let mut snapshot = crate::market::fallback_snapshot();
        if let Some(fraction) = get_f64(input, "interest_rate") {
            snapshot.rate_30yr = fraction * 100.0;
        }

        let affordability = finance::compute_affordability(&profile, &snapshot);
        encode(json!({
            "max_price": affordability.max_price,
            "recommended_price": affordability.recommended_price,
            "monthly_payment": affordability.monthly_payment,
            "front_end_dti": affordability.front_end_dti,
            "back_end_dti": affordability.back_end_dti,
            "rate_used": affordability.rate_used,
        }))
    }
}

pub struct MonthlyPaymentTool;

#[async_trait]
impl Tool for MonthlyPaymentTool {
    fn name(&self) -> &'static str {
        "monthly_payment"
    }

    fn cache_ttl(&self) -> Duration {
        MATH_TOOL_TTL
    }

    async fn execute(&self, input: &Value) -> Result<String> {
        let (payment, loan) = scenario_payment(input)?;
        encode(json!({
            "home_price": require_f64(input, "home_price")?,
            "loan_amount": loan,
            "monthly_payment": payment,
            "term_years": term_years(input),
        }))
    }
}

pub struct CompareScenariosTool;

#[async_trait]
impl Tool for CompareScenariosTool {
    fn name(&self) -> &'static str {
        "compare_scenarios"
    }

    fn cache_ttl(&self) -> Duration {
        MATH_TOOL_TTL
    }

    async fn execute(&self, input: &Value) -> Result<String> {
        let scenario_a = input
            .get("scenario_a")
            .ok_or_else(|| AdvisorError::InvalidToolInput("'scenario_a' is required".into()))?;
        let scenario_b = input
            .get("scenario_b")
            .ok_or_else(|| AdvisorError::InvalidToolInput("'scenario_b' is required".into()))?;

        let (payment_a, loan_a) = scenario_payment(scenario_a)?;
        let (payment_b, loan_b) = scenario_payment(scenario_b)?;

        encode(json!({
            "scenario_a": { "monthly_payment": payment_a, "loan_amount": loan_a },
            "scenario_b": { "monthly_payment": payment_b, "loan_amount": loan_b },
            "monthly_difference": payment_a - payment_b,
        }))
    }
}

pub struct StressTestTool;

#[async_trait]
impl Tool for StressTestTool {
    fn name(&self) -> &'static str {
        "stress_test"
    }

    fn cache_ttl(&self) -> Duration {
        MATH_TOOL_TTL
    }

    async fn execute(&self, input: &Value) -> Result<String> {
        let profile = Profile {
            annual_income: require_f64(input, "annual_income")?,
            monthly_debts: get_f64(input, "monthly_debts").unwrap_or(0.0),
            down_payment: get_f64(input, "down_payment").unwrap_or(0.0),
            credit_score: 700,
            location: String::new(),
            monthly_rent: None,
            va_eligible: false,
            listing: None,
            listing_url: None,
            investment: None,
        };

        let mut snapshot = crate::market::fallback_snapshot();
        if let Some(fraction) = get_f64(input, "interest_rate") {
            snapshot.rate_30yr = fraction * 100.0;
        }

        let affordability = finance::compute_affordability(&profile, &snapshot);
        let stress = finance::stress_test(&profile, &affordability);

        encode(json!({
            "rate_shock_passes": stress.rate_shock_passes,
            "income_shock_passes": stress.income_shock_passes,
            "payment_at_shocked_rate": stress.payment_at_shocked_rate,
            "passes": stress.rate_shock_passes && stress.income_shock_passes,
        }))
    }
}

pub struct RentVsBuyTool;

#[async_trait]
impl Tool for RentVsBuyTool {
    fn name(&self) -> &'static str {
        "rent_vs_buy"
    }

    fn cache_ttl(&self) -> Duration {
        MATH_TOOL_TTL
    }

    async fn execute(&self, input: &Value) -> Result<String> {
        let rent = require_f64(input, "monthly_rent")?;
        let price = require_f64(input, "home_price")?;
        let (payment, _) = scenario_payment(input)?;
        let inflation = get_f64(input, "inflation_rate").unwrap_or(FALLBACK_INFLATION);

        let result = finance::rent_vs_buy(rent, price, payment, inflation);
        encode(json!({
            "five_year_buy_cost": result.five_year_buy_cost,
            "five_year_rent_cost": result.five_year_rent_cost,
            "verdict": result.verdict.to_string(),
        }))
    }
}

//
// ================= Live-data tools =================
//

pub struct LiveRatesTool {
    feed: Arc<dyn MarketFeed>,
}

#[async_trait]
impl Tool for LiveRatesTool {
    fn name(&self) -> &'static str {
        "get_live_rates"
    }

    fn cache_ttl(&self) -> Duration {
        LIVE_TOOL_TTL
    }

    async fn execute(&self, _input: &Value) -> Result<String> {
        match self.feed.fetch_rates().await {
            Ok(quote) => encode(json!({
                "rate_30yr": quote.rate_30yr,
                "rate_15yr": quote.rate_15yr,
                "live": true,
            })),
            Err(_) => encode(json!({
                "rate_30yr": FALLBACK_RATE_30Y,
                "rate_15yr": FALLBACK_RATE_15Y,
                "live": false,
            })),
        }
    }
}

pub struct SearchPropertiesTool {
    feed: Arc<dyn MarketFeed>,
}

#[async_trait]
impl Tool for SearchPropertiesTool {
    fn name(&self) -> &'static str {
        "search_properties"
    }

    fn cache_ttl(&self) -> Duration {
        LIVE_TOOL_TTL
    }

    async fn execute(&self, input: &Value) -> Result<String> {
        let location = require_str(input, "location")?;
        let max_price = get_f64(input, "max_price").unwrap_or(f64::MAX);

        let listings = self
            .feed
            .search_properties(location, max_price)
            .await
            .unwrap_or_default();

        encode(json!({
            "location": location,
            "count": listings.len(),
            "listings": listings,
        }))
    }
}

pub struct AreaInfoTool {
    feed: Arc<dyn MarketFeed>,
}

#[async_trait]
impl Tool for AreaInfoTool {
    fn name(&self) -> &'static str {
        "area_info"
    }

    fn cache_ttl(&self) -> Duration {
        AREA_TOOL_TTL
    }

    async fn execute(&self, input: &Value) -> Result<String> {
        let location = require_str(input, "location")?;
        match self.feed.fetch_area(location).await {
            Ok(area) => encode(json!({
                "location": location,
                "median_price": area.median_price,
                "summary": area.summary,
                "live": true,
            })),
            Err(_) => encode(json!({
                "location": location,
                "median_price": crate::market::FALLBACK_MEDIAN_PRICE,
                "summary": "No live area data available; using national averages.",
                "live": false,
            })),
        }
    }
}

//
// ================= Retrieval tool =================
//

pub struct SearchKnowledgeTool;

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &'static str {
        "search_knowledge"
    }

    fn cache_ttl(&self) -> Duration {
        MATH_TOOL_TTL
    }

    async fn execute(&self, input: &Value) -> Result<String> {
        let query = require_str(input, "query")?;
        let top_k = get_f64(input, "top_k").map(|k| k as usize).unwrap_or(3);
        let results = retrieval::retrieve(query, top_k);
        encode(json!({ "query": query, "results": results }))
    }
}

//
// ================= Schemas & registry =================
//

fn number(description: &str) -> Value {
    json!({ "type": "number", "description": description })
}

fn scenario_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "home_price": number("Purchase price in dollars"),
            "down_payment": number("Down payment in dollars"),
            "interest_rate": number("Annual rate as a decimal fraction, e.g. 0.065"),
            "term_years": number("Loan term in years (default 30)"),
        },
        "required": ["home_price"],
    })
}

/// The declared tool set, fixed and versioned with the guardrail
/// parameter-range table.
pub fn tool_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: "calculate_affordability",
            description: "Recompute maximum and recommended purchase price from income, debts and down payment",
            parameters: json!({
                "type": "object",
                "properties": {
                    "annual_income": number("Gross annual income in dollars"),
                    "monthly_debts": number("Total monthly debt payments in dollars"),
                    "down_payment": number("Available down payment in dollars"),
                    "credit_score": number("FICO score, 300-850"),
                    "interest_rate": number("Annual rate as a decimal fraction, e.g. 0.065"),
                },
                "required": ["annual_income"],
            }),
        },
        ToolSchema {
            name: "monthly_payment",
            description: "Monthly principal-and-interest payment for a given price, down payment and rate",
            parameters: scenario_schema(),
        },
        ToolSchema {
            name: "compare_scenarios",
            description: "Compare monthly payments of two purchase scenarios",
            parameters: json!({
                "type": "object",
                "properties": {
                    "scenario_a": scenario_schema(),
                    "scenario_b": scenario_schema(),
                },
                "required": ["scenario_a", "scenario_b"],
            }),
        },
        ToolSchema {
            name: "stress_test",
            description: "Check whether the budget survives a rate shock (+2%) and an income shock (-20%)",
            parameters: json!({
                "type": "object",
                "properties": {
                    "annual_income": number("Gross annual income in dollars"),
                    "monthly_debts": number("Total monthly debt payments in dollars"),
                    "down_payment": number("Available down payment in dollars"),
                    "interest_rate": number("Annual rate as a decimal fraction"),
                },
                "required": ["annual_income"],
            }),
        },
        ToolSchema {
            name: "rent_vs_buy",
            description: "Five-year cost comparison between renting and buying",
            parameters: json!({
                "type": "object",
                "properties": {
                    "monthly_rent": number("Current monthly rent in dollars"),
                    "home_price": number("Purchase price in dollars"),
                    "down_payment": number("Down payment in dollars"),
                    "interest_rate": number("Annual rate as a decimal fraction"),
                    "inflation_rate": number("Annual inflation in percent (default 3.2)"),
                },
                "required": ["monthly_rent", "home_price"],
            }),
        },
        ToolSchema {
            name: "get_live_rates",
            description: "Current 30-year and 15-year mortgage rates",
            parameters: json!({ "type": "object", "properties": {} }),
        },
        ToolSchema {
            name: "search_properties",
            description: "Search listings in a location under a price cap",
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": { "type": "string", "description": "City or metro area" },
                    "max_price": number("Upper price bound in dollars"),
                },
                "required": ["location"],
            }),
        },
        ToolSchema {
            name: "area_info",
            description: "Median price and market summary for a location",
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": { "type": "string", "description": "City or metro area" },
                },
                "required": ["location"],
            }),
        },
        ToolSchema {
            name: "search_knowledge",
            description: "Look up home-buying reference notes (loan programs, PMI, closing costs)",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What to look up" },
                    "top_k": number("How many notes to return, 1-10 (default 3)"),
                },
                "required": ["query"],
            }),
        },
    ]
}

/// Create the default registry over the given market feed.
pub fn create_default_registry(feed: Arc<dyn MarketFeed>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(CalculateAffordabilityTool));
    registry.register(Arc::new(MonthlyPaymentTool));
    registry.register(Arc::new(CompareScenariosTool));
    registry.register(Arc::new(StressTestTool));
    registry.register(Arc::new(RentVsBuyTool));
    registry.register(Arc::new(LiveRatesTool { feed: feed.clone() }));
    registry.register(Arc::new(SearchPropertiesTool { feed: feed.clone() }));
    registry.register(Arc::new(AreaInfoTool { feed }));
    registry.register(Arc::new(SearchKnowledgeTool));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::testing::{FailingFeed, HealthyFeed};

    fn registry() -> ToolRegistry {
        create_default_registry(Arc::new(HealthyFeed::new()))
    }

    #[test]
    fn test_registry_matches_schema_set() {
        assert!(registry().ensure_matches(&tool_schemas()).is_ok());
    }

    #[test]
    fn test_missing_tool_fails_startup_check() {
        let mut incomplete = ToolRegistry::new();
        incomplete.register(Arc::new(MonthlyPaymentTool));
        assert!(incomplete.ensure_matches(&tool_schemas()).is_err());
    }

    #[tokio::test]
    async fn test_monthly_payment_tool_round_trip() {
        let result = registry()
            .execute(
                "monthly_payment",
                &json!({
                    "home_price": 400_000.0,
                    "down_payment": 80_000.0,
                    "interest_rate": 0.06,
                }),
            )
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&result).unwrap();
        let payment = parsed["monthly_payment"].as_f64().unwrap();
        assert!((payment - 1918.56).abs() < 1.0, "payment was {payment}");
    }

    #[tokio::test]
    async fn test_invalid_params_block_execution() {
        let err = registry()
            .execute(
                "monthly_payment",
                &json!({ "home_price": 400_000.0, "down_payment": 500_000.0 }),
            )
            .await
            .unwrap_err();

        match err {
            AdvisorError::InvalidToolInput(message) => {
                assert!(message.contains("must not exceed"))
            }
            other => panic!("expected InvalidToolInput, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported() {
        let err = registry().execute("teleport", &json!({})).await.unwrap_err();
        assert!(matches!(err, AdvisorError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_live_rates_fall_back_when_feed_is_down() {
        let registry = create_default_registry(Arc::new(FailingFeed));
        let result = registry
            .execute("get_live_rates", &json!({}))
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["live"], false);
        assert_eq!(parsed["rate_30yr"], FALLBACK_RATE_30Y);
    }

    #[tokio::test]
    async fn test_compare_scenarios_reports_difference() {
        let result = registry()
            .execute(
                "compare_scenarios",
                &json!({
                    "scenario_a": { "home_price": 450_000.0, "down_payment": 90_000.0, "interest_rate": 0.065 },
                    "scenario_b": { "home_price": 380_000.0, "down_payment": 90_000.0, "interest_rate": 0.065 },
                }),
            )
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["monthly_difference"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_search_knowledge_returns_ranked_notes() {
        let result = registry()
            .execute("search_knowledge", &json!({ "query": "PMI insurance" }))
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(!parsed["results"].as_array().unwrap().is_empty());
    }
}
