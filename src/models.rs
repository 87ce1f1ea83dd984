//! Core data models for the affordability advisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn rank(&self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Moderate => 1,
            RiskLevel::High => 2,
            RiskLevel::VeryHigh => 3,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
            RiskLevel::VeryHigh => "Very High",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RentVsBuyVerdict {
    Buy,
    Rent,
    Neutral,
}

impl fmt::Display for RentVsBuyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RentVsBuyVerdict::Buy => "buy",
            RentVsBuyVerdict::Rent => "rent",
            RentVsBuyVerdict::Neutral => "neutral",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Profile =================
//

/// User-submitted financial and location inputs. Immutable once
/// submitted; owned by the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub annual_income: f64,
    pub monthly_debts: f64,
    pub down_payment: f64,
    pub credit_score: u16,
    pub location: String,
    /// Current rent, used for the rent-vs-buy comparison.
    #[serde(default)]
    pub monthly_rent: Option<f64>,
    #[serde(default)]
    pub va_eligible: bool,
    /// A specific listing to analyze against the budget.
    #[serde(default)]
    pub listing: Option<Listing>,
    /// External listing to import during phase 1 when no inline
    /// listing was provided.
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub investment: Option<InvestmentParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub price: f64,
    #[serde(default)]
    pub annual_taxes: f64,
    #[serde(default)]
    pub monthly_hoa: f64,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentParams {
    pub expected_monthly_rent: f64,
    /// Fraction of the year the unit sits vacant, e.g. 0.05.
    #[serde(default)]
    pub vacancy_rate: f64,
}

impl Profile {
    /// Schema/shape validation. The only failure that short-circuits an
    /// analysis run before phase 1.
    pub fn validate(&self) -> crate::Result<()> {
        let mut problems = Vec::new();

        if !self.annual_income.is_finite() || self.annual_income <= 0.0 {
            problems.push("annual_income must be a positive number");
        }
        if !self.monthly_debts.is_finite() || self.monthly_debts < 0.0 {
            problems.push("monthly_debts must be zero or greater");
        }
        if !self.down_payment.is_finite() || self.down_payment < 0.0 {
            problems.push("down_payment must be zero or greater");
        }
        if !(300..=850).contains(&self.credit_score) {
            problems.push("credit_score must be between 300 and 850");
        }
        if self.location.trim().is_empty() {
            problems.push("location must not be empty");
        }
        if let Some(listing) = &self.listing {
            if !listing.price.is_finite() || listing.price <= 0.0 {
                problems.push("listing.price must be a positive number");
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(crate::error::AdvisorError::Validation(problems.join("; ")))
        }
    }
}

//
// ================= Market Snapshot =================
//

/// Upstream data source identifiers for snapshot provenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketSource {
    Rates,
    Inflation,
    Area,
    Listing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source: MarketSource,
    /// False when the field was filled from a documented fallback.
    pub live: bool,
}

/// Rates, prices, and area data fetched in phase 1. Built once per
/// request; fields default independently when a source fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub rate_30yr: f64,
    pub rate_15yr: f64,
    pub inflation_rate: f64,
    pub national_median_price: f64,
    pub area_median_price: f64,
    pub area_info: String,
    #[serde(default)]
    pub imported_listing: Option<Listing>,
    pub sources: Vec<SourceStatus>,
}

//
// ================= Computed Report =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affordability {
    pub max_price: f64,
    pub recommended_price: f64,
    pub loan_amount: f64,
    pub monthly_payment: f64,
    pub front_end_dti: f64,
    pub back_end_dti: f64,
    pub rate_used: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentVsBuy {
    pub five_year_buy_cost: f64,
    pub five_year_rent_cost: f64,
    pub verdict: RentVsBuyVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentMetrics {
    pub cap_rate_pct: f64,
    pub monthly_cash_flow: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTest {
    pub rate_shock_passes: bool,
    pub income_shock_passes: bool,
    pub payment_at_shocked_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreapprovalReadiness {
    pub ready: bool,
    pub blockers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanPrograms {
    pub conventional_eligible: bool,
    pub fha_eligible: bool,
    pub va_eligible: bool,
}

/// Verdict on a specific listing measured against the budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyAnalysis {
    pub price: f64,
    pub monthly_payment: f64,
    pub within_budget: bool,
}

/// Deterministic outputs produced by the finance module from a
/// `Profile` and a `MarketSnapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedReport {
    pub affordability: Affordability,
    pub risk: RiskAssessment,
    pub recommendations: Vec<String>,
    pub loan_programs: LoanPrograms,
    pub stress_test: StressTest,
    pub preapproval: PreapprovalReadiness,
    #[serde(default)]
    pub rent_vs_buy: Option<RentVsBuy>,
    #[serde(default)]
    pub investment: Option<InvestmentMetrics>,
    #[serde(default)]
    pub property: Option<PropertyAnalysis>,
}

//
// ================= Stream Events =================
//

/// One event of the analysis stream. Events are emitted strictly in
/// phase order and the stream ends with `complete` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StreamEvent {
    MarketData {
        snapshot: MarketSnapshot,
    },
    Analysis {
        report: ComputedReport,
    },
    Summary {
        text: String,
        /// True when the template fallback replaced the model summary.
        fallback: bool,
    },
    Complete {
        disclaimers: Vec<String>,
        generated_at: DateTime<Utc>,
        trace_id: Uuid,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn phase_name(&self) -> &'static str {
        match self {
            StreamEvent::MarketData { .. } => "market_data",
            StreamEvent::Analysis { .. } => "analysis",
            StreamEvent::Summary { .. } => "summary",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete { .. } | StreamEvent::Error { .. }
        )
    }
}

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub input: serde_json::Value,
}

/// One turn of a chat conversation. Assistant turns that requested
/// tools carry the calls alongside any text; tool turns carry the
/// JSON-serialized result string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on tool-result turns: which tool produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_name: None,
        }
    }

    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Some(calls),
            tool_name: None,
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_name: Some(tool_name.into()),
        }
    }
}

/// Facts accumulated from tool results within one chat session.
/// Additive: later facts for a key overwrite earlier ones, nothing is
/// ever removed within the session lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMemory {
    pub facts: BTreeMap<String, String>,
    pub tools_used: Vec<String>,
}

impl SessionMemory {
    pub fn record_tool(&mut self, name: &str) {
        if !self.tools_used.iter().any(|t| t == name) {
            self.tools_used.push(name.to_string());
        }
    }

    pub fn merge_facts(&mut self, facts: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in facts {
            self.facts.insert(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.tools_used.is_empty()
    }
}

/// Per-session chat state, scoped to one generated report and
/// discarded when the session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub turns: Vec<ChatTurn>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub memory: SessionMemory,
    pub report: ComputedReport,
}

impl ConversationState {
    pub fn new(report: ComputedReport) -> Self {
        Self {
            turns: Vec::new(),
            summary: None,
            memory: SessionMemory::default(),
            report,
        }
    }
}

//
// ================= Guardrail Verdicts =================
//

/// Outcome of the input guardrail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GuardrailVerdict {
    Allow,
    Deny {
        reason: String,
        canned_response: String,
    },
}

impl GuardrailVerdict {
    pub fn is_deny(&self) -> bool {
        matches!(self, GuardrailVerdict::Deny { .. })
    }
}

/// A numeric claim in model output that deviates from the computed
/// report beyond the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: String,
    pub cited_value: f64,
    pub expected_value: f64,
    pub deviation_percent: f64,
}
