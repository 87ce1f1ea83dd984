//! Deterministic financial math
//!
//! Pure functions from `Profile` + `MarketSnapshot` to `ComputedReport`.
//! No I/O and no model calls happen here; the orchestrator calls
//! `compute_report` synchronously in phase 2 and the chat tools reuse
//! the same functions for recalculations.

use crate::models::{
    Affordability, ComputedReport, InvestmentMetrics, InvestmentParams, Listing, LoanPrograms,
    MarketSnapshot, PreapprovalReadiness, Profile, PropertyAnalysis, RentVsBuy, RentVsBuyVerdict,
    RiskAssessment, RiskLevel, StressTest,
};

/// Standard qualifying ratios: housing cost / gross monthly income and
/// total obligations / gross monthly income.
pub const FRONT_END_CAP: f64 = 0.28;
pub const BACK_END_CAP: f64 = 0.36;

/// Back-end ratio above which lenders generally decline.
pub const HARD_DTI_LIMIT: f64 = 0.43;

pub const DEFAULT_TERM_YEARS: u32 = 30;

/// Share of the housing budget consumed by taxes, insurance and HOA in
/// the affordability estimate.
const NON_PI_SHARE: f64 = 0.25;

/// Annual home appreciation assumption in the rent-vs-buy horizon.
const APPRECIATION_RATE: f64 = 0.03;

/// Closing costs as a share of purchase price.
const CLOSING_COST_SHARE: f64 = 0.03;

const RENT_VS_BUY_YEARS: u32 = 5;

/// Principal-and-interest payment for a fixed-rate loan.
/// `annual_rate_pct` is a percentage, e.g. 6.5.
pub fn monthly_payment(principal: f64, annual_rate_pct: f64, term_years: u32) -> f64 {
    if principal <= 0.0 {
        return 0.0;
    }
    let n = f64::from(term_years * 12);
    let r = annual_rate_pct / 100.0 / 12.0;
    if r < 1e-9 {
        return principal / n;
    }
    let growth = (1.0 + r).powf(n);
    principal * r * growth / (growth - 1.0)
}

/// Largest principal whose payment fits the given monthly budget.
pub fn principal_for_payment(payment: f64, annual_rate_pct: f64, term_years: u32) -> f64 {
    if payment <= 0.0 {
        return 0.0;
    }
    let n = f64::from(term_years * 12);
    let r = annual_rate_pct / 100.0 / 12.0;
    if r < 1e-9 {
        return payment * n;
    }
    let growth = (1.0 + r).powf(n);
    payment * (growth - 1.0) / (r * growth)
}

/// Remaining loan balance after `months` of on-schedule payments.
pub fn remaining_balance(principal: f64, annual_rate_pct: f64, term_years: u32, months: u32) -> f64 {
    let r = annual_rate_pct / 100.0 / 12.0;
    if r < 1e-9 {
        let paid = principal / f64::from(term_years * 12) * f64::from(months);
        return (principal - paid).max(0.0);
    }
    let payment = monthly_payment(principal, annual_rate_pct, term_years);
    let growth = (1.0 + r).powf(f64::from(months));
    (principal * growth - payment * (growth - 1.0) / r).max(0.0)
}

/// Rate premium over the market 30-year rate by credit tier.
pub fn credit_rate_adjustment(credit_score: u16) -> f64 {
    match credit_score {
        760..=850 => -0.25,
        700..=759 => 0.0,
        660..=699 => 0.25,
        620..=659 => 0.75,
        _ => 1.50,
    }
}

/// 28/36-rule affordability from income, debts and down payment.
pub fn compute_affordability(profile: &Profile, snapshot: &MarketSnapshot) -> Affordability {
    let rate_used = (snapshot.rate_30yr + credit_rate_adjustment(profile.credit_score)).max(0.0);
    let monthly_income = profile.annual_income / 12.0;

    let front_budget = monthly_income * FRONT_END_CAP;
    let back_budget = (monthly_income * BACK_END_CAP - profile.monthly_debts).max(0.0);
    let housing_budget = front_budget.min(back_budget);

    // Taxes/insurance/HOA take a fixed share of the housing budget.
    let pi_budget = housing_budget * (1.0 - NON_PI_SHARE);
    let max_loan = principal_for_payment(pi_budget, rate_used, DEFAULT_TERM_YEARS);
    let max_price = max_loan + profile.down_payment;
    let recommended_price = max_price * 0.9;

    let loan_amount = (recommended_price - profile.down_payment).max(0.0);
    let pi = monthly_payment(loan_amount, rate_used, DEFAULT_TERM_YEARS);
    let payment = pi / (1.0 - NON_PI_SHARE);

    let front_end_dti = if monthly_income > 0.0 {
        payment / monthly_income
    } else {
        0.0
    };
    let back_end_dti = if monthly_income > 0.0 {
        (payment + profile.monthly_debts) / monthly_income
    } else {
        0.0
    };

    Affordability {
        max_price,
        recommended_price,
        loan_amount,
        monthly_payment: payment,
        front_end_dti,
        back_end_dti,
        rate_used,
    }
}

pub fn assess_risk(profile: &Profile, affordability: &Affordability) -> RiskAssessment {
    let mut factors = Vec::new();

    if affordability.back_end_dti > HARD_DTI_LIMIT {
        factors.push("back-end DTI above the 43% lending limit".to_string());
    } else if affordability.back_end_dti > BACK_END_CAP {
        factors.push("back-end DTI above the 36% comfort threshold".to_string());
    }
    if profile.credit_score < 640 {
        factors.push("credit score below 640 narrows loan options".to_string());
    }
    if affordability.recommended_price > 0.0
        && profile.down_payment < affordability.recommended_price * 0.10
    {
        factors.push("down payment under 10% adds mortgage insurance cost".to_string());
    }
    if profile.monthly_debts * 12.0 > profile.annual_income * 0.20 {
        factors.push("existing debt load exceeds 20% of annual income".to_string());
    }

    let level = match factors.len() {
        0 => RiskLevel::Low,
        1 => RiskLevel::Moderate,
        2 => RiskLevel::High,
        _ => RiskLevel::VeryHigh,
    };

    RiskAssessment { level, factors }
}

/// Five-year total-cost comparison between buying at `price` and
/// renting at `monthly_rent` with rent growing at the inflation rate.
pub fn rent_vs_buy(
    monthly_rent: f64,
    price: f64,
    payment: f64,
    inflation_rate: f64,
) -> RentVsBuy {
    let months = f64::from(RENT_VS_BUY_YEARS * 12);
    let appreciation = price * ((1.0 + APPRECIATION_RATE).powi(RENT_VS_BUY_YEARS as i32) - 1.0);
    let five_year_buy_cost = payment * months + price * CLOSING_COST_SHARE - appreciation;

    let growth = 1.0 + inflation_rate / 100.0;
    let mut five_year_rent_cost = 0.0;
    for year in 0..RENT_VS_BUY_YEARS {
        five_year_rent_cost += monthly_rent * 12.0 * growth.powi(year as i32);
    }

    let verdict = if five_year_buy_cost < five_year_rent_cost * 0.95 {
        RentVsBuyVerdict::Buy
    } else if five_year_buy_cost > five_year_rent_cost * 1.05 {
        RentVsBuyVerdict::Rent
    } else {
        RentVsBuyVerdict::Neutral
    };

    RentVsBuy {
        five_year_buy_cost,
        five_year_rent_cost,
        verdict,
    }
}

/// Rate +2% and income −20% shock scenarios against the recommended
/// purchase.
pub fn stress_test(
    profile: &Profile,
    affordability: &Affordability,
) -> StressTest {
    let monthly_income = profile.annual_income / 12.0;

    let shocked_pi = monthly_payment(
        affordability.loan_amount,
        affordability.rate_used + 2.0,
        DEFAULT_TERM_YEARS,
    );
    let payment_at_shocked_rate = shocked_pi / (1.0 - NON_PI_SHARE);
    let rate_shock_passes = monthly_income > 0.0
        && (payment_at_shocked_rate + profile.monthly_debts) / monthly_income <= HARD_DTI_LIMIT;

    let shocked_income = monthly_income * 0.8;
    let income_shock_passes = shocked_income > 0.0
        && (affordability.monthly_payment + profile.monthly_debts) / shocked_income
            <= HARD_DTI_LIMIT;

    StressTest {
        rate_shock_passes,
        income_shock_passes,
        payment_at_shocked_rate,
    }
}

pub fn investment_metrics(
    params: &InvestmentParams,
    price: f64,
    payment: f64,
) -> InvestmentMetrics {
    let gross_annual = params.expected_monthly_rent * 12.0;
    let effective_annual = gross_annual * (1.0 - params.vacancy_rate);
    // Operating expenses: 10% maintenance reserve on gross rent.
    let noi = effective_annual - gross_annual * 0.10;
    let cap_rate_pct = if price > 0.0 { noi / price * 100.0 } else { 0.0 };
    let monthly_cash_flow = params.expected_monthly_rent * (1.0 - params.vacancy_rate) - payment;

    InvestmentMetrics {
        cap_rate_pct,
        monthly_cash_flow,
    }
}

pub fn loan_programs(profile: &Profile, affordability: &Affordability) -> LoanPrograms {
    let min_conventional_down = affordability.recommended_price * 0.05;
    LoanPrograms {
        conventional_eligible: profile.credit_score >= 620
            && profile.down_payment >= min_conventional_down,
        fha_eligible: profile.credit_score >= 580,
        va_eligible: profile.va_eligible,
    }
}

pub fn preapproval_readiness(
    profile: &Profile,
    affordability: &Affordability,
) -> PreapprovalReadiness {
    let mut blockers = Vec::new();

    if profile.credit_score < 620 {
        blockers.push("raise credit score to at least 620".to_string());
    }
    if affordability.recommended_price > 0.0
        && profile.down_payment < affordability.recommended_price * 0.035
    {
        blockers.push("save at least 3.5% of the target price for a down payment".to_string());
    }
    if affordability.back_end_dti > HARD_DTI_LIMIT {
        blockers.push("reduce monthly debt to bring DTI under 43%".to_string());
    }

    PreapprovalReadiness {
        ready: blockers.is_empty(),
        blockers,
    }
}

fn recommendations(
    profile: &Profile,
    affordability: &Affordability,
    programs: &LoanPrograms,
) -> Vec<String> {
    let mut out = Vec::new();

    out.push(format!(
        "Target homes at or below ${:.0} to keep housing costs comfortable.",
        affordability.recommended_price
    ));
    if programs.va_eligible {
        out.push("You qualify for VA financing with no down payment requirement.".to_string());
    } else if programs.fha_eligible && !programs.conventional_eligible {
        out.push("An FHA loan fits your profile; look into first-time-buyer programs.".to_string());
    }
    if affordability.back_end_dti > BACK_END_CAP {
        out.push("Paying down existing debt first would expand your budget.".to_string());
    } else if affordability.back_end_dti <= FRONT_END_CAP {
        out.push("Your debt load leaves room to consider a larger home.".to_string());
    }
    if profile.down_payment < affordability.recommended_price * 0.20 {
        out.push(
            "A 20% down payment would remove private mortgage insurance.".to_string(),
        );
    }

    out
}

fn analyze_listing(
    listing: &Listing,
    affordability: &Affordability,
    down_payment: f64,
) -> PropertyAnalysis {
    let loan = (listing.price - down_payment).max(0.0);
    let pi = monthly_payment(loan, affordability.rate_used, DEFAULT_TERM_YEARS);
    let payment = pi + listing.annual_taxes / 12.0 + listing.monthly_hoa;

    PropertyAnalysis {
        price: listing.price,
        monthly_payment: payment,
        within_budget: listing.price <= affordability.max_price,
    }
}

/// Compose the full deterministic report. Pure arithmetic; cannot fail
/// for a validated profile.
pub fn compute_report(profile: &Profile, snapshot: &MarketSnapshot) -> ComputedReport {
    let affordability = compute_affordability(profile, snapshot);
    let risk = assess_risk(profile, &affordability);
    let programs = loan_programs(profile, &affordability);
    let stress = stress_test(profile, &affordability);
    let preapproval = preapproval_readiness(profile, &affordability);
    let recs = recommendations(profile, &affordability, &programs);

    let rent_vs_buy = profile.monthly_rent.map(|rent| {
        self::rent_vs_buy(
            rent,
            affordability.recommended_price,
            affordability.monthly_payment,
            snapshot.inflation_rate,
        )
    });

    let listing = profile
        .listing
        .as_ref()
        .or(snapshot.imported_listing.as_ref());
    let property = listing.map(|l| analyze_listing(l, &affordability, profile.down_payment));

    let investment = profile.investment.as_ref().map(|params| {
        let price = listing
            .map(|l| l.price)
            .unwrap_or(affordability.recommended_price);
        investment_metrics(params, price, affordability.monthly_payment)
    });

    ComputedReport {
        affordability,
        risk,
        recommendations: recs,
        loan_programs: programs,
        stress_test: stress,
        preapproval,
        rent_vs_buy,
        investment,
        property,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fallback_snapshot;

    fn profile() -> Profile {
        Profile {
            annual_income: 120_000.0,
            monthly_debts: 500.0,
            down_payment: 60_000.0,
            credit_score: 740,
            location: "Austin, TX".to_string(),
            monthly_rent: Some(2_200.0),
            va_eligible: false,
            listing: None,
            listing_url: None,
            investment: None,
        }
    }

    #[test]
    fn test_monthly_payment_standard_case() {
        // $300k at 6% over 30 years is a well-known ~$1798.65.
        let payment = monthly_payment(300_000.0, 6.0, 30);
        assert!((payment - 1798.65).abs() < 1.0, "payment was {payment}");
    }

    #[test]
    fn test_monthly_payment_zero_rate() {
        let payment = monthly_payment(360_000.0, 0.0, 30);
        assert!((payment - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_payment_monotonic_in_rate() {
        let low = monthly_payment(300_000.0, 5.0, 30);
        let high = monthly_payment(300_000.0, 7.0, 30);
        assert!(high > low);
    }

    #[test]
    fn test_principal_for_payment_inverts_payment() {
        let principal = 250_000.0;
        let payment = monthly_payment(principal, 6.5, 30);
        let back = principal_for_payment(payment, 6.5, 30);
        assert!((back - principal).abs() < 1.0);
    }

    #[test]
    fn test_remaining_balance_decreases() {
        let principal = 300_000.0;
        let after_year = remaining_balance(principal, 6.0, 30, 12);
        let after_two = remaining_balance(principal, 6.0, 30, 24);
        assert!(after_year < principal);
        assert!(after_two < after_year);
        assert!((remaining_balance(principal, 6.0, 30, 360)).abs() < 1.0);
    }

    #[test]
    fn test_affordability_respects_income_ceiling() {
        let profile = profile();
        let snapshot = fallback_snapshot();
        let affordability = compute_affordability(&profile, &snapshot);

        let monthly_income = profile.annual_income / 12.0;
        assert!(affordability.monthly_payment < monthly_income * FRONT_END_CAP);
        assert!(affordability.back_end_dti <= BACK_END_CAP + 1e-9);
        assert!(affordability.recommended_price < affordability.max_price);
        assert!(affordability.max_price > profile.down_payment);
    }

    #[test]
    fn test_risk_escalates_with_debt() {
        let snapshot = fallback_snapshot();
        let mut strained = profile();
        strained.monthly_debts = 3_000.0;
        strained.credit_score = 610;
        strained.down_payment = 5_000.0;

        let affordability = compute_affordability(&strained, &snapshot);
        let risk = assess_risk(&strained, &affordability);
        assert!(risk.level.rank() >= RiskLevel::High.rank());
        assert!(!risk.factors.is_empty());
    }

    #[test]
    fn test_rent_vs_buy_prefers_rent_when_rent_is_cheap() {
        let result = rent_vs_buy(500.0, 400_000.0, 3_000.0, 3.0);
        assert_eq!(result.verdict, RentVsBuyVerdict::Rent);
        assert!(result.five_year_rent_cost < result.five_year_buy_cost);
    }

    #[test]
    fn test_stress_test_fields_are_consistent() {
        let profile = profile();
        let snapshot = fallback_snapshot();
        let affordability = compute_affordability(&profile, &snapshot);
        let stress = stress_test(&profile, &affordability);
        assert!(stress.payment_at_shocked_rate > affordability.monthly_payment);
    }

    #[test]
    fn test_compute_report_composes_optional_sections() {
        let mut profile = profile();
        profile.investment = Some(InvestmentParams {
            expected_monthly_rent: 2_500.0,
            vacancy_rate: 0.05,
        });
        let snapshot = fallback_snapshot();
        let report = compute_report(&profile, &snapshot);

        assert!(report.rent_vs_buy.is_some());
        assert!(report.investment.is_some());
        assert!(report.property.is_none());
        assert!(!report.recommendations.is_empty());
    }
}
