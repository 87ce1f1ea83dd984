//! Persona hints
//!
//! Short directive strings derived from the computed report and
//! appended to the chat system prompt. Hints are additive, not
//! mutually exclusive.

use crate::finance::{BACK_END_CAP, FRONT_END_CAP};
use crate::models::{ComputedReport, RiskLevel};

pub fn persona_hints(report: &ComputedReport) -> Vec<String> {
    let mut hints = Vec::new();

    if report.loan_programs.va_eligible {
        hints.push(
            "The user is VA-eligible: emphasize VA loan benefits (zero down, no PMI)."
                .to_string(),
        );
    } else if report.loan_programs.fha_eligible && !report.loan_programs.conventional_eligible {
        hints.push(
            "Only FHA fits today: emphasize FHA and first-time-buyer programs.".to_string(),
        );
    }

    if report.affordability.back_end_dti > BACK_END_CAP {
        hints.push(
            "Debt load is high: frame advice around reducing monthly debt first.".to_string(),
        );
    } else if report.affordability.back_end_dti <= FRONT_END_CAP {
        hints.push(
            "Budget has headroom: it is reasonable to discuss a higher price point."
                .to_string(),
        );
    }

    if matches!(report.risk.level, RiskLevel::High | RiskLevel::VeryHigh) {
        hints.push(
            "Risk is elevated: keep a cautious tone and stress emergency reserves."
                .to_string(),
        );
    }

    if report.property.is_some() {
        hints.push(
            "A specific property was analyzed: reference it when relevant.".to_string(),
        );
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::compute_report;
    use crate::market::fallback_snapshot;
    use crate::models::Profile;

    fn profile() -> Profile {
        Profile {
            annual_income: 120_000.0,
            monthly_debts: 500.0,
            down_payment: 60_000.0,
            credit_score: 740,
            location: "Austin, TX".to_string(),
            monthly_rent: None,
            va_eligible: false,
            listing: None,
            listing_url: None,
            investment: None,
        }
    }

    #[test]
    fn test_va_hint_present_for_va_profile() {
        let mut profile = profile();
        profile.va_eligible = true;
        let report = compute_report(&profile, &fallback_snapshot());

        let hints = persona_hints(&report);
        assert!(hints.iter().any(|h| h.contains("VA loan")));
    }

    #[test]
    fn test_high_debt_profile_gets_debt_hint() {
        let mut profile = profile();
        profile.monthly_debts = 3_200.0;
        let report = compute_report(&profile, &fallback_snapshot());

        let hints = persona_hints(&report);
        assert!(hints.iter().any(|h| h.contains("reducing monthly debt")));
    }

    #[test]
    fn test_hints_compose_additively() {
        let mut profile = profile();
        profile.va_eligible = true;
        profile.listing = Some(crate::models::Listing {
            price: 350_000.0,
            annual_taxes: 6_000.0,
            monthly_hoa: 0.0,
            address: None,
        });
        let report = compute_report(&profile, &fallback_snapshot());

        let hints = persona_hints(&report);
        assert!(hints.len() >= 2);
        assert!(hints.iter().any(|h| h.contains("VA loan")));
        assert!(hints.iter().any(|h| h.contains("specific property")));
    }

    #[test]
    fn test_debt_free_profile_gets_headroom_hint() {
        let mut profile = profile();
        profile.monthly_debts = 0.0;
        let report = compute_report(&profile, &fallback_snapshot());

        let hints = persona_hints(&report);
        assert!(hints.iter().any(|h| h.contains("headroom")));
    }
}
