//! Output fact-check
//!
//! Scans model text for dollar and percentage figures near known report
//! field phrases and compares them to the values already computed. A
//! figure deviating beyond the threshold becomes a `Discrepancy`; one
//! correction footnote listing all expected values is appended. The
//! response is annotated, never blocked or rewritten.

use crate::models::{ComputedReport, Discrepancy};
use lazy_static::lazy_static;
use regex::Regex;

struct Matcher {
    field: &'static str,
    regex: Regex,
}

lazy_static! {
    static ref MATCHERS: Vec<Matcher> = vec![
        Matcher {
            field: "max_price",
            regex: Regex::new(
                r"(?i)max(?:imum)?\s+(?:purchase\s+|home\s+)?price[^$%]{0,40}\$\s*([0-9][\d,]*(?:\.\d+)?)"
            )
            .unwrap(),
        },
        Matcher {
            field: "recommended_price",
            regex: Regex::new(
                r"(?i)recommended\s+(?:purchase\s+|home\s+)?price[^$%]{0,40}\$\s*([0-9][\d,]*(?:\.\d+)?)"
            )
            .unwrap(),
        },
        Matcher {
            field: "monthly_payment",
            regex: Regex::new(
                r"(?i)monthly\s+payment[^$%]{0,40}\$\s*([0-9][\d,]*(?:\.\d+)?)"
            )
            .unwrap(),
        },
        Matcher {
            field: "front_end_dti",
            regex: Regex::new(
                r"(?i)front[\s-]end\s+(?:dti|debt[\s-]to[\s-]income)(?:\s+ratio)?[^%]{0,40}?([\d.]+)\s*%"
            )
            .unwrap(),
        },
        Matcher {
            field: "back_end_dti",
            regex: Regex::new(
                r"(?i)back[\s-]end\s+(?:dti|debt[\s-]to[\s-]income)(?:\s+ratio)?[^%]{0,40}?([\d.]+)\s*%"
            )
            .unwrap(),
        },
        Matcher {
            field: "rate_30yr",
            regex: Regex::new(
                r"(?i)30[\s-]year(?:\s+fixed)?(?:\s+mortgage)?\s+rate[^%]{0,40}?([\d.]+)\s*%"
            )
            .unwrap(),
        },
    ];
}

fn expected_value(field: &str, report: &ComputedReport) -> Option<f64> {
    let affordability = &report.affordability;
    let value = match field {
        "max_price" => affordability.max_price,
        "recommended_price" => affordability.recommended_price,
        "monthly_payment" => affordability.monthly_payment,
        "front_end_dti" => affordability.front_end_dti * 100.0,
        "back_end_dti" => affordability.back_end_dti * 100.0,
        "rate_30yr" => affordability.rate_used,
        _ => return None,
    };
    Some(value)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

pub struct FactChecker {
    threshold: f64,
}

impl FactChecker {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Compare every matched figure to the report. At most one
    /// discrepancy per field (the first citation wins).
    pub fn check(&self, text: &str, report: &ComputedReport) -> Vec<Discrepancy> {
        let mut discrepancies = Vec::new();

        for matcher in MATCHERS.iter() {
            let Some(captures) = matcher.regex.captures(text) else {
                continue;
            };
            let Some(cited) = captures.get(1).and_then(|m| parse_number(m.as_str())) else {
                continue;
            };
            let Some(expected) = expected_value(matcher.field, report) else {
                continue;
            };

            let deviation = (cited - expected).abs() / expected.abs().max(1e-9);
            if deviation > self.threshold {
                discrepancies.push(Discrepancy {
                    field: matcher.field.to_string(),
                    cited_value: cited,
                    expected_value: expected,
                    deviation_percent: deviation * 100.0,
                });
            }
        }

        discrepancies
    }

    /// Append a single correction footnote listing all expected values.
    /// Returns the text unchanged when there is nothing to correct.
    pub fn annotate(&self, text: &str, discrepancies: &[Discrepancy]) -> String {
        if discrepancies.is_empty() {
            return text.to_string();
        }

        let mut corrections = Vec::with_capacity(discrepancies.len());
        for d in discrepancies {
            let formatted = match d.field.as_str() {
                "front_end_dti" | "back_end_dti" | "rate_30yr" => {
                    format!("{}: {:.1}%", label(&d.field), d.expected_value)
                }
                _ => format!("{}: ${:.0}", label(&d.field), d.expected_value),
            };
            corrections.push(formatted);
        }

        format!(
            "{}\n\n---\nCorrection: some figures above differ from your computed \
             report. Per the report: {}.",
            text,
            corrections.join("; ")
        )
    }
}

fn label(field: &str) -> &'static str {
    match field {
        "max_price" => "maximum price",
        "recommended_price" => "recommended price",
        "monthly_payment" => "monthly payment",
        "front_end_dti" => "front-end DTI",
        "back_end_dti" => "back-end DTI",
        "rate_30yr" => "30-year rate",
        _ => "value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::compute_report;
    use crate::market::fallback_snapshot;
    use crate::models::Profile;

    fn report() -> ComputedReport {
        let profile = Profile {
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
        };
        compute_report(&profile, &fallback_snapshot())
    }

    #[test]
    fn test_payment_far_off_yields_one_discrepancy() {
        let report = report();
        let wrong = report.affordability.monthly_payment * 1.5;
        let text = format!("Your monthly payment would be about ${:.0}.", wrong);

        let checker = FactChecker::new(0.20);
        let discrepancies = checker.check(&text, &report);

        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].field, "monthly_payment");

        let annotated = checker.annotate(&text, &discrepancies);
        assert!(annotated.contains("Correction:"));
        assert!(annotated.starts_with(&text));
    }

    #[test]
    fn test_payment_within_threshold_is_clean() {
        let report = report();
        let close = report.affordability.monthly_payment * 1.1;
        let text = format!("Your monthly payment lands near ${:.0}.", close);

        let checker = FactChecker::new(0.20);
        let discrepancies = checker.check(&text, &report);

        assert!(discrepancies.is_empty());
        assert_eq!(checker.annotate(&text, &discrepancies), text);
    }

    #[test]
    fn test_comma_formatted_price_is_parsed() {
        let report = report();
        let text = "Your maximum price is $1,000,000 based on my math.";

        let checker = FactChecker::new(0.20);
        let discrepancies = checker.check(text, &report);

        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].field, "max_price");
        assert_eq!(discrepancies[0].cited_value, 1_000_000.0);
    }

    #[test]
    fn test_dti_cited_as_percent_compares_against_fraction() {
        let report = report();
        let expected_pct = report.affordability.back_end_dti * 100.0;
        let text = format!("Your back-end DTI sits at {:.1}%.", expected_pct);

        let checker = FactChecker::new(0.20);
        assert!(checker.check(&text, &report).is_empty());

        let wrong = format!("Your back-end DTI sits at {:.1}%.", expected_pct * 2.0);
        let discrepancies = checker.check(&wrong, &report);
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].field, "back_end_dti");
    }

    #[test]
    fn test_text_without_figures_is_untouched() {
        let report = report();
        let checker = FactChecker::new(0.20);
        let text = "Focus on paying down your card balance before applying.";
        assert!(checker.check(text, &report).is_empty());
    }

    #[test]
    fn test_multiple_fields_one_footnote() {
        let report = report();
        let text = format!(
            "Your monthly payment is ${:.0} and your maximum price is ${:.0}.",
            report.affordability.monthly_payment * 2.0,
            report.affordability.max_price * 2.0,
        );

        let checker = FactChecker::new(0.20);
        let discrepancies = checker.check(&text, &report);
        assert_eq!(discrepancies.len(), 2);

        let annotated = checker.annotate(&text, &discrepancies);
        assert_eq!(annotated.matches("Correction:").count(), 1);
    }
}
