//! Streaming analysis orchestrator
//!
//! Drives one report generation per request through three phases:
//! fetch (concurrent, partial-failure tolerant) → compute
//! (deterministic) → synthesize (one model call with a hard timeout
//! and a template fallback). Emits `StreamEvent`s strictly in phase
//! order over an mpsc channel; a dropped receiver stops the run with
//! no further side effects.

use crate::cache::TtlCache;
use crate::finance;
use crate::gemini::LanguageModel;
use crate::market::{self, MarketFeed};
use crate::models::{ComputedReport, Profile, StreamEvent};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Disclaimers attached to every completed report.
pub const DISCLAIMERS: &[&str] = &[
    "This analysis is educational and is not a loan offer or financial advice.",
    "Rates and market figures are estimates and change daily.",
    "Confirm all numbers with a licensed lender before making decisions.",
];

pub struct AnalysisOrchestrator {
    feed: Arc<dyn MarketFeed>,
    model: Arc<dyn LanguageModel>,
    cache: TtlCache<Value>,
    synthesis_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        model: Arc<dyn LanguageModel>,
        cache: TtlCache<Value>,
        synthesis_timeout: Duration,
    ) -> Self {
        Self {
            feed,
            model,
            cache,
            synthesis_timeout,
        }
    }

    /// Run one analysis. Events arrive in phase order; the stream ends
    /// with `complete`, or with `error` only when the profile itself
    /// fails validation.
    pub async fn run(&self, profile: Profile, tx: mpsc::Sender<StreamEvent>) {
        let trace_id = Uuid::new_v4();
        info!(%trace_id, location = %profile.location, "analysis run starting");

        if let Err(error) = profile.validate() {
            warn!(%trace_id, %error, "profile validation failed");
            let _ = tx
                .send(StreamEvent::Error {
                    message: error.to_string(),
                })
                .await;
            return;
        }

        // === Phase 1: fetch (fan-out, per-source fallback) ===
        let snapshot = market::build_snapshot(self.feed.as_ref(), &profile, &self.cache).await;
        debug!(%trace_id, live_sources = snapshot.sources.iter().filter(|s| s.live).count(), "market snapshot built");

        if tx
            .send(StreamEvent::MarketData {
                snapshot: snapshot.clone(),
            })
            .await
            .is_err()
        {
            debug!(%trace_id, "consumer gone after phase 1, stopping");
            return;
        }

        // === Phase 2: compute (pure) ===
        let report = finance::compute_report(&profile, &snapshot);

        if tx
            .send(StreamEvent::Analysis {
                report: report.clone(),
            })
            .await
            .is_err()
        {
            debug!(%trace_id, "consumer gone after phase 2, stopping");
            return;
        }

        // === Phase 3: synthesize (one model call, hard timeout) ===
        let (text, fallback) = self.synthesize(&profile, &report).await;

        if tx.send(StreamEvent::Summary { text, fallback }).await.is_err() {
            debug!(%trace_id, "consumer gone after phase 3, stopping");
            return;
        }

        let _ = tx
            .send(StreamEvent::Complete {
                disclaimers: DISCLAIMERS.iter().map(|s| s.to_string()).collect(),
                generated_at: Utc::now(),
                trace_id,
            })
            .await;

        info!(%trace_id, "analysis run complete");
    }

    async fn synthesize(&self, profile: &Profile, report: &ComputedReport) -> (String, bool) {
        let prompt = synthesis_prompt(profile, report);

        match tokio::time::timeout(self.synthesis_timeout, self.model.generate(&prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => (text, false),
            Ok(Ok(_)) => {
                warn!("synthesis returned empty text, using template summary");
                (template_summary(report), true)
            }
            Ok(Err(error)) => {
                warn!(%error, "synthesis failed, using template summary");
                (template_summary(report), true)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.synthesis_timeout.as_millis() as u64,
                    "synthesis timed out, using template summary"
                );
                (template_summary(report), true)
            }
        }
    }
}

fn synthesis_prompt(profile: &Profile, report: &ComputedReport) -> String {
    let report_json = serde_json::to_string_pretty(report).unwrap_or_default();
    format!(
        "You are a home-affordability advisor. Write a short narrative summary \
         (3-5 paragraphs) of the analysis below for a buyer in {}. Use only the \
         numbers present in the report, round them naturally, and keep an \
         encouraging but honest tone. Do not add figures that are not in the \
         report.\n\nREPORT:\n{}",
        profile.location, report_json
    )
}

/// Deterministic summary built only from computed numbers; used
/// whenever the synthesis call fails or times out.
pub fn template_summary(report: &ComputedReport) -> String {
    let affordability = &report.affordability;
    let mut summary = format!(
        "Based on your finances, you can afford a home up to ${:.0}, with a \
         recommended target of ${:.0}. At a {:.2}% rate your estimated monthly \
         payment is ${:.0}, putting your debt-to-income ratio at {:.0}% \
         ({:.0}% including existing debts). Overall risk level: {}.",
        affordability.max_price,
        affordability.recommended_price,
        affordability.rate_used,
        affordability.monthly_payment,
        affordability.front_end_dti * 100.0,
        affordability.back_end_dti * 100.0,
        report.risk.level,
    );

    if let Some(first) = report.recommendations.first() {
        summary.push_str(&format!(" Next step: {}", first));
    }

    summary
}
