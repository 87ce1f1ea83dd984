use affordability_advisor::{
    cache::TtlCache,
    config::AdvisorConfig,
    gemini::GeminiClient,
    market::HttpMarketFeed,
    models::{Profile, StreamEvent},
    orchestrator::AnalysisOrchestrator,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// One-shot CLI run: analyze a sample profile and print the event
/// stream as newline-delimited JSON, exactly as the HTTP surface does.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    dotenv::dotenv().ok();

    let config = AdvisorConfig::from_env();

    let feed = Arc::new(HttpMarketFeed::new(
        config.rates_api_url.clone(),
        config.inflation_api_url.clone(),
        config.property_api_url.clone(),
        config.fetch_timeout,
    )?);
    let model = Arc::new(GeminiClient::new(config.gemini_api_key.clone())?);

    let orchestrator = AnalysisOrchestrator::new(
        feed,
        model,
        TtlCache::new(),
        config.synthesis_timeout,
    );

    let profile = Profile {
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
    };

    info!(location = %profile.location, "running sample analysis");

    let (tx, mut rx) = mpsc::channel::<StreamEvent>(16);
    let run = tokio::spawn(async move {
        orchestrator.run(profile, tx).await;
    });

    while let Some(event) = rx.recv().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    run.await?;
    Ok(())
}
