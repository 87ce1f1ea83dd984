use affordability_advisor::{
    api::{start_server, ApiState},
    cache::TtlCache,
    chat::ChatEngine,
    config::AdvisorConfig,
    context::ContextConfig,
    gemini::GeminiClient,
    guardrails::GuardrailConfig,
    market::HttpMarketFeed,
    orchestrator::AnalysisOrchestrator,
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    dotenv::dotenv().ok();

    let config = AdvisorConfig::from_env();
    if config.gemini_api_key.is_empty() {
        eprintln!("GEMINI_API_KEY not set; synthesis will fall back to template summaries");
    }

    info!("Affordability Advisor - API server");
    info!("Port: {}", config.port);

    let feed = Arc::new(HttpMarketFeed::new(
        config.rates_api_url.clone(),
        config.inflation_api_url.clone(),
        config.property_api_url.clone(),
        config.fetch_timeout,
    )?);
    let model = Arc::new(GeminiClient::new(config.gemini_api_key.clone())?);

    // One cache for the whole process: market fetches and tool results
    // share it under prefixed keys.
    let cache = TtlCache::new();

    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        feed.clone(),
        model.clone(),
        cache.clone(),
        config.synthesis_timeout,
    ));

    let chat = Arc::new(ChatEngine::new(
        model,
        create_default_registry(feed),
        cache,
        &GuardrailConfig::default(),
        ContextConfig::default(),
        config.max_chat_iterations,
    )?);

    info!("Components initialized, starting server");

    start_server(ApiState::new(orchestrator, chat), config.port).await?;

    Ok(())
}
