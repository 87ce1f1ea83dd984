//! Environment-backed configuration
//!
//! Loaded once at startup. Policy knobs (timeouts, guardrail thresholds,
//! iteration caps) live here rather than at their use sites.

use std::env;
use std::time::Duration;

/// Top-level advisor configuration.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub gemini_api_key: String,
    pub port: u16,
    /// Base URL of the mortgage-rate provider; empty disables live fetch.
    pub rates_api_url: Option<String>,
    pub inflation_api_url: Option<String>,
    pub property_api_url: Option<String>,
    /// Hard deadline for the synthesis model call.
    pub synthesis_timeout: Duration,
    /// Deadline for each phase-1 data fetch.
    pub fetch_timeout: Duration,
    /// Maximum model/tool round-trips per chat turn.
    pub max_chat_iterations: usize,
}

impl AdvisorConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .or_else(|_| env::var("API_PORT"))
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);

        let synthesis_timeout_secs = env::var("SYNTHESIS_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(15);

        Self {
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            port,
            rates_api_url: non_empty(env::var("RATES_API_URL").ok()),
            inflation_api_url: non_empty(env::var("INFLATION_API_URL").ok()),
            property_api_url: non_empty(env::var("PROPERTY_API_URL").ok()),
            synthesis_timeout: Duration::from_secs(synthesis_timeout_secs),
            fetch_timeout: Duration::from_secs(10),
            max_chat_iterations: 5,
        }
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            port: 8080,
            rates_api_url: None,
            inflation_api_url: None,
            property_api_url: None,
            synthesis_timeout: Duration::from_secs(15),
            fetch_timeout: Duration::from_secs(10),
            max_chat_iterations: 5,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AdvisorConfig::default();
        assert_eq!(config.synthesis_timeout, Duration::from_secs(15));
        assert_eq!(config.max_chat_iterations, 5);
    }
}
