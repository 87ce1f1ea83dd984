//! Error types for the affordability advisor

use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// Malformed profile or out-of-range tool parameter. Tool parameter
    /// violations are converted to structured text before they reach a
    /// caller; profile violations are the only hard-error path.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream data source or model exceeded its deadline. Always
    /// absorbed via a fallback at the call site.
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Upstream data source or model returned an error. Same fallback
    /// treatment as a timeout.
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Input blocked by a guardrail. Carries the canned response the
    /// caller must render verbatim.
    #[error("Guardrail denial: {0}")]
    GuardrailDenial(String),

    /// Tool-use loop hit its iteration cap without a final text turn.
    #[error("Loop exhausted after {0} iterations")]
    LoopExhausted(usize),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    /// True when the error must be absorbed into degraded output rather
    /// than propagated to the user.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AdvisorError::Validation(_))
    }
}
