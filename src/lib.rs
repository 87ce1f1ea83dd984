//! Home-Affordability Advisor
//!
//! A streamed report pipeline plus a guarded follow-up chat:
//! - Three-phase analysis (concurrent fetch → deterministic compute →
//!   one synthesis call with a template fallback), emitted as ordered
//!   stream events
//! - A bounded tool-use conversation loop over a fixed tool set
//! - A four-layer guardrail pipeline (input, prompt hardening, tool
//!   parameters, output fact-check)
//! - Context engineering: truncation, rolling summaries, persona
//!   hints, session memory, tool-result caching
//! - One shared process-lifetime TTL cache

pub mod api;
pub mod cache;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod finance;
pub mod gemini;
pub mod guardrails;
pub mod market;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
