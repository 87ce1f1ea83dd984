//! REST API server for the affordability advisor
//!
//! `/api/analyze` streams newline-delimited `StreamEvent` JSON objects;
//! `/api/chat` runs one guarded chat turn against a generated report.
//! Session summary and memory live in-process, keyed by a stable UUID
//! derived from the caller's session id, and vanish with the process.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::chat::ChatEngine;
use crate::models::{ChatTurn, ComputedReport, ConversationState, Profile, SessionMemory};
use crate::orchestrator::AnalysisOrchestrator;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub report: ComputedReport,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

/// Per-session state carried across chat requests: the rolling summary
/// and the extracted fact memory. Turns travel with each request.
#[derive(Debug, Clone, Default)]
struct SessionContext {
    summary: Option<String>,
    memory: SessionMemory,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub chat: Arc<ChatEngine>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionContext>>>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>, chat: Arc<ChatEngine>) -> Self {
        Self {
            orchestrator,
            chat,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// =============================
/// Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

fn session_uuid(session_id: Option<&str>) -> Uuid {
    match session_id {
        Some(value) if !value.trim().is_empty() => stable_uuid_from_string(value),
        _ => Uuid::new_v4(),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analysis Stream Endpoint
/// =============================

async fn analyze_handler(State(state): State<ApiState>, Json(profile): Json<Profile>) -> Response {
    info!(location = %profile.location, "analysis request received");

    let (tx, rx) = mpsc::channel(16);
    let orchestrator = state.orchestrator.clone();

    // The run ends on its own when the client disconnects: the
    // receiver drops and sends start failing.
    tokio::spawn(async move {
        orchestrator.run(profile, tx).await;
    });

    let lines = ReceiverStream::new(rx).map(|event| {
        let mut line = serde_json::to_string(&event).unwrap_or_else(|_| {
            "{\"phase\":\"error\",\"message\":\"serialization failure\"}".to_string()
        });
        line.push('\n');
        Ok::<_, std::convert::Infallible>(line)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(lines))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let session_id = session_uuid(request.session_id.as_deref());

    let context = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned().unwrap_or_default()
    };

    let mut conversation = ConversationState {
        turns: request.history,
        summary: context.summary,
        memory: context.memory,
        report: request.report,
    };

    match state.chat.run_turn(&mut conversation, &request.message).await {
        Ok(reply) => {
            // Persist the monotonic parts of the session.
            let mut sessions = state.sessions.write().await;
            sessions.insert(
                session_id,
                SessionContext {
                    summary: conversation.summary,
                    memory: conversation.memory,
                },
            );

            info!(
                %session_id,
                iterations = reply.iterations,
                tool_calls = reply.tool_calls,
                "chat turn complete"
            );

            (
                StatusCode::OK,
                Json(ChatResponse {
                    response: reply.response,
                }),
            )
                .into_response()
        }
        Err(error) => {
            // Canned text covers guardrails and loop exhaustion, so an
            // error here is an internal failure. Never leak details.
            tracing::error!(%error, "chat turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: "The advisor could not process that message.".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// =============================
/// Router & Server Startup
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = stable_uuid_from_string("session-42");
        let b = stable_uuid_from_string("session-42");
        let c = stable_uuid_from_string("session-43");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 4);
    }

    #[test]
    fn test_missing_session_id_gets_fresh_uuid() {
        let a = session_uuid(None);
        let b = session_uuid(None);
        assert_ne!(a, b);

        let c = session_uuid(Some("buyer-1"));
        let d = session_uuid(Some("buyer-1"));
        assert_eq!(c, d);
    }

    #[test]
    fn test_chat_request_deserializes_with_defaults() {
        let report_json = serde_json::json!({
            "affordability": {
                "max_price": 400000.0, "recommended_price": 360000.0,
                "loan_amount": 300000.0, "monthly_payment": 2400.0,
                "front_end_dti": 0.24, "back_end_dti": 0.29, "rate_used": 6.25
            },
            "risk": { "level": "low", "factors": [] },
            "recommendations": [],
            "loan_programs": {
                "conventional_eligible": true, "fha_eligible": true, "va_eligible": false
            },
            "stress_test": {
                "rate_shock_passes": true, "income_shock_passes": true,
                "payment_at_shocked_rate": 2900.0
            },
            "preapproval": { "ready": true, "blockers": [] }
        });

        let raw = serde_json::json!({
            "message": "hello",
            "report": report_json,
        });

        let request: ChatRequest = serde_json::from_value(raw).unwrap();
        assert!(request.history.is_empty());
        assert!(request.session_id.is_none());
    }
}
