//! Gemini API client
//!
//! One `LanguageModel` seam for all three model uses: report synthesis
//! (`generate`), single-token topic classification (`classify`), and
//! the tool-calling chat loop (`chat`). Uses a long-lived
//! reqwest::Client for connection pooling.

use crate::error::AdvisorError;
use crate::models::{ChatTurn, Role, ToolCall};
use crate::tools::ToolSchema;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const CHAT_MODEL: &str = "gemini-2.0-flash";
/// Cheap model for classification and summarization.
const LITE_MODEL: &str = "gemini-2.0-flash-lite";

/// One model response in the chat loop: final text, tool-use requests,
/// or both.
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelTurn {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }
}

/// Seam over the model provider so the orchestrator, guardrails and
/// chat loop can be exercised with scripted models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-form generation (synthesis, summarization).
    async fn generate(&self, prompt: &str) -> crate::Result<String>;

    /// Short classification answer from the cheap model.
    async fn classify(&self, prompt: &str) -> crate::Result<String>;

    /// One chat-loop step with tool definitions attached.
    async fn chat(
        &self,
        system: &str,
        turns: &[ChatTurn],
        tools: &[ToolSchema],
    ) -> crate::Result<ModelTurn>;
}

/// Reusable Gemini client (connection-pooled).
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self { client, api_key })
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            GEMINI_BASE, model, self.api_key
        )
    }

    async fn post(&self, model: &str, request: &GeminiRequest) -> crate::Result<GeminiResponse> {
        if self.api_key.is_empty() {
            return Err(AdvisorError::Llm(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.url(model))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AdvisorError::Llm(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AdvisorError::Llm(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        response.json::<GeminiResponse>().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AdvisorError::Llm(format!("Gemini parse error: {}", e))
        })
    }

    fn first_candidate(response: GeminiResponse) -> crate::Result<Content> {
        response
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content)
            .ok_or_else(|| AdvisorError::Llm("No response from Gemini API".to_string()))
    }

    fn turns_to_contents(turns: &[ChatTurn]) -> Vec<Content> {
        turns
            .iter()
            .map(|turn| match turn.role {
                Role::User => Content {
                    role: Some("user".to_string()),
                    parts: vec![Part::text(&turn.content)],
                },
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !turn.content.is_empty() {
                        parts.push(Part::text(&turn.content));
                    }
                    for call in turn.tool_calls.iter().flatten() {
                        parts.push(Part {
                            function_call: Some(FunctionCall {
                                name: call.name.clone(),
                                args: call.input.clone(),
                            }),
                            ..Part::default()
                        });
                    }
                    Content {
                        role: Some("model".to_string()),
                        parts,
                    }
                }
                Role::Tool => Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        function_response: Some(FunctionResponse {
                            name: turn.tool_name.clone().unwrap_or_default(),
                            response: json!({ "result": turn.content }),
                        }),
                        ..Part::default()
                    }],
                },
            })
            .collect()
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> crate::Result<String> {
        let request = GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(prompt)],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                max_output_tokens: 1024,
            },
            system_instruction: None,
            tools: None,
        };

        debug!("Calling Gemini API (generate)");
        let content = Self::first_candidate(self.post(CHAT_MODEL, &request).await?)?;
        let text = content.text();
        if text.is_empty() {
            return Err(AdvisorError::Llm("Empty response from Gemini".to_string()));
        }
        Ok(text)
    }

    async fn classify(&self, prompt: &str) -> crate::Result<String> {
        let request = GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(prompt)],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_p: 1.0,
                max_output_tokens: 4,
            },
            system_instruction: None,
            tools: None,
        };

        debug!("Calling Gemini API (classify)");
        let content = Self::first_candidate(self.post(LITE_MODEL, &request).await?)?;
        Ok(content.text())
    }

    async fn chat(
        &self,
        system: &str,
        turns: &[ChatTurn],
        tools: &[ToolSchema],
    ) -> crate::Result<ModelTurn> {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|schema| {
                json!({
                    "name": schema.name,
                    "description": schema.description,
                    "parameters": schema.parameters,
                })
            })
            .collect();

        let request = GeminiRequest {
            contents: Self::turns_to_contents(turns),
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                max_output_tokens: 1024,
            },
            system_instruction: Some(SystemInstruction {
                parts: vec![Part::text(system)],
            }),
            tools: Some(vec![json!({ "functionDeclarations": declarations })]),
        };

        debug!("Calling Gemini API (chat)");
        let content = Self::first_candidate(self.post(CHAT_MODEL, &request).await?)?;

        let tool_calls: Vec<ToolCall> = content
            .parts
            .iter()
            .filter_map(|part| part.function_call.as_ref())
            .map(|call| ToolCall {
                name: call.name.clone(),
                input: call.args.clone(),
            })
            .collect();

        let text = content.text();

        Ok(ModelTurn {
            text: if text.is_empty() { None } else { Some(text) },
            tool_calls,
        })
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(value: &str) -> Self {
        Self {
            text: Some(value.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serializes_function_declarations() {
        let request = GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text("What can I afford?")],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                max_output_tokens: 1024,
            },
            system_instruction: Some(SystemInstruction {
                parts: vec![Part::text("You are a home-affordability advisor")],
            }),
            tools: Some(vec![json!({
                "functionDeclarations": [{ "name": "monthly_payment" }]
            })]),
        };

        let encoded = serde_json::to_string(&request).unwrap();
        assert!(encoded.contains("functionDeclarations"));
        assert!(encoded.contains("systemInstruction"));
        assert!(encoded.contains("What can I afford?"));
    }

    #[test]
    fn test_function_call_parts_parse_into_tool_calls() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "functionCall": { "name": "monthly_payment", "args": { "home_price": 400000.0 } } }
                    ]
                }
            }]
        });

        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let content = &response.candidates[0].content;
        let call = content.parts[0].function_call.as_ref().unwrap();
        assert_eq!(call.name, "monthly_payment");
        assert_eq!(call.args["home_price"], 400000.0);
    }

    #[test]
    fn test_tool_turn_maps_to_function_response() {
        let turns = vec![ChatTurn::tool_result(
            "monthly_payment",
            "{\"payment\":2100.0}",
        )];
        let contents = GeminiClient::turns_to_contents(&turns);
        assert_eq!(contents.len(), 1);
        let response = contents[0].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "monthly_payment");
    }
}
