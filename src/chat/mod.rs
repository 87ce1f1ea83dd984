//! Conversational tool-use loop
//!
//! Drives one follow-up chat turn against a previously generated
//! report. Per turn: input guardrail, system prompt assembly (persona
//! hints + session memory + rolling summary + hardening suffix),
//! history truncation, then up to `max_iterations` model/tool
//! round-trips. Tool calls go through the cache and parameter
//! validation; results feed session memory. The final text passes the
//! output fact-check before it is returned.

use crate::cache::TtlCache;
use crate::context::{
    self, extract_facts, memory_block, persona_hints, ContextConfig,
};
use crate::error::AdvisorError;
use crate::gemini::LanguageModel;
use crate::guardrails::{
    FactChecker, GuardrailConfig, InputGuard, CANNED_LOOP_EXHAUSTED, HARDENING_SUFFIX,
};
use crate::models::{ChatTurn, ConversationState, Discrepancy, GuardrailVerdict, ToolCall};
use crate::tools::{tool_schemas, ToolRegistry, ToolSchema};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: String,
    /// Model calls made this turn (1 = no tools were needed).
    pub iterations: usize,
    pub tool_calls: usize,
    pub discrepancies: Vec<Discrepancy>,
}

struct ToolOutcome {
    result: String,
    ok: bool,
}

pub struct ChatEngine {
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    cache: TtlCache<Value>,
    schemas: Vec<ToolSchema>,
    input_guard: InputGuard,
    fact_checker: FactChecker,
    context_config: ContextConfig,
    max_iterations: usize,
}

impl ChatEngine {
    /// Build the engine and verify the registry covers exactly the
    /// declared tool set.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: ToolRegistry,
        cache: TtlCache<Value>,
        guardrails: &GuardrailConfig,
        context_config: ContextConfig,
        max_iterations: usize,
    ) -> crate::Result<Self> {
        let schemas = tool_schemas();
        tools.ensure_matches(&schemas)?;

        Ok(Self {
            model,
            tools,
            cache,
            schemas,
            input_guard: InputGuard::new(guardrails)?,
            fact_checker: FactChecker::new(guardrails.deviation_threshold),
            context_config,
            max_iterations,
        })
    }

    /// Run one user turn. Guardrail denials come back as ordinary
    /// replies carrying the canned response; only internal invariant
    /// breaches surface as errors.
    pub async fn run_turn(
        &self,
        state: &mut ConversationState,
        message: &str,
    ) -> crate::Result<ChatReply> {
        if let GuardrailVerdict::Deny {
            reason,
            canned_response,
        } = self.input_guard.check(message, self.model.as_ref()).await
        {
            info!(%reason, "chat input denied");
            return Ok(ChatReply {
                response: canned_response,
                iterations: 0,
                tool_calls: 0,
                discrepancies: Vec::new(),
            });
        }

        state.turns.push(ChatTurn::user(message));

        // Fold older turns into the rolling summary before truncation
        // can drop them.
        state.summary = context::update_summary(
            state.summary.as_deref(),
            &state.turns,
            self.model.as_ref(),
            &self.context_config,
        )
        .await;

        let system = self.build_system_prompt(state);

        let mut working = state.turns.clone();
        context::truncate_history(&mut working, &self.context_config);

        let mut iterations = 0;
        let mut tool_call_count = 0;

        while iterations < self.max_iterations {
            iterations += 1;

            let turn = match self
                .model
                .chat(&system, &working, &self.schemas)
                .await
            {
                Ok(turn) => turn,
                Err(error) => {
                    warn!(%error, "chat model call failed, returning retry prompt");
                    return Ok(ChatReply {
                        response: CANNED_LOOP_EXHAUSTED.to_string(),
                        iterations,
                        tool_calls: tool_call_count,
                        discrepancies: Vec::new(),
                    });
                }
            };

            if turn.tool_calls.is_empty() {
                // Success path: a text-only turn ends the loop.
                let text = turn.text.unwrap_or_else(|| "Understood.".to_string());
                let discrepancies = self.fact_checker.check(&text, &state.report);
                let response = self.fact_checker.annotate(&text, &discrepancies);

                state.turns.push(ChatTurn::assistant(response.clone()));

                return Ok(ChatReply {
                    response,
                    iterations,
                    tool_calls: tool_call_count,
                    discrepancies,
                });
            }

            let assistant_turn = ChatTurn::assistant_tool_calls(
                turn.text.clone().unwrap_or_default(),
                turn.tool_calls.clone(),
            );
            working.push(assistant_turn.clone());
            state.turns.push(assistant_turn);

            // Execute requests in order; cached results keep the same
            // interleaving as fresh ones.
            for call in &turn.tool_calls {
                tool_call_count += 1;
                let outcome = self.resolve_tool_call(call).await;

                if outcome.ok {
                    state.memory.record_tool(&call.name);
                    state.memory.merge_facts(extract_facts(&call.name, &outcome.result));
                }

                let tool_turn = ChatTurn::tool_result(call.name.clone(), outcome.result);
                working.push(tool_turn.clone());
                state.turns.push(tool_turn);
            }
        }

        // Iteration budget exhausted without a final text turn. Not an
        // error: the user gets a retry prompt instead.
        info!(max = self.max_iterations, "chat loop exhausted");
        Ok(ChatReply {
            response: CANNED_LOOP_EXHAUSTED.to_string(),
            iterations,
            tool_calls: tool_call_count,
            discrepancies: Vec::new(),
        })
    }

    /// Cache lookup, parameter validation, then execution. Validation
    /// failures become the tool result so the model can self-correct.
    async fn resolve_tool_call(&self, call: &ToolCall) -> ToolOutcome {
        let key = context::tool_cache_key(&call.name, &call.input);

        if let Some(Value::String(cached)) = self.cache.get(&key).await {
            debug!(tool = %call.name, "tool cache hit");
            return ToolOutcome {
                result: cached,
                ok: true,
            };
        }

        match self.tools.execute(&call.name, &call.input).await {
            Ok(result) => {
                if let Some(tool) = self.tools.get(&call.name) {
                    self.cache
                        .set(key, Value::String(result.clone()), tool.cache_ttl())
                        .await;
                }
                ToolOutcome { result, ok: true }
            }
            Err(AdvisorError::InvalidToolInput(message)) => {
                debug!(tool = %call.name, %message, "tool input rejected");
                ToolOutcome {
                    result: json!({ "error": message }).to_string(),
                    ok: false,
                }
            }
            Err(error) => {
                warn!(tool = %call.name, %error, "tool execution failed");
                ToolOutcome {
                    result: json!({ "error": error.to_string() }).to_string(),
                    ok: false,
                }
            }
        }
    }

    fn build_system_prompt(&self, state: &ConversationState) -> String {
        let affordability = &state.report.affordability;
        let mut prompt = format!(
            "You are a friendly home-affordability advisor answering follow-up \
             questions about the user's generated report.\n\nREPORT CONTEXT:\n\
             - maximum price: ${:.0}\n- recommended price: ${:.0}\n\
             - monthly payment: ${:.0}\n- rate used: {:.2}%\n\
             - front-end DTI: {:.1}%\n- back-end DTI: {:.1}%\n- risk level: {}\n",
            affordability.max_price,
            affordability.recommended_price,
            affordability.monthly_payment,
            affordability.rate_used,
            affordability.front_end_dti * 100.0,
            affordability.back_end_dti * 100.0,
            state.report.risk.level,
        );

        let hints = persona_hints(&state.report);
        if !hints.is_empty() {
            prompt.push_str("\nGUIDANCE:\n");
            for hint in hints {
                prompt.push_str(&format!("- {}\n", hint));
            }
        }

        if let Some(block) = memory_block(&state.memory) {
            prompt.push('\n');
            prompt.push_str(&block);
        }

        if let Some(summary) = &state.summary {
            prompt.push_str(&format!("\nCONVERSATION SUMMARY:\n{}\n", summary));
        }

        prompt.push('\n');
        prompt.push_str(HARDENING_SUFFIX);
        prompt
    }
}
