// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tracing::{debug, warn};

use troupe_config::AgentConfig;
use troupe_model::{ChatReply, ChatRequest, Message, ModelProvider, ToolSchema};
use troupe_tools::{Tool, ToolCall, ToolOutput};

use crate::events::{ChatEvent, EventSink};
use crate::message::{ChatMessage, ChatRole};
use crate::prompts::effective_system_prompt;

/// Upper bound on model↔tool rounds within one worker turn.  When the
/// model is still calling tools after this many rounds, the turn ends with
/// whatever text is available.
pub const MAX_ITERATIONS: usize = 5;

/// How many trailing conversation messages a worker sees as context.
pub const HISTORY_WINDOW: usize = 10;

/// Wire truncation limits for tool events.  Full tool output still reaches
/// the model; only the event payload is clipped.
const ARGS_EVENT_LIMIT: usize = 300;
const RESULT_EVENT_LIMIT: usize = 500;

/// Text returned when the iteration cap is reached without a final answer.
const MAX_ITERATIONS_FALLBACK: &str =
    "[no final response: tool-call iteration limit reached]";

/// One member of a group, ready to execute instructions: configuration,
/// a resolved model driver, and the bound tool set (platform tools named
/// in the config plus the retrieval tool when the agent has an index).
pub struct WorkerAgent {
    name: String,
    description: String,
    system_prompt: String,
    persona: Option<String>,
    provider: Arc<dyn ModelProvider>,
    tools: Vec<Arc<dyn Tool>>,
}

impl WorkerAgent {
    pub fn new(
        config: &AgentConfig,
        persona: Option<String>,
        provider: Arc<dyn ModelProvider>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description().to_string(),
            system_prompt: config.system_prompt.clone(),
            persona,
            provider,
            tools,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The description presented to the supervisor in the team roster.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Execute one instruction with conversation context, driving the
    /// bounded tool loop and emitting progress events through `sink`.
    ///
    /// Returns the agent's final text.  A provider failure aborts the turn
    /// with the underlying [`troupe_model::ModelError`]; a failed tool call
    /// becomes that tool's result and the loop continues.  A closed sink
    /// aborts with [`crate::Cancelled`] before the next model call.
    pub async fn invoke(
        &self,
        instruction: &str,
        history: &[ChatMessage],
        sink: &EventSink,
    ) -> anyhow::Result<String> {
        let mut messages = self.build_prompt(instruction, history);
        let schemas = self.tool_schemas();

        debug!(
            agent = %self.name,
            history_len = history.len(),
            tool_count = schemas.len(),
            "executing instruction"
        );

        for _ in 0..MAX_ITERATIONS {
            sink.try_emit(ChatEvent::Thinking { agent: self.name.clone() })?;

            let reply = self
                .provider
                .invoke(ChatRequest { messages: messages.clone(), tools: schemas.clone() })
                .await?;

            let calls = match reply {
                ChatReply::Text(text) => {
                    sink.try_emit(ChatEvent::AgentMessage {
                        agent: self.name.clone(),
                        content: text.clone(),
                    })?;
                    return Ok(text);
                }
                ChatReply::ToolCalls(calls) => calls,
            };

            for call in calls {
                messages.push(Message::tool_call(&call.id, &call.name, call.args.clone()));
                sink.try_emit(ChatEvent::ToolCall {
                    agent: self.name.clone(),
                    tool: call.name.clone(),
                    args: truncate_chars(&call.args.to_string(), ARGS_EVENT_LIMIT),
                })?;

                let output = self
                    .execute_tool(&ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        args: call.args.clone(),
                    })
                    .await;

                sink.try_emit(ChatEvent::ToolResult {
                    agent: self.name.clone(),
                    tool: call.name.clone(),
                    result: truncate_chars(&output.content, RESULT_EVENT_LIMIT),
                })?;
                messages.push(Message::tool_result(&call.id, &output.content));
            }
        }

        warn!(agent = %self.name, "tool-call iteration limit reached");
        Ok(MAX_ITERATIONS_FALLBACK.to_string())
    }

    /// Dispatch one call against the bound tool set.  A tool that is not
    /// bound, and a tool whose execution fails, both produce an error
    /// output the model can read and react to.
    async fn execute_tool(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            warn!(agent = %self.name, tool = %call.name, "model requested unbound tool");
            return ToolOutput::err(&call.id, format!("Tool {} not found", call.name));
        };
        let output = tool.execute(call).await;
        if output.is_error {
            ToolOutput::err(
                &call.id,
                format!("Tool {} failed: {}", call.name, output.content),
            )
        } else {
            output
        }
    }

    /// Assemble the provider prompt: effective system prompt, the last
    /// [`HISTORY_WINDOW`] conversation messages rendered with speaker
    /// labels, then the supervisor's instruction.
    fn build_prompt(&self, instruction: &str, history: &[ChatMessage]) -> Vec<Message> {
        let mut messages = vec![Message::system(effective_system_prompt(
            &self.system_prompt,
            self.persona.as_deref(),
        ))];

        let start = history.len().saturating_sub(HISTORY_WINDOW);
        for msg in &history[start..] {
            match msg.role {
                ChatRole::User => {
                    messages.push(Message::user(format!("[User]: {}", msg.content)));
                }
                ChatRole::Assistant => {
                    messages.push(Message::assistant(format!(
                        "[{}]: {}",
                        msg.speaker(),
                        msg.content
                    )));
                }
                // System notices are operational records, not conversation.
                ChatRole::System => {}
            }
        }

        messages.push(Message::user(format!("[Supervisor Instruction]: {instruction}")));
        messages
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }
}

/// Clip to at most `max` characters on a char boundary.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
