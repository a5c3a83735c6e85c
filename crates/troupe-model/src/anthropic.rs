// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Anthropic messages API driver.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::openai_compat::{parse_retry_after, REQUEST_TIMEOUT};
use crate::{ChatReply, ChatRequest, MessageContent, ModelError, Role, ToolCallRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    model: String,
    api_key: Option<String>,
    messages_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(model: impl Into<String>, api_key: Option<String>, base_url: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            model: model.into(),
            api_key,
            messages_url: format!("{}/v1/messages", base.trim_end_matches('/')),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl crate::ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatReply, ModelError> {
        let key = self.api_key.as_deref().ok_or(ModelError::AuthRejected)?;

        // Anthropic takes the system prompt as a top-level field, not a
        // message; pull it out of the message list.
        let mut system = String::new();
        let mut messages: Vec<Value> = Vec::new();
        for m in &req.messages {
            match (&m.role, &m.content) {
                (Role::System, MessageContent::Text(t)) => {
                    if !system.is_empty() {
                        system.push_str("\n\n");
                    }
                    system.push_str(t);
                }
                (_, MessageContent::Text(t)) => messages.push(json!({
                    "role": wire_role(m.role),
                    "content": t,
                })),
                (_, MessageContent::ToolCall { tool_call_id, function }) => {
                    let input: Value = serde_json::from_str(&function.arguments)
                        .unwrap_or_else(|_| Value::Object(Default::default()));
                    messages.push(json!({
                        "role": "assistant",
                        "content": [{
                            "type": "tool_use",
                            "id": tool_call_id,
                            "name": function.name,
                            "input": input,
                        }],
                    }));
                }
                (_, MessageContent::ToolResult { tool_call_id, content }) => {
                    messages.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": tool_call_id,
                            "content": content,
                        }],
                    }));
                }
            }
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        debug!(model = %self.model, message_count = messages.len(), "sending anthropic request");

        let resp = self
            .client
            .post(&self.messages_url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(ModelError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status, text, retry_after));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| ModelError::Protocol(e.to_string()))?;
        parse_response(&v)
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "assistant",
        _ => "user",
    }
}

/// Extract the reply from an Anthropic messages response.  `tool_use`
/// blocks take precedence over text blocks in the same response.
fn parse_response(v: &Value) -> Result<ChatReply, ModelError> {
    let content = v["content"]
        .as_array()
        .ok_or_else(|| ModelError::Protocol("response has no content blocks".into()))?;

    let calls: Vec<ToolCallRequest> = content
        .iter()
        .filter(|b| b["type"] == "tool_use")
        .map(|b| ToolCallRequest {
            id: b["id"].as_str().unwrap_or_default().to_string(),
            name: b["name"].as_str().unwrap_or_default().to_string(),
            args: b["input"].clone(),
        })
        .collect();
    if !calls.is_empty() {
        return Ok(ChatReply::ToolCalls(calls));
    }

    let text: String = content
        .iter()
        .filter_map(|b| (b["type"] == "text").then(|| b["text"].as_str()).flatten())
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        return Err(ModelError::Protocol("response has no text or tool_use blocks".into()));
    }
    Ok(ChatReply::Text(text))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
