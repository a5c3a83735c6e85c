// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared driver for OpenAI-compatible chat completion APIs.
//!
//! Hosted OpenAI, self-hosted gateways, and relay services such as
//! OpenRouter all speak the same `/chat/completions` wire format.  This
//! module provides a single `OpenAICompatProvider` that the gateway
//! configures with the endpoint's URL, auth style, and extra headers.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    ChatReply, ChatRequest, Message, MessageContent, ModelError, Role, ToolCallRequest,
};

/// Default wall-clock ceiling for one completion call.  Generous enough for
/// long generations; the stream consumer has its own read timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(320);

/// How to send the API key in HTTP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` — standard for most providers.
    Bearer,
    /// No authentication header — local servers (Ollama, vLLM, LM Studio).
    None,
}

/// OpenAI-compatible chat completion provider.
pub struct OpenAICompatProvider {
    /// Provider id returned by `ModelProvider::name()`.
    label: String,
    /// Model id forwarded to the API.
    model: String,
    /// API key (pre-resolved from config or env).
    api_key: Option<String>,
    /// Full chat completions URL.
    chat_url: String,
    client: reqwest::Client,
    /// Additional HTTP headers (e.g. `HTTP-Referer` for OpenRouter relays).
    extra_headers: Vec<(String, String)>,
    auth_style: AuthStyle,
}

impl OpenAICompatProvider {
    /// Construct a provider from its endpoint base and auth configuration.
    ///
    /// `base_url` ends **before** `/chat/completions`, e.g.
    /// `https://openrouter.ai/api/v1`.
    pub fn new(
        label: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: &str,
        extra_headers: Vec<(String, String)>,
        auth_style: AuthStyle,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            label: label.into(),
            model: model.into(),
            api_key,
            chat_url: format!("{base}/chat/completions"),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            extra_headers,
            auth_style,
        }
    }

    /// Override the request timeout.  Used by tests against local fixtures.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatReply, ModelError> {
        let messages = build_openai_messages(&req.messages);

        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        debug!(
            driver = %self.label,
            model = %self.model,
            tool_count = tools.len(),
            message_count = req.messages.len(),
            "sending completion request"
        );

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        if self.auth_style == AuthStyle::Bearer {
            if let Some(key) = self.api_key.as_deref() {
                http_req = http_req.bearer_auth(key);
            }
        }
        for (name, val) in &self.extra_headers {
            http_req = http_req.header(name.as_str(), val.as_str());
        }

        let resp = http_req.send().await.map_err(ModelError::from_transport)?;

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
        parse_completion(&v)
    }
}

/// Parse the `retry-after` header, when present, as whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Map prompt messages onto the OpenAI wire shape.
fn build_openai_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match &m.content {
            MessageContent::Text(t) => json!({
                "role": role_str(m.role),
                "content": t,
            }),
            MessageContent::ToolCall { tool_call_id, function } => json!({
                "role": "assistant",
                "content": Value::Null,
                "tool_calls": [{
                    "id": tool_call_id,
                    "type": "function",
                    "function": {
                        "name": function.name,
                        "arguments": function.arguments,
                    }
                }],
            }),
            MessageContent::ToolResult { tool_call_id, content } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
        })
        .collect()
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Extract the reply from a non-streaming completion body.
fn parse_completion(v: &Value) -> Result<ChatReply, ModelError> {
    let message = v["choices"]
        .get(0)
        .map(|c| &c["message"])
        .ok_or_else(|| ModelError::Protocol("response has no choices".into()))?;

    if let Some(calls) = message["tool_calls"].as_array() {
        if !calls.is_empty() {
            let mut requests = Vec::with_capacity(calls.len());
            for call in calls {
                let id = call["id"].as_str().unwrap_or_default().to_string();
                let name = call["function"]["name"]
                    .as_str()
                    .ok_or_else(|| ModelError::Protocol("tool call without a name".into()))?
                    .to_string();
                // Arguments arrive as a JSON-encoded string; an empty or
                // unparseable payload degrades to an empty object so the
                // tool still sees a well-formed argument value.
                let raw = call["function"]["arguments"].as_str().unwrap_or("{}");
                let args = serde_json::from_str(raw)
                    .unwrap_or_else(|_| Value::Object(Default::default()));
                requests.push(ToolCallRequest { id, name, args });
            }
            return Ok(ChatReply::ToolCalls(requests));
        }
    }

    let text = message["content"]
        .as_str()
        .ok_or_else(|| ModelError::Protocol("response has neither content nor tool calls".into()))?;
    Ok(ChatReply::Text(text.to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
