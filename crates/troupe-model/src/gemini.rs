// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Google Gemini `generateContent` driver.
//!
//! Also used for Gemini-format relays: when a `base_url` is configured it
//! replaces the default Google endpoint root.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::openai_compat::{parse_retry_after, REQUEST_TIMEOUT};
use crate::{ChatReply, ChatRequest, MessageContent, ModelError, Role, ToolCallRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(model: impl Into<String>, api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl crate::ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatReply, ModelError> {
        let key = self.api_key.as_deref().ok_or(ModelError::AuthRejected)?;

        let mut system = String::new();
        let mut contents: Vec<Value> = Vec::new();
        for m in &req.messages {
            match (&m.role, &m.content) {
                (Role::System, MessageContent::Text(t)) => {
                    if !system.is_empty() {
                        system.push_str("\n\n");
                    }
                    system.push_str(t);
                }
                (_, MessageContent::Text(t)) => contents.push(json!({
                    "role": if m.role == Role::Assistant { "model" } else { "user" },
                    "parts": [{"text": t}],
                })),
                (_, MessageContent::ToolCall { function, .. }) => {
                    let args: Value = serde_json::from_str(&function.arguments)
                        .unwrap_or_else(|_| Value::Object(Default::default()));
                    contents.push(json!({
                        "role": "model",
                        "parts": [{"functionCall": {"name": function.name, "args": args}}],
                    }));
                }
                (_, MessageContent::ToolResult { tool_call_id, content }) => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"functionResponse": {
                            // Gemini correlates by function name, not call id;
                            // the id doubles as the name for synthesized calls.
                            "name": tool_call_id,
                            "response": {"result": content},
                        }}],
                    }));
                }
            }
        }

        let mut body = json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if !req.tools.is_empty() {
            let decls: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{"functionDeclarations": decls}]);
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, content_count = contents.len(), "sending gemini request");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
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

/// Extract the reply from a `generateContent` response.  `functionCall`
/// parts have no id on this API, so call ids are synthesized from the
/// function name plus position.
fn parse_response(v: &Value) -> Result<ChatReply, ModelError> {
    let parts = v["candidates"]
        .get(0)
        .map(|c| &c["content"]["parts"])
        .and_then(Value::as_array)
        .ok_or_else(|| ModelError::Protocol("response has no candidate parts".into()))?;

    let calls: Vec<ToolCallRequest> = parts
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let fc = p.get("functionCall")?;
            let name = fc["name"].as_str()?.to_string();
            Some(ToolCallRequest {
                id: format!("{name}_{i}"),
                name,
                args: fc["args"].clone(),
            })
        })
        .collect();
    if !calls.is_empty() {
        return Ok(ChatReply::ToolCalls(calls));
    }

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        return Err(ModelError::Protocol("response has no text or functionCall parts".into()));
    }
    Ok(ChatReply::Text(text))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
