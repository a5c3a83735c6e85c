// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{ChatReply, ChatRequest, ModelError, ToolCallRequest};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatReply, ModelError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::Role::User))
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();
        Ok(ChatReply::Text(format!("MOCK: {reply}")))
    }
}

/// A pre-scripted mock provider.  Each call to `invoke` pops the next
/// scripted outcome from the front of the queue, so tests can specify
/// exact reply sequences — including tool calls and typed errors —
/// without network access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<Vec<Result<ChatReply, ModelError>>>>,
    /// Every request seen by this provider, in call order, so tests can
    /// inspect what was sent.
    pub requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedMockProvider {
    pub fn new(scripts: Vec<Result<ChatReply, ModelError>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: provider that answers every call with the same text.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r = reply.into();
        Self {
            scripts: Arc::new(Mutex::new(vec![Ok(ChatReply::Text(r.clone()))])),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: scripted sequence of plain text replies.
    pub fn texts(replies: impl IntoIterator<Item = &'static str>) -> Self {
        Self::new(
            replies
                .into_iter()
                .map(|r| Ok(ChatReply::Text(r.to_string())))
                .collect(),
        )
    }

    /// Convenience: provider that requests one tool call, then answers with
    /// text on the following round.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Ok(ChatReply::ToolCalls(vec![ToolCallRequest {
                id: tool_id.into(),
                name: tool_name.into(),
                args,
            }])),
            Ok(ChatReply::Text(final_text.into())),
        ])
    }

    /// Number of `invoke` calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn invoke(&self, req: ChatRequest) -> Result<ChatReply, ModelError> {
        self.requests.lock().unwrap().push(req);
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            // Default fallback when all scripts are consumed
            return Ok(ChatReply::Text("[no more scripts]".into()));
        }
        scripts.remove(0)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, ModelProvider};

    fn req(text: &str) -> ChatRequest {
        ChatRequest::text_only(vec![Message::user(text)])
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let p = MockProvider;
        let reply = p.invoke(req("hi")).await.unwrap();
        assert_eq!(reply, ChatReply::Text("MOCK: hi".into()));
    }

    #[tokio::test]
    async fn scripted_pops_in_order() {
        let p = ScriptedMockProvider::texts(["one", "two"]);
        assert_eq!(p.invoke(req("a")).await.unwrap().as_text(), Some("one"));
        assert_eq!(p.invoke(req("b")).await.unwrap().as_text(), Some("two"));
        assert_eq!(p.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_tool_then_text() {
        let p = ScriptedMockProvider::tool_then_text(
            "c1",
            "read_file",
            serde_json::json!({"path": "x"}),
            "done",
        );
        assert!(matches!(p.invoke(req("go")).await.unwrap(), ChatReply::ToolCalls(_)));
        assert_eq!(p.invoke(req("go")).await.unwrap().as_text(), Some("done"));
    }

    #[tokio::test]
    async fn scripted_error_is_returned() {
        let p = ScriptedMockProvider::new(vec![Err(ModelError::Timeout)]);
        assert!(matches!(p.invoke(req("x")).await, Err(ModelError::Timeout)));
    }

    #[tokio::test]
    async fn scripted_fallback_when_exhausted() {
        let p = ScriptedMockProvider::new(vec![]);
        let reply = p.invoke(req("x")).await.unwrap();
        assert!(reply.as_text().unwrap().contains("no more scripts"));
    }

    #[tokio::test]
    async fn scripted_records_requests() {
        let p = ScriptedMockProvider::always_text("ok");
        p.invoke(req("inspect me")).await.unwrap();
        let seen = p.requests.lock().unwrap();
        assert_eq!(seen[0].messages[0].as_text(), Some("inspect me"));
    }
}
