// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Fixture-driven mock provider.
//!
//! Loads a YAML file describing the reply for each successive call, so
//! integration fixtures can script a whole conversation without code:
//!
//! ```yaml
//! - text: "APPROVED"
//! - tool_call:
//!     id: call_1
//!     name: search_knowledge_base
//!     args: '{"query": "release dates"}'
//! - text: "The release is scheduled for March."
//! ```

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{ChatReply, ChatRequest, ModelError, ToolCallRequest};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptEntry {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tool_call: Option<ScriptToolCall>,
}

#[derive(Debug, Deserialize)]
struct ScriptToolCall {
    id: String,
    name: String,
    /// JSON-encoded argument object
    #[serde(default)]
    args: String,
}

pub struct YamlMockProvider {
    replies: Mutex<Vec<ChatReply>>,
}

impl YamlMockProvider {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let entries: Vec<ScriptEntry> = serde_yaml::from_str(&text)?;
        let replies = entries
            .into_iter()
            .map(|e| match (e.text, e.tool_call) {
                (Some(t), _) => Ok(ChatReply::Text(t)),
                (None, Some(tc)) => {
                    let args = if tc.args.is_empty() {
                        serde_json::Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&tc.args)?
                    };
                    Ok(ChatReply::ToolCalls(vec![ToolCallRequest {
                        id: tc.id,
                        name: tc.name,
                        args,
                    }]))
                }
                (None, None) => anyhow::bail!("script entry needs `text` or `tool_call`"),
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { replies: Mutex::new(replies) })
    }
}

#[async_trait]
impl crate::ModelProvider for YamlMockProvider {
    fn name(&self) -> &str {
        "yaml-mock"
    }
    fn model_name(&self) -> &str {
        "yaml-mock-model"
    }

    async fn invoke(&self, _req: ChatRequest) -> Result<ChatReply, ModelError> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Ok(ChatReply::Text("[script exhausted]".into()));
        }
        Ok(replies.remove(0))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelProvider;

    #[tokio::test]
    async fn loads_and_plays_script_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.yaml");
        std::fs::write(
            &path,
            "- text: first\n\
             - tool_call:\n    id: c1\n    name: read_file\n    args: '{\"path\": \"a\"}'\n\
             - text: last\n",
        )
        .unwrap();

        let p = YamlMockProvider::from_file(&path).unwrap();
        assert_eq!(p.invoke(ChatRequest::default()).await.unwrap().as_text(), Some("first"));
        match p.invoke(ChatRequest::default()).await.unwrap() {
            ChatReply::ToolCalls(calls) => assert_eq!(calls[0].name, "read_file"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(p.invoke(ChatRequest::default()).await.unwrap().as_text(), Some("last"));
        assert!(p
            .invoke(ChatRequest::default())
            .await
            .unwrap()
            .as_text()
            .unwrap()
            .contains("exhausted"));
    }

    #[test]
    fn entry_without_text_or_tool_call_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "- {}\n").unwrap();
        assert!(YamlMockProvider::from_file(&path).is_err());
    }
}
