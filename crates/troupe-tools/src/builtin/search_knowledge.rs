// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `search_knowledge_base` — the retrieval tool bound per agent.
//!
//! This tool is never registered in the platform registry: the runtime
//! appends it to an agent's bound tool set only when that agent has a
//! knowledge index.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::knowledge::KnowledgeIndex;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct SearchKnowledgeTool {
    pub index: Arc<dyn KnowledgeIndex>,
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search this agent's private knowledge base with a keyword query.\n\
         Returns matching excerpts sorted by relevance.\n\
         Call this before answering any question about domain-specific or\n\
         user-provided material; do not answer such questions from memory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keyword or phrase to search for"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q.trim(),
            _ => return ToolOutput::err(&call.id, "missing or empty 'query'"),
        };
        match self.index.search(query).await {
            Ok(snippets) => ToolOutput::ok(&call.id, snippets),
            Err(e) => ToolOutput::err(&call.id, format!("knowledge search failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{KeywordIndex, KnowledgeDoc};

    fn tool_with(body: &str) -> SearchKnowledgeTool {
        SearchKnowledgeTool {
            index: Arc::new(KeywordIndex::new(vec![KnowledgeDoc {
                source: "faq.md".into(),
                body: body.into(),
            }])),
        }
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "k1".into(), name: "search_knowledge_base".into(), args }
    }

    #[tokio::test]
    async fn missing_query_is_tool_error() {
        let t = tool_with("anything");
        let out = t.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("query"));
    }

    #[tokio::test]
    async fn finds_snippets_in_index() {
        let t = tool_with("The refund window is 30 days.");
        let out = t.execute(&call(json!({"query": "refund"}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("refund window"));
        assert!(out.content.contains("faq.md"));
    }

    #[tokio::test]
    async fn index_failure_becomes_tool_error() {
        struct BrokenIndex;
        #[async_trait]
        impl KnowledgeIndex for BrokenIndex {
            async fn search(&self, _query: &str) -> anyhow::Result<String> {
                anyhow::bail!("vector store offline")
            }
        }
        let t = SearchKnowledgeTool { index: Arc::new(BrokenIndex) };
        let out = t.execute(&call(json!({"query": "x"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("vector store offline"));
    }
}
