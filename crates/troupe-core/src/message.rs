// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record in a group's append-only conversation log.
///
/// Messages are created by the engines and persisted as-is; they are never
/// mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Display alias of `agent_name`, kept for front-end compatibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Set on the assistant message that announces a plan.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_plan: bool,
    /// Raw plan snapshot carried by a plan announcement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_data: Option<serde_json::Value>,
    /// Correlates a tool result to its request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            agent_id: None,
            agent_name: None,
            name: None,
            is_plan: false,
            plan_data: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            ..Self::user(content)
        }
    }

    /// An assistant message attributed to a named agent.
    pub fn agent(agent_name: impl Into<String>, content: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        Self {
            role: ChatRole::Assistant,
            agent_name: Some(agent_name.clone()),
            name: Some(agent_name),
            ..Self::user(content)
        }
    }

    /// The plan announcement: an agent message flagged with the raw plan
    /// snapshot for the client's plan panel.
    pub fn plan(
        agent_name: impl Into<String>,
        content: impl Into<String>,
        plan_data: serde_json::Value,
    ) -> Self {
        Self {
            is_plan: true,
            plan_data: Some(plan_data),
            ..Self::agent(agent_name, content)
        }
    }

    /// The label used when rendering this message into a transcript:
    /// the agent name when present, otherwise the role.
    pub fn speaker(&self) -> &str {
        self.agent_name
            .as_deref()
            .unwrap_or(match self.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::System => "system",
            })
    }
}

/// Persisted roles.  The legacy role `"agent"` found in older logs is
/// normalized to `assistant` on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant", alias = "agent")]
    Assistant,
    #[serde(rename = "system")]
    System,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
