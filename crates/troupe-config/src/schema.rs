// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Serde default helper — returns the literal `"EMPTY"` credential marker.
///
/// Providers that need no key (local endpoints, relays with embedded auth)
/// leave `api_key_env` at this marker and the gateway sends no credential.
fn default_key_env() -> String {
    "EMPTY".to_string()
}

/// The per-user provider configuration document (`llm_providers.json`).
///
/// This file is the only place credentials are referenced — always by
/// environment-variable name, never by value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersFile {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl ProvidersFile {
    /// Look up a provider by id, preserving file order for fallback rules.
    pub fn get(&self, provider_id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == provider_id)
    }

    /// The first configured provider, used as the fallback when an agent
    /// references a provider id that no longer exists.
    pub fn first(&self) -> Option<&ProviderConfig> {
        self.providers.first()
    }
}

/// One model endpoint the user has configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    /// Wire flavor: "openai" | "openai_compatible" | "anthropic" |
    /// "gemini" | "mock"
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name
    pub name: String,
    /// Models offered by this endpoint; the first entry is the default.
    #[serde(default)]
    pub models: Vec<String>,
    /// Base URL override; required for openai_compatible endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable that holds the API key.  A value
    /// that already looks like a key (e.g. starts with `sk-`) is used
    /// verbatim; the marker `"EMPTY"` means no credential.
    #[serde(default = "default_key_env")]
    pub api_key_env: String,
    /// Built-in providers are seeded by the platform and cannot be removed
    /// through the CRUD surface.
    #[serde(default)]
    pub is_builtin: bool,
}

/// Configuration of a single agent, as stored in the agent registry.
///
/// `system_prompt` doubles as the description shown to the supervisor when
/// the team roster is assembled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model_name: String,
    /// Tool names resolved against the platform registry.  Unknown names
    /// are skipped during resolution, not rejected.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Output-mode id selecting an appended style snippet ("normal" means
    /// no snippet).
    #[serde(default)]
    pub persona_mode: Option<String>,
    /// Whether this agent has a retrieval index.  When true the
    /// `search_knowledge_base` tool is bound to the agent's index.
    #[serde(default)]
    pub knowledge: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AgentConfig {
    /// The description presented to peers — the system prompt, with a
    /// generic fallback for agents configured without one.
    pub fn description(&self) -> &str {
        if self.system_prompt.is_empty() {
            "A helpful AI assistant."
        } else {
            &self.system_prompt
        }
    }
}

/// Configuration of a group: one supervisor, a set of worker members, and
/// the latest serialized plan state for resumption.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub supervisor_id: String,
    /// Empty = use the default supervisor protocol templates.
    #[serde(default)]
    pub supervisor_prompt: String,
    #[serde(default)]
    pub workflow_supervisor_prompt: String,
    /// Serialized `PlanState` written back at the end of every turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_state: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: String,
}

/// One entry in the output-modes document (`output_modes.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prompt: String,
}

/// Resolve the style snippet for an output mode.
///
/// Unknown mode ids and the "normal" mode resolve to `None` (no snippet
/// appended).
pub fn persona_prompt<'a>(modes: &'a [OutputMode], mode: Option<&str>) -> Option<&'a str> {
    let mode = mode?;
    modes
        .iter()
        .find(|m| m.id == mode)
        .map(|m| m.prompt.as_str())
        .filter(|p| !p.is_empty())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_deserializes_from_type_field() {
        let json = r#"{"id":"p1","type":"openai","name":"OpenAI","models":["gpt-4o"]}"#;
        let p: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(p.kind, "openai");
        assert_eq!(p.api_key_env, "EMPTY");
    }

    #[test]
    fn providers_file_get_and_first() {
        let file: ProvidersFile = serde_json::from_str(
            r#"{"providers":[
                {"id":"a","type":"openai","name":"A"},
                {"id":"b","type":"anthropic","name":"B"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(file.get("b").unwrap().name, "B");
        assert_eq!(file.first().unwrap().id, "a");
        assert!(file.get("c").is_none());
    }

    #[test]
    fn agent_config_tolerates_partial_documents() {
        let a: AgentConfig = serde_json::from_str(r#"{"name":"Writer"}"#).unwrap();
        assert_eq!(a.name, "Writer");
        assert!(a.tools.is_empty());
        assert!(!a.knowledge);
    }

    #[test]
    fn agent_description_falls_back_when_prompt_empty() {
        let a = AgentConfig::default();
        assert_eq!(a.description(), "A helpful AI assistant.");
        let b = AgentConfig {
            system_prompt: "You review code.".into(),
            ..Default::default()
        };
        assert_eq!(b.description(), "You review code.");
    }

    #[test]
    fn group_config_round_trips_chat_state() {
        let g = GroupConfig {
            id: "group_x_1".into(),
            name: "x".into(),
            chat_state: Some(serde_json::json!({"plan_initialized": true})),
            ..Default::default()
        };
        let json = serde_json::to_string(&g).unwrap();
        let back: GroupConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.chat_state, g.chat_state);
    }

    #[test]
    fn group_config_omits_absent_chat_state() {
        let g = GroupConfig {
            id: "g".into(),
            name: "g".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&g).unwrap();
        assert!(!json.contains("chat_state"));
    }

    #[test]
    fn persona_prompt_resolution() {
        let modes = vec![
            OutputMode {
                id: "normal".into(),
                name: "Normal".into(),
                prompt: String::new(),
            },
            OutputMode {
                id: "concise".into(),
                name: "Concise".into(),
                prompt: "Answer in as few words as possible.".into(),
            },
        ];
        assert!(persona_prompt(&modes, None).is_none());
        assert!(persona_prompt(&modes, Some("normal")).is_none(), "empty prompt is no snippet");
        assert!(persona_prompt(&modes, Some("missing")).is_none());
        assert_eq!(
            persona_prompt(&modes, Some("concise")),
            Some("Answer in as few words as possible.")
        );
    }
}
