// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The agent registry: `agents_registry.json`, a versioned document keyed
//! by agent id.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::warn;

use troupe_config::AgentConfig;

pub struct AgentRegistry {
    path: PathBuf,
}

impl AgentRegistry {
    /// Open (or create) the registry document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let registry = Self { path: path.into() };
        if !registry.path.exists() {
            registry.save(&json!({"version": "1.0", "agents": {}}))?;
        }
        Ok(registry)
    }

    /// Look up an agent's configuration.  A missing agent is `None`, not
    /// an error — groups run with the subset of members that resolve.
    pub fn get_agent(&self, agent_id: &str) -> Option<AgentConfig> {
        let doc = self.load().ok()?;
        let raw = doc.get("agents")?.get(agent_id)?;
        match serde_json::from_value::<AgentConfig>(raw.clone()) {
            Ok(mut config) => {
                if config.id.is_empty() {
                    config.id = agent_id.to_string();
                }
                Some(config)
            }
            Err(e) => {
                warn!(agent_id, "unparseable agent entry: {e}");
                None
            }
        }
    }

    pub fn register_agent(&self, agent_id: &str, config: &AgentConfig) -> anyhow::Result<()> {
        let mut doc = self.load()?;
        let agents = doc
            .get_mut("agents")
            .and_then(Value::as_object_mut)
            .context("registry document has no agents map")?;
        if agents.contains_key(agent_id) {
            anyhow::bail!("agent already exists: {agent_id}");
        }
        agents.insert(agent_id.to_string(), serde_json::to_value(config)?);
        self.save(&doc)
    }

    pub fn remove_agent(&self, agent_id: &str) -> anyhow::Result<()> {
        let mut doc = self.load()?;
        let agents = doc
            .get_mut("agents")
            .and_then(Value::as_object_mut)
            .context("registry document has no agents map")?;
        if agents.remove(agent_id).is_none() {
            anyhow::bail!("agent does not exist: {agent_id}");
        }
        self.save(&doc)
    }

    /// List agents, optionally filtered by workspace.
    pub fn list_agents(&self, workspace: Option<&str>) -> Vec<AgentConfig> {
        let Ok(doc) = self.load() else {
            return Vec::new();
        };
        let Some(agents) = doc.get("agents").and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut list: Vec<AgentConfig> = agents
            .iter()
            .filter_map(|(id, raw)| {
                let mut config: AgentConfig = serde_json::from_value(raw.clone()).ok()?;
                if config.id.is_empty() {
                    config.id = id.clone();
                }
                Some(config)
            })
            .filter(|a| workspace.is_none_or(|ws| a.workspace == ws))
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    fn load(&self) -> anyhow::Result<Value> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", self.path.display()))
    }

    fn save(&self, doc: &Value) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(doc)?)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, AgentRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let reg = AgentRegistry::new(dir.path().join("agents_registry.json")).unwrap();
        (dir, reg)
    }

    fn agent(name: &str, workspace: &str) -> AgentConfig {
        AgentConfig {
            name: name.into(),
            workspace: workspace.into(),
            system_prompt: format!("You are {name}."),
            provider_id: "p1".into(),
            model_name: "m1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn new_creates_the_document() {
        let (dir, _reg) = registry();
        assert!(dir.path().join("agents_registry.json").exists());
    }

    #[test]
    fn register_and_get() {
        let (_dir, reg) = registry();
        reg.register_agent("writer", &agent("Writer", "ws1")).unwrap();
        let got = reg.get_agent("writer").unwrap();
        assert_eq!(got.name, "Writer");
        assert_eq!(got.id, "writer", "id backfilled from the key");
    }

    #[test]
    fn get_missing_agent_is_none() {
        let (_dir, reg) = registry();
        assert!(reg.get_agent("ghost").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (_dir, reg) = registry();
        reg.register_agent("a", &agent("A", "ws1")).unwrap();
        assert!(reg.register_agent("a", &agent("A", "ws1")).is_err());
    }

    #[test]
    fn remove_agent_deletes_the_entry() {
        let (_dir, reg) = registry();
        reg.register_agent("a", &agent("A", "ws1")).unwrap();
        reg.remove_agent("a").unwrap();
        assert!(reg.get_agent("a").is_none());
        assert!(reg.remove_agent("a").is_err());
    }

    #[test]
    fn list_filters_by_workspace() {
        let (_dir, reg) = registry();
        reg.register_agent("a", &agent("A", "ws1")).unwrap();
        reg.register_agent("b", &agent("B", "ws2")).unwrap();
        assert_eq!(reg.list_agents(None).len(), 2);
        let ws1 = reg.list_agents(Some("ws1"));
        assert_eq!(ws1.len(), 1);
        assert_eq!(ws1[0].name, "A");
    }
}
