// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Group assembly: turn a persisted [`GroupConfig`] into a runnable
//! [`GroupChat`] — supervisor plus workers with resolved providers, bound
//! tools, and the loaded conversation and plan state.

use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use troupe_core::WorkerAgent;
use troupe_group::{GroupChat, PlanState, Supervisor};
use troupe_model::ModelProvider;
use troupe_store::sandboxed_join;
use troupe_tools::builtin::SearchKnowledgeTool;
use troupe_tools::{KeywordIndex, Tool};

use crate::state::AppState;

/// How much conversation history is loaded into a turn.
const HISTORY_LOAD_LIMIT: usize = 100;

pub fn assemble_group(
    state: &AppState,
    workspace_id: &str,
    group_id: &str,
) -> anyhow::Result<GroupChat> {
    let group = state
        .store
        .get_group(workspace_id, group_id)
        .with_context(|| format!("group not found: {group_id}"))?;

    let sup_cfg = state
        .agents
        .get_agent(&group.supervisor_id)
        .with_context(|| format!("supervisor agent not found: {}", group.supervisor_id))?;
    let sup_provider: Arc<dyn ModelProvider> =
        Arc::from(state.gateway.resolve(&sup_cfg.provider_id, &sup_cfg.model_name)?);
    // The group-level prompt override wins over the agent's own prompt.
    let sup_prompt = if group.supervisor_prompt.is_empty() {
        sup_cfg.system_prompt.clone()
    } else {
        group.supervisor_prompt.clone()
    };

    let mut workers = Vec::new();
    for member_id in &group.members {
        // The supervisor orchestrates; it never appears as a worker.
        if member_id == &group.supervisor_id {
            continue;
        }
        let Some(cfg) = state.agents.get_agent(member_id) else {
            warn!(member_id, "skipping missing group member");
            continue;
        };
        let provider: Arc<dyn ModelProvider> =
            Arc::from(state.gateway.resolve(&cfg.provider_id, &cfg.model_name)?);

        let mut tools: Vec<Arc<dyn Tool>> = state.tools.resolve(&cfg.tools);
        if cfg.knowledge {
            // Ids are request- and registry-supplied; build the path through
            // the data-root lock, never by joining them directly.
            let knowledge_dir = sandboxed_join(
                &state.data_root,
                &[workspace_id, &cfg.id, "knowledge"],
            )?;
            if let Some(index) = KeywordIndex::from_dir(&knowledge_dir) {
                tools.push(Arc::new(SearchKnowledgeTool { index: Arc::new(index) }));
            } else {
                warn!(agent = %cfg.id, "agent has knowledge enabled but no documents");
            }
        }

        let persona = troupe_config::persona_prompt(&state.output_modes, cfg.persona_mode.as_deref())
            .map(str::to_string);
        workers.push(WorkerAgent::new(&cfg, persona, provider, tools));
    }

    let history = state.store.get_messages(workspace_id, group_id, HISTORY_LOAD_LIMIT);
    let plan_state = group
        .chat_state
        .as_ref()
        .map(PlanState::from_value)
        .unwrap_or_default();

    Ok(GroupChat::new(
        Supervisor {
            name: sup_cfg.name,
            prompt: sup_prompt,
            provider: sup_provider,
        },
        workers,
    )
    .with_history(history)
    .with_state(plan_state))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use troupe_config::{AgentConfig, OutputMode, ProvidersFile};
    use troupe_model::ProviderGateway;
    use troupe_store::{AgentRegistry, GroupStore, GroupUpdate};
    use troupe_tools::ToolRegistry;

    fn mock_providers() -> ProvidersFile {
        serde_json::from_str(
            r#"{"providers":[{"id":"p1","type":"mock","name":"Mock","models":["mock-model"]}]}"#,
        )
        .unwrap()
    }

    fn test_state(dir: &std::path::Path) -> AppState {
        let mut tools = ToolRegistry::new();
        troupe_tools::builtin::register_builtin_tools(&mut tools, dir);
        AppState {
            store: Arc::new(GroupStore::new(dir)),
            agents: Arc::new(AgentRegistry::new(dir.join("agents_registry.json")).unwrap()),
            gateway: Arc::new(ProviderGateway::new(mock_providers())),
            tools: Arc::new(tools),
            output_modes: Arc::new(vec![OutputMode {
                id: "concise".into(),
                name: "Concise".into(),
                prompt: "Be brief.".into(),
            }]),
            data_root: PathBuf::from(dir),
        }
    }

    fn agent(name: &str) -> AgentConfig {
        AgentConfig {
            name: name.into(),
            workspace: "ws1".into(),
            system_prompt: format!("You are {name}."),
            provider_id: "p1".into(),
            model_name: "mock-model".into(),
            ..Default::default()
        }
    }

    #[test]
    fn assembles_supervisor_and_workers() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.agents.register_agent("sup", &agent("Supervisor")).unwrap();
        state.agents.register_agent("w1", &agent("W1")).unwrap();
        state.agents.register_agent("w2", &agent("W2")).unwrap();
        let g = state
            .store
            .create_group("ws1", "team", vec!["w1".into(), "w2".into()], "sup")
            .unwrap();

        let chat = assemble_group(&state, "ws1", &g.id).unwrap();
        assert_eq!(chat.supervisor_name(), "Supervisor");
        assert_eq!(chat.worker_names(), vec!["W1", "W2"]);
    }

    #[test]
    fn supervisor_listed_as_member_is_excluded_from_workers() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.agents.register_agent("sup", &agent("Supervisor")).unwrap();
        state.agents.register_agent("w1", &agent("W1")).unwrap();
        let g = state
            .store
            .create_group("ws1", "team", vec!["sup".into(), "w1".into()], "sup")
            .unwrap();

        let chat = assemble_group(&state, "ws1", &g.id).unwrap();
        assert_eq!(chat.worker_names(), vec!["W1"]);
    }

    #[test]
    fn missing_members_are_skipped_with_a_subset() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.agents.register_agent("sup", &agent("Supervisor")).unwrap();
        state.agents.register_agent("w1", &agent("W1")).unwrap();
        let g = state
            .store
            .create_group("ws1", "team", vec!["w1".into(), "deleted_agent".into()], "sup")
            .unwrap();

        let chat = assemble_group(&state, "ws1", &g.id).unwrap();
        assert_eq!(chat.worker_names(), vec!["W1"]);
    }

    #[test]
    fn missing_group_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        assert!(assemble_group(&state, "ws1", "nope").is_err());
    }

    #[test]
    fn traversal_workspace_id_cannot_assemble() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        assert!(assemble_group(&state, "../outside", "group_x_1").is_err());
    }

    #[test]
    fn traversal_agent_id_cannot_reach_a_knowledge_dir() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.agents.register_agent("sup", &agent("Supervisor")).unwrap();
        let evil = AgentConfig {
            id: "../../etc".into(),
            knowledge: true,
            ..agent("Evil")
        };
        state.agents.register_agent("evil", &evil).unwrap();
        let g = state
            .store
            .create_group("ws1", "team", vec!["evil".into()], "sup")
            .unwrap();
        assert!(assemble_group(&state, "ws1", &g.id).is_err());
    }

    #[test]
    fn missing_supervisor_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let g = state.store.create_group("ws1", "team", vec![], "ghost").unwrap();
        assert!(assemble_group(&state, "ws1", &g.id).is_err());
    }

    #[test]
    fn chat_state_is_restored_from_group_document() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.agents.register_agent("sup", &agent("Supervisor")).unwrap();
        let g = state.store.create_group("ws1", "team", vec![], "sup").unwrap();
        state
            .store
            .update_group(
                "ws1",
                &g.id,
                GroupUpdate {
                    chat_state: Some(serde_json::json!({
                        "plan_initialized": true,
                        "goal": "resume me",
                        "current_step_index": 2
                    })),
                    ..Default::default()
                },
            )
            .unwrap();

        let chat = assemble_group(&state, "ws1", &g.id).unwrap();
        assert!(chat.state.plan_initialized);
        assert_eq!(chat.state.goal, "resume me");
        assert_eq!(chat.state.current_step_index, 2);
    }
}
