// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Group configuration and message-log persistence.
//!
//! Layout under the data root:
//! - `<workspace>/_group_chats.json` — ordered array of [`GroupConfig`]
//! - `<workspace>/_group_messages_<group_id>.json` — ordered array of
//!   [`ChatMessage`], append-only
//!
//! Writes rewrite the whole document; appends are all-or-nothing at
//! message granularity.
//!
//! Workspace and group ids come from HTTP input; every path is built
//! through the root lock in [`crate::paths`] so a crafted id cannot
//! escape the data root.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use troupe_config::GroupConfig;
use troupe_core::ChatMessage;

use crate::paths::{checked_segment, sandboxed_join};

/// Partial update applied to a group document.  `None` fields are left
/// untouched; the id never changes.
#[derive(Debug, Default, Clone)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub members: Option<Vec<String>>,
    pub supervisor_id: Option<String>,
    pub supervisor_prompt: Option<String>,
    pub workflow_supervisor_prompt: Option<String>,
    pub chat_state: Option<serde_json::Value>,
}

pub struct GroupStore {
    root: PathBuf,
}

impl GroupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn workspace_dir(&self, workspace_id: &str) -> anyhow::Result<PathBuf> {
        sandboxed_join(&self.root, &[workspace_id])
    }

    fn groups_path(&self, workspace_id: &str) -> anyhow::Result<PathBuf> {
        Ok(self.workspace_dir(workspace_id)?.join("_group_chats.json"))
    }

    fn messages_path(&self, workspace_id: &str, group_id: &str) -> anyhow::Result<PathBuf> {
        // The group id lands inside a file name; it gets the same
        // single-component validation as a directory segment.
        checked_segment(group_id)?;
        Ok(self
            .workspace_dir(workspace_id)?
            .join(format!("_group_messages_{group_id}.json")))
    }

    // ── Groups ───────────────────────────────────────────────────────────

    pub fn list_groups(&self, workspace_id: &str) -> Vec<GroupConfig> {
        match self.groups_path(workspace_id) {
            Ok(path) => read_json_array(&path),
            Err(e) => {
                warn!(workspace_id, "rejecting group listing: {e}");
                Vec::new()
            }
        }
    }

    pub fn get_group(&self, workspace_id: &str, group_id: &str) -> Option<GroupConfig> {
        self.list_groups(workspace_id)
            .into_iter()
            .find(|g| g.id == group_id)
    }

    pub fn create_group(
        &self,
        workspace_id: &str,
        name: &str,
        member_ids: Vec<String>,
        supervisor_id: &str,
    ) -> anyhow::Result<GroupConfig> {
        let mut groups = self.list_groups(workspace_id);
        // Separators are flattened so the generated id is always a valid
        // single path segment for the message-log file name.
        let group_id = format!(
            "group_{}_{}",
            name.to_lowercase().replace([' ', '/', '\\'], "_"),
            groups.len() + 1
        );
        let group = GroupConfig {
            id: group_id,
            name: name.to_string(),
            members: member_ids,
            supervisor_id: supervisor_id.to_string(),
            supervisor_prompt: String::new(),
            workflow_supervisor_prompt: String::new(),
            chat_state: None,
            created_at: Utc::now().to_rfc3339(),
        };
        groups.push(group.clone());
        self.save_groups(workspace_id, &groups)?;
        Ok(group)
    }

    /// Apply a partial update.  Returns the updated group, or `None` when
    /// no group with that id exists.
    pub fn update_group(
        &self,
        workspace_id: &str,
        group_id: &str,
        update: GroupUpdate,
    ) -> anyhow::Result<Option<GroupConfig>> {
        let mut groups = self.list_groups(workspace_id);
        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            group.name = name;
        }
        if let Some(members) = update.members {
            group.members = members;
        }
        if let Some(supervisor_id) = update.supervisor_id {
            group.supervisor_id = supervisor_id;
        }
        if let Some(prompt) = update.supervisor_prompt {
            group.supervisor_prompt = prompt;
        }
        if let Some(prompt) = update.workflow_supervisor_prompt {
            group.workflow_supervisor_prompt = prompt;
        }
        if let Some(state) = update.chat_state {
            group.chat_state = Some(state);
        }
        let updated = group.clone();
        self.save_groups(workspace_id, &groups)?;
        Ok(Some(updated))
    }

    pub fn delete_group(&self, workspace_id: &str, group_id: &str) -> anyhow::Result<()> {
        let mut groups = self.list_groups(workspace_id);
        groups.retain(|g| g.id != group_id);
        self.save_groups(workspace_id, &groups)
    }

    fn save_groups(&self, workspace_id: &str, groups: &[GroupConfig]) -> anyhow::Result<()> {
        write_json(&self.groups_path(workspace_id)?, groups)
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Load the newest `limit` messages for a group, normalized for
    /// display (legacy `agent` roles become `assistant` on read via the
    /// role codec; the `name` alias is filled from `agent_name`).
    pub fn get_messages(
        &self,
        workspace_id: &str,
        group_id: &str,
        limit: usize,
    ) -> Vec<ChatMessage> {
        let mut all: Vec<ChatMessage> = match self.messages_path(workspace_id, group_id) {
            Ok(path) => read_json_array(&path),
            Err(e) => {
                warn!(workspace_id, group_id, "rejecting message load: {e}");
                Vec::new()
            }
        };
        if all.len() > limit {
            all.drain(..all.len() - limit);
        }
        for m in &mut all {
            if m.name.is_none() {
                m.name = m.agent_name.clone();
            }
        }
        all
    }

    /// Append one message to the group log.
    pub fn append_message(
        &self,
        workspace_id: &str,
        group_id: &str,
        message: &ChatMessage,
    ) -> anyhow::Result<()> {
        self.append_messages(workspace_id, group_id, std::slice::from_ref(message))
    }

    /// Append a batch of messages in order, as a single rewrite.
    pub fn append_messages(
        &self,
        workspace_id: &str,
        group_id: &str,
        messages: &[ChatMessage],
    ) -> anyhow::Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let path = self.messages_path(workspace_id, group_id)?;
        let mut all: Vec<ChatMessage> = read_json_array(&path);
        all.extend(messages.iter().cloned());
        write_json(&path, &all)
    }

    /// Delete the whole log.  Resumption state downstream of the log is
    /// implicitly reset by the caller clearing `chat_state`.
    pub fn clear_messages(&self, workspace_id: &str, group_id: &str) -> anyhow::Result<()> {
        let path = self.messages_path(workspace_id, group_id)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing {}", path.display()))?;
            info!(group_id, "cleared group messages");
        }
        Ok(())
    }
}

// ── Document helpers ─────────────────────────────────────────────────────────

fn read_json_array<T: serde::de::DeserializeOwned>(path: &Path) -> Vec<T> {
    if !path.exists() {
        return Vec::new();
    }
    match std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|t| serde_json::from_str(&t).map_err(Into::into))
    {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), "unreadable document, treating as empty: {e}");
            Vec::new()
        }
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_core::ChatRole;

    fn store() -> (tempfile::TempDir, GroupStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn create_and_list_groups() {
        let (_dir, store) = store();
        let g = store
            .create_group("ws1", "Design Team", vec!["a1".into(), "a2".into()], "sup")
            .unwrap();
        assert_eq!(g.id, "group_design_team_1");
        let groups = store.list_groups("ws1");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec!["a1", "a2"]);
    }

    #[test]
    fn group_ids_count_up() {
        let (_dir, store) = store();
        store.create_group("ws1", "A", vec![], "s").unwrap();
        let g2 = store.create_group("ws1", "B", vec![], "s").unwrap();
        assert_eq!(g2.id, "group_b_2");
    }

    #[test]
    fn get_group_finds_by_id() {
        let (_dir, store) = store();
        let g = store.create_group("ws1", "A", vec![], "s").unwrap();
        assert!(store.get_group("ws1", &g.id).is_some());
        assert!(store.get_group("ws1", "nope").is_none());
        assert!(store.get_group("other_ws", &g.id).is_none());
    }

    #[test]
    fn partial_update_preserves_other_fields() {
        let (_dir, store) = store();
        let g = store.create_group("ws1", "A", vec!["m1".into()], "s").unwrap();
        let updated = store
            .update_group(
                "ws1",
                &g.id,
                GroupUpdate {
                    supervisor_prompt: Some("Be decisive.".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.supervisor_prompt, "Be decisive.");
        assert_eq!(updated.members, vec!["m1"], "members untouched");
        assert_eq!(updated.supervisor_id, "s");
    }

    #[test]
    fn update_chat_state_round_trips() {
        let (_dir, store) = store();
        let g = store.create_group("ws1", "A", vec![], "s").unwrap();
        let state = serde_json::json!({
            "plan_initialized": true,
            "goal": "G",
            "current_step_index": 2
        });
        store
            .update_group(
                "ws1",
                &g.id,
                GroupUpdate { chat_state: Some(state.clone()), ..Default::default() },
            )
            .unwrap();
        let loaded = store.get_group("ws1", &g.id).unwrap();
        assert_eq!(loaded.chat_state, Some(state));
    }

    #[test]
    fn update_unknown_group_returns_none() {
        let (_dir, store) = store();
        let r = store
            .update_group("ws1", "ghost", GroupUpdate::default())
            .unwrap();
        assert!(r.is_none());
    }

    #[test]
    fn delete_group_removes_it() {
        let (_dir, store) = store();
        let g = store.create_group("ws1", "A", vec![], "s").unwrap();
        store.delete_group("ws1", &g.id).unwrap();
        assert!(store.list_groups("ws1").is_empty());
    }

    #[test]
    fn append_and_load_messages_in_order() {
        let (_dir, store) = store();
        store
            .append_message("ws1", "g1", &ChatMessage::user("first"))
            .unwrap();
        store
            .append_message("ws1", "g1", &ChatMessage::agent("W1", "second"))
            .unwrap();
        let msgs = store.get_messages("ws1", "g1", 100);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "first");
        assert_eq!(msgs[1].content, "second");
    }

    #[test]
    fn get_messages_honors_limit_keeping_newest() {
        let (_dir, store) = store();
        for i in 0..5 {
            store
                .append_message("ws1", "g1", &ChatMessage::user(format!("m{i}")))
                .unwrap();
        }
        let msgs = store.get_messages("ws1", "g1", 2);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "m3");
        assert_eq!(msgs[1].content, "m4");
    }

    #[test]
    fn legacy_agent_role_is_normalized_on_read() {
        let (_dir, store) = store();
        let path = store.messages_path("ws1", "g1").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"[{"role":"agent","content":"old","agent_name":"W1",
                "timestamp":"2025-01-01T00:00:00Z"}]"#,
        )
        .unwrap();
        let msgs = store.get_messages("ws1", "g1", 10);
        assert_eq!(msgs[0].role, ChatRole::Assistant);
        assert_eq!(msgs[0].name.as_deref(), Some("W1"), "name filled from agent_name");
    }

    #[test]
    fn plan_flags_survive_persistence() {
        let (_dir, store) = store();
        let data = serde_json::json!({"goal": "g", "process": ["a"]});
        store
            .append_message("ws1", "g1", &ChatMessage::plan("Supervisor", "# Plan", data.clone()))
            .unwrap();
        let msgs = store.get_messages("ws1", "g1", 10);
        assert!(msgs[0].is_plan);
        assert_eq!(msgs[0].plan_data, Some(data));
    }

    #[test]
    fn clear_messages_removes_the_log() {
        let (_dir, store) = store();
        store
            .append_message("ws1", "g1", &ChatMessage::user("x"))
            .unwrap();
        store.clear_messages("ws1", "g1").unwrap();
        assert!(store.get_messages("ws1", "g1", 10).is_empty());
        // Clearing an already-absent log is fine.
        store.clear_messages("ws1", "g1").unwrap();
    }

    #[test]
    fn append_empty_batch_is_a_no_op() {
        let (_dir, store) = store();
        store.append_messages("ws1", "g1", &[]).unwrap();
        assert!(!store.messages_path("ws1", "g1").unwrap().exists());
    }

    #[test]
    fn traversal_workspace_id_is_rejected() {
        let (_dir, store) = store();
        assert!(store.create_group("../outside", "A", vec![], "s").is_err());
        assert!(store
            .append_message("../outside", "g1", &ChatMessage::user("x"))
            .is_err());
        assert!(store.clear_messages("../outside", "g1").is_err());
        assert!(store.list_groups("../outside").is_empty());
        assert!(store.get_messages("../outside", "g1", 10).is_empty());
    }

    #[test]
    fn traversal_group_id_is_rejected() {
        let (_dir, store) = store();
        assert!(store
            .append_message("ws1", "../../etc/passwd", &ChatMessage::user("x"))
            .is_err());
        assert!(store.clear_messages("ws1", "g/../x").is_err());
        assert!(store.get_messages("ws1", "/abs", 10).is_empty());
    }

    #[test]
    fn clear_messages_with_traversal_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // The file a `..` workspace id would have resolved to.
        let victim = dir.path().join("_group_messages_victim.json");
        std::fs::write(&victim, "[]").unwrap();
        let store = GroupStore::new(dir.path().join("data"));
        assert!(store.clear_messages("..", "victim").is_err());
        assert!(victim.exists(), "file outside the root must survive");
    }

    #[test]
    fn group_name_with_separators_still_yields_usable_id() {
        let (_dir, store) = store();
        let g = store.create_group("ws1", "a/b team", vec![], "s").unwrap();
        assert_eq!(g.id, "group_a_b_team_1");
        store
            .append_message("ws1", &g.id, &ChatMessage::user("hello"))
            .unwrap();
        assert_eq!(store.get_messages("ws1", &g.id, 10).len(), 1);
    }
}
