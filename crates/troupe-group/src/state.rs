// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-group plan state, persisted between turns so sessions resume.
///
/// Once `plan_initialized` is set, `goal` and `deliverables` are never
/// rewritten.  `process` may be replaced wholesale by the supervisor, at
/// which point `current_step_index` resets to 0; otherwise the index
/// advances by exactly one per completed step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanState {
    #[serde(default)]
    pub plan_initialized: bool,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub deliverables: String,
    #[serde(default)]
    pub process: Vec<String>,
    #[serde(default)]
    pub current_step_index: usize,
}

impl PlanState {
    /// Deserialize from a persisted snapshot, tolerating legacy documents
    /// with mixed-case keys (keys are normalized to lower case on ingest).
    pub fn from_value(v: &Value) -> Self {
        let normalized = normalize_keys(v);
        serde_json::from_value(normalized).unwrap_or_default()
    }

    /// Serialize for persistence in the group document.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Replace the process list (supervisor `update_process` semantics):
    /// the new list stands in for the old one and execution restarts at
    /// its first step.
    pub fn replace_process(&mut self, process: Vec<String>) {
        self.process = process;
        self.current_step_index = 0;
    }
}

fn normalize_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, val)| (k.to_lowercase(), val.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_state_is_uninitialized() {
        let s = PlanState::default();
        assert!(!s.plan_initialized);
        assert_eq!(s.current_step_index, 0);
        assert!(s.process.is_empty());
    }

    #[test]
    fn save_and_reload_is_byte_equivalent() {
        let s = PlanState {
            plan_initialized: true,
            goal: "build X".into(),
            deliverables: "file Y".into(),
            process: vec!["W1 drafts".into(), "W2 reviews".into()],
            current_step_index: 1,
        };
        let first = serde_json::to_string(&s.to_value()).unwrap();
        let reloaded = PlanState::from_value(&s.to_value());
        let second = serde_json::to_string(&reloaded.to_value()).unwrap();
        assert_eq!(first, second);
        assert_eq!(s, reloaded);
    }

    #[test]
    fn mixed_case_keys_are_normalized_on_ingest() {
        let v = json!({
            "Plan_Initialized": true,
            "GOAL": "g",
            "Process": ["a"],
            "Current_Step_Index": 2
        });
        let s = PlanState::from_value(&v);
        assert!(s.plan_initialized);
        assert_eq!(s.goal, "g");
        assert_eq!(s.process, vec!["a"]);
        assert_eq!(s.current_step_index, 2);
    }

    #[test]
    fn malformed_snapshot_degrades_to_default() {
        let s = PlanState::from_value(&json!("not an object"));
        assert_eq!(s, PlanState::default());
    }

    #[test]
    fn replace_process_resets_index() {
        let mut s = PlanState {
            plan_initialized: true,
            current_step_index: 3,
            process: vec!["old".into()],
            ..Default::default()
        };
        s.replace_process(vec!["new 1".into(), "new 2".into()]);
        assert_eq!(s.current_step_index, 0);
        assert_eq!(s.process.len(), 2);
    }
}
