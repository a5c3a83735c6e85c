// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The supervisor protocol: the prompts the orchestrating agent conditions
//! on, and the parsed shapes of its replies.
//!
//! The protocol wording is load-bearing — it is what the language model
//! sees.  Change it only together with the models you validate against.

use serde_json::Value;

use crate::state::PlanState;

/// Phase 1: plan initialization protocol.
pub const SUPERVISOR_INIT_PROTOCOL: &str = r#"# TASK: PLAN INITIALIZATION
Analyze the user request. Break it down into a clear Goal, Deliverables, and Execution Process.

OUTPUT FORMAT (JSON ONLY):
{
    "goal": "The overall objective of this discussion",
    "deliverables": "The concrete outputs expected (e.g., Code, PRD, Diagram)",
    "process": ["Step 1: Agent X does...", "Step 2: Agent Y does..."],
    "explanation": "Brief rationale for this plan"
}"#;

/// Phase 2: execution protocol.  The `{goal}`, `{deliverables}`,
/// `{process}`, and `{current_step_index}` tokens are substituted with the
/// current plan state before the prompt is sent.
pub const SUPERVISOR_EXECUTION_PROTOCOL: &str = r#"# TASK: EXECUTION
Current Plan Status:
- Goal: {goal} (READ ONLY)
- Deliverables: {deliverables} (READ ONLY)
- Process: {process}
- Current Step Index: {current_step_index}

Select the next agent to execute the current step. You may update the process steps if needed, but DO NOT modify the Goal.

OUTPUT FORMAT (JSON ONLY):
{
    "next_agent": "<agent_name>",
    "instruction": "<specific task for the agent>",
    "update_process": ["Remaining Step 1", "Remaining Step 2"] (Optional, use only if process needs change),
    "status": "CONTINUE" | "FINISH"
}"#;

/// One roster line: the member's name plus its description (the system
/// prompt doubles as the description shown to peers).
pub fn roster_line(name: &str, description: &str) -> String {
    format!("- Name: {name}, Role: {description}")
}

/// Assemble the composable supervisor prompt:
/// user-defined prompt + team roster + protocol block.
pub fn build_supervisor_prompt(user_prompt: &str, roster: &str, protocol: &str) -> String {
    format!("{user_prompt}\n\n# Team Roster\n{roster}\n\n{protocol}")
}

/// Fill the execution protocol with the current plan state.  The step
/// index is shown 1-based, matching how the process list is numbered.
pub fn execution_protocol(state: &PlanState) -> String {
    let process = serde_json::to_string(&state.process).unwrap_or_else(|_| "[]".into());
    SUPERVISOR_EXECUTION_PROTOCOL
        .replace("{goal}", &state.goal)
        .replace("{deliverables}", &state.deliverables)
        .replace("{process}", &process)
        .replace("{current_step_index}", &(state.current_step_index + 1).to_string())
}

/// The parsed phase-1 reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanDraft {
    pub goal: String,
    pub deliverables: String,
    pub process: Vec<String>,
    pub explanation: String,
    /// Rare: a supervisor that decides there is nothing to plan may close
    /// the session straight from initialization.
    pub finish: bool,
}

impl PlanDraft {
    /// Parse an extracted JSON object, normalizing keys to lower case.
    pub fn from_value(v: &Value) -> Self {
        let v = lowercase_keys(v);
        Self {
            goal: str_field(&v, "goal"),
            deliverables: str_field(&v, "deliverables"),
            process: string_list(&v, "process"),
            explanation: str_field(&v, "explanation"),
            finish: str_field(&v, "status") == "FINISH",
        }
    }
}

/// The parsed phase-2 reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupervisorDecision {
    pub next_agent: String,
    pub instruction: String,
    /// Non-empty = the process list is replaced wholesale.
    pub update_process: Vec<String>,
    pub finish: bool,
}

impl SupervisorDecision {
    /// Parse an extracted JSON object, normalizing keys to lower case.
    pub fn from_value(v: &Value) -> Self {
        let v = lowercase_keys(v);
        Self {
            next_agent: str_field(&v, "next_agent"),
            instruction: str_field(&v, "instruction"),
            update_process: string_list(&v, "update_process"),
            finish: str_field(&v, "status") == "FINISH",
        }
    }

    /// Whether the instruction is usable as a closing message.
    pub fn meaningful_instruction(&self) -> Option<&str> {
        let t = self.instruction.trim();
        (!t.is_empty() && t != "None").then_some(t)
    }
}

pub(crate) fn lowercase_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, val)| (k.to_lowercase(), val.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_list(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
