// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The iterative execution engine.
//!
//! One call to [`GroupChat::step`] performs exactly one of: plan
//! initialization, or one supervisor decision with at most one worker
//! dispatch.  [`GroupChat::run`] drives `step` under a turn ceiling for
//! the server-side loop; the client keeps issuing turns until it sees
//! `FINISH`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use troupe_core::{Cancelled, ChatEvent, ChatMessage, ChatStatus, EventSink, WorkerAgent};
use troupe_model::{ChatReply, ChatRequest, Message, ModelProvider};

use crate::extract::extract_json;
use crate::state::PlanState;
use crate::supervisor::{
    build_supervisor_prompt, execution_protocol, lowercase_keys, roster_line, PlanDraft,
    SupervisorDecision, SUPERVISOR_INIT_PROTOCOL,
};

/// Turn ceiling within one server-side call.  Bounds runaway sessions even
/// when the client keeps answering `CONTINUE` with itself.
pub const DEFAULT_MAX_TURNS: usize = 5;

const DEFAULT_CLOSING: &str =
    "The discussion goal has been achieved. Is there anything else I can help with?";

/// The orchestrating agent: its display name, its user-defined prompt
/// (personality), and a resolved model driver.  The supervisor plans and
/// selects; it never executes worker steps.
pub struct Supervisor {
    pub name: String,
    pub prompt: String,
    pub provider: Arc<dyn ModelProvider>,
}

/// One group session: supervisor, workers, conversation log, plan state.
pub struct GroupChat {
    supervisor: Supervisor,
    workers: Vec<WorkerAgent>,
    pub history: Vec<ChatMessage>,
    pub state: PlanState,
    max_turns: usize,
}

impl GroupChat {
    pub fn new(supervisor: Supervisor, workers: Vec<WorkerAgent>) -> Self {
        Self {
            supervisor,
            workers,
            history: Vec::new(),
            state: PlanState::default(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_state(mut self, state: PlanState) -> Self {
        self.state = state;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn supervisor_name(&self) -> &str {
        &self.supervisor.name
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    /// The assembled worker set, for engines that drive workers directly
    /// (the workflow executor).
    pub fn workers(&self) -> &[WorkerAgent] {
        &self.workers
    }

    /// The team roster presented to planning prompts.
    pub fn roster_text(&self) -> String {
        self.roster()
    }

    /// Append the inbound user message for this turn.
    pub fn push_user_message(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    /// Drive [`step`] until the supervisor finishes or the turn ceiling is
    /// reached.  Returns the status the client should see.
    pub async fn run(&mut self, sink: &EventSink) -> anyhow::Result<ChatStatus> {
        for _ in 0..self.max_turns {
            if !self.step(sink).await? {
                return Ok(ChatStatus::Finish);
            }
        }
        warn!(max_turns = self.max_turns, "turn ceiling reached; yielding to client");
        Ok(ChatStatus::Continue)
    }

    /// Execute one cycle.  Branches on phase: initialization while no plan
    /// exists, execution afterwards.  Returns whether another step should
    /// follow.
    pub async fn step(&mut self, sink: &EventSink) -> anyhow::Result<bool> {
        if !self.state.plan_initialized {
            self.phase1_initialize_plan(sink).await
        } else {
            self.phase2_execute_step(sink).await
        }
    }

    /// Run a pre-generated workflow plan against this group's workers,
    /// appending accepted step results to the conversation.
    pub async fn execute_workflow(
        &mut self,
        plan: &crate::workflow::WorkflowPlan,
        user_input: &str,
        sink: &EventSink,
    ) -> anyhow::Result<std::collections::HashMap<u32, String>> {
        let executor = crate::workflow::WorkflowExecutor::new(plan, &self.workers);
        executor.execute(user_input, &mut self.history, sink).await
    }

    // ── Phase 1: plan initialization ─────────────────────────────────────

    async fn phase1_initialize_plan(&mut self, sink: &EventSink) -> anyhow::Result<bool> {
        debug!("phase 1: initializing plan");
        let system_prompt = build_supervisor_prompt(
            &self.supervisor.prompt,
            &self.roster(),
            SUPERVISOR_INIT_PROTOCOL,
        );
        let request = self
            .history
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "Start Planning".to_string());

        let text = self
            .query_supervisor(
                sink,
                system_prompt,
                format!("Current User Request: {request}"),
                "Failed to generate plan",
            )
            .await?;

        let plan_value = match extract_json(&text) {
            Ok(v) => lowercase_keys(&v),
            Err(e) => {
                self.history.push(ChatMessage::system(format!(
                    "Critical Error: Failed to generate plan. {e}"
                )));
                return Err(e);
            }
        };
        let draft = PlanDraft::from_value(&plan_value);

        // A supervisor may conclude there is nothing to plan and close the
        // session straight from initialization.
        if draft.finish {
            let closing = if draft.explanation.is_empty() {
                DEFAULT_CLOSING.to_string()
            } else {
                draft.explanation
            };
            self.history
                .push(ChatMessage::agent(&self.supervisor.name, closing));
            return Ok(false);
        }

        self.state.goal = draft.goal;
        self.state.deliverables = draft.deliverables;
        self.state.process = draft.process;
        self.state.plan_initialized = true;
        self.state.current_step_index = 0;

        if self.state.goal.is_empty() {
            warn!("generated plan has an empty goal; continuing best-effort");
        }

        let plan_md = render_plan_markdown(&self.state);
        self.history.push(ChatMessage::plan(
            &self.supervisor.name,
            plan_md,
            plan_value.clone(),
        ));
        sink.try_emit(ChatEvent::Plan { data: plan_value })?;

        info!(goal = %self.state.goal, "plan generated");
        Ok(true)
    }

    // ── Phase 2: execution ───────────────────────────────────────────────

    async fn phase2_execute_step(&mut self, sink: &EventSink) -> anyhow::Result<bool> {
        debug!(step = self.state.current_step_index, "phase 2: executing step");
        let system_prompt = build_supervisor_prompt(
            &self.supervisor.prompt,
            &self.roster(),
            &execution_protocol(&self.state),
        );
        let conversation = render_transcript(&self.history);
        let user = format!(
            "Current Conversation History:\n{conversation}\n\nMake your decision based on the Plan."
        );

        let text = self
            .query_supervisor(sink, system_prompt, user, "Supervisor decision failed")
            .await?;

        let decision = match extract_json(&text) {
            Ok(v) => SupervisorDecision::from_value(&v),
            Err(e) => {
                self.history.push(ChatMessage::system(format!(
                    "Critical Error: Supervisor decision failed. {e}"
                )));
                return Err(e);
            }
        };

        self.execute_decision(decision, sink).await
    }

    async fn execute_decision(
        &mut self,
        decision: SupervisorDecision,
        sink: &EventSink,
    ) -> anyhow::Result<bool> {
        if decision.finish {
            let closing = decision
                .meaningful_instruction()
                .unwrap_or(DEFAULT_CLOSING)
                .to_string();
            info!("supervisor finished the session");
            self.history
                .push(ChatMessage::agent(&self.supervisor.name, closing));
            return Ok(false);
        }

        // A non-empty update replaces the whole process list and restarts
        // execution at its first step.
        if !decision.update_process.is_empty() {
            info!(steps = decision.update_process.len(), "supervisor replaced the process");
            self.state.replace_process(decision.update_process.clone());
        }

        // The assignment is announced before validation so the log shows
        // the supervisor's intent even when no worker runs.
        self.history.push(ChatMessage::agent(
            &self.supervisor.name,
            format!("@{}, {}", decision.next_agent, decision.instruction),
        ));

        if decision.next_agent == self.supervisor.name {
            warn!("supervisor selected itself as worker; skipping dispatch");
            return Ok(true);
        }
        let Some(idx) = self
            .workers
            .iter()
            .position(|w| w.name() == decision.next_agent)
        else {
            warn!(agent = %decision.next_agent, "supervisor selected unknown agent");
            return Ok(true);
        };

        let worker_name = self.workers[idx].name().to_string();
        let reply = {
            let worker = &self.workers[idx];
            worker.invoke(&decision.instruction, &self.history, sink).await
        };
        let reply = match reply {
            Ok(r) => r,
            Err(e) => {
                if e.downcast_ref::<Cancelled>().is_some() {
                    return Err(e);
                }
                self.history.push(ChatMessage::system(format!(
                    "Agent {worker_name} failed: {e}"
                )));
                return Err(e);
            }
        };

        self.history.push(ChatMessage::agent(&worker_name, reply));
        self.state.current_step_index += 1;
        Ok(true)
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    /// One supervisor model call: emit `thinking`, send a tool-free
    /// request, and expect a text reply.  Failures are logged to the
    /// conversation as critical-error system messages.
    async fn query_supervisor(
        &mut self,
        sink: &EventSink,
        system_prompt: String,
        user_content: String,
        failure_label: &str,
    ) -> anyhow::Result<String> {
        sink.try_emit(ChatEvent::Thinking {
            agent: self.supervisor.name.clone(),
        })?;

        let reply = self
            .supervisor
            .provider
            .invoke(ChatRequest::text_only(vec![
                Message::system(system_prompt),
                Message::user(user_content),
            ]))
            .await;

        match reply {
            Ok(ChatReply::Text(text)) => Ok(text),
            Ok(ChatReply::ToolCalls(_)) => {
                let e = anyhow::anyhow!("supervisor returned tool calls instead of JSON");
                self.history.push(ChatMessage::system(format!(
                    "Critical Error: {failure_label}. {e}"
                )));
                Err(e)
            }
            Err(e) => {
                self.history.push(ChatMessage::system(format!(
                    "Critical Error: {failure_label}. {e}"
                )));
                Err(e.into())
            }
        }
    }

    fn roster(&self) -> String {
        self.workers
            .iter()
            .map(|w| roster_line(w.name(), w.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Render the plan announcement shown in the conversation.
fn render_plan_markdown(state: &PlanState) -> String {
    let mut md = format!(
        "# Project Plan\n**Goal**: {}\n**Deliverables**: {}\n\n**Process**:\n",
        state.goal, state.deliverables
    );
    for (i, step) in state.process.iter().enumerate() {
        md.push_str(&format!("{}. {}\n", i + 1, step));
    }
    md
}

/// Render the full conversation for the supervisor's decision context.
fn render_transcript(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("\n[{}]: {}", m.speaker(), m.content))
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_markdown_numbers_steps() {
        let state = PlanState {
            goal: "G".into(),
            deliverables: "D".into(),
            process: vec!["draft".into(), "review".into()],
            ..Default::default()
        };
        let md = render_plan_markdown(&state);
        assert!(md.contains("**Goal**: G"));
        assert!(md.contains("1. draft"));
        assert!(md.contains("2. review"));
    }

    #[test]
    fn transcript_uses_speaker_labels() {
        let history = vec![
            ChatMessage::user("hello"),
            ChatMessage::agent("W1", "draft done"),
        ];
        let t = render_transcript(&history);
        assert!(t.contains("[user]: hello"));
        assert!(t.contains("[W1]: draft done"));
    }
}
