// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The workflow execution engine.
//!
//! Two phases: a single supervisor call generates a complete plan document
//! up-front, then the executor walks the steps sequentially, running each
//! step's executor agent and, when configured, a reviewer with a bounded
//! revision loop.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use troupe_core::{Cancelled, ChatMessage, EventSink, WorkerAgent};
use troupe_model::{ChatReply, ChatRequest, Message, ModelProvider};

use crate::extract::extract_json;

/// Revision rounds are clamped to this ceiling on ingest; a plan that asks
/// for more is accepted with the value clamped, not rejected.
pub const MAX_REVISION_ROUNDS_CEILING: u32 = 3;

/// System prompt for the workflow planner.  `{agent_roster}` is filled
/// with the team roster.  The wording is load-bearing — models condition
/// on it.
const WORKFLOW_PLANNER_PROMPT: &str = r#"# Identity
You are the Workflow Planner (Project Manager) of this Group Chat.
Your job is to OUTPUT A COMPLETE EXECUTION PLAN, not execute it step by step.

# Team Roster
{agent_roster}

# Instructions
Analyze the user's request and design a COMPLETE WORKFLOW that accomplishes the goal.

## Workflow Design Rules

1. Break down the task into logical steps.
2. For each step, specify:
   - `executor_agent`: WHICH agent executes (must be from the Team Roster above)
   - `executor_prompt`: SPECIFIC instruction for the executor (use placeholders)
   - `reviewer_agent`: WHICH agent reviews (null if no review is needed)
   - `reviewer_prompt`: SPECIFIC instruction for the reviewer (null if no review)
   - `max_revision_rounds`: Maximum revision attempts (0-3)
3. Use placeholders in prompts:
   - `{user_input}`: the original user request
   - `{step_N_result}`: the result of step N (e.g. {step_1_result})
   - `{step_result}`: the current step's execution result (reviewer prompts only)
4. Reviewer output format: the reviewer MUST output exactly "APPROVED" if
   satisfied, or "REJECTED: <reason>" if revision is needed. The system
   handles revision loops automatically.
5. Later steps can reference earlier steps using {step_N_result}.

## Output Format

You MUST output ONLY valid JSON in this exact format:

{
  "plan_name": "Brief workflow name",
  "description": "One-sentence description of what this workflow achieves",
  "workflow": [
    {
      "step": 1,
      "step_name": "Descriptive step name",
      "executor_agent": "Agent name from roster",
      "executor_prompt": "Detailed instruction with placeholders",
      "reviewer_agent": "Agent name or null",
      "reviewer_prompt": "Review instruction with {step_result} or null",
      "max_revision_rounds": 2
    }
  ]
}

## Important Notes

- Return ONLY the JSON, no markdown code blocks, no explanations
- All agent names MUST exactly match names in the Team Roster
- Use null (not the string "null") for nullable fields
- max_revision_rounds must be 0-3 (3 is the maximum, to prevent infinite loops)
- Step numbers are sequential starting from 1

Now, based on the user's request below, generate the workflow plan:"#;

/// Build the planner system prompt for the given roster.
pub fn build_workflow_planner_prompt(agent_roster: &str) -> String {
    WORKFLOW_PLANNER_PROMPT.replace("{agent_roster}", agent_roster)
}

// ─── Plan document ────────────────────────────────────────────────────────────

/// A complete pre-generated workflow plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    #[serde(default)]
    pub plan_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub workflow: Vec<WorkflowStep>,
}

impl WorkflowPlan {
    /// The plan used when the supervisor fails to produce valid JSON.
    pub fn fallback() -> Self {
        Self {
            plan_name: "Fallback Plan".into(),
            description: "Supervisor failed to generate a valid workflow".into(),
            workflow: Vec::new(),
        }
    }
}

/// One step of a workflow plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(default)]
    pub step: u32,
    #[serde(default)]
    pub step_name: String,
    pub executor_agent: String,
    pub executor_prompt: String,
    #[serde(default)]
    pub reviewer_agent: Option<String>,
    #[serde(default)]
    pub reviewer_prompt: Option<String>,
    #[serde(default, deserialize_with = "clamp_rounds")]
    pub max_revision_rounds: u32,
}

/// Out-of-range revision counts are clamped on ingest, not rejected.
fn clamp_rounds<'de, D>(d: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = i64::deserialize(d)?;
    Ok(v.clamp(0, MAX_REVISION_ROUNDS_CEILING as i64) as u32)
}

// ─── Phase 1: plan generation ─────────────────────────────────────────────────

/// Ask the planner for a complete workflow document.
///
/// A provider failure is a hard error; an unparseable reply degrades to
/// [`WorkflowPlan::fallback`] with a warning, so the caller can surface an
/// empty plan instead of crashing the session.
pub async fn generate_workflow(
    provider: &dyn ModelProvider,
    system_prompt: &str,
    user_request: &str,
) -> anyhow::Result<WorkflowPlan> {
    info!("generating workflow plan");
    let reply = provider
        .invoke(ChatRequest::text_only(vec![
            Message::system(system_prompt),
            Message::user(user_request),
        ]))
        .await?;

    let text = match reply {
        ChatReply::Text(t) => t,
        ChatReply::ToolCalls(_) => {
            warn!("planner returned tool calls; using fallback plan");
            return Ok(WorkflowPlan::fallback());
        }
    };

    let plan = extract_json(&text)
        .and_then(|v| serde_json::from_value::<WorkflowPlan>(v).map_err(Into::into));
    match plan {
        Ok(plan) => {
            info!(
                plan_name = %plan.plan_name,
                steps = plan.workflow.len(),
                "workflow generated"
            );
            Ok(plan)
        }
        Err(e) => {
            warn!("failed to parse workflow JSON: {e}");
            Ok(WorkflowPlan::fallback())
        }
    }
}

// ─── Phase 2: execution ───────────────────────────────────────────────────────

/// Sequential step walker with executor/reviewer revision loops.
pub struct WorkflowExecutor<'a> {
    plan: &'a WorkflowPlan,
    workers: &'a [WorkerAgent],
}

impl<'a> WorkflowExecutor<'a> {
    pub fn new(plan: &'a WorkflowPlan, workers: &'a [WorkerAgent]) -> Self {
        Self { plan, workers }
    }

    /// Walk the plan.  Accepted step results are appended to `history`
    /// (and indexed as `step_N_result` for later steps); the returned map
    /// holds every accepted result keyed by step number.
    ///
    /// A hard executor failure terminates the workflow; a reviewer failure
    /// is treated as approval with a warning.
    pub async fn execute(
        &self,
        user_input: &str,
        history: &mut Vec<ChatMessage>,
        sink: &EventSink,
    ) -> anyhow::Result<HashMap<u32, String>> {
        let mut results: HashMap<u32, String> = HashMap::new();

        for step in &self.plan.workflow {
            debug!(step = step.step, name = %step.step_name, "executing workflow step");

            let Some(executor) = self.find(&step.executor_agent) else {
                let msg = format!(
                    "Workflow step {} references unknown executor agent {:?}",
                    step.step, step.executor_agent
                );
                history.push(ChatMessage::system(msg.clone()));
                anyhow::bail!(msg);
            };

            let prompt = substitute(&step.executor_prompt, user_input, &results, None);
            let mut result = dispatch(executor, &prompt, history, sink).await?;

            if let Some(reviewer_name) = &step.reviewer_agent {
                result = self
                    .review_loop(step, reviewer_name, &prompt, result, user_input, &results, history, sink)
                    .await?;
            }

            results.insert(step.step, result.clone());
            history.push(ChatMessage::agent(executor.name(), result));
        }

        Ok(results)
    }

    /// Run the reviewer over `result`, re-invoking the executor with the
    /// critique appended until approval or the revision cap.
    #[allow(clippy::too_many_arguments)]
    async fn review_loop(
        &self,
        step: &WorkflowStep,
        reviewer_name: &str,
        prompt: &str,
        mut result: String,
        user_input: &str,
        results: &HashMap<u32, String>,
        history: &mut Vec<ChatMessage>,
        sink: &EventSink,
    ) -> anyhow::Result<String> {
        let Some(reviewer) = self.find(reviewer_name) else {
            warn!(step = step.step, reviewer = %reviewer_name, "unknown reviewer; accepting result");
            return Ok(result);
        };
        let Some(executor) = self.find(&step.executor_agent) else {
            return Ok(result);
        };

        let mut revisions = 0u32;
        loop {
            let review_prompt = substitute(
                step.reviewer_prompt.as_deref().unwrap_or_default(),
                user_input,
                results,
                Some(&result),
            );
            let verdict = match reviewer.invoke(&review_prompt, history, sink).await {
                Ok(v) => v,
                Err(e) => {
                    if e.downcast_ref::<Cancelled>().is_some() {
                        return Err(e);
                    }
                    // Reviewers are best-effort: a broken reviewer must not
                    // sink an otherwise completed step.
                    warn!(step = step.step, "reviewer failed; treating as approval: {e}");
                    return Ok(result);
                }
            };

            let verdict = verdict.trim();
            if verdict.starts_with("APPROVED") {
                debug!(step = step.step, revisions, "step approved");
                return Ok(result);
            }
            if verdict.starts_with("REJECTED") {
                let reason = verdict
                    .strip_prefix("REJECTED")
                    .map(|r| r.trim_start_matches(':').trim())
                    .unwrap_or_default();
                if revisions < step.max_revision_rounds {
                    revisions += 1;
                    debug!(step = step.step, revisions, "revision requested");
                    let augmented = format!(
                        "{prompt}\n\nYour previous draft:\n{result}\n\n\
                         Reviewer feedback: {reason}\n\n\
                         Revise the draft to address the feedback."
                    );
                    result = dispatch(executor, &augmented, history, sink).await?;
                    continue;
                }
                warn!(step = step.step, "revision rounds exhausted; accepting latest draft");
                return Ok(result);
            }

            debug!(step = step.step, "unclassified reviewer verdict; treating as approval");
            return Ok(result);
        }
    }

    fn find(&self, name: &str) -> Option<&WorkerAgent> {
        self.workers.iter().find(|w| w.name() == name)
    }
}

/// Invoke a worker, recording a hard failure in the conversation before
/// propagating it (cancellation passes through silently).
async fn dispatch(
    worker: &WorkerAgent,
    prompt: &str,
    history: &mut Vec<ChatMessage>,
    sink: &EventSink,
) -> anyhow::Result<String> {
    match worker.invoke(prompt, history, sink).await {
        Ok(r) => Ok(r),
        Err(e) => {
            if e.downcast_ref::<Cancelled>().is_none() {
                history.push(ChatMessage::system(format!(
                    "Agent {} failed: {e}",
                    worker.name()
                )));
            }
            Err(e)
        }
    }
}

/// Substitute `{user_input}`, `{step_result}`, and `{step_N_result}`
/// placeholders.  Missing step references substitute empty strings; a
/// placeholder never fails the run.
fn substitute(
    template: &str,
    user_input: &str,
    results: &HashMap<u32, String>,
    step_result: Option<&str>,
) -> String {
    let out = template
        .replace("{user_input}", user_input)
        .replace("{step_result}", step_result.unwrap_or_default());

    let re = regex::Regex::new(r"\{step_(\d+)_result\}").expect("static pattern");
    re.replace_all(&out, |caps: &regex::Captures<'_>| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(|n| results.get(&n).cloned())
            .unwrap_or_default()
    })
    .into_owned()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
