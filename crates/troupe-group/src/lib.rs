// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod chat;
mod extract;
mod state;
mod supervisor;
mod workflow;

pub use chat::{GroupChat, Supervisor, DEFAULT_MAX_TURNS};
pub use extract::extract_json;
pub use state::PlanState;
pub use supervisor::{
    build_supervisor_prompt, roster_line, PlanDraft, SupervisorDecision,
    SUPERVISOR_EXECUTION_PROTOCOL, SUPERVISOR_INIT_PROTOCOL,
};
pub use workflow::{
    build_workflow_planner_prompt, generate_workflow, WorkflowExecutor, WorkflowPlan,
    WorkflowStep, MAX_REVISION_ROUNDS_CEILING,
};
