// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP surface: group CRUD, the two chat variants, and workflow
//! generate/execute.
//!
//! The streaming endpoints spawn the engine as a background task and hand
//! the event queue's consumer half to the response body.  The engine task
//! persists appended messages and plan state before emitting its terminal
//! frame, so a client that sees `finish` can immediately issue the next
//! turn against consistent state.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use troupe_core::{event_channel, Cancelled, ChatEvent, ChatMessage, ChatRole, ChatStatus, EventSink};
use troupe_group::{build_workflow_planner_prompt, generate_workflow, GroupChat, WorkflowPlan};
use troupe_store::{GroupStore, GroupUpdate};

use crate::assemble::assemble_group;
use crate::state::AppState;
use crate::stream::{frame_stream, STREAM_READ_TIMEOUT};

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/group/list", get(list_groups))
        .route("/api/group/create", post(create_group))
        .route("/api/group/update", post(update_group))
        .route("/api/group/delete/:group_id", delete(delete_group))
        .route("/api/group/:group_id/messages", get(get_messages))
        .route("/api/group/:group_id/clear", post(clear_messages))
        .route("/api/group/chat", post(group_chat))
        .route("/api/group/chat_sync", post(group_chat_sync))
        .route("/api/group/workflow/generate", post(workflow_generate))
        .route("/api/group/workflow/execute", post(workflow_execute))
        .with_state(state)
}

// ── Error plumbing ────────────────────────────────────────────────────────────

/// Handler-level error: everything maps to a 500 with a JSON detail body.
struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateGroupRequest {
    workspace_id: String,
    name: String,
    #[serde(default)]
    member_agent_ids: Vec<String>,
    supervisor_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateGroupRequest {
    workspace_id: String,
    group_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    members: Option<Vec<String>>,
    #[serde(default)]
    supervisor_id: Option<String>,
    #[serde(default)]
    supervisor_prompt: Option<String>,
    #[serde(default)]
    workflow_supervisor_prompt: Option<String>,
    #[serde(default)]
    chat_state: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GroupChatRequest {
    workspace_id: String,
    group_id: String,
    #[serde(default)]
    message: Option<String>,
    /// Optional client-supplied history.  When non-empty it replaces the
    /// persisted log as this turn's in-memory context (the log itself is
    /// untouched).
    #[serde(default)]
    history: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateWorkflowRequest {
    workspace_id: String,
    group_id: String,
    user_request: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteWorkflowRequest {
    workspace_id: String,
    group_id: String,
    workflow: Value,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceQuery {
    workspace_id: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

// ── Group CRUD ────────────────────────────────────────────────────────────────

async fn list_groups(
    State(state): State<AppState>,
    Query(q): Query<WorkspaceQuery>,
) -> Json<Value> {
    Json(json!(state.store.list_groups(&q.workspace_id)))
}

async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<Json<Value>, AppError> {
    let group = state.store.create_group(
        &req.workspace_id,
        &req.name,
        req.member_agent_ids,
        &req.supervisor_id,
    )?;
    Ok(Json(json!(group)))
}

async fn update_group(
    State(state): State<AppState>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<Response, AppError> {
    let update = GroupUpdate {
        name: req.name,
        members: req.members,
        supervisor_id: req.supervisor_id,
        supervisor_prompt: req.supervisor_prompt,
        workflow_supervisor_prompt: req.workflow_supervisor_prompt,
        chat_state: req.chat_state,
    };
    match state.store.update_group(&req.workspace_id, &req.group_id, update)? {
        Some(group) => Ok(Json(json!(group)).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Group not found"})),
        )
            .into_response()),
    }
}

async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(q): Query<WorkspaceQuery>,
) -> Result<Json<Value>, AppError> {
    state.store.delete_group(&q.workspace_id, &group_id)?;
    Ok(Json(json!({"status": "success"})))
}

async fn get_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(q): Query<WorkspaceQuery>,
) -> Json<Value> {
    let messages = state.store.get_messages(&q.workspace_id, &group_id, q.limit);
    Json(json!({ "messages": messages }))
}

async fn clear_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(q): Query<WorkspaceQuery>,
) -> Result<Json<Value>, AppError> {
    state.store.clear_messages(&q.workspace_id, &group_id)?;
    // Clearing the log resets resumption: the plan state goes with it.
    state.store.update_group(
        &q.workspace_id,
        &group_id,
        GroupUpdate { chat_state: Some(Value::Null), ..Default::default() },
    )?;
    Ok(Json(json!({"status": "success"})))
}

// ── Chat ──────────────────────────────────────────────────────────────────────

/// Streaming chat: one turn of the iterative engine, events as SSE frames.
async fn group_chat(
    State(state): State<AppState>,
    Json(req): Json<GroupChatRequest>,
) -> Result<Response, AppError> {
    let mut chat = assemble_group(&state, &req.workspace_id, &req.group_id)?;
    persist_user_message(&state.store, &req, &mut chat)?;

    let (sink, rx) = event_channel();
    let store = Arc::clone(&state.store);
    tokio::spawn(async move {
        let base = chat.history.len();
        let outcome = chat.run(&sink).await;
        finish_turn(&store, &req.workspace_id, &req.group_id, &chat, base, &sink, outcome.map(Some));
    });

    Ok(sse_response(rx))
}

/// Non-streaming chat: one engine turn, reply as a single JSON document
/// containing only this turn's appended messages.
async fn group_chat_sync(
    State(state): State<AppState>,
    Json(req): Json<GroupChatRequest>,
) -> Result<Json<Value>, AppError> {
    let mut chat = assemble_group(&state, &req.workspace_id, &req.group_id)?;
    persist_user_message(&state.store, &req, &mut chat)?;

    // The receiver stays alive (and is simply dropped at the end) so the
    // engine never observes a disconnect.
    let (sink, _rx) = event_channel();
    let base = chat.history.len();
    let outcome = chat.run(&sink).await;

    let new_messages = chat.history[base..].to_vec();
    state
        .store
        .append_messages(&req.workspace_id, &req.group_id, &new_messages)?;
    state.store.update_group(
        &req.workspace_id,
        &req.group_id,
        GroupUpdate { chat_state: Some(chat.state.to_value()), ..Default::default() },
    )?;

    let (status, response) = match outcome {
        Ok(ChatStatus::Continue) => ("CONTINUE", last_assistant_text(&new_messages)),
        Ok(ChatStatus::Finish) => ("FINISH", last_assistant_text(&new_messages)),
        Err(e) => ("FINISH", format!("Error: {e}")),
    };
    Ok(Json(json!({
        "response": response,
        "messages": new_messages,
        "status": status,
        "current_plan": chat.state.to_value(),
    })))
}

// ── Workflow ──────────────────────────────────────────────────────────────────

/// Phase 1: ask the planner for a complete workflow document.
async fn workflow_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateWorkflowRequest>,
) -> Result<Json<Value>, AppError> {
    let chat = assemble_group(&state, &req.workspace_id, &req.group_id)?;
    let group = state
        .store
        .get_group(&req.workspace_id, &req.group_id)
        .ok_or_else(|| anyhow::anyhow!("group not found: {}", req.group_id))?;

    let system_prompt = if group.workflow_supervisor_prompt.is_empty() {
        build_workflow_planner_prompt(&chat.roster_text())
    } else {
        group.workflow_supervisor_prompt
    };
    let plan = generate_workflow(
        chat.supervisor().provider.as_ref(),
        &system_prompt,
        &req.user_request,
    )
    .await?;
    Ok(Json(json!(plan)))
}

/// Phase 2: execute a workflow document, streaming events.
async fn workflow_execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteWorkflowRequest>,
) -> Result<Response, AppError> {
    let mut chat = assemble_group(&state, &req.workspace_id, &req.group_id)?;
    let plan: WorkflowPlan = serde_json::from_value(req.workflow)?;

    if let Some(message) = req.message.as_deref().filter(|m| !m.trim().is_empty()) {
        let msg = ChatMessage::user(message);
        state
            .store
            .append_message(&req.workspace_id, &req.group_id, &msg)?;
        chat.history.push(msg);
    }
    let user_input = req
        .message
        .clone()
        .or_else(|| {
            chat.history
                .iter()
                .rev()
                .find(|m| m.role == ChatRole::User)
                .map(|m| m.content.clone())
        })
        .unwrap_or_default();

    let (sink, rx) = event_channel();
    let store = Arc::clone(&state.store);
    tokio::spawn(async move {
        let base = chat.history.len();
        let outcome = chat.execute_workflow(&plan, &user_input, &sink).await;
        finish_turn(
            &store,
            &req.workspace_id,
            &req.group_id,
            &chat,
            base,
            &sink,
            // A completed workflow is always a finished session.
            outcome.map(|_| None),
        );
    });

    Ok(sse_response(rx))
}

// ── Turn plumbing ─────────────────────────────────────────────────────────────

fn persist_user_message(
    store: &GroupStore,
    req: &GroupChatRequest,
    chat: &mut GroupChat,
) -> anyhow::Result<()> {
    if !req.history.is_empty() {
        chat.history = req.history.iter().map(lenient_message).collect();
    }
    if let Some(message) = req.message.as_deref().filter(|m| !m.trim().is_empty()) {
        let msg = ChatMessage::user(message);
        store.append_message(&req.workspace_id, &req.group_id, &msg)?;
        chat.history.push(msg);
    }
    Ok(())
}

/// Convert a client-supplied history entry into a [`ChatMessage`].  Client
/// payloads are partial (no timestamps, sometimes no role); anything
/// unrecognized degrades to a user message with its text content.
fn lenient_message(v: &Value) -> ChatMessage {
    if let Ok(msg) = serde_json::from_value::<ChatMessage>(v.clone()) {
        return msg;
    }
    let content = v
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let name = v
        .get("name")
        .or_else(|| v.get("agent_name"))
        .and_then(Value::as_str);
    match (v.get("role").and_then(Value::as_str), name) {
        (Some("assistant") | Some("agent"), Some(name)) => ChatMessage::agent(name, content),
        (Some("assistant") | Some("agent"), None) => ChatMessage::agent("assistant", content),
        (Some("system"), _) => ChatMessage::system(content),
        _ => ChatMessage::user(content),
    }
}

/// Persist a turn's appended messages and plan state, then emit the single
/// terminal frame.  Cancellation emits nothing (the channel is gone); any
/// other failure becomes the terminal `error` frame.
fn finish_turn(
    store: &GroupStore,
    workspace_id: &str,
    group_id: &str,
    chat: &GroupChat,
    base: usize,
    sink: &EventSink,
    outcome: anyhow::Result<Option<ChatStatus>>,
) {
    if let Err(e) = store.append_messages(workspace_id, group_id, &chat.history[base..]) {
        warn!(group_id, "failed to persist turn messages: {e}");
    }
    if let Err(e) = store.update_group(
        workspace_id,
        group_id,
        GroupUpdate { chat_state: Some(chat.state.to_value()), ..Default::default() },
    ) {
        warn!(group_id, "failed to persist plan state: {e}");
    }

    match outcome {
        Ok(status) => {
            sink.emit(ChatEvent::Finish { status: status.unwrap_or(ChatStatus::Finish) });
        }
        Err(e) if e.downcast_ref::<Cancelled>().is_some() => {
            debug!(group_id, "turn cancelled by client disconnect");
        }
        Err(e) => {
            sink.emit(ChatEvent::Error { content: e.to_string() });
        }
    }
}

fn last_assistant_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

fn sse_response(rx: UnboundedReceiver<ChatEvent>) -> Response {
    let stream = frame_stream(rx, STREAM_READ_TIMEOUT).map(Ok::<_, Infallible>);
    match Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
    {
        Ok(resp) => resp,
        Err(e) => {
            warn!("failed to build stream response: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
