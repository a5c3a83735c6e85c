// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during one group-chat turn.
///
/// Consumers (the streaming HTTP response, the non-streaming collector)
/// receive these through an [`EventSink`] channel.  The serialized form is
/// the wire payload: the `type` tag plus the variant's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// An agent is about to call its model.
    Thinking { agent: String },
    /// The model requested a tool call (args truncated for the wire).
    ToolCall { agent: String, tool: String, args: String },
    /// A tool call finished (result truncated for the wire).
    ToolResult { agent: String, tool: String, result: String },
    /// Final text from an agent (never truncated).
    AgentMessage { agent: String, content: String },
    /// A plan snapshot, emitted exactly once per initialization.
    Plan { data: serde_json::Value },
    /// Terminal: the turn completed.
    Finish { status: ChatStatus },
    /// Terminal: the turn failed.
    Error { content: String },
}

impl ChatEvent {
    /// The wire tag of this event.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::AgentMessage { .. } => "agent_message",
            Self::Plan { .. } => "plan",
            Self::Finish { .. } => "finish",
            Self::Error { .. } => "error",
        }
    }

    /// The wire payload: this event's fields without the `type` tag.
    pub fn payload(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = v.as_object_mut() {
            obj.remove("type");
        }
        v
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }
}

/// Whether the client should issue another turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatStatus {
    #[serde(rename = "CONTINUE")]
    Continue,
    #[serde(rename = "FINISH")]
    Finish,
}

/// The engine raises this when the event consumer has gone away; callers
/// must stop making model calls and must not emit a terminal frame.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("event consumer disconnected; turn cancelled")]
pub struct Cancelled;

/// Producer half of the per-turn event queue.
///
/// Single producer (the engine task), single consumer (the response).
/// `emit` returning `false` is the cancellation signal: the consumer has
/// dropped its receiver.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl EventSink {
    /// Enqueue an event.  Returns `false` when the consumer is gone.
    pub fn emit(&self, event: ChatEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Like [`emit`], but converts a closed channel into [`Cancelled`] so
    /// engine code can propagate it with `?`.
    pub fn try_emit(&self, event: ChatEvent) -> Result<(), Cancelled> {
        if self.emit(event) {
            Ok(())
        } else {
            Err(Cancelled)
        }
    }
}

/// Create the per-turn event queue.
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<ChatEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_wire_protocol() {
        assert_eq!(ChatEvent::Thinking { agent: "a".into() }.tag(), "thinking");
        assert_eq!(
            ChatEvent::Finish { status: ChatStatus::Continue }.tag(),
            "finish"
        );
        assert_eq!(ChatEvent::Error { content: "x".into() }.tag(), "error");
    }

    #[test]
    fn payload_omits_type_tag() {
        let ev = ChatEvent::ToolCall {
            agent: "W1".into(),
            tool: "read_file".into(),
            args: "{}".into(),
        };
        let payload = ev.payload();
        assert!(payload.get("type").is_none());
        assert_eq!(payload["agent"], "W1");
        assert_eq!(payload["tool"], "read_file");
    }

    #[test]
    fn status_serializes_upper_case() {
        let ev = ChatEvent::Finish { status: ChatStatus::Finish };
        assert_eq!(ev.payload()["status"], "FINISH");
        let ev = ChatEvent::Finish { status: ChatStatus::Continue };
        assert_eq!(ev.payload()["status"], "CONTINUE");
    }

    #[test]
    fn terminal_classification() {
        assert!(ChatEvent::Finish { status: ChatStatus::Finish }.is_terminal());
        assert!(ChatEvent::Error { content: "e".into() }.is_terminal());
        assert!(!ChatEvent::Thinking { agent: "a".into() }.is_terminal());
    }

    #[tokio::test]
    async fn emit_delivers_in_fifo_order() {
        let (sink, mut rx) = event_channel();
        assert!(sink.emit(ChatEvent::Thinking { agent: "a".into() }));
        assert!(sink.emit(ChatEvent::AgentMessage { agent: "a".into(), content: "hi".into() }));
        assert_eq!(rx.recv().await.unwrap().tag(), "thinking");
        assert_eq!(rx.recv().await.unwrap().tag(), "agent_message");
    }

    #[tokio::test]
    async fn emit_fails_after_consumer_drops() {
        let (sink, rx) = event_channel();
        drop(rx);
        assert!(!sink.emit(ChatEvent::Thinking { agent: "a".into() }));
        assert!(sink.try_emit(ChatEvent::Thinking { agent: "a".into() }).is_err());
    }
}
