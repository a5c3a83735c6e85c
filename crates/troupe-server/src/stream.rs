// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Event-stream fan-out.
//!
//! The engine task produces [`ChatEvent`]s into an unbounded queue; this
//! module turns the receiving half into the streaming response body.  The
//! queue is the only synchronization point between the two tasks.

use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use troupe_core::{ChatEvent, ChatStatus};

/// Per-frame read timeout.  A producer that stays silent this long is
/// assumed wedged; the consumer emits a terminal `error` frame and closes.
pub const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Encode one event as a text frame: `event: <tag>` + `data: <json>`.
pub fn encode_frame(event: &ChatEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.tag(), event.payload())
}

/// Turn the consumer half of the event queue into a frame stream.
///
/// The stream ends after the first terminal frame.  A closed channel with
/// no terminal seen yields a final `finish` frame (the producer task ended
/// without one); a read timeout yields a terminal `error` frame.
pub fn frame_stream(
    mut rx: UnboundedReceiver<ChatEvent>,
    read_timeout: Duration,
) -> impl Stream<Item = String> {
    async_stream::stream! {
        let mut saw_terminal = false;
        loop {
            match tokio::time::timeout(read_timeout, rx.recv()).await {
                Ok(Some(event)) => {
                    let terminal = event.is_terminal();
                    yield encode_frame(&event);
                    if terminal {
                        saw_terminal = true;
                        break;
                    }
                }
                // Producer finished (or died) without a terminal frame.
                Ok(None) => break,
                Err(_) => {
                    warn!("stream read timed out waiting for the engine");
                    yield encode_frame(&ChatEvent::Error {
                        content: "stream timeout: no event within the read window".into(),
                    });
                    saw_terminal = true;
                    break;
                }
            }
        }
        if !saw_terminal {
            yield encode_frame(&ChatEvent::Finish { status: ChatStatus::Finish });
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use troupe_core::event_channel;

    async fn collect(stream: impl Stream<Item = String>) -> Vec<String> {
        stream.collect().await
    }

    #[test]
    fn frame_format_matches_wire_protocol() {
        let frame = encode_frame(&ChatEvent::Thinking { agent: "W1".into() });
        assert_eq!(frame, "event: thinking\ndata: {\"agent\":\"W1\"}\n\n");
    }

    #[tokio::test]
    async fn frames_stream_in_order_and_stop_at_finish() {
        let (sink, rx) = event_channel();
        sink.emit(ChatEvent::Thinking { agent: "a".into() });
        sink.emit(ChatEvent::AgentMessage { agent: "a".into(), content: "hi".into() });
        sink.emit(ChatEvent::Finish { status: ChatStatus::Continue });
        // Events after the terminal frame are never delivered.
        sink.emit(ChatEvent::Thinking { agent: "late".into() });
        drop(sink);

        let frames = collect(frame_stream(rx, Duration::from_secs(1))).await;
        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("event: thinking\n"));
        assert!(frames[2].contains("\"status\":\"CONTINUE\""));
    }

    #[tokio::test]
    async fn exactly_one_terminal_frame_per_turn() {
        let (sink, rx) = event_channel();
        sink.emit(ChatEvent::Error { content: "boom".into() });
        drop(sink);
        let frames = collect(frame_stream(rx, Duration::from_secs(1))).await;
        let terminals = frames
            .iter()
            .filter(|f| f.starts_with("event: finish") || f.starts_with("event: error"))
            .count();
        assert_eq!(terminals, 1);
        assert!(frames.last().unwrap().starts_with("event: error"));
    }

    #[tokio::test]
    async fn closed_channel_without_terminal_yields_final_finish() {
        let (sink, rx) = event_channel();
        sink.emit(ChatEvent::Thinking { agent: "a".into() });
        drop(sink);
        let frames = collect(frame_stream(rx, Duration::from_secs(1))).await;
        assert_eq!(frames.len(), 2);
        assert!(frames[1].starts_with("event: finish"));
        assert!(frames[1].contains("FINISH"));
    }

    #[tokio::test]
    async fn read_timeout_emits_terminal_error() {
        let (sink, rx) = event_channel();
        // Keep the sink alive but silent.
        let frames = collect(frame_stream(rx, Duration::from_millis(20))).await;
        drop(sink);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: error"));
        assert!(frames[0].contains("stream timeout"));
    }
}
