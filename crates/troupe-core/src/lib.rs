// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent;
mod events;
mod message;
mod prompts;

pub use agent::{WorkerAgent, HISTORY_WINDOW, MAX_ITERATIONS};
pub use events::{event_channel, Cancelled, ChatEvent, ChatStatus, EventSink};
pub use message::{ChatMessage, ChatRole};
pub use prompts::{effective_system_prompt, RETRIEVAL_DIRECTIVE};
