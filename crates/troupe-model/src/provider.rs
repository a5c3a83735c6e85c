// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{ChatReply, ChatRequest, ModelError};

/// Uniform contract every model endpoint driver implements.
///
/// The gateway is the only place that knows provider flavor; everything
/// above it sees messages in, text-or-tool-calls out.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display and logs.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send the request and return either the final assistant text or the
    /// batch of tool calls the model wants executed first.
    async fn invoke(&self, req: ChatRequest) -> Result<ChatReply, ModelError>;
}
