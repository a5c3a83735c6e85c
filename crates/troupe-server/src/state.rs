// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use troupe_config::OutputMode;
use troupe_model::ProviderGateway;
use troupe_store::{AgentRegistry, GroupStore};
use troupe_tools::ToolRegistry;

/// Shared server state handed to every request handler.
///
/// Everything here is immutable after startup; per-turn mutable state
/// (message list, event queue) lives in the turn itself.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<GroupStore>,
    pub agents: Arc<AgentRegistry>,
    pub gateway: Arc<ProviderGateway>,
    pub tools: Arc<ToolRegistry>,
    pub output_modes: Arc<Vec<OutputMode>>,
    pub data_root: PathBuf,
}
