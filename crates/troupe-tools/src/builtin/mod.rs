// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod files;
mod search_knowledge;

pub use files::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use search_knowledge::SearchKnowledgeTool;

use std::path::Path;

use crate::ToolRegistry;

/// Register the standard platform tool set rooted at `data_root`.
pub fn register_builtin_tools(registry: &mut ToolRegistry, data_root: &Path) {
    registry.register(ReadFileTool { root: data_root.to_path_buf() });
    registry.register(WriteFileTool { root: data_root.to_path_buf() });
    registry.register(ListFilesTool { root: data_root.to_path_buf() });
}
