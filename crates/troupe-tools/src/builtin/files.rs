// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Workspace file tools: read, write, list.
//!
//! All paths are interpreted relative to the platform data root and
//! validated to stay inside it.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Resolve `relative` under `root`, rejecting absolute paths and any
/// `..` traversal before the path ever touches the filesystem.
fn resolve_sandboxed(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let rel = Path::new(relative);
    if rel.is_absolute() {
        return Err(format!("absolute paths are not allowed: {relative}"));
    }
    for comp in rel.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(format!("path escapes the workspace: {relative}"));
        }
    }
    Ok(root.join(rel))
}

fn path_arg(call: &ToolCall) -> Result<String, ToolOutput> {
    match call.args.get("path").and_then(|v| v.as_str()) {
        Some(p) if !p.trim().is_empty() => Ok(p.trim().to_string()),
        _ => Err(ToolOutput::err(&call.id, "missing or empty 'path'")),
    }
}

pub struct ReadFileTool {
    pub root: PathBuf,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the workspace. Returns the file content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let rel = match path_arg(call) {
            Ok(p) => p,
            Err(out) => return out,
        };
        let path = match resolve_sandboxed(&self.root, &rel) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(e) => ToolOutput::err(&call.id, format!("could not read {rel}: {e}")),
        }
    }
}

pub struct WriteFileTool {
    pub root: PathBuf,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a UTF-8 text file into the workspace, creating parent directories as needed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" },
                "content": { "type": "string", "description": "Full file content to write" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let rel = match path_arg(call) {
            Ok(p) => p,
            Err(out) => return out,
        };
        let content = call
            .args
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let path = match resolve_sandboxed(&self.root, &rel) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("could not create {rel}: {e}"));
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("wrote {} bytes to {rel}", content.len())),
            Err(e) => ToolOutput::err(&call.id, format!("could not write {rel}: {e}")),
        }
    }
}

pub struct ListFilesTool {
    pub root: PathBuf,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory. Directories are suffixed with '/'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative directory (default: root)" }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let rel = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let path = match resolve_sandboxed(&self.root, &rel) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => return ToolOutput::err(&call.id, format!("could not list {rel}: {e}")),
        };
        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        if names.is_empty() {
            ToolOutput::ok(&call.id, "(empty directory)")
        } else {
            ToolOutput::ok(&call.id, names.join("\n"))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
