// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::{Tool, ToolCall, ToolOutput};

/// Central registry holding all platform tools.
///
/// Populated once at startup and immutable afterwards; agents receive
/// cloned `Arc`s of the tools their configuration names.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Resolve a list of tool names to tool handles.
    ///
    /// Resolution is additive: names that are not registered are skipped
    /// silently (a debug log only), so an agent configured against an
    /// older tool set still runs with the subset that exists.
    pub fn resolve(&self, names: &[String]) -> Vec<Arc<dyn Tool>> {
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            match self.tools.get(name) {
                Some(tool) => resolved.push(Arc::clone(tool)),
                None => debug!(tool = %name, "skipping unknown tool name"),
            }
        }
        resolved
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn resolve_skips_unknown_names() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "a" });
        reg.register(EchoTool { name: "b" });
        let resolved = reg.resolve(&["a".into(), "ghost".into(), "b".into()]);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].name(), "a");
        assert_eq!(resolved[1].name(), "b");
    }

    #[test]
    fn resolve_preserves_request_order() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "x" });
        reg.register(EchoTool { name: "y" });
        let resolved = reg.resolve(&["y".into(), "x".into()]);
        assert_eq!(resolved[0].name(), "y");
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error_output() {
        let reg = ToolRegistry::new();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "zeta" });
        reg.register(EchoTool { name: "alpha" });
        assert_eq!(reg.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.names().len(), 1);
    }
}
