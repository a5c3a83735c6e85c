use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

/// A single message in the prompt sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(text.into()) }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()) }
    }

    /// The assistant's request for a tool invocation, echoed back to the
    /// provider on the next round of the tool loop.
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCall {
                tool_call_id: id.into(),
                function: FunctionCall { name: name.into(), arguments: args.to_string() },
            },
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                tool_call_id: id.into(),
                content: content.into(),
            },
        }
    }

    /// Return the plain text of this message, if it is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// The content of a prompt message.
///
/// - `Text` – plain string (most messages)
/// - `ToolCall` – the assistant requested a tool invocation
/// - `ToolResult` – the result of a tool call, correlated by id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolCall {
        tool_call_id: String,
        function: FunctionCall,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

// ─── Request / reply ──────────────────────────────────────────────────────────

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

impl ChatRequest {
    pub fn text_only(messages: Vec<Message>) -> Self {
        Self { messages, tools: Vec::new() }
    }
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Stable call id, forwarded verbatim in the correlated result message.
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: serde_json::Value,
}

/// What a provider call produced: either a final assistant text or a batch
/// of tool-call requests to execute before asking again.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

impl ChatReply {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::ToolCalls(_) => None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        assert_eq!(Message::tool_result("id", "r").role, Role::Tool);
    }

    #[test]
    fn as_text_returns_none_for_tool_content() {
        let m = Message::tool_call("c1", "read_file", serde_json::json!({"path": "a.txt"}));
        assert!(m.as_text().is_none());
        assert_eq!(Message::user("hi").as_text(), Some("hi"));
    }

    #[test]
    fn tool_call_arguments_are_json_encoded() {
        let m = Message::tool_call("c1", "f", serde_json::json!({"x": 1}));
        match m.content {
            MessageContent::ToolCall { tool_call_id, function } => {
                assert_eq!(tool_call_id, "c1");
                assert_eq!(function.arguments, r#"{"x":1}"#);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn chat_reply_as_text() {
        assert_eq!(ChatReply::Text("t".into()).as_text(), Some("t"));
        assert!(ChatReply::ToolCalls(vec![]).as_text().is_none());
    }
}
