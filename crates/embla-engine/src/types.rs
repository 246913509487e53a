// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is a JSON object kept serialized as a string so the call
/// survives transport through the plain-text token stream unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    /// A call with a freshly generated id.
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// The outcome of executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// One message in a conversation.  Messages are immutable once appended;
/// the conversation only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Tool calls the assistant made in this turn (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Structured result carried by a tool message; retained for auditing,
    /// never re-serialized into the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An assistant turn that requested tool calls alongside its text.
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = calls;
        msg
    }

    /// A tool message carrying one tool result.  The plain-text output goes
    /// into `content` (this is what the model sees on the next turn).
    pub fn tool_result(result: ToolResult) -> Self {
        let mut msg = Self::new(Role::Tool, result.content.clone());
        msg.tool_result = Some(result);
        msg
    }
}

/// Why a generation stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model produced an end-of-generation token.
    Stop,
    /// `max_tokens` was exhausted.
    Length,
    /// An end-of-generation token arrived while a tool-call buffer was open
    /// and the buffered call parsed.
    ToolUse,
    /// The cancel flag was observed.
    Cancelled,
}

/// One event in the engine's generation stream.
///
/// The terminal `Done` is always the last event of a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenEvent {
    /// A decoded UTF-8 piece.  May be less than one full code point.
    Token(String),
    /// The model closed a `<tool_call>` marker block with a parseable payload.
    ToolCall(ToolCall),
    Done(FinishReason),
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(Message::user("x").id, Message::user("x").id);
    }

    #[test]
    fn assistant_with_tool_calls_keeps_both() {
        let call = ToolCall::new("calculator", r#"{"expression":"1+1"}"#);
        let m = Message::assistant_with_tool_calls("thinking", vec![call.clone()]);
        assert_eq!(m.content, "thinking");
        assert_eq!(m.tool_calls, vec![call]);
    }

    #[test]
    fn tool_result_message_mirrors_content() {
        let m = Message::tool_result(ToolResult {
            tool_call_id: "c1".into(),
            content: "42".into(),
            is_error: false,
        });
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.content, "42");
        assert_eq!(m.tool_result.as_ref().map(|r| r.tool_call_id.as_str()), Some("c1"));
    }

    #[test]
    fn tool_call_new_generates_distinct_ids() {
        let a = ToolCall::new("t", "{}");
        let b = ToolCall::new("t", "{}");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn role_display_is_lowercase() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn message_serialization_omits_empty_tool_fields() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_result"));
    }
}
