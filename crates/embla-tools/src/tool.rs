// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Arguments as the model supplied them: a parsed JSON object.
pub type ToolArgs = Map<String, Value>;

/// Failure modes of tool dispatch and execution.
///
/// Dispatch failures (`NotFound`) and execution failures both end up as
/// error [`ToolOutput`]s in the conversation; none of them are fatal to
/// the agent loop.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// The result of executing a tool: plain text, success or error.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: true }
    }
}

/// Trait every tool must implement.
///
/// `execute` may suspend.  Bad input must come back as
/// [`ToolError::InvalidArguments`] (or an error output), never a panic.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier; the registry keys on it.
    fn name(&self) -> &str;

    /// Free text included in the system prompt's tool catalog.
    fn description(&self) -> &str;

    /// JSON-schema-shaped parameter description:
    /// `{"type":"object","properties":{...},"required":[...]}`.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError>;
}

/// Fetch a required string argument.
pub(crate) fn require_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{key}'")))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn output_constructors_set_error_flag() {
        assert!(!ToolOutput::ok("fine").is_error);
        assert!(ToolOutput::error("broke").is_error);
    }

    #[test]
    fn not_found_renders_with_name() {
        let e = ToolError::NotFound("nonexistent".into());
        assert_eq!(e.to_string(), "Tool not found: nonexistent");
    }

    #[test]
    fn require_str_fetches_and_rejects() {
        let mut args = ToolArgs::new();
        args.insert("q".into(), json!("hello"));
        args.insert("n".into(), json!(3));
        assert_eq!(require_str(&args, "q").unwrap(), "hello");
        assert!(matches!(require_str(&args, "n"), Err(ToolError::InvalidArguments(_))));
        assert!(matches!(require_str(&args, "missing"), Err(ToolError::InvalidArguments(_))));
    }
}
