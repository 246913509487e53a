// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{require_str, Tool, ToolArgs, ToolError, ToolOutput};

/// Read or replace the system clipboard.
pub struct ClipboardTool;

#[async_trait]
impl Tool for ClipboardTool {
    fn name(&self) -> &str {
        "clipboard"
    }

    fn description(&self) -> &str {
        "Read or write the system clipboard. action 'read' returns the \
         current text contents; action 'write' replaces them with 'text'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "What to do with the clipboard",
                    "enum": ["read", "write"]
                },
                "text": {
                    "type": "string",
                    "description": "Text to place on the clipboard (action 'write' only)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let action = require_str(args, "action")?;
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| ToolError::ExecutionFailed(format!("clipboard unavailable: {e}")))?;
        match action {
            "read" => match clipboard.get_text() {
                Ok(text) if text.is_empty() => Ok(ToolOutput::ok("The clipboard is empty.")),
                Ok(text) => Ok(ToolOutput::ok(text)),
                Err(arboard::Error::ContentNotAvailable) => {
                    Ok(ToolOutput::ok("The clipboard is empty."))
                }
                Err(e) => Err(ToolError::ExecutionFailed(format!("clipboard read: {e}"))),
            },
            "write" => {
                let text = require_str(args, "text")?;
                clipboard
                    .set_text(text.to_string())
                    .map_err(|e| ToolError::ExecutionFailed(format!("clipboard write: {e}")))?;
                Ok(ToolOutput::ok(format!("Copied {} characters to the clipboard.", text.chars().count())))
            }
            other => Err(ToolError::InvalidArguments(format!(
                "unknown action '{other}' (expected 'read' or 'write')"
            ))),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_action_is_invalid() {
        let err = ClipboardTool.execute(&ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unknown_action_is_invalid() {
        let mut args = ToolArgs::new();
        args.insert("action".into(), json!("paste"));
        // Headless environments fail earlier with ExecutionFailed when no
        // clipboard is available; both are acceptable non-panicking outcomes.
        let err = ClipboardTool.execute(&args).await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::InvalidArguments(_) | ToolError::ExecutionFailed(_)
        ));
    }

    #[test]
    fn schema_enumerates_actions() {
        let schema = ClipboardTool.parameters_schema();
        let actions = schema["properties"]["action"]["enum"].as_array().unwrap();
        assert_eq!(actions, &[json!("read"), json!("write")]);
    }
}
