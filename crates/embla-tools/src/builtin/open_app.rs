// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{require_str, Tool, ToolArgs, ToolError, ToolOutput};

/// Launch an application by name via the platform opener.
pub struct OpenAppTool;

#[async_trait]
impl Tool for OpenAppTool {
    fn name(&self) -> &str {
        "open_app"
    }

    fn description(&self) -> &str {
        "Open an application on this device by name, e.g. 'Safari' or 'Notes'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The application name"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let name = require_str(args, "name")?.trim();
        if name.is_empty() {
            return Err(ToolError::InvalidArguments("application name is empty".into()));
        }
        debug!(app = %name, "open_app");
        let result = if cfg!(target_os = "macos") {
            std::process::Command::new("open").arg("-a").arg(name).spawn()
        } else if cfg!(target_os = "windows") {
            std::process::Command::new("cmd").args(["/C", "start", "", name]).spawn()
        } else {
            std::process::Command::new(name).spawn()
        };
        match result {
            Ok(_) => Ok(ToolOutput::ok(format!("Launching {name}."))),
            Err(e) => Err(ToolError::ExecutionFailed(format!(
                "could not launch '{name}': {e}"
            ))),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_name_is_invalid() {
        let err = OpenAppTool.execute(&ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn blank_name_is_invalid() {
        let mut args = ToolArgs::new();
        args.insert("name".into(), json!("   "));
        let err = OpenAppTool.execute(&args).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unlaunchable_app_reports_error_not_panic() {
        let mut args = ToolArgs::new();
        args.insert("name".into(), json!("embla-no-such-application-xyz"));
        // macOS/Windows shells may accept the request asynchronously; a
        // direct spawn on other platforms fails immediately.  Either way the
        // call must return, not panic.
        let _ = OpenAppTool.execute(&args).await;
    }
}
