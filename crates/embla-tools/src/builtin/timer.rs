// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::tool::{require_str, Tool, ToolArgs, ToolError, ToolOutput};

/// Start a countdown timer.
///
/// The timer runs on a background task and logs when it fires; the tool
/// returns immediately with a confirmation so the model can keep talking.
pub struct TimerTool;

#[async_trait]
impl Tool for TimerTool {
    fn name(&self) -> &str {
        "timer"
    }

    fn description(&self) -> &str {
        "Start a countdown timer. duration accepts humane forms like '90s', \
         '5m' or '1h 30m'. An optional label names the timer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "duration": {
                    "type": "string",
                    "description": "How long the timer should run, e.g. '5m'"
                },
                "label": {
                    "type": "string",
                    "description": "Optional name for the timer"
                }
            },
            "required": ["duration"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let raw = require_str(args, "duration")?;
        let duration = humantime::parse_duration(raw)
            .map_err(|e| ToolError::InvalidArguments(format!("bad duration '{raw}': {e}")))?;
        if duration.is_zero() {
            return Err(ToolError::InvalidArguments("duration must be positive".into()));
        }
        let label = args
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or("timer")
            .to_string();

        let fire_label = label.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            info!(label = %fire_label, "timer elapsed");
        });

        Ok(ToolOutput::ok(format!(
            "Timer '{}' set for {}.",
            label,
            humantime::format_duration(duration)
        )))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sets_a_labelled_timer() {
        let mut args = ToolArgs::new();
        args.insert("duration".into(), json!("5m"));
        args.insert("label".into(), json!("tea"));
        let out = TimerTool.execute(&args).await.unwrap();
        assert_eq!(out.content, "Timer 'tea' set for 5m.");
    }

    #[tokio::test]
    async fn default_label() {
        let mut args = ToolArgs::new();
        args.insert("duration".into(), json!("90s"));
        let out = TimerTool.execute(&args).await.unwrap();
        assert!(out.content.starts_with("Timer 'timer' set for"));
    }

    #[tokio::test]
    async fn rejects_unparseable_duration() {
        let mut args = ToolArgs::new();
        args.insert("duration".into(), json!("soon"));
        assert!(matches!(
            TimerTool.execute(&args).await.unwrap_err(),
            ToolError::InvalidArguments(_)
        ));
    }

    #[tokio::test]
    async fn rejects_zero_duration() {
        let mut args = ToolArgs::new();
        args.insert("duration".into(), json!("0s"));
        assert!(matches!(
            TimerTool.execute(&args).await.unwrap_err(),
            ToolError::InvalidArguments(_)
        ));
    }
}
