// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::builtin::store;
use crate::tool::{require_str, Tool, ToolArgs, ToolError, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalendarEvent {
    title: String,
    /// When the event happens, as the user phrased it.
    when: String,
    created: chrono::DateTime<Utc>,
}

/// Local calendar backed by a JSON file store.
pub struct CalendarTool {
    store_path: PathBuf,
}

impl Default for CalendarTool {
    fn default() -> Self {
        Self { store_path: store::default_path("calendar") }
    }
}

impl CalendarTool {
    /// Use an explicit store file (tests).
    pub fn with_store_path(path: impl Into<PathBuf>) -> Self {
        Self { store_path: path.into() }
    }
}

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Manage calendar events. action 'add' creates an event with 'title' \
         and 'when'; action 'list' shows upcoming events."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "What to do",
                    "enum": ["add", "list"]
                },
                "title": {
                    "type": "string",
                    "description": "Event title (action 'add')"
                },
                "when": {
                    "type": "string",
                    "description": "When the event happens, e.g. 'tomorrow 15:00' (action 'add')"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        match require_str(args, "action")? {
            "add" => {
                let title = require_str(args, "title")?.to_string();
                let when = require_str(args, "when")?.to_string();
                let mut events: Vec<CalendarEvent> = store::load(&self.store_path)?;
                events.push(CalendarEvent { title: title.clone(), when: when.clone(), created: Utc::now() });
                store::save(&self.store_path, &events)?;
                Ok(ToolOutput::ok(format!("Added event '{title}' ({when}).")))
            }
            "list" => {
                let events: Vec<CalendarEvent> = store::load(&self.store_path)?;
                if events.is_empty() {
                    return Ok(ToolOutput::ok("The calendar is empty."));
                }
                let lines: Vec<String> = events
                    .iter()
                    .map(|e| format!("- {} ({})", e.title, e.when))
                    .collect();
                Ok(ToolOutput::ok(lines.join("\n")))
            }
            other => Err(ToolError::InvalidArguments(format!(
                "unknown action '{other}' (expected 'add' or 'list')"
            ))),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> ToolArgs {
        let mut args = ToolArgs::new();
        for (k, v) in pairs {
            args.insert((*k).into(), json!(v));
        }
        args
    }

    #[tokio::test]
    async fn add_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CalendarTool::with_store_path(dir.path().join("calendar.json"));

        let out = tool
            .execute(&args(&[("action", "add"), ("title", "Dentist"), ("when", "Friday 10:00")]))
            .await
            .unwrap();
        assert!(out.content.contains("Dentist"));

        let out = tool.execute(&args(&[("action", "list")])).await.unwrap();
        assert_eq!(out.content, "- Dentist (Friday 10:00)");
    }

    #[tokio::test]
    async fn empty_calendar_lists_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CalendarTool::with_store_path(dir.path().join("calendar.json"));
        let out = tool.execute(&args(&[("action", "list")])).await.unwrap();
        assert_eq!(out.content, "The calendar is empty.");
    }

    #[tokio::test]
    async fn add_without_title_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CalendarTool::with_store_path(dir.path().join("calendar.json"));
        let err = tool.execute(&args(&[("action", "add")])).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unknown_action_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CalendarTool::with_store_path(dir.path().join("calendar.json"));
        let err = tool.execute(&args(&[("action", "clear")])).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
