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
struct Reminder {
    text: String,
    done: bool,
    created: chrono::DateTime<Utc>,
}

/// Reminder list backed by a JSON file store.
pub struct RemindersTool {
    store_path: PathBuf,
}

impl Default for RemindersTool {
    fn default() -> Self {
        Self { store_path: store::default_path("reminders") }
    }
}

impl RemindersTool {
    /// Use an explicit store file (tests).
    pub fn with_store_path(path: impl Into<PathBuf>) -> Self {
        Self { store_path: path.into() }
    }
}

#[async_trait]
impl Tool for RemindersTool {
    fn name(&self) -> &str {
        "reminders"
    }

    fn description(&self) -> &str {
        "Manage reminders. action 'add' creates a reminder from 'text'; \
         action 'list' shows open reminders with their numbers; action \
         'complete' marks reminder number 'index' as done."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "What to do",
                    "enum": ["add", "list", "complete"]
                },
                "text": {
                    "type": "string",
                    "description": "Reminder text (action 'add')"
                },
                "index": {
                    "type": "integer",
                    "description": "1-based reminder number (action 'complete')"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        match require_str(args, "action")? {
            "add" => {
                let text = require_str(args, "text")?.to_string();
                let mut reminders: Vec<Reminder> = store::load(&self.store_path)?;
                reminders.push(Reminder { text: text.clone(), done: false, created: Utc::now() });
                store::save(&self.store_path, &reminders)?;
                Ok(ToolOutput::ok(format!("Reminder added: {text}")))
            }
            "list" => {
                let reminders: Vec<Reminder> = store::load(&self.store_path)?;
                let open: Vec<String> = reminders
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| !r.done)
                    .map(|(i, r)| format!("{}. {}", i + 1, r.text))
                    .collect();
                if open.is_empty() {
                    return Ok(ToolOutput::ok("No open reminders."));
                }
                Ok(ToolOutput::ok(open.join("\n")))
            }
            "complete" => {
                let index = args
                    .get("index")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| ToolError::InvalidArguments("missing 'index'".into()))?
                    as usize;
                let mut reminders: Vec<Reminder> = store::load(&self.store_path)?;
                let reminder = index
                    .checked_sub(1)
                    .and_then(|i| reminders.get_mut(i))
                    .ok_or_else(|| {
                        ToolError::InvalidArguments(format!("no reminder number {index}"))
                    })?;
                reminder.done = true;
                let text = reminder.text.clone();
                store::save(&self.store_path, &reminders)?;
                Ok(ToolOutput::ok(format!("Completed: {text}")))
            }
            other => Err(ToolError::InvalidArguments(format!(
                "unknown action '{other}' (expected 'add', 'list' or 'complete')"
            ))),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(dir: &tempfile::TempDir) -> RemindersTool {
        RemindersTool::with_store_path(dir.path().join("reminders.json"))
    }

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        let mut args = ToolArgs::new();
        for (k, v) in pairs {
            args.insert((*k).into(), v.clone());
        }
        args
    }

    #[tokio::test]
    async fn add_list_complete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(&dir);

        tool.execute(&args(&[("action", json!("add")), ("text", json!("water plants"))]))
            .await
            .unwrap();
        tool.execute(&args(&[("action", json!("add")), ("text", json!("buy milk"))]))
            .await
            .unwrap();

        let out = tool.execute(&args(&[("action", json!("list"))])).await.unwrap();
        assert_eq!(out.content, "1. water plants\n2. buy milk");

        let out = tool
            .execute(&args(&[("action", json!("complete")), ("index", json!(1))]))
            .await
            .unwrap();
        assert_eq!(out.content, "Completed: water plants");

        let out = tool.execute(&args(&[("action", json!("list"))])).await.unwrap();
        assert_eq!(out.content, "2. buy milk");
    }

    #[tokio::test]
    async fn complete_out_of_range_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(&dir);
        let err = tool
            .execute(&args(&[("action", json!("complete")), ("index", json!(7))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let out = tool(&dir).execute(&args(&[("action", json!("list"))])).await.unwrap();
        assert_eq!(out.content, "No open reminders.");
    }
}
