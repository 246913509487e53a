// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::builtin;
use crate::tool::{Tool, ToolArgs, ToolError, ToolOutput};

/// A tool's prompt-facing description.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Name-indexed collection of tools.
///
/// Immutable after construction (all dispatch methods take `&self`), so a
/// shared `Arc<ToolRegistry>` is safe under concurrent dispatch from any
/// number of coordinators.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Registry pre-populated with the default on-device tool set.
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::CalculatorTool);
        registry.register(builtin::DeviceInfoTool);
        registry.register(builtin::ClipboardTool);
        registry.register(builtin::WebSearchTool::default());
        registry.register(builtin::CalendarTool::default());
        registry.register(builtin::RemindersTool::default());
        registry.register(builtin::OpenAppTool);
        registry.register(builtin::TimerTool);
        registry
    }

    /// Register a tool.  Registering the same name again replaces it.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Remove a tool by name; returns whether it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for all registered tools, sorted by name.  Parameter schemas
    /// are the tool's own `Value`; render with [`canonical_json`] when
    /// embedding in a prompt.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Dispatch by name.  Unknown names fail with [`ToolError::NotFound`];
    /// everything else is delegated to the tool.
    pub async fn execute_by_name(
        &self,
        name: &str,
        args: &ToolArgs,
    ) -> Result<ToolOutput, ToolError> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a JSON value with object keys sorted recursively.
///
/// Used for schemas embedded in prompts so the rendering is stable across
/// runs and serde_json feature choices.
pub fn canonical_json(value: &Value) -> String {
    fn canonical(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for key in keys {
                    out.insert(key.clone(), canonical(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
            other => other.clone(),
        }
    }
    canonical(value).to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

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
            "echoes its arguments"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": {}, "required": [] })
        }
        async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::ok(format!("echo:{}", Value::Object(args.clone()))))
        }
    }

    #[tokio::test]
    async fn execute_by_name_dispatches() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let out = reg.execute_by_name("echo", &ToolArgs::new()).await.unwrap();
        assert!(out.content.starts_with("echo:"));
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn unknown_name_fails_with_not_found() {
        let reg = ToolRegistry::new();
        let err = reg
            .execute_by_name("nonexistent", &ToolArgs::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Tool not found: nonexistent");
    }

    #[test]
    fn register_then_unregister_restores_prior_state() {
        let mut reg = ToolRegistry::new();
        let before = reg.names();
        reg.register(EchoTool { name: "transient" });
        assert!(reg.get("transient").is_some());
        assert!(reg.unregister("transient"));
        assert_eq!(reg.names(), before);
        assert!(!reg.unregister("transient"));
    }

    #[test]
    fn duplicate_registration_replaces() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.names().len(), 1);
    }

    #[test]
    fn schemas_are_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "zeta" });
        reg.register(EchoTool { name: "alpha" });
        let names: Vec<&str> = reg.schemas().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn default_tool_set_is_registered() {
        let reg = ToolRegistry::with_default_tools();
        assert_eq!(
            reg.names(),
            vec![
                "calculator",
                "calendar",
                "clipboard",
                "device_info",
                "open_app",
                "reminders",
                "timer",
                "web_search",
            ]
        );
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let v = json!({
            "type": "object",
            "properties": { "b": { "type": "string" }, "a": { "type": "integer" } },
            "required": ["b", "a"]
        });
        let rendered = canonical_json(&v);
        let props = rendered.find("properties").unwrap();
        assert!(rendered.find(r#""a""#).unwrap() > props);
        assert!(rendered.find(r#""a""#).unwrap() < rendered.find(r#""b""#).unwrap());
        // array order is preserved
        assert!(rendered.contains(r#"["b","a"]"#));
    }

    #[test]
    fn canonical_json_is_deterministic() {
        let v = json!({ "z": 1, "m": { "q": 2, "a": 3 }, "a": [1, 2] });
        assert_eq!(canonical_json(&v), canonical_json(&v));
        assert_eq!(canonical_json(&v), r#"{"a":[1,2],"m":{"a":3,"q":2},"z":1}"#);
    }
}
