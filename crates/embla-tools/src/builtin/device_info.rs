// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolArgs, ToolError, ToolOutput};

/// Reports basic facts about the device the assistant runs on.
pub struct DeviceInfoTool;

#[async_trait]
impl Tool for DeviceInfoTool {
    fn name(&self) -> &str {
        "device_info"
    }

    fn description(&self) -> &str {
        "Get information about this device: operating system, architecture, \
         CPU core count, and the current local date and time."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let now = Local::now();
        Ok(ToolOutput::ok(format!(
            "OS: {}\nArchitecture: {}\nCPU cores: {}\nLocal time: {}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            cores,
            now.format("%Y-%m-%d %H:%M:%S %Z"),
        )))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_os_and_time() {
        let out = DeviceInfoTool.execute(&ToolArgs::new()).await.unwrap();
        assert!(out.content.contains(std::env::consts::OS));
        assert!(out.content.contains("Local time:"));
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn ignores_unexpected_arguments() {
        let mut args = ToolArgs::new();
        args.insert("anything".into(), serde_json::json!(42));
        assert!(DeviceInfoTool.execute(&args).await.is_ok());
    }

    #[test]
    fn schema_has_no_required_parameters() {
        let schema = DeviceInfoTool.parameters_schema();
        assert_eq!(schema["required"].as_array().unwrap().len(), 0);
    }
}
