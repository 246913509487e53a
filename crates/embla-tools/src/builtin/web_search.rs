// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{require_str, Tool, ToolArgs, ToolError, ToolOutput};

/// Web search via the Brave Search API.
#[derive(Default)]
pub struct WebSearchTool {
    /// Optional API key override (falls back to env BRAVE_API_KEY)
    pub api_key: Option<String>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return the top results with titles, URLs and \
         snippets. count: 1-10 (default 5). Use this for current events or \
         anything that may have changed recently."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "count": {
                    "type": "integer",
                    "description": "Number of results to return (default 5, max 10)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let query = require_str(args, "query")?;
        let count = args
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .clamp(1, 10) as usize;

        debug!(query = %query, count, "web_search tool");

        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var("BRAVE_API_KEY").ok())
            .ok_or_else(|| {
                ToolError::PermissionDenied(
                    "no search API key configured; set the BRAVE_API_KEY environment variable"
                        .into(),
                )
            })?;

        brave_search(query, count, &api_key)
            .await
            .map(ToolOutput::ok)
            .map_err(|e| ToolError::ExecutionFailed(format!("search error: {e}")))
    }
}

async fn brave_search(query: &str, count: usize, api_key: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("embla/1.0")
        .build()?;

    let count_param = count.to_string();
    let resp = client
        .get("https://api.search.brave.com/res/v1/web/search")
        .query(&[("q", query), ("count", count_param.as_str())])
        .header("Accept", "application/json")
        .header("X-Subscription-Token", api_key)
        .send()
        .await?;

    if !resp.status().is_success() {
        anyhow::bail!("search API returned status {}", resp.status());
    }

    let body: Value = resp.json().await?;
    let results = body
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[]);

    if results.is_empty() {
        return Ok(format!("No results for '{query}'."));
    }

    let mut out = String::new();
    for (i, result) in results.iter().take(count).enumerate() {
        let title = result.get("title").and_then(|v| v.as_str()).unwrap_or("(untitled)");
        let url = result.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let snippet = result.get("description").and_then(|v| v.as_str()).unwrap_or("");
        out.push_str(&format!("{}. {title}\n   {url}\n   {snippet}\n", i + 1));
    }
    Ok(out)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
