// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Events emitted by the coordinator while processing one request.
/// Consumers (chat UI, logs) subscribe to these to drive their output.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A text fragment streamed from the model.
    Text(String),
    /// The model requested a tool call (announced as soon as it is parsed).
    ToolCallStarted { name: String },
    /// A tool is about to run.
    ToolExecuting { name: String },
    /// A tool finished; `content` is its plain-text output (or error text).
    ToolResult { name: String, content: String },
    /// The request is fully answered; always the last event of a
    /// successful run.
    Completed,
}
