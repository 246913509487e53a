// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Tool contract and registry.
//!
//! Tools are named, side-effecting capabilities with JSON-schema-shaped
//! parameter descriptions.  The agent dispatches them by name through a
//! [`ToolRegistry`]; tool failures are reported as error outputs, never
//! panics, and never abort the agent loop.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use registry::{canonical_json, ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolArgs, ToolError, ToolOutput};
