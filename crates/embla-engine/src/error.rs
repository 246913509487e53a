// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

/// Errors surfaced by the inference engine.
///
/// Cancellation is deliberately absent: a cancelled generation is not a
/// failure and is reported in-stream as
/// [`TokenEvent::Done`](crate::TokenEvent::Done) with
/// [`FinishReason::Cancelled`](crate::FinishReason::Cancelled).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("failed to load model: {0}")]
    FailedToLoad(String),

    #[error("failed to create inference context: {0}")]
    ContextCreationFailed(String),

    /// `generate` was called before `load` or after `unload`.
    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
