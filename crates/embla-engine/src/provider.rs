// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use embla_config::GenerationParams;
use futures::Stream;
use tokio::sync::watch;

use crate::error::EngineError;
use crate::types::{Message, TokenEvent};

/// Lazy event stream for one generation.  The terminal
/// [`TokenEvent::Done`] is the last item; dropping the stream cancels the
/// producer at token granularity.
pub type TokenEventStream =
    Pin<Box<dyn Stream<Item = Result<TokenEvent, EngineError>> + Send>>;

/// Engine lifecycle state, published for UI bridging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Idle,
    Generating,
}

/// The inference engine contract the agent coordinator drives.
///
/// Implemented by [`LlamaEngine`](crate::LlamaEngine) over a local GGUF
/// model and by [`ScriptedEngine`](crate::mock::ScriptedEngine) for tests.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Acquire backend, model, and context.  A no-op when already loaded.
    async fn load(&self) -> Result<(), EngineError>;

    /// Start one generation over `messages` and return its event stream.
    ///
    /// Exactly one generation may be in flight per engine; a concurrent
    /// call fails fast with `GenerationFailed("generation already in
    /// progress")`.  Numeric parameters are clamped on entry.
    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TokenEventStream, EngineError>;

    /// Set the shared cancel flag for the in-flight generation.
    ///
    /// Cooperative and idempotent; the producer polls the flag at the top
    /// of every decode step and finishes with `Done(Cancelled)`.
    fn cancel(&self);

    /// Release context, then model, then the backend refcount.
    /// A no-op when not loaded.
    async fn unload(&self);

    fn is_loaded(&self) -> bool;

    /// Current lifecycle state.
    fn state(&self) -> EngineState;

    /// Subscribe to lifecycle state transitions.
    fn state_changes(&self) -> watch::Receiver<EngineState>;
}
