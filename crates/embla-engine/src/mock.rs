// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::watch;

use embla_config::GenerationParams;

use crate::error::EngineError;
use crate::provider::{EngineState, InferenceEngine, TokenEventStream};
use crate::types::{FinishReason, Message, TokenEvent, ToolCall};

/// One scripted generation.
#[derive(Debug, Clone)]
pub struct Script {
    events: Vec<TokenEvent>,
    /// After the events run out, park instead of finishing; the stream
    /// then only ends through cancellation.  For cancellation tests.
    stall: bool,
}

impl Script {
    pub fn events(events: Vec<TokenEvent>) -> Self {
        Self { events, stall: false }
    }

    pub fn stalling(events: Vec<TokenEvent>) -> Self {
        Self { events, stall: true }
    }
}

/// Pre-scripted engine for tests.  Each `generate` call pops the next
/// script and replays its events; the conversation passed in is recorded
/// so tests can inspect exactly what the coordinator sent.  Mirrors the
/// real engine's contract: in-flight exclusivity, cancel-flag semantics
/// (cleared on generate, set by the stream's drop hook), and a terminal
/// `Done` per stream.
pub struct ScriptedEngine {
    scripts: Mutex<VecDeque<Script>>,
    /// Conversations seen by `generate`, in call order.
    pub seen: Mutex<Vec<Vec<Message>>>,
    /// Parameters seen by `generate`, in call order.
    pub seen_params: Mutex<Vec<GenerationParams>>,
    loaded: AtomicBool,
    busy: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    waker: Arc<Mutex<Option<Waker>>>,
    state_tx: watch::Sender<EngineState>,
}

impl ScriptedEngine {
    pub fn new(scripts: Vec<Script>) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Idle);
        Self {
            scripts: Mutex::new(scripts.into()),
            seen: Mutex::new(Vec::new()),
            seen_params: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(true),
            busy: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(Mutex::new(None)),
            state_tx,
        }
    }

    /// Engine that answers every call with one text piece and a stop.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(vec![Script::events(vec![
            TokenEvent::Token(reply),
            TokenEvent::Done(FinishReason::Stop),
        ])])
    }

    /// Engine that first emits a tool call, then (second call) a text reply.
    pub fn tool_call_then_text(
        name: impl Into<String>,
        arguments: impl Into<String>,
        reply: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Script::events(vec![
                TokenEvent::ToolCall(ToolCall::new(name, arguments)),
                TokenEvent::Done(FinishReason::Stop),
            ]),
            Script::events(vec![
                TokenEvent::Token(reply.into()),
                TokenEvent::Done(FinishReason::Stop),
            ]),
        ])
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn load(&self) -> Result<(), EngineError> {
        self.loaded.store(true, Ordering::SeqCst);
        self.state_tx.send_replace(EngineState::Idle);
        Ok(())
    }

    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TokenEventStream, EngineError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(EngineError::ModelNotLoaded);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::GenerationFailed(
                "generation already in progress".into(),
            ));
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        self.seen_params.lock().unwrap().push(params.clamped());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Script::events(vec![
                    TokenEvent::Token("[no more scripts]".into()),
                    TokenEvent::Done(FinishReason::Stop),
                ])
            });
        self.state_tx.send_replace(EngineState::Generating);
        Ok(Box::pin(MockStream {
            events: script.events.into_iter(),
            stall: script.stall,
            finished: false,
            busy: Arc::clone(&self.busy),
            cancel: Arc::clone(&self.cancel),
            waker: Arc::clone(&self.waker),
            state_tx: self.state_tx.clone(),
        }))
    }

    fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(waker) = self.waker.lock().unwrap().take() {
            waker.wake();
        }
    }

    async fn unload(&self) {
        self.loaded.store(false, Ordering::SeqCst);
        self.state_tx.send_replace(EngineState::Unloaded);
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    fn state_changes(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }
}

struct MockStream {
    events: std::vec::IntoIter<TokenEvent>,
    stall: bool,
    finished: bool,
    busy: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    waker: Arc<Mutex<Option<Waker>>>,
    state_tx: watch::Sender<EngineState>,
}

impl Stream for MockStream {
    type Item = Result<TokenEvent, EngineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.cancel.load(Ordering::SeqCst) {
            this.finished = true;
            return Poll::Ready(Some(Ok(TokenEvent::Done(FinishReason::Cancelled))));
        }
        if let Some(event) = this.events.next() {
            if matches!(event, TokenEvent::Done(_)) {
                this.finished = true;
            }
            return Poll::Ready(Some(Ok(event)));
        }
        if this.stall {
            *this.waker.lock().unwrap() = Some(cx.waker().clone());
            return Poll::Pending;
        }
        // A script without an explicit terminal event stops cleanly.
        this.finished = true;
        Poll::Ready(Some(Ok(TokenEvent::Done(FinishReason::Stop))))
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
        self.state_tx.send_replace(EngineState::Idle);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
