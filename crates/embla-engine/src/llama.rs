// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::TokenToStringError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use embla_config::{EngineConfig, GenerationParams};

use crate::backend;
use crate::error::EngineError;
use crate::prompt;
use crate::provider::{EngineState, InferenceEngine, TokenEventStream};
use crate::sampler;
use crate::scanner::{MarkerScanner, Scanned};
use crate::types::{FinishReason, Message, TokenEvent};

/// Hard floor on the context window.
const MIN_CONTEXT: u32 = 512;
/// Tokens evaluated per prefill batch, and the context's logical batch size.
const BATCH_SIZE: usize = 512;
/// Initial buffer for token-to-text conversion; oversized pieces retry with
/// the exact size reported by the negative-return convention.
const PIECE_BUFFER: usize = 64;

type EventSender = mpsc::Sender<Result<TokenEvent, EngineError>>;

enum Command {
    Generate {
        prompt: String,
        params: GenerationParams,
        events: EventSender,
        cancel: Arc<AtomicBool>,
    },
    Shutdown,
}

struct Worker {
    commands: std::sync::mpsc::Sender<Command>,
    thread: std::thread::JoinHandle<()>,
}

/// Inference engine over a local GGUF model, backed by llama.cpp.
///
/// The native model and context handles live on a dedicated worker thread
/// for the whole loaded lifetime; engine methods talk to it through a
/// command queue, so all mutable native state is reached from exactly one
/// thread.  Teardown order is structural: the worker drops the context,
/// then the model, then releases the backend refcount.
pub struct LlamaEngine {
    config: EngineConfig,
    worker: tokio::sync::Mutex<Option<Worker>>,
    /// In-flight guard: exactly one generation per engine.
    busy: Arc<AtomicBool>,
    /// Shared cancel flag, polled by the decode loop.
    cancel: Arc<AtomicBool>,
    state_tx: watch::Sender<EngineState>,
}

impl LlamaEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Unloaded);
        Self {
            config,
            worker: tokio::sync::Mutex::new(None),
            busy: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            state_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generation parameters seeded from this engine's configuration.
    pub fn default_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            ..GenerationParams::default()
        }
    }
}

/// Effective context window: the configured size, floored at 512.
fn effective_context(requested: u32) -> u32 {
    requested.max(MIN_CONTEXT)
}

#[async_trait]
impl InferenceEngine for LlamaEngine {
    async fn load(&self) -> Result<(), EngineError> {
        let mut slot = self.worker.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        if !self.config.model_path.is_file() {
            return Err(EngineError::ModelNotFound(self.config.model_path.clone()));
        }
        self.state_tx.send_replace(EngineState::Loading);

        let (ready_tx, ready_rx) = oneshot::channel();
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
        let config = self.config.clone();
        let busy = Arc::clone(&self.busy);
        let state_tx = self.state_tx.clone();
        let thread = match std::thread::Builder::new()
            .name("embla-inference".into())
            .spawn(move || worker_main(config, cmd_rx, ready_tx, busy, state_tx))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.state_tx.send_replace(EngineState::Unloaded);
                return Err(EngineError::FailedToLoad(format!(
                    "failed to spawn inference worker: {e}"
                )));
            }
        };

        // The worker performs the heavy lifting (backend init, model load,
        // context creation) off the async runtime; we only await the ack.
        match ready_rx.await {
            Ok(Ok(())) => {
                *slot = Some(Worker { commands: cmd_tx, thread });
                self.state_tx.send_replace(EngineState::Idle);
                debug!(model = %self.config.model_path.display(), "model loaded");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                self.state_tx.send_replace(EngineState::Unloaded);
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                self.state_tx.send_replace(EngineState::Unloaded);
                Err(EngineError::FailedToLoad(
                    "inference worker exited before signalling readiness".into(),
                ))
            }
        }
    }

    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TokenEventStream, EngineError> {
        let slot = self.worker.lock().await;
        let worker = slot.as_ref().ok_or(EngineError::ModelNotLoaded)?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::GenerationFailed(
                "generation already in progress".into(),
            ));
        }
        // A stale flag from the previous stream's drop hook must not cancel
        // this generation.
        self.cancel.store(false, Ordering::SeqCst);

        let prompt = prompt::format_chatml(messages);
        let (events_tx, events_rx) = mpsc::channel(64);
        let command = Command::Generate {
            prompt,
            params: params.clamped(),
            events: events_tx,
            cancel: Arc::clone(&self.cancel),
        };
        if worker.commands.send(command).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            return Err(EngineError::GenerationFailed(
                "inference worker is gone".into(),
            ));
        }

        Ok(Box::pin(GenerationStream {
            events: events_rx,
            cancel: Arc::clone(&self.cancel),
        }))
    }

    fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    async fn unload(&self) {
        let mut slot = self.worker.lock().await;
        let Some(worker) = slot.take() else {
            return;
        };
        // Interrupt an in-flight generation so the worker reaches the queue.
        self.cancel.store(true, Ordering::SeqCst);
        let _ = worker.commands.send(Command::Shutdown);
        let _ = tokio::task::spawn_blocking(move || worker.thread.join()).await;
        self.state_tx.send_replace(EngineState::Unloaded);
        debug!("model unloaded");
    }

    fn is_loaded(&self) -> bool {
        matches!(
            *self.state_tx.borrow(),
            EngineState::Idle | EngineState::Generating
        )
    }

    fn state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    fn state_changes(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }
}

/// Receiver half of one generation.  Dropping it (the observer walked
/// away, or broke out of the loop) sets the shared cancel flag so the
/// producer stops within one decode step.
struct GenerationStream {
    events: mpsc::Receiver<Result<TokenEvent, EngineError>>,
    cancel: Arc<AtomicBool>,
}

impl Stream for GenerationStream {
    type Item = Result<TokenEvent, EngineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Thread count for the context: leave two cores for the rest of the app.
fn context_threads() -> i32 {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(1);
    (cores - 2).max(1)
}

/// Worker thread body.  Owns backend handle, model, and context; acquires
/// them in order, acks the caller, then serves generation commands until
/// shutdown.  Failure at any step releases earlier acquisitions (backend
/// last) before reporting.
fn worker_main(
    config: EngineConfig,
    commands: std::sync::mpsc::Receiver<Command>,
    ready: oneshot::Sender<Result<(), EngineError>>,
    busy: Arc<AtomicBool>,
    state_tx: watch::Sender<EngineState>,
) {
    let backend = match backend::acquire() {
        Ok(backend) => backend,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let model_params = LlamaModelParams::default().with_n_gpu_layers(config.gpu_layers);
    let model = match LlamaModel::load_from_file(&backend, &config.model_path, &model_params) {
        Ok(model) => model,
        Err(e) => {
            let _ = ready.send(Err(EngineError::FailedToLoad(e.to_string())));
            backend::release();
            return;
        }
    };

    let n_ctx = effective_context(config.context_size);
    let threads = context_threads();
    let ctx_params = LlamaContextParams::default()
        .with_n_ctx(NonZeroU32::new(n_ctx))
        .with_n_batch(BATCH_SIZE as u32)
        .with_n_threads(threads)
        .with_n_threads_batch(threads)
        .with_flash_attention_policy(llama_cpp_sys_2::LLAMA_FLASH_ATTN_TYPE_ENABLED);
    let mut ctx = match model.new_context(&backend, ctx_params) {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = ready.send(Err(EngineError::ContextCreationFailed(e.to_string())));
            // model is dropped on return, before the backend handle
            backend::release();
            return;
        }
    };
    debug!(n_ctx, threads, gpu_layers = config.gpu_layers, "inference context ready");

    let _ = ready.send(Ok(()));

    while let Ok(command) = commands.recv() {
        match command {
            Command::Generate { prompt, params, events, cancel } => {
                state_tx.send_replace(EngineState::Generating);
                run_generation(
                    &model,
                    &mut ctx,
                    &prompt,
                    &params,
                    config.seed,
                    &events,
                    &cancel,
                );
                busy.store(false, Ordering::SeqCst);
                state_tx.send_replace(EngineState::Idle);
            }
            Command::Shutdown => break,
        }
    }

    // Reverse-acquire teardown.
    drop(ctx);
    drop(model);
    backend::release();
}

/// Send one event; `false` means the consumer is gone and generation
/// should stop (its drop hook has already raised the cancel flag).
fn emit(events: &EventSender, event: Result<TokenEvent, EngineError>) -> bool {
    events.blocking_send(event).is_ok()
}

/// One full prefill + decode pass.  Every early return has already emitted
/// its terminal event (a `Done` or an error).
fn run_generation(
    model: &LlamaModel,
    ctx: &mut LlamaContext,
    prompt: &str,
    params: &GenerationParams,
    configured_seed: Option<u32>,
    events: &EventSender,
    cancel: &AtomicBool,
) {
    ctx.clear_kv_cache();

    let tokens = match model.str_to_token(prompt, AddBos::Always) {
        Ok(tokens) => tokens,
        Err(e) => {
            emit(
                events,
                Err(EngineError::GenerationFailed(format!(
                    "tokenization failed: {e}"
                ))),
            );
            return;
        }
    };
    if tokens.is_empty() {
        emit(
            events,
            Err(EngineError::GenerationFailed(
                "tokenization produced no tokens".into(),
            )),
        );
        return;
    }
    let n_ctx = ctx.n_ctx();
    if tokens.len() as u32 >= n_ctx {
        emit(
            events,
            Err(EngineError::GenerationFailed(format!(
                "prompt is {} tokens but the context window is {} tokens",
                tokens.len(),
                n_ctx
            ))),
        );
        return;
    }

    // Prefill in fixed-size batches; only the final token needs logits.
    let mut batch = LlamaBatch::new(BATCH_SIZE, 1);
    let last_index = tokens.len() - 1;
    let mut pos: i32 = 0;
    for chunk in tokens.chunks(BATCH_SIZE) {
        if cancel.load(Ordering::SeqCst) {
            emit(events, Ok(TokenEvent::Done(FinishReason::Cancelled)));
            return;
        }
        batch.clear();
        for (i, &token) in chunk.iter().enumerate() {
            let logits = pos as usize + i == last_index;
            if let Err(e) = batch.add(token, pos + i as i32, &[0], logits) {
                emit(
                    events,
                    Err(EngineError::GenerationFailed(format!(
                        "prefill batch add failed: {e}"
                    ))),
                );
                return;
            }
        }
        if let Err(e) = ctx.decode(&mut batch) {
            emit(
                events,
                Err(EngineError::GenerationFailed(format!(
                    "prefill decode failed: {e}"
                ))),
            );
            return;
        }
        pos += chunk.len() as i32;
    }

    let seed = sampler::resolve_seed(configured_seed);
    let mut sampler = sampler::build_chain(params, seed);
    let mut scanner = MarkerScanner::new();
    debug!(prompt_tokens = tokens.len(), seed, max_tokens = params.max_tokens, "decode start");

    for _ in 0..params.max_tokens {
        if cancel.load(Ordering::SeqCst) {
            emit(events, Ok(TokenEvent::Done(FinishReason::Cancelled)));
            return;
        }

        let token = sampler.sample(ctx, batch.n_tokens() - 1);
        sampler.accept(token);

        if model.is_eog_token(token) {
            let flush = scanner.finish();
            if let Some(text) = flush.text {
                if !emit(events, Ok(TokenEvent::Token(text))) {
                    return;
                }
            }
            let reason = match flush.call {
                Some(call) => {
                    if !emit(events, Ok(TokenEvent::ToolCall(call))) {
                        return;
                    }
                    FinishReason::ToolUse
                }
                None => FinishReason::Stop,
            };
            emit(events, Ok(TokenEvent::Done(reason)));
            return;
        }

        let piece = match token_to_piece(model, token) {
            Ok(piece) => piece,
            Err(e) => {
                emit(events, Err(e));
                return;
            }
        };
        for scanned in scanner.push(&piece) {
            let event = match scanned {
                Scanned::Text(text) => TokenEvent::Token(text),
                Scanned::Call(call) => TokenEvent::ToolCall(call),
            };
            if !emit(events, Ok(event)) {
                return;
            }
        }

        batch.clear();
        if let Err(e) = batch.add(token, pos, &[0], true) {
            emit(
                events,
                Err(EngineError::GenerationFailed(format!(
                    "decode batch add failed: {e}"
                ))),
            );
            return;
        }
        if let Err(e) = ctx.decode(&mut batch) {
            emit(
                events,
                Err(EngineError::GenerationFailed(format!(
                    "decode failed: {e}"
                ))),
            );
            return;
        }
        pos += 1;
    }

    // max_tokens exhausted; flush withheld text so nothing silently vanishes.
    let flush = scanner.finish();
    if let Some(text) = flush.text {
        if !emit(events, Ok(TokenEvent::Token(text))) {
            return;
        }
    }
    if let Some(call) = flush.call {
        if !emit(events, Ok(TokenEvent::ToolCall(call))) {
            return;
        }
    }
    emit(events, Ok(TokenEvent::Done(FinishReason::Length)));
}

/// Convert one token to its UTF-8 piece.
///
/// llama.cpp reports an undersized buffer as a negative byte count; retry
/// once with `-count + 1` bytes.  A piece that splits a multi-byte code
/// point is forwarded lossily rather than failing the stream.
fn token_to_piece(
    model: &LlamaModel,
    token: llama_cpp_2::token::LlamaToken,
) -> Result<String, EngineError> {
    match model.token_to_str_with_size(token, PIECE_BUFFER, Special::Tokenize) {
        Ok(piece) => Ok(piece),
        Err(TokenToStringError::InsufficientBufferSpace(count)) => {
            let needed = (-count + 1).max(1) as usize;
            match model.token_to_str_with_size(token, needed, Special::Tokenize) {
                Ok(piece) => Ok(piece),
                Err(TokenToStringError::FromUtf8Error(e)) => {
                    Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
                }
                Err(e) => Err(EngineError::GenerationFailed(format!(
                    "token decode failed: {e}"
                ))),
            }
        }
        Err(TokenToStringError::FromUtf8Error(e)) => {
            warn!("token piece split a code point; forwarding lossily");
            Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
        Err(e) => Err(EngineError::GenerationFailed(format!(
            "token decode failed: {e}"
        ))),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn missing_model_engine() -> LlamaEngine {
        LlamaEngine::new(EngineConfig::for_model("/nonexistent/model.gguf"))
    }

    #[tokio::test]
    async fn load_fails_for_missing_model_file() {
        let engine = missing_model_engine();
        match engine.load().await {
            Err(EngineError::ModelNotFound(path)) => {
                assert!(path.to_string_lossy().contains("nonexistent"));
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
        assert!(!engine.is_loaded());
        assert_eq!(engine.state(), EngineState::Unloaded);
    }

    #[tokio::test]
    async fn generate_before_load_is_rejected() {
        let engine = missing_model_engine();
        let result = engine
            .generate(&[Message::user("hi")], &GenerationParams::default())
            .await;
        assert!(matches!(result, Err(EngineError::ModelNotLoaded)));
    }

    #[tokio::test]
    async fn unload_before_load_is_a_noop() {
        let engine = missing_model_engine();
        engine.unload().await;
        assert_eq!(engine.state(), EngineState::Unloaded);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let engine = missing_model_engine();
        engine.cancel();
        engine.cancel();
        assert!(engine.cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn load_fails_cleanly_for_invalid_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-model.gguf");
        std::fs::write(&path, b"definitely not a gguf file").unwrap();
        let engine = LlamaEngine::new(EngineConfig::for_model(&path));
        match engine.load().await {
            Err(EngineError::FailedToLoad(_)) => {}
            other => panic!("expected FailedToLoad, got {other:?}"),
        }
        assert!(!engine.is_loaded());
        assert_eq!(engine.state(), EngineState::Unloaded);
    }

    #[test]
    fn context_threads_leaves_headroom() {
        assert!(context_threads() >= 1);
    }

    #[test]
    fn small_context_requests_are_raised_to_the_floor() {
        assert_eq!(effective_context(100), 512);
        assert_eq!(effective_context(512), 512);
        assert_eq!(effective_context(8192), 8192);
    }

    #[test]
    fn default_params_come_from_the_configuration() {
        let mut config = EngineConfig::for_model("/m.gguf");
        config.temperature = 0.3;
        config.top_p = 0.8;
        let engine = LlamaEngine::new(config);
        let params = engine.default_params();
        assert_eq!(params.temperature, 0.3);
        assert_eq!(params.top_p, 0.8);
        assert_eq!(params.max_tokens, GenerationParams::default().max_tokens);
    }

    #[test]
    fn stream_drop_sets_cancel_flag() {
        let (_tx, rx) = mpsc::channel::<Result<TokenEvent, EngineError>>(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let stream = GenerationStream { events: rx, cancel: Arc::clone(&cancel) };
        drop(stream);
        assert!(cancel.load(Ordering::SeqCst));
    }
}
