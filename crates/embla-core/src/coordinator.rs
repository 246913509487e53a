// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use embla_config::{GenerationParams, Persona};
use embla_engine::{FinishReason, InferenceEngine, Message, Role, TokenEvent, ToolCall, ToolResult};
use embla_tools::{ToolOutput, ToolRegistry};

use crate::events::AgentEvent;
use crate::prompts;

/// Upper bound on model ↔ tool round trips for one request.
pub const MAX_TOOL_ITERATIONS: usize = 5;

/// Notice streamed when the model is still calling tools on the final
/// iteration.
const DEPTH_CAP_NOTICE: &str =
    "\n\nI've hit the limit of consecutive tool calls for this request, so \
     I'm stopping here with what I have so far.";

/// Event stream for one request.  Errors are terminal; cancellation ends
/// the stream cleanly without one.
pub type AgentEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<AgentEvent>> + Send>>;

/// Drives the inference engine through a bounded reason-act loop,
/// dispatching tool calls through the registry and streaming
/// [`AgentEvent`]s to the observer.
pub struct AgentCoordinator {
    engine: Arc<dyn InferenceEngine>,
    tools: Arc<ToolRegistry>,
    persona: Persona,
    processing: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl AgentCoordinator {
    pub fn new(engine: Arc<dyn InferenceEngine>, tools: Arc<ToolRegistry>) -> Self {
        Self::with_persona(engine, tools, Persona::default())
    }

    pub fn with_persona(
        engine: Arc<dyn InferenceEngine>,
        tools: Arc<ToolRegistry>,
        persona: Persona,
    ) -> Self {
        Self {
            engine,
            tools,
            persona,
            processing: Arc::new(AtomicBool::new(false)),
            driver: Mutex::new(None),
        }
    }

    /// Whether a request is currently being processed.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Process one conversation and stream the resulting events.
    ///
    /// The conversation is snapshotted; a system message is prepended when
    /// the first message is not one.  The driving task runs detached;
    /// drop the stream and call [`cancel`](Self::cancel) to abort early.
    pub fn process(
        &self,
        messages: Vec<Message>,
        params: GenerationParams,
    ) -> anyhow::Result<AgentEventStream> {
        if self.processing.swap(true, Ordering::SeqCst) {
            anyhow::bail!("a request is already being processed");
        }

        let (tx, rx) = mpsc::channel(64);
        let engine = Arc::clone(&self.engine);
        let tools = Arc::clone(&self.tools);
        let persona = self.persona.clone();
        let processing = Arc::clone(&self.processing);
        let params = params.clamped();

        let handle = tokio::spawn(async move {
            if let Err(e) = run_loop(engine, tools, persona, messages, params, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
            processing.store(false, Ordering::SeqCst);
        });
        *self.driver.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Abort the in-flight request: stop the driving task, interrupt the
    /// engine, and reset the processing flag.  Idempotent; a no-op when
    /// nothing is running.
    pub fn cancel(&self) {
        if let Some(handle) = self.driver.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
        self.engine.cancel();
        self.processing.store(false, Ordering::SeqCst);
    }
}

/// Forward one event; `false` when the observer is gone.
async fn forward(tx: &mpsc::Sender<anyhow::Result<AgentEvent>>, event: AgentEvent) -> bool {
    tx.send(Ok(event)).await.is_ok()
}

async fn run_loop(
    engine: Arc<dyn InferenceEngine>,
    tools: Arc<ToolRegistry>,
    persona: Persona,
    mut conversation: Vec<Message>,
    params: GenerationParams,
    tx: &mpsc::Sender<anyhow::Result<AgentEvent>>,
) -> anyhow::Result<()> {
    // The engine requires a leading system message; synthesize one from the
    // persona and the tool catalog when the caller did not provide it.
    if conversation.first().map(|m| m.role) != Some(Role::System) {
        let system = prompts::system_prompt(&persona, &tools);
        conversation.insert(0, Message::system(system));
    }

    for iteration in 1..=MAX_TOOL_ITERATIONS {
        let mut stream = engine
            .generate(&conversation, &params)
            .await
            .context("engine rejected the generation")?;

        let mut accumulated = String::new();
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut finish = FinishReason::Stop;
        while let Some(event) = stream.next().await {
            match event.context("generation stream failed")? {
                TokenEvent::Token(fragment) => {
                    accumulated.push_str(&fragment);
                    if !forward(tx, AgentEvent::Text(fragment)).await {
                        return Ok(());
                    }
                }
                TokenEvent::ToolCall(call) => {
                    if !forward(tx, AgentEvent::ToolCallStarted { name: call.name.clone() }).await {
                        return Ok(());
                    }
                    pending.push(call);
                }
                TokenEvent::Done(reason) => {
                    finish = reason;
                    break;
                }
            }
        }
        drop(stream);

        if finish == FinishReason::Cancelled {
            debug!(iteration, "generation cancelled; finishing cleanly");
            return Ok(());
        }

        // The engine's finish reason is informational only; small models
        // frequently mislabel it.  Whether tool calls were collected is the
        // authoritative termination signal.
        if pending.is_empty() {
            let _ = forward(tx, AgentEvent::Completed).await;
            return Ok(());
        }

        debug!(iteration, calls = pending.len(), "dispatching tool calls");
        conversation.push(Message::assistant_with_tool_calls(
            accumulated.clone(),
            pending.clone(),
        ));

        for call in &pending {
            if !forward(tx, AgentEvent::ToolExecuting { name: call.name.clone() }).await {
                return Ok(());
            }
            let output = dispatch(&tools, call).await;
            if !forward(
                tx,
                AgentEvent::ToolResult {
                    name: call.name.clone(),
                    content: output.content.clone(),
                },
            )
            .await
            {
                return Ok(());
            }
            conversation.push(Message::tool_result(ToolResult {
                tool_call_id: call.id.clone(),
                content: output.content,
                is_error: output.is_error,
            }));
        }

        if iteration == MAX_TOOL_ITERATIONS {
            warn!("tool-call depth cap reached");
            if forward(tx, AgentEvent::Text(DEPTH_CAP_NOTICE.to_string())).await {
                let _ = forward(tx, AgentEvent::Completed).await;
            }
            return Ok(());
        }
    }

    Ok(())
}

/// Execute one tool call through the registry.
///
/// Never fatal: dispatch errors, execution errors, and panics all come
/// back as error outputs that flow into the conversation so the model can
/// react to them.
async fn dispatch(tools: &Arc<ToolRegistry>, call: &ToolCall) -> ToolOutput {
    let args = parse_arguments(&call.arguments);
    let registry = Arc::clone(tools);
    let name = call.name.clone();
    let task = tokio::spawn(async move { registry.execute_by_name(&name, &args).await });
    match task.await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => ToolOutput::error(format!("Tool '{}' failed: {}", call.name, e)),
        Err(e) => ToolOutput::error(format!("Tool '{}' failed: execution panicked: {}", call.name, e)),
    }
}

/// Parse a serialized argument object defensively: anything that is not a
/// JSON object becomes empty arguments.
fn parse_arguments(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            if !raw.trim().is_empty() {
                warn!(raw, "tool-call arguments are not a JSON object; using empty arguments");
            }
            Map::new()
        }
    }
}
