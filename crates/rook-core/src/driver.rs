// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rook_model::{
    LanguageModel, Message, MessagePayload, MessageSource, ThinkingOptions, ToolCallMsg,
    ToolChoice, THINKING_SINK_CAPACITY,
};
use rook_tools::{ApprovalGate, ToolInvocation, ToolManager, ToolOutput};

use crate::compact::Compactor;
use crate::events::{summarize_args, AgentEvent};
use crate::situation::SituationInjector;
use crate::store::MessageStore;

/// Error text paired to a staged call when the user declines it.
pub const CANCELLED_BY_USER: &str = "Operation cancelled by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Idle,
    Running,
    WaitingForApproval,
    Completed,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The cancellation token fired at a checkpoint.  History up to the
    /// last completed step is preserved; nothing partial was appended.
    #[error("operation cancelled")]
    Cancelled,
    /// The iteration cap was reached without a terminal response.
    #[error("exceeded maximum loop limit ({0} iterations)")]
    IterationLimit(u32),
    /// The model returned something other than the four allowed variants.
    #[error("model returned an unexpected message variant")]
    UnexpectedModelOutput,
    /// Provider failure — fatal to this invocation, history preserved.
    #[error("model error: {0}")]
    Model(anyhow::Error),
}

/// How one `run`/`resume` call ended, when it did not fail.
#[derive(Debug)]
pub enum Outcome {
    /// Terminal assistant answer.
    Completed(Message),
    /// A gated tool call is staged; the caller decides, then calls
    /// `resume` (optionally after `cancel_pending_tool_call`).
    WaitingForApproval { call_id: String, tool_name: String },
}

/// The ReAct loop: model call → dispatch → tool execution → repeat.
///
/// Single-tasked per session.  The store lock is taken only for short
/// synchronous sections, never across an await.
pub struct ReactDriver {
    model: Arc<dyn LanguageModel>,
    tools: Option<Arc<dyn ToolManager>>,
    store: Arc<RwLock<MessageStore>>,
    situation: SituationInjector,
    compactor: Compactor,
    approval: ApprovalGate,
    /// Server mode: every gated call executes without staging.
    auto_approve: bool,
    max_iterations: u32,
    enable_thinking: bool,
    status: DriverStatus,
    iteration: u32,
    /// Tool calls awaiting execution.  Non-empty across a return only in
    /// the approval path, with the staged call at the front.
    queue: VecDeque<ToolCallMsg>,
    /// Set by `resume` so the staged front call runs without re-gating.
    front_approved: bool,
    /// The staged call was declined and already paired with a cancelled
    /// result; the next `resume` must re-gate whatever is now at the front.
    pending_cancelled: bool,
}

impl ReactDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: Option<Arc<dyn ToolManager>>,
        store: Arc<RwLock<MessageStore>>,
        compactor: Compactor,
        approval: ApprovalGate,
        max_iterations: u32,
        enable_thinking: bool,
    ) -> Self {
        Self {
            model,
            tools,
            store,
            situation: SituationInjector,
            compactor,
            approval,
            auto_approve: false,
            max_iterations,
            enable_thinking,
            status: DriverStatus::Idle,
            iteration: 0,
            queue: VecDeque::new(),
            front_approved: false,
            pending_cancelled: false,
        }
    }

    /// Execute gated tools without staging (server mode).
    pub fn with_auto_approve(mut self) -> Self {
        self.auto_approve = true;
        self
    }

    pub fn status(&self) -> DriverStatus {
        self.status
    }

    /// The staged pending call, when waiting for approval.
    pub fn pending_call(&self) -> Option<&ToolCallMsg> {
        if self.status == DriverStatus::WaitingForApproval {
            self.queue.front()
        } else {
            None
        }
    }

    /// Append the user turn and drive the loop to an outcome.
    pub async fn run(
        &mut self,
        input: &str,
        images: Vec<String>,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DriverError> {
        self.status = DriverStatus::Running;
        self.iteration = 0;
        self.queue.clear();
        self.front_approved = false;
        {
            let mut store = self.store.write().unwrap();
            if images.is_empty() {
                store.append(Message::user(input));
            } else {
                store.append(Message::user_with_images(input, images));
            }
        }
        self.drive(events, cancel).await
    }

    /// Continue after an approval decision.
    ///
    /// The staged call executes (unless it was cancelled first, in which
    /// case its declined result is already paired) and the loop proceeds.
    pub async fn resume(
        &mut self,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DriverError> {
        self.status = DriverStatus::Running;
        self.front_approved = !self.pending_cancelled;
        self.pending_cancelled = false;
        self.drive(events, cancel).await
    }

    /// Decline the staged call: pair it with a cancelled result so the
    /// call/result invariant holds, and drop it from the queue.
    pub fn cancel_pending_tool_call(&mut self) {
        if let Some(call) = self.queue.pop_front() {
            debug!(call_id = %call.call_id, tool = %call.tool_name, "pending tool call declined");
            self.store
                .write()
                .unwrap()
                .append(Message::tool_error(&call.call_id, CANCELLED_BY_USER));
            self.front_approved = false;
            self.pending_cancelled = true;
        }
    }

    // ── Loop ──────────────────────────────────────────────────────────────────

    async fn drive(
        &mut self,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DriverError> {
        // Resume path: finish any queued tool work before the next model turn.
        if self.queue.is_empty() {
            self.front_approved = false;
        } else if let Some(outcome) = self.process_queue(events, cancel).await? {
            return Ok(outcome);
        }

        loop {
            if cancel.is_cancelled() {
                self.status = DriverStatus::Idle;
                return Err(DriverError::Cancelled);
            }
            self.iteration += 1;
            if self.iteration > self.max_iterations {
                self.status = DriverStatus::Idle;
                return Err(DriverError::IterationLimit(self.max_iterations));
            }

            // Ephemeral-state housekeeping, then fresh per-iteration guidance.
            {
                let mut store = self.store.write().unwrap();
                store.remove_by_source(MessageSource::Situation);
                store.cleanup_mandatory();
                self.situation
                    .inject(&mut store, self.iteration, self.max_iterations);
            }

            if let Some((before, after)) = self.compactor.compact_if_needed(&self.store).await {
                let _ = events
                    .send(AgentEvent::Compacted {
                        tokens_before: before,
                        tokens_after: after,
                    })
                    .await;
            }

            let response = self.one_model_turn(events).await?;

            if let Some(usage) = self.model.last_token_usage() {
                self.store.write().unwrap().set_reported_input_tokens(&usage);
                let _ = events.send(AgentEvent::TokenUsage(usage)).await;
            }

            match response.payload.clone() {
                MessagePayload::Reasoning { .. } => {
                    self.store.write().unwrap().append(self.annotated(response));
                    continue;
                }
                MessagePayload::AssistantChat { .. } => {
                    let annotated = self.annotated(response);
                    {
                        // Guidance injected this iteration must not outlive
                        // the turn it guided.
                        let mut store = self.store.write().unwrap();
                        store.remove_by_source(MessageSource::Situation);
                        store.append(annotated.clone());
                    }
                    let _ = events.send(AgentEvent::Response(annotated.clone())).await;
                    self.status = DriverStatus::Completed;
                    return Ok(Outcome::Completed(annotated));
                }
                MessagePayload::ToolCall(call) => {
                    // Tool-call turns consume no output tokens beyond the
                    // input already counted; store them unannotated.
                    self.store.write().unwrap().append(response);
                    self.queue = VecDeque::from([call]);
                    if let Some(outcome) = self.process_queue(events, cancel).await? {
                        return Ok(outcome);
                    }
                }
                MessagePayload::ToolCallBatch { calls } => {
                    self.store.write().unwrap().append(response);
                    self.queue = calls.into();
                    if let Some(outcome) = self.process_queue(events, cancel).await? {
                        return Ok(outcome);
                    }
                }
                _ => {
                    self.status = DriverStatus::Idle;
                    return Err(DriverError::UnexpectedModelOutput);
                }
            }
        }
    }

    /// One completion over the pairing-safe history, with the thinking
    /// sink fanned out to the event channel by a forwarder task.
    async fn one_model_turn(
        &mut self,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<Message, DriverError> {
        let history = self.store.read().unwrap().valid_history(0);

        let (thinking, forwarder) = if self.enable_thinking {
            let (sink_tx, mut sink_rx) = mpsc::channel::<String>(THINKING_SINK_CAPACITY);
            let events = events.clone();
            let task = tokio::spawn(async move {
                while let Some(delta) = sink_rx.recv().await {
                    let _ = events.send(AgentEvent::ThinkingDelta(delta)).await;
                }
            });
            (ThinkingOptions::streaming(sink_tx), Some(task))
        } else {
            (ThinkingOptions::disabled(), None)
        };

        let schemas: Vec<rook_model::ToolSchema> = self
            .tools
            .as_ref()
            .map(|t| {
                t.tools()
                    .into_iter()
                    .map(|s| rook_model::ToolSchema {
                        name: s.name,
                        description: s.description,
                        parameters: s.parameters,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let result = if !schemas.is_empty() && self.model.supports_tool_choice() {
            self.model
                .chat_with_tools(&history, &schemas, ToolChoice::Auto, thinking)
                .await
        } else {
            self.model.chat(&history, thinking).await
        };

        if let Some(task) = forwarder {
            // Sender sides are dropped with `thinking`; the forwarder
            // drains whatever is buffered and exits.
            let _ = task.await;
        }

        match result {
            Ok(message) => Ok(message),
            Err(e) => {
                self.status = DriverStatus::Idle;
                Err(DriverError::Model(e))
            }
        }
    }

    fn annotated(&self, message: Message) -> Message {
        match self.model.last_token_usage() {
            Some(usage) if !message.is_tool_call() => message.with_usage(usage),
            _ => message,
        }
    }

    // ── Tool execution ────────────────────────────────────────────────────────

    /// Run queued tool calls in order.  Returns `Some(outcome)` when a
    /// gated call was staged; `None` when the queue drained.
    async fn process_queue(
        &mut self,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<Option<Outcome>, DriverError> {
        while let Some(front) = self.queue.front().cloned() {
            if cancel.is_cancelled() {
                self.status = DriverStatus::Idle;
                return Err(DriverError::Cancelled);
            }
            let gated = !self.auto_approve
                && self.approval.requires_approval(&front.tool_name, &front.args);
            if gated && !self.front_approved {
                self.status = DriverStatus::WaitingForApproval;
                let _ = events
                    .send(AgentEvent::WaitingForApproval {
                        call_id: front.call_id.clone(),
                        tool_name: front.tool_name.clone(),
                    })
                    .await;
                return Ok(Some(Outcome::WaitingForApproval {
                    call_id: front.call_id,
                    tool_name: front.tool_name,
                }));
            }
            self.front_approved = false;
            self.queue.pop_front();
            self.execute_one(front, events).await;
        }
        Ok(None)
    }

    async fn execute_one(&mut self, call: ToolCallMsg, events: &mpsc::Sender<AgentEvent>) {
        let _ = events
            .send(AgentEvent::ToolCallStart {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                args: summarize_args(&Value::Object(call.args.clone())),
            })
            .await;

        let invocation = ToolInvocation::new(&call.call_id, &call.tool_name, call.args.clone());
        let output = match &self.tools {
            Some(tools) => match tools.call(&invocation).await {
                Ok(output) => output,
                Err(e) => {
                    // Infrastructure failure becomes an in-band result so
                    // the model can see it and recover; the loop never
                    // aborts on tool transport errors.
                    warn!(tool = %call.tool_name, error = %e, "tool manager failure");
                    ToolOutput::err(&call.call_id, format!("Tool execution failed: {e}"))
                }
            },
            None => ToolOutput::err(&call.call_id, format!("unknown tool: {}", call.tool_name)),
        };

        let shown = if output.is_error() {
            output.error.clone()
        } else {
            output.text.clone()
        };
        let _ = events
            .send(AgentEvent::ToolResult {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                output: shown,
                is_error: output.is_error(),
            })
            .await;

        self.store
            .write()
            .unwrap()
            .append(Message::new(MessagePayload::ToolResult {
                call_id: output.call_id,
                text: output.text,
                images: output.images,
                error: output.error,
            }));
    }
}
