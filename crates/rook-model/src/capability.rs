// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::{Message, TokenUsage};

/// Conservative context-window assumption used when a model does not report
/// its own limit via [`LanguageModel::max_context_tokens`].
pub const DEFAULT_CONTEXT_TOKENS: usize = 128_000;

/// Minimum capacity for thinking sinks.  Producers write incremental
/// reasoning strings into a bounded channel; a too-small buffer would let a
/// slow consumer stall the model stream.
pub const THINKING_SINK_CAPACITY: usize = 32;

/// A tool definition presented to the model.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

/// Constraint on tool selection for one completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    #[default]
    Auto,
    /// The model must call some tool.
    Any,
    /// The model must call the named tool.
    Tool(String),
    /// The model must not call tools.
    None,
}

/// Per-call thinking configuration.
///
/// When `sink` is set, the adapter streams incremental reasoning strings
/// into it as they arrive; sends must never block indefinitely, so senders
/// come from a bounded channel of at least [`THINKING_SINK_CAPACITY`] and
/// adapters only send non-empty strings.  A `None` sink discards thinking.
#[derive(Debug, Clone, Default)]
pub struct ThinkingOptions {
    pub enabled: bool,
    pub sink: Option<mpsc::Sender<String>>,
}

impl ThinkingOptions {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn streaming(sink: mpsc::Sender<String>) -> Self {
        Self {
            enabled: true,
            sink: Some(sink),
        }
    }
}

/// The model capability consumed by the agent runtime.
///
/// `chat` is the only required operation.  Everything else is an optional
/// capability expressed as a defaulted method, queried by composition —
/// callers never inspect concrete types.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier as reported to users and logs.
    fn model_id(&self) -> &str;

    /// Run one completion over the full message history.
    ///
    /// Returns exactly one of `AssistantChat`, `Reasoning`, `ToolCall`, or
    /// `ToolCallBatch`.  Any other variant is a contract violation the
    /// driver treats as fatal.  Cancellation is honored by the caller
    /// between turns; adapters should also abort in-flight requests when
    /// their transport supports it.
    async fn chat(&self, messages: &[Message], thinking: ThinkingOptions)
        -> anyhow::Result<Message>;

    /// Completion with tool definitions and a tool-choice constraint.
    ///
    /// Only meaningful when [`supports_tool_choice`](Self::supports_tool_choice)
    /// is true; the driver degrades to [`chat`](Self::chat) otherwise.  The
    /// default implementation ignores the tools and delegates to `chat` so
    /// text-only adapters need not override it.
    async fn chat_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _choice: ToolChoice,
        thinking: ThinkingOptions,
    ) -> anyhow::Result<Message> {
        self.chat(messages, thinking).await
    }

    /// Whether this adapter natively understands tool definitions.
    fn supports_tool_choice(&self) -> bool {
        false
    }

    /// Token usage of the most recent completion, when the provider
    /// reports one.  Used for context budgeting; the chars/4 estimate is
    /// the fallback.
    fn last_token_usage(&self) -> Option<TokenUsage> {
        None
    }

    /// Context window of the underlying model.  `None` means unknown;
    /// callers fall back to [`DEFAULT_CONTEXT_TOKENS`].
    fn max_context_tokens(&self) -> Option<usize> {
        None
    }

    /// Provider-side cache key hint.  Adapters that support an explicit
    /// prompt-cache key forward this; the default is a no-op.
    fn set_session_id(&self, _session_id: &str) {}
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
