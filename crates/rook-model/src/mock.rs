// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::capability::{LanguageModel, ThinkingOptions, ToolChoice, ToolSchema};
use crate::message::{Message, TokenUsage};

/// Deterministic mock model for tests and the `mock` backend.  Echoes the
/// last user message back as the assistant response.
#[derive(Default)]
pub struct MockModel;

#[async_trait]
impl LanguageModel for MockModel {
    fn model_id(&self) -> &str {
        "mock-model"
    }

    async fn chat(
        &self,
        messages: &[Message],
        _thinking: ThinkingOptions,
    ) -> anyhow::Result<Message> {
        let reply = messages
            .iter()
            .rev()
            .find(|m| matches!(m.payload, crate::MessagePayload::UserChat { .. }))
            .and_then(|m| m.text())
            .unwrap_or("[no input]");
        Ok(Message::assistant(format!("MOCK: {reply}")))
    }

    fn last_token_usage(&self) -> Option<TokenUsage> {
        Some(TokenUsage::new(10, 10))
    }
}

/// One pre-programmed reply for [`ScriptedModel`].
#[derive(Clone)]
pub struct ScriptedReply {
    pub message: Message,
    /// Usage reported through `last_token_usage` after this reply.
    pub usage: Option<TokenUsage>,
    /// Thinking deltas streamed into the sink before the reply is returned.
    pub thinking: Vec<String>,
}

impl ScriptedReply {
    pub fn of(message: Message) -> Self {
        Self {
            message,
            usage: Some(TokenUsage::new(25, 12)),
            thinking: Vec::new(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_thinking(mut self, deltas: &[&str]) -> Self {
        self.thinking = deltas.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A pre-scripted model.  Each completion pops the next reply from the
/// front of the queue, so tests can specify exact turn sequences —
/// including tool calls and batches — without network access.
pub struct ScriptedModel {
    replies: Mutex<Vec<ScriptedReply>>,
    last_usage: Mutex<Option<TokenUsage>>,
    context_window: Option<usize>,
    /// The message list of the most recent completion, for test inspection.
    pub last_request: Arc<Mutex<Vec<Message>>>,
    /// Tool schemas passed to the most recent `chat_with_tools` call.
    pub last_tools: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            last_usage: Mutex::new(None),
            context_window: None,
            last_request: Arc::new(Mutex::new(Vec::new())),
            last_tools: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Declare an explicit context window for compaction tests.
    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = Some(tokens);
        self
    }

    /// Convenience: model that always answers with a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![ScriptedReply::of(Message::assistant(reply.into()))])
    }

    /// Convenience: a tool call on turn one, a text reply on turn two.
    pub fn tool_then_text(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Map<String, Value>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ScriptedReply::of(Message::tool_call(call_id, tool_name, args)),
            ScriptedReply::of(Message::assistant(final_text.into())),
        ])
    }

    fn pop(&self) -> ScriptedReply {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            // Fallback when all scripts are consumed, so a miscounted test
            // fails on content rather than hanging.
            ScriptedReply::of(Message::assistant("[no more scripts]"))
        } else {
            replies.remove(0)
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn chat(
        &self,
        messages: &[Message],
        thinking: ThinkingOptions,
    ) -> anyhow::Result<Message> {
        *self.last_request.lock().unwrap() = messages.to_vec();
        let reply = self.pop();
        if thinking.enabled {
            if let Some(sink) = &thinking.sink {
                for delta in &reply.thinking {
                    if !delta.is_empty() {
                        let _ = sink.send(delta.clone()).await;
                    }
                }
            }
        }
        *self.last_usage.lock().unwrap() = reply.usage;
        Ok(reply.message)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        _choice: ToolChoice,
        thinking: ThinkingOptions,
    ) -> anyhow::Result<Message> {
        *self.last_tools.lock().unwrap() = tools.iter().map(|t| t.name.clone()).collect();
        self.chat(messages, thinking).await
    }

    fn supports_tool_choice(&self) -> bool {
        true
    }

    fn last_token_usage(&self) -> Option<TokenUsage> {
        *self.last_usage.lock().unwrap()
    }

    fn max_context_tokens(&self) -> Option<usize> {
        self.context_window
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
