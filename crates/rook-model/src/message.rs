// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ─── Source tag ───────────────────────────────────────────────────────────────

/// Orthogonal origin tag carried by every message.
///
/// - `Default`: normal conversation content.
/// - `Situation`: ephemeral per-iteration guidance; removed at the top of
///   every loop iteration and never persisted across compaction.
/// - `Summary`: the single system message that replaces an older prefix of
///   the conversation after compaction.  At most one exists at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    #[default]
    Default,
    Situation,
    Summary,
}

// ─── Token usage ──────────────────────────────────────────────────────────────

/// Provider-reported token usage attached to a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub total: u64,
    /// Tokens served from the provider's prompt cache, when reported.
    #[serde(default)]
    pub cached: u64,
    /// Tokens written into the provider's prompt cache, when reported.
    #[serde(default)]
    pub cache_creation: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
            cached: 0,
            cache_creation: 0,
        }
    }
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// One tool invocation inside a [`MessagePayload::ToolCall`] or batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMsg {
    pub call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// The variant content of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// A user turn.  Images are opaque base64 strings or data URLs.
    UserChat { text: String, images: Vec<String> },
    /// A terminal assistant turn; `thinking` is the separate reasoning trace.
    AssistantChat {
        text: String,
        thinking: Option<String>,
    },
    /// Durable system prompt content (skill prompt, skill catalog, summary).
    SystemChat { text: String },
    /// A single tool invocation requested by the model.
    ToolCall(ToolCallMsg),
    /// Several tool invocations emitted in one assistant turn, executed in
    /// order before the next model call.
    ToolCallBatch { calls: Vec<ToolCallMsg> },
    /// The result paired to a ToolCall by `call_id`.  A non-empty `error`
    /// signals failure; the loop continues either way.
    ToolResult {
        call_id: String,
        text: String,
        images: Vec<String>,
        error: String,
    },
    /// An intermediate assistant turn that must not terminate the loop.
    Reasoning { text: String },
}

/// A single entry in the conversation log: common header plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MessageRepr", try_from = "MessageRepr")]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: MessageSource,
    pub token_usage: Option<TokenUsage>,
    pub payload: MessagePayload,
}

impl Message {
    /// Construct a message with a fresh header around `payload`.
    pub fn new(payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: MessageSource::Default,
            token_usage: None,
            payload,
        }
    }

    fn with_payload(payload: MessagePayload) -> Self {
        Self::new(payload)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_payload(MessagePayload::UserChat {
            text: text.into(),
            images: Vec::new(),
        })
    }

    pub fn user_with_images(text: impl Into<String>, images: Vec<String>) -> Self {
        Self::with_payload(MessagePayload::UserChat {
            text: text.into(),
            images,
        })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_payload(MessagePayload::AssistantChat {
            text: text.into(),
            thinking: None,
        })
    }

    pub fn assistant_with_thinking(text: impl Into<String>, thinking: impl Into<String>) -> Self {
        Self::with_payload(MessagePayload::AssistantChat {
            text: text.into(),
            thinking: Some(thinking.into()),
        })
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_payload(MessagePayload::SystemChat { text: text.into() })
    }

    /// System message with an explicit source tag (Situation / Summary).
    pub fn system_tagged(text: impl Into<String>, source: MessageSource) -> Self {
        let mut m = Self::system(text);
        m.source = source;
        m
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::with_payload(MessagePayload::Reasoning { text: text.into() })
    }

    pub fn tool_call(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Map<String, Value>,
    ) -> Self {
        Self::with_payload(MessagePayload::ToolCall(ToolCallMsg {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            args,
        }))
    }

    pub fn tool_call_batch(calls: Vec<ToolCallMsg>) -> Self {
        Self::with_payload(MessagePayload::ToolCallBatch { calls })
    }

    pub fn tool_result(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_payload(MessagePayload::ToolResult {
            call_id: call_id.into(),
            text: text.into(),
            images: Vec::new(),
            error: String::new(),
        })
    }

    pub fn tool_result_with_images(
        call_id: impl Into<String>,
        text: impl Into<String>,
        images: Vec<String>,
    ) -> Self {
        Self::with_payload(MessagePayload::ToolResult {
            call_id: call_id.into(),
            text: text.into(),
            images,
            error: String::new(),
        })
    }

    pub fn tool_error(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::with_payload(MessagePayload::ToolResult {
            call_id: call_id.into(),
            text: String::new(),
            images: Vec::new(),
            error: error.into(),
        })
    }

    /// Attach provider token usage, builder-style.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    /// Plain text of this message, when the variant carries one.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            MessagePayload::UserChat { text, .. }
            | MessagePayload::AssistantChat { text, .. }
            | MessagePayload::SystemChat { text }
            | MessagePayload::Reasoning { text } => Some(text),
            MessagePayload::ToolResult { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(
            self.payload,
            MessagePayload::ToolCall(_) | MessagePayload::ToolCallBatch { .. }
        )
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self.payload, MessagePayload::ToolResult { .. })
    }

    /// All call ids this message introduces (one for ToolCall, N for a batch).
    pub fn tool_call_ids(&self) -> Vec<&str> {
        match &self.payload {
            MessagePayload::ToolCall(c) => vec![c.call_id.as_str()],
            MessagePayload::ToolCallBatch { calls } => {
                calls.iter().map(|c| c.call_id.as_str()).collect()
            }
            _ => vec![],
        }
    }

    /// The call id this message resolves, for ToolResult variants.
    pub fn result_call_id(&self) -> Option<&str> {
        match &self.payload {
            MessagePayload::ToolResult { call_id, .. } => Some(call_id),
            _ => None,
        }
    }

    pub fn has_images(&self) -> bool {
        match &self.payload {
            MessagePayload::UserChat { images, .. }
            | MessagePayload::ToolResult { images, .. } => !images.is_empty(),
            _ => false,
        }
    }

    /// Drop image payloads in place, preserving text and token usage.
    pub fn strip_images(&mut self) {
        match &mut self.payload {
            MessagePayload::UserChat { images, .. }
            | MessagePayload::ToolResult { images, .. } => images.clear(),
            _ => {}
        }
    }

    /// Approximate prompt cost of this message in tokens.
    ///
    /// Character-count heuristic: ⌈chars / 4⌉ plus a flat 8 tokens of
    /// per-message framing overhead.  Image payloads are counted by their
    /// encoded length, which is deliberately pessimistic — it makes the
    /// compaction trigger fire before a vision-heavy session hits the real
    /// window.  Callers prefer the provider-reported count when one exists.
    pub fn approx_tokens(&self) -> u64 {
        let chars = match &self.payload {
            MessagePayload::UserChat { text, images } => {
                text.len() + images.iter().map(String::len).sum::<usize>()
            }
            MessagePayload::AssistantChat { text, thinking } => {
                text.len() + thinking.as_deref().map(str::len).unwrap_or(0)
            }
            MessagePayload::SystemChat { text } | MessagePayload::Reasoning { text } => text.len(),
            MessagePayload::ToolCall(c) => {
                c.tool_name.len() + Value::Object(c.args.clone()).to_string().len()
            }
            MessagePayload::ToolCallBatch { calls } => calls
                .iter()
                .map(|c| c.tool_name.len() + Value::Object(c.args.clone()).to_string().len())
                .sum(),
            MessagePayload::ToolResult {
                text,
                images,
                error,
                ..
            } => text.len() + error.len() + images.iter().map(String::len).sum::<usize>(),
        };
        (chars as u64).div_ceil(4) + 8
    }
}

// ─── Flat serialized form ─────────────────────────────────────────────────────

/// On-disk / on-wire representation.
///
/// Every variant flattens into one object with a `type` discriminator and
/// optional fields; the loader accepts missing optionals so histories
/// written by older builds keep loading.  Tool arguments round-trip through
/// JSON, which widens all numbers to 64-bit floats on read.
#[derive(Serialize, Deserialize)]
struct MessageRepr {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    source: MessageSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    calls: Vec<ToolCallMsg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_usage: Option<TokenUsage>,
}

impl From<Message> for MessageRepr {
    fn from(m: Message) -> Self {
        let mut repr = MessageRepr {
            id: m.id,
            kind: String::new(),
            content: String::new(),
            thinking: None,
            images: Vec::new(),
            timestamp: m.timestamp,
            source: m.source,
            call_id: None,
            tool_name: None,
            args: None,
            calls: Vec::new(),
            result: None,
            error: None,
            token_usage: m.token_usage,
        };
        match m.payload {
            MessagePayload::UserChat { text, images } => {
                repr.kind = "user".into();
                repr.content = text;
                repr.images = images;
            }
            MessagePayload::AssistantChat { text, thinking } => {
                repr.kind = "assistant".into();
                repr.content = text;
                repr.thinking = thinking;
            }
            MessagePayload::SystemChat { text } => {
                repr.kind = "system".into();
                repr.content = text;
            }
            MessagePayload::ToolCall(c) => {
                repr.kind = "tool_call".into();
                repr.call_id = Some(c.call_id);
                repr.tool_name = Some(c.tool_name);
                repr.args = Some(c.args);
            }
            MessagePayload::ToolCallBatch { calls } => {
                repr.kind = "tool_call_batch".into();
                repr.calls = calls;
            }
            MessagePayload::ToolResult {
                call_id,
                text,
                images,
                error,
            } => {
                repr.kind = "tool_result".into();
                repr.call_id = Some(call_id);
                repr.result = Some(text);
                repr.images = images;
                if !error.is_empty() {
                    repr.error = Some(error);
                }
            }
            MessagePayload::Reasoning { text } => {
                repr.kind = "reasoning".into();
                repr.content = text;
            }
        }
        repr
    }
}

impl TryFrom<MessageRepr> for Message {
    type Error = String;

    fn try_from(r: MessageRepr) -> Result<Self, Self::Error> {
        let payload = match r.kind.as_str() {
            "user" => MessagePayload::UserChat {
                text: r.content,
                images: r.images,
            },
            "assistant" => MessagePayload::AssistantChat {
                text: r.content,
                thinking: r.thinking,
            },
            "system" => MessagePayload::SystemChat { text: r.content },
            "tool_call" => MessagePayload::ToolCall(ToolCallMsg {
                call_id: r.call_id.unwrap_or_default(),
                tool_name: r.tool_name.unwrap_or_default(),
                args: r.args.unwrap_or_default(),
            }),
            "tool_call_batch" => MessagePayload::ToolCallBatch { calls: r.calls },
            "tool_result" => MessagePayload::ToolResult {
                call_id: r.call_id.unwrap_or_default(),
                text: r.result.unwrap_or_default(),
                images: r.images,
                error: r.error.unwrap_or_default(),
            },
            "reasoning" => MessagePayload::Reasoning { text: r.content },
            other => return Err(format!("unknown message type '{other}'")),
        };
        Ok(Message {
            id: r.id,
            timestamp: r.timestamp,
            source: r.source,
            token_usage: r.token_usage,
            payload,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
