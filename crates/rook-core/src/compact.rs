// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use rook_model::{LanguageModel, Message, MessagePayload, MessageSource, ThinkingOptions};

use crate::store::MessageStore;

/// Compaction fires only when the prompt fills this fraction of the window…
const TRIGGER_RATIO: f64 = 0.70;
/// …and rewriting down to this fraction would save at least
/// [`MIN_SAVINGS_TOKENS`].  Both conditions together keep the decision
/// deterministic and prevent thrashing near the threshold.
const TARGET_RATIO: f64 = 0.35;
const MIN_SAVINGS_TOKENS: u64 = 5_000;

/// Block-based split: keep at least this many complete user-initiated
/// blocks, covering at least this many messages, with at least this many
/// older messages left to summarize.
const MIN_PRESERVED_BLOCKS: usize = 5;
const MIN_PRESERVED_MESSAGES: usize = 10;
const MIN_OLDER_MESSAGES: usize = 5;

/// Message-count fallback keeps this many recent messages.
const FALLBACK_KEEP_RECENT: usize = 10;

/// Prefix of the summary system message written at index 0.
pub const SUMMARY_PREFIX: &str = "# Previous Conversation Summary\n";

const SUMMARY_PROMPT: &str = "Summarize the conversation transcript below in at most 200 words. \
     Focus on: the main topics discussed, key findings and decisions, any context that must be \
     preserved for the conversation to continue correctly, and ongoing or unfinished tasks. \
     Reply with the summary only.";

/// Characters of each tool result kept in the rendered transcript.
const TRANSCRIPT_RESULT_CHARS: usize = 200;

// ─── Decision ────────────────────────────────────────────────────────────────

/// Deterministic trigger: fires iff the estimate fills ≥70% of the window
/// AND compacting to the 35% target would save ≥5000 tokens.
pub fn should_compact(estimated_tokens: u64, context_window: usize) -> bool {
    if context_window == 0 {
        return false;
    }
    let ratio = estimated_tokens as f64 / context_window as f64;
    if ratio < TRIGGER_RATIO {
        return false;
    }
    let target = (context_window as f64 * TARGET_RATIO) as u64;
    estimated_tokens.saturating_sub(target) >= MIN_SAVINGS_TOKENS
}

// ─── Split selection ─────────────────────────────────────────────────────────

/// True when cutting the log at `i` strands no tool pair: every ToolCall in
/// `[0..i)` has its result in the prefix, and every ToolResult in `[i..)`
/// has its call in the suffix.
fn is_safe_split(messages: &[Message], i: usize) -> bool {
    let (prefix, suffix) = messages.split_at(i);

    let prefix_results: HashSet<&str> =
        prefix.iter().filter_map(Message::result_call_id).collect();
    for m in prefix {
        if m.tool_call_ids().iter().any(|id| !prefix_results.contains(id)) {
            return false;
        }
    }

    let suffix_calls: HashSet<&str> = suffix.iter().flat_map(Message::tool_call_ids).collect();
    for m in suffix {
        if let Some(id) = m.result_call_id() {
            if !suffix_calls.contains(id) {
                return false;
            }
        }
    }
    true
}

/// Preferred strategy: cut at the start of a recent user-initiated block.
///
/// Walks backwards collecting blocks (a block starts at a `UserChat`) until
/// at least [`MIN_PRESERVED_BLOCKS`] complete blocks spanning at least
/// [`MIN_PRESERVED_MESSAGES`] messages are preserved.  The resulting index
/// must leave [`MIN_OLDER_MESSAGES`] older messages to summarize and must
/// be a safe split, otherwise `None`.
fn find_block_split(messages: &[Message]) -> Option<usize> {
    let mut blocks = 0usize;
    for i in (0..messages.len()).rev() {
        if matches!(messages[i].payload, MessagePayload::UserChat { .. }) {
            blocks += 1;
            let preserved = messages.len() - i;
            if blocks >= MIN_PRESERVED_BLOCKS && preserved >= MIN_PRESERVED_MESSAGES {
                if i >= MIN_OLDER_MESSAGES && is_safe_split(messages, i) {
                    return Some(i);
                }
                return None;
            }
        }
    }
    None
}

/// Message-count fallback: aim to keep the last [`FALLBACK_KEEP_RECENT`]
/// messages, then walk the split index backwards until it is safe.
/// Returns `None` when no safe index above zero exists.
pub fn find_safe_split_point(messages: &[Message], desired: usize) -> Option<usize> {
    let desired = desired.min(messages.len());
    (1..=desired).rev().find(|&i| is_safe_split(messages, i))
}

fn choose_split(messages: &[Message]) -> Option<usize> {
    if let Some(i) = find_block_split(messages) {
        return Some(i);
    }
    let desired = messages.len().checked_sub(FALLBACK_KEEP_RECENT)?;
    find_safe_split_point(messages, desired)
}

// ─── Transcript + summaries ──────────────────────────────────────────────────

/// Render messages to the compact plain-text transcript embedded in the
/// summary prompt.  System messages are skipped; embedded images become an
/// inline marker; tool results are truncated hard.
fn render_transcript(messages: &[Message]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for m in messages {
        match &m.payload {
            MessagePayload::UserChat { text, images } => {
                let marker = if images.is_empty() { "" } else { " [image omitted]" };
                lines.push(format!("User: {text}{marker}"));
            }
            MessagePayload::AssistantChat { text, .. } => {
                lines.push(format!("Assistant: {text}"));
            }
            MessagePayload::Reasoning { text } => {
                lines.push(format!("Assistant (reasoning): {text}"));
            }
            MessagePayload::SystemChat { .. } => {}
            MessagePayload::ToolCall(c) => {
                lines.push(format!("Tool used: {}", c.tool_name));
            }
            MessagePayload::ToolCallBatch { calls } => {
                for c in calls {
                    lines.push(format!("Tool used: {}", c.tool_name));
                }
            }
            MessagePayload::ToolResult { text, images, error, .. } => {
                let body = if error.is_empty() { text } else { error };
                let mut shown: String = body.chars().take(TRANSCRIPT_RESULT_CHARS).collect();
                if body.chars().count() > TRANSCRIPT_RESULT_CHARS {
                    shown.push('…');
                }
                let marker = if images.is_empty() { "" } else { " [image omitted]" };
                lines.push(format!("Tool result: {shown}{marker}"));
            }
        }
    }
    lines.join("\n")
}

/// Deterministic summary used when the model call fails: message counts
/// plus the leading topics, so the replacement is never empty.
fn fallback_summary(messages: &[Message]) -> String {
    let user_turns = messages
        .iter()
        .filter(|m| matches!(m.payload, MessagePayload::UserChat { .. }))
        .count();
    let tool_calls: usize = messages.iter().map(|m| m.tool_call_ids().len()).sum();
    let topics: Vec<String> = messages
        .iter()
        .filter(|m| matches!(m.payload, MessagePayload::UserChat { .. }))
        .take(3)
        .filter_map(|m| m.text())
        .map(|t| {
            let head: Vec<&str> = t.split_whitespace().take(8).collect();
            head.join(" ")
        })
        .collect();
    let mut out = format!(
        "Earlier conversation ({user_turns} user messages, {tool_calls} tool calls) was compacted."
    );
    if !topics.is_empty() {
        out.push_str(" Topics: ");
        out.push_str(&topics.join("; "));
        out.push('.');
    }
    out
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Token-threshold compaction with an LLM-generated summary.
pub struct Compactor {
    model: Arc<dyn LanguageModel>,
    context_window: usize,
}

impl Compactor {
    pub fn new(model: Arc<dyn LanguageModel>, context_window: usize) -> Self {
        Self {
            model,
            context_window,
        }
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Compact the store when the budget demands it.
    ///
    /// Returns `Some((tokens_before, tokens_after))` when a rewrite
    /// happened.  A failing summary model call falls back to the
    /// deterministic summary — compaction is never fatal to an invoke.
    /// The store lock is not held across the model call.
    pub async fn compact_if_needed(
        &self,
        store: &Arc<RwLock<MessageStore>>,
    ) -> Option<(u64, u64)> {
        let (estimated, snapshot) = {
            let guard = store.read().unwrap();
            (guard.estimated_input_tokens(), guard.messages().to_vec())
        };
        if !should_compact(estimated, self.context_window) {
            return None;
        }
        let Some(split) = choose_split(&snapshot) else {
            debug!("compaction skipped: no safe split point");
            return None;
        };

        let (older, recent) = snapshot.split_at(split);
        let transcript = render_transcript(older);
        let summary = match self
            .model
            .chat(
                &[Message::user(format!("{SUMMARY_PROMPT}\n\n---\n\n{transcript}"))],
                ThinkingOptions::disabled(),
            )
            .await
        {
            Ok(reply) => match reply.text() {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => {
                    warn!("summary model returned empty text, using deterministic fallback");
                    fallback_summary(older)
                }
            },
            Err(e) => {
                warn!(error = %e, "summary model call failed, using deterministic fallback");
                fallback_summary(older)
            }
        };

        let mut rebuilt: Vec<Message> = Vec::with_capacity(recent.len() + 1);
        rebuilt.push(Message::system_tagged(
            format!("{SUMMARY_PREFIX}{summary}"),
            MessageSource::Summary,
        ));
        rebuilt.extend(
            recent
                .iter()
                .filter(|m| m.source != MessageSource::Situation)
                .cloned(),
        );

        let mut guard = store.write().unwrap();
        guard.replace(rebuilt);
        let after = guard.estimated_input_tokens();
        debug!(before = estimated, after, split, "compacted conversation");
        Some((estimated, after))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
