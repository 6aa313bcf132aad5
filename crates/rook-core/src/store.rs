// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use tracing::debug;

use rook_model::{Message, MessagePayload, MessageSource, TokenUsage};

use crate::persist::{HistoryRepository, MemoryHistory};

/// Messages at the tail of the log whose image payloads survive cleanup.
const IMAGE_KEEP_RECENT: usize = 10;

/// Ordered conversation log with token accounting and pairing-aware views.
///
/// Single-tasked access within a session is what actually enforces the
/// tool-call/result pairing invariant; the surrounding `RwLock` (held by
/// the agent) only protects concurrent readers such as previews.
pub struct MessageStore {
    messages: Vec<Message>,
    repo: Box<dyn HistoryRepository>,
    /// Input token count of the most recent provider call, preferred over
    /// the chars/4 estimate when present.
    reported_input_tokens: Option<u64>,
}

impl MessageStore {
    pub fn new(repo: Box<dyn HistoryRepository>) -> Self {
        Self {
            messages: Vec::new(),
            repo,
            reported_input_tokens: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryHistory))
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Remove every message with the given source tag; returns the count.
    pub fn remove_by_source(&mut self, source: MessageSource) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| m.source != source);
        before - self.messages.len()
    }

    /// Remove every system message whose text starts with `prefix`;
    /// returns the count.  Used for marker-keyed context blocks (skill
    /// catalog, skill prompt) where a stale variant must be replaced
    /// rather than accumulated.
    pub fn remove_system_prefixed(&mut self, prefix: &str) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| {
            !matches!(&m.payload, MessagePayload::SystemChat { text } if text.starts_with(prefix))
        });
        before - self.messages.len()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.reported_input_tokens = None;
    }

    /// Replace the whole log (compaction rewrite path).
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        // The provider count described the old history.
        self.reported_input_tokens = None;
    }

    // ── Pairing-aware view ────────────────────────────────────────────────────

    /// The last `limit` messages (0 = all), adjusted so the window is safe
    /// to send to a provider that rejects unpaired tool messages: trailing
    /// tool calls without a matching result are dropped, as are leading
    /// results whose calls fell outside the window.
    pub fn valid_history(&self, limit: usize) -> Vec<Message> {
        let start = if limit == 0 || limit >= self.messages.len() {
            0
        } else {
            self.messages.len() - limit
        };
        let mut window: Vec<Message> = self.messages[start..].to_vec();

        // Drop leading results orphaned by the window cut.
        let call_ids: HashSet<&str> = window
            .iter()
            .flat_map(|m| m.tool_call_ids())
            .collect();
        let orphaned: Vec<String> = window
            .iter()
            .filter_map(|m| m.result_call_id())
            .filter(|id| !call_ids.contains(id))
            .map(str::to_string)
            .collect();
        if !orphaned.is_empty() {
            window.retain(|m| {
                m.result_call_id()
                    .map(|id| !orphaned.iter().any(|o| o == id))
                    .unwrap_or(true)
            });
        }

        // Drop trailing calls that never received a result.
        let result_ids: HashSet<String> = window
            .iter()
            .filter_map(|m| m.result_call_id())
            .map(str::to_string)
            .collect();
        while let Some(last) = window.last() {
            let ids = last.tool_call_ids();
            if !ids.is_empty() && ids.iter().any(|id| !result_ids.contains(*id)) {
                window.pop();
            } else {
                break;
            }
        }
        window
    }

    // ── Mandatory per-iteration cleanup ───────────────────────────────────────

    /// Invoked at the top of every loop iteration.
    ///
    /// 1. Removes all `Summary`- and `Situation`-sourced messages — situation
    ///    content is always ephemeral, and a stale summary must not survive
    ///    into a fresh compaction pass.
    /// 2. Strips image payloads from every message older than the last
    ///    [`IMAGE_KEEP_RECENT`], preserving text and token usage, so vision
    ///    turns stop growing the prompt once they scroll out of recency.
    pub fn cleanup_mandatory(&mut self) {
        let removed = self.remove_by_source(MessageSource::Summary)
            + self.remove_by_source(MessageSource::Situation);
        if removed > 0 {
            debug!(removed, "dropped ephemeral messages");
        }
        let len = self.messages.len();
        if len > IMAGE_KEEP_RECENT {
            for m in &mut self.messages[..len - IMAGE_KEEP_RECENT] {
                m.strip_images();
            }
        }
    }

    // ── Token accounting ──────────────────────────────────────────────────────

    pub fn set_reported_input_tokens(&mut self, usage: &TokenUsage) {
        self.reported_input_tokens = Some(usage.input + usage.cached);
    }

    /// Best available estimate of the prompt size in tokens: the last
    /// provider-reported input count when present, otherwise the summed
    /// per-message character heuristic.
    pub fn estimated_input_tokens(&self) -> u64 {
        self.reported_input_tokens
            .unwrap_or_else(|| self.messages.iter().map(Message::approx_tokens).sum())
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    pub fn load(&mut self) -> anyhow::Result<usize> {
        self.messages = self.repo.load()?;
        self.reported_input_tokens = None;
        Ok(self.messages.len())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.repo.save(&self.messages)
    }

    pub fn clear_persisted(&self) -> anyhow::Result<()> {
        self.repo.clear()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::FileHistory;
    use serde_json::Map;

    fn call(id: &str) -> Message {
        Message::tool_call(id, "read_file", Map::new())
    }

    fn result(id: &str) -> Message {
        Message::tool_result(id, "ok")
    }

    // ── Basic operations ──────────────────────────────────────────────────────

    #[test]
    fn append_preserves_order() {
        let mut s = MessageStore::in_memory();
        s.append(Message::user("one"));
        s.append(Message::assistant("two"));
        assert_eq!(s.len(), 2);
        assert_eq!(s.messages()[0].text(), Some("one"));
        assert_eq!(s.last().unwrap().text(), Some("two"));
    }

    #[test]
    fn remove_system_prefixed_targets_only_marker_messages() {
        let mut s = MessageStore::in_memory();
        s.append(Message::system("[[MARK]]\nstale variant"));
        s.append(Message::user("[[MARK]] in user text stays"));
        s.append(Message::system("unrelated system"));
        assert_eq!(s.remove_system_prefixed("[[MARK]]"), 1);
        assert_eq!(s.len(), 2);
        assert!(s.messages().iter().all(|m| {
            m.text() != Some("[[MARK]]\nstale variant")
        }));
    }

    #[test]
    fn remove_by_source_counts() {
        let mut s = MessageStore::in_memory();
        s.append(Message::user("keep"));
        s.append(Message::system_tagged("a", MessageSource::Situation));
        s.append(Message::system_tagged("b", MessageSource::Situation));
        assert_eq!(s.remove_by_source(MessageSource::Situation), 2);
        assert_eq!(s.len(), 1);
    }

    // ── valid_history ─────────────────────────────────────────────────────────

    #[test]
    fn valid_history_drops_trailing_unpaired_call() {
        let mut s = MessageStore::in_memory();
        s.append(Message::user("q"));
        s.append(call("c1"));
        let h = s.valid_history(0);
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].text(), Some("q"));
    }

    #[test]
    fn valid_history_keeps_paired_call() {
        let mut s = MessageStore::in_memory();
        s.append(Message::user("q"));
        s.append(call("c1"));
        s.append(result("c1"));
        assert_eq!(s.valid_history(0).len(), 3);
    }

    #[test]
    fn valid_history_drops_unpaired_batch() {
        use rook_model::ToolCallMsg;
        let mut s = MessageStore::in_memory();
        s.append(Message::user("q"));
        s.append(Message::tool_call_batch(vec![
            ToolCallMsg { call_id: "a".into(), tool_name: "t".into(), args: Map::new() },
            ToolCallMsg { call_id: "b".into(), tool_name: "t".into(), args: Map::new() },
        ]));
        s.append(result("a"));
        // Result "b" missing — the whole batch message is unsafe.
        let h = s.valid_history(0);
        assert!(h.iter().all(|m| !m.is_tool_call()));
    }

    #[test]
    fn valid_history_limit_drops_orphaned_results() {
        let mut s = MessageStore::in_memory();
        s.append(call("c1"));
        s.append(result("c1"));
        s.append(Message::assistant("done"));
        // Window of 2 would start at the result, orphaning it.
        let h = s.valid_history(2);
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].text(), Some("done"));
    }

    // ── cleanup_mandatory ─────────────────────────────────────────────────────

    #[test]
    fn cleanup_removes_summary_and_situation() {
        let mut s = MessageStore::in_memory();
        s.append(Message::system_tagged("old summary", MessageSource::Summary));
        s.append(Message::user("q"));
        s.append(Message::system_tagged("nudge", MessageSource::Situation));
        s.cleanup_mandatory();
        assert_eq!(s.len(), 1);
        assert_eq!(s.messages()[0].source, MessageSource::Default);
    }

    #[test]
    fn cleanup_strips_images_beyond_last_ten() {
        let mut s = MessageStore::in_memory();
        s.append(Message::user_with_images("old", vec!["AAA".into()]));
        for i in 0..10 {
            s.append(Message::user_with_images(format!("m{i}"), vec!["BBB".into()]));
        }
        s.cleanup_mandatory();
        assert!(!s.messages()[0].has_images(), "old image stripped");
        assert!(
            s.messages()[1..].iter().all(Message::has_images),
            "recent ten keep their images"
        );
        assert_eq!(s.messages()[0].text(), Some("old"));
    }

    #[test]
    fn cleanup_on_short_history_keeps_all_images() {
        let mut s = MessageStore::in_memory();
        for i in 0..5 {
            s.append(Message::user_with_images(format!("m{i}"), vec!["X".into()]));
        }
        s.cleanup_mandatory();
        assert!(s.messages().iter().all(Message::has_images));
    }

    // ── Token accounting ──────────────────────────────────────────────────────

    #[test]
    fn estimate_prefers_reported_count() {
        let mut s = MessageStore::in_memory();
        s.append(Message::user("some text here"));
        let heuristic = s.estimated_input_tokens();
        s.set_reported_input_tokens(&TokenUsage {
            input: 4000,
            cached: 1000,
            ..Default::default()
        });
        assert_eq!(s.estimated_input_tokens(), 5000);
        assert_ne!(s.estimated_input_tokens(), heuristic);
    }

    #[test]
    fn replace_invalidates_reported_count() {
        let mut s = MessageStore::in_memory();
        s.append(Message::user("aaaa"));
        s.set_reported_input_tokens(&TokenUsage::new(9999, 0));
        s.replace(vec![Message::user("b")]);
        assert!(s.estimated_input_tokens() < 100);
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    #[test]
    fn save_and_reload_through_file_repo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        {
            let mut s = MessageStore::new(Box::new(FileHistory::new(path.clone())));
            s.append(Message::user("persisted"));
            s.save().unwrap();
        }
        let mut s2 = MessageStore::new(Box::new(FileHistory::new(path)));
        assert_eq!(s2.load().unwrap(), 1);
        assert_eq!(s2.messages()[0].text(), Some("persisted"));
    }
}
