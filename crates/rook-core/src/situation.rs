// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use rook_model::{Message, MessagePayload, MessageSource};

use crate::store::MessageStore;

/// Tool-result substrings that earn an extra "wrap it up" nudge.
const SUCCESS_HINTS: &[&str] = &["All validation checks passed", "Code compiles successfully"];

/// Injects at most one ephemeral guidance message per loop iteration.
///
/// Everything appended here carries `source=Situation`, so the next
/// iteration's cleanup removes it before the model sees stale guidance.
/// Rules are checked in order; the first match wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct SituationInjector;

impl SituationInjector {
    /// Called once per iteration with the current iteration number
    /// (1-based) and the configured cap.
    pub fn inject(&self, store: &mut MessageStore, current_iter: u32, iter_cap: u32) {
        if let Some(text) = self.guidance(store, current_iter, iter_cap) {
            store.append(Message::system_tagged(text, MessageSource::Situation));
        }
    }

    fn guidance(&self, store: &MessageStore, current_iter: u32, iter_cap: u32) -> Option<String> {
        if current_iter >= iter_cap.saturating_sub(1) {
            return Some(format!(
                "IMPORTANT: This is iteration {current_iter}/{iter_cap}. Conclude your work now: \
                 produce your final answer without further tool calls."
            ));
        }

        let last = store.last()?;
        let MessagePayload::ToolResult { images, text, error, .. } = &last.payload else {
            return None;
        };

        if !images.is_empty() {
            return Some(
                "The last tool result contains one or more images. Analyze the visual content \
                 directly and conclude with your findings; do not call further tools to \
                 re-examine it."
                    .to_string(),
            );
        }

        let mut nudge = String::from(
            "Analyze the tool result above and decide your next step: either call another \
             tool if more information is required, or conclude with your answer.",
        );
        let body = if error.is_empty() { text } else { error };
        if SUCCESS_HINTS.iter().any(|h| body.contains(h)) {
            nudge.push_str(
                " The result indicates the work is verified; conclude now rather than running \
                 additional checks.",
            );
        }
        Some(nudge)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn situation_texts(store: &MessageStore) -> Vec<&str> {
        store
            .messages()
            .iter()
            .filter(|m| m.source == MessageSource::Situation)
            .filter_map(|m| m.text())
            .collect()
    }

    #[test]
    fn no_injection_on_plain_history() {
        let mut store = MessageStore::in_memory();
        store.append(Message::user("q"));
        SituationInjector.inject(&mut store, 1, 25);
        assert!(situation_texts(&store).is_empty());
    }

    #[test]
    fn final_iteration_warning_takes_priority() {
        let mut store = MessageStore::in_memory();
        store.append(Message::tool_result("c1", "output"));
        SituationInjector.inject(&mut store, 24, 25);
        let texts = situation_texts(&store);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("iteration 24/25"));
        assert!(texts[0].contains("Conclude"));
    }

    #[test]
    fn cap_boundary_is_cap_minus_one() {
        let mut store = MessageStore::in_memory();
        store.append(Message::user("q"));
        SituationInjector.inject(&mut store, 23, 25);
        assert!(situation_texts(&store).is_empty(), "23/25 is not yet final");
        SituationInjector.inject(&mut store, 24, 25);
        assert_eq!(situation_texts(&store).len(), 1);
    }

    #[test]
    fn tool_result_gets_generic_nudge() {
        let mut store = MessageStore::in_memory();
        store.append(Message::tool_result("c1", "some file contents"));
        SituationInjector.inject(&mut store, 2, 25);
        let texts = situation_texts(&store);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Analyze the tool result"));
        assert!(!texts[0].contains("verified"));
    }

    #[test]
    fn image_result_gets_visual_nudge() {
        let mut store = MessageStore::in_memory();
        store.append(Message::tool_result_with_images("c1", "", vec!["AA".into()]));
        SituationInjector.inject(&mut store, 2, 25);
        let texts = situation_texts(&store);
        assert!(texts[0].contains("visual content"));
    }

    #[test]
    fn success_hint_appends_conclude_nudge() {
        for hint in SUCCESS_HINTS {
            let mut store = MessageStore::in_memory();
            store.append(Message::tool_result("c1", format!("…{hint}…")));
            SituationInjector.inject(&mut store, 2, 25);
            let texts = situation_texts(&store);
            assert!(texts[0].contains("conclude now"), "hint: {hint}");
        }
    }

    #[test]
    fn injected_messages_are_situation_sourced() {
        let mut store = MessageStore::in_memory();
        store.append(Message::tool_result("c1", "x"));
        SituationInjector.inject(&mut store, 2, 25);
        assert_eq!(store.last().unwrap().source, MessageSource::Situation);
        // The next iteration's cleanup removes it again.
        store.cleanup_mandatory();
        assert!(situation_texts(&store).is_empty());
    }
}
