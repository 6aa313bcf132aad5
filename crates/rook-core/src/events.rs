// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::{Map, Value};

use rook_model::{Message, TokenUsage};

/// Events emitted by the loop driver during one invocation.
///
/// Consumers (CLI, RPC server, gateway) receive these over an `mpsc`
/// channel and translate them to their own surface.  The raw thinking
/// channel never crosses this boundary — only the fanned-out deltas do.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Incremental model reasoning text.
    ThinkingDelta(String),
    /// A tool is about to execute.  `args` is the lossy summary, never the
    /// full argument payload.
    ToolCallStart {
        call_id: String,
        tool_name: String,
        args: Value,
    },
    /// A tool finished.
    ToolResult {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// The terminal assistant message for this invocation.
    Response(Message),
    /// Context compaction statistics.
    Compacted { tokens_before: u64, tokens_after: u64 },
    /// Provider token usage after a completion.
    TokenUsage(TokenUsage),
    /// The driver staged a tool call pending approval.
    WaitingForApproval { call_id: String, tool_name: String },
    /// A non-fatal problem worth surfacing.
    Error(String),
}

/// Limits applied by [`summarize_args`].
const MAX_STRING_CHARS: usize = 120;
const MAX_ARRAY_ELEMS: usize = 8;
const MAX_MAP_ENTRIES: usize = 12;
const MAX_DEPTH: usize = 2;

/// Lossily shrink a tool-argument value for event logs.
///
/// Strings truncate to 120 characters, arrays to 8 elements, objects to 12
/// entries, recursion stops at depth 2.  The full arguments still reach
/// the tool — this shapes only what observers see.
pub fn summarize_args(value: &Value) -> Value {
    summarize(value, 0)
}

fn summarize(value: &Value, depth: usize) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() > MAX_STRING_CHARS {
                let truncated: String = s.chars().take(MAX_STRING_CHARS).collect();
                Value::String(format!("{truncated}…"))
            } else {
                value.clone()
            }
        }
        Value::Array(items) => {
            if depth >= MAX_DEPTH {
                return Value::String(format!("[{} items]", items.len()));
            }
            let mut out: Vec<Value> = items
                .iter()
                .take(MAX_ARRAY_ELEMS)
                .map(|v| summarize(v, depth + 1))
                .collect();
            if items.len() > MAX_ARRAY_ELEMS {
                out.push(Value::String(format!(
                    "…{} more",
                    items.len() - MAX_ARRAY_ELEMS
                )));
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            if depth >= MAX_DEPTH {
                return Value::String(format!("{{{} entries}}", map.len()));
            }
            let mut out = Map::new();
            for (k, v) in map.iter().take(MAX_MAP_ENTRIES) {
                out.insert(k.clone(), summarize(v, depth + 1));
            }
            if map.len() > MAX_MAP_ENTRIES {
                out.insert(
                    "…".to_string(),
                    Value::String(format!("{} more entries", map.len() - MAX_MAP_ENTRIES)),
                );
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_values_pass_through() {
        let v = json!({"path": "src/lib.rs", "limit": 10});
        assert_eq!(summarize_args(&v), v);
    }

    #[test]
    fn long_strings_truncate_to_120() {
        let v = json!("x".repeat(500));
        let out = summarize_args(&v);
        let s = out.as_str().unwrap();
        assert_eq!(s.chars().count(), 121, "120 chars + ellipsis");
        assert!(s.ends_with('…'));
    }

    #[test]
    fn arrays_cap_at_eight_elements() {
        let v = json!((0..20).collect::<Vec<i32>>());
        let out = summarize_args(&v);
        let arr = out.as_array().unwrap();
        assert_eq!(arr.len(), 9, "8 elements + overflow marker");
        assert_eq!(arr[8], json!("…12 more"));
    }

    #[test]
    fn maps_cap_at_twelve_entries() {
        let mut map = Map::new();
        for i in 0..20 {
            map.insert(format!("k{i:02}"), json!(i));
        }
        let out = summarize_args(&Value::Object(map));
        let obj = out.as_object().unwrap();
        assert_eq!(obj.len(), 13, "12 entries + overflow marker");
    }

    #[test]
    fn recursion_stops_at_depth_two() {
        let v = json!({"a": {"b": {"c": {"d": 1}}}});
        let out = summarize_args(&v);
        // Depth 0 = outer object, depth 1 = "a", depth 2 = "b" collapses.
        assert_eq!(out["a"]["b"], json!("{1 entries}"));
    }

    #[test]
    fn scalars_unchanged() {
        assert_eq!(summarize_args(&json!(42)), json!(42));
        assert_eq!(summarize_args(&json!(true)), json!(true));
        assert_eq!(summarize_args(&Value::Null), Value::Null);
    }
}
