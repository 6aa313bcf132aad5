// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolInvocation, ToolOutput};

/// A structured todo item managed by the todo_write tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    /// One of: "pending", "in_progress", "completed", "cancelled"
    pub status: String,
}

/// Session-scoped task list the model maintains for itself.
///
/// The whole list is replaced on every call; the shared handle lets the
/// embedding UI (CLI, server) render the current state.
pub struct TodoWriteTool {
    todos: Arc<Mutex<Vec<TodoItem>>>,
}

impl TodoWriteTool {
    pub fn new(todos: Arc<Mutex<Vec<TodoItem>>>) -> Self {
        Self { todos }
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replace the working todo list. Pass the complete list every time;\n\
         items have id, content, and status (pending|in_progress|completed|cancelled)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "status": { "type": "string" }
                        },
                        "required": ["id", "content", "status"]
                    }
                }
            },
            "required": ["todos"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let raw = match call.args.get("todos") {
            Some(v) => v.clone(),
            None => return ToolOutput::err(&call.call_id, "missing required parameter 'todos'"),
        };
        let items: Vec<TodoItem> = match serde_json::from_value(raw) {
            Ok(items) => items,
            Err(e) => return ToolOutput::err(&call.call_id, format!("invalid todos: {e}")),
        };
        let summary = {
            let done = items.iter().filter(|t| t.status == "completed").count();
            format!("todo list updated: {} items, {} completed", items.len(), done)
        };
        *self.todos.lock().unwrap() = items;
        ToolOutput::ok(&call.call_id, summary)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
