// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolInvocation, ToolOutput};

/// Replace one occurrence of `old` with `new` in `text`.
///
/// The match must be unique: zero matches and multiple matches are both
/// errors, so the model cannot silently edit the wrong site.
fn apply_edit(text: &str, old: &str, new: &str) -> Result<String, String> {
    let count = text.matches(old).count();
    match count {
        0 => Err("old_str not found in file".to_string()),
        1 => Ok(text.replacen(old, new, 1)),
        n => Err(format!(
            "old_str matches {n} locations; include more surrounding context to make it unique"
        )),
    }
}

pub struct EditFileTool {
    pub working_dir: PathBuf,
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace exactly one occurrence of old_str with new_str in a file.\n\
         old_str must match uniquely; include surrounding lines to disambiguate."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "old_str": { "type": "string", "description": "Exact text to replace (unique)" },
                "new_str": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_str", "new_str"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let path = match call.str_arg("path") {
            Ok(p) => super::resolve(&self.working_dir, p),
            Err(out) => return out,
        };
        let (old, new) = match (call.str_arg("old_str"), call.str_arg("new_str")) {
            (Ok(o), Ok(n)) => (o.to_string(), n.to_string()),
            (Err(out), _) | (_, Err(out)) => return out,
        };

        debug!(path = %path.display(), "edit_file");

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.call_id, format!("read error: {e}")),
        };
        let edited = match apply_edit(&text, &old, &new) {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.call_id, e),
        };
        match tokio::fs::write(&path, edited).await {
            Ok(()) => ToolOutput::ok(&call.call_id, format!("edited {}", path.display())),
            Err(e) => ToolOutput::err(&call.call_id, format!("write error: {e}")),
        }
    }
}

/// Sequential variant of [`EditFileTool`]: applies an ordered list of
/// old/new pairs to one file.  The whole batch is atomic — any failing
/// edit aborts before the file is written.
pub struct MultiEditTool {
    pub working_dir: PathBuf,
}

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "multi_edit"
    }

    fn description(&self) -> &str {
        "Apply several old_str/new_str replacements to one file in order.\n\
         All edits must succeed or none are written."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_str": { "type": "string" },
                            "new_str": { "type": "string" }
                        },
                        "required": ["old_str", "new_str"]
                    }
                }
            },
            "required": ["path", "edits"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let path = match call.str_arg("path") {
            Ok(p) => super::resolve(&self.working_dir, p),
            Err(out) => return out,
        };
        let edits = match call.args.get("edits").and_then(Value::as_array) {
            Some(e) if !e.is_empty() => e.clone(),
            _ => {
                return ToolOutput::err(
                    &call.call_id,
                    "missing required non-empty array parameter 'edits'",
                )
            }
        };

        debug!(path = %path.display(), edits = edits.len(), "multi_edit");

        let mut text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.call_id, format!("read error: {e}")),
        };
        for (i, edit) in edits.iter().enumerate() {
            let old = edit.get("old_str").and_then(Value::as_str).unwrap_or("");
            let new = edit.get("new_str").and_then(Value::as_str).unwrap_or("");
            if old.is_empty() {
                return ToolOutput::err(&call.call_id, format!("edit #{}: empty old_str", i + 1));
            }
            text = match apply_edit(&text, old, new) {
                Ok(t) => t,
                Err(e) => return ToolOutput::err(&call.call_id, format!("edit #{}: {e}", i + 1)),
            };
        }
        match tokio::fs::write(&path, text).await {
            Ok(()) => ToolOutput::ok(
                &call.call_id,
                format!("applied {} edits to {}", edits.len(), path.display()),
            ),
            Err(e) => ToolOutput::err(&call.call_id, format!("write error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
