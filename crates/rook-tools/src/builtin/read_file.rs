// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolInvocation, ToolOutput};

/// Lines returned when the caller does not specify a limit.  Kept small so
/// a first read never floods the context; the model paginates with
/// offset + limit for more.
const DEFAULT_LINE_LIMIT: u64 = 200;

/// Byte ceiling applied in addition to the line limit; whichever constraint
/// is hit first cuts the output.
const MAX_BYTES: usize = 20_000;

pub struct ReadFileTool {
    pub working_dir: PathBuf,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Default: 200 lines / 20 KB, whichever comes first.\n\
         Lines are prefixed L{n}: (1-indexed). When more lines exist, a pagination\n\
         notice shows the offset to continue from. Read only the region you need."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or workdir-relative path" },
                "offset": { "type": "integer", "description": "1-indexed first line (default 1)" },
                "limit": { "type": "integer", "description": "Maximum lines to return (default 200)" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let path = match call.str_arg("path") {
            Ok(p) => super::resolve(&self.working_dir, p),
            Err(out) => return out,
        };
        let offset = call.u64_arg("offset").unwrap_or(1).max(1) as usize;
        let limit = call.u64_arg("limit").unwrap_or(DEFAULT_LINE_LIMIT) as usize;

        debug!(path = %path.display(), offset, limit, "read_file");

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.call_id, format!("read error: {e}")),
        };

        let all_lines: Vec<&str> = text.lines().collect();
        let total = all_lines.len();
        let start = offset - 1;

        let mut selected: Vec<String> = Vec::new();
        let mut byte_count = 0usize;
        for (i, line) in all_lines.iter().enumerate().skip(start).take(limit) {
            if byte_count + line.len() + 1 > MAX_BYTES {
                break;
            }
            selected.push(format!("L{}:{}", i + 1, line));
            byte_count += line.len() + 1;
        }

        let last_shown = start + selected.len();
        let mut content = selected.join("\n");
        if last_shown < total {
            content.push_str(&format!(
                "\n...[{} more lines; use offset={} to continue]",
                total - last_shown,
                last_shown + 1
            ));
        }
        ToolOutput::ok(&call.call_id, content)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
