// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{Tool, ToolInvocation, ToolOutput};

/// Byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;

/// Lines kept from each end when output exceeds the ceiling.  Errors and
/// summaries almost always appear at the end of build/test output, so the
/// tail is at least as important as the head.
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;

pub struct BashTool {
    pub working_dir: PathBuf,
    pub timeout_secs: u64,
}

impl BashTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            timeout_secs: 120,
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command and return stdout + stderr.\n\
         Output is capped at ~20 KB; when larger, the first and last 100 lines are\n\
         kept with an omission marker in the middle. Prefer non-interactive commands;\n\
         for large outputs pipe through tail or grep to keep only what matters."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The bash command to execute" },
                "timeout_secs": { "type": "integer", "description": "Execution timeout (optional)" }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let command = match call.str_arg("command") {
            Ok(c) => c.to_string(),
            Err(out) => return out,
        };
        let timeout = call.u64_arg("timeout_secs").unwrap_or(self.timeout_secs);

        debug!(cmd = %command, timeout, "bash tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.current_dir(&self.working_dir);
        // No controlling-terminal access for the child, and SIGKILL on
        // timeout-drop so the subprocess cannot outlive the call.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(timeout), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stdout.is_empty() {
                    content.push_str(&head_tail_truncate(&stdout));
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("stderr:\n");
                    content.push_str(&head_tail_truncate(&stderr));
                }
                if !output.status.success() {
                    let code = output.status.code().unwrap_or(-1);
                    return ToolOutput::err(
                        &call.call_id,
                        format!("command exited with status {code}\n{content}"),
                    );
                }
                if content.is_empty() {
                    content.push_str("(no output)");
                }
                ToolOutput::ok(&call.call_id, content)
            }
            Ok(Err(e)) => ToolOutput::err(&call.call_id, format!("spawn error: {e}")),
            Err(_) => ToolOutput::err(
                &call.call_id,
                format!("command timed out after {timeout} seconds"),
            ),
        }
    }
}

/// Keep the first [`HEAD_LINES`] and last [`TAIL_LINES`] lines when the
/// content exceeds [`OUTPUT_LIMIT_BYTES`], with an omission marker between.
fn head_tail_truncate(content: &str) -> String {
    if content.len() <= OUTPUT_LIMIT_BYTES {
        return content.to_string();
    }
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= HEAD_LINES + TAIL_LINES {
        // One enormous line: hard cut, snapped down to a char boundary so
        // multibyte output (CJK, emoji) cannot panic the slice.
        let mut cut = OUTPUT_LIMIT_BYTES;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        return format!(
            "{}\n[... {} bytes omitted ...]",
            &content[..cut],
            content.len() - cut
        );
    }
    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[lines.len() - TAIL_LINES..].join("\n");
    let omitted = lines.len() - HEAD_LINES - TAIL_LINES;
    format!("{head}\n[... {omitted} lines omitted ...]\n{tail}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
