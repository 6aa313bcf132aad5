// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolInvocation, ToolOutput};

pub struct WriteFileTool {
    pub working_dir: PathBuf,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content. Parent directories\n\
         are created as needed. Prefer edit_file for small changes to existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or workdir-relative path" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let path = match call.str_arg("path") {
            Ok(p) => super::resolve(&self.working_dir, p),
            Err(out) => return out,
        };
        let content = match call.str_arg("content") {
            Ok(c) => c.to_string(),
            Err(out) => return out,
        };

        debug!(path = %path.display(), bytes = content.len(), "write_file");

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.call_id, format!("mkdir error: {e}"));
            }
        }
        match tokio::fs::write(&path, &content).await {
            Ok(()) => ToolOutput::ok(
                &call.call_id,
                format!("wrote {} bytes to {}", content.len(), path.display()),
            ),
            Err(e) => ToolOutput::err(&call.call_id, format!("write error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
