// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::{Map, Value};

/// Tools that always require approval before executing.
const ALWAYS_GATED: &[&str] = &["write_file", "edit_file", "multi_edit"];

/// Return true when `command` matches a whitelist `entry` as a whole-word
/// prefix: the command equals the entry, or continues with whitespace right
/// after it.  `"git status"` whitelists `"git status --short"` but not
/// `"git statusx"`.
pub fn command_whitelisted(command: &str, whitelist: &[String]) -> bool {
    let command = command.trim_start();
    whitelist.iter().any(|entry| {
        let entry = entry.trim();
        if entry.is_empty() {
            return false;
        }
        match command.strip_prefix(entry) {
            Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
            None => false,
        }
    })
}

/// Decides which tool calls must pause for approval.
///
/// The gate is a pure predicate — staging the pending call and resuming
/// after the decision is the loop driver's job.
#[derive(Debug, Clone, Default)]
pub struct ApprovalGate {
    pub bash_whitelist: Vec<String>,
}

impl ApprovalGate {
    pub fn new(bash_whitelist: Vec<String>) -> Self {
        Self { bash_whitelist }
    }

    /// Whether a call to `tool_name` with `args` needs approval.
    ///
    /// Mutating file tools are always gated.  `bash` is gated unless its
    /// command string prefix-matches a whitelist entry; a bash call with a
    /// missing or non-string command is gated as well, since there is no
    /// safe way to judge it.
    pub fn requires_approval(&self, tool_name: &str, args: &Map<String, Value>) -> bool {
        if ALWAYS_GATED.contains(&tool_name) {
            return true;
        }
        if tool_name == "bash" {
            return match args.get("command").and_then(Value::as_str) {
                Some(cmd) => !command_whitelisted(cmd, &self.bash_whitelist),
                None => true,
            };
        }
        false
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
