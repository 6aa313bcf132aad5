// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::tool::{Tool, ToolInvocation, ToolOutput};

/// Cap on the number of returned paths; earlier (shallower) matches are the
/// most relevant ones.
const MAX_MATCHES: usize = 500;

pub struct GlobTool {
    pub working_dir: PathBuf,
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern relative to the working directory.\n\
         Supports *, ? and ** (recursive). Hidden directories and target/ are skipped.\n\
         Returns at most 500 paths, shallowest first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob, e.g. src/**/*.rs" }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let pattern = match call.str_arg("pattern") {
            Ok(p) => p.to_string(),
            Err(out) => return out,
        };
        debug!(pattern = %pattern, "glob");

        let mut matches: Vec<String> = Vec::new();
        let walker = WalkDir::new(&self.working_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !(name.starts_with('.') && name.len() > 1) && name != "target"
            });
        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.working_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            if glob_match(&pattern, &rel) {
                matches.push(rel);
                if matches.len() >= MAX_MATCHES {
                    break;
                }
            }
        }

        matches.sort_by_key(|p| (p.matches('/').count(), p.clone()));
        if matches.is_empty() {
            ToolOutput::ok(&call.call_id, format!("no files match '{pattern}'"))
        } else {
            ToolOutput::ok(&call.call_id, matches.join("\n"))
        }
    }
}

/// Match `path` against a glob `pattern`.
///
/// `*` matches within one path segment, `?` one non-separator character,
/// and `**` spans segments (including zero).  Matching is by recursive
/// descent over bytes with the usual star backtracking.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    fn inner(pat: &[u8], path: &[u8]) -> bool {
        if pat.is_empty() {
            return path.is_empty();
        }
        // "**" optionally followed by '/'
        if pat.starts_with(b"**") {
            let rest = if pat.len() > 2 && pat[2] == b'/' {
                &pat[3..]
            } else {
                &pat[2..]
            };
            // Zero segments, or swallow one byte at a time.
            if inner(rest, path) {
                return true;
            }
            return !path.is_empty() && inner(pat, &path[1..]);
        }
        match pat[0] {
            b'*' => {
                // Zero or more non-separator bytes.
                if inner(&pat[1..], path) {
                    return true;
                }
                !path.is_empty() && path[0] != b'/' && inner(pat, &path[1..])
            }
            b'?' => !path.is_empty() && path[0] != b'/' && inner(&pat[1..], &path[1..]),
            c => !path.is_empty() && path[0] == c && inner(&pat[1..], &path[1..]),
        }
    }
    inner(pattern.as_bytes(), path.as_bytes())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    // ── glob_match ────────────────────────────────────────────────────────────

    #[test]
    fn star_stays_within_segment() {
        assert!(glob_match("src/*.rs", "src/lib.rs"));
        assert!(!glob_match("src/*.rs", "src/sub/lib.rs"));
    }

    #[test]
    fn double_star_spans_segments() {
        assert!(glob_match("src/**/*.rs", "src/a/b/c.rs"));
        assert!(glob_match("**/*.rs", "lib.rs"));
        assert!(glob_match("**/*.rs", "a/b/lib.rs"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(glob_match("f?.txt", "f1.txt"));
        assert!(!glob_match("f?.txt", "f12.txt"));
        assert!(!glob_match("f?.txt", "f/.txt"));
    }

    #[test]
    fn literal_match_required() {
        assert!(glob_match("Cargo.toml", "Cargo.toml"));
        assert!(!glob_match("Cargo.toml", "Cargo.lock"));
    }

    // ── Tool ──────────────────────────────────────────────────────────────────

    fn call(pattern: &str) -> ToolInvocation {
        let mut m = Map::new();
        m.insert("pattern".into(), json!(pattern));
        ToolInvocation::new("g1", "glob", m)
    }

    #[tokio::test]
    async fn finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/sub/mod.rs"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        let tool = GlobTool {
            working_dir: dir.path().to_path_buf(),
        };
        let out = tool.execute(&call("src/**/*.rs")).await;
        assert!(out.text.contains("src/lib.rs"));
        assert!(out.text.contains("src/sub/mod.rs"));
        assert!(!out.text.contains("README.md"));
    }

    #[tokio::test]
    async fn hidden_dirs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config.rs"), "").unwrap();
        let tool = GlobTool {
            working_dir: dir.path().to_path_buf(),
        };
        let out = tool.execute(&call("**/*.rs")).await;
        assert!(out.text.contains("no files match"));
    }
}
