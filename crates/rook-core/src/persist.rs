// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rook_model::Message;

/// Maximum length of a sanitized persistence key.
const MAX_KEY_LEN: usize = 128;

/// Turn an arbitrary persistence key into a safe file stem.
///
/// Runs of non-alphanumeric characters collapse to a single `_`; the
/// result is truncated to 128 characters.  The transform is idempotent,
/// and it is the only cross-process contract between the server and the
/// gateway — both must produce the same filename for the same key.
pub fn sanitize_persistence_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len().min(MAX_KEY_LEN));
    let mut last_was_sep = false;
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
        if out.len() >= MAX_KEY_LEN {
            break;
        }
    }
    out
}

/// Path of the history file for `key` under `sessions_dir`.
pub fn session_file_path(sessions_dir: &Path, key: &str) -> PathBuf {
    sessions_dir.join(format!("{}.json", sanitize_persistence_key(key)))
}

/// Storage capability for conversation history.
pub trait HistoryRepository: Send + Sync {
    fn load(&self) -> anyhow::Result<Vec<Message>>;
    fn save(&self, messages: &[Message]) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// No-op repository for unpersisted sessions.
#[derive(Default)]
pub struct MemoryHistory;

impl HistoryRepository for MemoryHistory {
    fn load(&self) -> anyhow::Result<Vec<Message>> {
        Ok(Vec::new())
    }
    fn save(&self, _messages: &[Message]) -> anyhow::Result<()> {
        Ok(())
    }
    fn clear(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// On-disk serialized history: `{"messages": [...], "metadata": {}}`.
#[derive(Serialize, Deserialize, Default)]
struct HistoryFile {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// JSON-file-backed repository.
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryRepository for FileHistory {
    fn load(&self) -> anyhow::Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let file: HistoryFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        debug!(path = %self.path.display(), messages = file.messages.len(), "loaded history");
        Ok(file.messages)
    }

    fn save(&self, messages: &[Message]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = HistoryFile {
            messages: messages.to_vec(),
            metadata: serde_json::Map::new(),
        };
        let text = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("removing {}", self.path.display()))?;
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
