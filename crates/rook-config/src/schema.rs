// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `false`, so fields
/// that should be enabled unless the user opts out need a named function.
fn default_true() -> bool {
    true
}

fn default_backend() -> String {
    "anthropic".to_string()
}

fn default_skill() -> String {
    "code".to_string()
}

fn default_max_iterations() -> u32 {
    25
}

fn default_serve_addr() -> String {
    "127.0.0.1:7700".to_string()
}

fn default_session_timeout() -> String {
    "30m".to_string()
}

fn default_bash_whitelist() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "grep", "rg", "find", "pwd", "echo", "wc", "which",
        "git status", "git diff", "git log", "git show", "git branch",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Top-level settings for the agent runtime.
///
/// Loaded from YAML (see [`crate::load`]) and overridden by CLI flags in the
/// binary.  Everything here has a sensible default so `Settings::default()`
/// is a usable configuration for the mock backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Model backend identifier: "anthropic" | "openai" | "gemini" | "mock".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Model name forwarded to the backend.  Empty = backend default.
    #[serde(default)]
    pub model: String,

    /// Working directory for tools and skill rendering.  Empty = process cwd.
    #[serde(default)]
    pub working_dir: String,

    /// Skill activated when the caller does not name one.
    #[serde(default = "default_skill")]
    pub default_skill: String,

    /// Hard cap on ReAct loop iterations per invocation.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Context window override in tokens.  0 = ask the model capability,
    /// falling back to its documented conservative default.
    #[serde(default)]
    pub context_window: usize,

    /// Enable streaming of model reasoning into thinking events.
    #[serde(default = "default_true")]
    pub enable_thinking: bool,

    /// Commands the bash tool may run without approval.  Matching is by
    /// whole-word prefix: an entry matches when the command equals it or
    /// continues with whitespace after it.
    #[serde(default = "default_bash_whitelist")]
    pub bash_whitelist: Vec<String>,

    /// Directory holding per-session history files.
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,
}

impl Default for Settings {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty settings deserialize")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Listen address for `--serve` mode.
    #[serde(default = "default_serve_addr")]
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_serve_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Inactivity window after which a peer session is evicted from memory.
    /// Humantime syntax ("30m", "2h").  The persisted history file survives
    /// eviction and is reloaded on the peer's next message.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            session_timeout: default_session_timeout(),
        }
    }
}

impl Settings {
    /// Environment variable that must hold the API key for `backend`.
    ///
    /// Returns `None` for backends that need no credentials (mock, local).
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self.backend.as_str() {
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            "gemini" => Some("GEMINI_API_KEY"),
            _ => None,
        }
    }

    /// Startup validation: known backend, credentials present.
    ///
    /// A missing key variable for a configured non-local backend is a hard
    /// validation failure — the CLI exits 1 on it rather than failing later
    /// on the first model call.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend.as_str() {
            "anthropic" | "openai" | "gemini" | "mock" => {}
            other => anyhow::bail!("unknown backend '{other}'"),
        }
        if let Some(var) = self.api_key_env() {
            if std::env::var(var).map(|v| v.is_empty()).unwrap_or(true) {
                anyhow::bail!(
                    "backend '{}' requires the {} environment variable",
                    self.backend,
                    var
                );
            }
        }
        if self.max_iterations == 0 {
            anyhow::bail!("max_iterations must be at least 1");
        }
        Ok(())
    }

    /// Effective working directory: configured value or the process cwd.
    pub fn effective_working_dir(&self) -> PathBuf {
        if self.working_dir.is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.working_dir)
        }
    }

    /// Directory for persisted session files, defaulting to
    /// `~/.rook/sessions` (or `.rook/sessions` when home is unknown).
    pub fn effective_sessions_dir(&self) -> PathBuf {
        if let Some(dir) = &self.sessions_dir {
            return dir.clone();
        }
        dirs::home_dir()
            .map(|h| h.join(".rook").join("sessions"))
            .unwrap_or_else(|| PathBuf::from(".rook/sessions"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let s = Settings::default();
        assert_eq!(s.backend, "anthropic");
        assert_eq!(s.default_skill, "code");
        assert_eq!(s.max_iterations, 25);
        assert!(s.enable_thinking);
        assert!(!s.bash_whitelist.is_empty());
    }

    #[test]
    fn mock_backend_needs_no_key() {
        let s = Settings {
            backend: "mock".into(),
            ..Settings::default()
        };
        assert!(s.api_key_env().is_none());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn unknown_backend_fails_validation() {
        let s = Settings {
            backend: "cray-1".into(),
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn vendor_backend_maps_to_key_env() {
        for (backend, var) in [
            ("anthropic", "ANTHROPIC_API_KEY"),
            ("openai", "OPENAI_API_KEY"),
            ("gemini", "GEMINI_API_KEY"),
        ] {
            let s = Settings {
                backend: backend.into(),
                ..Settings::default()
            };
            assert_eq!(s.api_key_env(), Some(var));
        }
    }

    #[test]
    fn zero_iterations_rejected() {
        let s = Settings {
            backend: "mock".into(),
            max_iterations: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn sessions_dir_override_wins() {
        let s = Settings {
            sessions_dir: Some(PathBuf::from("/tmp/rook-sessions")),
            ..Settings::default()
        };
        assert_eq!(
            s.effective_sessions_dir(),
            PathBuf::from("/tmp/rook-sessions")
        );
    }

    #[test]
    fn settings_deserialize_from_partial_yaml() {
        let s: Settings = serde_yaml::from_str("backend: mock\nmax_iterations: 3\n").unwrap();
        assert_eq!(s.backend, "mock");
        assert_eq!(s.max_iterations, 3);
        // Untouched fields fall back to defaults.
        assert_eq!(s.default_skill, "code");
    }
}
