// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::Parser;

/// An interactive ReAct coding agent with skills, sessions, and a
/// streaming server.
#[derive(Debug, Parser)]
#[command(name = "rook", version, about)]
pub struct Cli {
    /// One-shot user input; everything after the flags.
    #[arg(trailing_var_arg = true)]
    pub input: Vec<String>,

    /// Skill to activate.
    #[arg(short = 's', long, default_value = "code")]
    pub skill: String,

    /// Model backend (anthropic | openai | gemini | mock).
    #[arg(short = 'b', long)]
    pub backend: Option<String>,

    /// Model name forwarded to the backend.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Working directory for tools and skill rendering.
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Explicit settings file.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Multi-turn input file; turns are separated by lines of dashes
    /// (`----`).
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Dump the persisted conversation history and exit.
    #[arg(short = 'l', long = "log")]
    pub log: bool,

    /// Verbose diagnostics on stderr.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Override the active skill's tool allow-list (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub allowed_tools: Option<Vec<String>>,

    /// Run the streaming RPC server instead of a one-shot invocation.
    #[arg(long)]
    pub serve: bool,

    /// Listen address for --serve.
    #[arg(long)]
    pub serve_addr: Option<String>,

    /// Directory holding per-session history files.
    #[arg(long)]
    pub sessions_dir: Option<PathBuf>,
}

impl Cli {
    pub fn one_shot_input(&self) -> Option<String> {
        if self.input.is_empty() {
            None
        } else {
            Some(self.input.join(" "))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
