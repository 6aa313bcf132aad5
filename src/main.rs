// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;
use rook_config::Settings;
use rook_core::{
    session_file_path, Agent, AgentEvent, ApprovalDecider, ApprovalDecision, FileHistory,
    HistoryRepository,
};

/// Persistence key used by the one-shot CLI so that `--log` and repeated
/// invocations share one conversation file per workspace.
const CLI_SESSION_KEY: &str = "cli_default";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = rook_config::load(cli.settings.as_deref())?;
    apply_overrides(&mut settings, &cli);
    settings.validate()?;

    if cli.serve {
        let addr = cli
            .serve_addr
            .clone()
            .unwrap_or_else(|| settings.server.addr.clone());
        let service = Arc::new(rook_server::AgentService::with_default_models(settings));
        return rook_server::http::serve(&addr, service).await;
    }

    if cli.log {
        return dump_history(&settings);
    }

    let turns = gather_turns(&cli)?;
    if turns.is_empty() {
        anyhow::bail!("no input given; pass a prompt, -f FILE, --log, or --serve");
    }
    run_one_shot(&cli, settings, turns).await
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "rook=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(backend) = &cli.backend {
        settings.backend = backend.clone();
    }
    if let Some(model) = &cli.model {
        settings.model = model.clone();
    }
    if let Some(dir) = &cli.workdir {
        settings.working_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(dir) = &cli.sessions_dir {
        settings.sessions_dir = Some(dir.clone());
    }
    if let Some(skill) = Some(cli.skill.clone()).filter(|s| !s.is_empty()) {
        settings.default_skill = skill;
    }
}

/// Collect the user turns: the positional one-shot input, or the `-f`
/// file split on `----` separator lines.
fn gather_turns(cli: &Cli) -> anyhow::Result<Vec<String>> {
    if let Some(path) = &cli.file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut turns = Vec::new();
        let mut current = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.len() >= 4 && trimmed.chars().all(|c| c == '-') {
                let turn = current.join("\n").trim().to_string();
                if !turn.is_empty() {
                    turns.push(turn);
                }
                current.clear();
            } else {
                current.push(line);
            }
        }
        let tail = current.join("\n").trim().to_string();
        if !tail.is_empty() {
            turns.push(tail);
        }
        return Ok(turns);
    }
    Ok(cli.one_shot_input().into_iter().collect())
}

fn cli_repo(settings: &Settings) -> Box<dyn HistoryRepository> {
    Box::new(FileHistory::new(session_file_path(
        &settings.effective_sessions_dir(),
        CLI_SESSION_KEY,
    )))
}

fn dump_history(settings: &Settings) -> anyhow::Result<()> {
    let messages = cli_repo(settings).load()?;
    if messages.is_empty() {
        println!("(no saved conversation)");
        return Ok(());
    }
    for m in &messages {
        println!("{}", serde_json::to_string(&m)?);
    }
    Ok(())
}

async fn run_one_shot(cli: &Cli, settings: Settings, turns: Vec<String>) -> anyhow::Result<()> {
    let model = rook_model::build_model(&settings)?;
    let repo = cli_repo(&settings);
    let mut agent =
        Agent::new(&settings, model, repo)?.with_decider(Arc::new(PromptingDecider));
    agent.set_allowed_tools(cli.allowed_tools.clone());

    for turn in turns {
        let (tx, rx) = mpsc::channel::<AgentEvent>(64);
        let printer = tokio::spawn(print_events(rx, cli.verbose));
        let result = agent
            .invoke(&cli.skill, &turn, vec![], tx, CancellationToken::new())
            .await;
        let _ = printer.await;
        let reply = result?;
        println!("{}", reply.text().unwrap_or_default());
    }
    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<AgentEvent>, verbose: bool) {
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::ToolCallStart {
                tool_name, args, ..
            } => {
                eprintln!("→ {tool_name} {args}");
            }
            AgentEvent::ToolResult {
                tool_name,
                output,
                is_error,
                ..
            } if verbose => {
                let head: String = output.chars().take(200).collect();
                let tag = if is_error { "error" } else { "ok" };
                eprintln!("← {tool_name} [{tag}] {head}");
            }
            AgentEvent::ThinkingDelta(delta) if verbose => {
                eprint!("{delta}");
                let _ = std::io::stderr().flush();
            }
            AgentEvent::Compacted {
                tokens_before,
                tokens_after,
            } => {
                eprintln!("(context compacted: {tokens_before} → {tokens_after} tokens)");
            }
            _ => {}
        }
    }
}

/// Blocking y/N approval prompt on the controlling terminal.
struct PromptingDecider;

#[async_trait]
impl ApprovalDecider for PromptingDecider {
    async fn decide(&self, _call_id: &str, tool_name: &str) -> ApprovalDecision {
        let tool = tool_name.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            eprint!("Allow tool '{tool}'? [y/N] ");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            line
        })
        .await
        .unwrap_or_default();
        if answer.trim().eq_ignore_ascii_case("y") {
            ApprovalDecision::Approve
        } else {
            ApprovalDecision::Deny
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
