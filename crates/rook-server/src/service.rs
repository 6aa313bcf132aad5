// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rook_config::Settings;
use rook_core::{session_file_path, Agent, AgentEvent, FileHistory, MemoryHistory};
use rook_model::{LanguageModel, TokenUsage};
use rook_skills::discover_skills;

/// Bound on each invocation's outbound event stream.  A slow consumer
/// backpressures the driver rather than growing a queue.
const EVENT_BUFFER: usize = 64;

/// Constructs the model for a new session.  Injected so tests and
/// embeddings can wire scripted models.
pub type ModelFactory =
    Arc<dyn Fn(&Settings) -> anyhow::Result<Arc<dyn LanguageModel>> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub tool_calling: bool,
    pub thinking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInfo {
    pub name: String,
    pub description: String,
}

/// Per-session overrides accepted by `start_session`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub skill_name: String,
    pub user_input: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub enable_thinking: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Started,
    RunTool,
    Completed,
}

/// One frame of an invocation's event stream.
///
/// Failures travel as `Error` frames so the stream itself always
/// terminates cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvokeEvent {
    Status { state: StatusKind },
    ThinkingDelta { text: String },
    ToolCall {
        id: String,
        name: String,
        args_json: String,
    },
    ToolResult {
        id: String,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Final {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    Error { message: String },
}

struct SessionSlot {
    agent: Arc<Mutex<Agent>>,
}

/// Multi-session front-end.  All tool calls auto-approve — there is no
/// interactive prompt behind a server.
pub struct AgentService {
    settings: Settings,
    model_factory: ModelFactory,
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
}

impl AgentService {
    pub fn new(settings: Settings, model_factory: ModelFactory) -> Self {
        Self {
            settings,
            model_factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Convenience constructor using the default backend registry.
    pub fn with_default_models(settings: Settings) -> Self {
        Self::new(settings, Arc::new(|s: &Settings| rook_model::build_model(s)))
    }

    /// Create a session, optionally bound to a persisted history file.
    ///
    /// A non-empty `persistence_key` is sanitized into
    /// `<sessions_dir>/<key>.json`; existing history at that path is
    /// reloaded, so an expired-and-recreated session picks up where the
    /// file left off.
    pub fn start_session(
        &self,
        overrides: SessionSettings,
        persistence_key: Option<&str>,
    ) -> anyhow::Result<SessionInfo> {
        let mut settings = self.settings.clone();
        if let Some(model) = overrides.model {
            settings.model = model;
        }
        if let Some(dir) = overrides.working_dir {
            settings.working_dir = dir;
        }
        if let Some(max) = overrides.max_iterations {
            settings.max_iterations = max;
        }

        let repo: Box<dyn rook_core::HistoryRepository> = match persistence_key {
            Some(key) if !key.is_empty() => Box::new(FileHistory::new(session_file_path(
                &settings.effective_sessions_dir(),
                key,
            ))),
            _ => Box::new(MemoryHistory),
        };

        let model = (self.model_factory)(&settings)?;
        let agent = Agent::new(&settings, model, repo)?;
        let info = SessionInfo {
            session_id: agent.session_id().to_string(),
            capabilities: Capabilities {
                tool_calling: agent.supports_tool_calling(),
                thinking: agent.thinking_enabled(),
            },
        };
        debug!(session_id = %info.session_id, persisted = persistence_key.is_some(), "session started");
        self.sessions.write().unwrap().insert(
            info.session_id.clone(),
            Arc::new(SessionSlot {
                agent: Arc::new(Mutex::new(agent)),
            }),
        );
        Ok(info)
    }

    fn slot(&self, session_id: &str) -> anyhow::Result<Arc<SessionSlot>> {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown session '{session_id}'"))
    }

    /// Run one turn, streaming events back.
    ///
    /// Returns the receiving end of the event stream; the invocation runs
    /// on its own task.  A second invoke on a busy session is rejected
    /// up front — the pairing invariant relies on single-tasked access.
    pub fn invoke(
        &self,
        session_id: &str,
        request: InvokeRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<InvokeEvent>> {
        let slot = self.slot(session_id)?;
        let mut agent = Arc::clone(&slot.agent)
            .try_lock_owned()
            .map_err(|_| anyhow::anyhow!("session '{session_id}' is busy"))?;

        let (out_tx, out_rx) = mpsc::channel::<InvokeEvent>(EVENT_BUFFER);
        let (in_tx, mut in_rx) = mpsc::channel::<AgentEvent>(EVENT_BUFFER);

        // Translate internal events to wire frames as they arrive.
        let forward_tx = out_tx.clone();
        let thinking_enabled = request.enable_thinking.unwrap_or(true);
        let forwarder = tokio::spawn(async move {
            while let Some(event) = in_rx.recv().await {
                let frame = match event {
                    AgentEvent::ThinkingDelta(text) => {
                        if !thinking_enabled {
                            continue;
                        }
                        Some(InvokeEvent::ThinkingDelta { text })
                    }
                    AgentEvent::ToolCallStart {
                        call_id,
                        tool_name,
                        args,
                    } => {
                        let _ = forward_tx
                            .send(InvokeEvent::Status {
                                state: StatusKind::RunTool,
                            })
                            .await;
                        Some(InvokeEvent::ToolCall {
                            id: call_id,
                            name: tool_name,
                            args_json: args.to_string(),
                        })
                    }
                    AgentEvent::ToolResult {
                        call_id,
                        output,
                        is_error,
                        ..
                    } => Some(InvokeEvent::ToolResult {
                        id: call_id,
                        output: if is_error { String::new() } else { output.clone() },
                        error: if is_error { Some(output) } else { None },
                    }),
                    AgentEvent::Error(message) => Some(InvokeEvent::Error { message }),
                    // Compaction, token usage, approval staging, and the
                    // terminal response are internal; Final carries the
                    // terminal content.
                    _ => None,
                };
                if let Some(frame) = frame {
                    if forward_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            }
        });

        let skill = request.skill_name;
        let input = request.user_input;
        let images = request.images;
        tokio::spawn(async move {
            let _ = out_tx
                .send(InvokeEvent::Status {
                    state: StatusKind::Started,
                })
                .await;

            let result = agent.invoke(&skill, &input, images, in_tx, cancel).await;
            // All driver events are flushed; let the forwarder drain them
            // before the final frame so ordering is preserved.
            let _ = forwarder.await;

            match result {
                Ok(message) => {
                    let thinking = match &message.payload {
                        rook_model::MessagePayload::AssistantChat { thinking, .. } => {
                            thinking.clone()
                        }
                        _ => None,
                    };
                    let _ = out_tx
                        .send(InvokeEvent::Final {
                            text: message.text().unwrap_or_default().to_string(),
                            thinking,
                            usage: message.token_usage,
                        })
                        .await;
                }
                Err(e) => {
                    warn!(error = %e, "invoke failed");
                    let _ = out_tx
                        .send(InvokeEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
            let _ = out_tx
                .send(InvokeEvent::Status {
                    state: StatusKind::Completed,
                })
                .await;
        });

        Ok(out_rx)
    }

    /// Drop a session's history, in memory and on disk, keeping the
    /// session itself usable.
    pub async fn clear_session(&self, session_id: &str) -> anyhow::Result<()> {
        let slot = self.slot(session_id)?;
        let agent = slot.agent.lock().await;
        agent.clear()
    }

    pub async fn conversation_preview(
        &self,
        session_id: &str,
        max_messages: usize,
    ) -> anyhow::Result<String> {
        let slot = self.slot(session_id)?;
        let agent = slot.agent.lock().await;
        Ok(agent.conversation_preview(max_messages))
    }

    /// User-invocable skills, presented as invocation scenarios.
    pub fn list_scenarios(&self) -> Vec<ScenarioInfo> {
        discover_skills(&self.settings.effective_working_dir())
            .all()
            .iter()
            .filter(|s| s.user_invocable)
            .map(|s| ScenarioInfo {
                name: s.name.clone(),
                description: s.description.clone(),
            })
            .collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
