// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use rook_config::Settings;
use rook_model::{LanguageModel, Message, MessagePayload, DEFAULT_CONTEXT_TOKENS};
use rook_skills::{
    build_skill_catalog, discover_skills, render_skill, skill_prompt_marker, ReadSkillTool,
    SkillSet, CATALOG_MARKER,
};
use rook_tools::{
    ApprovalGate, BashTool, CompositeToolManager, EditFileTool, FilteredToolManager, GlobTool,
    ListDirTool, MultiEditTool, ReadFileTool, TodoWriteTool, ToolManager, ToolRegistry,
    WriteFileTool,
};

use crate::compact::Compactor;
use crate::driver::{DriverError, Outcome, ReactDriver};
use crate::events::AgentEvent;
use crate::persist::HistoryRepository;
use crate::store::MessageStore;

/// Decision for one staged tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

/// Capability consulted when the driver stages a gated tool call.
///
/// A CLI implements this with a blocking prompt; the server and gateway
/// approve everything.
#[async_trait]
pub trait ApprovalDecider: Send + Sync {
    async fn decide(&self, call_id: &str, tool_name: &str) -> ApprovalDecision;
}

/// Approves every staged call.
pub struct AutoApprove;

#[async_trait]
impl ApprovalDecider for AutoApprove {
    async fn decide(&self, _call_id: &str, _tool_name: &str) -> ApprovalDecision {
        ApprovalDecision::Approve
    }
}

/// Composes the runtime: store, skills, tools, driver, events.
///
/// One agent per session.  Concurrent invokes on the same agent are the
/// caller's responsibility to prevent (the server rejects them).
pub struct Agent {
    session_id: String,
    model: Arc<dyn LanguageModel>,
    base_tools: Arc<dyn ToolManager>,
    skills: Arc<SkillSet>,
    store: Arc<RwLock<MessageStore>>,
    decider: Arc<dyn ApprovalDecider>,
    settings: Settings,
    context_window: usize,
    /// CLI `--allowed-tools` override; replaces the skill allow-list.
    allowed_tools_override: Option<Vec<String>>,
}

impl Agent {
    pub fn new(
        settings: &Settings,
        model: Arc<dyn LanguageModel>,
        repo: Box<dyn HistoryRepository>,
    ) -> anyhow::Result<Self> {
        let working_dir = settings.effective_working_dir();
        let skills = Arc::new(discover_skills(&working_dir));

        let mut builtins = ToolRegistry::new();
        builtins.register(ReadFileTool {
            working_dir: working_dir.clone(),
        });
        builtins.register(WriteFileTool {
            working_dir: working_dir.clone(),
        });
        builtins.register(EditFileTool {
            working_dir: working_dir.clone(),
        });
        builtins.register(MultiEditTool {
            working_dir: working_dir.clone(),
        });
        builtins.register(BashTool::new(working_dir.clone()));
        builtins.register(GlobTool {
            working_dir: working_dir.clone(),
        });
        builtins.register(ListDirTool {
            working_dir: working_dir.clone(),
        });
        builtins.register(TodoWriteTool::new(Default::default()));

        let mut skill_tools = ToolRegistry::new();
        skill_tools.register(ReadSkillTool::new(Arc::clone(&skills)));

        let base_tools: Arc<dyn ToolManager> = Arc::new(CompositeToolManager::new(vec![
            Arc::new(builtins),
            Arc::new(skill_tools),
        ]));

        let mut store = MessageStore::new(repo);
        let loaded = store.load()?;
        if loaded > 0 {
            debug!(messages = loaded, "rehydrated session history");
        }

        let context_window = if settings.context_window > 0 {
            settings.context_window
        } else {
            model.max_context_tokens().unwrap_or(DEFAULT_CONTEXT_TOKENS)
        };

        let session_id = Uuid::new_v4().to_string();
        model.set_session_id(&session_id);

        Ok(Self {
            session_id,
            model,
            base_tools,
            skills,
            store: Arc::new(RwLock::new(store)),
            decider: Arc::new(AutoApprove),
            settings: settings.clone(),
            context_window,
            allowed_tools_override: None,
        })
    }

    pub fn with_decider(mut self, decider: Arc<dyn ApprovalDecider>) -> Self {
        self.decider = decider;
        self
    }

    /// Override every skill's tool allow-list (the `--allowed-tools` flag).
    pub fn set_allowed_tools(&mut self, tools: Option<Vec<String>>) {
        self.allowed_tools_override = tools;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn skills(&self) -> &SkillSet {
        &self.skills
    }

    pub fn store(&self) -> Arc<RwLock<MessageStore>> {
        Arc::clone(&self.store)
    }

    /// Whether the wired model natively understands tool definitions.
    pub fn supports_tool_calling(&self) -> bool {
        self.model.supports_tool_choice()
    }

    pub fn thinking_enabled(&self) -> bool {
        self.settings.enable_thinking
    }

    // ── System-context injection ──────────────────────────────────────────────

    /// Append `text` as a system message unless an identical one with the
    /// same marker prefix is already present.  A stale variant (same
    /// marker, different content) is removed first, so at most one message
    /// per marker exists — the skill prompt re-renders with each turn's
    /// arguments and would otherwise accumulate a copy per input.
    fn inject_marked(&self, marker: &str, text: String) {
        let mut store = self.store.write().unwrap();
        let existing: Option<String> = store
            .messages()
            .iter()
            .find_map(|m| match &m.payload {
                MessagePayload::SystemChat { text } if text.starts_with(marker) => {
                    Some(text.clone())
                }
                _ => None,
            });
        match existing {
            Some(current) if current == text => {}
            Some(_) => {
                store.remove_system_prefixed(marker);
                store.append(Message::system(text));
            }
            None => {
                store.append(Message::system(text));
            }
        }
    }

    // ── Invocation ────────────────────────────────────────────────────────────

    /// Run one user turn under the named skill (empty = default skill).
    ///
    /// Emits [`AgentEvent`]s into `events` while running and resolves
    /// approval gates through the injected decider.  Returns the terminal
    /// assistant message.
    pub async fn invoke(
        &mut self,
        skill_name: &str,
        input: &str,
        images: Vec<String>,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Message> {
        let name = if skill_name.is_empty() {
            self.settings.default_skill.as_str()
        } else {
            skill_name
        };
        let skill = self
            .skills
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("unknown skill '{name}'"))?
            .clone();

        // Catalog, then the active skill's rendered prompt, each injected
        // once and refreshed only when the content actually changes.
        self.inject_marked(
            CATALOG_MARKER,
            build_skill_catalog(self.skills.all()),
        );
        let working_dir = self.settings.effective_working_dir();
        let marker = skill_prompt_marker(&skill.name);
        let rendered = render_skill(&skill, input, &working_dir);
        self.inject_marked(&marker, format!("{marker}{rendered}"));

        let allowed = self
            .allowed_tools_override
            .clone()
            .unwrap_or_else(|| skill.allowed_tools.clone());
        let tools: Arc<dyn ToolManager> = Arc::new(FilteredToolManager::new(
            Arc::clone(&self.base_tools),
            allowed,
        ));

        let mut driver = ReactDriver::new(
            Arc::clone(&self.model),
            Some(tools),
            Arc::clone(&self.store),
            Compactor::new(Arc::clone(&self.model), self.context_window),
            ApprovalGate::new(self.settings.bash_whitelist.clone()),
            self.settings.max_iterations,
            self.settings.enable_thinking,
        );

        let result = self.drive_to_completion(&mut driver, input, images, &events, &cancel).await;
        self.persist();
        result.map_err(Into::into)
    }

    async fn drive_to_completion(
        &self,
        driver: &mut ReactDriver,
        input: &str,
        images: Vec<String>,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<Message, DriverError> {
        let mut outcome = driver.run(input, images, events, cancel).await?;
        loop {
            match outcome {
                Outcome::Completed(message) => return Ok(message),
                Outcome::WaitingForApproval { call_id, tool_name } => {
                    match self.decider.decide(&call_id, &tool_name).await {
                        ApprovalDecision::Approve => {
                            debug!(call_id = %call_id, tool = %tool_name, "tool call approved");
                        }
                        ApprovalDecision::Deny => {
                            driver.cancel_pending_tool_call();
                        }
                    }
                    outcome = driver.resume(events, cancel).await?;
                }
            }
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.read().unwrap().save() {
            warn!(error = %e, "failed to persist session history");
        }
    }

    // ── Session operations ────────────────────────────────────────────────────

    /// Drop the in-memory history and the persisted file.
    pub fn clear(&self) -> anyhow::Result<()> {
        let mut store = self.store.write().unwrap();
        store.clear();
        store.clear_persisted()
    }

    /// Plain-text rendering of the last `max_messages` turns.
    pub fn conversation_preview(&self, max_messages: usize) -> String {
        let store = self.store.read().unwrap();
        let messages = store.messages();
        let start = messages.len().saturating_sub(max_messages.max(1));
        let mut lines = Vec::new();
        for m in &messages[start..] {
            let line = match &m.payload {
                MessagePayload::UserChat { text, .. } => format!("user: {text}"),
                MessagePayload::AssistantChat { text, .. } => format!("assistant: {text}"),
                MessagePayload::SystemChat { text } => {
                    let head: String = text.chars().take(60).collect();
                    format!("system: {head}")
                }
                MessagePayload::Reasoning { text } => format!("assistant (reasoning): {text}"),
                MessagePayload::ToolCall(c) => format!("tool call: {}", c.tool_name),
                MessagePayload::ToolCallBatch { calls } => {
                    format!(
                        "tool calls: {}",
                        calls
                            .iter()
                            .map(|c| c.tool_name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                }
                MessagePayload::ToolResult { text, error, .. } => {
                    let body = if error.is_empty() { text } else { error };
                    let head: String = body.chars().take(120).collect();
                    format!("tool result: {head}")
                }
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}
