// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rook_config::Settings;
use rook_server::{AgentService, InvokeEvent, InvokeRequest, SessionSettings, StatusKind};

use crate::adapter::{ChannelAdapter, InboundMessage, OutboundMessage, QUEUE_CAPACITY};
use crate::session::{SessionKey, SessionManager};

/// One item on the gateway's outbound queue.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Message(OutboundMessage),
    /// Emitted while the agent runs tools, so the channel can show a
    /// typing/processing indicator.
    Typing {
        channel_type: String,
        channel_id: String,
    },
}

/// Multiplexes chat peers onto agent sessions and runs the command layer.
pub struct Gateway {
    service: Arc<AgentService>,
    sessions: SessionManager,
    default_skill: String,
    /// Optional markdown notes prepended to every user turn.
    memory_file: Option<PathBuf>,
    outbound: mpsc::Sender<OutboundEvent>,
}

impl Gateway {
    /// Build a gateway over `service`.  Returns the receiving end of the
    /// outbound queue; the embedder drains it into channel adapters (see
    /// [`Gateway::deliver_loop`]).
    pub fn new(
        service: Arc<AgentService>,
        settings: &Settings,
    ) -> anyhow::Result<(Arc<Self>, mpsc::Receiver<OutboundEvent>)> {
        Self::with_memory_file(service, settings, None)
    }

    /// Like [`Gateway::new`], with standing notes prepended to every turn.
    pub fn with_memory_file(
        service: Arc<AgentService>,
        settings: &Settings,
        memory_file: Option<PathBuf>,
    ) -> anyhow::Result<(Arc<Self>, mpsc::Receiver<OutboundEvent>)> {
        let timeout: Duration = humantime::parse_duration(&settings.gateway.session_timeout)
            .map_err(|e| {
                anyhow::anyhow!(
                    "invalid gateway.session_timeout '{}': {e}",
                    settings.gateway.session_timeout
                )
            })?;
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        Ok((
            Arc::new(Self {
                service,
                sessions: SessionManager::new(timeout),
                default_skill: settings.default_skill.clone(),
                memory_file,
                outbound: outbound_tx,
            }),
            outbound_rx,
        ))
    }

    /// Consume inbound messages until the channel closes, dispatching each
    /// on its own task.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            let gateway = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = gateway.handle_message(message).await {
                    warn!(error = %e, "inbound message handling failed");
                }
            });
        }
    }

    /// Drain the outbound queue into the registered adapters.
    pub async fn deliver_loop(
        adapters: HashMap<String, Arc<dyn ChannelAdapter>>,
        mut outbound: mpsc::Receiver<OutboundEvent>,
    ) {
        while let Some(event) = outbound.recv().await {
            let (channel_type, result) = match &event {
                OutboundEvent::Message(msg) => match adapters.get(&msg.channel_type) {
                    Some(adapter) => (msg.channel_type.clone(), adapter.send(msg).await),
                    None => (msg.channel_type.clone(), Ok(())),
                },
                OutboundEvent::Typing {
                    channel_type,
                    channel_id,
                } => match adapters.get(channel_type) {
                    Some(adapter) => (
                        channel_type.clone(),
                        adapter.indicate_typing(channel_id).await,
                    ),
                    None => (channel_type.clone(), Ok(())),
                },
            };
            if let Err(e) = result {
                warn!(channel = %channel_type, error = %e, "outbound delivery failed");
            }
        }
    }

    /// Handle one inbound message: command dispatch or an agent turn.
    pub async fn handle_message(&self, message: InboundMessage) -> anyhow::Result<()> {
        let key = SessionKey::new(
            message.channel_type.clone(),
            message.channel_id.clone(),
            message.peer_id.clone(),
        );

        if let Some(command) = message.text.strip_prefix('!') {
            let reply = self.handle_command(&key, command.trim()).await;
            return self.send_text(&message, reply).await;
        }

        let (session_id, skill) = self.session_for(&key).await?;
        let input = self.decorate_input(&message);

        let request = InvokeRequest {
            skill_name: skill,
            user_input: input,
            images: vec![],
            enable_thinking: Some(false),
        };
        let mut rx = match self
            .service
            .invoke(&session_id, request, CancellationToken::new())
        {
            Ok(rx) => rx,
            Err(e) if e.to_string().contains("busy") => {
                return self
                    .send_text(&message, "Still working on your previous message.".into())
                    .await;
            }
            Err(e) => return Err(e),
        };

        let mut final_text = String::new();
        let mut error_text = None;
        while let Some(event) = rx.recv().await {
            match event {
                InvokeEvent::Status {
                    state: StatusKind::RunTool,
                } => {
                    let _ = self
                        .outbound
                        .send(OutboundEvent::Typing {
                            channel_type: message.channel_type.clone(),
                            channel_id: message.channel_id.clone(),
                        })
                        .await;
                }
                InvokeEvent::Final { text, .. } => final_text = text,
                InvokeEvent::Error { message } => error_text = Some(message),
                _ => {}
            }
        }

        let reply = match error_text {
            Some(e) => format!("Something went wrong: {e}"),
            None if final_text.is_empty() => "(no response)".to_string(),
            None => final_text,
        };
        self.send_text(&message, reply).await
    }

    // ── Session plumbing ──────────────────────────────────────────────────────

    /// The live session for `key`, creating (and rehydrating from the
    /// persistence file) when absent or expired.
    async fn session_for(&self, key: &SessionKey) -> anyhow::Result<(String, String)> {
        if let Some(session) = self.sessions.touch(key) {
            return Ok((session.agent_session_id, session.active_skill));
        }
        let info = self
            .service
            .start_session(SessionSettings::default(), Some(&key.persistence_key()))?;
        debug!(key = %key, session_id = %info.session_id, "created gateway session");
        self.sessions.insert(
            key.clone(),
            info.session_id.clone(),
            self.default_skill.clone(),
        );
        Ok((info.session_id, self.default_skill.clone()))
    }

    fn decorate_input(&self, message: &InboundMessage) -> String {
        let mut input = String::new();
        if let Some(path) = &self.memory_file {
            if let Ok(notes) = std::fs::read_to_string(path) {
                if !notes.trim().is_empty() {
                    input.push_str("Context notes:\n");
                    input.push_str(notes.trim());
                    input.push_str("\n\n");
                }
            }
        }
        if let Some(name) = &message.sender_name {
            input.push_str(&format!("[from {name}] "));
        }
        input.push_str(&message.text);
        input
    }

    async fn send_text(&self, inbound: &InboundMessage, text: String) -> anyhow::Result<()> {
        self.outbound
            .send(OutboundEvent::Message(OutboundMessage {
                channel_type: inbound.channel_type.clone(),
                channel_id: inbound.channel_id.clone(),
                text,
            }))
            .await
            .map_err(|_| anyhow::anyhow!("outbound queue closed"))
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&self, key: &SessionKey, command: &str) -> String {
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((n, a)) => (n, a.trim()),
            None => (command, ""),
        };
        match name {
            "clear" => match self.clear_peer(key).await {
                Ok(()) => "Conversation cleared.".to_string(),
                Err(e) => format!("Clear failed: {e}"),
            },
            "skill" => {
                if arg.is_empty() {
                    return "Usage: !skill <name>".to_string();
                }
                match self.service.list_scenarios().iter().find(|s| s.name == arg) {
                    Some(_) => {
                        if !self.sessions.set_skill(key, arg.to_string()) {
                            // No live session yet: create one so the choice sticks.
                            if let Ok((_, _)) = self.session_for(key).await {
                                self.sessions.set_skill(key, arg.to_string());
                            }
                        }
                        format!("Active skill set to '{arg}'.")
                    }
                    None => format!("Unknown skill '{arg}'."),
                }
            }
            "memory" => match &self.memory_file {
                Some(path) => std::fs::read_to_string(path)
                    .unwrap_or_else(|_| "(memory file is empty)".to_string()),
                None => "(no memory file configured)".to_string(),
            },
            "help" => "Commands: !clear — forget this conversation; !skill <name> — switch \
                       skill; !memory — show standing notes; !help — this text."
                .to_string(),
            other => format!("Unknown command '!{other}'; try !help."),
        }
    }

    /// Drop the peer's in-memory session and its persisted history.
    async fn clear_peer(&self, key: &SessionKey) -> anyhow::Result<()> {
        let (session_id, _) = match self.sessions.touch(key) {
            Some(session) => (session.agent_session_id, session.active_skill),
            None => self.session_for(key).await?,
        };
        self.service.clear_session(&session_id).await?;
        self.sessions.remove(key);
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
