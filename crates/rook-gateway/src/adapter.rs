// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Capacity of the gateway's inbound and outbound queues.  Overflow blocks
/// the producing adapter, which is the intended shedding behavior when a
/// single peer floods the channel.
pub const QUEUE_CAPACITY: usize = 64;

/// A message received from an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Logical channel type (e.g. "telegram", "webchat").
    pub channel_type: String,
    /// Platform-native conversation identifier (chat id, room id).
    pub channel_id: String,
    /// Platform-native sender identifier.
    pub peer_id: String,
    /// Display name of the sender, when the platform provides one.
    pub sender_name: Option<String>,
    pub text: String,
}

/// A message to deliver to an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel_type: String,
    pub channel_id: String,
    pub text: String,
}

/// Contract implemented by every channel adapter.
///
/// Implementations must be `Send + Sync`: a connected adapter sends from
/// multiple tasks through a shared reference.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Stable lowercase identifier; the gateway's routing key.
    fn name(&self) -> &str;

    async fn connect(&mut self) -> anyhow::Result<()>;

    async fn disconnect(&mut self) -> anyhow::Result<()>;

    /// Deliver one outbound message.
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()>;

    /// Show a typing/processing indicator for the conversation.  Adapters
    /// for platforms without the concept keep the default no-op.
    async fn indicate_typing(&self, _channel_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
