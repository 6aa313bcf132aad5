// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Channel gateway: multiplexes chat-channel peers onto agent sessions.
//!
//! Adapters (Telegram, Discord, web chat, …) implement the
//! [`ChannelAdapter`] contract and exchange messages with the gateway
//! through bounded queues.  Each `(channel type, channel id, peer)` triple
//! maps to one server-side session whose history file outlives in-memory
//! expiry.

pub mod adapter;
pub mod gateway;
pub mod session;

pub use adapter::{ChannelAdapter, InboundMessage, OutboundMessage, QUEUE_CAPACITY};
pub use gateway::{Gateway, OutboundEvent};
pub use session::{SessionKey, SessionManager};
