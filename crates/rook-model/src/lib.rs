// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
pub mod backend;
pub mod capability;
pub mod message;
pub mod mock;

pub use backend::{build_model, ModelFactory, ModelRegistry};
pub use capability::{
    LanguageModel, ThinkingOptions, ToolChoice, ToolSchema, DEFAULT_CONTEXT_TOKENS,
    THINKING_SINK_CAPACITY,
};
pub use message::{Message, MessagePayload, MessageSource, TokenUsage, ToolCallMsg};
pub use mock::{MockModel, ScriptedModel, ScriptedReply};
