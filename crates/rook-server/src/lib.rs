// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Multi-session RPC front-end for the agent runtime.
//!
//! [`AgentService`] is the transport-independent service: a map of
//! sessions, each owning one agent, with invocations streamed back as
//! [`InvokeEvent`] frames.  The `http` module exposes it over axum with
//! server-sent events.

pub mod http;
pub mod service;

pub use service::{
    AgentService, Capabilities, InvokeEvent, InvokeRequest, ModelFactory, ScenarioInfo,
    SessionInfo, SessionSettings, StatusKind,
};
