// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
pub mod agent;
pub mod compact;
pub mod driver;
pub mod events;
pub mod persist;
pub mod situation;
pub mod store;
#[cfg(test)]
mod tests;

pub use agent::{Agent, ApprovalDecider, ApprovalDecision, AutoApprove};
pub use compact::Compactor;
pub use driver::{DriverError, DriverStatus, Outcome, ReactDriver};
pub use events::{summarize_args, AgentEvent};
pub use persist::{sanitize_persistence_key, session_file_path, FileHistory, HistoryRepository, MemoryHistory};
pub use situation::SituationInjector;
pub use store::MessageStore;
