// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
pub mod approval;
pub mod builtin;
pub mod manager;
pub mod tool;

pub use approval::{command_whitelisted, ApprovalGate};
pub use manager::{CompositeToolManager, FilteredToolManager, ToolManager, ToolRegistry};
pub use tool::{Tool, ToolInvocation, ToolOutput, ToolSchema};

pub use builtin::bash::BashTool;
pub use builtin::edit_file::{EditFileTool, MultiEditTool};
pub use builtin::glob::GlobTool;
pub use builtin::list_dir::ListDirTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::todo_write::{TodoItem, TodoWriteTool};
pub use builtin::write_file::WriteFileTool;
