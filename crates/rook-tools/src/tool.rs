// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Opaque identifier from the model, forwarded verbatim into the result.
    pub call_id: String,
    pub name: String,
    /// Parsed JSON argument object.
    pub args: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args,
        }
    }

    /// Required string argument, or a ready-made error output.
    pub fn str_arg(&self, key: &str) -> Result<&str, ToolOutput> {
        self.args.get(key).and_then(Value::as_str).ok_or_else(|| {
            ToolOutput::err(
                &self.call_id,
                format!("missing required string parameter '{key}'"),
            )
        })
    }

    pub fn u64_arg(&self, key: &str) -> Option<u64> {
        // Histories round-trip through JSON and widen integers to floats,
        // so accept both representations.
        self.args
            .get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
    }
}

/// The result of executing a tool.
///
/// A non-empty `error` means the tool ran and reported failure — that is a
/// normal message for the loop, not an exception.  Images are base64
/// strings or data URLs, opaque to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub call_id: String,
    pub text: String,
    pub images: Vec<String>,
    pub error: String,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            text: text.into(),
            images: Vec::new(),
            error: String::new(),
        }
    }

    pub fn err(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            text: String::new(),
            images: Vec::new(),
            error: error.into(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// A tool definition as presented to the model.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: Value,
}

/// Trait implemented by every built-in and user-provided tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Failures are reported via [`ToolOutput::err`];
    /// implementations do not return transport errors.
    async fn execute(&self, call: &ToolInvocation) -> ToolOutput;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
