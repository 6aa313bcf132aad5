// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::tool::{Tool, ToolInvocation, ToolOutput, ToolSchema};

/// The tool capability consumed by the agent runtime.
///
/// `call` returns `Err` only for infrastructure failures inside the manager
/// itself; a tool that ran and reported a problem comes back as an `Ok`
/// output with a non-empty error so the model can see it and react.
#[async_trait]
pub trait ToolManager: Send + Sync {
    /// Definitions of every tool this manager exposes, sorted by name.
    fn tools(&self) -> Vec<ToolSchema>;

    async fn call(&self, invocation: &ToolInvocation) -> anyhow::Result<ToolOutput>;
}

/// Registry holding concrete tool implementations.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolManager for ToolRegistry {
    fn tools(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    async fn call(&self, invocation: &ToolInvocation) -> anyhow::Result<ToolOutput> {
        match self.tools.get(&invocation.name) {
            Some(tool) => Ok(tool.execute(invocation).await),
            None => Ok(ToolOutput::err(
                &invocation.call_id,
                format!("unknown tool: {}", invocation.name),
            )),
        }
    }
}

/// Union of several tool providers.  On name collision the earliest
/// registered provider wins, both for listing and dispatch.
pub struct CompositeToolManager {
    providers: Vec<Arc<dyn ToolManager>>,
}

impl CompositeToolManager {
    pub fn new(providers: Vec<Arc<dyn ToolManager>>) -> Self {
        Self { providers }
    }

    pub fn push(&mut self, provider: Arc<dyn ToolManager>) {
        self.providers.push(provider);
    }

    fn provider_for(&self, name: &str) -> Option<&Arc<dyn ToolManager>> {
        self.providers
            .iter()
            .find(|p| p.tools().iter().any(|t| t.name == name))
    }
}

#[async_trait]
impl ToolManager for CompositeToolManager {
    fn tools(&self) -> Vec<ToolSchema> {
        let mut seen = std::collections::HashSet::new();
        let mut schemas = Vec::new();
        for provider in &self.providers {
            for schema in provider.tools() {
                if seen.insert(schema.name.clone()) {
                    schemas.push(schema);
                }
            }
        }
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    async fn call(&self, invocation: &ToolInvocation) -> anyhow::Result<ToolOutput> {
        match self.provider_for(&invocation.name) {
            Some(provider) => provider.call(invocation).await,
            None => Ok(ToolOutput::err(
                &invocation.call_id,
                format!("unknown tool: {}", invocation.name),
            )),
        }
    }
}

/// Per-skill view over a tool manager.
///
/// An empty allow-list is a pass-through.  Calls to a hidden tool come back
/// as an in-band denial so the conversation keeps its call/result pairing.
pub struct FilteredToolManager {
    inner: Arc<dyn ToolManager>,
    allowed: Vec<String>,
}

impl FilteredToolManager {
    pub fn new(inner: Arc<dyn ToolManager>, allowed: Vec<String>) -> Self {
        Self { inner, allowed }
    }

    fn is_allowed(&self, name: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|a| a == name)
    }
}

#[async_trait]
impl ToolManager for FilteredToolManager {
    fn tools(&self) -> Vec<ToolSchema> {
        self.inner
            .tools()
            .into_iter()
            .filter(|t| self.is_allowed(&t.name))
            .collect()
    }

    async fn call(&self, invocation: &ToolInvocation) -> anyhow::Result<ToolOutput> {
        if !self.is_allowed(&invocation.name) {
            return Ok(ToolOutput::err(
                &invocation.call_id,
                format!(
                    "tool '{}' is not allowed by the active skill",
                    invocation.name
                ),
            ));
        }
        self.inner.call(invocation).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
