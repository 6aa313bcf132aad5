// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use rook_config::Settings;
use tracing::debug;

use crate::capability::LanguageModel;
use crate::mock::MockModel;

/// Constructor for one backend's model handle.
pub type ModelFactory = fn(&Settings) -> anyhow::Result<Arc<dyn LanguageModel>>;

/// Maps backend names to adapter factories.
///
/// The runtime consumes the [`LanguageModel`] capability only; vendor
/// adapters live outside this workspace and register themselves here at
/// process start.  The built-in `mock` backend is always present so the
/// CLI and tests work without network access or credentials.
pub struct ModelRegistry {
    factories: HashMap<String, ModelFactory>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let mut factories: HashMap<String, ModelFactory> = HashMap::new();
        factories.insert("mock".into(), |_| Ok(Arc::new(MockModel)));
        Self { factories }
    }

    pub fn register(&mut self, backend: impl Into<String>, factory: ModelFactory) {
        self.factories.insert(backend.into(), factory);
    }

    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validate credentials and construct the model for `settings.backend`.
    pub fn build(&self, settings: &Settings) -> anyhow::Result<Arc<dyn LanguageModel>> {
        settings.validate()?;
        let factory = self.factories.get(&settings.backend).ok_or_else(|| {
            anyhow::anyhow!(
                "no adapter registered for backend '{}' (available: {})",
                settings.backend,
                self.backends().join(", ")
            )
        })?;
        debug!(backend = %settings.backend, model = %settings.model, "constructing model");
        factory(settings)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a model from settings with the default registry.
pub fn build_model(settings: &Settings) -> anyhow::Result<Arc<dyn LanguageModel>> {
    ModelRegistry::new().build(settings)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
