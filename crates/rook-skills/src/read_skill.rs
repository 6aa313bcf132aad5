// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use rook_tools::{Tool, ToolInvocation, ToolOutput};

use crate::discover::SkillSet;

/// Lets the model fetch the full content of any skill named in the catalog.
pub struct ReadSkillTool {
    skills: Arc<SkillSet>,
}

impl ReadSkillTool {
    pub fn new(skills: Arc<SkillSet>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for ReadSkillTool {
    fn name(&self) -> &str {
        "read_skill"
    }

    fn description(&self) -> &str {
        "Fetch the full instructions of a skill listed in the skill catalog."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Skill name from the catalog" }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let name = match call.str_arg("name") {
            Ok(n) => n,
            Err(out) => return out,
        };
        match self.skills.get(name) {
            Some(skill) => ToolOutput::ok(
                &call.call_id,
                format!("# Skill: {}\n{}\n\n{}", skill.name, skill.description, skill.content),
            ),
            None => ToolOutput::err(
                &call.call_id,
                format!(
                    "unknown skill '{name}' (available: {})",
                    self.skills.names().join(", ")
                ),
            ),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::embedded_skills;
    use serde_json::Map;

    fn call(name: &str) -> ToolInvocation {
        let mut m = Map::new();
        m.insert("name".into(), json!(name));
        ToolInvocation::new("r1", "read_skill", m)
    }

    #[tokio::test]
    async fn fetches_known_skill() {
        let tool = ReadSkillTool::new(Arc::new(SkillSet::new(embedded_skills())));
        let out = tool.execute(&call("respond")).await;
        assert!(!out.is_error());
        assert!(out.text.contains("# Skill: respond"));
        assert!(out.text.contains("answer questions"));
    }

    #[tokio::test]
    async fn unknown_skill_lists_available() {
        let tool = ReadSkillTool::new(Arc::new(SkillSet::new(embedded_skills())));
        let out = tool.execute(&call("nope")).await;
        assert!(out.is_error());
        assert!(out.error.contains("code"));
        assert!(out.error.contains("respond"));
    }
}
