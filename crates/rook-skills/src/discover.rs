// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::skill::{parse_skill_file, Skill, SkillPriority};

/// Skill files larger than this are skipped with a warning.
const MAX_SKILL_FILE_BYTES: u64 = 256 * 1024;

/// The resolved set of skills visible to one agent.
#[derive(Debug, Clone, Default)]
pub struct SkillSet {
    skills: Vec<Skill>,
}

impl SkillSet {
    pub fn new(mut skills: Vec<Skill>) -> Self {
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        Self { skills }
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name == name)
    }

    /// All skills, sorted by name.
    pub fn all(&self) -> &[Skill] {
        &self.skills
    }

    pub fn names(&self) -> Vec<&str> {
        self.skills.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

/// The read-only built-in skills compiled into the binary.
pub fn embedded_skills() -> Vec<Skill> {
    [
        ("code", include_str!("../skills/code.md")),
        ("respond", include_str!("../skills/respond.md")),
    ]
    .iter()
    .filter_map(|(stem, raw)| parse_skill_file(raw, stem, SkillPriority::Embedded))
    .collect()
}

/// Scan one directory of `*.md` skill files.
fn scan_dir(dir: &Path, priority: SkillPriority, out: &mut HashMap<String, Skill>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("md"))
            .unwrap_or(false);
        if !path.is_file() || !is_md {
            continue;
        }
        let size = path.metadata().map(|m| m.len()).unwrap_or(0);
        if size > MAX_SKILL_FILE_BYTES {
            warn!(path = %path.display(), size, "skipping oversized skill file");
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("skill")
            .to_string();
        let raw = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read skill file");
                continue;
            }
        };
        match parse_skill_file(&raw, &stem, priority) {
            Some(skill) => {
                // Insertion order runs lowest precedence first, so a later
                // (higher-priority) source overwrites an earlier one.
                out.insert(skill.name.clone(), skill);
            }
            None => warn!(path = %path.display(), "failed to parse skill file — skipping"),
        }
    }
}

/// Load skills from every source, applying the precedence order.
///
/// Sources are scanned lowest-precedence first so later inserts win:
/// embedded < `~/.claude/skills` < `~/.agents/skills` <
/// `<project>/.claude/skills` < `<project>/.agents/skills`.
pub fn discover_skills(project_root: &Path) -> SkillSet {
    let mut map: HashMap<String, Skill> = HashMap::new();

    for skill in embedded_skills() {
        map.insert(skill.name.clone(), skill);
    }

    if let Some(home) = dirs::home_dir() {
        scan_dir(
            &home.join(".claude").join("skills"),
            SkillPriority::UserClaude,
            &mut map,
        );
        scan_dir(
            &home.join(".agents").join("skills"),
            SkillPriority::UserAgents,
            &mut map,
        );
    }

    scan_dir(
        &project_root.join(".claude").join("skills"),
        SkillPriority::ProjectClaude,
        &mut map,
    );
    scan_dir(
        &project_root.join(".agents").join("skills"),
        SkillPriority::ProjectAgents,
        &mut map,
    );

    SkillSet::new(map.into_values().collect())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
