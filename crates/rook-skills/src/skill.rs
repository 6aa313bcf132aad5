// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;

/// Where a skill was loaded from; higher values override lower ones on a
/// name collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkillPriority {
    Embedded = 0,
    UserClaude = 1,
    UserAgents = 2,
    ProjectClaude = 3,
    ProjectAgents = 4,
}

/// A named prompt template plus a tool allow-list.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Tool names this skill may use.  Empty = all tools.
    pub allowed_tools: Vec<String>,
    /// Hint shown to users about expected arguments.
    pub argument_hint: String,
    /// Whether users may invoke the skill directly (vs. model-only).
    pub user_invocable: bool,
    /// Preferred model name, advisory only.
    pub model_pref: Option<String>,
    /// Template body — everything after the closing frontmatter fence.
    pub content: String,
    pub priority: SkillPriority,
}

#[derive(Debug, Deserialize)]
struct RawFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    /// Accepts either a YAML list or a comma-separated string.
    #[serde(default, rename = "allowed-tools")]
    allowed_tools: Option<AllowedTools>,
    #[serde(default, rename = "argument-hint")]
    argument_hint: Option<String>,
    #[serde(default = "default_true", rename = "user-invocable")]
    user_invocable: bool,
    #[serde(default)]
    model: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AllowedTools {
    List(Vec<String>),
    Csv(String),
}

impl AllowedTools {
    fn into_vec(self) -> Vec<String> {
        match self {
            AllowedTools::List(v) => v
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            AllowedTools::Csv(s) => s
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

/// Parse one skill file: YAML frontmatter delimited by `---` fences, then
/// the markdown body.
///
/// `fallback_name` (usually the file stem) is used when the frontmatter
/// has no `name:`.  A file without frontmatter becomes a skill whose body
/// is the whole file and whose description is empty.
pub fn parse_skill_file(raw: &str, fallback_name: &str, priority: SkillPriority) -> Option<Skill> {
    let rest = raw.trim_start_matches('\n');

    if let Some(after_open) = rest.strip_prefix("---") {
        let close = after_open.find("\n---")?;
        let yaml_block = &after_open[..close];
        let body = after_open[close + 4..].trim_start_matches('\n').to_string();

        let fm: RawFrontmatter = serde_yaml::from_str(yaml_block).ok()?;
        let name = fm
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string());

        return Some(Skill {
            name,
            description: fm.description,
            allowed_tools: fm.allowed_tools.map(AllowedTools::into_vec).unwrap_or_default(),
            argument_hint: fm.argument_hint.unwrap_or_default(),
            user_invocable: fm.user_invocable,
            model_pref: fm.model,
            content: body,
            priority,
        });
    }

    if rest.trim().is_empty() {
        return None;
    }

    // Frontmatter-free file: the whole text is the body.
    Some(Skill {
        name: fallback_name.to_string(),
        description: String::new(),
        allowed_tools: Vec::new(),
        argument_hint: String::new(),
        user_invocable: true,
        model_pref: None,
        content: rest.to_string(),
        priority,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
