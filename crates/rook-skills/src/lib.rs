// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Skill discovery, parsing, rendering, and the skill catalog.
//!
//! A skill is a markdown file with YAML frontmatter: a named prompt
//! template plus an allow-list of tool names.  Skills come from (highest
//! precedence first):
//!
//! ```text
//! <project>/.agents/skills/*.md
//! <project>/.claude/skills/*.md
//! ~/.agents/skills/*.md
//! ~/.claude/skills/*.md
//! built-ins embedded in the binary
//! ```
//!
//! On a name collision the higher-precedence source wins.

pub mod catalog;
pub mod discover;
pub mod read_skill;
pub mod render;
pub mod skill;

pub use catalog::{build_skill_catalog, skill_prompt_marker, CATALOG_MARKER};
pub use discover::{discover_skills, embedded_skills, SkillSet};
pub use read_skill::ReadSkillTool;
pub use render::{render_skill, split_args};
pub use skill::{parse_skill_file, Skill, SkillPriority};
