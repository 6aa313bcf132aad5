// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use crate::skill::Skill;

/// Fixed marker prefixing the injected skill-catalog system message.
///
/// The agent scans existing history for a system message starting with this
/// marker and only appends a fresh catalog when none exists or the content
/// changed, so repeated turns do not accumulate catalogs (and provider-side
/// prompt caches stay valid).
pub const CATALOG_MARKER: &str = "[[SKILL_CATALOG]]\n";

/// Marker prefixing the active skill's rendered prompt, one per skill name.
pub fn skill_prompt_marker(name: &str) -> String {
    format!("[[SKILL_PROMPT:{name}]]\n")
}

/// Render the skill catalog block injected into the system context.
///
/// Lists every skill name with its description, sorted by name, under a
/// header that tells the model how to fetch a skill's full content.
pub fn build_skill_catalog(skills: &[Skill]) -> String {
    let mut sorted: Vec<&Skill> = skills.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::from(CATALOG_MARKER);
    out.push_str(
        "# Available skills\n\
         The following skills are available. Use the read_skill tool with a\n\
         skill name to fetch its full instructions.\n\n",
    );
    for skill in sorted {
        if skill.description.is_empty() {
            out.push_str(&format!("- **{}**\n", skill.name));
        } else {
            out.push_str(&format!("- **{}**: {}\n", skill.name, skill.description.trim()));
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::SkillPriority;

    fn skill(name: &str, description: &str) -> Skill {
        Skill {
            name: name.into(),
            description: description.into(),
            allowed_tools: vec![],
            argument_hint: String::new(),
            user_invocable: true,
            model_pref: None,
            content: String::new(),
            priority: SkillPriority::Embedded,
        }
    }

    #[test]
    fn catalog_starts_with_marker() {
        let c = build_skill_catalog(&[skill("code", "General coding.")]);
        assert!(c.starts_with(CATALOG_MARKER));
    }

    #[test]
    fn catalog_sorted_by_name() {
        let c = build_skill_catalog(&[skill("zeta", "Z."), skill("alpha", "A.")]);
        let zi = c.find("**zeta**").unwrap();
        let ai = c.find("**alpha**").unwrap();
        assert!(ai < zi);
    }

    #[test]
    fn catalog_mentions_read_skill() {
        let c = build_skill_catalog(&[skill("code", "d")]);
        assert!(c.contains("read_skill"));
    }

    #[test]
    fn identical_input_renders_identical_catalog() {
        let skills = vec![skill("a", "one"), skill("b", "two")];
        assert_eq!(build_skill_catalog(&skills), build_skill_catalog(&skills));
    }

    #[test]
    fn prompt_marker_embeds_name() {
        assert_eq!(skill_prompt_marker("code"), "[[SKILL_PROMPT:code]]\n");
    }
}
