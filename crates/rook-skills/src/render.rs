// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;

use tracing::debug;

use crate::skill::Skill;

/// Split an argument string on whitespace, honoring single and double
/// quotes: `install "two words" 'three more words'` yields three items.
/// Quotes are stripped from the resulting tokens; an unterminated quote
/// runs to the end of the string.
pub fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in args.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Substitute positional placeholders into `template`.
///
/// `$ARGUMENTS[N]` and `$N` resolve to the Nth positional argument (empty
/// when out of range) and are replaced before the bare `$ARGUMENTS`, which
/// would otherwise swallow the indexed form's prefix.  Returns the rendered
/// text and whether any placeholder was present.
fn substitute_arguments(template: &str, args: &str) -> (String, bool) {
    let positional = split_args(args);
    let mut text = template.to_string();
    let mut had_placeholder = false;

    // Unfilled indexed placeholders collapse to empty strings.  Highest
    // index first so `$12` is never mangled by the `$1` replacement.
    for i in (positional.len()..10).rev() {
        for pattern in [format!("$ARGUMENTS[{i}]"), format!("${}", i + 1)] {
            if text.contains(&pattern) {
                had_placeholder = true;
                text = text.replace(&pattern, "");
            }
        }
    }
    for (i, value) in positional.iter().enumerate().rev() {
        for pattern in [format!("$ARGUMENTS[{i}]"), format!("${}", i + 1)] {
            if text.contains(&pattern) {
                had_placeholder = true;
                text = text.replace(&pattern, value);
            }
        }
    }

    if text.contains("$ARGUMENTS") {
        had_placeholder = true;
        text = text.replace("$ARGUMENTS", args);
    }

    (text, had_placeholder)
}

/// Inline `@path` include lines.
///
/// A line whose trimmed content starts with `@` names a file (absolute,
/// `~`-expanded, or relative to `working_dir`).  On success the line is
/// replaced by the file content between BEGIN/END markers; on failure the
/// line is dropped.
fn expand_includes(text: &str, working_dir: &Path) -> String {
    let mut out_lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        let Some(raw_path) = trimmed.strip_prefix('@') else {
            out_lines.push(line.to_string());
            continue;
        };
        let expanded = shellexpand::tilde(raw_path.trim()).into_owned();
        let path = if Path::new(&expanded).is_absolute() {
            std::path::PathBuf::from(&expanded)
        } else {
            working_dir.join(&expanded)
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let rel = raw_path.trim();
                out_lines.push(format!("----- BEGIN {rel} -----"));
                out_lines.push(content.trim_end().to_string());
                out_lines.push(format!("----- END {rel} -----"));
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "dropping unreadable @include");
            }
        }
    }
    out_lines.join("\n")
}

/// Render a skill body for activation.
///
/// Applies, in order: `{{workingDir}}` substitution, positional argument
/// placeholders, `@file` includes.  When the body consumed no argument
/// placeholder and `args` is non-empty, the arguments are appended as an
/// `ARGUMENTS:` trailer so they are never silently lost.
pub fn render_skill(skill: &Skill, args: &str, working_dir: &Path) -> String {
    let text = skill
        .content
        .replace("{{workingDir}}", &working_dir.to_string_lossy());
    let (text, had_placeholder) = substitute_arguments(&text, args);
    let mut text = expand_includes(&text, working_dir);
    if !had_placeholder && !args.is_empty() {
        text.push_str("\nARGUMENTS: ");
        text.push_str(args);
    }
    text
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::SkillPriority;

    fn skill(content: &str) -> Skill {
        Skill {
            name: "t".into(),
            description: String::new(),
            allowed_tools: vec![],
            argument_hint: String::new(),
            user_invocable: true,
            model_pref: None,
            content: content.into(),
            priority: SkillPriority::Embedded,
        }
    }

    // ── split_args ────────────────────────────────────────────────────────────

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(split_args("a b  c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn respects_double_quotes() {
        assert_eq!(split_args(r#"one "two words" three"#), vec!["one", "two words", "three"]);
    }

    #[test]
    fn respects_single_quotes() {
        assert_eq!(split_args("say 'hello world'"), vec!["say", "hello world"]);
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        assert_eq!(split_args("a \"b c"), vec!["a", "b c"]);
    }

    #[test]
    fn empty_input_yields_no_args() {
        assert!(split_args("").is_empty());
        assert!(split_args("   ").is_empty());
    }

    // ── Placeholder substitution ──────────────────────────────────────────────

    #[test]
    fn working_dir_substituted() {
        let out = render_skill(&skill("cwd is {{workingDir}}"), "", Path::new("/work"));
        assert_eq!(out, "cwd is /work");
    }

    #[test]
    fn dollar_arguments_substituted() {
        let out = render_skill(&skill("do: $ARGUMENTS"), "fix the bug", Path::new("/w"));
        assert_eq!(out, "do: fix the bug");
    }

    #[test]
    fn indexed_before_bare_arguments() {
        // $ARGUMENTS[0] must not be mangled by the bare $ARGUMENTS pass.
        let out = render_skill(&skill("first=$ARGUMENTS[0] all=$ARGUMENTS"), "a b", Path::new("/w"));
        assert_eq!(out, "first=a all=a b");
    }

    #[test]
    fn dollar_n_is_one_indexed() {
        let out = render_skill(&skill("$1 then $2"), "alpha beta", Path::new("/w"));
        assert_eq!(out, "alpha then beta");
    }

    #[test]
    fn out_of_range_positional_collapses_to_empty() {
        let out = render_skill(&skill("[$2]"), "only-one", Path::new("/w"));
        assert_eq!(out, "[]");
    }

    #[test]
    fn quoted_argument_substitutes_whole() {
        let out = render_skill(&skill("msg=$1"), r#""two words""#, Path::new("/w"));
        assert_eq!(out, "msg=two words");
    }

    #[test]
    fn args_appended_when_no_placeholder() {
        let out = render_skill(&skill("Static body."), "extra input", Path::new("/w"));
        assert_eq!(out, "Static body.\nARGUMENTS: extra input");
    }

    #[test]
    fn no_trailer_when_placeholder_consumed_args() {
        let out = render_skill(&skill("do $ARGUMENTS"), "x", Path::new("/w"));
        assert!(!out.contains("ARGUMENTS:"));
    }

    #[test]
    fn no_trailer_when_args_empty() {
        let out = render_skill(&skill("Static."), "", Path::new("/w"));
        assert_eq!(out, "Static.");
    }

    // ── @includes ─────────────────────────────────────────────────────────────

    #[test]
    fn include_inlines_file_with_markers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ctx.md"), "context body\n").unwrap();
        let out = render_skill(&skill("before\n@ctx.md\nafter"), "", dir.path());
        assert!(out.contains("----- BEGIN ctx.md -----"));
        assert!(out.contains("context body"));
        assert!(out.contains("----- END ctx.md -----"));
        assert!(out.starts_with("before\n"));
        assert!(out.ends_with("after"));
    }

    #[test]
    fn missing_include_line_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let out = render_skill(&skill("a\n@missing.md\nb"), "", dir.path());
        assert_eq!(out, "a\nb");
    }

    #[test]
    fn absolute_include_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("abs.txt");
        std::fs::write(&file, "absolute content").unwrap();
        let body = format!("@{}", file.display());
        let out = render_skill(&skill(&body), "", Path::new("/elsewhere"));
        assert!(out.contains("absolute content"));
    }

    #[test]
    fn email_like_text_mid_line_is_not_include() {
        let out = render_skill(&skill("mail me at x@example.com"), "", Path::new("/w"));
        assert_eq!(out, "mail me at x@example.com");
    }
}
