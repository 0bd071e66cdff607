//! Render loaded skills into the one-time system message.

use chrono::NaiveDate;

use super::loader::SkillDescriptor;
use crate::config::SkillContextMode;

/// Build the skills block: one list line per skill (name, description, path), the available
/// tool names, and in [`SkillContextMode::Full`] each skill's instructions.
///
/// Returns an empty string when there are neither skills nor tools.
pub fn render_skill_prompt<S: AsRef<str>>(
    skills: &[SkillDescriptor],
    tool_names: &[S],
    mode: SkillContextMode,
) -> String {
    let mut out = String::new();
    if !skills.is_empty() {
        out.push_str("## Skills\n\n");
        out.push_str(match mode {
            SkillContextMode::Full => {
                "The following skills are available. Follow a skill's instructions when the user's request clearly matches it.\n\n"
            }
            SkillContextMode::ReadOnDemand => {
                "The following skills are available. Use the read_skill tool to load a skill's full instructions when the user's request clearly matches it.\n\n"
            }
        });
        for s in skills {
            out.push_str(&skill_line(s));
            out.push('\n');
        }
        out.push('\n');
    }

    let mut names: Vec<&str> = tool_names.iter().map(|n| n.as_ref()).collect();
    names.sort_unstable();
    if !names.is_empty() {
        out.push_str("Available tools: ");
        out.push_str(&names.join(", "));
        out.push_str("\n\n");
    }

    if mode == SkillContextMode::Full && !skills.is_empty() {
        out.push_str("## Skill instructions\n\n");
        for s in skills {
            out.push_str("### ");
            out.push_str(&s.name);
            out.push_str("\n\n");
            let body = s.instructions.trim();
            if !body.is_empty() {
                out.push_str(body);
                out.push_str("\n\n");
            }
        }
    }

    out.truncate(out.trim_end().len());
    out
}

fn skill_line(s: &SkillDescriptor) -> String {
    format!(
        "- **{}**: {} (path: {})",
        s.name,
        s.description.trim(),
        s.source_path.display()
    )
}

/// Compose the full system message: today's date, workspace context (AGENTS.md), then the
/// skills block. Returns None when there is nothing but the date to say.
pub fn build_system_context(
    today: NaiveDate,
    agent_ctx: Option<&str>,
    skills_block: &str,
) -> Option<String> {
    let agent_ctx = agent_ctx.map(str::trim).filter(|c| !c.is_empty());
    let skills_block = skills_block.trim();
    if agent_ctx.is_none() && skills_block.is_empty() {
        return None;
    }
    let mut out = format!("Today's date: {}\n\n", today.format("%Y-%m-%d"));
    if let Some(ctx) = agent_ctx {
        out.push_str(ctx);
        out.push_str("\n\n");
    }
    out.push_str(skills_block);
    out.truncate(out.trim_end().len());
    Some(out)
}
