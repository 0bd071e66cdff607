//! Skills: load SKILL.md instruction documents from directories and render them into the
//! system message.
//!
//! Skills load from the config directory's skills (~/.agentloop/skills) and any
//! config.skills.extraDirs. Precedence: extra overwrites config dir by name.

mod loader;
mod render;

pub use loader::{load_skill_roots, load_skills, parse_skill, SkillDescriptor, SkillParseError, SKILL_FILE};
pub use render::{build_system_context, render_skill_prompt};
