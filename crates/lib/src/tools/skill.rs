//! read_skill: return a loaded skill's instructions by name (read-on-demand context mode).

use std::sync::Arc;

use async_trait::async_trait;

use super::registry::{str_arg, FieldKind, InputSchema, Tool, ToolError, ToolHandler};
use crate::message::ToolArgs;
use crate::skills::SkillDescriptor;

struct ReadSkill {
    skills: Arc<Vec<SkillDescriptor>>,
}

#[async_trait]
impl ToolHandler for ReadSkill {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        let name = str_arg(&args, "skill_name")?;
        let skill = self
            .skills
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ToolError::Failed(format!("unknown skill: {}", name)))?;
        Ok(skill.instructions.clone())
    }
}

pub fn read_skill_tool(skills: Arc<Vec<SkillDescriptor>>) -> Tool {
    Tool::new(
        "read_skill",
        "Load the full instructions for a skill. Call when the user's request clearly applies to that skill.",
        InputSchema::new().required(
            "skill_name",
            FieldKind::String,
            "Exact skill name from the available skills list",
        ),
        Arc::new(ReadSkill { skills }),
    )
}
