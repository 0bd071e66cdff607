//! Tool layer: the registry the engine dispatches through, plus the built-in tools
//! (file I/O, shell, web fetch, read_skill).

mod fs;
mod registry;
mod shell;
mod skill;
mod web;

use std::sync::Arc;
use std::time::Duration;

pub use fs::{edit_file_tool, glob_tool, grep_tool, read_file_tool, write_file_tool, Workspace};
pub use registry::{
    FieldKind, FieldSpec, InputSchema, RegistryError, Tool, ToolError, ToolHandler, ToolRegistry,
    ToolSpec,
};
pub use shell::bash_tool;
pub use skill::read_skill_tool;
pub use web::web_fetch_tool;

use crate::config::{SkillContextMode, ToolsConfig};
use crate::skills::SkillDescriptor;

/// Names of the built-in tools, in registration order.
pub const BUILTIN_TOOLS: &[&str] = &[
    "read_file",
    "write_file",
    "edit_file",
    "glob",
    "grep",
    "bash",
    "web_fetch",
];

/// Build the registry of built-in tools rooted at `workspace`. `config.enabled`, when set,
/// restricts which built-ins are registered. read_skill is added in read-on-demand mode.
pub fn builtin_registry(
    workspace: Arc<Workspace>,
    config: &ToolsConfig,
    skills: Arc<Vec<SkillDescriptor>>,
    context_mode: SkillContextMode,
) -> anyhow::Result<ToolRegistry> {
    let enabled = |name: &str| match &config.enabled {
        Some(list) => list.iter().any(|n| n == name),
        None => true,
    };
    let mut candidates = vec![
        read_file_tool(workspace.clone()),
        write_file_tool(workspace.clone()),
        edit_file_tool(workspace.clone()),
        glob_tool(workspace.clone()),
        grep_tool(workspace.clone()),
        bash_tool(
            workspace,
            Duration::from_secs(config.command_timeout_secs),
            config.max_output_bytes,
        ),
    ];
    if enabled("web_fetch") {
        candidates.push(web_fetch_tool(config.max_output_bytes)?);
    }

    let mut registry = ToolRegistry::new();
    for tool in candidates {
        if enabled(&tool.name) {
            registry.register(tool)?;
        }
    }
    if context_mode == SkillContextMode::ReadOnDemand && !skills.is_empty() {
        registry.register(read_skill_tool(skills))?;
    }
    if let Some(list) = &config.enabled {
        for name in list {
            if !BUILTIN_TOOLS.contains(&name.as_str()) {
                log::warn!("tools.enabled names unknown tool {}", name);
            }
        }
    }
    log::info!("registered {} tool(s): {}", registry.len(), registry.names().join(", "));
    Ok(registry)
}

/// Truncate to at most `max_bytes`, backing off to a char boundary, with a marker.
pub(crate) fn truncate_output(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [output truncated at {} bytes]", &s[..end], max_bytes)
}
