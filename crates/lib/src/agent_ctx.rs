//! Workspace context: the AGENTS.md file that describes overall agent behavior.
//!
//! Separate from skills. Skills describe procedures the model can follow; the workspace context
//! describes how the agent should behave in this workspace.

use std::fs;
use std::path::Path;

pub const AGENT_CTX_FILE: &str = "AGENTS.md";

/// Load AGENTS.md from the workspace root. Missing, unreadable, or blank files yield None.
pub fn load_agent_ctx(workspace_dir: &Path) -> Option<String> {
    let path = workspace_dir.join(AGENT_CTX_FILE);
    match fs::read_to_string(&path) {
        Ok(s) if !s.trim().is_empty() => Some(s),
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            log::warn!("could not read {}: {}", path.display(), e);
            None
        }
    }
}
