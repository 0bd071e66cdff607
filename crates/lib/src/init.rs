//! `agentloop init`: lay out the config directory from the templates embedded in this crate.
//!
//! ```text
//! crates/lib/config/config.json             -> <dir>/config.json
//! crates/lib/config/workspace/AGENTS.md     -> <dir>/workspace/AGENTS.md
//! crates/lib/config/skills/<name>/SKILL.md  -> <dir>/skills/<name>/SKILL.md
//! ```
//!
//! Seeding only fills gaps. Anything already on disk is left untouched.

use anyhow::{Context, Result};
use include_dir::{include_dir, Dir};
use std::path::{Path, PathBuf};

use crate::agent_ctx::AGENT_CTX_FILE;
use crate::config;

static TEMPLATE_SKILLS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/config/skills");
static TEMPLATE_AGENT_CTX: &str = include_str!("../config/workspace/AGENTS.md");
static TEMPLATE_CONFIG: &str = include_str!("../config/config.json");

/// What `init_config_dir` created on this run.
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub config_dir: PathBuf,
    /// Paths written or created, in creation order. Empty when everything already existed.
    pub created: Vec<PathBuf>,
}

impl InitReport {
    fn seed_file(&mut self, path: PathBuf, contents: &str) -> Result<()> {
        if path.exists() {
            log::debug!("{} exists, keeping it", path.display());
            return Ok(());
        }
        std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {}", path.display());
        self.created.push(path);
        Ok(())
    }

    fn seed_dir(&mut self, path: PathBuf) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        std::fs::create_dir_all(&path)
            .with_context(|| format!("creating directory {}", path.display()))?;
        self.created.push(path);
        Ok(true)
    }
}

/// Fail with a pointer to `agentloop init` when the config file or the primary skill root is missing.
pub fn require_initialized(config_path: &Path, config: &config::Config) -> Result<()> {
    let skills_dir = config::resolve_skills_dir(config, config_path);
    for (what, path) in [("config file", config_path), ("skills directory", skills_dir.as_path())] {
        if !path.exists() {
            anyhow::bail!(
                "{} not found at {}; run `agentloop init` to create it",
                what,
                path.display()
            );
        }
    }
    Ok(())
}

/// Seed the directory holding `config_path` with a default config, a workspace with AGENTS.md,
/// and the bundled skills. The skills are only extracted when the `skills` directory is new, so
/// skills a user deleted do not come back.
pub fn init_config_dir(config_path: &Path) -> Result<InitReport> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let mut report = InitReport {
        config_dir: config_dir.clone(),
        created: Vec::new(),
    };

    report.seed_dir(config_dir.clone())?;
    report.seed_file(config_path.to_path_buf(), TEMPLATE_CONFIG)?;

    let workspace = config_dir.join("workspace");
    report.seed_dir(workspace.clone())?;
    report.seed_file(workspace.join(AGENT_CTX_FILE), TEMPLATE_AGENT_CTX)?;

    let skills_dir = config_dir.join("skills");
    if report.seed_dir(skills_dir.clone())? {
        TEMPLATE_SKILLS
            .extract(&skills_dir)
            .with_context(|| format!("extracting bundled skills to {}", skills_dir.display()))?;
        log::info!(
            "extracted {} bundled skill(s) to {}",
            TEMPLATE_SKILLS.dirs().count(),
            skills_dir.display()
        );
    }

    Ok(report)
}
