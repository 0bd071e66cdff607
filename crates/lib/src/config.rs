//! Configuration types and loading.
//!
//! Config is loaded from a JSON or YAML file (e.g. `~/.agentloop/config.json`) and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Agent defaults (model, workspace, loop limits).
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Ollama connection.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Skills load paths and options.
    #[serde(default)]
    pub skills: SkillsConfig,

    /// Built-in tool options.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Agent defaults (model, workspace, loop limits).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    /// Default Ollama model: use the exact name from `ollama list` (e.g. "llama3.2:latest").
    pub default_model: Option<String>,
    /// Workspace root for file and shell tools, and location of AGENTS.md (default ~/.agentloop/workspace).
    pub workspace: Option<PathBuf>,
    /// Maximum model calls for one message before giving up. 0 disables the limit.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Deadline in seconds for answering one message (all model and tool calls). Unset = no deadline.
    #[serde(default)]
    pub reply_timeout_secs: Option<u64>,
}

fn default_max_turns() -> u32 {
    crate::agent::DEFAULT_MAX_TURNS
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            workspace: None,
            max_turns: default_max_turns(),
            reply_timeout_secs: None,
        }
    }
}

impl AgentsConfig {
    pub fn max_turns(&self) -> Option<u32> {
        (self.max_turns > 0).then_some(self.max_turns)
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

/// Ollama server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaConfig {
    /// Base URL (default http://127.0.0.1:11434). Overridden by OLLAMA_HOST env.
    pub base_url: Option<String>,
}

/// How skill documentation is provided to the agent: full (every skill's instructions in the system message) or read-on-demand (compact list + read_skill tool).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkillContextMode {
    /// All loaded skills' instructions are injected into the system message. Best for few skills and smaller local models.
    #[default]
    Full,
    /// System message contains only a compact list (name, description, path). The model uses the read_skill tool to load a skill's instructions when needed.
    ReadOnDemand,
}

/// Skills load config (dirs, disabled list, context mode).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsConfig {
    /// Override the default skill root. Relative paths are resolved against the config file's parent. Omit to use the `skills` directory next to the config file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Extra skill directories; later entries override earlier ones by skill name.
    #[serde(default)]
    pub extra_dirs: Vec<PathBuf>,
    /// Skill names to skip even when present in a directory.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// "full" (default) or "readOnDemand".
    #[serde(default)]
    pub context_mode: SkillContextMode,
}

/// Built-in tool options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    /// When set, only these built-in tools are registered.
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
    /// Default timeout for the bash tool (seconds).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Output cap for bash and web_fetch results (bytes).
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_command_timeout_secs() -> u64 {
    60
}

fn default_max_output_bytes() -> usize {
    20_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            command_timeout_secs: default_command_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the Ollama base URL: env OLLAMA_HOST overrides config. A bare host:port gets an http:// scheme.
pub fn resolve_ollama_base_url(config: &Config) -> Option<String> {
    non_empty_env("OLLAMA_HOST")
        .or_else(|| {
            config
                .ollama
                .base_url
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .map(|u| {
            if u.contains("://") {
                u
            } else {
                format!("http://{}", u)
            }
        })
}

/// Resolve the model name: explicit override, then env AGENTLOOP_MODEL, then config.
pub fn resolve_model(config: &Config, explicit: Option<&str>) -> Option<String> {
    explicit
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| non_empty_env("AGENTLOOP_MODEL"))
        .or_else(|| {
            config
                .agents
                .default_model
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("AGENTLOOP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".agentloop").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve workspace directory for tools and agent context (AGENTS.md).
pub fn resolve_workspace_dir(config: &Config, config_path: &Path) -> PathBuf {
    match &config.agents.workspace {
        Some(w) if w.is_absolute() => w.clone(),
        Some(w) => config_parent(config_path).join(w),
        None => config_parent(config_path).join("workspace"),
    }
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        parse_config(&s, &path)?
    };
    Ok((config, path))
}

/// Parse by extension: .yaml/.yml as YAML, anything else as JSON.
pub fn parse_config(s: &str, path: &Path) -> Result<Config> {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);
    if is_yaml {
        serde_yaml::from_str(s).with_context(|| format!("parsing config from {}", path.display()))
    } else {
        serde_json::from_str(s).with_context(|| format!("parsing config from {}", path.display()))
    }
}

/// Default skill root when no override is set: `skills` subdirectory of the config file's parent.
pub fn skills_dir(config_path: &Path) -> PathBuf {
    config_parent(config_path).join("skills")
}

/// Resolve the primary skill root: uses `config.skills.directory` if set (relative paths resolved against the config file's parent), otherwise the default `skills` subdirectory.
pub fn resolve_skills_dir(config: &Config, config_path: &Path) -> PathBuf {
    match &config.skills.directory {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_parent(config_path).join(d)
            }
        }
        _ => skills_dir(config_path),
    }
}

/// All skill roots in precedence order: primary root first, then extra dirs.
pub fn resolve_skill_roots(config: &Config, config_path: &Path) -> Vec<PathBuf> {
    let mut roots = vec![resolve_skills_dir(config, config_path)];
    roots.extend(config.skills.extra_dirs.iter().map(|d| {
        if d.is_absolute() {
            d.clone()
        } else {
            config_parent(config_path).join(d)
        }
    }));
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.agents.max_turns(), Some(25));
        assert_eq!(c.agents.reply_timeout(), None);
        assert_eq!(c.tools.command_timeout_secs, 60);
        assert_eq!(c.tools.max_output_bytes, 20_000);
        assert_eq!(c.skills.context_mode, SkillContextMode::Full);
    }

    #[test]
    fn parses_json_and_yaml() {
        let json = r#"{"agents": {"defaultModel": "qwen3:8b", "maxTurns": 0, "replyTimeoutSecs": 90},
                       "skills": {"contextMode": "readOnDemand", "disabled": ["x"]}}"#;
        let c = parse_config(json, Path::new("config.json")).unwrap();
        assert_eq!(c.agents.default_model.as_deref(), Some("qwen3:8b"));
        assert_eq!(c.agents.max_turns(), None);
        assert_eq!(c.agents.reply_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(c.skills.context_mode, SkillContextMode::ReadOnDemand);
        assert_eq!(c.skills.disabled, vec!["x"]);

        let yaml = "tools:\n  enabled: [bash, grep]\n  commandTimeoutSecs: 5\n";
        let c = parse_config(yaml, Path::new("config.yaml")).unwrap();
        assert_eq!(c.tools.enabled, Some(vec!["bash".to_string(), "grep".to_string()]));
        assert_eq!(c.tools.command_timeout_secs, 5);
        assert_eq!(c.tools.max_output_bytes, 20_000);
    }

    #[test]
    fn parse_error_names_file() {
        let err = parse_config("{", Path::new("/etc/agentloop.json")).unwrap_err();
        assert!(err.to_string().contains("/etc/agentloop.json"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("agentloop-none-{}.json", uuid::Uuid::new_v4()));
        let (c, p) = load_config(Some(path.clone())).unwrap();
        assert_eq!(p, path);
        assert!(c.agents.default_model.is_none());
    }

    #[test]
    fn resolve_skills_dir_default() {
        let config = Config::default();
        let path = Path::new("/home/user/.agentloop/config.json");
        assert_eq!(
            resolve_skills_dir(&config, path),
            PathBuf::from("/home/user/.agentloop/skills")
        );
    }

    #[test]
    fn resolve_skills_dir_override_relative() {
        let mut config = Config::default();
        config.skills.directory = Some(PathBuf::from("custom/skills"));
        let path = Path::new("/home/user/.agentloop/config.json");
        assert_eq!(
            resolve_skills_dir(&config, path),
            PathBuf::from("/home/user/.agentloop/custom/skills")
        );
    }

    #[test]
    fn resolve_skill_roots_in_precedence_order() {
        let mut config = Config::default();
        config.skills.extra_dirs = vec![PathBuf::from("/repo/skills"), PathBuf::from("more")];
        let path = Path::new("/home/user/.agentloop/config.json");
        assert_eq!(
            resolve_skill_roots(&config, path),
            vec![
                PathBuf::from("/home/user/.agentloop/skills"),
                PathBuf::from("/repo/skills"),
                PathBuf::from("/home/user/.agentloop/more"),
            ]
        );
    }

    #[test]
    fn resolve_workspace_default_and_override() {
        let mut config = Config::default();
        let path = Path::new("/home/user/.agentloop/config.json");
        assert_eq!(
            resolve_workspace_dir(&config, path),
            PathBuf::from("/home/user/.agentloop/workspace")
        );
        config.agents.workspace = Some(PathBuf::from("/src/project"));
        assert_eq!(resolve_workspace_dir(&config, path), PathBuf::from("/src/project"));
    }

    #[test]
    fn resolve_model_prefers_explicit() {
        let mut config = Config::default();
        config.agents.default_model = Some("llama3.2:latest".to_string());
        assert_eq!(resolve_model(&config, Some(" qwen3:8b ")).as_deref(), Some("qwen3:8b"));
    }
}
