//! Assemble an [`Engine`] from config: load skills and workspace context, build the tool
//! registry, render the system prompt, and connect the model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::agent::Engine;
use crate::agent_ctx;
use crate::config::{self, Config, SkillContextMode};
use crate::llm::{Model, OllamaClient, OllamaModel};
use crate::session::{MemorySessionStore, SessionStore};
use crate::skills::{build_system_context, load_skill_roots, render_skill_prompt, SkillDescriptor};
use crate::tools::{builtin_registry, ToolRegistry, Workspace};

/// Everything the engine needs that comes from disk, before a model is attached.
pub struct Runtime {
    pub config: Config,
    pub config_path: PathBuf,
    pub workspace_dir: PathBuf,
    pub skills: Arc<Vec<SkillDescriptor>>,
    pub tools: Arc<ToolRegistry>,
    pub system_prompt: Option<String>,
}

/// Load skills from every configured root, dropping disabled names.
pub fn load_configured_skills(config: &Config, config_path: &Path) -> Vec<SkillDescriptor> {
    let roots = config::resolve_skill_roots(config, config_path);
    let mut skills = load_skill_roots(&roots);
    skills.retain(|s| !config.skills.disabled.iter().any(|n| n == &s.name));
    log::info!("loaded {} skill(s)", skills.len());
    skills
}

impl Runtime {
    pub fn load(config: Config, config_path: PathBuf) -> Result<Self> {
        let workspace_dir = config::resolve_workspace_dir(&config, &config_path);
        let skills = Arc::new(load_configured_skills(&config, &config_path));
        let context_mode = config.skills.context_mode;
        if context_mode == SkillContextMode::ReadOnDemand {
            log::info!("skill context mode: readOnDemand (compact list + read_skill tool)");
        }

        let workspace = Arc::new(Workspace::new(workspace_dir.clone()));
        let tools = builtin_registry(workspace, &config.tools, skills.clone(), context_mode)
            .context("building tool registry")?;

        let agent_ctx = agent_ctx::load_agent_ctx(&workspace_dir);
        let skills_block = render_skill_prompt(&skills, &tools.names(), context_mode);
        let system_prompt = build_system_context(
            chrono::Local::now().date_naive(),
            agent_ctx.as_deref(),
            &skills_block,
        );

        Ok(Self {
            config,
            config_path,
            workspace_dir,
            skills,
            tools: Arc::new(tools),
            system_prompt,
        })
    }

    /// Ollama client for the configured (or OLLAMA_HOST) base URL.
    pub fn ollama_client(&self) -> OllamaClient {
        OllamaClient::new(config::resolve_ollama_base_url(&self.config))
    }

    /// Ollama-backed model: explicit name, then AGENTLOOP_MODEL, then `agents.defaultModel`.
    pub fn ollama_model(&self, explicit: Option<&str>) -> Result<OllamaModel> {
        let name = config::resolve_model(&self.config, explicit).context(
            "no model configured; set agents.defaultModel in the config or pass --model",
        )?;
        let client = self.ollama_client();
        log::info!("using model {} at {}", name, client.base_url());
        Ok(OllamaModel::new(client, name))
    }

    /// Engine over `model` with an in-memory session store.
    pub fn engine(&self, model: Arc<dyn Model>) -> Result<Engine> {
        self.engine_with_store(model, Arc::new(MemorySessionStore::new()))
    }

    pub fn engine_with_store(
        &self,
        model: Arc<dyn Model>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Engine> {
        let mut builder = Engine::builder()
            .model(model)
            .tools(self.tools.clone())
            .store(store)
            .max_turns(self.config.agents.max_turns())
            .reply_timeout(self.config.agents.reply_timeout());
        if let Some(prompt) = &self.system_prompt {
            builder = builder.system_prompt(prompt.clone());
        }
        Ok(builder.build()?)
    }
}
