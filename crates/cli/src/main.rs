use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use agentloop::runtime::Runtime;

#[derive(Parser)]
#[command(name = "agentloop")]
#[command(about = "agentloop CLI: a tool-using agent backed by Ollama", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, workspace with AGENTS.md, bundled skills).
    Init {
        /// Config file path (default: AGENTLOOP_CONFIG_PATH or ~/.agentloop/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List the skills that would be offered to the agent (after precedence and the disabled list).
    Skills {
        /// Config file path (default: AGENTLOOP_CONFIG_PATH or ~/.agentloop/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List models available on the Ollama server.
    Models {
        /// Config file path (default: AGENTLOOP_CONFIG_PATH or ~/.agentloop/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat with the agent (interactive). `/new` starts a fresh thread; `/exit` or `/quit` leaves.
    Chat {
        /// Config file path (default: AGENTLOOP_CONFIG_PATH or ~/.agentloop/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Thread id to use instead of a generated one.
        #[arg(long, value_name = "ID")]
        thread: Option<String>,

        /// Model name (default: AGENTLOOP_MODEL or agents.defaultModel)
        #[arg(long, short, value_name = "MODEL")]
        model: Option<String>,
    },

    /// Send one message, run the agent until it answers, and print the reply.
    Run {
        /// Config file path (default: AGENTLOOP_CONFIG_PATH or ~/.agentloop/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Model name (default: AGENTLOOP_MODEL or agents.defaultModel)
        #[arg(long, short, value_name = "MODEL")]
        model: Option<String>,

        /// Print the whole transcript as JSON instead of the final answer.
        #[arg(long)]
        json: bool,

        /// The message to send.
        message: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("agentloop {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Skills { config }) => {
            if let Err(e) = run_skills(config) {
                log::error!("skills failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Models { config }) => {
            if let Err(e) = run_models(config).await {
                log::error!("models failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            thread,
            model,
        }) => {
            if let Err(e) = run_chat(config, thread, model).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run {
            config,
            model,
            json,
            message,
        }) => {
            if let Err(e) = run_once(config, model, json, message).await {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(agentloop::config::default_config_path);
    let report = agentloop::init::init_config_dir(&path)?;
    if report.created.is_empty() {
        println!("{} is already initialized", report.config_dir.display());
        return Ok(());
    }
    for created in &report.created {
        println!("created {}", created.display());
    }
    Ok(())
}

fn run_skills(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = agentloop::config::load_config(config_path)?;
    let skills = agentloop::runtime::load_configured_skills(&config, &path);
    if skills.is_empty() {
        println!("no skills found");
        return Ok(());
    }
    for s in &skills {
        println!("{}\t{}\t{}", s.name, s.description, s.source_path.display());
    }
    Ok(())
}

async fn run_models(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = agentloop::config::load_config(config_path)?;
    let client =
        agentloop::llm::OllamaClient::new(agentloop::config::resolve_ollama_base_url(&config));
    let models = client.list_models().await?;
    if models.is_empty() {
        println!("no models on {}", client.base_url());
    }
    for m in models {
        println!("{}", m.name);
    }
    Ok(())
}

fn load_runtime(config_path: Option<PathBuf>) -> anyhow::Result<Runtime> {
    let (config, path) = agentloop::config::load_config(config_path)?;
    agentloop::init::require_initialized(&path, &config)?;
    Runtime::load(config, path)
}

async fn run_once(
    config_path: Option<PathBuf>,
    model: Option<String>,
    json: bool,
    message: String,
) -> anyhow::Result<()> {
    let runtime = load_runtime(config_path)?;
    let model = runtime.ollama_model(model.as_deref())?;
    let engine = runtime.engine(Arc::new(model))?;
    let thread = engine.store().create().await?;
    let outcome = engine.send(&thread, &message).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.transcript)?);
    } else {
        println!("{}", outcome.reply.trim());
    }
    Ok(())
}

async fn run_chat(
    config_path: Option<PathBuf>,
    thread: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let runtime = load_runtime(config_path)?;
    let model = runtime.ollama_model(model.as_deref())?;
    let engine = runtime.engine(Arc::new(model))?;

    let mut current_thread = match thread {
        Some(t) => t,
        None => engine.store().create().await?,
    };
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/new") {
            engine.end(&current_thread).await?;
            current_thread = engine.store().create().await?;
            println!("(new thread {})", current_thread);
            continue;
        }

        match engine.send(&current_thread, input).await {
            Ok(outcome) => {
                println!("< {}", outcome.reply.trim());
            }
            Err(e) => {
                eprintln!("chat error: {}", e);
            }
        }
    }

    Ok(())
}
