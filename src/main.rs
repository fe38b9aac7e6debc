// src/main.rs — nexus-echo entry point

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use nexus_echo::cli::{self, Cli, Commands};
use nexus_echo::echo::EchoEngine;
use nexus_echo::infra::config::{Config, StorageBackend, StorageConfig};
use nexus_echo::infra::{logger, paths};
use nexus_echo::persona::PersonaLearner;
use nexus_echo::provider::google::GoogleProvider;
use nexus_echo::provider::{GenerationOptions, ModelProvider};
use nexus_echo::storage::{MemoryStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging (respects RUST_LOG)
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load config (falls back to defaults if no config.toml)
    let config = match &cli.config {
        Some(path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load()?,
    };

    let storage = open_storage(&config.storage)?;
    let provider = if cli.local {
        None
    } else {
        resolve_provider(&config)
    };

    let mut builder = EchoEngine::builder(storage.clone())
        .config(config.echo.clone())
        .generation(GenerationOptions::from(&config.gemini))
        .external_enabled(config.gemini.enabled && !cli.local);
    if let Some(provider) = provider {
        builder = builder.provider(provider);
    }
    let engine = builder.build();
    let learner = PersonaLearner::new(config.persona.clone(), storage);

    let result = dispatch(cli.command, &engine, &learner).await;

    // Final persist happens regardless of the command outcome
    engine.shutdown();
    result
}

async fn dispatch(
    command: Commands,
    engine: &EchoEngine,
    learner: &PersonaLearner,
) -> anyhow::Result<()> {
    match command {
        Commands::Record {
            module,
            action,
            context,
            user,
            outcome,
        } => cli::events::run_record(engine, module, action, &context, user, outcome).await,
        Commands::Replay { file } => cli::events::run_replay(engine, &file).await,
        Commands::Listen => cli::events::run_listen(engine).await,
        Commands::Analyze => cli::events::run_analyze(engine).await,
        Commands::Suggest {
            module,
            context,
            wait,
        } => cli::status::show_suggestions(engine, &module, &context, wait).await,
        Commands::Status { json } => cli::status::show_status(engine, json),
        Commands::Insights { limit } => cli::status::show_insights(engine, limit),
        Commands::Feedback {
            component,
            action,
            value,
        } => cli::persona::run_feedback(learner, component, action, &value).await,
        Commands::Persona {
            analyze,
            apply,
            component,
        } => {
            cli::persona::show_persona(learner, analyze, apply.as_deref(), component.as_deref())
                .await
        }
        Commands::Reset { persona } => {
            cli::events::run_reset(engine, persona.then_some(learner))
        }
    }
}

fn open_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackend::Sqlite => {
            let path = config
                .path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(paths::db_path);
            paths::ensure_dirs()?;
            tracing::debug!("Opening state store at {}", path.display());
            Ok(Arc::new(SqliteStorage::open(&path)?))
        }
    }
}

/// The Gemini provider, when an API key is present in the environment.
fn resolve_provider(config: &Config) -> Option<Arc<dyn ModelProvider>> {
    match config.gemini.api_key() {
        Some(key) => {
            let mut provider = GoogleProvider::new(key);
            if let Some(url) = &config.gemini.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Some(Arc::new(provider))
        }
        None => {
            tracing::info!(
                "{} not set; running without external generation",
                config.gemini.api_key_env
            );
            None
        }
    }
}
