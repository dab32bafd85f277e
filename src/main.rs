//! prompt-relay CLI - Serve the relay or manage local model settings.

use clap::{Parser, Subcommand};
use prompt_relay::api::{create_router_with_state, AppState};
use prompt_relay::config::{Config, LogVerbosity};
use prompt_relay::settings::{HttpCatalog, ModelPatch, NewModel, SettingsEngine, SqliteStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "prompt-relay")]
#[command(about = "OpenAI-compatible relay for prompt-writing assistants")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Log verbosity level
        #[arg(short, long, value_enum)]
        log_level: Option<LogLevel>,

        /// Emit logs as JSON lines
        #[arg(long)]
        json_logs: bool,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Manage locally stored model settings
    Models {
        /// Gateway serving the free model catalog
        #[arg(long, global = true, default_value = "http://127.0.0.1:3000")]
        gateway: String,

        /// Settings database path
        #[arg(long, global = true)]
        store: Option<PathBuf>,

        #[command(subcommand)]
        action: ModelsAction,
    },
}

#[derive(Subcommand)]
enum ModelsAction {
    /// List available models and the current selection
    List,

    /// Select a model by id
    Select { id: String },

    /// Add a custom model
    Add {
        /// Upstream model identifier
        #[arg(long)]
        value: String,

        /// Display label
        #[arg(long)]
        label: String,

        /// Usable without an upstream credential
        #[arg(long)]
        no_api: bool,
    },

    /// Rename or retarget a custom model
    Edit {
        id: String,

        #[arg(long)]
        value: Option<String>,

        #[arg(long)]
        label: Option<String>,
    },

    /// Remove a custom model
    Remove { id: String },

    /// Set the custom upstream endpoint and credential
    Api {
        #[arg(long)]
        base: Option<String>,

        #[arg(long)]
        key: Option<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Minimal,
    Compact,
    Verbose,
}

impl From<LogLevel> for LogVerbosity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Minimal => LogVerbosity::Minimal,
            LogLevel::Compact => LogVerbosity::Compact,
            LogLevel::Verbose => LogVerbosity::Verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve {
            port,
            log_level,
            json_logs,
            config,
        }) => {
            run_server(port, log_level, json_logs, config).await?;
        }
        Some(Commands::Config { path }) => {
            show_config(path)?;
        }
        Some(Commands::Models {
            gateway,
            store,
            action,
        }) => {
            init_tracing(false, "warn");
            run_models(&gateway, store, action).await?;
        }
        None => {
            // Default: run server
            run_server(None, None, false, None).await?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

async fn run_server(
    port_override: Option<u16>,
    log_level: Option<LogLevel>,
    json_logs: bool,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    init_tracing(json_logs, "info");

    // Load config
    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = config.with_env_overrides();

    let port = port_override.unwrap_or(config.gateway.port);
    let addr: SocketAddr = format!("{}:{}", config.gateway.host, port).parse()?;
    let verbosity: LogVerbosity = log_level
        .map(Into::into)
        .unwrap_or_else(|| config.app.log_verbosity.clone());

    if config.upstream.backend_url().is_none() {
        tracing::warn!("LLM_BACKEND_URL is not set; completion requests will fail");
    }

    match verbosity {
        LogVerbosity::Minimal => {
            println!("prompt-relay:{}", port);
        }
        LogVerbosity::Compact => {
            println!("→ prompt-relay starting on http://{}", addr);
            println!("→ Completions: http://{}/api/v1/chat/completions", addr);
        }
        LogVerbosity::Verbose => {
            println!("────────────────────────────────────────");
            println!("prompt-relay v{}", env!("CARGO_PKG_VERSION"));
            println!("────────────────────────────────────────");
            println!("Gateway:     http://{}", addr);
            println!("Completions: http://{}/api/v1/chat/completions", addr);
            println!("Models:      http://{}/api/v1/models", addr);
            println!("Health:      http://{}/health", addr);
            println!("────────────────────────────────────────");
            println!(
                "Upstream:    {}",
                config.upstream.backend_url().unwrap_or("(not configured)")
            );
            println!("Free models: {}", config.catalog.free_models.join(", "));
            println!("Default:     {}", config.catalog.default_model);
            println!("CORS:        {}", if config.cors.development { "any origin" } else { "restricted" });
            println!("────────────────────────────────────────");
        }
    }

    let app = create_router_with_state(AppState::new(config));

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nRelay stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let config = Config::load()?.with_env_overrides();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// ============================================================================
// Local model settings
// ============================================================================

async fn run_models(gateway: &str, store_path: Option<PathBuf>, action: ModelsAction) -> anyhow::Result<()> {
    let store = SqliteStore::open(store_path.unwrap_or_else(SqliteStore::default_path))?;
    let mut engine = SettingsEngine::new(store);
    engine.initialize(&HttpCatalog::new(gateway)).await;

    match action {
        ModelsAction::List => {}
        ModelsAction::Select { id } => {
            if !engine.select_model(&id) {
                anyhow::bail!("Unknown model: {}", id);
            }
        }
        ModelsAction::Add {
            value,
            label,
            no_api,
        } => {
            let id = engine.add_model(NewModel {
                value,
                label,
                no_api_required: no_api.then_some(true),
            });
            println!("Added model {}", id);
        }
        ModelsAction::Edit { id, value, label } => {
            if !engine.update_model(&id, ModelPatch { value, label }) {
                anyhow::bail!("Unknown model: {}", id);
            }
        }
        ModelsAction::Remove { id } => {
            if !engine.delete_model(&id) {
                anyhow::bail!("Model {} does not exist or is built in", id);
            }
        }
        ModelsAction::Api { base, key } => {
            if let Some(base) = base {
                engine.update_api_base(base);
            }
            if let Some(key) = key {
                engine.update_api_key(key);
            }
        }
    }

    print_models(&engine);
    Ok(())
}

fn print_models(engine: &SettingsEngine<SqliteStore>) {
    let selected = engine.settings().selected_model_id.as_str();
    for model in engine.available_models() {
        let marker = if model.id == selected { "*" } else { " " };
        let kind = if !model.requires_api() {
            "free"
        } else if model.is_built_in {
            "built-in"
        } else {
            "custom"
        };
        println!("{} {:<28} {:<36} {}", marker, model.id, model.label, kind);
    }

    let target = engine.request_target();
    println!();
    println!("Request model: {}", target.model);
    if let Some(base) = target.api_base {
        println!("Upstream:      {}", base);
    }
    if engine.is_loading_free_models() || engine.free_models().is_empty() {
        println!("(free model catalog unavailable)");
    }
}
