//! Binary entrypoint: CLI parsing, tracing init, config/catalogue/store
//! construction, and the Discord gateway run loop.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rusqlite::Connection;
use tracing::{error, info};

use relay_core::config::Config;
use relay_discord::{AppState, DiscordAdapter};
use relay_models::{ModelCatalogue, OllamaClient};
use relay_session::{db::init_db, SessionStore};

/// A chat bridge between an Ollama-compatible LLM backend and Discord.
#[derive(Parser, Debug)]
#[command(name = "relay-bot", version, about)]
struct Cli {
    /// Path to the INI configuration file.
    #[arg(long, default_value = "bot-config.ini", env = "RELAY_CONFIG")]
    config: PathBuf,

    /// Log filter, e.g. `info` or `relay_discord=debug,relay_stream=trace`.
    /// Overrides `RUST_LOG` when set.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = cli
        .log_level
        .clone()
        .map(tracing_subscriber::EnvFilter::new)
        .unwrap_or_else(|| {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relay_bot=info,relay_discord=info"))
        });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Config::load writes a seed file and exits(1) itself when the path is
    // missing, matching main.py's create_example_config fallback.
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        error!(error = %e, path = %cli.config.display(), "failed to load config");
        std::process::exit(1);
    });

    info!(path = %cli.config.display(), "config loaded");

    let client = OllamaClient::new(config.bot.ollama_host.clone());
    let catalogue = ModelCatalogue::new(client, config.models.clone());

    let conn = Connection::open(&config.bot.session_db_path).unwrap_or_else(|e| {
        error!(error = %e, path = %config.bot.session_db_path, "failed to open session database");
        std::process::exit(1);
    });
    init_db(&conn).unwrap_or_else(|e| {
        error!(error = %e, "failed to initialize session database schema");
        std::process::exit(1);
    });
    let store = SessionStore::new(conn);

    let state = Arc::new(AppState::new(config, catalogue, store));

    info!("starting Discord gateway");
    DiscordAdapter::new(state).run().await;
}
