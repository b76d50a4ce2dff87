//! `chat-arena` — headless server entry point.
//!
//! Loads configuration (file + environment overrides), wires the session
//! table, waiting queue, catalogs, AI registry, pairer, and dispatcher
//! together, spawns the inactivity evictor, and serves the WebSocket
//! endpoint until the process receives a shutdown signal.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chat_arena::arena::ai_registry::AIRegistry;
use chat_arena::arena::catalog::CatalogStore;
use chat_arena::arena::config::{load_config, load_default_config, ArenaConfig};
use chat_arena::arena::conversation::ConversationLog;
use chat_arena::arena::dispatcher::Dispatcher;
use chat_arena::arena::evictor::InactivityEvictor;
use chat_arena::arena::pairer::Pairer;
use chat_arena::arena::queue::WaitQueue;
use chat_arena::arena::server::{self, AppState};
use chat_arena::arena::session::SessionTable;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "chat-arena",
    about = "Concurrent session-and-pairing engine for a real-time chat arena",
    version
)]
struct Cli {
    /// Path to a TOML config file. Overrides CHAT_ARENA_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to the topic/task/consent catalog JSON document.
    #[arg(long, value_name = "PATH")]
    catalog: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .try_init()
        .ok();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chat-arena starting");
}

fn load_config_for_cli(cli: &Cli) -> ArenaConfig {
    match &cli.config {
        Some(path) => load_config(path).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load config, using defaults");
            ArenaConfig::default()
        }),
        None => load_default_config().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load config, using defaults");
            ArenaConfig::default()
        }),
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);

    let catalog_path = cli
        .catalog
        .unwrap_or_else(|| config.server.data_dir.join("catalog.json"));
    let catalog = Arc::new(CatalogStore::load(&catalog_path).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to parse catalog file, starting empty");
        CatalogStore::empty(catalog_path.clone())
    }));

    let sessions = Arc::new(SessionTable::new());
    let queue = Arc::new(WaitQueue::new(config.pairing.cooldown_seconds as i64));
    let conversations = Arc::new(ConversationLog::new(config.server.data_dir.join("conversations")));
    let ai_registry = Arc::new(AIRegistry::new(config.ai.clone(), sessions.clone(), conversations.clone()));

    let pairer = Pairer::new(
        sessions.clone(),
        queue,
        catalog,
        conversations.clone(),
        ai_registry.clone(),
        config.pairing.clone(),
        config.ai.clone(),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        sessions.clone(),
        pairer.clone(),
        ai_registry,
        conversations,
        config.message.clone(),
    ));

    let evictor = InactivityEvictor::new(sessions.clone(), pairer, config.inactivity.clone());
    let evictor_stop = evictor.spawn();

    let state = AppState { sessions, dispatcher };

    let host = config.server.host.clone();
    let port = config.server.port;
    tokio::select! {
        result = server::serve(&host, port, state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            let _ = evictor_stop.send(true);
        }
    }

    Ok(())
}
