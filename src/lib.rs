pub mod types;
pub mod error;
pub mod config;
pub mod rng;
pub mod player;
pub mod bots;
pub mod bracket;
pub mod lifecycle;
pub mod game;
pub mod server;

use config::*;

use std::fs;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() {
    load_env_file();

    let config = match load_config_inner() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rps-stages: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with a daily rolling file
    let logs_dir = resolve_repo_path(&config.server.logs_dir);
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "rps-stages.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!(
        round_interval_ms = config.engine.round_interval_ms,
        tournament_mode = config.engine.tournament_mode,
        min_layer = config.engine.min_layer,
        max_layer = config.engine.max_layer,
        "rps-stages starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");
    if let Err(e) = runtime.block_on(server::start_server(config)) {
        error!("{e}");
        eprintln!("rps-stages: {e}");
        drop(guard);
        std::process::exit(1);
    }
}
