//! corvidd - Corvid IRC Daemon.
//!
//! A TS6 mesh node centered on distributed nick/channel reservations.

mod caps;
mod config;
mod db;
mod enforce;
mod error;
mod handlers;
mod network;
mod s2s;
mod snomask;
mod state;
mod tasks;


use crate::config::Config;
use crate::db::Database;
use crate::handlers::Registry;
use crate::state::{Matrix, ResvConf, ResvFlags};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path; falls back
/// to `config.toml`.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();
    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.server.log_format {
        config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = config::validate(&config) {
        for err in &errors {
            error!(error = %err, "Configuration validation failed");
        }
        anyhow::bail!("Configuration validation failed with {} error(s)", errors.len());
    }

    info!(
        server = %config.server.name,
        network = %config.server.network,
        sid = %config.server.sid,
        "Starting corvidd"
    );

    let db = Database::new(&config.database.path).await?;
    let matrix = Matrix::new(config);

    // Permanent reservations survive restarts through the ban database.
    let rows = db.bans().load_resvs().await.unwrap_or_else(|e| {
        error!(error = %e, "Failed to load reservations from ban database");
        Vec::new()
    });
    let loaded = rows.len();
    {
        let mut store = matrix.store.lock();
        for row in rows {
            let oper = store.opers.add(&row.set_by);
            store.resvs.insert(Arc::new(ResvConf {
                kind: row.kind,
                mask: row.mask,
                reason: row.reason,
                oper,
                created: row.set_at,
                hold: 0,
                lifetime: 0,
                flags: ResvFlags::default(),
            }));
        }
    }
    info!(count = loaded, "Loaded reservations");

    let registry = Registry::build();
    network::start_listeners(matrix.clone(), db, registry).await?;
    tasks::spawn_expiry_sweeper(matrix);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
