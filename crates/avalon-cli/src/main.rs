// Game client entry point.
//
// Startup sequence:
// 1. Load config (explicit path argument, or the default locations)
// 2. Initialize tracing (log to file, not terminal)
// 3. Build the transport, mirror and roster
// 4. Create mpsc channels
// 5. Spawn the client event loop
// 6. Signal readiness and run the console until the operator quits
// 7. Cleanup on exit

mod console;
mod input;
mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use avalon_app::app;
use avalon_app::engine::ReconciliationEngine;
use avalon_app::transport::HttpTransport;
use avalon_core::config::{self, Config};
use avalon_core::mirror::{InMemoryMirror, SharedStateMirror};
use avalon_core::names::StaticRoster;
use avalon_core::ui::HostEvent;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => config::load_config_from(&path),
        None => config::load_config(),
    }
    .context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config)?;
    info!("Game client starting up");
    info!(
        "Config loaded: server={}, poll every {}s, {} roster entries",
        config.server.base_url,
        config.poll.interval_secs,
        config.session.roster.len()
    );

    // 3. Collaborators
    let transport =
        HttpTransport::from_config(&config.server).context("failed to build HTTP client")?;
    let mirror = Arc::new(InMemoryMirror::new());
    let roster = Arc::new(StaticRoster::new(
        config.session.participant_id.clone(),
        config.session.roster.clone(),
    ));

    // 4. Channels
    let (outcome_tx, outcome_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);
    let (host_tx, host_rx) = mpsc::channel(16);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);

    let engine = ReconciliationEngine::new(
        Arc::new(transport),
        mirror.clone(),
        roster,
        Duration::from_secs(config.poll.interval_secs),
        outcome_tx,
        ui_tx,
    );

    // 5. Spawn the event loop
    let mirror_rx = mirror.subscribe();
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(engine, outcome_rx, mirror_rx, host_rx, cmd_rx).await {
            error!("Client loop error: {}", e);
        }
    });

    // 6. Authentication is carried by the configured token, so the session
    //    is ready as soon as the loop runs.
    let _ = host_tx.send(HostEvent::Ready).await;
    if let Err(e) = console::run(ui_rx, cmd_tx).await {
        error!("Console error: {}", e);
    }

    // 7. Cleanup: wait for the event loop to finish (with timeout)
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Game client shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (stdout belongs to the console view).
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join(&config.logging.directory);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_file = std::fs::File::create(log_dir.join("avalon.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("avalon=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
