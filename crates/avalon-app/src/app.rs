// Main event loop: multiplexes every trigger into the engine from one task.
//
// Poll ticks, mirror notifications, request outcomes, host events and operator
// commands are all handled here, one at a time, so the engine never needs a
// lock.

use avalon_core::mirror::MirrorState;
use avalon_core::ui::{HostEvent, UserCommand};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::command::CommandOutcome;
use crate::engine::ReconciliationEngine;

/// Run the client event loop until `Quit` or the command channel closes.
///
/// Listens using `tokio::select!` on:
/// 1. Poll ticks while a game is being polled
/// 2. Mirror change notifications
/// 3. Outcomes of requests the engine issued
/// 4. Host events (ready, roster changes)
/// 5. Operator commands
pub async fn run(
    mut engine: ReconciliationEngine,
    mut outcome_rx: mpsc::Receiver<CommandOutcome>,
    mut mirror_rx: watch::Receiver<MirrorState>,
    mut host_rx: mpsc::Receiver<HostEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
) -> anyhow::Result<()> {
    info!("Client event loop started");

    // Closed receivers are switched off so select! never spins on them.
    let mut mirror_open = true;
    let mut host_open = true;

    loop {
        tokio::select! {
            // --- Poll timer ---
            _ = engine.poll_tick() => {
                engine.refresh().await;
            }

            // --- Mirror notifications ---
            changed = mirror_rx.changed(), if mirror_open => {
                match changed {
                    Ok(()) => engine.on_mirror_changed().await,
                    Err(_) => {
                        info!("Mirror closed");
                        mirror_open = false;
                    }
                }
            }

            // --- Request outcomes ---
            Some(outcome) = outcome_rx.recv() => {
                engine.handle_outcome(outcome).await;
            }

            // --- Host events ---
            event = host_rx.recv(), if host_open => {
                match event {
                    Some(HostEvent::Ready) => engine.ready().await,
                    Some(HostEvent::ParticipantsChanged) => engine.on_participants_changed().await,
                    None => {
                        info!("Host event channel closed");
                        host_open = false;
                    }
                }
            }

            // --- Operator commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        // Already reported to the UI as an error update.
                        if let Err(e) = engine.handle_user_command(cmd).await {
                            debug!("command rejected: {e}");
                        }
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    engine.shutdown();
    info!("Client event loop exiting");
    Ok(())
}
