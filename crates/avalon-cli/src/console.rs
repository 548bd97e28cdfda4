// Line-oriented console front end.
//
// Prints every `UiUpdate` as it arrives and turns stdin lines into
// `UserCommand`s. Runs until the operator quits, stdin hits EOF, or the
// engine closes the update channel.

use std::io::Write;

use avalon_core::ui::{UiUpdate, UserCommand};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::input::{self, Input};
use crate::render;

pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    writeln!(stdout, "Type `help` for commands.")?;

    loop {
        tokio::select! {
            // Updates from the engine
            update = ui_rx.recv() => {
                match update {
                    Some(update) => {
                        for line in render::render(&update, Local::now().time()) {
                            writeln!(stdout, "{line}")?;
                        }
                        stdout.flush()?;
                    }
                    None => {
                        info!("UI channel closed");
                        break;
                    }
                }
            }

            // Operator input
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    let _ = cmd_tx.send(UserCommand::Quit).await;
                    break;
                };
                match input::parse_line(&line) {
                    Ok(Some(Input::Command(UserCommand::Quit))) => {
                        let _ = cmd_tx.send(UserCommand::Quit).await;
                        break;
                    }
                    Ok(Some(Input::Command(cmd))) => {
                        debug!(?cmd, "operator command");
                        let _ = cmd_tx.send(cmd).await;
                    }
                    Ok(Some(Input::Help)) => writeln!(stdout, "{}", input::HELP)?,
                    Ok(None) => {}
                    Err(e) => writeln!(stdout, "{e}")?,
                }
            }
        }
    }

    Ok(())
}
