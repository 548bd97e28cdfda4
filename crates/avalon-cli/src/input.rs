// Typed operator input.
//
// Each stdin line is one command word plus arguments; the parser turns it
// into a `UserCommand` for the engine. Blank lines are ignored.

use avalon_core::protocol::{MissionAction, VoteChoice};
use avalon_core::ui::{CardSide, UserCommand};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  card good|evil <name>   toggle a role card (start mode)
  start                   start the game
  new                     back to the lobby after game over
  pick <position>         toggle a candidate (leader only)
  propose                 submit the proposal
  approve | reject        choose a vote
  vote                    submit the vote
  success | fail          choose a mission action
  act                     submit the mission action
  poll on|off             start or stop polling
  refresh                 fetch the game state now
  help                    show this list
  quit                    exit";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command `{0}` (type `help`)")]
    UnknownCommand(String),

    #[error("`{command}` expects {expected}")]
    BadArgument {
        command: &'static str,
        expected: &'static str,
    },
}

/// What a line asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(UserCommand),
    Help,
}

/// Parse one input line. `Ok(None)` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<Input>, InputError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(Some(Input::Help)),
        "card" => {
            let bad = InputError::BadArgument {
                command: "card",
                expected: "`good` or `evil` and a card name",
            };
            let (side, label) = rest.split_first().ok_or(bad.clone())?;
            let side = match side.to_ascii_lowercase().as_str() {
                "good" => CardSide::Good,
                "evil" => CardSide::Evil,
                _ => return Err(bad),
            };
            if label.is_empty() {
                return Err(bad);
            }
            UserCommand::ToggleCard {
                side,
                label: label.join(" "),
            }
        }
        "start" => UserCommand::StartGame,
        "new" => UserCommand::NewGame,
        "pick" => {
            let position = rest
                .first()
                .and_then(|p| p.parse::<usize>().ok())
                .ok_or(InputError::BadArgument {
                    command: "pick",
                    expected: "a table position",
                })?;
            UserCommand::ToggleCandidate(position)
        }
        "propose" => UserCommand::CommitProposal,
        "approve" => UserCommand::SelectVote(VoteChoice::Approve),
        "reject" => UserCommand::SelectVote(VoteChoice::Reject),
        "vote" => UserCommand::CommitVote,
        "success" => UserCommand::SelectAction(MissionAction::Success),
        "fail" | "failure" => UserCommand::SelectAction(MissionAction::Failure),
        "act" => UserCommand::CommitMission,
        "poll" => match rest.first().copied() {
            Some("on") => UserCommand::StartPolling,
            Some("off") => UserCommand::StopPolling,
            _ => {
                return Err(InputError::BadArgument {
                    command: "poll",
                    expected: "`on` or `off`",
                })
            }
        },
        "refresh" => UserCommand::RefreshNow,
        "quit" | "q" | "exit" => UserCommand::Quit,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };
    Ok(Some(Input::Command(command)))
}
