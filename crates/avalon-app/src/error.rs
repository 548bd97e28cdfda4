// Error kinds surfaced by the client core. None of them is fatal: the poll
// loop and notification path stay live after any of these.

use avalon_core::protocol::{CommandKind, MissionAction, ParticipantId};
use avalon_core::snapshot::{Phase, SnapshotError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode reply: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A submission rejected locally, before any request is sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("proposal needs {expected} players, {actual} selected")]
    ProposalSize { expected: usize, actual: usize },

    #[error("position {0} is not at the table")]
    UnknownPosition(usize),

    #[error("no vote selected")]
    NoVote,

    #[error("no mission action selected")]
    NoAction,

    #[error("mission action {0:?} is not allowed")]
    ActionNotAllowed(MissionAction),

    #[error("card `{0}` is not offered in this setup")]
    UnknownCard(String),

    #[error("too many {0} cards selected")]
    TooManyCards(&'static str),

    #[error("game setup has not loaded yet")]
    SetupNotLoaded,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or server failure on a fetch or command. Affected controls
    /// are re-enabled for a manual retry.
    #[error("{kind} request failed: {source}")]
    Transport {
        kind: CommandKind,
        #[source]
        source: TransportError,
    },

    /// A reply older than one already applied, or superseded in its slot.
    #[error("stale {kind} reply discarded (generation {generation}, latest {latest})")]
    StaleResponse {
        kind: CommandKind,
        generation: u64,
        latest: u64,
    },

    #[error("participant {0} is not in the roster")]
    RosterMismatch(ParticipantId),

    #[error("invalid selection: {0}")]
    InvalidSelection(#[from] SelectionError),

    #[error("a {0} request is already outstanding")]
    SlotBusy(CommandKind),

    #[error("{action} is not available in {phase} mode")]
    WrongMode { action: &'static str, phase: Phase },

    #[error("malformed game state: {0}")]
    Snapshot(#[from] SnapshotError),
}
