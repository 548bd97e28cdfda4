// Domain view of the authoritative game state.
//
// A `GameSnapshot` is built from one server reply and replaced wholesale on
// the next; nothing mutates it in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{
    AllowedActions, GameId, GameSetup, GameStateResponse, MissionResult, ParticipantId,
    VoteRecord,
};

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("unknown game phase `{0}`")]
    UnknownPhase(String),

    #[error("{phase} reply is missing `{field}`")]
    MissingField { phase: Phase, field: &'static str },

    #[error("leader position {leader} is outside the {players}-player table")]
    LeaderOutOfRange { leader: usize, players: usize },
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Coarse game stage. Also names the local UI mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Joining,
    Start,
    Picking,
    Voting,
    Mission,
    Gameover,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Joining,
        Phase::Start,
        Phase::Picking,
        Phase::Voting,
        Phase::Mission,
        Phase::Gameover,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Joining => "joining",
            Phase::Start => "start",
            Phase::Picking => "picking",
            Phase::Voting => "voting",
            Phase::Mission => "mission",
            Phase::Gameover => "gameover",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SnapshotError::UnknownPhase(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Phase-specific state
// ---------------------------------------------------------------------------

/// The auxiliary fields that only exist in one phase.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseState {
    Joining,
    Start,
    Picking {
        mission_size: usize,
    },
    Voting {
        mission_players: Vec<usize>,
        /// Whether each table position has voted yet.
        voted: Vec<bool>,
    },
    Mission {
        mission_players: Vec<usize>,
        /// Whether each mission slot has acted yet.
        acted: Vec<bool>,
        allowed: AllowedActions,
    },
    Gameover {
        result: String,
        comment: String,
        /// Revealed card label per table position.
        cards: Vec<String>,
    },
}

impl PhaseState {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseState::Joining => Phase::Joining,
            PhaseState::Start => Phase::Start,
            PhaseState::Picking { .. } => Phase::Picking,
            PhaseState::Voting { .. } => Phase::Voting,
            PhaseState::Mission { .. } => Phase::Mission,
            PhaseState::Gameover { .. } => Phase::Gameover,
        }
    }
}

// ---------------------------------------------------------------------------
// GameSnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    pub game_id: GameId,
    /// Participant ids in table order; the index is the player position.
    pub players: Vec<ParticipantId>,
    pub leader: usize,
    /// One-based.
    pub current_mission: u32,
    /// One-based.
    pub current_proposal: u32,
    /// Append-only within one game.
    pub mission_results: Vec<MissionResult>,
    pub last_vote: Option<VoteRecord>,
    pub setup: Option<GameSetup>,
    pub state: PhaseState,
}

impl GameSnapshot {
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// `(mission, proposal)`; a change within one phase means a whole round
    /// went by between two fetches.
    pub fn round(&self) -> (u32, u32) {
        (self.current_mission, self.current_proposal)
    }

    pub fn position_of(&self, participant: &str) -> Option<usize> {
        self.players.iter().position(|p| p == participant)
    }

    pub fn mission_size(&self) -> Option<usize> {
        match &self.state {
            PhaseState::Picking { mission_size } => Some(*mission_size),
            _ => None,
        }
    }
}

impl TryFrom<GameStateResponse> for GameSnapshot {
    type Error = SnapshotError;

    fn try_from(reply: GameStateResponse) -> Result<Self, Self::Error> {
        let general = reply.general;
        let phase: Phase = general.state.parse()?;

        if !general.players.is_empty() && general.leader >= general.players.len() {
            return Err(SnapshotError::LeaderOutOfRange {
                leader: general.leader,
                players: general.players.len(),
            });
        }

        let missing = |field: &'static str| SnapshotError::MissingField { phase, field };

        let state = match phase {
            Phase::Joining => PhaseState::Joining,
            Phase::Start => PhaseState::Start,
            Phase::Picking => PhaseState::Picking {
                mission_size: reply.mission_size.ok_or_else(|| missing("mission_size"))?,
            },
            Phase::Voting => PhaseState::Voting {
                mission_players: reply
                    .mission_players
                    .ok_or_else(|| missing("mission_players"))?,
                voted: reply.voted_players.unwrap_or_default(),
            },
            Phase::Mission => PhaseState::Mission {
                mission_players: reply
                    .mission_players
                    .ok_or_else(|| missing("mission_players"))?,
                acted: reply.acted_players.unwrap_or_default(),
                allowed: reply.allow_actions.ok_or_else(|| missing("allow_actions"))?,
            },
            Phase::Gameover => PhaseState::Gameover {
                result: reply.result.ok_or_else(|| missing("result"))?,
                comment: reply.comment.unwrap_or_default(),
                cards: reply.cards.unwrap_or_default(),
            },
        };

        let mut votes = general.votes;
        Ok(GameSnapshot {
            game_id: general.game_id,
            players: general.players,
            leader: general.leader,
            current_mission: general.this_mission,
            current_proposal: general.this_proposal,
            mission_results: general.mission_results,
            last_vote: votes.pop(),
            setup: general.setup,
            state,
        })
    }
}
