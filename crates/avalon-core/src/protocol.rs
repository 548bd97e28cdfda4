// Wire protocol shared with the game server.
//
// Every call is a JSON POST to `{base_url}/{path}`. All state-bearing replies
// (the state fetch and every mutating command) carry a `general` object plus
// phase-specific siblings; `snapshot.rs` turns that shape into a
// `GameSnapshot`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque participant identifier as issued by the roster provider.
pub type ParticipantId = String;

/// Server-assigned game identifier.
pub type GameId = String;

// ---------------------------------------------------------------------------
// Command kinds
// ---------------------------------------------------------------------------

/// One request slot on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    Join,
    Start,
    Setup,
    Propose,
    Vote,
    Mission,
    Reveal,
    FetchState,
}

impl CommandKind {
    /// Endpoint path relative to the server base URL.
    pub fn path(self) -> &'static str {
        match self {
            CommandKind::Join => "game/join",
            CommandKind::Start => "game/start",
            CommandKind::Setup => "game/setup",
            CommandKind::Propose => "game/propose",
            CommandKind::Vote => "game/vote",
            CommandKind::Mission => "game/mission",
            CommandKind::Reveal => "game/reveal",
            CommandKind::FetchState => "game/state",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Join => "join",
            CommandKind::Start => "start",
            CommandKind::Setup => "setup",
            CommandKind::Propose => "propose",
            CommandKind::Vote => "vote",
            CommandKind::Mission => "act-on-mission",
            CommandKind::Reveal => "reveal",
            CommandKind::FetchState => "fetch-state",
        }
    }

    /// Whether issuing this kind cancels an unresolved request in the same
    /// slot instead of being refused while one is outstanding.
    pub fn supersedes(self) -> bool {
        matches!(
            self,
            CommandKind::FetchState | CommandKind::Setup | CommandKind::Reveal
        )
    }

    /// Whether a successful reply carries a full game state.
    pub fn yields_snapshot(self) -> bool {
        !matches!(self, CommandKind::Setup | CommandKind::Reveal)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionAction {
    Success,
    Failure,
}

/// Body for `game/start`: the lobby (participant id -> person id) and the
/// full card list, generic cards included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    pub players: BTreeMap<ParticipantId, String>,
    pub cards: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupRequest {
    pub players: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposeRequest {
    pub mission: u32,
    pub proposal: u32,
    pub players: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub mission: u32,
    pub proposal: u32,
    pub vote: VoteChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRequest {
    pub mission: u32,
    pub action: MissionAction,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// Size and failure tolerance of one mission in the game setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionSpec {
    pub size: usize,
    #[serde(default)]
    pub fails_allowed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameSetup {
    #[serde(default)]
    pub missions: Vec<MissionSpec>,
    #[serde(default)]
    pub cards: Vec<String>,
    #[serde(default)]
    pub spies: usize,
}

/// A completed mission. `mission` is the zero-based mission index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionResult {
    pub mission: u32,
    #[serde(default)]
    pub proposal: u32,
    pub leader: usize,
    pub players: Vec<usize>,
    pub fails: u32,
    pub fails_allowed: u32,
}

impl MissionResult {
    /// One-based mission number as shown to players.
    pub fn mission_number(&self) -> u32 {
        self.mission + 1
    }

    pub fn is_failed(&self) -> bool {
        self.fails > self.fails_allowed
    }
}

/// Outcome of a proposal vote, approvals indexed by player position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub leader: usize,
    pub players: Vec<usize>,
    #[serde(rename = "votes")]
    pub approvals: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllowedActions {
    #[serde(rename = "Success", alias = "success", default)]
    pub success: bool,
    #[serde(rename = "Failure", alias = "failure", default)]
    pub failure: bool,
}

impl AllowedActions {
    pub fn allows(&self, action: MissionAction) -> bool {
        match action {
            MissionAction::Success => self.success,
            MissionAction::Failure => self.failure,
        }
    }
}

/// The phase-independent part of every state reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralState {
    #[serde(rename = "gameid", deserialize_with = "string_or_number")]
    pub game_id: GameId,
    pub players: Vec<ParticipantId>,
    pub state: String,
    pub leader: usize,
    #[serde(default)]
    pub mission_results: Vec<MissionResult>,
    #[serde(default)]
    pub votes: Vec<VoteRecord>,
    pub this_mission: u32,
    pub this_proposal: u32,
    #[serde(default)]
    pub setup: Option<GameSetup>,
}

/// Reply to `game/state` and every mutating command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateResponse {
    pub general: GeneralState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_players: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_players: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acted_players: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_actions: Option<AllowedActions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<String>>,
}

/// Reply to `game/setup`: the setup for a player count plus the card
/// catalogs, generic cards included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupResponse {
    pub setup: GameSetup,
    #[serde(default)]
    pub good_cards: Vec<String>,
    #[serde(default)]
    pub evil_cards: Vec<String>,
}

/// One group of the `game/reveal` reply: who the local player can see
/// under a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealGroup {
    pub label: String,
    pub players: Vec<usize>,
}

/// Accepts game ids sent either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}
