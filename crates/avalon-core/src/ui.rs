// Messages exchanged between the reconciliation engine and whatever renders
// the game: view models pushed out as `UiUpdate`s, operator input coming back
// as `UserCommand`s, and host notifications as `HostEvent`s.

use crate::protocol::{MissionAction, VoteChoice};
use crate::snapshot::Phase;

// ---------------------------------------------------------------------------
// Shared view pieces
// ---------------------------------------------------------------------------

/// Per-seat marker next to a player's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Leader of the proposal being shown.
    Leader,
    /// Has voted / acted this round.
    Done,
    /// Still expected to propose, vote or act.
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatView {
    pub position: usize,
    pub name: String,
    /// Extra text after the name (last vote, revealed card).
    pub annotation: Option<String>,
    pub indicator: Option<Indicator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub leader: String,
    pub mission: u32,
    pub proposal: u32,
}

/// One slot of the mission board, from the game setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionSlotView {
    pub mission_number: u32,
    pub size: usize,
    pub fails_allowed: u32,
    /// Board label: the size, with `*` when more than one fail is needed.
    pub label: String,
    pub hint: String,
    /// The mission being played now.
    pub current: bool,
}

/// A completed mission as rendered in the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionView {
    pub mission_number: u32,
    pub players: Vec<String>,
    pub leader: String,
    pub fails: u32,
    pub failed: bool,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealView {
    /// Card catalog of the game, duplicates folded into counts.
    pub cards_in_game: Vec<String>,
    pub groups: Vec<(String, Vec<String>)>,
}

// ---------------------------------------------------------------------------
// Mode panels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSide {
    Good,
    Evil,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardToggleView {
    pub label: String,
    pub selected: bool,
}

/// Card chooser shown in start mode once the setup has loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CardChoiceView {
    pub players: usize,
    pub good_slots: usize,
    pub evil_slots: usize,
    pub good: Vec<CardToggleView>,
    pub evil: Vec<CardToggleView>,
    pub generic_good_hint: String,
    pub generic_evil_hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartPanel {
    pub lobby: Vec<String>,
    pub card_choice: Option<CardChoiceView>,
    pub start_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateView {
    pub position: usize,
    pub name: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PickingPanel {
    pub mission_size: usize,
    /// Only shown to the leader.
    pub selection_visible: bool,
    pub candidates: Vec<CandidateView>,
    pub candidates_enabled: bool,
    pub commit_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VotingPanel {
    pub mission_players: Vec<SeatView>,
    pub choice: Option<VoteChoice>,
    pub approve_enabled: bool,
    pub reject_enabled: bool,
    pub commit_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MissionPanel {
    pub mission_players: Vec<SeatView>,
    /// Only shown to players on the mission.
    pub form_visible: bool,
    pub choice: Option<MissionAction>,
    pub success_enabled: bool,
    pub failure_enabled: bool,
    pub commit_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameoverPanel {
    pub result: String,
    pub comment: String,
    pub cards: Vec<SeatView>,
    pub lobby: Vec<String>,
    pub start_enabled: bool,
}

/// The panel of the current mode. Exactly one is visible at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelView {
    Joining,
    Start(StartPanel),
    Picking(PickingPanel),
    Voting(VotingPanel),
    Mission(MissionPanel),
    Gameover(GameoverPanel),
}

impl PanelView {
    pub fn phase(&self) -> Phase {
        match self {
            PanelView::Joining => Phase::Joining,
            PanelView::Start(_) => Phase::Start,
            PanelView::Picking(_) => Phase::Picking,
            PanelView::Voting(_) => Phase::Voting,
            PanelView::Mission(_) => Phase::Mission,
            PanelView::Gameover(_) => Phase::Gameover,
        }
    }
}

// ---------------------------------------------------------------------------
// Updates and commands
// ---------------------------------------------------------------------------

/// Render instructions pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    /// All mode panels hidden, this one shown.
    ModeEntered(Phase),
    /// Same mode, transient selections cleared.
    ModeReset(Phase),
    Panel(Box<PanelView>),
    /// Table-order roster.
    Roster(Vec<SeatView>),
    Status(StatusView),
    /// Players of the last voted proposal, or `None` to hide it.
    LastProposal(Option<Vec<SeatView>>),
    MissionBoard(Vec<MissionSlotView>),
    MissionsCleared,
    /// Results beyond the ones already shown, in order.
    MissionsAppended(Vec<MissionView>),
    RolesRevealed(Box<RevealView>),
    Polling(bool),
    Error(String),
}

/// Operator input from the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    ToggleCard { side: CardSide, label: String },
    StartGame,
    NewGame,
    ToggleCandidate(usize),
    CommitProposal,
    SelectVote(VoteChoice),
    CommitVote,
    SelectAction(MissionAction),
    CommitMission,
    StartPolling,
    StopPolling,
    RefreshNow,
    Quit,
}

/// Notifications from the embedding host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// The authentication handshake completed.
    Ready,
    /// Roster membership changed.
    ParticipantsChanged,
}
