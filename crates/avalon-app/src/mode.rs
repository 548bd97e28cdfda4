// UI mode state machine.
//
// Exactly one mode is active at a time. The active mode's panel lives inside
// the controller; a transition throws the old panel away (hiding it and every
// transient handle it held) and enters a fresh one for the new phase. A reset
// keeps the mode but clears its per-round selections.

use avalon_core::protocol::{MissionAction, VoteChoice};
use avalon_core::snapshot::Phase;
use avalon_core::ui::{
    CandidateView, GameoverPanel, MissionPanel, PanelView, PickingPanel, StartPanel, VotingPanel,
};
use tracing::debug;

use crate::error::{ClientError, SelectionError};

/// A control a submission can disable and later re-enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    StartGame,
    Candidates,
    CommitProposal,
    Approve,
    Reject,
    CommitVote,
    Success,
    Failure,
    CommitMission,
}

/// Enter/reset contract implemented once per mode panel.
pub trait ModeHandler {
    /// Show the mode with its controls bound and enabled.
    fn enter(&mut self);

    /// Clear per-round selections and re-enable controls in place.
    fn reset(&mut self);

    /// Enabled state of `control`, or `None` if the mode has no such control.
    fn control(&self, control: ControlId) -> Option<bool>;

    /// Returns false if the mode has no such control.
    fn set_control(&mut self, control: ControlId, enabled: bool) -> bool;
}

// ---------------------------------------------------------------------------
// Per-mode handlers
// ---------------------------------------------------------------------------

impl ModeHandler for StartPanel {
    fn enter(&mut self) {
        *self = StartPanel::default();
    }

    fn reset(&mut self) {
        if let Some(choice) = self.card_choice.as_mut() {
            for card in choice.good.iter_mut().chain(choice.evil.iter_mut()) {
                card.selected = false;
            }
            let tally = crate::setup::refresh_hints(choice);
            self.start_enabled = tally.can_start();
        }
    }

    fn control(&self, control: ControlId) -> Option<bool> {
        match control {
            ControlId::StartGame => Some(self.start_enabled),
            _ => None,
        }
    }

    fn set_control(&mut self, control: ControlId, enabled: bool) -> bool {
        match control {
            ControlId::StartGame => self.start_enabled = enabled,
            _ => return false,
        }
        true
    }
}

impl ModeHandler for PickingPanel {
    fn enter(&mut self) {
        *self = PickingPanel {
            candidates_enabled: true,
            commit_enabled: true,
            ..PickingPanel::default()
        };
    }

    fn reset(&mut self) {
        for candidate in &mut self.candidates {
            candidate.checked = false;
        }
        self.candidates_enabled = true;
        self.commit_enabled = true;
    }

    fn control(&self, control: ControlId) -> Option<bool> {
        match control {
            ControlId::Candidates => Some(self.candidates_enabled),
            ControlId::CommitProposal => Some(self.commit_enabled),
            _ => None,
        }
    }

    fn set_control(&mut self, control: ControlId, enabled: bool) -> bool {
        match control {
            ControlId::Candidates => self.candidates_enabled = enabled,
            ControlId::CommitProposal => self.commit_enabled = enabled,
            _ => return false,
        }
        true
    }
}

impl ModeHandler for VotingPanel {
    fn enter(&mut self) {
        *self = VotingPanel::default();
        self.reset();
    }

    fn reset(&mut self) {
        self.choice = None;
        self.approve_enabled = true;
        self.reject_enabled = true;
        self.commit_enabled = true;
    }

    fn control(&self, control: ControlId) -> Option<bool> {
        match control {
            ControlId::Approve => Some(self.approve_enabled),
            ControlId::Reject => Some(self.reject_enabled),
            ControlId::CommitVote => Some(self.commit_enabled),
            _ => None,
        }
    }

    fn set_control(&mut self, control: ControlId, enabled: bool) -> bool {
        match control {
            ControlId::Approve => self.approve_enabled = enabled,
            ControlId::Reject => self.reject_enabled = enabled,
            ControlId::CommitVote => self.commit_enabled = enabled,
            _ => return false,
        }
        true
    }
}

impl ModeHandler for MissionPanel {
    fn enter(&mut self) {
        *self = MissionPanel::default();
        self.reset();
    }

    fn reset(&mut self) {
        // The form comes back once the next state shows we are on the mission.
        self.form_visible = false;
        self.choice = None;
        self.success_enabled = true;
        self.failure_enabled = true;
        self.commit_enabled = true;
    }

    fn control(&self, control: ControlId) -> Option<bool> {
        match control {
            ControlId::Success => Some(self.success_enabled),
            ControlId::Failure => Some(self.failure_enabled),
            ControlId::CommitMission => Some(self.commit_enabled),
            _ => None,
        }
    }

    fn set_control(&mut self, control: ControlId, enabled: bool) -> bool {
        match control {
            ControlId::Success => self.success_enabled = enabled,
            ControlId::Failure => self.failure_enabled = enabled,
            ControlId::CommitMission => self.commit_enabled = enabled,
            _ => return false,
        }
        true
    }
}

impl ModeHandler for GameoverPanel {
    fn enter(&mut self) {
        *self = GameoverPanel {
            start_enabled: true,
            ..GameoverPanel::default()
        };
    }

    fn reset(&mut self) {
        self.start_enabled = true;
    }

    // The start control here leads back to the lobby for another game.
    fn control(&self, control: ControlId) -> Option<bool> {
        match control {
            ControlId::StartGame => Some(self.start_enabled),
            _ => None,
        }
    }

    fn set_control(&mut self, control: ControlId, enabled: bool) -> bool {
        match control {
            ControlId::StartGame => self.start_enabled = enabled,
            _ => return false,
        }
        true
    }
}

impl ModeHandler for PanelView {
    fn enter(&mut self) {
        match self {
            PanelView::Joining => {}
            PanelView::Start(p) => p.enter(),
            PanelView::Picking(p) => p.enter(),
            PanelView::Voting(p) => p.enter(),
            PanelView::Mission(p) => p.enter(),
            PanelView::Gameover(p) => p.enter(),
        }
    }

    fn reset(&mut self) {
        match self {
            PanelView::Joining => {}
            PanelView::Start(p) => p.reset(),
            PanelView::Picking(p) => p.reset(),
            PanelView::Voting(p) => p.reset(),
            PanelView::Mission(p) => p.reset(),
            PanelView::Gameover(p) => p.reset(),
        }
    }

    fn control(&self, control: ControlId) -> Option<bool> {
        match self {
            PanelView::Joining => None,
            PanelView::Start(p) => p.control(control),
            PanelView::Picking(p) => p.control(control),
            PanelView::Voting(p) => p.control(control),
            PanelView::Mission(p) => p.control(control),
            PanelView::Gameover(p) => p.control(control),
        }
    }

    fn set_control(&mut self, control: ControlId, enabled: bool) -> bool {
        match self {
            PanelView::Joining => false,
            PanelView::Start(p) => p.set_control(control, enabled),
            PanelView::Picking(p) => p.set_control(control, enabled),
            PanelView::Voting(p) => p.set_control(control, enabled),
            PanelView::Mission(p) => p.set_control(control, enabled),
            PanelView::Gameover(p) => p.set_control(control, enabled),
        }
    }
}

fn blank_panel(phase: Phase) -> PanelView {
    match phase {
        Phase::Joining => PanelView::Joining,
        Phase::Start => PanelView::Start(StartPanel::default()),
        Phase::Picking => PanelView::Picking(PickingPanel::default()),
        Phase::Voting => PanelView::Voting(VotingPanel::default()),
        Phase::Mission => PanelView::Mission(MissionPanel::default()),
        Phase::Gameover => PanelView::Gameover(GameoverPanel::default()),
    }
}

// ---------------------------------------------------------------------------
// ModeController
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ModeController {
    panel: PanelView,
    /// Bumped on every transition and round reset. Control handles from an
    /// older epoch no longer exist.
    epoch: u64,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            panel: PanelView::Joining,
            epoch: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.panel.phase()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn panel(&self) -> &PanelView {
        &self.panel
    }

    /// Hide the current mode and enter `phase`.
    pub fn transition(&mut self, phase: Phase) {
        debug!(from = %self.phase(), to = %phase, "mode transition");
        self.panel = blank_panel(phase);
        self.panel.enter();
        self.epoch += 1;
    }

    /// Reset the current mode for a new round. Submissions from the previous
    /// round can no longer restore their controls.
    pub fn reset(&mut self) {
        debug!(mode = %self.phase(), "mode reset");
        self.panel.reset();
        self.epoch += 1;
    }

    pub fn is_enabled(&self, control: ControlId) -> bool {
        self.panel.control(control).unwrap_or(false)
    }

    /// Disable `controls`, returning the ones that were enabled before and so
    /// need re-enabling if the submission fails.
    pub fn disable(&mut self, controls: &[ControlId]) -> Vec<ControlId> {
        let mut flipped = Vec::new();
        for &control in controls {
            if self.panel.control(control) == Some(true) {
                self.panel.set_control(control, false);
                flipped.push(control);
            }
        }
        flipped
    }

    /// Re-enable `controls` disabled in `epoch`. Skipped if the mode has been
    /// left or reset since, because those controls belong to the new round.
    pub fn restore(&mut self, controls: &[ControlId], epoch: u64) -> bool {
        if epoch != self.epoch || controls.is_empty() {
            return false;
        }
        for &control in controls {
            self.panel.set_control(control, true);
        }
        true
    }

    // -- typed panel access --

    pub fn start_mut(&mut self) -> Option<&mut StartPanel> {
        match &mut self.panel {
            PanelView::Start(p) => Some(p),
            _ => None,
        }
    }

    pub fn picking_mut(&mut self) -> Option<&mut PickingPanel> {
        match &mut self.panel {
            PanelView::Picking(p) => Some(p),
            _ => None,
        }
    }

    pub fn voting_mut(&mut self) -> Option<&mut VotingPanel> {
        match &mut self.panel {
            PanelView::Voting(p) => Some(p),
            _ => None,
        }
    }

    pub fn mission_mut(&mut self) -> Option<&mut MissionPanel> {
        match &mut self.panel {
            PanelView::Mission(p) => Some(p),
            _ => None,
        }
    }

    pub fn gameover_mut(&mut self) -> Option<&mut GameoverPanel> {
        match &mut self.panel {
            PanelView::Gameover(p) => Some(p),
            _ => None,
        }
    }

    fn wrong_mode(&self, action: &'static str) -> ClientError {
        ClientError::WrongMode {
            action,
            phase: self.phase(),
        }
    }

    // -- picking --

    /// Show the proposal controls with one unchecked candidate per seat.
    pub fn become_leader(&mut self, candidates: Vec<CandidateView>) {
        if let Some(panel) = self.picking_mut() {
            panel.candidates = candidates;
            panel.selection_visible = true;
            panel.candidates_enabled = true;
            panel.commit_enabled = true;
        }
    }

    /// Hide the proposal controls after leadership moved elsewhere.
    pub fn clear_leadership(&mut self) {
        if let Some(panel) = self.picking_mut() {
            panel.candidates.clear();
            panel.selection_visible = false;
        }
    }

    pub fn toggle_candidate(&mut self, position: usize) -> Result<bool, ClientError> {
        let panel = match &mut self.panel {
            PanelView::Picking(p) if p.selection_visible => p,
            _ => return Err(self.wrong_mode("pick")),
        };
        if !panel.candidates_enabled {
            return Err(ClientError::SlotBusy(
                avalon_core::protocol::CommandKind::Propose,
            ));
        }
        let candidate = panel
            .candidates
            .iter_mut()
            .find(|c| c.position == position)
            .ok_or(SelectionError::UnknownPosition(position))?;
        candidate.checked = !candidate.checked;
        Ok(candidate.checked)
    }

    /// Checked positions, validated against the mission size.
    pub fn proposal_selection(&self) -> Result<Vec<usize>, ClientError> {
        let panel = match &self.panel {
            PanelView::Picking(p) if p.selection_visible => p,
            _ => return Err(self.wrong_mode("propose")),
        };
        let selected: Vec<usize> = panel
            .candidates
            .iter()
            .filter(|c| c.checked)
            .map(|c| c.position)
            .collect();
        if selected.len() != panel.mission_size {
            return Err(SelectionError::ProposalSize {
                expected: panel.mission_size,
                actual: selected.len(),
            }
            .into());
        }
        Ok(selected)
    }

    // -- voting --

    pub fn select_vote(&mut self, choice: VoteChoice) -> Result<(), ClientError> {
        let control = match choice {
            VoteChoice::Approve => ControlId::Approve,
            VoteChoice::Reject => ControlId::Reject,
        };
        if self.phase() != Phase::Voting {
            return Err(self.wrong_mode("vote"));
        }
        if !self.is_enabled(control) {
            return Err(ClientError::SlotBusy(avalon_core::protocol::CommandKind::Vote));
        }
        if let Some(panel) = self.voting_mut() {
            panel.choice = Some(choice);
        }
        Ok(())
    }

    pub fn vote_selection(&self) -> Result<VoteChoice, ClientError> {
        match &self.panel {
            PanelView::Voting(p) => p.choice.ok_or(SelectionError::NoVote.into()),
            _ => Err(self.wrong_mode("vote")),
        }
    }

    // -- mission --

    pub fn select_action(&mut self, action: MissionAction) -> Result<(), ClientError> {
        let control = match action {
            MissionAction::Success => ControlId::Success,
            MissionAction::Failure => ControlId::Failure,
        };
        let panel = match &mut self.panel {
            PanelView::Mission(p) if p.form_visible => p,
            _ => return Err(self.wrong_mode("act on mission")),
        };
        if panel.control(control) != Some(true) {
            return Err(SelectionError::ActionNotAllowed(action).into());
        }
        panel.choice = Some(action);
        Ok(())
    }

    pub fn action_selection(&self) -> Result<MissionAction, ClientError> {
        match &self.panel {
            PanelView::Mission(p) if p.form_visible => {
                let action = p.choice.ok_or(SelectionError::NoAction)?;
                let control = match action {
                    MissionAction::Success => ControlId::Success,
                    MissionAction::Failure => ControlId::Failure,
                };
                if p.control(control) != Some(true) {
                    return Err(SelectionError::ActionNotAllowed(action).into());
                }
                Ok(action)
            }
            _ => Err(self.wrong_mode("act on mission")),
        }
    }
}
