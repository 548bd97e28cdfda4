// Reconciliation engine: owns the local view of the game and keeps it in step
// with the server.
//
// Triggers (poll ticks, mirror notifications, operator commands) all funnel
// into this struct from a single task. Requests go out through the
// `CommandChannel` and come back as `CommandOutcome`s, which the event loop
// hands to `handle_outcome`. Render instructions are queued while a call runs
// and flushed to the UI channel at the end of each entry point.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use avalon_core::mirror::{MirrorDelta, SharedStateMirror};
use avalon_core::names::{PlayerNameCache, RosterProvider};
use avalon_core::protocol::{
    CommandKind, GameId, MissionAction, MissionRequest, MissionResult, ParticipantId,
    ProposeRequest, RevealGroup, SetupRequest, SetupResponse, StartRequest, VoteChoice,
    VoteRequest,
};
use avalon_core::snapshot::{GameSnapshot, Phase, PhaseState};
use avalon_core::ui::{
    CandidateView, CardSide, Indicator, MissionSlotView, MissionView, RevealView, SeatView,
    StatusView, UiUpdate, UserCommand,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandChannel, CommandOutcome, CommandReply, Ticket};
use crate::error::{ClientError, SelectionError};
use crate::latch::{RefreshGuard, RefreshLatch};
use crate::mode::{ControlId, ModeController};
use crate::poll::PollLoop;
use crate::setup;
use crate::transport::GameTransport;

// ---------------------------------------------------------------------------
// LocalSessionState
// ---------------------------------------------------------------------------

/// Per-session bookkeeping, owned exclusively by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSessionState {
    pub my_id: ParticipantId,
    /// Our seat in the current game, if seated.
    pub my_position: Option<usize>,
    pub game_id: Option<GameId>,
    /// Leader seen in the last picking state; guards the become-leader action.
    pub leader: Option<usize>,
    /// `(mission, proposal)` of the last applied state.
    pub round: Option<(u32, u32)>,
    /// How many mission results have been rendered this game.
    pub rendered_mission_count: usize,
    /// Current mission the board was last rendered for.
    pub board_mission: Option<u32>,
    /// Lobby mapping participant id -> person id, sent with `start`.
    pub lobby: Option<BTreeMap<ParticipantId, String>>,
    /// Player count the outstanding setup was requested for.
    pub setup_players: usize,
    /// Generation of the newest state applied.
    pub last_applied_generation: u64,
}

// ---------------------------------------------------------------------------
// ReconciliationEngine
// ---------------------------------------------------------------------------

pub struct ReconciliationEngine {
    session: LocalSessionState,
    snapshot: Option<GameSnapshot>,
    mode: ModeController,
    commands: CommandChannel,
    latch: RefreshLatch,
    /// Shared by every request so replies of any kind can be ordered.
    next_generation: u64,
    names: PlayerNameCache,
    roster: Arc<dyn RosterProvider>,
    mirror: Arc<dyn SharedStateMirror>,
    poll: PollLoop,
    rendered_missions: Vec<MissionView>,
    outbox: Vec<UiUpdate>,
    ui_tx: mpsc::Sender<UiUpdate>,
}

impl ReconciliationEngine {
    pub fn new(
        transport: Arc<dyn GameTransport>,
        mirror: Arc<dyn SharedStateMirror>,
        roster: Arc<dyn RosterProvider>,
        poll_interval: Duration,
        outcome_tx: mpsc::Sender<CommandOutcome>,
        ui_tx: mpsc::Sender<UiUpdate>,
    ) -> Self {
        let session = LocalSessionState {
            my_id: roster.local_participant_id(),
            ..LocalSessionState::default()
        };
        Self {
            session,
            snapshot: None,
            mode: ModeController::new(),
            commands: CommandChannel::new(transport, outcome_tx),
            latch: RefreshLatch::new(),
            next_generation: 0,
            names: PlayerNameCache::new(Arc::clone(&roster)),
            roster,
            mirror,
            poll: PollLoop::new(poll_interval),
            rendered_missions: Vec::new(),
            outbox: Vec::new(),
            ui_tx,
        }
    }

    // -- accessors --

    pub fn session(&self) -> &LocalSessionState {
        &self.session
    }

    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn mode(&self) -> &ModeController {
        &self.mode
    }

    /// Every mission result rendered this game, in order.
    pub fn rendered_missions(&self) -> &[MissionView] {
        &self.rendered_missions
    }

    pub fn is_refreshing(&self) -> bool {
        self.latch.is_held()
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_running()
    }

    /// Generation of the unresolved `fetch-state` request, if any.
    pub fn in_flight_fetch(&self) -> Option<u64> {
        self.commands.latest_generation(CommandKind::FetchState)
    }

    pub fn pending_commands(&self) -> Vec<CommandKind> {
        self.commands.pending_kinds()
    }

    /// Resolves on the next poll tick; never while polling is stopped.
    pub async fn poll_tick(&mut self) {
        self.poll.tick().await
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// The host finished authenticating: leave `joining` for `start`.
    pub async fn ready(&mut self) {
        if self.mode.phase() == Phase::Joining {
            info!("Session ready");
            self.enter_mode(Phase::Start);
            self.push_panel();
        } else {
            debug!(mode = %self.mode.phase(), "ready ignored");
        }
        self.flush().await;
    }

    /// Poll-tick and notification entry point. Returns whether a fetch was
    /// issued.
    pub async fn refresh(&mut self) -> bool {
        let issued = self.begin_refresh();
        self.flush().await;
        issued
    }

    /// Fetch right away, superseding any outstanding fetch. Works before a
    /// game is known, since the server tracks the session's game.
    pub async fn refresh_now(&mut self) {
        let guard = self.latch.try_acquire();
        self.fetch(guard);
        self.flush().await;
    }

    /// Called when any client changed the mirror.
    pub async fn on_mirror_changed(&mut self) {
        if self.session.game_id.is_none() {
            self.join_if_diverged(None);
        } else {
            let shared = self.mirror.state();
            let game_differs = shared.game_id.is_some() && shared.game_id != self.session.game_id;
            let phase_differs = shared.phase.is_some_and(|p| p != self.mode.phase());
            if game_differs || phase_differs {
                self.begin_refresh();
            }
        }
        self.flush().await;
    }

    /// Roster membership changed.
    pub async fn on_participants_changed(&mut self) {
        if matches!(self.mode.phase(), Phase::Start | Phase::Gameover) {
            self.render_lobby();
            self.load_setup();
            self.push_panel();
        }
        self.flush().await;
    }

    /// Apply the reply of a request issued earlier.
    pub async fn handle_outcome(&mut self, outcome: CommandOutcome) {
        self.process_outcome(outcome);
        self.flush().await;
    }

    pub async fn handle_user_command(&mut self, command: UserCommand) -> Result<(), ClientError> {
        match command {
            UserCommand::ToggleCard { side, label } => self.toggle_card(side, &label).await,
            UserCommand::StartGame => self.start_game().await,
            UserCommand::NewGame => self.new_game().await,
            UserCommand::ToggleCandidate(position) => self.toggle_candidate(position).await,
            UserCommand::CommitProposal => self.commit_proposal().await,
            UserCommand::SelectVote(choice) => self.select_vote(choice).await,
            UserCommand::CommitVote => self.commit_vote().await,
            UserCommand::SelectAction(action) => self.select_action(action).await,
            UserCommand::CommitMission => self.commit_mission().await,
            UserCommand::StartPolling => {
                self.start_polling();
                self.flush().await;
                Ok(())
            }
            UserCommand::StopPolling => {
                self.stop_polling();
                self.flush().await;
                Ok(())
            }
            UserCommand::RefreshNow => {
                self.refresh_now().await;
                Ok(())
            }
            UserCommand::Quit => Ok(()),
        }
    }

    /// Abort outstanding requests and stop polling.
    pub fn shutdown(&mut self) {
        self.commands.cancel_all();
        self.poll.stop();
    }

    // -----------------------------------------------------------------------
    // Operator commands
    // -----------------------------------------------------------------------

    pub async fn toggle_card(&mut self, side: CardSide, label: &str) -> Result<(), ClientError> {
        let result = self.apply_card_toggle(side, label);
        self.finish(result).await
    }

    pub async fn start_game(&mut self) -> Result<(), ClientError> {
        let result = self.submit_start();
        self.finish(result).await
    }

    /// From game over, go back to the lobby to set up another game.
    pub async fn new_game(&mut self) -> Result<(), ClientError> {
        let phase = self.mode.phase();
        let result = if phase == Phase::Gameover && self.mode.is_enabled(ControlId::StartGame) {
            self.enter_mode(Phase::Start);
            self.push_panel();
            Ok(())
        } else {
            Err(ClientError::WrongMode {
                action: "new game",
                phase,
            })
        };
        self.finish(result).await
    }

    pub async fn toggle_candidate(&mut self, position: usize) -> Result<(), ClientError> {
        let result = self.mode.toggle_candidate(position).map(|_| self.push_panel());
        self.finish(result).await
    }

    pub async fn commit_proposal(&mut self) -> Result<(), ClientError> {
        let result = self.submit_proposal();
        self.finish(result).await
    }

    pub async fn select_vote(&mut self, choice: VoteChoice) -> Result<(), ClientError> {
        let result = self.mode.select_vote(choice).map(|_| self.push_panel());
        self.finish(result).await
    }

    pub async fn commit_vote(&mut self) -> Result<(), ClientError> {
        let result = self.submit_vote();
        self.finish(result).await
    }

    pub async fn select_action(&mut self, action: MissionAction) -> Result<(), ClientError> {
        let result = self.mode.select_action(action).map(|_| self.push_panel());
        self.finish(result).await
    }

    pub async fn commit_mission(&mut self) -> Result<(), ClientError> {
        let result = self.submit_mission();
        self.finish(result).await
    }

    fn apply_card_toggle(&mut self, side: CardSide, label: &str) -> Result<(), ClientError> {
        let phase = self.mode.phase();
        let panel = self.mode.start_mut().ok_or(ClientError::WrongMode {
            action: "choose cards",
            phase,
        })?;
        let choice = panel
            .card_choice
            .as_mut()
            .ok_or(SelectionError::SetupNotLoaded)?;
        setup::toggle(choice, side, label)?;
        self.refresh_start_control();
        self.push_panel();
        Ok(())
    }

    fn submit_start(&mut self) -> Result<(), ClientError> {
        let phase = self.mode.phase();
        let panel = self.mode.start_mut().ok_or(ClientError::WrongMode {
            action: "start",
            phase,
        })?;
        let choice = panel
            .card_choice
            .as_ref()
            .ok_or(SelectionError::SetupNotLoaded)?;
        let cards = setup::cards_for_start(choice)?;
        let players = self
            .session
            .lobby
            .clone()
            .ok_or_else(|| ClientError::RosterMismatch(self.session.my_id.clone()))?;
        self.submit(
            Command::Start(StartRequest { players, cards }),
            &[ControlId::StartGame],
        )
    }

    fn submit_proposal(&mut self) -> Result<(), ClientError> {
        let players = self.mode.proposal_selection()?;
        let (mission, proposal) = self.current_round("propose")?;
        self.submit(
            Command::Propose(ProposeRequest {
                mission,
                proposal,
                players,
            }),
            &[ControlId::CommitProposal, ControlId::Candidates],
        )
    }

    fn submit_vote(&mut self) -> Result<(), ClientError> {
        let vote = self.mode.vote_selection()?;
        let (mission, proposal) = self.current_round("vote")?;
        self.submit(
            Command::Vote(VoteRequest {
                mission,
                proposal,
                vote,
            }),
            &[ControlId::CommitVote, ControlId::Approve, ControlId::Reject],
        )
    }

    fn submit_mission(&mut self) -> Result<(), ClientError> {
        let action = self.mode.action_selection()?;
        let (mission, _) = self.current_round("act on mission")?;
        self.submit(
            Command::Mission(MissionRequest { mission, action }),
            &[ControlId::CommitMission, ControlId::Success, ControlId::Failure],
        )
    }

    fn current_round(&self, action: &'static str) -> Result<(u32, u32), ClientError> {
        self.session.round.ok_or(ClientError::WrongMode {
            action,
            phase: self.mode.phase(),
        })
    }

    /// Disable `controls` (the first is the commit control) and send
    /// `command`. The disabled set rides along so a failure can undo it.
    fn submit(&mut self, command: Command, controls: &[ControlId]) -> Result<(), ClientError> {
        let kind = command.kind();
        if self.commands.is_pending(kind) {
            return Err(ClientError::SlotBusy(kind));
        }
        // A commit control left disabled means the last submission went
        // through and the round has not moved on yet.
        if let Some(&commit) = controls.first() {
            if !self.mode.is_enabled(commit) {
                return Err(ClientError::SlotBusy(kind));
            }
        }

        let epoch = self.mode.epoch();
        let disabled = self.mode.disable(controls);
        let ticket = Ticket {
            disabled: disabled.clone(),
            mode_epoch: epoch,
            guard: None,
        };
        if let Err(e) = self.issue(command, ticket) {
            self.mode.restore(&disabled, epoch);
            return Err(e);
        }
        info!("Submitted {kind}");
        self.push_panel();
        Ok(())
    }

    async fn finish(&mut self, result: Result<(), ClientError>) -> Result<(), ClientError> {
        if let Err(e) = &result {
            warn!("{e}");
            self.push(UiUpdate::Error(e.to_string()));
        }
        self.flush().await;
        result
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    fn begin_refresh(&mut self) -> bool {
        if self.session.game_id.is_none() {
            debug!("refresh skipped: no game");
            return false;
        }
        let Some(guard) = self.latch.try_acquire() else {
            debug!("refresh skipped: already in progress");
            return false;
        };
        if let Some(guard) = self.join_if_diverged(Some(guard)) {
            self.fetch(Some(guard));
        }
        true
    }

    /// Join the game the mirror reports if it is not ours. The join reply
    /// carries the new game's state, so it takes the refresh guard with it
    /// and no fetch runs alongside. Hands the guard back when no join is
    /// needed.
    fn join_if_diverged(&mut self, guard: Option<RefreshGuard>) -> Option<RefreshGuard> {
        let Some(shared) = self.mirror.state().game_id else {
            return guard;
        };
        if self.session.game_id.as_ref() == Some(&shared) {
            return guard;
        }
        info!("Mirror reports game {shared}, joining");
        let ticket = Ticket {
            guard,
            ..Ticket::default()
        };
        if let Err(e) = self.issue(Command::Join, ticket) {
            debug!("join not issued: {e}");
        }
        None
    }

    fn fetch(&mut self, guard: Option<RefreshGuard>) {
        let ticket = Ticket {
            guard,
            ..Ticket::default()
        };
        if let Err(e) = self.issue(Command::FetchState, ticket) {
            warn!("fetch not issued: {e}");
        }
    }

    fn issue(&mut self, command: Command, ticket: Ticket) -> Result<u64, ClientError> {
        let generation = self.next_generation + 1;
        let kind = command.kind();
        self.commands.issue(command, generation, ticket)?;
        self.next_generation = generation;
        debug!(%kind, generation, "request issued");
        Ok(generation)
    }

    fn process_outcome(&mut self, outcome: CommandOutcome) {
        let CommandOutcome {
            kind,
            generation,
            result,
            ticket,
        } = outcome;
        // The guard is released when this function returns, on every path.
        let Ticket {
            disabled,
            mode_epoch,
            guard: _guard,
        } = ticket;

        let latest_in_slot = self.commands.resolve(kind, generation);
        if kind.supersedes() && !latest_in_slot {
            let stale = ClientError::StaleResponse {
                kind,
                generation,
                latest: self
                    .commands
                    .latest_generation(kind)
                    .unwrap_or(self.next_generation),
            };
            debug!("{stale}");
            return;
        }

        match result {
            Err(source) => {
                self.command_failed(ClientError::Transport { kind, source }, &disabled, mode_epoch)
            }
            Ok(CommandReply::State(reply)) => {
                if generation <= self.session.last_applied_generation {
                    let stale = ClientError::StaleResponse {
                        kind,
                        generation,
                        latest: self.session.last_applied_generation,
                    };
                    debug!("{stale}");
                    return;
                }
                match GameSnapshot::try_from(*reply) {
                    Ok(snapshot) => {
                        self.session.last_applied_generation = generation;
                        self.apply_snapshot(snapshot);
                    }
                    Err(e) => self.command_failed(e.into(), &disabled, mode_epoch),
                }
            }
            Ok(CommandReply::Setup(reply)) => self.apply_setup(reply),
            Ok(CommandReply::Reveal(groups)) => self.apply_reveal(groups),
        }
    }

    fn command_failed(&mut self, err: ClientError, disabled: &[ControlId], epoch: u64) {
        warn!("{err}");
        self.push(UiUpdate::Error(err.to_string()));
        if self.mode.restore(disabled, epoch) {
            self.refresh_start_control();
            self.push_panel();
        }
    }

    // -----------------------------------------------------------------------
    // Applying a state
    // -----------------------------------------------------------------------

    fn apply_snapshot(&mut self, new: GameSnapshot) {
        self.session.my_position = new.position_of(&self.session.my_id);
        if self.session.my_position.is_none() {
            debug!(participant = %self.session.my_id, "not seated in game {}", new.game_id);
        }

        let game_changed = self.session.game_id.as_deref() != Some(new.game_id.as_str());
        if game_changed {
            self.begin_game(&new);
        }

        let phase = new.phase();
        if game_changed || self.mode.phase() != phase {
            self.enter_mode(phase);
            self.mirror.submit_delta(MirrorDelta::Phase(phase));
        } else if self.session.round != Some(new.round()) {
            info!(
                "Round moved on within {phase}: mission {} proposal {}",
                new.current_mission, new.current_proposal
            );
            self.mode.reset();
            self.push(UiUpdate::ModeReset(phase));
            if self.session.leader != Some(new.leader) {
                self.session.leader = None;
                self.mode.clear_leadership();
            }
        }
        self.session.round = Some(new.round());

        self.apply_phase_state(&new);
        self.render_board(&new);
        self.render_roster(&new);
        self.render_status(&new);
        self.render_last_proposal(&new);
        self.render_missions(&new);
        self.push_panel();
        self.snapshot = Some(new);
    }

    /// Everything tied to the previous game is dropped before any phase logic
    /// runs against the new one.
    fn begin_game(&mut self, new: &GameSnapshot) {
        info!(
            "Game changed: {} -> {}",
            self.session.game_id.as_deref().unwrap_or("none"),
            new.game_id
        );
        self.session.game_id = Some(new.game_id.clone());
        self.session.leader = None;
        self.session.round = None;
        self.session.rendered_mission_count = 0;
        self.session.board_mission = None;
        self.rendered_missions.clear();
        self.push(UiUpdate::MissionsCleared);

        self.mirror
            .submit_delta(MirrorDelta::GameId(new.game_id.clone()));
        if let Err(e) = self.issue(Command::Reveal, Ticket::default()) {
            warn!("reveal not issued: {e}");
        }
        self.start_polling();
    }

    fn enter_mode(&mut self, phase: Phase) {
        info!("UI mode: {} -> {}", self.mode.phase(), phase);
        self.mode.transition(phase);
        self.session.leader = None;
        self.push(UiUpdate::ModeEntered(phase));
        match phase {
            Phase::Start => {
                self.render_lobby();
                self.load_setup();
            }
            Phase::Gameover => self.render_lobby(),
            _ => {}
        }
    }

    fn apply_phase_state(&mut self, new: &GameSnapshot) {
        let me = self.session.my_position;
        match &new.state {
            PhaseState::Joining | PhaseState::Start => {}
            PhaseState::Picking { mission_size } => {
                if let Some(panel) = self.mode.picking_mut() {
                    panel.mission_size = *mission_size;
                }
                if me == Some(new.leader) && self.session.leader != Some(new.leader) {
                    info!(
                        "Leading proposal {} of mission {}",
                        new.current_proposal, new.current_mission
                    );
                    let candidates = (0..new.players.len())
                        .map(|position| CandidateView {
                            position,
                            name: self.names.name_at(&new.players, position),
                            checked: false,
                        })
                        .collect();
                    self.mode.become_leader(candidates);
                }
                self.session.leader = Some(new.leader);
            }
            PhaseState::Voting {
                mission_players, ..
            } => {
                let seats = self.mission_seats(&new.players, mission_players, new.leader);
                if let Some(panel) = self.mode.voting_mut() {
                    panel.mission_players = seats;
                }
            }
            PhaseState::Mission {
                mission_players,
                allowed,
                ..
            } => {
                let seats = self.mission_seats(&new.players, mission_players, new.leader);
                let on_mission = me.is_some_and(|p| mission_players.contains(&p));
                if let Some(panel) = self.mode.mission_mut() {
                    panel.mission_players = seats;
                    // Shown once per round; later polls must not re-enable
                    // controls a submission disabled.
                    if on_mission && !panel.form_visible {
                        panel.form_visible = true;
                        panel.success_enabled = allowed.success;
                        panel.failure_enabled = allowed.failure;
                    }
                }
            }
            PhaseState::Gameover {
                result,
                comment,
                cards,
            } => {
                let seats = (0..new.players.len())
                    .map(|position| SeatView {
                        position,
                        name: self.names.name_at(&new.players, position),
                        annotation: cards.get(position).cloned(),
                        indicator: None,
                    })
                    .collect();
                if let Some(panel) = self.mode.gameover_mut() {
                    panel.result = result.clone();
                    panel.comment = comment.clone();
                    panel.cards = seats;
                }
                self.stop_polling();
            }
        }
    }

    fn apply_setup(&mut self, reply: SetupResponse) {
        let players = self.session.setup_players;
        let Some(panel) = self.mode.start_mut() else {
            debug!("setup reply ignored outside start mode");
            return;
        };
        panel.card_choice = Some(setup::build_card_choice(players, &reply));
        self.refresh_start_control();
        self.push_panel();
    }

    fn apply_reveal(&mut self, groups: Vec<RevealGroup>) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            debug!("reveal reply ignored: no game state");
            return;
        };
        let cards_in_game = setup::summarize_cards(
            snapshot
                .setup
                .as_ref()
                .map(|s| s.cards.as_slice())
                .unwrap_or(&[]),
        );
        let players = snapshot.players.clone();

        let groups = groups
            .into_iter()
            .map(|group| {
                let names = group
                    .players
                    .iter()
                    .map(|&p| self.names.name_at(&players, p))
                    .collect();
                (group.label, names)
            })
            .collect();
        self.push(UiUpdate::RolesRevealed(Box::new(RevealView {
            cards_in_game,
            groups,
        })));
    }

    // -----------------------------------------------------------------------
    // Start mode
    // -----------------------------------------------------------------------

    /// List the roster and record the lobby mapping, if we are in it.
    fn render_lobby(&mut self) {
        let my_id = self.session.my_id.clone();
        let participants = self.roster.participants();

        if participants.iter().any(|p| p.id == my_id) {
            self.session.lobby = Some(
                participants
                    .iter()
                    .map(|p| (p.id.clone(), p.person_id.clone()))
                    .collect(),
            );
        } else {
            warn!("{}", ClientError::RosterMismatch(my_id.clone()));
        }

        let lobby: Vec<String> = participants
            .iter()
            .map(|p| {
                if p.id == my_id {
                    format!("{} (me)", p.display_name)
                } else {
                    p.display_name.clone()
                }
            })
            .collect();
        if let Some(panel) = self.mode.start_mut() {
            panel.lobby = lobby;
        } else if let Some(panel) = self.mode.gameover_mut() {
            panel.lobby = lobby;
        }
        self.refresh_start_control();
    }

    fn load_setup(&mut self) {
        if self.mode.phase() != Phase::Start {
            return;
        }
        let players = setup::setup_player_count(self.roster.participants().len());
        self.session.setup_players = players;
        if let Err(e) = self.issue(Command::Setup(SetupRequest { players }), Ticket::default()) {
            warn!("setup not requested: {e}");
        }
    }

    fn refresh_start_control(&mut self) {
        let lobby_ready = self.session.lobby.is_some();
        let busy = self.commands.is_pending(CommandKind::Start);
        if let Some(panel) = self.mode.start_mut() {
            let cards_ok = panel
                .card_choice
                .as_ref()
                .is_some_and(|c| setup::tally(c).can_start());
            panel.start_enabled = lobby_ready && cards_ok && !busy;
        }
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn mission_seats(
        &mut self,
        players: &[ParticipantId],
        positions: &[usize],
        leader: usize,
    ) -> Vec<SeatView> {
        positions
            .iter()
            .map(|&position| SeatView {
                position,
                name: self.names.name_at(players, position),
                annotation: None,
                indicator: (position == leader).then_some(Indicator::Leader),
            })
            .collect()
    }

    fn render_roster(&mut self, new: &GameSnapshot) {
        let approvals = new.last_vote.as_ref().map(|v| v.approvals.as_slice());
        let seats = (0..new.players.len())
            .map(|position| {
                let annotation = approvals
                    .and_then(|a| a.get(position))
                    .map(|&approved| if approved { "approve" } else { "reject" }.to_string());
                let indicator = match &new.state {
                    PhaseState::Picking { .. } => {
                        (position == new.leader).then_some(Indicator::Waiting)
                    }
                    PhaseState::Voting { voted, .. } => {
                        Some(done_or_waiting(voted.get(position).copied()))
                    }
                    PhaseState::Mission {
                        mission_players,
                        acted,
                        ..
                    } => mission_players
                        .iter()
                        .position(|&p| p == position)
                        .map(|slot| done_or_waiting(acted.get(slot).copied())),
                    _ => None,
                };
                SeatView {
                    position,
                    name: self.names.name_at(&new.players, position),
                    annotation,
                    indicator,
                }
            })
            .collect();
        self.push(UiUpdate::Roster(seats));
    }

    fn render_status(&mut self, new: &GameSnapshot) {
        let leader = self.names.name_at(&new.players, new.leader);
        self.push(UiUpdate::Status(StatusView {
            leader,
            mission: new.current_mission,
            proposal: new.current_proposal,
        }));
    }

    fn render_last_proposal(&mut self, new: &GameSnapshot) {
        let shown = match &new.last_vote {
            Some(vote) if new.phase() != Phase::Mission => {
                Some(self.mission_seats(&new.players, &vote.players, vote.leader))
            }
            _ => None,
        };
        self.push(UiUpdate::LastProposal(shown));
    }

    fn render_board(&mut self, new: &GameSnapshot) {
        let Some(setup) = new.setup.as_ref() else {
            return;
        };
        if self.session.board_mission == Some(new.current_mission) {
            return;
        }
        self.session.board_mission = Some(new.current_mission);

        let slots = setup
            .missions
            .iter()
            .zip(1u32..)
            .map(|(spec, number)| {
                let mut hint = format!("Mission {number} will have {} players", spec.size);
                if spec.fails_allowed > 0 {
                    hint.push_str(&format!(
                        ", and will only fail if {} fail cards are present",
                        spec.fails_allowed + 1
                    ));
                }
                MissionSlotView {
                    mission_number: number,
                    size: spec.size,
                    fails_allowed: spec.fails_allowed,
                    label: if spec.fails_allowed > 0 {
                        format!("{}*", spec.size)
                    } else {
                        spec.size.to_string()
                    },
                    hint,
                    current: number == new.current_mission,
                }
            })
            .collect();
        self.push(UiUpdate::MissionBoard(slots));
    }

    /// Append results past the watermark. History is never shrunk.
    fn render_missions(&mut self, new: &GameSnapshot) {
        let shown = self.session.rendered_mission_count;
        let total = new.mission_results.len();
        if total < shown {
            warn!("server reported {total} mission results, {shown} already shown; keeping history");
            return;
        }
        if total == shown {
            return;
        }

        let fresh: Vec<MissionView> = new.mission_results[shown..]
            .iter()
            .map(|result| self.mission_view(&new.players, result))
            .collect();
        self.session.rendered_mission_count = total;
        self.rendered_missions.extend(fresh.iter().cloned());
        self.push(UiUpdate::MissionsAppended(fresh));
    }

    fn mission_view(&mut self, players: &[ParticipantId], result: &MissionResult) -> MissionView {
        let names: Vec<String> = result
            .players
            .iter()
            .map(|&p| self.names.name_at(players, p))
            .collect();
        let leader = self.names.name_at(players, result.leader);
        let fails = match result.fails {
            1 => "1 fail".to_string(),
            n => format!("{n} fails"),
        };
        MissionView {
            mission_number: result.mission_number(),
            summary: format!("{}, Leader: {leader} ({fails})", names.join(", ")),
            players: names,
            leader,
            fails: result.fails,
            failed: result.is_failed(),
        }
    }

    // -----------------------------------------------------------------------
    // Polling and output
    // -----------------------------------------------------------------------

    fn start_polling(&mut self) {
        if self.poll.start() {
            info!("Polling every {:?}", self.poll.period());
            self.push(UiUpdate::Polling(true));
        }
    }

    fn stop_polling(&mut self) {
        if self.poll.stop() {
            info!("Polling stopped");
            self.push(UiUpdate::Polling(false));
        }
    }

    fn push_panel(&mut self) {
        let panel = self.mode.panel().clone();
        self.push(UiUpdate::Panel(Box::new(panel)));
    }

    fn push(&mut self, update: UiUpdate) {
        self.outbox.push(update);
    }

    async fn flush(&mut self) {
        for update in std::mem::take(&mut self.outbox) {
            let _ = self.ui_tx.send(update).await;
        }
    }
}

fn done_or_waiting(done: Option<bool>) -> Indicator {
    if done.unwrap_or(false) {
        Indicator::Done
    } else {
        Indicator::Waiting
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::scripted::ScriptedTransport;
    use avalon_core::mirror::InMemoryMirror;
    use avalon_core::ui::PanelView;
    use serde_json::{json, Value};
    use tokio::time::timeout;

    struct Harness {
        engine: ReconciliationEngine,
        outcomes: mpsc::Receiver<CommandOutcome>,
        ui: mpsc::Receiver<UiUpdate>,
        transport: Arc<ScriptedTransport>,
        mirror: Arc<InMemoryMirror>,
    }

    fn harness() -> Harness {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(CommandKind::Reveal, json!([{"label": "Spies", "players": [3, 4]}]));
        transport.push(CommandKind::Setup, fixtures::setup_reply());
        let mirror = Arc::new(InMemoryMirror::new());
        let (outcome_tx, outcomes) = mpsc::channel(64);
        let (ui_tx, ui) = mpsc::channel(1024);
        let engine = ReconciliationEngine::new(
            transport.clone(),
            mirror.clone(),
            fixtures::roster(),
            Duration::from_secs(5),
            outcome_tx,
            ui_tx,
        );
        Harness {
            engine,
            outcomes,
            ui,
            transport,
            mirror,
        }
    }

    impl Harness {
        async fn next_outcome(&mut self) -> CommandOutcome {
            timeout(Duration::from_secs(5), self.outcomes.recv())
                .await
                .expect("timed out waiting for an outcome")
                .expect("outcome channel closed")
        }

        /// Handle outcomes until no request is outstanding.
        async fn settle(&mut self) {
            while !self.engine.pending_commands().is_empty() {
                let outcome = self.next_outcome().await;
                self.engine.handle_outcome(outcome).await;
            }
        }

        /// Make `reply` the server state and fetch it.
        async fn apply(&mut self, reply: Value) {
            self.transport.push_state(reply);
            self.engine.refresh_now().await;
            self.settle().await;
        }

        fn drain_ui(&mut self) -> Vec<UiUpdate> {
            let mut updates = Vec::new();
            while let Ok(update) = self.ui.try_recv() {
                updates.push(update);
            }
            updates
        }

        async fn wait_for_calls(&self, kind: CommandKind, count: usize) {
            timeout(Duration::from_secs(5), async {
                while self.transport.call_count(kind) < count {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .expect("request never reached the transport");
        }

        fn picking(&mut self) -> avalon_core::ui::PickingPanel {
            match self.engine.mode().panel() {
                PanelView::Picking(p) => p.clone(),
                other => panic!("expected picking panel, got {other:?}"),
            }
        }

        fn mission(&mut self) -> avalon_core::ui::MissionPanel {
            match self.engine.mode().panel() {
                PanelView::Mission(p) => p.clone(),
                other => panic!("expected mission panel, got {other:?}"),
            }
        }
    }

    fn count(updates: &[UiUpdate], pred: impl Fn(&UiUpdate) -> bool) -> usize {
        updates.iter().filter(|u| pred(u)).count()
    }

    #[tokio::test]
    async fn first_state_starts_game() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 2, 1, 1)).await;

        assert_eq!(h.engine.session().game_id.as_deref(), Some("g1"));
        assert_eq!(h.engine.session().my_position, Some(0));
        assert_eq!(h.engine.mode().phase(), Phase::Picking);
        assert!(h.engine.is_polling());
        assert_eq!(h.transport.call_count(CommandKind::Reveal), 1);

        let shared = h.mirror.state();
        assert_eq!(shared.game_id.as_deref(), Some("g1"));
        assert_eq!(shared.phase, Some(Phase::Picking));

        let updates = h.drain_ui();
        assert!(updates.contains(&UiUpdate::ModeEntered(Phase::Picking)));
        assert!(updates.contains(&UiUpdate::Polling(true)));
        assert!(updates.iter().any(|u| matches!(
            u,
            UiUpdate::RolesRevealed(view) if view.groups == vec![("Spies".to_string(), vec!["Dave".to_string(), "Eve".to_string()])]
        )));
    }

    #[tokio::test]
    async fn refresh_is_noop_without_game() {
        let mut h = harness();
        assert!(!h.engine.refresh().await);
        tokio::task::yield_now().await;
        assert!(h.transport.calls().is_empty());
        assert!(!h.engine.is_refreshing());
    }

    #[tokio::test]
    async fn back_to_back_refresh_fetches_once() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 2, 1, 1)).await;
        h.drain_ui();

        h.transport.hold();
        h.transport.push_state(fixtures::voting_reply("g1", 2, &[1, 2]));
        assert!(h.engine.refresh().await);
        assert!(!h.engine.refresh().await);
        assert!(h.engine.is_refreshing());
        h.wait_for_calls(CommandKind::FetchState, 2).await;

        h.transport.release();
        h.settle().await;

        assert_eq!(h.transport.call_count(CommandKind::FetchState), 2);
        assert!(!h.engine.is_refreshing());
        let updates = h.drain_ui();
        assert_eq!(
            count(&updates, |u| matches!(u, UiUpdate::ModeEntered(_))),
            1
        );
        assert_eq!(h.engine.mode().phase(), Phase::Voting);
    }

    #[tokio::test]
    async fn late_superseded_fetch_is_discarded() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 2, 1, 1)).await;

        h.transport.hold();
        h.engine.refresh_now().await;
        let first = h.engine.in_flight_fetch().unwrap();
        h.engine.refresh_now().await;
        let second = h.engine.in_flight_fetch().unwrap();
        assert!(second > first);

        h.transport.push_state(fixtures::voting_reply("g1", 2, &[1, 2]));
        h.transport.release();
        h.settle().await;
        assert_eq!(h.engine.mode().phase(), Phase::Voting);

        // The superseded request's reply shows up afterwards.
        let late: avalon_core::protocol::GameStateResponse =
            serde_json::from_value(fixtures::gameover_reply("g1")).unwrap();
        h.engine
            .handle_outcome(CommandOutcome {
                kind: CommandKind::FetchState,
                generation: first,
                result: Ok(CommandReply::State(Box::new(late))),
                ticket: Ticket::default(),
            })
            .await;

        assert_eq!(h.engine.mode().phase(), Phase::Voting);
        assert_eq!(h.engine.session().last_applied_generation, second);
    }

    #[tokio::test]
    async fn older_command_reply_does_not_overwrite_newer_state() {
        let mut h = harness();
        h.apply(fixtures::voting_reply("g1", 2, &[0, 1])).await;
        h.engine.select_vote(VoteChoice::Approve).await.unwrap();

        h.transport.hold();
        h.transport
            .push(CommandKind::Vote, fixtures::voting_reply("g1", 2, &[0, 1]));
        h.engine.commit_vote().await.unwrap();
        h.wait_for_calls(CommandKind::Vote, 1).await;
        h.engine.refresh_now().await;

        // Both parked; the fetch was issued later and carries the newer
        // generation, so applying it first makes the vote reply stale.
        h.transport.push_state(fixtures::mission_reply("g1", &[0, 1], true, true));
        h.transport.release();
        let mut outcomes = vec![h.next_outcome().await, h.next_outcome().await];
        outcomes.sort_by_key(|o| std::cmp::Reverse(o.generation));
        for outcome in outcomes {
            h.engine.handle_outcome(outcome).await;
        }

        assert_eq!(h.engine.mode().phase(), Phase::Mission);
    }

    #[tokio::test]
    async fn round_change_in_same_phase_resets_without_rebuilding_leader_control() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 0, 1, 1)).await;
        assert!(h.picking().selection_visible);
        h.engine.toggle_candidate(3).await.unwrap();
        h.drain_ui();

        h.apply(fixtures::picking_reply("g1", 0, 1, 2)).await;

        let updates = h.drain_ui();
        assert!(updates.contains(&UiUpdate::ModeReset(Phase::Picking)));
        assert_eq!(count(&updates, |u| matches!(u, UiUpdate::ModeEntered(_))), 0);
        let panel = h.picking();
        assert!(panel.selection_visible);
        assert_eq!(panel.candidates.len(), 5);
        assert!(panel.candidates.iter().all(|c| !c.checked));
        assert_eq!(h.engine.session().leader, Some(0));
        assert_eq!(h.engine.session().round, Some((1, 2)));
    }

    #[tokio::test]
    async fn leadership_acquired_mid_phase_builds_control() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 4, 1, 1)).await;
        assert!(!h.picking().selection_visible);

        h.apply(fixtures::picking_reply("g1", 0, 1, 2)).await;
        let panel = h.picking();
        assert!(panel.selection_visible);
        assert_eq!(panel.candidates[1].name, "Bob");

        h.apply(fixtures::picking_reply("g1", 1, 1, 3)).await;
        assert!(!h.picking().selection_visible);
    }

    #[tokio::test]
    async fn game_change_resets_history_and_reveals_once() {
        let mut h = harness();
        h.apply(fixtures::with_results(fixtures::picking_reply("g1", 2, 3, 1), 2))
            .await;
        assert_eq!(h.engine.session().rendered_mission_count, 2);
        assert_eq!(h.transport.call_count(CommandKind::Reveal), 1);
        h.drain_ui();

        // Same phase in the new game; the reset still comes first.
        h.apply(fixtures::picking_reply("g2", 2, 1, 1)).await;

        assert_eq!(h.engine.session().game_id.as_deref(), Some("g2"));
        assert_eq!(h.engine.session().rendered_mission_count, 0);
        assert!(h.engine.rendered_missions().is_empty());
        assert_eq!(h.transport.call_count(CommandKind::Reveal), 2);
        assert_eq!(h.mirror.state().game_id.as_deref(), Some("g2"));
        let updates = h.drain_ui();
        let cleared = updates.iter().position(|u| *u == UiUpdate::MissionsCleared);
        let entered = updates
            .iter()
            .position(|u| *u == UiUpdate::ModeEntered(Phase::Picking));
        assert!(cleared.unwrap() < entered.unwrap());
    }

    #[tokio::test]
    async fn mission_controls_follow_allowed_actions() {
        let mut h = harness();
        h.apply(fixtures::mission_reply("g1", &[0, 2], true, false)).await;

        let panel = h.mission();
        assert!(panel.form_visible);
        assert!(panel.success_enabled);
        assert!(!panel.failure_enabled);
        assert_eq!(panel.mission_players[1].name, "Carol");
        assert!(h.engine.select_action(MissionAction::Failure).await.is_err());
    }

    #[tokio::test]
    async fn mission_form_hidden_when_not_on_mission() {
        let mut h = harness();
        h.apply(fixtures::mission_reply("g1", &[1, 2], true, true)).await;
        assert!(!h.mission().form_visible);
        assert!(matches!(
            h.engine.commit_mission().await,
            Err(ClientError::WrongMode { .. })
        ));
    }

    #[tokio::test]
    async fn mission_history_only_grows() {
        let mut h = harness();
        h.apply(fixtures::with_results(fixtures::picking_reply("g1", 2, 2, 1), 1))
            .await;
        let first = h.engine.rendered_missions().to_vec();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].summary, "Alice, Bob, Leader: Alice (0 fails)");

        h.apply(fixtures::with_results(fixtures::picking_reply("g1", 2, 4, 1), 3))
            .await;
        assert_eq!(h.engine.rendered_missions().len(), 3);
        assert_eq!(h.engine.rendered_missions()[0], first[0]);
        assert!(h.engine.rendered_missions()[1].failed);

        h.drain_ui();
        h.apply(fixtures::with_results(fixtures::picking_reply("g1", 2, 4, 2), 1))
            .await;
        assert_eq!(h.engine.rendered_missions().len(), 3);
        assert_eq!(h.engine.session().rendered_mission_count, 3);
        let updates = h.drain_ui();
        assert_eq!(
            count(&updates, |u| matches!(u, UiUpdate::MissionsAppended(_))),
            0
        );
    }

    #[tokio::test]
    async fn failed_command_restores_exactly_what_it_disabled() {
        let mut h = harness();
        h.apply(fixtures::mission_reply("g1", &[0, 2], true, false)).await;
        let before = h.engine.snapshot().cloned();
        h.engine.select_action(MissionAction::Success).await.unwrap();

        h.transport
            .push_error(CommandKind::Mission, 500, "mission already complete");
        h.engine.commit_mission().await.unwrap();
        let panel = h.mission();
        assert!(!panel.commit_enabled && !panel.success_enabled);

        h.drain_ui();
        h.settle().await;

        let panel = h.mission();
        assert!(panel.commit_enabled);
        assert!(panel.success_enabled);
        assert!(!panel.failure_enabled);
        assert_eq!(h.engine.snapshot().cloned(), before);
        assert!(h
            .drain_ui()
            .iter()
            .any(|u| matches!(u, UiUpdate::Error(msg) if msg.contains("mission already complete"))));
        assert_eq!(
            h.transport.requests(CommandKind::Mission),
            vec![json!({"mission": 1, "action": "Success"})]
        );
    }

    #[tokio::test]
    async fn late_failure_from_previous_round_keeps_new_round_controls() {
        let mut h = harness();
        h.apply(fixtures::mission_reply("g1", &[0, 2], true, true)).await;
        h.engine.select_action(MissionAction::Success).await.unwrap();
        h.transport
            .push_error(CommandKind::Mission, 503, "server restarting");
        h.engine.commit_mission().await.unwrap();
        let late_failure = h.next_outcome().await;
        assert_eq!(late_failure.kind, CommandKind::Mission);

        // Mission 2 arrives first; this time failing is not allowed.
        let mut next_round = fixtures::mission_reply("g1", &[0, 2], true, false);
        next_round["general"]["this_mission"] = json!(2);
        h.transport.push_state(next_round);
        h.engine.refresh_now().await;
        let fetched = h.next_outcome().await;
        h.engine.handle_outcome(fetched).await;
        let panel = h.mission();
        assert!(panel.form_visible && panel.success_enabled);
        assert!(!panel.failure_enabled);

        h.drain_ui();
        h.engine.handle_outcome(late_failure).await;
        let panel = h.mission();
        assert!(panel.success_enabled && panel.commit_enabled);
        assert!(!panel.failure_enabled);
        assert!(h
            .drain_ui()
            .iter()
            .any(|u| matches!(u, UiUpdate::Error(msg) if msg.contains("server restarting"))));
    }

    #[tokio::test]
    async fn proposal_of_wrong_size_is_not_sent() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 0, 2, 3)).await;
        h.engine.toggle_candidate(1).await.unwrap();

        assert!(matches!(
            h.engine.commit_proposal().await,
            Err(ClientError::InvalidSelection(SelectionError::ProposalSize { .. }))
        ));
        assert!(h.picking().commit_enabled);

        h.engine.toggle_candidate(4).await.unwrap();
        h.transport
            .push(CommandKind::Propose, fixtures::voting_reply("g1", 0, &[1, 4]));
        h.engine.commit_proposal().await.unwrap();
        assert!(matches!(
            h.engine.commit_proposal().await,
            Err(ClientError::SlotBusy(CommandKind::Propose))
        ));
        h.settle().await;

        assert_eq!(
            h.transport.requests(CommandKind::Propose),
            vec![json!({"mission": 2, "proposal": 3, "players": [1, 4]})]
        );
        assert_eq!(h.engine.mode().phase(), Phase::Voting);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_snapshot_and_releases_guard() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 2, 1, 1)).await;
        let before = h.engine.snapshot().cloned();
        h.drain_ui();

        h.transport
            .push_error(CommandKind::FetchState, 502, "bad gateway");
        assert!(h.engine.refresh().await);
        h.settle().await;

        assert!(!h.engine.is_refreshing());
        assert_eq!(h.engine.snapshot().cloned(), before);
        assert_eq!(h.engine.mode().phase(), Phase::Picking);
        assert!(h
            .drain_ui()
            .iter()
            .any(|u| matches!(u, UiUpdate::Error(msg) if msg.contains("fetch-state"))));

        h.transport.push_state(fixtures::voting_reply("g1", 2, &[0, 1]));
        assert!(h.engine.refresh().await);
        h.settle().await;
        assert_eq!(h.engine.mode().phase(), Phase::Voting);
    }

    #[tokio::test]
    async fn malformed_state_is_reported_not_applied() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 2, 1, 1)).await;
        h.drain_ui();

        let mut reply = fixtures::voting_reply("g1", 2, &[0, 1]);
        reply.as_object_mut().unwrap().remove("mission_players");
        h.apply(reply).await;

        assert_eq!(h.engine.mode().phase(), Phase::Picking);
        assert!(h
            .drain_ui()
            .iter()
            .any(|u| matches!(u, UiUpdate::Error(msg) if msg.contains("mission_players"))));
    }

    #[tokio::test]
    async fn mirror_divergence_triggers_join() {
        let mut h = harness();
        h.transport.push(CommandKind::Join, fixtures::picking_reply("g7", 1, 1, 1));

        h.mirror.submit_delta(MirrorDelta::GameId("g7".into()));
        h.engine.on_mirror_changed().await;
        h.settle().await;

        assert_eq!(h.transport.calls().first(), Some(&CommandKind::Join));
        assert_eq!(h.engine.session().game_id.as_deref(), Some("g7"));

        // Our own mirror writes match local state, so no extra fetch.
        let fetches = h.transport.call_count(CommandKind::FetchState);
        h.engine.on_mirror_changed().await;
        assert!(h.engine.pending_commands().is_empty());
        assert_eq!(h.transport.call_count(CommandKind::FetchState), fetches);

        // Another client moved the phase on.
        h.transport.push_state(fixtures::voting_reply("g7", 1, &[0, 1]));
        h.mirror.submit_delta(MirrorDelta::Phase(Phase::Voting));
        h.engine.on_mirror_changed().await;
        h.settle().await;
        assert_eq!(h.engine.mode().phase(), Phase::Voting);
    }

    #[tokio::test]
    async fn refresh_joins_diverged_game_without_racing_a_fetch() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 1, 1, 1)).await;
        assert_eq!(h.transport.call_count(CommandKind::FetchState), 1);

        // Another client started g2. A fetch of our old session would still
        // report g1 and must not race the join's reply.
        h.transport.push(CommandKind::Join, fixtures::picking_reply("g2", 1, 1, 1));
        h.mirror.submit_delta(MirrorDelta::GameId("g2".into()));
        assert!(h.engine.refresh().await);
        assert!(h.engine.is_refreshing());
        assert!(h.engine.in_flight_fetch().is_none());

        h.settle().await;
        assert_eq!(h.transport.call_count(CommandKind::Join), 1);
        assert_eq!(h.transport.call_count(CommandKind::FetchState), 1);
        assert_eq!(h.engine.session().game_id.as_deref(), Some("g2"));
        assert!(!h.engine.is_refreshing());
    }

    #[tokio::test]
    async fn start_flow_loads_setup_and_pads_cards() {
        let mut h = harness();
        h.engine.ready().await;
        assert_eq!(h.engine.mode().phase(), Phase::Start);
        h.settle().await;

        assert_eq!(
            h.transport.requests(CommandKind::Setup),
            vec![json!({"players": 5})]
        );
        match h.engine.mode().panel() {
            PanelView::Start(panel) => {
                assert_eq!(panel.lobby[0], "Alice (me)");
                assert!(panel.start_enabled);
                let choice = panel.card_choice.as_ref().unwrap();
                assert_eq!(choice.generic_good_hint, "...plus 3 Good cards");
            }
            other => panic!("expected start panel, got {other:?}"),
        }

        h.engine.toggle_card(CardSide::Good, "Merlin").await.unwrap();
        h.engine.toggle_card(CardSide::Evil, "Assassin").await.unwrap();
        h.transport
            .push(CommandKind::Start, fixtures::picking_reply("g9", 0, 1, 1));
        h.engine.start_game().await.unwrap();
        h.settle().await;

        let sent = h.transport.requests(CommandKind::Start);
        assert_eq!(sent[0]["cards"], json!(["Merlin", "Assassin", "Good", "Good", "Evil"]));
        assert_eq!(sent[0]["players"]["p0"], json!("100"));
        assert_eq!(h.engine.session().game_id.as_deref(), Some("g9"));
        assert_eq!(h.engine.mode().phase(), Phase::Picking);
    }

    #[tokio::test]
    async fn gameover_stops_polling_and_new_game_returns_to_start() {
        let mut h = harness();
        h.apply(fixtures::picking_reply("g1", 2, 1, 1)).await;
        assert!(h.engine.is_polling());

        h.apply(fixtures::gameover_reply("g1")).await;
        assert!(!h.engine.is_polling());
        match h.engine.mode().panel() {
            PanelView::Gameover(panel) => {
                assert_eq!(panel.result, "Good wins");
                assert_eq!(panel.cards[2].annotation.as_deref(), Some("Assassin"));
                assert!(panel.start_enabled);
            }
            other => panic!("expected gameover panel, got {other:?}"),
        }
        assert!(h.engine.mode().is_enabled(ControlId::StartGame));

        h.engine.new_game().await.unwrap();
        assert_eq!(h.engine.mode().phase(), Phase::Start);
        // Local only: the mirror still says game over.
        assert_eq!(h.mirror.state().phase, Some(Phase::Gameover));
    }

    #[tokio::test]
    async fn roster_shows_votes_and_indicators() {
        let mut h = harness();
        let mut reply = fixtures::voting_reply("g1", 2, &[0, 1]);
        reply["general"]["votes"] = json!([
            {"leader": 1, "players": [1, 3], "votes": [true, false, true, true, false]}
        ]);
        h.apply(reply).await;

        let updates = h.drain_ui();
        let roster = updates
            .iter()
            .rev()
            .find_map(|u| match u {
                UiUpdate::Roster(seats) => Some(seats.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(roster[1].annotation.as_deref(), Some("reject"));
        assert_eq!(roster[1].indicator, Some(Indicator::Done));
        assert_eq!(roster[0].indicator, Some(Indicator::Waiting));

        let last = updates
            .iter()
            .rev()
            .find_map(|u| match u {
                UiUpdate::LastProposal(seats) => Some(seats.clone()),
                _ => None,
            })
            .unwrap()
            .unwrap();
        assert_eq!(last[0].name, "Bob");
        assert_eq!(last[0].indicator, Some(Indicator::Leader));
    }
}
