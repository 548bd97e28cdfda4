// Request issuing with one slot per command kind.
//
// Each request runs on its own tokio task and reports back over an mpsc
// channel as a `CommandOutcome` carrying the generation it was issued with.
// Kinds that supersede (fetch, setup, reveal) abort the unresolved request in
// their slot; the rest are refused while one is outstanding.

use std::collections::HashMap;
use std::sync::Arc;

use avalon_core::protocol::{
    CommandKind, GameStateResponse, MissionRequest, ProposeRequest, RevealGroup, SetupRequest,
    SetupResponse, StartRequest, VoteRequest,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ClientError, TransportError};
use crate::latch::RefreshGuard;
use crate::mode::ControlId;
use crate::transport::GameTransport;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join,
    Start(StartRequest),
    Setup(SetupRequest),
    Propose(ProposeRequest),
    Vote(VoteRequest),
    Mission(MissionRequest),
    Reveal,
    FetchState,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Join => CommandKind::Join,
            Command::Start(_) => CommandKind::Start,
            Command::Setup(_) => CommandKind::Setup,
            Command::Propose(_) => CommandKind::Propose,
            Command::Vote(_) => CommandKind::Vote,
            Command::Mission(_) => CommandKind::Mission,
            Command::Reveal => CommandKind::Reveal,
            Command::FetchState => CommandKind::FetchState,
        }
    }

    async fn execute(self, transport: &dyn GameTransport) -> Result<CommandReply, TransportError> {
        let state = |s: GameStateResponse| CommandReply::State(Box::new(s));
        match self {
            Command::Join => transport.join().await.map(state),
            Command::Start(req) => transport.start(&req).await.map(state),
            Command::Setup(req) => transport.setup(&req).await.map(CommandReply::Setup),
            Command::Propose(req) => transport.propose(&req).await.map(state),
            Command::Vote(req) => transport.vote(&req).await.map(state),
            Command::Mission(req) => transport.act_on_mission(&req).await.map(state),
            Command::Reveal => transport.reveal().await.map(CommandReply::Reveal),
            Command::FetchState => transport.fetch_state().await.map(state),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    State(Box<GameStateResponse>),
    Setup(SetupResponse),
    Reveal(Vec<RevealGroup>),
}

/// What the issuer hands along with a request and gets back in the outcome.
#[derive(Debug, Default)]
pub struct Ticket {
    /// Controls the submission disabled; re-enabled if it fails.
    pub disabled: Vec<ControlId>,
    /// Mode epoch at submission. A restore is skipped once it moved on.
    pub mode_epoch: u64,
    /// Held refresh guard, released once the outcome has been handled.
    pub guard: Option<RefreshGuard>,
}

#[derive(Debug)]
pub struct CommandOutcome {
    pub kind: CommandKind,
    pub generation: u64,
    pub result: Result<CommandReply, TransportError>,
    pub ticket: Ticket,
}

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct CommandChannel {
    transport: Arc<dyn GameTransport>,
    outcome_tx: mpsc::Sender<CommandOutcome>,
    pending: HashMap<CommandKind, Pending>,
}

impl CommandChannel {
    pub fn new(transport: Arc<dyn GameTransport>, outcome_tx: mpsc::Sender<CommandOutcome>) -> Self {
        Self {
            transport,
            outcome_tx,
            pending: HashMap::new(),
        }
    }

    /// Spawn `command` tagged with `generation`.
    ///
    /// Fails with `SlotBusy` if a non-superseding kind already has a request
    /// in flight; the ticket is dropped in that case.
    pub fn issue(
        &mut self,
        command: Command,
        generation: u64,
        ticket: Ticket,
    ) -> Result<(), ClientError> {
        let kind = command.kind();

        if let Some(prev) = self.pending.get(&kind) {
            if kind.supersedes() {
                debug!(%kind, old = prev.generation, new = generation, "superseding request");
                prev.handle.abort();
            } else if !prev.handle.is_finished() {
                return Err(ClientError::SlotBusy(kind));
            }
        }

        let transport = Arc::clone(&self.transport);
        let tx = self.outcome_tx.clone();
        let handle = tokio::spawn(async move {
            let result = command.execute(transport.as_ref()).await;
            let outcome = CommandOutcome {
                kind,
                generation,
                result,
                ticket,
            };
            if tx.send(outcome).await.is_err() {
                debug!(%kind, generation, "outcome receiver dropped");
            }
        });

        self.pending.insert(kind, Pending { generation, handle });
        Ok(())
    }

    /// Whether `kind` has a request that has not been resolved yet.
    pub fn is_pending(&self, kind: CommandKind) -> bool {
        self.pending.contains_key(&kind)
    }

    pub fn latest_generation(&self, kind: CommandKind) -> Option<u64> {
        self.pending.get(&kind).map(|p| p.generation)
    }

    /// Mark the outcome of `generation` in slot `kind` as handled.
    ///
    /// Returns false if the slot has since moved to a newer request, meaning
    /// this outcome was superseded.
    pub fn resolve(&mut self, kind: CommandKind, generation: u64) -> bool {
        match self.pending.get(&kind) {
            Some(p) if p.generation == generation => {
                self.pending.remove(&kind);
                true
            }
            _ => false,
        }
    }

    /// Kinds with a request in flight.
    pub fn pending_kinds(&self) -> Vec<CommandKind> {
        let mut kinds: Vec<CommandKind> = self.pending.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Abort every in-flight request.
    pub fn cancel_all(&mut self) {
        for (kind, pending) in self.pending.drain() {
            debug!(%kind, generation = pending.generation, "cancelling request");
            pending.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latch::RefreshLatch;
    use crate::fixtures;
    use crate::scripted::ScriptedTransport;
    use std::time::Duration;

    fn channel(
        transport: Arc<ScriptedTransport>,
    ) -> (CommandChannel, mpsc::Receiver<CommandOutcome>) {
        let (tx, rx) = mpsc::channel(16);
        (CommandChannel::new(transport, tx), rx)
    }

    #[tokio::test]
    async fn outcome_carries_generation_and_reply() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_state(fixtures::picking_reply("g1", 0, 1, 1));
        let (mut commands, mut rx) = channel(transport);

        commands.issue(Command::FetchState, 7, Ticket::default()).unwrap();
        let outcome = rx.recv().await.unwrap();

        assert_eq!(outcome.kind, CommandKind::FetchState);
        assert_eq!(outcome.generation, 7);
        assert!(matches!(outcome.result, Ok(CommandReply::State(_))));
        assert!(commands.resolve(CommandKind::FetchState, 7));
        assert!(!commands.is_pending(CommandKind::FetchState));
    }

    #[tokio::test]
    async fn non_superseding_slot_refuses_second_request() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.hold();
        let (mut commands, _rx) = channel(transport);

        let vote = || {
            Command::Vote(VoteRequest {
                mission: 1,
                proposal: 1,
                vote: avalon_core::protocol::VoteChoice::Approve,
            })
        };
        commands.issue(vote(), 1, Ticket::default()).unwrap();
        assert!(matches!(
            commands.issue(vote(), 2, Ticket::default()),
            Err(ClientError::SlotBusy(CommandKind::Vote))
        ));
        assert_eq!(commands.latest_generation(CommandKind::Vote), Some(1));
    }

    #[tokio::test]
    async fn superseding_aborts_prior_request_and_releases_its_guard() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.hold();
        let (mut commands, _rx) = channel(Arc::clone(&transport));
        let latch = RefreshLatch::new();

        let ticket = Ticket {
            guard: latch.try_acquire(),
            ..Ticket::default()
        };
        commands.issue(Command::FetchState, 1, ticket).unwrap();
        tokio::task::yield_now().await;
        assert!(latch.is_held());

        commands.issue(Command::FetchState, 2, Ticket::default()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while latch.is_held() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("aborted request should release the guard");

        assert!(!commands.resolve(CommandKind::FetchState, 1));
        assert_eq!(commands.latest_generation(CommandKind::FetchState), Some(2));
    }

    #[tokio::test]
    async fn cancel_all_clears_slots() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.hold();
        let (mut commands, _rx) = channel(transport);

        commands.issue(Command::Join, 1, Ticket::default()).unwrap();
        commands.issue(Command::Reveal, 2, Ticket::default()).unwrap();
        assert_eq!(
            commands.pending_kinds(),
            vec![CommandKind::Join, CommandKind::Reveal]
        );

        commands.cancel_all();
        assert!(commands.pending_kinds().is_empty());
    }
}
