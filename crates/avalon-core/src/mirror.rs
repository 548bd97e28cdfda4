// Replicated key-value view shared by every participant's client.
//
// Only two scalars live here: the current game id and phase. They are a
// cheap staleness hint; the server stays authoritative. Writes are plain
// overwrites and never read-modify-write.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::protocol::GameId;
use crate::snapshot::Phase;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorState {
    pub game_id: Option<GameId>,
    pub phase: Option<Phase>,
}

/// A single-key overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorDelta {
    GameId(GameId),
    Phase(Phase),
}

pub trait SharedStateMirror: Send + Sync {
    /// Current replicated values.
    fn state(&self) -> MirrorState;

    /// Fire-and-forget overwrite of one key.
    fn submit_delta(&self, delta: MirrorDelta);

    /// Change notifications; fires whenever any client changes a value.
    fn subscribe(&self) -> watch::Receiver<MirrorState>;
}

/// In-process mirror. Clones share the same state, standing in for the
/// replication transport when every client lives in one process.
#[derive(Debug, Clone)]
pub struct InMemoryMirror {
    tx: Arc<watch::Sender<MirrorState>>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(MirrorState::default());
        Self { tx: Arc::new(tx) }
    }
}

impl Default for InMemoryMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStateMirror for InMemoryMirror {
    fn state(&self) -> MirrorState {
        self.tx.borrow().clone()
    }

    fn submit_delta(&self, delta: MirrorDelta) {
        let changed = self.tx.send_if_modified(|state| match &delta {
            MirrorDelta::GameId(id) if state.game_id.as_ref() != Some(id) => {
                state.game_id = Some(id.clone());
                true
            }
            MirrorDelta::Phase(phase) if state.phase != Some(*phase) => {
                state.phase = Some(*phase);
                true
            }
            _ => false,
        });
        if changed {
            debug!(?delta, "mirror updated");
        }
    }

    fn subscribe(&self) -> watch::Receiver<MirrorState> {
        self.tx.subscribe()
    }
}
