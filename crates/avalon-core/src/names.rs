// Participant roster and the display-name cache built on top of it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::protocol::ParticipantId;

/// Shown for ids the roster has never reported.
pub const ABSENT_PLAYER: &str = "<absent player>";

const AI_PREFIX: &str = "ai_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Stable account identifier sent to the server when starting a game.
    pub person_id: String,
    pub display_name: String,
}

/// Source of the current participant list.
pub trait RosterProvider: Send + Sync {
    fn local_participant_id(&self) -> ParticipantId;

    fn participants(&self) -> Vec<Participant>;

    fn participant(&self, id: &str) -> Option<Participant> {
        self.participants().into_iter().find(|p| p.id == id)
    }
}

/// Roster with a fixed local participant and a replaceable member list.
#[derive(Debug)]
pub struct StaticRoster {
    local_id: ParticipantId,
    members: RwLock<Vec<Participant>>,
}

impl StaticRoster {
    pub fn new(local_id: impl Into<ParticipantId>, members: Vec<Participant>) -> Self {
        Self {
            local_id: local_id.into(),
            members: RwLock::new(members),
        }
    }

    /// Replace the member list. The caller is responsible for notifying the
    /// engine that membership changed.
    pub fn set_participants(&self, members: Vec<Participant>) {
        let mut guard = self.members.write().unwrap_or_else(|e| e.into_inner());
        *guard = members;
    }
}

impl RosterProvider for StaticRoster {
    fn local_participant_id(&self) -> ParticipantId {
        self.local_id.clone()
    }

    fn participants(&self) -> Vec<Participant> {
        self.members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// ---------------------------------------------------------------------------
// PlayerNameCache
// ---------------------------------------------------------------------------

/// Memoizing id -> display name lookup. Entries live for the whole session,
/// so a participant who leaves keeps the name they were first seen with.
pub struct PlayerNameCache {
    roster: Arc<dyn RosterProvider>,
    names: HashMap<ParticipantId, String>,
}

impl PlayerNameCache {
    pub fn new(roster: Arc<dyn RosterProvider>) -> Self {
        Self {
            roster,
            names: HashMap::new(),
        }
    }

    pub fn name_by_id(&mut self, id: &str) -> String {
        if let Some(name) = self.names.get(id) {
            return name.clone();
        }
        let name = self.resolve(id);
        self.names.insert(id.to_string(), name.clone());
        name
    }

    /// Name of the player at `position` in `players` (table order).
    pub fn name_at(&mut self, players: &[ParticipantId], position: usize) -> String {
        match players.get(position) {
            Some(id) => self.name_by_id(id),
            None => ABSENT_PLAYER.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn resolve(&self, id: &str) -> String {
        if let Some(n) = id
            .strip_prefix(AI_PREFIX)
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        {
            return format!("<AI {n}>");
        }
        match self.roster.participant(id) {
            Some(p) => p.display_name,
            None => ABSENT_PLAYER.to_string(),
        }
    }
}
