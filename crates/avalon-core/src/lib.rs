// Shared vocabulary for the game client: wire protocol, domain snapshot,
// UI messages, the replicated mirror, the roster and configuration.

pub mod config;
pub mod mirror;
pub mod names;
pub mod protocol;
pub mod snapshot;
pub mod ui;
