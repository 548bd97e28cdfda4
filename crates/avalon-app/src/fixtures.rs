// Reply builders shared by the unit tests. The table is five seats, p0..p4,
// and the local participant is p0.

use std::sync::Arc;

use avalon_core::names::{Participant, StaticRoster};
use serde_json::{json, Value};

pub const LOCAL: &str = "p0";

const NAMES: [&str; 5] = ["Alice", "Bob", "Carol", "Dave", "Eve"];

pub fn roster() -> Arc<StaticRoster> {
    let members = NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| Participant {
            id: format!("p{i}"),
            person_id: format!("10{i}"),
            display_name: name.to_string(),
        })
        .collect();
    Arc::new(StaticRoster::new(LOCAL, members))
}

pub fn general(game_id: &str, state: &str, leader: usize, mission: u32, proposal: u32) -> Value {
    json!({
        "gameid": game_id,
        "players": ["p0", "p1", "p2", "p3", "p4"],
        "state": state,
        "leader": leader,
        "mission_results": [],
        "votes": [],
        "this_mission": mission,
        "this_proposal": proposal,
        "setup": {
            "missions": [
                {"size": 2, "fails_allowed": 0},
                {"size": 3, "fails_allowed": 0},
                {"size": 2, "fails_allowed": 0},
                {"size": 3, "fails_allowed": 1},
                {"size": 3, "fails_allowed": 0}
            ],
            "cards": ["Merlin", "Good", "Good", "Assassin", "Evil"],
            "spies": 2
        }
    })
}

pub fn picking_reply(game_id: &str, leader: usize, mission: u32, proposal: u32) -> Value {
    json!({
        "general": general(game_id, "picking", leader, mission, proposal),
        "mission_size": 2
    })
}

pub fn voting_reply(game_id: &str, leader: usize, mission_players: &[usize]) -> Value {
    json!({
        "general": general(game_id, "voting", leader, 1, 1),
        "mission_players": mission_players,
        "voted_players": [false, true, false, false, false]
    })
}

pub fn mission_reply(game_id: &str, mission_players: &[usize], success: bool, failure: bool) -> Value {
    json!({
        "general": general(game_id, "mission", 1, 1, 1),
        "mission_players": mission_players,
        "acted_players": vec![false; mission_players.len()],
        "allow_actions": {"Success": success, "Failure": failure}
    })
}

pub fn gameover_reply(game_id: &str) -> Value {
    json!({
        "general": general(game_id, "gameover", 0, 5, 1),
        "result": "Good wins",
        "comment": "Three missions succeeded",
        "cards": ["Merlin", "Good", "Assassin", "Good", "Evil"]
    })
}

/// Replace the mission history of `reply` with `count` completed missions.
pub fn with_results(mut reply: Value, count: usize) -> Value {
    let results: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "mission": i,
                "proposal": 1,
                "leader": i % 5,
                "players": [0, 1],
                "fails": i % 2,
                "fails_allowed": 0
            })
        })
        .collect();
    reply["general"]["mission_results"] = Value::Array(results);
    reply
}

pub fn setup_reply() -> Value {
    json!({
        "setup": {
            "missions": [{"size": 2, "fails_allowed": 0}],
            "cards": [],
            "spies": 2
        },
        "good_cards": ["Good", "Percival", "Merlin"],
        "evil_cards": ["Evil", "Morgana", "Assassin"]
    })
}
