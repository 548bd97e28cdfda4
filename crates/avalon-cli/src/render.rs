// Plain-text rendering of engine updates.
//
// Every update becomes one or more lines, the first prefixed with the local
// wall-clock time so the scrollback reads as a log of the game.

use avalon_core::ui::{CardToggleView, Indicator, MissionSlotView, PanelView, SeatView, UiUpdate};
use chrono::NaiveTime;

/// Render `update` as printable lines stamped with `at`.
pub fn render(update: &UiUpdate, at: NaiveTime) -> Vec<String> {
    let mut lines = body(update);
    if let Some(first) = lines.first_mut() {
        *first = format!("[{}] {first}", at.format("%H:%M:%S"));
    }
    lines
}

fn body(update: &UiUpdate) -> Vec<String> {
    match update {
        UiUpdate::ModeEntered(phase) => vec![format!("== {phase} ==")],
        UiUpdate::ModeReset(phase) => vec![format!("-- new round ({phase}) --")],
        UiUpdate::Panel(panel) => panel_lines(panel),
        UiUpdate::Roster(seats) => {
            let mut lines = vec!["Table:".to_string()];
            lines.extend(seats.iter().map(|s| format!("  {}", seat(s))));
            lines
        }
        UiUpdate::Status(status) => vec![format!(
            "Mission {}, proposal {}, leader {}",
            status.mission, status.proposal, status.leader
        )],
        UiUpdate::LastProposal(Some(seats)) => vec![format!(
            "Last proposal: {}",
            seats.iter().map(seat).collect::<Vec<_>>().join(", ")
        )],
        UiUpdate::LastProposal(None) => Vec::new(),
        UiUpdate::MissionBoard(slots) => vec![format!(
            "Board: {}",
            slots.iter().map(slot).collect::<Vec<_>>().join(" ")
        )],
        UiUpdate::MissionsCleared => vec!["Mission history cleared".to_string()],
        UiUpdate::MissionsAppended(missions) => missions
            .iter()
            .map(|m| {
                let outcome = if m.failed { "FAILED" } else { "succeeded" };
                format!("Mission {} {outcome}: {}", m.mission_number, m.summary)
            })
            .collect(),
        UiUpdate::RolesRevealed(reveal) => {
            let mut lines = vec![format!("Cards in game: {}", reveal.cards_in_game.join(", "))];
            lines.extend(
                reveal
                    .groups
                    .iter()
                    .map(|(label, names)| format!("  {label}: {}", names.join(", "))),
            );
            lines
        }
        UiUpdate::Polling(true) => vec!["Polling started".to_string()],
        UiUpdate::Polling(false) => vec!["Polling stopped".to_string()],
        UiUpdate::Error(message) => vec![format!("error: {message}")],
    }
}

fn seat(seat: &SeatView) -> String {
    let mut text = format!("{} {}", seat.position, seat.name);
    if let Some(annotation) = &seat.annotation {
        text.push_str(&format!(" ({annotation})"));
    }
    match seat.indicator {
        Some(Indicator::Leader) => text.push_str(" *"),
        Some(Indicator::Done) => text.push_str(" [done]"),
        Some(Indicator::Waiting) => text.push_str(" [...]"),
        None => {}
    }
    text
}

fn slot(slot: &MissionSlotView) -> String {
    if slot.current {
        format!("[{}]", slot.label)
    } else {
        slot.label.clone()
    }
}

fn enabled(flag: bool, text: &str) -> String {
    if flag {
        text.to_string()
    } else {
        format!("({text})")
    }
}

fn panel_lines(panel: &PanelView) -> Vec<String> {
    match panel {
        PanelView::Joining => vec!["Waiting for the session to be ready".to_string()],
        PanelView::Start(start) => {
            let mut lines = vec![format!("Lobby: {}", start.lobby.join(", "))];
            match &start.card_choice {
                Some(choice) => {
                    let toggles = |cards: &[CardToggleView]| {
                        cards
                            .iter()
                            .map(|c| {
                                if c.selected {
                                    format!("[x] {}", c.label)
                                } else {
                                    format!("[ ] {}", c.label)
                                }
                            })
                            .collect::<Vec<_>>()
                            .join("  ")
                    };
                    lines.push(format!("Good: {} {}", toggles(choice.good.as_slice()), choice.generic_good_hint));
                    lines.push(format!("Evil: {} {}", toggles(choice.evil.as_slice()), choice.generic_evil_hint));
                }
                None => lines.push("Loading setup...".to_string()),
            }
            lines.push(enabled(start.start_enabled, "start"));
            lines
        }
        PanelView::Picking(picking) => {
            let mut lines = vec![format!("Mission needs {} players", picking.mission_size)];
            if picking.selection_visible {
                let candidates = picking
                    .candidates
                    .iter()
                    .map(|c| {
                        let mark = if c.checked { "x" } else { " " };
                        format!("[{mark}] {} {}", c.position, c.name)
                    })
                    .collect::<Vec<_>>()
                    .join("  ");
                lines.push(format!("You lead: {candidates}"));
                lines.push(enabled(picking.commit_enabled, "propose"));
            }
            lines
        }
        PanelView::Voting(voting) => {
            let players = voting.mission_players.iter().map(seat).collect::<Vec<_>>();
            let choice = voting
                .choice
                .map(|c| format!("{c:?}").to_lowercase())
                .unwrap_or_else(|| "none".to_string());
            vec![
                format!("Vote on: {}", players.join(", ")),
                format!(
                    "{} {} choice: {choice} {}",
                    enabled(voting.approve_enabled, "approve"),
                    enabled(voting.reject_enabled, "reject"),
                    enabled(voting.commit_enabled, "vote"),
                ),
            ]
        }
        PanelView::Mission(mission) => {
            let players = mission.mission_players.iter().map(seat).collect::<Vec<_>>();
            let mut lines = vec![format!("On the mission: {}", players.join(", "))];
            if mission.form_visible {
                let choice = mission
                    .choice
                    .map(|c| format!("{c:?}").to_lowercase())
                    .unwrap_or_else(|| "none".to_string());
                lines.push(format!(
                    "{} {} choice: {choice} {}",
                    enabled(mission.success_enabled, "success"),
                    enabled(mission.failure_enabled, "fail"),
                    enabled(mission.commit_enabled, "act"),
                ));
            }
            lines
        }
        PanelView::Gameover(over) => {
            let mut lines = vec![format!("Game over: {}", over.result)];
            if !over.comment.is_empty() {
                lines.push(over.comment.clone());
            }
            lines.extend(over.cards.iter().map(|s| format!("  {}", seat(s))));
            lines.push(enabled(over.start_enabled, "new"));
            lines
        }
    }
}
