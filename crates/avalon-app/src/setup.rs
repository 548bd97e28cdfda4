// Start-mode card selection and the role-reveal card summary.
//
// The server offers a catalog of good and evil cards, each including a generic
// entry ("Good" / "Evil"). Only the special cards are shown as toggles; every
// seat left over on a side is padded with that side's generic card.

use avalon_core::protocol::SetupResponse;
use avalon_core::ui::{CardChoiceView, CardSide, CardToggleView};

use crate::error::SelectionError;

/// Games below this size are padded with AI players.
pub const MIN_PLAYERS: usize = 5;

pub const GENERIC_GOOD: &str = "Good";
pub const GENERIC_EVIL: &str = "Evil";

/// Player count a setup is requested for, given the lobby size.
pub fn setup_player_count(lobby_size: usize) -> usize {
    lobby_size.max(MIN_PLAYERS)
}

/// Seats each side still has for generic cards. Negative means too many
/// special cards were picked for that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupTally {
    pub generic_good: i64,
    pub generic_evil: i64,
}

impl SetupTally {
    pub fn can_start(&self) -> bool {
        self.generic_good >= 0 && self.generic_evil >= 0
    }
}

/// Build the chooser for `players` seats from a setup reply. Every special
/// card starts unselected.
pub fn build_card_choice(players: usize, reply: &SetupResponse) -> CardChoiceView {
    let evil_slots = reply.setup.spies.min(players);
    let mut choice = CardChoiceView {
        players,
        good_slots: players - evil_slots,
        evil_slots,
        good: toggles(&reply.good_cards, GENERIC_GOOD),
        evil: toggles(&reply.evil_cards, GENERIC_EVIL),
        ..CardChoiceView::default()
    };
    refresh_hints(&mut choice);
    choice
}

fn toggles(catalog: &[String], generic: &str) -> Vec<CardToggleView> {
    let mut labels: Vec<&String> = catalog.iter().filter(|c| *c != generic).collect();
    labels.sort();
    labels.dedup();
    labels
        .into_iter()
        .map(|label| CardToggleView {
            label: label.clone(),
            selected: false,
        })
        .collect()
}

pub fn tally(choice: &CardChoiceView) -> SetupTally {
    let picked = |cards: &[CardToggleView]| cards.iter().filter(|c| c.selected).count() as i64;
    SetupTally {
        generic_good: choice.good_slots as i64 - picked(&choice.good),
        generic_evil: choice.evil_slots as i64 - picked(&choice.evil),
    }
}

/// Recompute the per-side hints and return the tally they reflect.
pub fn refresh_hints(choice: &mut CardChoiceView) -> SetupTally {
    let tally = tally(choice);
    choice.generic_good_hint = generic_hint(tally.generic_good, GENERIC_GOOD);
    choice.generic_evil_hint = generic_hint(tally.generic_evil, GENERIC_EVIL);
    tally
}

fn generic_hint(count: i64, generic: &str) -> String {
    match count {
        n if n < 0 => "Too many!".to_string(),
        0 => String::new(),
        1 => format!("...plus 1 {generic} card"),
        n => format!("...plus {n} {generic} cards"),
    }
}

/// Flip one special card. Hints are refreshed.
pub fn toggle(
    choice: &mut CardChoiceView,
    side: CardSide,
    label: &str,
) -> Result<SetupTally, SelectionError> {
    let cards = match side {
        CardSide::Good => &mut choice.good,
        CardSide::Evil => &mut choice.evil,
    };
    let card = cards
        .iter_mut()
        .find(|c| c.label == label)
        .ok_or_else(|| SelectionError::UnknownCard(label.to_string()))?;
    card.selected = !card.selected;
    Ok(refresh_hints(choice))
}

/// The full card list for `game/start`: selected specials, then generic
/// padding for each side.
pub fn cards_for_start(choice: &CardChoiceView) -> Result<Vec<String>, SelectionError> {
    let tally = tally(choice);
    if tally.generic_good < 0 {
        return Err(SelectionError::TooManyCards("good"));
    }
    if tally.generic_evil < 0 {
        return Err(SelectionError::TooManyCards("evil"));
    }

    let selected = |cards: &[CardToggleView]| {
        cards
            .iter()
            .filter(|c| c.selected)
            .map(|c| c.label.clone())
            .collect::<Vec<_>>()
    };

    let mut cards = selected(&choice.good);
    cards.extend(selected(&choice.evil));
    cards.extend(std::iter::repeat(GENERIC_GOOD.to_string()).take(tally.generic_good as usize));
    cards.extend(std::iter::repeat(GENERIC_EVIL.to_string()).take(tally.generic_evil as usize));
    Ok(cards)
}

/// Fold a game's card list into display entries, sorted, with repeats shown
/// as a count joined by a no-break space: `["Good\u{a0}x3", "Merlin"]`.
pub fn summarize_cards(cards: &[String]) -> Vec<String> {
    let mut sorted: Vec<&String> = cards.iter().collect();
    sorted.sort();

    let mut summary: Vec<String> = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let label = sorted[i];
        let run = sorted[i..].iter().take_while(|c| **c == label).count();
        if run > 1 {
            summary.push(format!("{label}\u{a0}x{run}"));
        } else {
            summary.push(label.clone());
        }
        i += run;
    }
    summary
}
