//! Filtered decks: borrowing cards from their home decks and giving them
//! back.

use std::collections::HashSet;

use super::{Scheduler, SchedulerSession};
use crate::card::{Card, CardId, CardQueue, CardType, Due};
use crate::clock::Clock;
use crate::deck::{DeckId, FilterTerm};
use crate::error::{CoreError, Result};
use crate::search::{CardSearch, SearchContext};
use crate::storage::{CardQuery, Store};

/// First position handed out in a filtered deck. Keeps borrowed cards ahead
/// of anything due normally.
const FILTERED_START: i32 = -100_000;

/// Appended to every term so cards already elsewhere are left alone.
const EXCLUDE_UNAVAILABLE: &str = "-is:suspended -is:buried -is:filtered";

/// Forget the home deck after the card has been placed there.
pub(crate) fn remove_from_filtered(card: &mut Card) {
    if let Some(home) = card.original_deck_id.take() {
        card.deck_id = home;
        card.original_due = None;
    }
}

/// End of a preview: due and queue as before the card was borrowed.
pub(crate) fn restore_preview(card: &mut Card) {
    if let Some(due) = card.original_due {
        card.due = due;
    }
    card.queue = card.natural_queue();
    remove_from_filtered(card);
}

/// Send a card home, undoing what the filtered deck did to it.
///
/// A card that entered as new and started learning in the filtered deck
/// goes back to being new. Suspended and buried cards stay that way.
pub(crate) fn return_home(card: &mut Card) {
    if !card.in_filtered_deck() {
        return;
    }
    match (card.ctype, card.original_due) {
        (CardType::Learning | CardType::Relearning, Some(Due::Ordinal(position))) => {
            card.ctype = CardType::New;
            card.due = Due::Ordinal(position);
            card.left = 0;
        }
        (_, Some(due)) => card.due = due,
        (_, None) => {}
    }
    if !card.queue.is_overlay() {
        card.queue = card.natural_queue();
    }
    remove_from_filtered(card);
}

fn move_into_filtered(card: &mut Card, deck_id: DeckId, position: i32, reschedule: bool) {
    card.original_deck_id = Some(card.deck_id);
    card.original_due = Some(card.due);
    card.deck_id = deck_id;
    if matches!(card.queue, CardQueue::Learning | CardQueue::DayLearnRelearn) {
        return;
    }
    card.due = match card.due {
        Due::Ordinal(n) if n > 0 => Due::Ordinal(position),
        Due::DayNumber(d) if d > 0 => Due::DayNumber(position),
        other => other,
    };
    if !reschedule {
        card.queue = CardQueue::Review;
    }
}

impl<S: Store, C: Clock> Scheduler<S, C> {
    /// Empty the filtered deck, then fill it from its search terms.
    ///
    /// Returns how many cards were moved in. When there are any, the deck
    /// becomes the selected deck.
    pub fn rebuild_dyn(
        &mut self,
        session: &mut SchedulerSession,
        deck_id: DeckId,
        search: &impl CardSearch,
    ) -> Result<usize> {
        let deck = self.store.get_deck_required(deck_id)?;
        let filter = deck
            .filter()
            .cloned()
            .ok_or(CoreError::NotFilteredDeck(deck_id))?;
        self.empty_dyn(session, deck_id)?;

        let times = self.times()?;
        let index = self.deck_index()?;
        let ctx = SearchContext {
            decks: &index,
            today: times.today,
            day_cutoff: times.day_cutoff,
        };

        let mut seen = HashSet::new();
        let mut total: usize = 0;
        for term in &filter.terms {
            let term = FilterTerm {
                search: format!("{} {EXCLUDE_UNAVAILABLE}", term.search),
                ..term.clone()
            };
            for id in search.search(&self.store, &ctx, &term)? {
                if !seen.insert(id) {
                    continue;
                }
                let Some(mut card) = self.store.load_card(id)? else {
                    continue;
                };
                if card.queue.is_overlay() || card.in_filtered_deck() {
                    continue;
                }
                let position = FILTERED_START + total as i32;
                move_into_filtered(&mut card, deck_id, position, filter.reschedule);
                self.store.save_card(&card)?;
                total += 1;
            }
        }

        session.invalidate();
        if total > 0 {
            self.select_deck(session, deck_id)?;
        }
        tracing::info!(deck = %deck_id, cards = total, "filtered deck rebuilt");
        Ok(total)
    }

    /// Return every card in the filtered deck to its home deck.
    pub fn empty_dyn(&mut self, session: &mut SchedulerSession, deck_id: DeckId) -> Result<usize> {
        let deck = self.store.get_deck_required(deck_id)?;
        if !deck.is_filtered() {
            return Err(CoreError::NotFilteredDeck(deck_id));
        }
        let cards = self
            .store
            .query_cards_by_deck_and_queue(&CardQuery::in_decks(vec![deck_id], vec![]))?;
        let count = cards.len();
        for mut card in cards {
            return_home(&mut card);
            self.store.save_card(&card)?;
        }
        session.invalidate();
        tracing::info!(deck = %deck_id, cards = count, "filtered deck emptied");
        Ok(count)
    }

    /// Return the given cards to their home decks. Cards not in a filtered
    /// deck are left alone.
    pub fn rem_from_dyn(&mut self, session: &mut SchedulerSession, ids: &[CardId]) -> Result<()> {
        for id in ids {
            let mut card = self.store.load_card_required(*id)?;
            if card.in_filtered_deck() {
                return_home(&mut card);
                self.store.save_card(&card)?;
            }
        }
        session.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::NoteId;

    fn review_card(due: i32) -> Card {
        let mut card = Card::new(CardId(1), NoteId(1), DeckId(1), 0);
        card.ctype = CardType::Review;
        card.queue = CardQueue::Review;
        card.due = Due::DayNumber(due);
        card.interval = 5;
        card
    }

    #[test]
    fn move_and_return_restores_due() {
        let mut card = review_card(12);
        move_into_filtered(&mut card, DeckId(9), FILTERED_START, true);
        assert_eq!(card.deck_id, DeckId(9));
        assert_eq!(card.original_deck_id, Some(DeckId(1)));
        assert_eq!(card.due, Due::DayNumber(FILTERED_START));
        return_home(&mut card);
        assert_eq!(card, review_card(12));
    }

    #[test]
    fn non_positive_due_is_kept() {
        let mut card = review_card(-5);
        move_into_filtered(&mut card, DeckId(9), FILTERED_START + 3, true);
        assert_eq!(card.due, Due::DayNumber(-5));
        return_home(&mut card);
        assert_eq!(card.due, Due::DayNumber(-5));
    }

    #[test]
    fn preview_deck_puts_cards_in_review_queue() {
        let mut card = Card::new(CardId(1), NoteId(1), DeckId(1), 4);
        move_into_filtered(&mut card, DeckId(9), FILTERED_START, false);
        assert_eq!(card.queue, CardQueue::Review);
        assert_eq!(card.due, Due::Ordinal(FILTERED_START));
        return_home(&mut card);
        assert_eq!(card.queue, CardQueue::New);
        assert_eq!(card.due, Due::Ordinal(4));
    }

    #[test]
    fn learning_started_in_filtered_deck_is_discarded() {
        let mut card = Card::new(CardId(1), NoteId(1), DeckId(1), 4);
        move_into_filtered(&mut card, DeckId(9), FILTERED_START, true);
        card.ctype = CardType::Learning;
        card.queue = CardQueue::Learning;
        card.due = Due::Timestamp(1_000);
        card.left = 1001;
        return_home(&mut card);
        assert_eq!(card.ctype, CardType::New);
        assert_eq!(card.queue, CardQueue::New);
        assert_eq!(card.due, Due::Ordinal(4));
        assert_eq!(card.left, 0);
    }

    #[test]
    fn suspended_card_stays_suspended() {
        let mut card = review_card(3);
        move_into_filtered(&mut card, DeckId(9), FILTERED_START, true);
        card.queue = CardQueue::SuspendedBySystem;
        return_home(&mut card);
        assert_eq!(card.queue, CardQueue::SuspendedBySystem);
        assert_eq!(card.due, Due::DayNumber(3));
        assert!(!card.in_filtered_deck());
    }
}
