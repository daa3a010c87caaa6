//! Bury, suspend, forget, reschedule and reorder.
//!
//! Every operation here changes which cards are eligible, so each one
//! invalidates the session it is given.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;

use super::{Scheduler, SchedulerSession};
use crate::card::{Card, CardId, CardQueue, CardType, Due, NoteId};
use crate::clock::{Clock, SchedTimes};
use crate::deck::DeckId;
use crate::error::{Result, ValidationError};
use crate::storage::{CardQuery, Store};

/// Starting ease for cards reset by forget or reschedule.
const STARTING_FACTOR: u32 = 2500;

/// Which buried cards to release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnburyKind {
    Manual,
    Siblings,
    All,
}

impl UnburyKind {
    fn queues(self) -> Vec<CardQueue> {
        match self {
            UnburyKind::Manual => vec![CardQueue::ManuallyBuried],
            UnburyKind::Siblings => vec![CardQueue::SiblingBuried],
            UnburyKind::All => vec![CardQueue::ManuallyBuried, CardQueue::SiblingBuried],
        }
    }
}

impl<S: Store, C: Clock> Scheduler<S, C> {
    /// Read the time, releasing yesterday's buried cards first when the day
    /// has rolled over.
    pub(crate) fn check_day(&mut self) -> Result<SchedTimes> {
        let times = self.times()?;
        self.unbury_on_day_change(times.today)?;
        Ok(times)
    }

    pub(crate) fn unbury_on_day_change(&mut self, today: i32) -> Result<()> {
        let mut col = self.store.collection()?;
        if col.last_unburied < today {
            let released = self.release_buried(&[], UnburyKind::All)?;
            col.last_unburied = today;
            self.store.save_collection(&col)?;
            if released > 0 {
                tracing::info!(released, today, "new day, buried cards released");
            }
        }
        Ok(())
    }

    fn release_buried(&mut self, decks: &[DeckId], kind: UnburyKind) -> Result<usize> {
        let cards = self
            .store
            .query_cards_by_deck_and_queue(&CardQuery::in_decks(decks.to_vec(), kind.queues()))?;
        let count = cards.len();
        for mut card in cards {
            card.queue = card.natural_queue();
            self.store.save_card(&card)?;
        }
        Ok(count)
    }

    // ── Bury / suspend ───────────────────────────────────────────────

    /// Hide cards until tomorrow.
    pub fn bury_cards(
        &mut self,
        session: &mut SchedulerSession,
        ids: &[CardId],
        manual: bool,
    ) -> Result<()> {
        self.check_day()?;
        let queue = if manual {
            CardQueue::ManuallyBuried
        } else {
            CardQueue::SiblingBuried
        };
        for id in ids {
            let mut card = self.store.load_card_required(*id)?;
            card.queue = queue;
            self.store.save_card(&card)?;
        }
        session.invalidate();
        Ok(())
    }

    /// Release buried cards in the selected deck and its children.
    pub fn unbury_cards_for_deck(
        &mut self,
        session: &mut SchedulerSession,
        kind: UnburyKind,
    ) -> Result<usize> {
        let col = self.store.collection()?;
        let selected = self.selected_deck(session, &col);
        let decks = self.deck_index()?.active_decks(selected);
        let released = if decks.is_empty() {
            0
        } else {
            self.release_buried(&decks, kind)?
        };
        session.invalidate();
        tracing::info!(deck = %selected, ?kind, released, "buried cards released");
        Ok(released)
    }

    /// Release every buried card in the collection.
    pub fn unbury_cards(&mut self, session: &mut SchedulerSession) -> Result<usize> {
        let released = self.release_buried(&[], UnburyKind::All)?;
        session.invalidate();
        tracing::info!(released, "all buried cards released");
        Ok(released)
    }

    /// Suspend cards. They keep their filtered deck membership.
    pub fn suspend_cards(&mut self, session: &mut SchedulerSession, ids: &[CardId]) -> Result<()> {
        for id in ids {
            let mut card = self.store.load_card_required(*id)?;
            card.queue = CardQueue::SuspendedBySystem;
            self.store.save_card(&card)?;
        }
        session.invalidate();
        Ok(())
    }

    /// Unsuspend cards, putting each back in the queue its type and due
    /// imply. Cards that are not suspended are left alone.
    pub fn unsuspend_cards(&mut self, session: &mut SchedulerSession, ids: &[CardId]) -> Result<()> {
        for id in ids {
            let mut card = self.store.load_card_required(*id)?;
            if card.queue == CardQueue::SuspendedBySystem {
                card.queue = card.natural_queue();
                self.store.save_card(&card)?;
            }
        }
        session.invalidate();
        Ok(())
    }

    // ── Forget / reschedule ──────────────────────────────────────────

    /// Turn cards back into new cards placed after every existing new card.
    pub fn forget_cards(&mut self, session: &mut SchedulerSession, ids: &[CardId]) -> Result<()> {
        self.rem_from_dyn(session, ids)?;
        let start = self.store.max_new_position()? + 1;
        for id in ids {
            let mut card = self.store.load_card_required(*id)?;
            card.ctype = CardType::New;
            card.queue = CardQueue::New;
            card.interval = 0;
            card.factor = STARTING_FACTOR;
            card.left = 0;
            card.due = Due::Ordinal(0);
            self.store.save_card(&card)?;
        }
        self.sort_cards(session, ids, start, 1, false, false)?;
        tracing::debug!(cards = ids.len(), start, "cards forgotten");
        Ok(())
    }

    /// Make cards review cards due in `min_days..=max_days` days.
    pub fn resched_cards(
        &mut self,
        session: &mut SchedulerSession,
        ids: &[CardId],
        min_days: u32,
        max_days: u32,
    ) -> Result<()> {
        if min_days > max_days {
            return Err(ValidationError::InvalidDayRange {
                min: min_days,
                max: max_days,
            }
            .into());
        }
        let today = self.today()?;
        self.rem_from_dyn(session, ids)?;
        for id in ids {
            let mut card = self.store.load_card_required(*id)?;
            let days = self.rng.gen_range(min_days..=max_days);
            card.ctype = CardType::Review;
            card.queue = CardQueue::Review;
            card.interval = days.max(1);
            card.due = Due::DayNumber(today + days as i32);
            card.factor = STARTING_FACTOR;
            self.store.save_card(&card)?;
        }
        session.invalidate();
        Ok(())
    }

    // ── Ordering ─────────────────────────────────────────────────────

    /// Give new cards consecutive positions from `start`, one position per
    /// note so siblings stay together.
    ///
    /// With `shift`, new cards already at or after `start` move up to make
    /// room.
    pub fn sort_cards(
        &mut self,
        session: &mut SchedulerSession,
        ids: &[CardId],
        start: i32,
        step: i32,
        shuffle: bool,
        shift: bool,
    ) -> Result<()> {
        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            cards.push(self.store.load_card_required(*id)?);
        }

        let mut notes: Vec<NoteId> = Vec::new();
        let mut seen = HashSet::new();
        for card in &cards {
            if seen.insert(card.note_id) {
                notes.push(card.note_id);
            }
        }
        if notes.is_empty() {
            return Ok(());
        }
        if shuffle {
            notes.shuffle(&mut self.rng);
        }
        let positions: HashMap<NoteId, i32> = notes
            .iter()
            .enumerate()
            .map(|(i, nid)| (*nid, start + i as i32 * step))
            .collect();
        let high = start + (notes.len() as i32 - 1) * step;

        if shift {
            let moving: HashSet<CardId> = ids.iter().copied().collect();
            let others: Vec<Card> = self
                .store
                .query_cards_by_deck_and_queue(&CardQuery::in_decks(vec![], vec![CardQueue::New]))?
                .into_iter()
                .filter(|c| !moving.contains(&c.id))
                .filter(|c| matches!(c.due, Due::Ordinal(n) if n >= start))
                .collect();
            if let Some(low) = others.iter().map(|c| c.due.raw() as i32).min() {
                let by = high - low + 1;
                for mut card in others {
                    if let Due::Ordinal(n) = card.due {
                        card.due = Due::Ordinal(n + by);
                        self.store.save_card(&card)?;
                    }
                }
            }
        }

        for mut card in cards {
            if card.ctype != CardType::New {
                continue;
            }
            if let Some(position) = positions.get(&card.note_id) {
                card.due = Due::Ordinal(*position);
                self.store.save_card(&card)?;
            }
        }
        session.invalidate();
        Ok(())
    }

    /// Renumber a deck's new cards, either shuffled or back in the order
    /// they were added.
    pub fn reposition_new_cards(
        &mut self,
        session: &mut SchedulerSession,
        deck_id: DeckId,
        randomize: bool,
    ) -> Result<()> {
        self.store.get_deck_required(deck_id)?;
        let mut cards: Vec<Card> = self
            .store
            .query_cards_by_deck_and_queue(&CardQuery::in_decks(vec![deck_id], vec![]))?
            .into_iter()
            .filter(|c| c.ctype == CardType::New)
            .collect();
        cards.sort_by_key(|c| c.id);
        let ids: Vec<CardId> = cards.iter().map(|c| c.id).collect();
        self.sort_cards(session, &ids, 1, 1, randomize, false)
    }
}
