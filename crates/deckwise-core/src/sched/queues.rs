//! Building the session queues and handing out cards.

use std::cmp::Reverse;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;

use super::intervals::{next_interval_secs, IntervalContext};
use super::limits::{BudgetKind, Budgets};
use super::{ConfigTable, Scheduler, SchedulerSession};
use crate::card::{Card, CardQueue, Due, Ease};
use crate::clock::{Clock, SchedTimes};
use crate::deck::{DeckId, DeckIndex};
use crate::deck_config::{CollectionState, NewCardOrder, NewSpread};
use crate::error::Result;
use crate::storage::{CardQuery, Store};

/// Which count a card is shown under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountIndex {
    New,
    Learning,
    Review,
}

impl CountIndex {
    pub fn as_usize(self) -> usize {
        match self {
            CountIndex::New => 0,
            CountIndex::Learning => 1,
            CountIndex::Review => 2,
        }
    }
}

fn day_rng(today: i32) -> Mcg128Xsl64 {
    Mcg128Xsl64::seed_from_u64(today as u64)
}

impl<S: Store, C: Clock> Scheduler<S, C> {
    // ── Queue building ───────────────────────────────────────────────

    /// Rebuild every queue for the selected deck.
    pub fn reset(&mut self, session: &mut SchedulerSession) -> Result<()> {
        let times = self.times()?;
        self.unbury_on_day_change(times.today)?;
        let col = self.store.collection()?;
        let index = self.deck_index()?;
        let configs = ConfigTable::load(&self.store)?;

        let mut selected = self.selected_deck(session, &col);
        if index.get(selected).is_none() {
            tracing::warn!(deck = %selected, "selected deck missing, studying Default");
            selected = DeckId::DEFAULT;
        }

        session.active = index.active_decks(selected);
        session.today = times.today;
        session.day_cutoff = times.day_cutoff;
        session.new_budgets =
            Budgets::build(&index, BudgetKind::New, times.today, |d| configs.for_deck(d));
        session.review_budgets =
            Budgets::build(&index, BudgetKind::Review, times.today, |d| configs.for_deck(d));

        self.fill_new(session, &index, &configs, times.today)?;
        self.fill_review(session, times.today)?;
        session.learn_cutoff = times.now + col.collapse_time_secs;
        self.fill_learning(session)?;
        self.fill_day_learning(session, times.today)?;
        session.new_modulus = new_card_modulus(
            col.new_spread,
            session.new_queue.len(),
            session.review_queue.len(),
        );
        session.valid = true;

        tracing::debug!(
            deck = %selected,
            today = times.today,
            new = session.new_queue.len(),
            learn = session.learning.len() + session.day_learning.len(),
            review = session.review_queue.len(),
            "queues rebuilt"
        );
        Ok(())
    }

    fn fill_new(
        &self,
        session: &mut SchedulerSession,
        index: &DeckIndex,
        configs: &ConfigTable,
        today: i32,
    ) -> Result<()> {
        session.new_queue.clear();
        for deck_id in session.active.clone() {
            let Some(deck) = index.get(deck_id) else {
                continue;
            };
            if session.new_budgets.limit(deck_id) <= 0 {
                continue;
            }
            let mut cards = self
                .store
                .query_cards_by_deck_and_queue(&CardQuery::in_decks(vec![deck_id], vec![CardQueue::New]))?;
            cards.sort_by_key(|c| (c.due.raw(), c.id));
            if !deck.is_filtered() && configs.for_deck(deck).new.order == NewCardOrder::Random {
                cards.shuffle(&mut day_rng(today));
            }
            for card in cards {
                if !session.new_budgets.try_take(deck_id) {
                    break;
                }
                session.new_queue.push_back(card.id);
            }
        }
        Ok(())
    }

    fn fill_review(&self, session: &mut SchedulerSession, today: i32) -> Result<()> {
        session.review_queue.clear();
        let mut cards: Vec<Card> = self
            .store
            .query_cards_by_deck_and_queue(&CardQuery::in_decks(
                session.active.clone(),
                vec![CardQueue::Review],
            ))?
            .into_iter()
            .filter(|c| c.is_due_review(today))
            .collect();
        // shuffle first so the stable sort breaks ties randomly
        cards.shuffle(&mut day_rng(today));
        cards.sort_by_key(|c| c.due.raw());
        for card in cards {
            if session.review_budgets.try_take(card.deck_id) {
                session.review_queue.push_back(card.id);
            }
        }
        Ok(())
    }

    fn fill_learning(&self, session: &mut SchedulerSession) -> Result<()> {
        let in_flight = session.fetched.map(|(id, _)| id);
        let cutoff = session.learn_cutoff;
        session.learning = self
            .store
            .query_cards_by_deck_and_queue(&CardQuery::in_decks(
                session.active.clone(),
                vec![CardQueue::Learning, CardQueue::PreviewRepeat],
            ))?
            .into_iter()
            .filter(|c| Some(c.id) != in_flight)
            .filter_map(|c| match c.due {
                Due::Timestamp(ts) if ts < cutoff => Some(Reverse((ts, c.id))),
                _ => None,
            })
            .collect();
        Ok(())
    }

    fn fill_day_learning(&self, session: &mut SchedulerSession, today: i32) -> Result<()> {
        let in_flight = session.fetched.map(|(id, _)| id);
        session.day_learning.clear();
        for deck_id in session.active.clone() {
            let mut cards: Vec<Card> = self
                .store
                .query_cards_by_deck_and_queue(&CardQuery::in_decks(
                    vec![deck_id],
                    vec![CardQueue::DayLearnRelearn],
                ))?
                .into_iter()
                .filter(|c| Some(c.id) != in_flight)
                .filter(|c| c.due_day().is_some_and(|d| d <= today))
                .collect();
            cards.shuffle(&mut day_rng(today));
            session.day_learning.extend(cards.into_iter().map(|c| c.id));
        }
        Ok(())
    }

    /// Refresh the learning queues when the collapse cutoff has moved on by
    /// more than a minute, or unconditionally when `force` is set.
    fn maybe_reset_learning(
        &self,
        session: &mut SchedulerSession,
        times: SchedTimes,
        collapse_secs: i64,
        force: bool,
    ) -> Result<()> {
        let next = times.now + collapse_secs;
        if next - session.learn_cutoff > 60 || force {
            session.learn_cutoff = next;
            let today = session.today;
            self.fill_learning(session)?;
            self.fill_day_learning(session, today)?;
        }
        Ok(())
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// The next card to study, or `None` when nothing is due.
    pub fn get_card(&mut self, session: &mut SchedulerSession) -> Result<Option<Card>> {
        let times = self.times()?;
        if !session.valid || times.now >= session.day_cutoff {
            self.reset(session)?;
        }
        let col = self.store.collection()?;
        let card = self.next_card(session, &col, times)?;
        if let Some(card) = &card {
            session.reps += 1;
            session.fetched = Some((card.id, times.now_millis));
            tracing::trace!(card = %card.id, queue = ?card.queue, "card fetched");
        }
        Ok(card)
    }

    fn next_card(
        &self,
        session: &mut SchedulerSession,
        col: &CollectionState,
        times: SchedTimes,
    ) -> Result<Option<Card>> {
        if let Some(card) = self.pop_learning(session, col, times, false)? {
            return Ok(Some(card));
        }
        if time_for_new_card(session, col.new_spread) {
            if let Some(card) = self.pop_new(session)? {
                return Ok(Some(card));
            }
        }
        if col.day_learn_first {
            if let Some(card) = self.pop_day_learning(session)? {
                return Ok(Some(card));
            }
        }
        if let Some(card) = self.pop_review(session)? {
            return Ok(Some(card));
        }
        if !col.day_learn_first {
            if let Some(card) = self.pop_day_learning(session)? {
                return Ok(Some(card));
            }
        }
        if let Some(card) = self.pop_new(session)? {
            return Ok(Some(card));
        }
        self.pop_learning(session, col, times, true)
    }

    fn pop_learning(
        &self,
        session: &mut SchedulerSession,
        col: &CollectionState,
        times: SchedTimes,
        collapse: bool,
    ) -> Result<Option<Card>> {
        let force = collapse && session.learning.is_empty() && session.day_learning.is_empty();
        self.maybe_reset_learning(session, times, col.collapse_time_secs, force)?;
        let cutoff = if collapse {
            times.now + col.collapse_time_secs
        } else {
            times.now
        };
        while let Some(&Reverse((due, id))) = session.learning.peek() {
            if due >= cutoff {
                return Ok(None);
            }
            session.learning.pop();
            if let Some(card) = self.store.load_card(id)? {
                if matches!(card.queue, CardQueue::Learning | CardQueue::PreviewRepeat) {
                    return Ok(Some(card));
                }
            }
        }
        Ok(None)
    }

    fn pop_new(&self, session: &mut SchedulerSession) -> Result<Option<Card>> {
        while let Some(id) = session.new_queue.pop_front() {
            if let Some(card) = self.store.load_card(id)? {
                if card.queue == CardQueue::New {
                    return Ok(Some(card));
                }
            }
        }
        Ok(None)
    }

    fn pop_review(&self, session: &mut SchedulerSession) -> Result<Option<Card>> {
        while let Some(id) = session.review_queue.pop_front() {
            if let Some(card) = self.store.load_card(id)? {
                if card.queue == CardQueue::Review {
                    return Ok(Some(card));
                }
            }
        }
        Ok(None)
    }

    fn pop_day_learning(&self, session: &mut SchedulerSession) -> Result<Option<Card>> {
        while let Some(id) = session.day_learning.pop_front() {
            if let Some(card) = self.store.load_card(id)? {
                if card.queue == CardQueue::DayLearnRelearn {
                    return Ok(Some(card));
                }
            }
        }
        Ok(None)
    }

    // ── Counts and display ───────────────────────────────────────────

    /// `(new, learning, review)` still waiting in the session. Rebuilds the
    /// queues first once the day has rolled over.
    pub fn counts(&mut self, session: &mut SchedulerSession) -> Result<(usize, usize, usize)> {
        let times = self.times()?;
        if !session.valid || times.now >= session.day_cutoff {
            self.reset(session)?;
        }
        Ok((
            session.new_queue.len(),
            session.learning.len() + session.day_learning.len(),
            session.review_queue.len(),
        ))
    }

    pub fn count_idx(&self, card: &Card) -> CountIndex {
        match card.queue {
            CardQueue::New => CountIndex::New,
            CardQueue::Review => CountIndex::Review,
            _ => CountIndex::Learning,
        }
    }

    /// 2 for a preview card, which only distinguishes Again from the rest.
    pub fn answer_buttons(&self, card: &Card) -> Result<u8> {
        Ok(if self.preview_delay_secs(card)?.is_some() {
            2
        } else {
            4
        })
    }

    /// Seconds until `card` would be shown again after `ease`, without fuzz.
    pub fn next_ivl(&self, card: &Card, ease: Ease) -> Result<u64> {
        if let Some(delay) = self.preview_delay_secs(card)? {
            return Ok(if ease == Ease::Again { delay as u64 } else { 0 });
        }
        let times = self.times()?;
        let conf = self.store.config_for_deck(card.home_deck())?;
        let ctx = IntervalContext {
            today: times.today,
            now: times.now,
            day_cutoff: times.day_cutoff,
        };
        Ok(next_interval_secs(card, &conf, ctx, ease))
    }

    /// Next intervals for all four buttons.
    pub fn next_ivls(&self, card: &Card) -> Result<[u64; 4]> {
        let mut out = [0; 4];
        for (slot, ease) in out.iter_mut().zip(Ease::ALL) {
            *slot = self.next_ivl(card, ease)?;
        }
        Ok(out)
    }

    /// The preview delay when `card` sits in a filtered deck that does not
    /// reschedule.
    pub(crate) fn preview_delay_secs(&self, card: &Card) -> Result<Option<i64>> {
        if !card.in_filtered_deck() {
            return Ok(None);
        }
        let deck = self.store.get_deck(card.deck_id)?;
        Ok(deck
            .as_ref()
            .and_then(|d| d.filter())
            .filter(|f| !f.reschedule)
            .map(|f| i64::from(f.preview_delay_mins) * 60))
    }
}

pub(crate) fn new_card_modulus(spread: NewSpread, new: usize, review: usize) -> u32 {
    if spread != NewSpread::Distribute || new == 0 {
        return 0;
    }
    let modulus = (new + review) / new;
    let modulus = if review > 0 { modulus.max(2) } else { modulus };
    modulus as u32
}

fn time_for_new_card(session: &SchedulerSession, spread: NewSpread) -> bool {
    if session.new_queue.is_empty() {
        return false;
    }
    match spread {
        NewSpread::Last => false,
        NewSpread::First => true,
        NewSpread::Distribute => {
            session.new_modulus > 0 && session.reps > 0 && session.reps % session.new_modulus == 0
        }
    }
}
