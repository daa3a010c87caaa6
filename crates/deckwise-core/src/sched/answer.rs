//! Answering a card: the learning/review state machine.
//!
//! The new state is worked out on a copy of the card. Nothing is written
//! until the store has accepted the card together with its review log row,
//! and the caller's card is only overwritten after that.

use std::cmp::Reverse;
use std::collections::HashMap;

use rand::{Rng, RngCore};

use super::filtered::{remove_from_filtered, restore_preview};
use super::intervals::{
    delay_for_grade, delay_for_repeating_grade, early_review_interval, graduating_interval,
    is_early_review, lapse_interval, learning_delays, left_today, next_review_interval,
    starting_left,
};
use super::{Scheduler, SchedulerSession};
use crate::card::{Card, CardId, CardQueue, CardType, Due, DueKind, Ease};
use crate::clock::{Clock, SchedTimes, SECS_PER_DAY};
use crate::deck::{Deck, DeckId};
use crate::deck_config::{DeckConfig, LeechAction};
use crate::error::{CoreError, Result};
use crate::revlog::{RevlogEntry, RevlogId, RevlogKind};
use crate::storage::Store;

/// What an answer did.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// The review log row as recorded.
    pub revlog: RevlogEntry,
    /// The lapse pushed the card over its leech threshold.
    pub leech: bool,
    pub undo: UndoAnswer,
}

/// Everything needed to take one answer back.
#[derive(Debug, Clone)]
pub struct UndoAnswer {
    card: Card,
    revlog_id: RevlogId,
    decks: Vec<Deck>,
    siblings: Vec<Card>,
}

impl UndoAnswer {
    pub fn card_id(&self) -> CardId {
        self.card.id
    }

    pub fn revlog_id(&self) -> RevlogId {
        self.revlog_id
    }
}

/// Whether `lapses` is a multiple of half the threshold past it.
pub(crate) fn is_leech(lapses: u32, threshold: u32) -> bool {
    if threshold == 0 {
        return false;
    }
    lapses >= threshold && (lapses - threshold) % (threshold / 2).max(1) == 0
}

fn check_answerable(card: &Card, previewing: bool) -> Result<()> {
    let ok = if previewing {
        !card.queue.is_overlay()
    } else {
        matches!(
            (card.ctype, card.queue),
            (CardType::New, CardQueue::New)
                | (
                    CardType::Learning | CardType::Relearning,
                    CardQueue::Learning | CardQueue::DayLearnRelearn
                )
                | (CardType::Review, CardQueue::Review)
        )
    };
    if ok {
        Ok(())
    } else {
        Err(CoreError::InvalidCardState {
            card_id: card.id,
            ctype: card.ctype,
            queue: card.queue,
        })
    }
}

struct Transition {
    card: Card,
    kind: RevlogKind,
    interval: i64,
    last_interval: i64,
    leech: bool,
    /// Due time when the card goes back into the session's learning heap.
    push_learning: Option<i64>,
    counted_new: bool,
    counted_learning: bool,
    counted_review: bool,
}

/// Computes one transition. Holds everything the state machine reads
/// besides the card.
struct Stepper<'a, R: RngCore> {
    conf: &'a DeckConfig,
    times: SchedTimes,
    collapse_secs: i64,
    learning_head: Option<i64>,
    /// New and review queues are both empty.
    only_learning_left: bool,
    rng: &'a mut R,
    push_learning: Option<i64>,
    leech: bool,
}

impl<R: RngCore> Stepper<'_, R> {
    fn answer(mut self, mut card: Card, ease: Ease) -> Transition {
        card.reps += 1;
        let mut counted_new = false;
        if card.queue == CardQueue::New {
            card.queue = CardQueue::Learning;
            card.ctype = CardType::Learning;
            card.left = starting_left(
                learning_delays(self.conf, &card),
                self.times.now,
                self.times.day_cutoff,
            );
            counted_new = true;
        }

        let review = card.queue == CardQueue::Review;
        let (kind, interval, last_interval) = if review {
            self.answer_review(&mut card, ease)
        } else {
            self.answer_learning(&mut card, ease)
        };

        if card.original_due.is_some_and(|d| d.kind() != DueKind::Ordinal) {
            card.original_due = None;
        }

        Transition {
            card,
            kind,
            interval,
            last_interval,
            leech: self.leech,
            push_learning: self.push_learning,
            counted_new,
            counted_learning: !review,
            counted_review: review,
        }
    }

    /// Answer in a filtered deck that does not reschedule. Again shows the
    /// card again after the preview delay, anything else sends it home
    /// untouched.
    fn answer_preview(mut self, mut card: Card, ease: Ease, delay_secs: i64) -> Transition {
        let last_interval = i64::from(card.interval);
        let interval = if ease == Ease::Again {
            let due = self.times.now + delay_secs;
            card.queue = CardQueue::PreviewRepeat;
            card.due = Due::Timestamp(due);
            if due < self.times.now + self.collapse_secs {
                self.push_learning = Some(due);
            }
            -delay_secs
        } else {
            restore_preview(&mut card);
            i64::from(card.interval)
        };
        Transition {
            card,
            kind: RevlogKind::Filtered,
            interval,
            last_interval,
            leech: false,
            push_learning: self.push_learning,
            counted_new: false,
            counted_learning: false,
            counted_review: false,
        }
    }

    // ── Learning ─────────────────────────────────────────────────────

    fn answer_learning(&mut self, card: &mut Card, ease: Ease) -> (RevlogKind, i64, i64) {
        let conf = self.conf;
        let delays = learning_delays(conf, card);
        let kind = match card.ctype {
            CardType::New | CardType::Learning => RevlogKind::Learning,
            CardType::Review | CardType::Relearning => RevlogKind::Relearning,
        };
        let last_left = card.left;

        let leaving = if delays.is_empty() {
            self.reschedule_as_review(card, ease == Ease::Easy);
            true
        } else {
            match ease {
                Ease::Easy => {
                    self.reschedule_as_review(card, true);
                    true
                }
                Ease::Good if card.steps_remaining() <= 1 => {
                    self.reschedule_as_review(card, false);
                    true
                }
                Ease::Good => {
                    self.move_to_next_step(card);
                    false
                }
                Ease::Hard => {
                    self.repeat_step(card);
                    false
                }
                Ease::Again => {
                    self.move_to_first_step(card);
                    false
                }
            }
        };

        let interval = if leaving {
            i64::from(card.interval)
        } else if ease == Ease::Hard {
            -(delay_for_repeating_grade(delays, card.left) as i64)
        } else {
            -(delay_for_grade(delays, card.left) as i64)
        };
        let last_interval = -(delay_for_grade(delays, last_left) as i64);
        (kind, interval, last_interval)
    }

    fn move_to_first_step(&mut self, card: &mut Card) -> u64 {
        let conf = self.conf;
        card.left = starting_left(
            learning_delays(conf, card),
            self.times.now,
            self.times.day_cutoff,
        );
        if card.ctype == CardType::Relearning {
            card.interval = lapse_interval(card, &conf.lapse);
        }
        self.reschedule_learning(card, None)
    }

    fn move_to_next_step(&mut self, card: &mut Card) {
        let remaining = card.steps_remaining() - 1;
        let today = left_today(
            learning_delays(self.conf, card),
            remaining,
            self.times.now,
            self.times.day_cutoff,
        );
        card.left = today * 1000 + remaining;
        self.reschedule_learning(card, None);
    }

    fn repeat_step(&mut self, card: &mut Card) {
        let delay = delay_for_repeating_grade(learning_delays(self.conf, card), card.left);
        self.reschedule_learning(card, Some(delay));
    }

    /// Place a card `delay` seconds ahead, spilling to a day number when that
    /// lands past the day cutoff. Returns the delay used.
    fn reschedule_learning(&mut self, card: &mut Card, delay: Option<u64>) -> u64 {
        let delay =
            delay.unwrap_or_else(|| delay_for_grade(learning_delays(self.conf, card), card.left));
        let now = self.times.now;
        let due = now + delay as i64;
        if due < self.times.day_cutoff {
            let max_extra = (delay / 4).min(300).max(1);
            let fuzz = self.rng.gen_range(0..max_extra) as i64;
            let mut due = (due + fuzz).min(self.times.day_cutoff - 1);
            if due < now + self.collapse_secs {
                // keep other learning cards from being starved
                if let (Some(head), true) = (self.learning_head, self.only_learning_left) {
                    due = due.max(head + 1);
                }
                self.push_learning = Some(due);
            }
            card.due = Due::Timestamp(due);
            card.queue = CardQueue::Learning;
        } else {
            let ahead = (due - self.times.day_cutoff) / SECS_PER_DAY + 1;
            card.due = Due::DayNumber(self.times.today + ahead as i32);
            card.queue = CardQueue::DayLearnRelearn;
        }
        delay
    }

    fn reschedule_as_review(&mut self, card: &mut Card, early: bool) {
        if matches!(card.ctype, CardType::Review | CardType::Relearning) {
            if early {
                card.interval += 1;
            }
        } else {
            card.interval = graduating_interval(card, self.conf, early, Some(&mut *self.rng));
            card.factor = self.conf.new.initial_factor;
        }
        card.due = Due::DayNumber(self.times.today + card.interval as i32);
        card.ctype = CardType::Review;
        card.queue = CardQueue::Review;
        remove_from_filtered(card);
    }

    // ── Reviews ──────────────────────────────────────────────────────

    fn answer_review(&mut self, card: &mut Card, ease: Ease) -> (RevlogKind, i64, i64) {
        let early = is_early_review(card, self.times.today);
        let kind = if early {
            RevlogKind::Filtered
        } else {
            RevlogKind::Review
        };
        let last_interval = i64::from(card.interval);
        let delay = if ease == Ease::Again {
            self.reschedule_lapse(card)
        } else {
            self.reschedule_review(card, ease, early);
            0
        };
        let interval = if delay != 0 {
            -(delay as i64)
        } else {
            i64::from(card.interval)
        };
        (kind, interval, last_interval)
    }

    fn reschedule_lapse(&mut self, card: &mut Card) -> u64 {
        let conf = self.conf;
        card.lapses += 1;
        card.factor = card.factor.saturating_sub(200).max(1300);

        let mut suspended = false;
        if is_leech(card.lapses, conf.lapse.leech_threshold) {
            self.leech = true;
            if conf.lapse.leech_action == LeechAction::Suspend {
                suspended = true;
            }
        }

        if !conf.lapse.delays.is_empty() && !suspended {
            card.ctype = CardType::Relearning;
            return self.move_to_first_step(card);
        }
        card.interval = lapse_interval(card, &conf.lapse);
        self.reschedule_as_review(card, false);
        if suspended {
            card.queue = CardQueue::SuspendedBySystem;
        }
        0
    }

    fn reschedule_review(&mut self, card: &mut Card, ease: Ease, early: bool) {
        let conf = self.conf;
        let today = self.times.today;
        card.interval = if early {
            early_review_interval(card, &conf.rev, today, ease)
        } else {
            next_review_interval(card, &conf.rev, today, ease, Some(&mut *self.rng))
        };
        let delta: i64 = match ease {
            Ease::Hard => -150,
            Ease::Easy => 150,
            Ease::Again | Ease::Good => 0,
        };
        card.factor = (i64::from(card.factor) + delta).max(1300) as u32;
        card.due = Due::DayNumber(today + card.interval as i32);
        remove_from_filtered(card);
    }
}

impl<S: Store, C: Clock> Scheduler<S, C> {
    /// Apply `ease` to `card`.
    ///
    /// On success `card` holds the new state, which has been saved together
    /// with its review log row. On error neither `card` nor the store has
    /// changed.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidCardState`] when the card is suspended, buried or
    /// otherwise not answerable, a configuration error when the deck's
    /// configuration fails validation, and any storage error.
    pub fn answer_card(
        &mut self,
        session: &mut SchedulerSession,
        card: &mut Card,
        ease: Ease,
    ) -> Result<AnswerOutcome> {
        let times = self.check_day()?;
        let col = self.store.collection()?;
        let conf = self.store.config_for_deck(card.home_deck())?;
        conf.validate()?;
        let preview = self.preview_delay_secs(card)?;
        check_answerable(card, preview.is_some())?;

        let time_taken_ms = match session.fetched {
            Some((id, at)) if id == card.id => {
                (times.now_millis - at).clamp(0, i64::from(conf.max_taken_secs) * 1000)
            }
            _ => 0,
        };

        let stepper = Stepper {
            conf: &conf,
            times,
            collapse_secs: col.collapse_time_secs,
            learning_head: session
                .learning
                .iter()
                .filter(|Reverse((_, id))| *id != card.id)
                .map(|Reverse((due, _))| *due)
                .min(),
            only_learning_left: session.new_queue.is_empty() && session.review_queue.is_empty(),
            rng: &mut self.rng,
            push_learning: None,
            leech: false,
        };
        let step = match preview {
            Some(delay) => stepper.answer_preview(card.clone(), ease, delay),
            None => stepper.answer(card.clone(), ease),
        };

        let mut entry = RevlogEntry {
            id: RevlogId(0),
            timestamp_ms: times.now_millis,
            card_id: card.id,
            ease,
            interval: step.interval,
            last_interval: step.last_interval,
            factor: step.card.factor,
            time_taken_ms,
            kind: step.kind,
        };

        let index = self.deck_index()?;
        let studied_chain = index.self_and_parents(card.deck_id);
        let home_chain = index.self_and_parents(step.card.deck_id);
        let mut decks: HashMap<DeckId, Deck> = studied_chain
            .iter()
            .chain(home_chain.iter())
            .filter_map(|id| index.get(*id).map(|d| (d.id, d.clone())))
            .collect();
        let decks_before: Vec<Deck> = decks.values().cloned().collect();

        let siblings: Vec<Card> = self
            .store
            .cards_of_note(card.note_id)?
            .into_iter()
            .filter(|c| c.id != card.id)
            .filter(|c| {
                c.queue == CardQueue::New
                    || (c.queue == CardQueue::Review
                        && c.due_day().is_some_and(|d| d <= times.today))
            })
            .collect();

        let today = times.today;
        for id in &studied_chain {
            if let Some(deck) = decks.get_mut(id) {
                if step.counted_new {
                    deck.today.new.add(today, 1);
                }
                if step.counted_learning {
                    deck.today.learn.add(today, 1);
                }
                deck.today.time_ms.add(today, time_taken_ms);
            }
        }
        if step.counted_review {
            for id in &home_chain {
                if let Some(deck) = decks.get_mut(id) {
                    deck.today.review.add(today, 1);
                }
            }
        }
        let decks_after: Vec<Deck> = decks.into_values().collect();

        let (buried, kept): (Vec<Card>, Vec<Card>) =
            siblings.into_iter().partition(|sibling| match sibling.queue {
                CardQueue::New => conf.new.bury,
                _ => conf.rev.bury,
            });
        let buried_after: Vec<Card> = buried
            .iter()
            .map(|sibling| Card {
                queue: CardQueue::SiblingBuried,
                ..sibling.clone()
            })
            .collect();

        entry.id = self
            .store
            .record_answer(&step.card, &entry, &decks_after, &buried_after)?;

        for sibling in buried.iter().chain(kept.iter()) {
            session.forget_card(sibling.id);
        }
        session.forget_card(card.id);
        if let Some(due) = step.push_learning {
            session.learning.push(Reverse((due, card.id)));
        }
        session.fetched = None;

        tracing::debug!(
            card = %card.id,
            %ease,
            queue = ?step.card.queue,
            due = %step.card.due,
            interval = step.card.interval,
            factor = step.card.factor,
            "card answered"
        );
        if step.leech {
            tracing::info!(card = %card.id, lapses = step.card.lapses, "card is a leech");
        }

        let undo = UndoAnswer {
            card: card.clone(),
            revlog_id: entry.id,
            decks: decks_before,
            siblings: buried,
        };
        *card = step.card;
        Ok(AnswerOutcome {
            revlog: entry,
            leech: step.leech,
            undo,
        })
    }

    /// Take back an answer: restore the card, its buried siblings and the
    /// deck counters, and drop the review log row. Returns the restored card.
    pub fn undo_answer(
        &mut self,
        session: &mut SchedulerSession,
        undo: UndoAnswer,
    ) -> Result<Card> {
        self.store.save_card(&undo.card)?;
        self.store.remove_revlog_entry(undo.revlog_id)?;
        for deck in &undo.decks {
            self.store.save_deck(deck)?;
        }
        for sibling in &undo.siblings {
            self.store.save_card(sibling)?;
        }
        session.reps = session.reps.saturating_sub(1);
        session.invalidate();
        tracing::debug!(card = %undo.card.id, "answer undone");
        Ok(undo.card)
    }
}
