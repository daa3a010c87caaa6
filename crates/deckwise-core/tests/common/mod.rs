//! Shared fixtures for the scheduler integration tests.
//!
//! Every collection is created at 04:00 UTC with a 04:00 rollover, and the
//! clock starts six hours into day 10.

#![allow(dead_code)]

use deckwise_core::{
    Card, CardId, CardQueue, CardType, ConfigId, DeckConfig, DeckId, DeckKind, Due, Ease,
    FilteredDeck, MemoryStore, MockClock, NoteId, Scheduler, SchedulerSession, Store,
};

// 2020-09-13 04:00:00 UTC
pub const CRT: i64 = 1_599_969_600;
pub const DAY: i64 = 86_400;
pub const TODAY: i32 = 10;
pub const NOW: i64 = CRT + TODAY as i64 * DAY + 6 * 3600;

pub struct Harness {
    pub sched: Scheduler<MemoryStore, MockClock>,
    pub session: SchedulerSession,
    pub clock: MockClock,
    next_note: i64,
}

impl Harness {
    pub fn new() -> Self {
        let clock = MockClock::at_secs(NOW);
        let sched = Scheduler::with_seed(MemoryStore::new(CRT), clock.clone(), 42);
        Self {
            sched,
            session: SchedulerSession::new(),
            clock,
            next_note: 1,
        }
    }

    pub fn store(&mut self) -> &mut MemoryStore {
        self.sched.store_mut()
    }

    /// A new card on a note of its own.
    pub fn add_note(&mut self, deck: DeckId) -> Card {
        let note = NoteId(self.next_note);
        self.next_note += 1;
        self.store().add_card(note, deck).unwrap()
    }

    /// A second card on an existing note.
    pub fn add_sibling(&mut self, of: &Card) -> Card {
        self.store().add_card(of.note_id, of.deck_id).unwrap()
    }

    pub fn card(&self, id: CardId) -> Card {
        self.sched.store().load_card_required(id).unwrap()
    }

    /// Overwrite a card behind the scheduler's back and drop the queues.
    pub fn put(&mut self, card: &Card) {
        self.store().save_card(card).unwrap();
        self.session.invalidate();
    }

    pub fn make_review(&mut self, card: &Card, interval: u32, due: i32) -> Card {
        let mut card = card.clone();
        card.ctype = CardType::Review;
        card.queue = CardQueue::Review;
        card.interval = interval;
        card.factor = 2500;
        card.due = Due::DayNumber(due);
        self.put(&card);
        card
    }

    pub fn add_deck(&mut self, name: &str) -> DeckId {
        self.store()
            .add_deck(
                name,
                DeckKind::Normal {
                    config_id: ConfigId::DEFAULT,
                },
            )
            .unwrap()
    }

    pub fn add_filtered(&mut self, name: &str, filter: FilteredDeck) -> DeckId {
        self.store()
            .add_deck(name, DeckKind::Filtered(filter))
            .unwrap()
    }

    pub fn config(&self, id: ConfigId) -> DeckConfig {
        self.sched.store().get_deck_config(id).unwrap().unwrap()
    }

    pub fn update_config(&mut self, id: ConfigId, f: impl FnOnce(&mut DeckConfig)) {
        let mut conf = self.config(id);
        f(&mut conf);
        self.store().save_deck_config(&conf).unwrap();
        self.session.invalidate();
    }

    /// Point `deck` at a fresh config with id `config`, edited by `f`.
    pub fn give_config(&mut self, deck: DeckId, config: ConfigId, f: impl FnOnce(&mut DeckConfig)) {
        let mut conf = DeckConfig::with_id(config);
        f(&mut conf);
        self.store().save_deck_config(&conf).unwrap();
        let mut record = self.sched.store().get_deck_required(deck).unwrap();
        record.kind = DeckKind::Normal { config_id: config };
        self.store().save_deck(&record).unwrap();
        self.session.invalidate();
    }

    pub fn reset(&mut self) {
        self.sched.reset(&mut self.session).unwrap();
    }

    pub fn counts(&mut self) -> (usize, usize, usize) {
        self.sched.counts(&mut self.session).unwrap()
    }

    pub fn next(&mut self) -> Option<Card> {
        self.sched.get_card(&mut self.session).unwrap()
    }

    pub fn answer(&mut self, card: &mut Card, ease: Ease) {
        self.sched
            .answer_card(&mut self.session, card, ease)
            .unwrap();
    }

    /// Fetch the next card and answer it.
    pub fn study(&mut self, ease: Ease) -> Card {
        let mut card = self.next().expect("a card should be due");
        self.answer(&mut card, ease);
        card
    }

    pub fn next_ivl(&self, card: &Card, ease: Ease) -> u64 {
        self.sched.next_ivl(card, ease).unwrap()
    }
}

/// The interval is `expected` give or take the review fuzz.
pub fn within_fuzz(interval: u32, expected: u32) -> bool {
    let (lo, hi) = deckwise_core::sched::intervals::fuzz_range(expected);
    (lo..=hi).contains(&interval)
}

pub fn due_secs(card: &Card) -> i64 {
    match card.due {
        Due::Timestamp(ts) => ts,
        other => panic!("expected an intraday due, got {other}"),
    }
}
