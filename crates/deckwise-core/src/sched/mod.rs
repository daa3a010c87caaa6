//! The scheduler: which card comes next and what an answer does to it.
//!
//! [`Scheduler`] owns the store, the clock and the fuzz generator. The
//! queues live in a caller-owned [`SchedulerSession`], built lazily by
//! [`Scheduler::reset`] and thrown away whenever an operation changes which
//! cards are eligible.
//!
//! ## Usage
//!
//! ```ignore
//! let mut sched = Scheduler::new(store, SystemClock);
//! let mut session = SchedulerSession::new();
//! while let Some(mut card) = sched.get_card(&mut session)? {
//!     sched.answer_card(&mut session, &mut card, Ease::Good)?;
//! }
//! ```

mod answer;
mod filtered;
pub mod intervals;
pub mod limits;
mod ops;
mod queues;
mod tree;

pub use answer::{AnswerOutcome, UndoAnswer};
pub use ops::UnburyKind;
pub use queues::CountIndex;
pub use tree::DeckDueNode;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;

use crate::card::CardId;
use crate::clock::{Clock, SchedTimes, SystemClock};
use crate::deck::{ConfigId, Deck, DeckId, DeckIndex};
use crate::deck_config::{CollectionState, DeckConfig};
use crate::error::Result;
use crate::storage::Store;

use limits::Budgets;

/// Queues and counters for one study session.
///
/// Created empty; the first [`Scheduler::get_card`] fills it. Any operation
/// that changes card eligibility marks it invalid so the next fetch
/// rebuilds it.
#[derive(Debug, Clone, Default)]
pub struct SchedulerSession {
    valid: bool,
    /// Deck to study. `None` follows the collection's current deck.
    selected: Option<DeckId>,
    active: Vec<DeckId>,
    today: i32,
    day_cutoff: i64,
    new_queue: VecDeque<CardId>,
    /// Intraday learning cards by `(due, id)`, earliest first.
    learning: BinaryHeap<Reverse<(i64, CardId)>>,
    day_learning: VecDeque<CardId>,
    review_queue: VecDeque<CardId>,
    new_budgets: Budgets,
    review_budgets: Budgets,
    /// Cards handed out so far.
    reps: u32,
    new_modulus: u32,
    learn_cutoff: i64,
    /// Last card handed out and when, in milliseconds.
    fetched: Option<(CardId, i64)>,
}

impl SchedulerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session studying `deck` instead of the collection's current deck.
    pub fn for_deck(deck: DeckId) -> Self {
        Self {
            selected: Some(deck),
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Drop the queues so the next fetch rebuilds them. The rep count
    /// survives.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn selected_deck(&self) -> Option<DeckId> {
        self.selected
    }

    /// Decks the queues were built from, selected deck first.
    pub fn active_decks(&self) -> &[DeckId] {
        &self.active
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn today(&self) -> i32 {
        self.today
    }

    /// Cards per daily-budget chain still available after the queues were
    /// built.
    pub fn new_limit(&self, deck: DeckId) -> i64 {
        self.new_budgets.limit(deck)
    }

    pub fn review_limit(&self, deck: DeckId) -> i64 {
        self.review_budgets.limit(deck)
    }

    pub(crate) fn forget_card(&mut self, id: CardId) {
        self.new_queue.retain(|c| *c != id);
        self.day_learning.retain(|c| *c != id);
        self.review_queue.retain(|c| *c != id);
        self.learning.retain(|Reverse((_, c))| *c != id);
    }
}

/// Spaced-repetition scheduler over a [`Store`].
pub struct Scheduler<S: Store, C: Clock = SystemClock> {
    store: S,
    clock: C,
    rng: Mcg128Xsl64,
}

impl<S: Store, C: Clock> Scheduler<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            rng: Mcg128Xsl64::from_entropy(),
        }
    }

    /// Deterministic fuzz, for tests and reproducible simulations.
    pub fn with_seed(store: S, clock: C, seed: u64) -> Self {
        Self {
            store,
            clock,
            rng: Mcg128Xsl64::seed_from_u64(seed),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct store access. Changes made here are not seen by an existing
    /// session until it is invalidated.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current time and day boundaries for the collection.
    pub fn times(&self) -> Result<SchedTimes> {
        let col = self.store.collection()?;
        Ok(SchedTimes::read(&self.clock, col.crt, col.rollover_hour))
    }

    pub fn today(&self) -> Result<i32> {
        Ok(self.times()?.today)
    }

    /// Study `deck` from now on, remembering it as the collection's current
    /// deck.
    pub fn select_deck(&mut self, session: &mut SchedulerSession, deck: DeckId) -> Result<()> {
        self.store.get_deck_required(deck)?;
        let mut col = self.store.collection()?;
        if col.current_deck != deck {
            col.current_deck = deck;
            self.store.save_collection(&col)?;
        }
        session.selected = Some(deck);
        session.invalidate();
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────

    fn selected_deck(&self, session: &SchedulerSession, col: &CollectionState) -> DeckId {
        session.selected.unwrap_or(col.current_deck)
    }

    fn deck_index(&self) -> Result<DeckIndex> {
        Ok(DeckIndex::new(self.store.all_decks()?))
    }
}

/// Every deck configuration by id, with a default for decks whose config
/// is missing.
pub(crate) struct ConfigTable {
    configs: HashMap<ConfigId, DeckConfig>,
    fallback: DeckConfig,
}

impl ConfigTable {
    pub(crate) fn load<S: Store>(store: &S) -> Result<Self> {
        let configs = store
            .all_deck_configs()?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        Ok(Self {
            configs,
            fallback: DeckConfig::default(),
        })
    }

    pub(crate) fn for_deck(&self, deck: &Deck) -> &DeckConfig {
        let id = deck.config_id().unwrap_or(ConfigId::DEFAULT);
        match self.configs.get(&id) {
            Some(conf) => conf,
            None => {
                if deck.config_id().is_some() {
                    tracing::warn!(deck = %deck.id, config = %id, "deck config missing, using defaults");
                }
                self.configs.get(&ConfigId::DEFAULT).unwrap_or(&self.fallback)
            }
        }
    }
}
