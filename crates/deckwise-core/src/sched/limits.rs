//! Daily budgets for new cards and reviews.
//!
//! Every deck has its own remaining allowance for today. A card can only be
//! queued while the deck it lives in and every existing ancestor still have
//! allowance left, and queueing it spends one from each of them.

use std::collections::HashMap;

use crate::deck::{Deck, DeckId, DeckIndex, FILTERED_DECK_LIMIT};
use crate::deck_config::DeckConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    New,
    Review,
}

/// Remaining allowance for the deck alone, ignoring its ancestors.
pub fn own_limit(deck: &Deck, conf: &DeckConfig, kind: BudgetKind, today: i32) -> i64 {
    if deck.is_filtered() {
        return FILTERED_DECK_LIMIT;
    }
    let (per_day, done) = match kind {
        BudgetKind::New => (conf.new.per_day, deck.today.new.on(today)),
        BudgetKind::Review => (conf.rev.per_day, deck.today.review.on(today)),
    };
    (i64::from(per_day) - done).max(0)
}

#[derive(Debug, Clone, Default)]
pub struct Budgets {
    remaining: HashMap<DeckId, i64>,
    chains: HashMap<DeckId, Vec<DeckId>>,
}

impl Budgets {
    /// Build the table for every deck in `index`. `conf_for` resolves the
    /// configuration governing a deck.
    pub fn build<'c>(
        index: &DeckIndex,
        kind: BudgetKind,
        today: i32,
        conf_for: impl Fn(&Deck) -> &'c DeckConfig,
    ) -> Self {
        let mut remaining = HashMap::new();
        let mut chains = HashMap::new();
        for deck in index.sorted() {
            remaining.insert(deck.id, own_limit(deck, conf_for(deck), kind, today));
            let chain = if deck.is_filtered() {
                vec![deck.id]
            } else {
                index.self_and_parents(deck.id)
            };
            chains.insert(deck.id, chain);
        }
        Self { remaining, chains }
    }

    /// Effective allowance: the smallest remaining budget on the chain.
    /// Unknown decks have none.
    pub fn limit(&self, deck: DeckId) -> i64 {
        let Some(chain) = self.chains.get(&deck) else {
            return 0;
        };
        chain
            .iter()
            .map(|id| self.remaining.get(id).copied().unwrap_or(0))
            .min()
            .unwrap_or(0)
    }

    /// Spend `amount` on the deck and every ancestor.
    pub fn consume(&mut self, deck: DeckId, amount: i64) {
        if let Some(chain) = self.chains.get(&deck) {
            for id in chain {
                if let Some(left) = self.remaining.get_mut(id) {
                    *left -= amount;
                }
            }
        }
    }

    /// Spend one if the chain allows it.
    pub fn try_take(&mut self, deck: DeckId) -> bool {
        if self.limit(deck) > 0 {
            self.consume(deck, 1);
            true
        } else {
            false
        }
    }
}
