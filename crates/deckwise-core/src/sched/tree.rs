//! Per-deck due counts arranged as the deck hierarchy.

use std::collections::HashMap;

use serde::Serialize;

use super::limits::{own_limit, BudgetKind};
use super::{ConfigTable, Scheduler};
use crate::card::{Card, CardQueue, Due};
use crate::clock::Clock;
use crate::deck::{Deck, DeckId, DeckIndex};
use crate::error::Result;
use crate::storage::{CardQuery, Store};

/// Due counts for one deck, including its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckDueNode {
    /// Last name component.
    pub name: String,
    pub full_name: String,
    pub deck_id: DeckId,
    pub new: u32,
    pub learn: u32,
    pub review: u32,
    pub children: Vec<DeckDueNode>,
}

#[derive(Debug, Clone, Copy, Default)]
struct FlatCounts {
    new_limit: i64,
    review_limit: i64,
    new: i64,
    learn: i64,
    review: i64,
}

impl<S: Store, C: Clock> Scheduler<S, C> {
    /// Counts for every deck as shown in a deck list.
    ///
    /// New and review counts respect each deck's daily limit and the limits
    /// of its ancestors. Reviews are counted over the whole subtree; new and
    /// learning counts add up their children. Cards whose deck no longer
    /// exists are ignored.
    pub fn deck_due_tree(&mut self) -> Result<Vec<DeckDueNode>> {
        let times = self.check_day()?;
        let col = self.store.collection()?;
        let index = self.deck_index()?;
        let configs = ConfigTable::load(&self.store)?;
        let learn_cutoff = times.now + col.collapse_time_secs;

        let mut by_deck: HashMap<DeckId, Vec<Card>> = HashMap::new();
        for card in self.store.query_cards_by_deck_and_queue(&CardQuery::all())? {
            by_deck.entry(card.deck_id).or_default().push(card);
        }
        let own = |deck: DeckId, pred: &dyn Fn(&Card) -> bool| -> i64 {
            by_deck
                .get(&deck)
                .map_or(0, |cards| cards.iter().filter(|&c| pred(c)).count() as i64)
        };
        let is_new = |c: &Card| c.queue == CardQueue::New;
        let is_learning = |c: &Card| match (c.queue, c.due) {
            (CardQueue::Learning | CardQueue::PreviewRepeat, Due::Timestamp(ts)) => {
                ts < learn_cutoff
            }
            (CardQueue::DayLearnRelearn, _) => c.due_day().is_some_and(|d| d <= times.today),
            _ => false,
        };
        let is_due_review = |c: &Card| c.is_due_review(times.today);

        let mut flat: HashMap<DeckId, FlatCounts> = HashMap::new();
        for deck in index.sorted() {
            let conf = configs.for_deck(deck);
            let parent = if deck.is_filtered() {
                None
            } else {
                index.parent(deck.id).and_then(|p| flat.get(&p.id)).copied()
            };

            let mut new_limit = own_limit(deck, conf, BudgetKind::New, times.today);
            let mut review_limit = own_limit(deck, conf, BudgetKind::Review, times.today);
            if let Some(parent) = parent {
                new_limit = new_limit.min(parent.new_limit);
                review_limit = review_limit.min(parent.review_limit);
            }

            let mut review = own(deck.id, &is_due_review);
            for child in index.descendants(deck.id) {
                review += own(child.id, &is_due_review);
            }

            flat.insert(
                deck.id,
                FlatCounts {
                    new_limit,
                    review_limit,
                    new: own(deck.id, &is_new).min(new_limit),
                    learn: own(deck.id, &is_learning),
                    review: review.min(review_limit),
                },
            );
        }

        let today = times.today;
        Ok(index
            .roots()
            .into_iter()
            .map(|deck| build_node(&index, &configs, &flat, deck, today))
            .collect())
    }
}

fn build_node(
    index: &DeckIndex,
    configs: &ConfigTable,
    flat: &HashMap<DeckId, FlatCounts>,
    deck: &Deck,
    today: i32,
) -> DeckDueNode {
    let children: Vec<DeckDueNode> = index
        .children(deck.id)
        .into_iter()
        .map(|child| build_node(index, configs, flat, child, today))
        .collect();
    let counts = flat.get(&deck.id).copied().unwrap_or_default();

    let mut new = counts.new;
    let mut learn = counts.learn;
    for child in &children {
        new += i64::from(child.new);
        learn += i64::from(child.learn);
    }
    if !deck.is_filtered() {
        new = new.min(own_limit(deck, configs.for_deck(deck), BudgetKind::New, today));
    }

    DeckDueNode {
        name: deck.leaf_name().to_string(),
        full_name: deck.name.clone(),
        deck_id: deck.id,
        new: clamp_count(new),
        learn: clamp_count(learn),
        review: clamp_count(counts.review),
        children,
    }
}

fn clamp_count(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}
