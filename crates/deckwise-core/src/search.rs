//! Card search used to fill filtered decks.
//!
//! The scheduler only depends on [`CardSearch`]. [`BasicSearch`] understands
//! a small query language: whitespace-separated terms that must all match,
//! each optionally negated with a leading `-`.
//!
//! | term            | matches                                     |
//! |-----------------|---------------------------------------------|
//! | `deck:Name`     | cards in `Name` or any deck below it        |
//! | `is:new`        | new cards                                   |
//! | `is:learn`      | cards in (re)learning                       |
//! | `is:review`     | review and relearning cards                 |
//! | `is:due`        | reviews and learning steps due now          |
//! | `is:suspended`  | suspended cards                             |
//! | `is:buried`     | buried cards of either kind                 |
//! | `is:filtered`   | cards currently in a filtered deck          |
//!
//! Deck names containing spaces can be quoted: `deck:"My Deck"`.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;

use crate::card::{Card, CardId, CardQueue, CardType, Due};
use crate::deck::{is_descendant_name, DeckIndex, FilterOrder, FilterTerm};
use crate::error::{Result, ValidationError};
use crate::storage::{CardQuery, Store};

/// What a search may need to know besides the cards themselves.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub decks: &'a DeckIndex,
    pub today: i32,
    pub day_cutoff: i64,
}

/// Finds cards for a filtered deck term, ordered and limited.
pub trait CardSearch {
    fn search<S: Store>(
        &self,
        store: &S,
        ctx: &SearchContext<'_>,
        term: &FilterTerm,
    ) -> Result<Vec<CardId>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Deck(String),
    New,
    Learn,
    Review,
    Due,
    Suspended,
    Buried,
    Filtered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    negated: bool,
    predicate: Predicate,
}

fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in query.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse(query: &str) -> Result<Vec<Clause>, ValidationError> {
    tokenize(query)
        .into_iter()
        .map(|token| {
            let (negated, body) = match token.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, token.as_str()),
            };
            let predicate = if let Some(name) = body.strip_prefix("deck:") {
                Predicate::Deck(name.to_string())
            } else {
                match body.to_ascii_lowercase().as_str() {
                    "is:new" => Predicate::New,
                    "is:learn" => Predicate::Learn,
                    "is:review" => Predicate::Review,
                    "is:due" => Predicate::Due,
                    "is:suspended" => Predicate::Suspended,
                    "is:buried" => Predicate::Buried,
                    "is:filtered" => Predicate::Filtered,
                    _ => {
                        return Err(ValidationError::InvalidValue {
                            field: "search".into(),
                            message: format!("unsupported term '{token}'"),
                        })
                    }
                }
            };
            Ok(Clause { negated, predicate })
        })
        .collect()
}

fn deck_matches(card: &Card, name: &str, ctx: &SearchContext<'_>) -> bool {
    let home = card.home_deck();
    [card.deck_id, home].iter().any(|id| {
        ctx.decks.get(*id).is_some_and(|deck| {
            let deck_name = deck.name.to_lowercase();
            let wanted = name.to_lowercase();
            deck_name == wanted || is_descendant_name(&deck_name, &wanted)
        })
    })
}

fn predicate_matches(card: &Card, predicate: &Predicate, ctx: &SearchContext<'_>) -> bool {
    match predicate {
        Predicate::Deck(name) => deck_matches(card, name, ctx),
        Predicate::New => card.ctype == CardType::New,
        Predicate::Learn => matches!(
            card.queue,
            CardQueue::Learning | CardQueue::DayLearnRelearn
        ),
        Predicate::Review => matches!(card.ctype, CardType::Review | CardType::Relearning),
        Predicate::Due => match (card.queue, card.due) {
            (CardQueue::Review | CardQueue::DayLearnRelearn, Due::DayNumber(d)) => d <= ctx.today,
            (CardQueue::Learning, Due::Timestamp(ts)) => ts < ctx.day_cutoff,
            _ => false,
        },
        Predicate::Suspended => card.queue == CardQueue::SuspendedBySystem,
        Predicate::Buried => card.queue.is_buried(),
        Predicate::Filtered => card.in_filtered_deck(),
    }
}

/// Reference implementation of [`CardSearch`] over [`Store`] queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSearch;

impl BasicSearch {
    pub fn new() -> Self {
        Self
    }

    /// Check a query without running it.
    pub fn validate(query: &str) -> Result<(), ValidationError> {
        parse(query).map(|_| ())
    }
}

fn sort_cards(cards: &mut [Card], order: FilterOrder, today: i32) {
    match order {
        FilterOrder::Oldest => cards.sort_by_key(|c| c.id),
        FilterOrder::Added => cards.sort_by_key(|c| std::cmp::Reverse(c.id)),
        FilterOrder::IntervalsAscending => cards.sort_by_key(|c| (c.interval, c.id)),
        FilterOrder::IntervalsDescending => {
            cards.sort_by_key(|c| (std::cmp::Reverse(c.interval), c.id))
        }
        FilterOrder::MostLapses => cards.sort_by_key(|c| (std::cmp::Reverse(c.lapses), c.id)),
        FilterOrder::Due => cards.sort_by_key(|c| (c.ctype.as_i32(), c.due.raw(), c.id)),
        FilterOrder::Random => {
            let mut rng = Mcg128Xsl64::seed_from_u64(today as u64);
            cards.sort_by_key(|c| c.id);
            cards.shuffle(&mut rng);
        }
    }
}

impl CardSearch for BasicSearch {
    fn search<S: Store>(
        &self,
        store: &S,
        ctx: &SearchContext<'_>,
        term: &FilterTerm,
    ) -> Result<Vec<CardId>> {
        let clauses = parse(&term.search)?;
        let mut cards: Vec<Card> = store
            .query_cards_by_deck_and_queue(&CardQuery::all())?
            .into_iter()
            .filter(|card| {
                clauses
                    .iter()
                    .all(|c| predicate_matches(card, &c.predicate, ctx) != c.negated)
            })
            .collect();
        sort_cards(&mut cards, term.order, ctx.today);
        Ok(cards.into_iter().take(term.limit).map(|c| c.id).collect())
    }
}
