//! # Deckwise Core Library
//!
//! This library provides the scheduling engine behind the `deckwise` CLI: an
//! SM-2 spaced-repetition scheduler over hierarchical decks. Every operation
//! is available through the CLI binary, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Scheduler**: builds the study queues, hands out cards and applies
//!   answers. Queues live in a caller-owned [`SchedulerSession`].
//! - **Storage**: the [`Store`] trait, with an in-memory store for tests and a
//!   SQLite store for real collections. CLI settings are TOML.
//! - **Clock**: all time comes from a [`Clock`], so tests can move it.
//!
//! ## Key Components
//!
//! - [`Scheduler`]: queue building, answering, filtered decks, maintenance
//! - [`Card`], [`Deck`], [`DeckConfig`]: the data model
//! - [`SqliteStore`] / [`MemoryStore`]: persistence
//! - [`BasicSearch`]: the search used to fill filtered decks

pub mod card;
pub mod clock;
pub mod deck;
pub mod deck_config;
pub mod error;
pub mod revlog;
pub mod sched;
pub mod search;
pub mod storage;

pub use card::{Card, CardId, CardQueue, CardType, Due, DueKind, Ease, NoteId};
pub use clock::{Clock, MockClock, SchedTimes, SystemClock};
pub use deck::{
    ConfigId, Deck, DeckId, DeckIndex, DeckKind, FilterOrder, FilterTerm, FilteredDeck,
};
pub use deck_config::{
    CollectionState, DeckConfig, LapseConfig, LeechAction, NewCardOrder, NewConfig, NewSpread,
    ReviewConfig,
};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use revlog::{RevlogEntry, RevlogId, RevlogKind};
pub use sched::{
    AnswerOutcome, CountIndex, DeckDueNode, Scheduler, SchedulerSession, UnburyKind, UndoAnswer,
};
pub use search::{BasicSearch, CardSearch, SearchContext};
pub use storage::{CardQuery, Config, MemoryStore, SqliteStore, Store};
