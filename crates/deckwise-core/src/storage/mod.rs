//! Persistence behind the scheduler.
//!
//! The scheduler only talks to the [`Store`] trait. [`MemoryStore`] backs
//! tests and throwaway sessions, [`SqliteStore`] backs the CLI.

mod config;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use config::Config;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;

use crate::card::{Card, CardId, CardQueue, NoteId};
use crate::deck::{normalize_name, parent_name, ConfigId, Deck, DeckId, DeckKind};
use crate::deck_config::{CollectionState, DeckConfig};
use crate::error::{CoreError, Result, ValidationError};
use crate::revlog::{RevlogEntry, RevlogId};

/// Selects cards by deck and queue. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardQuery {
    pub decks: Vec<DeckId>,
    pub queues: Vec<CardQueue>,
}

impl CardQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_decks(decks: impl Into<Vec<DeckId>>, queues: impl Into<Vec<CardQueue>>) -> Self {
        Self {
            decks: decks.into(),
            queues: queues.into(),
        }
    }

    pub fn matches(&self, card: &Card) -> bool {
        (self.decks.is_empty() || self.decks.contains(&card.deck_id))
            && (self.queues.is_empty() || self.queues.contains(&card.queue))
    }
}

/// Storage collaborator used by the scheduler.
///
/// Card queries return cards ordered by id.
pub trait Store {
    fn load_card(&self, id: CardId) -> Result<Option<Card>>;

    fn save_card(&mut self, card: &Card) -> Result<()>;

    /// Insert a new card at the end of the new queue.
    fn add_card(&mut self, note_id: NoteId, deck_id: DeckId) -> Result<Card>;

    /// Persist an answered card together with its review log row, the
    /// decks whose counters moved and any siblings it buried. Either all of
    /// it is written or none of it.
    fn record_answer(
        &mut self,
        card: &Card,
        entry: &RevlogEntry,
        decks: &[Deck],
        buried: &[Card],
    ) -> Result<RevlogId>;

    fn append_revlog_entry(&mut self, entry: &RevlogEntry) -> Result<RevlogId>;

    fn remove_revlog_entry(&mut self, id: RevlogId) -> Result<()>;

    fn revlog_for_card(&self, card_id: CardId) -> Result<Vec<RevlogEntry>>;

    fn query_cards_by_deck_and_queue(&self, query: &CardQuery) -> Result<Vec<Card>>;

    fn cards_of_note(&self, note_id: NoteId) -> Result<Vec<Card>>;

    /// Highest new-card position in use, 0 when there is none.
    fn max_new_position(&self) -> Result<i32>;

    fn get_deck(&self, id: DeckId) -> Result<Option<Deck>>;

    fn all_decks(&self) -> Result<Vec<Deck>>;

    fn save_deck(&mut self, deck: &Deck) -> Result<()>;

    /// Insert a single deck record and return its id.
    fn insert_deck(&mut self, name: &str, kind: DeckKind) -> Result<DeckId>;

    fn get_deck_config(&self, id: ConfigId) -> Result<Option<DeckConfig>>;

    fn all_deck_configs(&self) -> Result<Vec<DeckConfig>>;

    fn save_deck_config(&mut self, conf: &DeckConfig) -> Result<()>;

    fn collection(&self) -> Result<CollectionState>;

    fn save_collection(&mut self, state: &CollectionState) -> Result<()>;

    fn load_card_required(&self, id: CardId) -> Result<Card> {
        self.load_card(id)?.ok_or(CoreError::CardNotFound(id))
    }

    fn get_deck_required(&self, id: DeckId) -> Result<Deck> {
        self.get_deck(id)?.ok_or(CoreError::DeckNotFound(id))
    }

    fn deck_by_name(&self, name: &str) -> Result<Option<Deck>> {
        Ok(self.all_decks()?.into_iter().find(|d| d.name == name))
    }

    /// Create a deck, creating missing parents as normal decks.
    ///
    /// Adding a normal deck whose name already exists returns the existing
    /// id. Filtered deck names must be unused.
    fn add_deck(&mut self, name: &str, kind: DeckKind) -> Result<DeckId> {
        let name = normalize_name(name)?;
        if let Some(existing) = self.deck_by_name(&name)? {
            if matches!(kind, DeckKind::Filtered(_)) || existing.is_filtered() {
                return Err(ValidationError::InvalidDeckName(name).into());
            }
            return Ok(existing.id);
        }
        if let Some(parent) = parent_name(&name) {
            let parent_id = self.add_deck(
                parent,
                DeckKind::Normal {
                    config_id: ConfigId::DEFAULT,
                },
            )?;
            if self.get_deck_required(parent_id)?.is_filtered() {
                return Err(ValidationError::InvalidDeckName(name).into());
            }
        }
        self.insert_deck(&name, kind)
    }

    /// Configuration for a card's home deck. Filtered or unknown decks, and
    /// decks pointing at a missing config, get the default.
    fn config_for_deck(&self, deck_id: DeckId) -> Result<DeckConfig> {
        let config_id = self
            .get_deck(deck_id)?
            .and_then(|d| d.config_id())
            .unwrap_or(ConfigId::DEFAULT);
        match self.get_deck_config(config_id)? {
            Some(conf) => Ok(conf),
            None => {
                tracing::warn!(deck = %deck_id, config = %config_id, "deck config missing, using defaults");
                Ok(DeckConfig::with_id(config_id))
            }
        }
    }
}

/// Returns `~/.config/deckwise[-dev]/` based on DECKWISE_ENV.
///
/// Set DECKWISE_ENV=dev to use the development data directory, or
/// DECKWISE_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("DECKWISE_DATA_DIR") {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)?;
        return Ok(dir);
    }

    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("DECKWISE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("deckwise-dev")
    } else {
        base_dir.join("deckwise")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
