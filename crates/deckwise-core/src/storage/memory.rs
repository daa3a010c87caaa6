//! In-memory [`Store`] for tests and scratch collections.

use std::collections::BTreeMap;

use crate::card::{Card, CardId, CardType, Due, NoteId};
use crate::deck::{ConfigId, Deck, DeckId, DeckKind};
use crate::deck_config::{CollectionState, DeckConfig};
use crate::error::{DatabaseError, Result};
use crate::revlog::{RevlogEntry, RevlogId};

use super::{CardQuery, Store};

#[derive(Debug, Clone)]
pub struct MemoryStore {
    cards: BTreeMap<CardId, Card>,
    decks: BTreeMap<DeckId, Deck>,
    configs: BTreeMap<ConfigId, DeckConfig>,
    revlog: BTreeMap<RevlogId, RevlogEntry>,
    collection: CollectionState,
    next_card_id: i64,
    next_deck_id: i64,
    next_revlog_id: i64,
    /// Store calls allowed to write before writes start failing.
    writes_left: Option<usize>,
}

impl MemoryStore {
    /// A collection created at `crt` with the Default deck and config.
    pub fn new(crt: i64) -> Self {
        let mut decks = BTreeMap::new();
        decks.insert(DeckId::DEFAULT, Deck::normal(DeckId::DEFAULT, "Default"));
        let mut configs = BTreeMap::new();
        configs.insert(ConfigId::DEFAULT, DeckConfig::default());
        Self {
            cards: BTreeMap::new(),
            decks,
            configs,
            revlog: BTreeMap::new(),
            collection: CollectionState::new(crt),
            next_card_id: 1,
            next_deck_id: 2,
            next_revlog_id: 1,
            writes_left: None,
        }
    }

    /// Make every write fail with [`DatabaseError::Locked`].
    pub fn set_read_only(&mut self, read_only: bool) {
        self.writes_left = read_only.then_some(0);
    }

    /// Let the next `writes` write calls through, then fail like
    /// [`MemoryStore::set_read_only`].
    pub fn fail_writes_after(&mut self, writes: usize) {
        self.writes_left = Some(writes);
    }

    pub fn revlog_len(&self) -> usize {
        self.revlog.len()
    }

    fn check_writable(&mut self) -> Result<()> {
        match self.writes_left.as_mut() {
            Some(0) => Err(DatabaseError::Locked.into()),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn push_revlog(&mut self, entry: &RevlogEntry) -> RevlogId {
        let id = RevlogId(self.next_revlog_id);
        self.next_revlog_id += 1;
        let mut entry = entry.clone();
        entry.id = id;
        self.revlog.insert(id, entry);
        id
    }
}

impl Store for MemoryStore {
    fn load_card(&self, id: CardId) -> Result<Option<Card>> {
        Ok(self.cards.get(&id).cloned())
    }

    fn save_card(&mut self, card: &Card) -> Result<()> {
        self.check_writable()?;
        self.cards.insert(card.id, card.clone());
        Ok(())
    }

    fn add_card(&mut self, note_id: NoteId, deck_id: DeckId) -> Result<Card> {
        self.check_writable()?;
        let position = self.max_new_position()? + 1;
        let card = Card::new(CardId(self.next_card_id), note_id, deck_id, position);
        self.next_card_id += 1;
        self.cards.insert(card.id, card.clone());
        Ok(card)
    }

    fn record_answer(
        &mut self,
        card: &Card,
        entry: &RevlogEntry,
        decks: &[Deck],
        buried: &[Card],
    ) -> Result<RevlogId> {
        self.check_writable()?;
        for sibling in buried {
            self.cards.insert(sibling.id, sibling.clone());
        }
        for deck in decks {
            self.decks.insert(deck.id, deck.clone());
        }
        self.cards.insert(card.id, card.clone());
        Ok(self.push_revlog(entry))
    }

    fn append_revlog_entry(&mut self, entry: &RevlogEntry) -> Result<RevlogId> {
        self.check_writable()?;
        Ok(self.push_revlog(entry))
    }

    fn remove_revlog_entry(&mut self, id: RevlogId) -> Result<()> {
        self.check_writable()?;
        self.revlog.remove(&id);
        Ok(())
    }

    fn revlog_for_card(&self, card_id: CardId) -> Result<Vec<RevlogEntry>> {
        Ok(self
            .revlog
            .values()
            .filter(|e| e.card_id == card_id)
            .cloned()
            .collect())
    }

    fn query_cards_by_deck_and_queue(&self, query: &CardQuery) -> Result<Vec<Card>> {
        Ok(self
            .cards
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect())
    }

    fn cards_of_note(&self, note_id: NoteId) -> Result<Vec<Card>> {
        Ok(self
            .cards
            .values()
            .filter(|c| c.note_id == note_id)
            .cloned()
            .collect())
    }

    fn max_new_position(&self) -> Result<i32> {
        Ok(self
            .cards
            .values()
            .filter(|c| c.ctype == CardType::New)
            .filter_map(|c| match (c.original_due, c.due) {
                (Some(Due::Ordinal(n)), _) | (None, Due::Ordinal(n)) => Some(n),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            .max(0))
    }

    fn get_deck(&self, id: DeckId) -> Result<Option<Deck>> {
        Ok(self.decks.get(&id).cloned())
    }

    fn all_decks(&self) -> Result<Vec<Deck>> {
        Ok(self.decks.values().cloned().collect())
    }

    fn save_deck(&mut self, deck: &Deck) -> Result<()> {
        self.check_writable()?;
        self.decks.insert(deck.id, deck.clone());
        Ok(())
    }

    fn insert_deck(&mut self, name: &str, kind: DeckKind) -> Result<DeckId> {
        self.check_writable()?;
        let id = DeckId(self.next_deck_id);
        self.next_deck_id += 1;
        let mut deck = Deck::normal(id, name);
        deck.kind = kind;
        self.decks.insert(id, deck);
        Ok(id)
    }

    fn get_deck_config(&self, id: ConfigId) -> Result<Option<DeckConfig>> {
        Ok(self.configs.get(&id).cloned())
    }

    fn all_deck_configs(&self) -> Result<Vec<DeckConfig>> {
        Ok(self.configs.values().cloned().collect())
    }

    fn save_deck_config(&mut self, conf: &DeckConfig) -> Result<()> {
        self.check_writable()?;
        self.configs.insert(conf.id, conf.clone());
        Ok(())
    }

    fn collection(&self) -> Result<CollectionState> {
        Ok(self.collection.clone())
    }

    fn save_collection(&mut self, state: &CollectionState) -> Result<()> {
        self.check_writable()?;
        self.collection = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::FilteredDeck;

    #[test]
    fn new_cards_get_increasing_positions() {
        let mut store = MemoryStore::new(0);
        let a = store.add_card(NoteId(1), DeckId::DEFAULT).unwrap();
        let b = store.add_card(NoteId(2), DeckId::DEFAULT).unwrap();
        assert_eq!(a.due, Due::Ordinal(1));
        assert_eq!(b.due, Due::Ordinal(2));
        assert_eq!(store.max_new_position().unwrap(), 2);
    }

    #[test]
    fn add_deck_creates_missing_parents() {
        let mut store = MemoryStore::new(0);
        let leaf = store
            .add_deck("a::b::c", DeckKind::Normal { config_id: ConfigId::DEFAULT })
            .unwrap();
        let names: Vec<String> = store.all_decks().unwrap().into_iter().map(|d| d.name).collect();
        assert!(names.contains(&"a".to_string()));
        assert!(names.contains(&"a::b".to_string()));
        assert_eq!(store.deck_by_name("a::b::c").unwrap().map(|d| d.id), Some(leaf));

        let again = store
            .add_deck("a::b::c", DeckKind::Normal { config_id: ConfigId::DEFAULT })
            .unwrap();
        assert_eq!(again, leaf);
    }

    #[test]
    fn filtered_names_must_be_unused() {
        let mut store = MemoryStore::new(0);
        store
            .add_deck("cram", DeckKind::Filtered(FilteredDeck::default()))
            .unwrap();
        assert!(store
            .add_deck("cram", DeckKind::Filtered(FilteredDeck::default()))
            .is_err());
        assert!(store
            .add_deck("cram::child", DeckKind::Normal { config_id: ConfigId::DEFAULT })
            .is_err());
    }

    #[test]
    fn read_only_rejects_writes() {
        let mut store = MemoryStore::new(0);
        let card = store.add_card(NoteId(1), DeckId::DEFAULT).unwrap();
        store.set_read_only(true);
        assert!(store.save_card(&card).is_err());
        assert!(store.load_card(card.id).unwrap().is_some());
    }

    #[test]
    fn missing_config_falls_back_to_default() {
        let mut store = MemoryStore::new(0);
        let id = store
            .add_deck("x", DeckKind::Normal { config_id: ConfigId(42) })
            .unwrap();
        let conf = store.config_for_deck(id).unwrap();
        assert_eq!(conf.id, ConfigId(42));
        assert_eq!(conf.new.per_day, 20);
    }
}
