//! SQLite-backed [`Store`].
//!
//! Provides persistent storage for:
//! - Cards, with `due`/`original_due` flattened to value + kind columns
//! - Decks and deck configs (kind, counters and config as JSON)
//! - The review log
//! - Key-value store for the collection state

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::card::{Card, CardId, CardQueue, CardType, Due, DueKind, Ease, NoteId};
use crate::deck::{ConfigId, DayCounts, Deck, DeckId, DeckKind};
use crate::deck_config::{CollectionState, DeckConfig};
use crate::error::{DatabaseError, Result};
use crate::revlog::{RevlogEntry, RevlogId, RevlogKind};

use super::{data_dir, migrations, CardQuery, Store};

const COLLECTION_KEY: &str = "collection";

const CARD_COLUMNS: &str = "id, note_id, deck_id, original_deck_id, ctype, queue, due, due_kind, \
     original_due, original_due_kind, interval, factor, reps, lapses, left_steps";

const REVLOG_COLUMNS: &str =
    "id, card_id, timestamp_ms, ease, interval, last_interval, factor, time_taken_ms, kind";

/// SQLite database holding one collection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/deckwise/deckwise.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_default() -> Result<Self> {
        Self::open(data_dir()?.join("deckwise.db"))
    }

    /// Open (creating if needed) the database at `path`.
    ///
    /// A fresh database gets the Default deck, the default config and a
    /// collection created now.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        let mut store = Self { conn };
        store.seed()?;
        Ok(store)
    }

    fn seed(&mut self) -> Result<()> {
        let default_kind = serde_json::to_string(&DeckKind::Normal {
            config_id: ConfigId::DEFAULT,
        })?;
        self.conn.execute(
            "INSERT OR IGNORE INTO decks (id, name, kind, today) VALUES (?1, 'Default', ?2, '{}')",
            params![DeckId::DEFAULT.0, default_kind],
        )?;
        if self.get_deck_config(ConfigId::DEFAULT)?.is_none() {
            self.save_deck_config(&DeckConfig::default())?;
        }
        if self.kv_get(COLLECTION_KEY)?.is_none() {
            self.save_collection(&CollectionState::new(Utc::now().timestamp()))?;
        }
        Ok(())
    }

    /// Read a raw value from the kv table.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn query_cards(&self, sql: &str, args: &[i64]) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), CardRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|row| row.into_card().map_err(Into::into))
            .collect()
    }
}

fn write_card(conn: &Connection, card: &Card) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO cards ({CARD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            card.id.0,
            card.note_id.0,
            card.deck_id.0,
            card.original_deck_id.map(|d| d.0),
            card.ctype.as_i32(),
            card.queue.as_i32(),
            card.due.raw(),
            card.due.kind().as_str(),
            card.original_due.map(Due::raw),
            card.original_due.map(|d| d.kind().as_str()),
            card.interval,
            card.factor,
            card.reps,
            card.lapses,
            card.left,
        ],
    )?;
    Ok(())
}

fn write_revlog(conn: &Connection, entry: &RevlogEntry) -> rusqlite::Result<RevlogId> {
    conn.execute(
        "INSERT INTO revlog (card_id, timestamp_ms, ease, interval, last_interval, factor, time_taken_ms, kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.card_id.0,
            entry.timestamp_ms,
            entry.ease.as_u8(),
            entry.interval,
            entry.last_interval,
            entry.factor,
            entry.time_taken_ms,
            entry.kind.as_i32(),
        ],
    )?;
    Ok(RevlogId(conn.last_insert_rowid()))
}

fn write_deck(conn: &Connection, deck: &Deck) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO decks (id, name, kind, today) VALUES (?1, ?2, ?3, ?4)",
        params![
            deck.id.0,
            deck.name,
            serde_json::to_string(&deck.kind)?,
            serde_json::to_string(&deck.today)?,
        ],
    )?;
    Ok(())
}

struct CardRow {
    id: i64,
    note_id: i64,
    deck_id: i64,
    original_deck_id: Option<i64>,
    ctype: i32,
    queue: i32,
    due: i64,
    due_kind: String,
    original_due: Option<i64>,
    original_due_kind: Option<String>,
    interval: u32,
    factor: u32,
    reps: u32,
    lapses: u32,
    left: u32,
}

impl CardRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            note_id: row.get(1)?,
            deck_id: row.get(2)?,
            original_deck_id: row.get(3)?,
            ctype: row.get(4)?,
            queue: row.get(5)?,
            due: row.get(6)?,
            due_kind: row.get(7)?,
            original_due: row.get(8)?,
            original_due_kind: row.get(9)?,
            interval: row.get(10)?,
            factor: row.get(11)?,
            reps: row.get(12)?,
            lapses: row.get(13)?,
            left: row.get(14)?,
        })
    }

    fn into_card(self) -> std::result::Result<Card, DatabaseError> {
        let corrupt = |message: String| DatabaseError::Corrupt {
            table: "cards",
            message,
        };
        let ctype = CardType::from_i32(self.ctype)
            .ok_or_else(|| corrupt(format!("card {} has type {}", self.id, self.ctype)))?;
        let queue = CardQueue::from_i32(self.queue)
            .ok_or_else(|| corrupt(format!("card {} has queue {}", self.id, self.queue)))?;
        let due_kind = DueKind::parse(&self.due_kind)
            .ok_or_else(|| corrupt(format!("card {} has due kind {}", self.id, self.due_kind)))?;
        let original_due = match (self.original_due, self.original_due_kind.as_deref()) {
            (Some(raw), Some(kind)) => {
                let kind = DueKind::parse(kind).ok_or_else(|| {
                    corrupt(format!("card {} has original due kind {kind}", self.id))
                })?;
                Some(Due::from_raw(kind, raw))
            }
            _ => None,
        };
        Ok(Card {
            id: CardId(self.id),
            note_id: NoteId(self.note_id),
            deck_id: DeckId(self.deck_id),
            original_deck_id: self.original_deck_id.filter(|&d| d != 0).map(DeckId),
            ctype,
            queue,
            due: Due::from_raw(due_kind, self.due),
            original_due,
            interval: self.interval,
            factor: self.factor,
            reps: self.reps,
            lapses: self.lapses,
            left: self.left,
        })
    }
}

fn revlog_from_row(row: &Row<'_>) -> rusqlite::Result<(RevlogEntry, u8, i32)> {
    let ease: u8 = row.get(3)?;
    let kind: i32 = row.get(8)?;
    Ok((
        RevlogEntry {
            id: RevlogId(row.get(0)?),
            card_id: CardId(row.get(1)?),
            timestamp_ms: row.get(2)?,
            ease: Ease::Again,
            interval: row.get(4)?,
            last_interval: row.get(5)?,
            factor: row.get(6)?,
            time_taken_ms: row.get(7)?,
            kind: RevlogKind::Learning,
        },
        ease,
        kind,
    ))
}

fn deck_from_parts(id: i64, name: String, kind: &str, today: &str) -> Result<Deck> {
    let kind: DeckKind = serde_json::from_str(kind)?;
    let today: DayCounts = serde_json::from_str(today)?;
    Ok(Deck {
        id: DeckId(id),
        name,
        kind,
        today,
    })
}

impl Store for SqliteStore {
    fn load_card(&self, id: CardId) -> Result<Option<Card>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1");
        Ok(self.query_cards(&sql, &[id.0])?.into_iter().next())
    }

    fn save_card(&mut self, card: &Card) -> Result<()> {
        write_card(&self.conn, card)?;
        Ok(())
    }

    fn add_card(&mut self, note_id: NoteId, deck_id: DeckId) -> Result<Card> {
        let position = self.max_new_position()? + 1;
        let blank = Card::new(CardId(0), note_id, deck_id, position);
        self.conn.execute(
            "INSERT INTO cards (note_id, deck_id, ctype, queue, due, due_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                note_id.0,
                deck_id.0,
                blank.ctype.as_i32(),
                blank.queue.as_i32(),
                blank.due.raw(),
                blank.due.kind().as_str(),
            ],
        )?;
        Ok(Card {
            id: CardId(self.conn.last_insert_rowid()),
            ..blank
        })
    }

    fn record_answer(
        &mut self,
        card: &Card,
        entry: &RevlogEntry,
        decks: &[Deck],
        buried: &[Card],
    ) -> Result<RevlogId> {
        let tx = self.conn.transaction()?;
        for sibling in buried {
            write_card(&tx, sibling)?;
        }
        for deck in decks {
            write_deck(&tx, deck)?;
        }
        write_card(&tx, card)?;
        let id = write_revlog(&tx, entry)?;
        tx.commit()?;
        Ok(id)
    }

    fn append_revlog_entry(&mut self, entry: &RevlogEntry) -> Result<RevlogId> {
        Ok(write_revlog(&self.conn, entry)?)
    }

    fn remove_revlog_entry(&mut self, id: RevlogId) -> Result<()> {
        self.conn
            .execute("DELETE FROM revlog WHERE id = ?1", [id.0])?;
        Ok(())
    }

    fn revlog_for_card(&self, card_id: CardId) -> Result<Vec<RevlogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REVLOG_COLUMNS} FROM revlog WHERE card_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([card_id.0], revlog_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(mut entry, ease, kind)| -> Result<RevlogEntry> {
                let corrupt = |message: String| DatabaseError::Corrupt {
                    table: "revlog",
                    message,
                };
                entry.ease = Ease::try_from(ease)
                    .map_err(|_| corrupt(format!("row {} has ease {ease}", entry.id.0)))?;
                entry.kind = RevlogKind::from_i32(kind)
                    .ok_or_else(|| corrupt(format!("row {} has kind {kind}", entry.id.0)))?;
                Ok(entry)
            })
            .collect()
    }

    fn query_cards_by_deck_and_queue(&self, query: &CardQuery) -> Result<Vec<Card>> {
        let mut clauses = Vec::new();
        let mut args: Vec<i64> = Vec::new();
        if !query.decks.is_empty() {
            let marks = vec!["?"; query.decks.len()].join(", ");
            clauses.push(format!("deck_id IN ({marks})"));
            args.extend(query.decks.iter().map(|d| d.0));
        }
        if !query.queues.is_empty() {
            let marks = vec!["?"; query.queues.len()].join(", ");
            clauses.push(format!("queue IN ({marks})"));
            args.extend(query.queues.iter().map(|q| i64::from(q.as_i32())));
        }
        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards {filter} ORDER BY id");
        self.query_cards(&sql, &args)
    }

    fn cards_of_note(&self, note_id: NoteId) -> Result<Vec<Card>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE note_id = ?1 ORDER BY id");
        self.query_cards(&sql, &[note_id.0])
    }

    fn max_new_position(&self) -> Result<i32> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(CASE WHEN original_due_kind = 'ordinal' THEN original_due ELSE due END)
             FROM cards
             WHERE ctype = 0 AND (due_kind = 'ordinal' OR original_due_kind = 'ordinal')",
            [],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0).clamp(0, i64::from(i32::MAX)) as i32)
    }

    fn get_deck(&self, id: DeckId) -> Result<Option<Deck>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, kind, today FROM decks WHERE id = ?1",
                [id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, name, kind, today)| deck_from_parts(id, name, &kind, &today))
            .transpose()
    }

    fn all_decks(&self) -> Result<Vec<Deck>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, kind, today FROM decks ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, name, kind, today)| deck_from_parts(id, name, &kind, &today))
            .collect()
    }

    fn save_deck(&mut self, deck: &Deck) -> Result<()> {
        write_deck(&self.conn, deck)
    }

    fn insert_deck(&mut self, name: &str, kind: DeckKind) -> Result<DeckId> {
        self.conn.execute(
            "INSERT INTO decks (name, kind, today) VALUES (?1, ?2, ?3)",
            params![
                name,
                serde_json::to_string(&kind)?,
                serde_json::to_string(&DayCounts::default())?,
            ],
        )?;
        Ok(DeckId(self.conn.last_insert_rowid()))
    }

    fn get_deck_config(&self, id: ConfigId) -> Result<Option<DeckConfig>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT config FROM deck_configs WHERE id = ?1",
                [id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    fn all_deck_configs(&self) -> Result<Vec<DeckConfig>> {
        let mut stmt = self
            .conn
            .prepare("SELECT config FROM deck_configs ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.iter()
            .map(|s| serde_json::from_str(s).map_err(Into::into))
            .collect()
    }

    fn save_deck_config(&mut self, conf: &DeckConfig) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO deck_configs (id, config) VALUES (?1, ?2)",
            params![conf.id.0, serde_json::to_string(conf)?],
        )?;
        Ok(())
    }

    fn collection(&self) -> Result<CollectionState> {
        let raw = self
            .kv_get(COLLECTION_KEY)?
            .ok_or_else(|| DatabaseError::Corrupt {
                table: "kv",
                message: "collection state missing".into(),
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save_collection(&mut self, state: &CollectionState) -> Result<()> {
        self.kv_set(COLLECTION_KEY, &serde_json::to_string(state)?)
    }
}
