//! Database schema migrations for deckwise.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 for a fresh database.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: cards, decks, deck configs, review log and the kv table.
///
/// `due` and `original_due` are stored as an integer plus a kind tag
/// (`ordinal`, `timestamp`, `day`).
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS cards (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            note_id           INTEGER NOT NULL,
            deck_id           INTEGER NOT NULL,
            original_deck_id  INTEGER,
            ctype             INTEGER NOT NULL,
            queue             INTEGER NOT NULL,
            due               INTEGER NOT NULL,
            due_kind          TEXT NOT NULL,
            original_due      INTEGER,
            original_due_kind TEXT,
            interval          INTEGER NOT NULL DEFAULT 0,
            factor            INTEGER NOT NULL DEFAULT 0,
            reps              INTEGER NOT NULL DEFAULT 0,
            lapses            INTEGER NOT NULL DEFAULT 0,
            left_steps        INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS decks (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            name  TEXT NOT NULL UNIQUE,
            kind  TEXT NOT NULL,
            today TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS deck_configs (
            id     INTEGER PRIMARY KEY,
            config TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS revlog (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id       INTEGER NOT NULL,
            timestamp_ms  INTEGER NOT NULL,
            ease          INTEGER NOT NULL,
            interval      INTEGER NOT NULL,
            last_interval INTEGER NOT NULL,
            factor        INTEGER NOT NULL,
            time_taken_ms INTEGER NOT NULL,
            kind          INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [1])?;
    tx.commit()
}

/// Migration v2: indexes for per-deck queue scans, sibling lookups and
/// per-card review history.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_cards_deck_queue ON cards(deck_id, queue);
         CREATE INDEX IF NOT EXISTS idx_cards_note ON cards(note_id);
         CREATE INDEX IF NOT EXISTS idx_revlog_card ON revlog(card_id);",
    )?;
    set_schema_version(conn, 2)
}
