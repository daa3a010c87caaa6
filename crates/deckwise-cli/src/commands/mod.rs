pub mod card;
pub mod config;
pub mod deck;
pub mod filtered;
pub mod review;

use std::error::Error;

use deckwise_core::{CardId, Config, Deck, Ease, Scheduler, SqliteStore, Store, SystemClock};

pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// Open the collection the CLI config points at.
pub fn open_scheduler() -> CliResult<Scheduler<SqliteStore>> {
    Ok(open_with_config()?.1)
}

pub fn open_with_config() -> CliResult<(Config, Scheduler<SqliteStore>)> {
    let config = Config::load()?;
    let store = SqliteStore::open(config.database_path()?)?;
    let sched = match config.review.seed {
        Some(seed) => Scheduler::with_seed(store, SystemClock, seed),
        None => Scheduler::new(store, SystemClock),
    };
    Ok((config, sched))
}

/// Find a deck by full name, or by numeric id.
pub fn resolve_deck<S: Store>(store: &S, name_or_id: &str) -> CliResult<Deck> {
    if let Some(deck) = store.deck_by_name(name_or_id)? {
        return Ok(deck);
    }
    if let Ok(id) = name_or_id.parse::<i64>() {
        if let Some(deck) = store.get_deck(deckwise_core::DeckId(id))? {
            return Ok(deck);
        }
    }
    Err(format!("deck not found: {name_or_id}").into())
}

pub fn card_ids(ids: &[i64]) -> Vec<CardId> {
    ids.iter().copied().map(CardId).collect()
}

/// Accepts `1`-`4` or `again`, `hard`, `good`, `easy`.
pub fn parse_ease(s: &str) -> Result<Ease, String> {
    match s.to_ascii_lowercase().as_str() {
        "again" => Ok(Ease::Again),
        "hard" => Ok(Ease::Hard),
        "good" => Ok(Ease::Good),
        "easy" => Ok(Ease::Easy),
        other => other
            .parse::<u8>()
            .map_err(|_| format!("invalid ease '{s}'"))
            .and_then(|n| Ease::try_from(n).map_err(|e| e.to_string())),
    }
}

/// Short human form of a delay in seconds: `45s`, `10m`, `3h`, `12d`.
pub fn format_secs(secs: u64) -> String {
    match secs {
        0 => "now".to_string(),
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_accepts_names_and_numbers() {
        assert_eq!(parse_ease("3"), Ok(Ease::Good));
        assert_eq!(parse_ease("Again"), Ok(Ease::Again));
        assert!(parse_ease("5").is_err());
        assert!(parse_ease("meh").is_err());
    }

    #[test]
    fn secs_are_shortened() {
        assert_eq!(format_secs(0), "now");
        assert_eq!(format_secs(30), "30s");
        assert_eq!(format_secs(600), "10m");
        assert_eq!(format_secs(7_200), "2h");
        assert_eq!(format_secs(187 * 86_400), "187d");
    }
}
