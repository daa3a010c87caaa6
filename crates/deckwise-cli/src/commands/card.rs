use clap::{Subcommand, ValueEnum};
use deckwise_core::{Card, NoteId, SchedulerSession, Store, UnburyKind};

use super::{card_ids, format_secs, open_scheduler, resolve_deck, CliResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum BuryKind {
    Manual,
    Siblings,
    All,
}

impl From<BuryKind> for UnburyKind {
    fn from(kind: BuryKind) -> Self {
        match kind {
            BuryKind::Manual => UnburyKind::Manual,
            BuryKind::Siblings => UnburyKind::Siblings,
            BuryKind::All => UnburyKind::All,
        }
    }
}

#[derive(Subcommand)]
pub enum CardAction {
    /// Add a new card to a deck
    Add {
        /// Deck name or id
        deck: String,
        /// Note the card belongs to; cards sharing a note are siblings
        #[arg(long)]
        note: Option<i64>,
    },
    /// Show a card and its review history
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Hide cards until tomorrow
    Bury {
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Mark as buried with a sibling instead of by hand
        #[arg(long)]
        sibling: bool,
    },
    /// Release buried cards
    Unbury {
        /// Only this deck and its children
        #[arg(long)]
        deck: Option<String>,
        #[arg(long, value_enum, default_value_t = BuryKind::All)]
        kind: BuryKind,
    },
    Suspend {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    Unsuspend {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Turn cards back into new cards
    Forget {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Make cards due in a random number of days within a range
    Resched {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        min: u32,
        #[arg(long)]
        max: u32,
    },
    /// Renumber a deck's new cards
    Reposition {
        deck: String,
        #[arg(long)]
        random: bool,
    },
    /// Move new cards to the given positions
    Sort {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long, default_value_t = 1)]
        start: i32,
        #[arg(long, default_value_t = 1)]
        step: i32,
        #[arg(long)]
        shuffle: bool,
        /// Move existing cards up to make room
        #[arg(long)]
        shift: bool,
    },
}

pub fn run(action: CardAction) -> CliResult {
    let mut sched = open_scheduler()?;
    let mut session = SchedulerSession::new();
    match action {
        CardAction::Add { deck, note } => {
            let deck = resolve_deck(sched.store(), &deck)?;
            if deck.is_filtered() {
                return Err(format!("cannot add cards to filtered deck {}", deck.name).into());
            }
            let note = NoteId(note.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()));
            let card = sched.store_mut().add_card(note, deck.id)?;
            println!("{}", card.id);
        }
        CardAction::Show { id, json } => {
            let card = sched.store().load_card_required(deckwise_core::CardId(id))?;
            let log = sched.store().revlog_for_card(card.id)?;
            if json {
                let value = serde_json::json!({ "card": card, "revlog": log });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_card(&card);
                for entry in log {
                    let ivl = if entry.interval < 0 {
                        format_secs(entry.interval.unsigned_abs())
                    } else {
                        format!("{}d", entry.interval)
                    };
                    println!("  {:?} {} -> {ivl}", entry.kind, entry.ease);
                }
            }
        }
        CardAction::Bury { ids, sibling } => {
            sched.bury_cards(&mut session, &card_ids(&ids), !sibling)?;
            println!("ok");
        }
        CardAction::Unbury { deck, kind } => {
            let released = match deck {
                Some(deck) => {
                    let deck = resolve_deck(sched.store(), &deck)?;
                    let mut session = SchedulerSession::for_deck(deck.id);
                    sched.unbury_cards_for_deck(&mut session, kind.into())?
                }
                None => sched.unbury_cards(&mut session)?,
            };
            println!("{released} cards released");
        }
        CardAction::Suspend { ids } => {
            sched.suspend_cards(&mut session, &card_ids(&ids))?;
            println!("ok");
        }
        CardAction::Unsuspend { ids } => {
            sched.unsuspend_cards(&mut session, &card_ids(&ids))?;
            println!("ok");
        }
        CardAction::Forget { ids } => {
            sched.forget_cards(&mut session, &card_ids(&ids))?;
            println!("ok");
        }
        CardAction::Resched { ids, min, max } => {
            sched.resched_cards(&mut session, &card_ids(&ids), min, max)?;
            println!("ok");
        }
        CardAction::Reposition { deck, random } => {
            let deck = resolve_deck(sched.store(), &deck)?;
            sched.reposition_new_cards(&mut session, deck.id, random)?;
            println!("ok");
        }
        CardAction::Sort {
            ids,
            start,
            step,
            shuffle,
            shift,
        } => {
            sched.sort_cards(&mut session, &card_ids(&ids), start, step, shuffle, shift)?;
            println!("ok");
        }
    }
    Ok(())
}

pub fn print_card(card: &Card) {
    println!(
        "card {}  note {}  deck {}  {:?}/{:?}  due {}  ivl {}d  ease {}  reps {}  lapses {}",
        card.id,
        card.note_id,
        card.deck_id,
        card.ctype,
        card.queue,
        card.due,
        card.interval,
        card.factor,
        card.reps,
        card.lapses,
    );
}
