use clap::Subcommand;
use deckwise_core::{CardId, Ease, LeechAction, SchedulerSession, SqliteStore, Store};

use super::card::print_card;
use super::{format_secs, open_with_config, parse_ease, resolve_deck, CliResult};

type Scheduler = deckwise_core::Scheduler<SqliteStore>;

#[derive(Subcommand)]
pub enum ReviewAction {
    /// Show the next card to study
    Next {
        /// Deck name or id; defaults to `review.default_deck`
        #[arg(long)]
        deck: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Answer a card
    Answer {
        card_id: i64,
        /// 1-4, or again/hard/good/easy
        #[arg(value_parser = parse_ease)]
        ease: Ease,
    },
    /// Cards left today as new, learning, review
    Counts {
        #[arg(long)]
        deck: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// When a card would come back for each answer
    Intervals { card_id: i64 },
}

fn session_for(sched: &mut Scheduler, deck: &str) -> CliResult<SchedulerSession> {
    let deck = resolve_deck(sched.store(), deck)?;
    let mut session = SchedulerSession::new();
    sched.select_deck(&mut session, deck.id)?;
    Ok(session)
}

fn print_intervals(sched: &Scheduler, card: &deckwise_core::Card) -> CliResult {
    let buttons = sched.answer_buttons(card)?;
    let ivls = sched.next_ivls(card)?;
    let shown: Vec<String> = Ease::ALL
        .iter()
        .zip(ivls)
        .take(buttons as usize)
        .map(|(ease, secs)| format!("{ease}: {}", format_secs(secs)))
        .collect();
    println!("{}", shown.join("  "));
    Ok(())
}

pub fn run(action: ReviewAction) -> CliResult {
    let (config, mut sched) = open_with_config()?;
    match action {
        ReviewAction::Next { deck, json } => {
            let deck = deck.unwrap_or_else(|| config.review.default_deck.clone());
            let mut session = session_for(&mut sched, &deck)?;
            let Some(card) = sched.get_card(&mut session)? else {
                println!("nothing due");
                return Ok(());
            };
            if json {
                let value = serde_json::json!({
                    "card": card,
                    "buttons": sched.answer_buttons(&card)?,
                    "intervals": sched.next_ivls(&card)?,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_card(&card);
                if config.review.show_intervals {
                    print_intervals(&sched, &card)?;
                }
            }
        }
        ReviewAction::Answer { card_id, ease } => {
            let mut card = sched.store().load_card_required(CardId(card_id))?;
            let mut session = SchedulerSession::for_deck(card.deck_id);
            sched.reset(&mut session)?;
            let outcome = sched.answer_card(&mut session, &mut card, ease)?;
            println!("{:?}  due {}  ivl {}d", card.queue, card.due, card.interval);
            if outcome.leech {
                let action = sched.store().config_for_deck(card.home_deck())?.lapse.leech_action;
                match action {
                    LeechAction::Suspend => println!("leech: card suspended"),
                    LeechAction::TagOnly => println!("leech"),
                }
            }
        }
        ReviewAction::Counts { deck, json } => {
            let deck = deck.unwrap_or_else(|| config.review.default_deck.clone());
            let mut session = session_for(&mut sched, &deck)?;
            let (new, learn, review) = sched.counts(&mut session)?;
            if json {
                let value = serde_json::json!({ "new": new, "learn": learn, "review": review });
                println!("{value}");
            } else {
                println!("{new} {learn} {review}");
            }
        }
        ReviewAction::Intervals { card_id } => {
            let card = sched.store().load_card_required(CardId(card_id))?;
            print_intervals(&sched, &card)?;
        }
    }
    Ok(())
}
