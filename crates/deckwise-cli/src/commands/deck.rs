use clap::Subcommand;
use deckwise_core::{ConfigId, DeckConfig, DeckDueNode, DeckKind, Store};

use super::{open_scheduler, resolve_deck, CliResult};

#[derive(Subcommand)]
pub enum DeckAction {
    /// Create a deck. `::` separates levels; missing parents are created.
    Add {
        name: String,
        /// Options group for the new deck
        #[arg(long, default_value_t = 1)]
        config: i64,
    },
    /// List all decks
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show due counts for every deck
    Tree {
        #[arg(long)]
        json: bool,
    },
    /// Print the options a deck uses
    Config {
        /// Deck name or id
        deck: String,
    },
    /// Change one option, e.g. `new.per_day 30` or `new.delays [1,10,60]`
    SetConfig {
        deck: String,
        key: String,
        value: String,
    },
    /// Point a deck at another options group, creating it if needed
    UseConfig { deck: String, config_id: i64 },
    /// Replace a deck's options with ones read from a TOML file
    ImportConfig {
        deck: String,
        file: std::path::PathBuf,
    },
}

pub fn run(action: DeckAction) -> CliResult {
    let mut sched = open_scheduler()?;
    match action {
        DeckAction::Add { name, config } => {
            let config_id = ConfigId(config);
            if sched.store().get_deck_config(config_id)?.is_none() {
                return Err(format!("options group {config_id} does not exist").into());
            }
            let id = sched
                .store_mut()
                .add_deck(&name, DeckKind::Normal { config_id })?;
            println!("{id}");
        }
        DeckAction::List { json } => {
            let decks = sched.store().all_decks()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&decks)?);
            } else {
                for deck in decks {
                    let kind = match &deck.kind {
                        DeckKind::Normal { config_id } => format!("options {config_id}"),
                        DeckKind::Filtered(_) => "filtered".to_string(),
                    };
                    println!("{:>6}  {}  ({kind})", deck.id, deck.name);
                }
            }
        }
        DeckAction::Tree { json } => {
            let tree = sched.deck_due_tree()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                print_tree(&tree, 0);
            }
        }
        DeckAction::Config { deck } => {
            let deck = resolve_deck(sched.store(), &deck)?;
            let conf = sched.store().config_for_deck(deck.id)?;
            println!("{}", serde_json::to_string_pretty(&conf)?);
        }
        DeckAction::SetConfig { deck, key, value } => {
            let deck = resolve_deck(sched.store(), &deck)?;
            let conf = sched.store().config_for_deck(deck.id)?;
            let updated = set_option(&conf, &key, &value)?;
            sched.store_mut().save_deck_config(&updated)?;
            println!("ok");
        }
        DeckAction::UseConfig { deck, config_id } => {
            let mut deck = resolve_deck(sched.store(), &deck)?;
            let config_id = ConfigId(config_id);
            if !matches!(deck.kind, DeckKind::Normal { .. }) {
                return Err(format!("{} is a filtered deck", deck.name).into());
            }
            if sched.store().get_deck_config(config_id)?.is_none() {
                sched
                    .store_mut()
                    .save_deck_config(&DeckConfig::with_id(config_id))?;
            }
            deck.kind = DeckKind::Normal { config_id };
            sched.store_mut().save_deck(&deck)?;
            println!("ok");
        }
        DeckAction::ImportConfig { deck, file } => {
            let deck = resolve_deck(sched.store(), &deck)?;
            let config_id = deck
                .config_id()
                .ok_or_else(|| format!("{} is a filtered deck", deck.name))?;
            let input = std::fs::read_to_string(&file)?;
            let conf = DeckConfig::from_toml_str(config_id, &input)?;
            sched.store_mut().save_deck_config(&conf)?;
            println!("ok");
        }
    }
    Ok(())
}

fn print_tree(nodes: &[DeckDueNode], depth: usize) {
    for node in nodes {
        println!(
            "{:indent$}{:<width$} {:>4} {:>4} {:>4}",
            "",
            node.name,
            node.new,
            node.learn,
            node.review,
            indent = depth * 2,
            width = 30usize.saturating_sub(depth * 2),
        );
        print_tree(&node.children, depth + 1);
    }
}

/// Set a dotted key on the JSON form of `conf`. The value is read as JSON
/// when it parses, so numbers, booleans and lists work unquoted.
fn set_option(conf: &DeckConfig, key: &str, value: &str) -> CliResult<DeckConfig> {
    let mut json = serde_json::to_value(conf)?;
    if key == "id" {
        return Err("the id of an options group cannot be changed".into());
    }
    let mut current = &mut json;
    for part in key.split('.') {
        current = current
            .get_mut(part)
            .ok_or_else(|| format!("unknown key: {key}"))?;
    }
    *current = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    let updated: DeckConfig =
        serde_json::from_value(json).map_err(|e| format!("invalid value for {key}: {e}"))?;
    updated.validate()?;
    Ok(updated)
}
