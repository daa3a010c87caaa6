use clap::{Subcommand, ValueEnum};
use deckwise_core::{
    BasicSearch, DeckKind, FilterOrder, FilterTerm, FilteredDeck, SchedulerSession, Store,
};

use super::{open_scheduler, resolve_deck, CliResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum Order {
    Oldest,
    Random,
    IntervalsAscending,
    IntervalsDescending,
    MostLapses,
    Added,
    Due,
}

impl From<Order> for FilterOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Oldest => FilterOrder::Oldest,
            Order::Random => FilterOrder::Random,
            Order::IntervalsAscending => FilterOrder::IntervalsAscending,
            Order::IntervalsDescending => FilterOrder::IntervalsDescending,
            Order::MostLapses => FilterOrder::MostLapses,
            Order::Added => FilterOrder::Added,
            Order::Due => FilterOrder::Due,
        }
    }
}

#[derive(Subcommand)]
pub enum FilteredAction {
    /// Create a filtered deck and fill it
    Create {
        name: String,
        /// Search term, e.g. "deck:Spanish is:due". Repeat for more terms.
        #[arg(long = "search", default_value = "")]
        searches: Vec<String>,
        /// Cards taken per term
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = Order::Due)]
        order: Order,
        /// Preview only; answers leave scheduling untouched
        #[arg(long)]
        no_reschedule: bool,
        /// Minutes before a previewed card is shown again
        #[arg(long, default_value_t = 10)]
        preview_delay: u32,
    },
    /// Empty and refill a filtered deck
    Rebuild { deck: String },
    /// Send every card in a filtered deck home
    Empty { deck: String },
}

pub fn run(action: FilteredAction) -> CliResult {
    let mut sched = open_scheduler()?;
    let mut session = SchedulerSession::new();
    match action {
        FilteredAction::Create {
            name,
            searches,
            limit,
            order,
            no_reschedule,
            preview_delay,
        } => {
            for search in &searches {
                BasicSearch::validate(search)?;
            }
            let filter = FilteredDeck {
                terms: searches
                    .into_iter()
                    .map(|search| FilterTerm {
                        search,
                        limit,
                        order: order.into(),
                    })
                    .collect(),
                reschedule: !no_reschedule,
                preview_delay_mins: preview_delay,
            };
            let id = sched
                .store_mut()
                .add_deck(&name, DeckKind::Filtered(filter))?;
            let moved = sched.rebuild_dyn(&mut session, id, &BasicSearch::new())?;
            println!("{id}: {moved} cards");
        }
        FilteredAction::Rebuild { deck } => {
            let deck = resolve_deck(sched.store(), &deck)?;
            let moved = sched.rebuild_dyn(&mut session, deck.id, &BasicSearch::new())?;
            println!("{moved} cards");
        }
        FilteredAction::Empty { deck } => {
            let deck = resolve_deck(sched.store(), &deck)?;
            let returned = sched.empty_dyn(&mut session, deck.id)?;
            println!("{returned} cards returned");
        }
    }
    Ok(())
}
