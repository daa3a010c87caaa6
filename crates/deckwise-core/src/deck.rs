//! Decks and the deck hierarchy.
//!
//! Hierarchy lives entirely in names: `Languages::Japanese::Kanji` is a child
//! of `Languages::Japanese`. [`DeckIndex`] resolves parents, children and the
//! display order once per operation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const SEPARATOR: &str = "::";

/// Limit used for filtered decks, which have no daily quota.
pub const FILTERED_DECK_LIMIT: i64 = 99_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckId(pub i64);

impl DeckId {
    pub const DEFAULT: DeckId = DeckId(1);
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(pub i64);

impl ConfigId {
    pub const DEFAULT: ConfigId = ConfigId(1);
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A counter that only counts for the day it was last touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    pub day: i32,
    pub count: i64,
}

impl DayCount {
    pub fn on(&self, today: i32) -> i64 {
        if self.day == today {
            self.count
        } else {
            0
        }
    }

    pub fn add(&mut self, today: i32, amount: i64) {
        if self.day != today {
            self.day = today;
            self.count = 0;
        }
        self.count += amount;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCounts {
    #[serde(default)]
    pub new: DayCount,
    #[serde(default)]
    pub review: DayCount,
    #[serde(default)]
    pub learn: DayCount,
    #[serde(default)]
    pub time_ms: DayCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOrder {
    Oldest,
    Random,
    IntervalsAscending,
    IntervalsDescending,
    MostLapses,
    Added,
    Due,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTerm {
    pub search: String,
    pub limit: usize,
    pub order: FilterOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredDeck {
    pub terms: Vec<FilterTerm>,
    /// When false, answers are previews and leave scheduling untouched.
    pub reschedule: bool,
    pub preview_delay_mins: u32,
}

impl Default for FilteredDeck {
    fn default() -> Self {
        Self {
            terms: vec![FilterTerm {
                search: String::new(),
                limit: 100,
                order: FilterOrder::Due,
            }],
            reschedule: true,
            preview_delay_mins: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeckKind {
    Normal { config_id: ConfigId },
    Filtered(FilteredDeck),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    pub kind: DeckKind,
    #[serde(default)]
    pub today: DayCounts,
}

impl Deck {
    pub fn normal(id: DeckId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: DeckKind::Normal {
                config_id: ConfigId::DEFAULT,
            },
            today: DayCounts::default(),
        }
    }

    pub fn filtered(id: DeckId, name: impl Into<String>, filter: FilteredDeck) -> Self {
        Self {
            id,
            name: name.into(),
            kind: DeckKind::Filtered(filter),
            today: DayCounts::default(),
        }
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self.kind, DeckKind::Filtered(_))
    }

    pub fn config_id(&self) -> Option<ConfigId> {
        match self.kind {
            DeckKind::Normal { config_id } => Some(config_id),
            DeckKind::Filtered(_) => None,
        }
    }

    pub fn filter(&self) -> Option<&FilteredDeck> {
        match &self.kind {
            DeckKind::Filtered(filter) => Some(filter),
            DeckKind::Normal { .. } => None,
        }
    }

    pub fn leaf_name(&self) -> &str {
        leaf_name(&self.name)
    }
}

pub fn name_components(name: &str) -> impl Iterator<Item = &str> {
    name.split(SEPARATOR)
}

pub fn parent_name(name: &str) -> Option<&str> {
    name.rfind(SEPARATOR).map(|idx| &name[..idx])
}

pub fn leaf_name(name: &str) -> &str {
    name.rfind(SEPARATOR)
        .map_or(name, |idx| &name[idx + SEPARATOR.len()..])
}

/// Whether `name` lies strictly below `ancestor`.
pub fn is_descendant_name(name: &str, ancestor: &str) -> bool {
    name.len() > ancestor.len() + SEPARATOR.len()
        && name.starts_with(ancestor)
        && name[ancestor.len()..].starts_with(SEPARATOR)
}

/// Trim each component and reject empty ones.
pub fn normalize_name(name: &str) -> Result<String, ValidationError> {
    let parts: Vec<&str> = name_components(name).map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ValidationError::InvalidDeckName(name.to_string()));
    }
    Ok(parts.join(SEPARATOR))
}

/// Component-wise, case-sensitive comparison.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    name_components(a).cmp(name_components(b))
}

/// Snapshot of all decks, sorted for display.
#[derive(Debug, Clone, Default)]
pub struct DeckIndex {
    decks: Vec<Deck>,
    by_id: HashMap<DeckId, usize>,
    by_name: HashMap<String, usize>,
}

impl DeckIndex {
    /// The Default deck and its subtree sort first, then the rest by name.
    pub fn new(mut decks: Vec<Deck>) -> Self {
        let default_root = decks
            .iter()
            .find(|d| d.id == DeckId::DEFAULT)
            .map(|d| d.name.clone());
        let in_default = |name: &str| match &default_root {
            Some(root) => name == root || is_descendant_name(name, root),
            None => false,
        };
        decks.sort_by(|a, b| {
            in_default(&b.name)
                .cmp(&in_default(&a.name))
                .then_with(|| compare_names(&a.name, &b.name))
        });

        let by_id = decks.iter().enumerate().map(|(i, d)| (d.id, i)).collect();
        let by_name = decks
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        Self {
            decks,
            by_id,
            by_name,
        }
    }

    pub fn sorted(&self) -> &[Deck] {
        &self.decks
    }

    pub fn get(&self, id: DeckId) -> Option<&Deck> {
        self.by_id.get(&id).map(|&i| &self.decks[i])
    }

    pub fn by_name(&self, name: &str) -> Option<&Deck> {
        self.by_name.get(name).map(|&i| &self.decks[i])
    }

    /// Existing ancestors, root first.
    pub fn parents(&self, id: DeckId) -> Vec<&Deck> {
        let Some(deck) = self.get(id) else {
            return Vec::new();
        };
        let mut chain = Vec::new();
        let mut name = deck.name.as_str();
        while let Some(parent) = parent_name(name) {
            if let Some(found) = self.by_name(parent) {
                chain.push(found);
            }
            name = parent;
        }
        chain.reverse();
        chain
    }

    pub fn parent(&self, id: DeckId) -> Option<&Deck> {
        let deck = self.get(id)?;
        let mut name = deck.name.as_str();
        while let Some(parent) = parent_name(name) {
            if let Some(found) = self.by_name(parent) {
                return Some(found);
            }
            name = parent;
        }
        None
    }

    /// The deck followed by its existing ancestors, nearest first.
    pub fn self_and_parents(&self, id: DeckId) -> Vec<DeckId> {
        let mut ids = vec![id];
        ids.extend(self.parents(id).iter().rev().map(|d| d.id));
        ids
    }

    /// All decks below `id`, in display order.
    pub fn descendants(&self, id: DeckId) -> Vec<&Deck> {
        let Some(deck) = self.get(id) else {
            return Vec::new();
        };
        self.decks
            .iter()
            .filter(|d| is_descendant_name(&d.name, &deck.name))
            .collect()
    }

    /// Decks whose nearest existing ancestor is `id`.
    pub fn children(&self, id: DeckId) -> Vec<&Deck> {
        self.descendants(id)
            .into_iter()
            .filter(|d| self.parent(d.id).map(|p| p.id) == Some(id))
            .collect()
    }

    /// Decks without an existing ancestor.
    pub fn roots(&self) -> Vec<&Deck> {
        self.decks
            .iter()
            .filter(|d| self.parent(d.id).is_none())
            .collect()
    }

    /// The deck plus its descendants in display order. A filtered deck is
    /// studied on its own.
    pub fn active_decks(&self, id: DeckId) -> Vec<DeckId> {
        let Some(deck) = self.get(id) else {
            return Vec::new();
        };
        let mut ids = vec![id];
        if !deck.is_filtered() {
            ids.extend(self.descendants(id).iter().map(|d| d.id));
        }
        ids
    }
}
