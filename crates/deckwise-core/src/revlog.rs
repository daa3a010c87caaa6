//! Review log rows, one per answer.

use serde::{Deserialize, Serialize};

use crate::card::{CardId, Ease};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevlogId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevlogKind {
    Learning,
    Review,
    Relearning,
    /// Early review inside a filtered deck.
    Filtered,
}

impl RevlogKind {
    pub fn as_i32(self) -> i32 {
        match self {
            RevlogKind::Learning => 0,
            RevlogKind::Review => 1,
            RevlogKind::Relearning => 2,
            RevlogKind::Filtered => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(RevlogKind::Learning),
            1 => Some(RevlogKind::Review),
            2 => Some(RevlogKind::Relearning),
            3 => Some(RevlogKind::Filtered),
            _ => None,
        }
    }
}

/// Intervals are days when positive and seconds when negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevlogEntry {
    /// Assigned by the store; zero until recorded.
    pub id: RevlogId,
    pub timestamp_ms: i64,
    pub card_id: CardId,
    pub ease: Ease,
    pub interval: i64,
    pub last_interval: i64,
    pub factor: u32,
    pub time_taken_ms: i64,
    pub kind: RevlogKind,
}
