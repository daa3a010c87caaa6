//! Card model.
//!
//! A card is classified twice: its [`CardType`] records where it is in its
//! learning life, its [`CardQueue`] records how it is currently scheduled
//! (including the suspend/bury overlays). The meaning of `due` depends on the
//! queue, so it is kept as a tagged [`Due`] and only flattened to an integer
//! at the storage boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::deck::DeckId;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub i64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cards sharing a note are siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardType {
    pub fn as_i32(self) -> i32 {
        match self {
            CardType::New => 0,
            CardType::Learning => 1,
            CardType::Review => 2,
            CardType::Relearning => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(CardType::New),
            1 => Some(CardType::Learning),
            2 => Some(CardType::Review),
            3 => Some(CardType::Relearning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardQueue {
    New,
    /// Intraday learning, due is a timestamp.
    Learning,
    Review,
    /// Learning step that spilled past the day cutoff, due is a day number.
    DayLearnRelearn,
    /// Preview in a filtered deck that does not reschedule.
    PreviewRepeat,
    SuspendedBySystem,
    SiblingBuried,
    ManuallyBuried,
}

impl CardQueue {
    pub fn as_i32(self) -> i32 {
        match self {
            CardQueue::New => 0,
            CardQueue::Learning => 1,
            CardQueue::Review => 2,
            CardQueue::DayLearnRelearn => 3,
            CardQueue::PreviewRepeat => 4,
            CardQueue::SuspendedBySystem => -1,
            CardQueue::SiblingBuried => -2,
            CardQueue::ManuallyBuried => -3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(CardQueue::New),
            1 => Some(CardQueue::Learning),
            2 => Some(CardQueue::Review),
            3 => Some(CardQueue::DayLearnRelearn),
            4 => Some(CardQueue::PreviewRepeat),
            -1 => Some(CardQueue::SuspendedBySystem),
            -2 => Some(CardQueue::SiblingBuried),
            -3 => Some(CardQueue::ManuallyBuried),
            _ => None,
        }
    }

    pub fn is_buried(self) -> bool {
        matches!(self, CardQueue::SiblingBuried | CardQueue::ManuallyBuried)
    }

    /// Suspended or buried: never handed out until released.
    pub fn is_overlay(self) -> bool {
        self == CardQueue::SuspendedBySystem || self.is_buried()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueKind {
    Ordinal,
    Timestamp,
    DayNumber,
}

impl DueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DueKind::Ordinal => "ordinal",
            DueKind::Timestamp => "timestamp",
            DueKind::DayNumber => "day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ordinal" => Some(DueKind::Ordinal),
            "timestamp" => Some(DueKind::Timestamp),
            "day" => Some(DueKind::DayNumber),
            _ => None,
        }
    }
}

/// When a card is next due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Due {
    /// Position among new cards.
    Ordinal(i32),
    /// Unix seconds.
    Timestamp(i64),
    /// Days since the collection was created.
    DayNumber(i32),
}

impl Due {
    pub fn kind(self) -> DueKind {
        match self {
            Due::Ordinal(_) => DueKind::Ordinal,
            Due::Timestamp(_) => DueKind::Timestamp,
            Due::DayNumber(_) => DueKind::DayNumber,
        }
    }

    pub fn raw(self) -> i64 {
        match self {
            Due::Ordinal(n) | Due::DayNumber(n) => i64::from(n),
            Due::Timestamp(ts) => ts,
        }
    }

    pub fn from_raw(kind: DueKind, raw: i64) -> Self {
        match kind {
            DueKind::Ordinal => Due::Ordinal(clamp_i32(raw)),
            DueKind::Timestamp => Due::Timestamp(raw),
            DueKind::DayNumber => Due::DayNumber(clamp_i32(raw)),
        }
    }
}

fn clamp_i32(raw: i64) -> i32 {
    raw.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

impl fmt::Display for Due {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Due::Ordinal(n) => write!(f, "#{n}"),
            Due::Timestamp(ts) => write!(f, "@{ts}"),
            Due::DayNumber(d) => write!(f, "day {d}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    /// Home deck while the card sits in a filtered deck.
    pub original_deck_id: Option<DeckId>,
    pub ctype: CardType,
    pub queue: CardQueue,
    pub due: Due,
    /// Due before the card was moved into a filtered deck.
    pub original_due: Option<Due>,
    /// Days.
    pub interval: u32,
    /// Ease in permille.
    pub factor: u32,
    pub reps: u32,
    pub lapses: u32,
    /// `steps_today * 1000 + steps_remaining`.
    pub left: u32,
}

impl Card {
    /// A fresh new card at the given position.
    pub fn new(id: CardId, note_id: NoteId, deck_id: DeckId, position: i32) -> Self {
        Self {
            id,
            note_id,
            deck_id,
            original_deck_id: None,
            ctype: CardType::New,
            queue: CardQueue::New,
            due: Due::Ordinal(position),
            original_due: None,
            interval: 0,
            factor: 0,
            reps: 0,
            lapses: 0,
            left: 0,
        }
    }

    pub fn in_filtered_deck(&self) -> bool {
        self.original_deck_id.is_some()
    }

    /// Deck whose configuration governs this card.
    pub fn home_deck(&self) -> DeckId {
        self.original_deck_id.unwrap_or(self.deck_id)
    }

    pub fn steps_today(&self) -> u32 {
        self.left / 1000
    }

    pub fn steps_remaining(&self) -> u32 {
        self.left % 1000
    }

    /// The queue a card belongs in once no overlay or preview applies.
    pub fn natural_queue(&self) -> CardQueue {
        match self.ctype {
            CardType::New => CardQueue::New,
            CardType::Review => CardQueue::Review,
            CardType::Learning | CardType::Relearning => match self.due {
                Due::Timestamp(_) => CardQueue::Learning,
                _ => CardQueue::DayLearnRelearn,
            },
        }
    }

    /// Day number this card is due on, for review-type dues.
    pub fn due_day(&self) -> Option<i32> {
        match self.due {
            Due::DayNumber(d) => Some(d),
            _ => None,
        }
    }

    /// In the review queue and due by `today`. New cards borrowed by a
    /// preview deck sit in the review queue with their position as due.
    pub fn is_due_review(&self, today: i32) -> bool {
        if self.queue != CardQueue::Review {
            return false;
        }
        match self.due {
            Due::DayNumber(d) => d <= today,
            Due::Ordinal(_) => self.in_filtered_deck(),
            Due::Timestamp(_) => false,
        }
    }
}

/// Answer grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Ease {
    pub const ALL: [Ease; 4] = [Ease::Again, Ease::Hard, Ease::Good, Ease::Easy];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Ease {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Ease::Again),
            2 => Ok(Ease::Hard),
            3 => Ok(Ease::Good),
            4 => Ok(Ease::Easy),
            other => Err(ValidationError::InvalidEase(other)),
        }
    }
}

impl fmt::Display for Ease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Ease::Again => "again",
            Ease::Hard => "hard",
            Ease::Good => "good",
            Ease::Easy => "easy",
        };
        f.write_str(label)
    }
}
