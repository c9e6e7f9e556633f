use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CardId, DeckId};

/// Which phase of the sitting the learner is in.
///
/// "Review needed" is not a mode; it is derived from a `Normal` state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Normal,
    Review,
    Completed,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Review => "review",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "review" => Some(Self::Review),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable record of where a learner is in a deck.
///
/// This is the unit written to the local cache and to the remote store. The
/// JSON shape is `{ deckId, currentIndex, learnedSet, reviewSet, mode, timestamp }`
/// with `timestamp` in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub deck_id: DeckId,
    pub current_index: usize,
    #[serde(default)]
    pub learned_set: BTreeSet<CardId>,
    #[serde(default)]
    pub review_set: BTreeSet<CardId>,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// The all-empty snapshot used when nothing was saved for a deck.
    #[must_use]
    pub fn empty(deck_id: DeckId, timestamp: DateTime<Utc>) -> Self {
        Self {
            deck_id,
            current_index: 0,
            learned_set: BTreeSet::new(),
            review_set: BTreeSet::new(),
            mode: SessionMode::Normal,
            timestamp,
        }
    }

    #[must_use]
    pub fn belongs_to(&self, deck_id: &DeckId) -> bool {
        &self.deck_id == deck_id
    }

    /// True when the snapshot records no progress at all.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.current_index == 0
            && self.learned_set.is_empty()
            && self.review_set.is_empty()
            && self.mode == SessionMode::Normal
    }

    /// Compares position, sets and mode while ignoring the timestamp.
    #[must_use]
    pub fn same_progress(&self, other: &Self) -> bool {
        self.deck_id == other.deck_id
            && self.current_index == other.current_index
            && self.learned_set == other.learned_set
            && self.review_set == other.review_set
            && self.mode == other.mode
    }
}
