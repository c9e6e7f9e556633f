use std::collections::HashSet;

use thiserror::Error;

use crate::model::card::Card;
use crate::model::ids::{CardId, DeckId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeckError {
    #[error("index {index} is out of range for a deck of {size} cards")]
    OutOfRange { index: usize, size: usize },

    #[error("card {0} appears more than once in the deck")]
    DuplicateCard(CardId),
}

//
// ─── DECK ──────────────────────────────────────────────────────────────────────
//

/// The fixed, ordered list of cards studied in one session.
///
/// A deck never changes after construction. Re-fetching a deck produces a new
/// value; sessions hold onto the one they were opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    id: DeckId,
    title: Option<String>,
    cards: Vec<Card>,
}

impl Deck {
    /// Creates a deck from an ordered list of cards.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::DuplicateCard` if two cards share an id.
    pub fn new(id: DeckId, title: Option<String>, cards: Vec<Card>) -> Result<Self, DeckError> {
        let mut seen = HashSet::with_capacity(cards.len());
        for card in &cards {
            if !seen.insert(card.id()) {
                return Err(DeckError::DuplicateCard(card.id().clone()));
            }
        }

        let title = title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());

        Ok(Self { id, title, cards })
    }

    /// A deck with no cards. Sessions over it only ever show "no cards".
    #[must_use]
    pub fn empty(id: DeckId) -> Self {
        Self {
            id,
            title: None,
            cards: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DeckId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Returns the card at `index`.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::OutOfRange` when `index >= size()`.
    pub fn card_at(&self, index: usize) -> Result<&Card, DeckError> {
        self.cards.get(index).ok_or(DeckError::OutOfRange {
            index,
            size: self.cards.len(),
        })
    }

    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    #[must_use]
    pub fn position_of(&self, card_id: &CardId) -> Option<usize> {
        self.cards.iter().position(|c| c.id() == card_id)
    }

    #[must_use]
    pub fn contains(&self, card_id: &CardId) -> bool {
        self.position_of(card_id).is_some()
    }

    pub fn card_ids(&self) -> impl Iterator<Item = &CardId> {
        self.cards.iter().map(Card::id)
    }
}
