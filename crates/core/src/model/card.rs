use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::CardId;

//
// ─── CARD VALIDATION ERRORS ────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardError {
    #[error("card question cannot be empty")]
    EmptyQuestion,

    #[error("card answer cannot be empty")]
    EmptyAnswer,
}

//
// ─── CARD ──────────────────────────────────────────────────────────────────────
//

/// A single question/answer pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    id: CardId,
    question: String,
    answer: String,
}

impl Card {
    /// Build a card, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `CardError::EmptyQuestion` or `CardError::EmptyAnswer` when a side is blank.
    pub fn new(
        id: CardId,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<Self, CardError> {
        let question = question.into().trim().to_owned();
        if question.is_empty() {
            return Err(CardError::EmptyQuestion);
        }
        let answer = answer.into().trim().to_owned();
        if answer.is_empty() {
            return Err(CardError::EmptyAnswer);
        }
        Ok(Self {
            id,
            question,
            answer,
        })
    }

    #[must_use]
    pub fn id(&self) -> &CardId {
        &self.id
    }

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }
}
