use sqlx::Row;
use study_core::model::{Deck, DeckId, LearnerId};

use super::SqliteRepository;
use super::mapping::{index_to_i64, map_card_row, map_progress_row, ser};
use crate::repository::{DeckPayload, DeckRepository, StorageError};

#[async_trait::async_trait]
impl DeckRepository for SqliteRepository {
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO decks (id, title)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(deck.id().as_str())
        .bind(deck.title())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        // The card list is replaced wholesale so positions always match the deck order.
        sqlx::query("DELETE FROM cards WHERE deck_id = ?1")
            .bind(deck.id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (position, card) in deck.cards().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO cards (deck_id, id, position, question, answer)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(deck.id().as_str())
            .bind(card.id().as_str())
            .bind(index_to_i64("position", position)?)
            .bind(card.question())
            .bind(card.answer())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn fetch_deck(
        &self,
        learner: &LearnerId,
        deck_id: &DeckId,
    ) -> Result<DeckPayload, StorageError> {
        let deck_row = sqlx::query("SELECT id, title FROM decks WHERE id = ?1")
            .bind(deck_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;
        let title: Option<String> = deck_row.try_get("title").map_err(ser)?;

        let rows = sqlx::query(
            r"
            SELECT id, question, answer
            FROM cards
            WHERE deck_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(deck_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in rows {
            cards.push(map_card_row(&row)?);
        }
        let deck = Deck::new(deck_id.clone(), title, cards).map_err(ser)?;

        let progress_row = sqlx::query(
            r"
            SELECT deck_id, current_index, learned_set, review_set, mode, updated_at
            FROM study_progress
            WHERE learner_id = ?1 AND deck_id = ?2
            ",
        )
        .bind(learner.as_str())
        .bind(deck_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let study_progress = progress_row.as_ref().map(map_progress_row).transpose()?;

        Ok(DeckPayload {
            deck,
            study_progress,
        })
    }
}
