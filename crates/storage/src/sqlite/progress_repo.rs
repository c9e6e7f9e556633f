use study_core::model::{DeckId, LearnerId, ProgressSnapshot};

use super::SqliteRepository;
use super::mapping::{encode_set, index_to_i64, map_progress_row};
use crate::repository::{RemoteProgress, StorageError};

#[async_trait::async_trait]
impl RemoteProgress for SqliteRepository {
    async fn fetch_progress(
        &self,
        learner: &LearnerId,
        deck_id: &DeckId,
    ) -> Result<Option<ProgressSnapshot>, StorageError> {
        let row = sqlx::query(
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

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn write_progress(
        &self,
        learner: &LearnerId,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO study_progress (
                learner_id, deck_id, current_index, learned_set, review_set, mode, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(learner_id, deck_id) DO UPDATE SET
                current_index = excluded.current_index,
                learned_set = excluded.learned_set,
                review_set = excluded.review_set,
                mode = excluded.mode,
                updated_at = excluded.updated_at
            ",
        )
        .bind(learner.as_str())
        .bind(snapshot.deck_id.as_str())
        .bind(index_to_i64("current_index", snapshot.current_index)?)
        .bind(encode_set(&snapshot.learned_set)?)
        .bind(encode_set(&snapshot.review_set)?)
        .bind(snapshot.mode.as_str())
        .bind(snapshot.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
