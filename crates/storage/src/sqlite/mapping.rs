use std::collections::BTreeSet;

use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use study_core::model::{Card, CardId, DeckId, ProgressSnapshot, SessionMode};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn index_to_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn index_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

/// Card id sets are stored as a JSON array of strings.
pub(crate) fn encode_set(set: &BTreeSet<CardId>) -> Result<String, StorageError> {
    serde_json::to_string(set).map_err(ser)
}

pub(crate) fn decode_set(raw: &str) -> Result<BTreeSet<CardId>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn parse_mode(s: &str) -> Result<SessionMode, StorageError> {
    SessionMode::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid mode: {s}")))
}

pub(crate) fn map_card_row(row: &SqliteRow) -> Result<Card, StorageError> {
    Card::new(
        CardId::new(row.try_get::<String, _>("id").map_err(ser)?),
        row.try_get::<String, _>("question").map_err(ser)?,
        row.try_get::<String, _>("answer").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressSnapshot, StorageError> {
    let learned: String = row.try_get("learned_set").map_err(ser)?;
    let review: String = row.try_get("review_set").map_err(ser)?;
    let mode: String = row.try_get("mode").map_err(ser)?;

    Ok(ProgressSnapshot {
        deck_id: DeckId::new(row.try_get::<String, _>("deck_id").map_err(ser)?),
        current_index: index_from_i64(
            "current_index",
            row.try_get::<i64, _>("current_index").map_err(ser)?,
        )?,
        learned_set: decode_set(&learned)?,
        review_set: decode_set(&review)?,
        mode: parse_mode(&mode)?,
        timestamp: row.try_get("updated_at").map_err(ser)?,
    })
}
