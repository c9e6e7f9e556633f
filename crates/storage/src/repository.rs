use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use study_core::model::{Deck, DeckId, LearnerId, ProgressSnapshot};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// What the deck collaborator hands back: the cards, plus the learner's saved
/// progress when the backend keeps it alongside the deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckPayload {
    pub deck: Deck,
    pub study_progress: Option<ProgressSnapshot>,
}

/// Repository contract for decks.
#[async_trait]
pub trait DeckRepository: Send + Sync {
    /// Persist or replace a deck and its card order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the deck cannot be stored.
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError>;

    /// Fetch a deck for a learner.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn fetch_deck(
        &self,
        learner: &LearnerId,
        deck_id: &DeckId,
    ) -> Result<DeckPayload, StorageError>;
}

/// Remote progress store: one snapshot per learner and deck, overwritten on
/// every successful write.
#[async_trait]
pub trait RemoteProgress: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` when the store cannot be reached or the record is unreadable.
    async fn fetch_progress(
        &self,
        learner: &LearnerId,
        deck_id: &DeckId,
    ) -> Result<Option<ProgressSnapshot>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` when the write does not land.
    async fn write_progress(
        &self,
        learner: &LearnerId,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError>;
}

/// The single local cache slot shared by every session in the process.
///
/// Synchronous on purpose: callers write it inline on every action.
pub trait ProgressCache: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` when the slot cannot be read or decoded.
    fn read(&self) -> Result<Option<ProgressSnapshot>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` when the slot cannot be written.
    fn write(&self, snapshot: &ProgressSnapshot) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` when the slot cannot be removed.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Implements every storage trait. Remote writes are recorded in order so
/// tests can assert on coalescing, and the remote half can be switched off to
/// simulate a flaky connection.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    decks: Arc<Mutex<HashMap<DeckId, Deck>>>,
    progress: Arc<Mutex<HashMap<(LearnerId, DeckId), ProgressSnapshot>>>,
    remote_writes: Arc<Mutex<Vec<ProgressSnapshot>>>,
    cache: Arc<Mutex<Option<ProgressSnapshot>>>,
    remote_down: Arc<AtomicBool>,
    embed_progress: Arc<AtomicBool>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every remote call fail with `StorageError::Unavailable`.
    pub fn set_remote_down(&self, down: bool) {
        self.remote_down.store(down, Ordering::SeqCst);
    }

    /// Makes `fetch_deck` include the learner's saved progress.
    pub fn set_embed_progress(&self, embed: bool) {
        self.embed_progress.store(embed, Ordering::SeqCst);
    }

    /// Every successful remote write, oldest first.
    #[must_use]
    pub fn remote_writes(&self) -> Vec<ProgressSnapshot> {
        self.remote_writes
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn check_remote(&self) -> Result<(), StorageError> {
        if self.remote_down.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("remote store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeckRepository for InMemoryRepository {
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        let mut guard = self
            .decks
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(deck.id().clone(), deck.clone());
        Ok(())
    }

    async fn fetch_deck(
        &self,
        learner: &LearnerId,
        deck_id: &DeckId,
    ) -> Result<DeckPayload, StorageError> {
        self.check_remote()?;
        let deck = {
            let guard = self
                .decks
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.get(deck_id).cloned().ok_or(StorageError::NotFound)?
        };
        let study_progress = if self.embed_progress.load(Ordering::SeqCst) {
            self.fetch_progress(learner, deck_id).await?
        } else {
            None
        };
        Ok(DeckPayload {
            deck,
            study_progress,
        })
    }
}

#[async_trait]
impl RemoteProgress for InMemoryRepository {
    async fn fetch_progress(
        &self,
        learner: &LearnerId,
        deck_id: &DeckId,
    ) -> Result<Option<ProgressSnapshot>, StorageError> {
        self.check_remote()?;
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(learner.clone(), deck_id.clone())).cloned())
    }

    async fn write_progress(
        &self,
        learner: &LearnerId,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError> {
        self.check_remote()?;
        {
            let mut guard = self
                .progress
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.insert(
                (learner.clone(), snapshot.deck_id.clone()),
                snapshot.clone(),
            );
        }
        let mut log = self
            .remote_writes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        log.push(snapshot.clone());
        Ok(())
    }
}

impl ProgressCache for InMemoryRepository {
    fn read(&self) -> Result<Option<ProgressSnapshot>, StorageError> {
        let guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    fn write(&self, snapshot: &ProgressSnapshot) -> Result<(), StorageError> {
        let mut guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Aggregates the deck source and remote progress store behind trait objects
/// for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub decks: Arc<dyn DeckRepository>,
    pub progress: Arc<dyn RemoteProgress>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let decks: Arc<dyn DeckRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn RemoteProgress> = Arc::new(repo);
        Self { decks, progress }
    }
}
