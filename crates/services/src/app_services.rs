use std::sync::Arc;

use async_trait::async_trait;
use storage::local::JsonFileCache;
use storage::repository::{
    DeckPayload, DeckRepository, ProgressCache, RemoteProgress, Storage, StorageError,
};
use study_core::Clock;
use study_core::model::{Card, CardId, Deck, DeckId, LearnerId};

use crate::config::StudyConfig;
use crate::error::AppServicesError;
use crate::http_progress::HttpProgressClient;
use crate::progress::ProgressStore;
use crate::sessions::{SessionHost, SessionObserver};

/// Id of the deck written by `seed_demo_deck`.
pub const DEMO_DECK_ID: &str = "demo";

const DEMO_CARDS: [(&str, &str, &str); 5] = [
    ("c1", "What does `cargo check` do?", "Type-checks the crate without producing a binary."),
    ("c2", "Which trait turns a type into a string for users?", "`Display`."),
    ("c3", "What does the `?` operator do on an `Err`?", "Returns it early, converting via `From`."),
    ("c4", "What is a `Box<dyn Trait>`?", "An owned, heap-allocated trait object."),
    ("c5", "Which keyword moves captured values into a closure?", "`move`."),
];

/// Serves decks without the progress their store keeps next to them.
///
/// Used when progress lives somewhere else, so a stale record in the deck
/// store cannot outrank the configured remote.
struct DecksWithoutProgress(Arc<dyn DeckRepository>);

#[async_trait]
impl DeckRepository for DecksWithoutProgress {
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        self.0.upsert_deck(deck).await
    }

    async fn fetch_deck(
        &self,
        learner: &LearnerId,
        deck_id: &DeckId,
    ) -> Result<DeckPayload, StorageError> {
        let mut payload = self.0.fetch_deck(learner, deck_id).await?;
        payload.study_progress = None;
        Ok(payload)
    }
}

/// Assembles the stores a study session needs from `StudyConfig`.
#[derive(Clone)]
pub struct StudyServices {
    config: StudyConfig,
    clock: Clock,
    decks: Arc<dyn DeckRepository>,
    // True only when the deck store and the remote are the same backend.
    embedded_progress: bool,
    remote: Arc<dyn RemoteProgress>,
    cache: Arc<dyn ProgressCache>,
}

impl StudyServices {
    /// Build services backed by `SQLite`, with progress sent over HTTP when a
    /// remote url is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn connect(config: StudyConfig) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.db_url).await?;
        let shared_backend = config.remote.is_none();
        let remote: Arc<dyn RemoteProgress> = match &config.remote {
            Some(remote) => {
                log::info!("syncing progress with {}", remote.base_url);
                Arc::new(HttpProgressClient::new(remote.clone()))
            }
            None => Arc::clone(&storage.progress),
        };
        let cache: Arc<dyn ProgressCache> = Arc::new(JsonFileCache::new(&config.cache_path));
        Ok(Self::from_parts(config, storage.decks, remote, cache)
            .with_embedded_progress(shared_backend))
    }

    /// Progress attached to fetched decks is ignored unless
    /// `with_embedded_progress(true)` says the deck store is also the remote.
    #[must_use]
    pub fn from_parts(
        config: StudyConfig,
        decks: Arc<dyn DeckRepository>,
        remote: Arc<dyn RemoteProgress>,
        cache: Arc<dyn ProgressCache>,
    ) -> Self {
        Self {
            config,
            clock: Clock::default(),
            decks,
            embedded_progress: false,
            remote,
            cache,
        }
    }

    /// Trusts progress the deck store returns with a deck.
    ///
    /// Only sound when that store is the configured remote; otherwise its copy
    /// may be older than the remote's.
    #[must_use]
    pub fn with_embedded_progress(mut self, enabled: bool) -> Self {
        self.embedded_progress = enabled;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    #[must_use]
    pub fn decks(&self) -> Arc<dyn DeckRepository> {
        if self.embedded_progress {
            Arc::clone(&self.decks)
        } else {
            Arc::new(DecksWithoutProgress(Arc::clone(&self.decks)))
        }
    }

    /// A fresh store for one session, sharing this process's cache slot.
    #[must_use]
    pub fn progress_store(&self) -> ProgressStore {
        ProgressStore::new(
            self.config.learner.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.remote),
        )
        .with_debounce(self.config.debounce)
        .with_clock(self.clock)
    }

    pub async fn open_session(
        &self,
        deck_id: &DeckId,
        observer: Box<dyn SessionObserver>,
    ) -> SessionHost {
        SessionHost::open(
            self.decks().as_ref(),
            deck_id,
            self.progress_store(),
            observer,
            self.clock,
        )
        .await
    }

    /// Writes (or rewrites) the bundled five-card demo deck.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the deck cannot be stored.
    pub async fn seed_demo_deck(&self) -> Result<Deck, AppServicesError> {
        let cards = DEMO_CARDS
            .iter()
            .map(|(id, question, answer)| Card::new(CardId::new(*id), *question, *answer))
            .collect::<Result<Vec<_>, _>>()
            .map_err(study_core::Error::from)?;
        let deck = Deck::new(DeckId::new(DEMO_DECK_ID), Some("Rust basics".into()), cards)
            .map_err(study_core::Error::from)?;
        self.decks.upsert_deck(&deck).await?;
        Ok(deck)
    }
}
