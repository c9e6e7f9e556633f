use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use storage::repository::{ProgressCache, RemoteProgress};
use study_core::Clock;
use study_core::model::{DeckId, LearnerId, ProgressSnapshot};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::debounce::DebounceTimer;

/// Quiet period before a saved snapshot is sent to the remote store.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    /// Shipped alongside the deck by the deck collaborator.
    Embedded,
    Remote,
    LocalCache,
    /// Nothing usable was found; the snapshot is all-empty.
    Fresh,
}

/// A snapshot plus the place it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedProgress {
    pub snapshot: ProgressSnapshot,
    pub source: ProgressSource,
}

/// Dual-target progress persistence.
///
/// Every save lands in the local cache synchronously; the remote write sits
/// behind a debounce timer so a burst of actions produces one remote write
/// carrying the newest snapshot. Remote failures are logged and dropped: the
/// local cache is the durability guarantee and nothing is retried.
pub struct ProgressStore {
    learner: LearnerId,
    cache: Arc<dyn ProgressCache>,
    remote: Arc<dyn RemoteProgress>,
    clock: Clock,
    debounce: Duration,
    timer: DebounceTimer,
    in_flight: Vec<JoinHandle<()>>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(
        learner: LearnerId,
        cache: Arc<dyn ProgressCache>,
        remote: Arc<dyn RemoteProgress>,
    ) -> Self {
        Self {
            learner,
            cache,
            remote,
            clock: Clock::default(),
            debounce: DEFAULT_DEBOUNCE,
            timer: DebounceTimer::new(),
            in_flight: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn learner(&self) -> &LearnerId {
        &self.learner
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// True while a debounced remote write is still waiting for its quiet period.
    #[must_use]
    pub fn has_pending_write(&self) -> bool {
        self.timer.is_pending()
    }

    /// Writes the local cache now and (re)starts the remote debounce.
    ///
    /// A pending remote write from an earlier save is cancelled; only the
    /// newest snapshot in a debounce window is ever sent.
    pub fn save(&mut self, snapshot: &ProgressSnapshot) {
        self.write_local(snapshot);

        let task = remote_write(Arc::clone(&self.remote), self.learner.clone(), snapshot.clone());
        if self.timer.schedule(self.debounce, task) {
            log::debug!(
                "remote write for deck {} scheduled in {:?}",
                snapshot.deck_id,
                self.debounce
            );
        } else {
            log::warn!("no async runtime; skipping remote write for deck {}", snapshot.deck_id);
        }
    }

    /// Writes the local cache and issues the remote write immediately.
    ///
    /// Used when a session ends: any pending debounced write is cancelled first
    /// so an older snapshot cannot land after this one is issued.
    pub fn flush(&mut self, snapshot: &ProgressSnapshot) {
        self.timer.cancel();
        self.write_local(snapshot);

        let task = remote_write(Arc::clone(&self.remote), self.learner.clone(), snapshot.clone());
        match Handle::try_current() {
            Ok(runtime) => {
                self.in_flight.retain(|h| !h.is_finished());
                self.in_flight.push(runtime.spawn(task));
                log::debug!("remote write for deck {} flushed", snapshot.deck_id);
            }
            Err(_) => {
                log::warn!("no async runtime; skipping remote flush for deck {}", snapshot.deck_id);
            }
        }
    }

    /// Cancels the pending debounced write, if any.
    pub fn cancel_pending(&mut self) -> bool {
        self.timer.cancel()
    }

    /// Waits for flushed remote writes to finish. Debounced writes are not awaited.
    pub async fn settle(&mut self) {
        for handle in self.in_flight.drain(..) {
            if let Err(e) = handle.await {
                log::warn!("remote write task ended abnormally: {e}");
            }
        }
    }

    /// Loads the saved snapshot for `deck_id`.
    ///
    /// Remote first; on a miss or failure the local cache is used only if it
    /// belongs to the same deck; otherwise an all-empty snapshot.
    pub async fn load(&self, deck_id: &DeckId) -> ProgressSnapshot {
        self.load_with_source(deck_id).await.snapshot
    }

    pub async fn load_with_source(&self, deck_id: &DeckId) -> LoadedProgress {
        match self.remote.fetch_progress(&self.learner, deck_id).await {
            Ok(Some(snapshot)) if snapshot.belongs_to(deck_id) => {
                return LoadedProgress {
                    snapshot,
                    source: ProgressSource::Remote,
                };
            }
            Ok(Some(snapshot)) => {
                log::warn!(
                    "remote returned progress for deck {} when asked for {deck_id}; ignoring",
                    snapshot.deck_id
                );
            }
            Ok(None) => log::debug!("no remote progress for deck {deck_id}"),
            Err(e) => log::warn!("remote progress fetch for deck {deck_id} failed: {e}"),
        }

        match self.cache.read() {
            Ok(Some(snapshot)) if snapshot.belongs_to(deck_id) => LoadedProgress {
                snapshot,
                source: ProgressSource::LocalCache,
            },
            Ok(Some(snapshot)) => {
                log::debug!(
                    "local cache belongs to deck {}, not {deck_id}; starting fresh",
                    snapshot.deck_id
                );
                self.fresh(deck_id)
            }
            Ok(None) => self.fresh(deck_id),
            Err(e) => {
                log::warn!("local progress cache unreadable: {e}");
                self.fresh(deck_id)
            }
        }
    }

    /// Like `load_with_source`, but prefers a snapshot that came with the deck.
    pub async fn reconcile(
        &self,
        deck_id: &DeckId,
        embedded: Option<ProgressSnapshot>,
    ) -> LoadedProgress {
        match embedded {
            Some(snapshot) if snapshot.belongs_to(deck_id) => LoadedProgress {
                snapshot,
                source: ProgressSource::Embedded,
            },
            _ => self.load_with_source(deck_id).await,
        }
    }

    fn fresh(&self, deck_id: &DeckId) -> LoadedProgress {
        LoadedProgress {
            snapshot: ProgressSnapshot::empty(deck_id.clone(), self.clock.now()),
            source: ProgressSource::Fresh,
        }
    }

    fn write_local(&self, snapshot: &ProgressSnapshot) {
        if let Err(e) = self.cache.write(snapshot) {
            log::warn!("local progress cache write failed: {e}");
        }
    }
}

async fn remote_write(remote: Arc<dyn RemoteProgress>, learner: LearnerId, snapshot: ProgressSnapshot) {
    if let Err(e) = remote.write_progress(&learner, &snapshot).await {
        log::warn!("remote progress write for deck {} dropped: {e}", snapshot.deck_id);
    }
}

impl fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressStore")
            .field("learner", &self.learner)
            .field("debounce", &self.debounce)
            .field("pending", &self.timer.is_pending())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::{InMemoryRepository, StorageError};
    use study_core::model::{CardId, SessionMode};
    use study_core::time::{fixed_clock, fixed_now};

    fn store(repo: &InMemoryRepository) -> ProgressStore {
        ProgressStore::new(
            LearnerId::new("alice"),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
        .with_clock(fixed_clock())
    }

    fn snapshot_at(deck: &str, index: usize) -> ProgressSnapshot {
        let mut s = ProgressSnapshot::empty(DeckId::new(deck), fixed_now());
        s.current_index = index;
        s
    }

    struct BrokenCache;

    impl ProgressCache for BrokenCache {
        fn read(&self) -> Result<Option<ProgressSnapshot>, StorageError> {
            Err(StorageError::Unavailable("disk full".into()))
        }
        fn write(&self, _: &ProgressSnapshot) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk full".into()))
        }
        fn clear(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_saves_coalesce_into_one_remote_write() {
        let repo = InMemoryRepository::new();
        let mut store = store(&repo);

        for index in 0..4 {
            store.save(&snapshot_at("d1", index));
            assert_eq!(repo.read().unwrap(), Some(snapshot_at("d1", index)));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(store.has_pending_write());
        assert!(repo.remote_writes().is_empty());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(repo.remote_writes(), vec![snapshot_at("d1", 3)]);
        assert!(!store.has_pending_write());
    }

    #[tokio::test(start_paused = true)]
    async fn saves_after_the_quiet_period_each_reach_the_remote() {
        let repo = InMemoryRepository::new();
        let mut store = store(&repo).with_debounce(Duration::from_millis(100));

        store.save(&snapshot_at("d1", 1));
        tokio::time::sleep(Duration::from_millis(300)).await;
        store.save(&snapshot_at("d1", 2));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(
            repo.remote_writes(),
            vec![snapshot_at("d1", 1), snapshot_at("d1", 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn flush_skips_the_debounce_and_cancels_pending() {
        let repo = InMemoryRepository::new();
        let mut store = store(&repo);

        store.save(&snapshot_at("d1", 1));
        store.flush(&snapshot_at("d1", 2));
        assert!(!store.has_pending_write());
        store.settle().await;
        assert_eq!(repo.remote_writes(), vec![snapshot_at("d1", 2)]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(repo.remote_writes().len(), 1);
        assert_eq!(repo.read().unwrap(), Some(snapshot_at("d1", 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failures_are_swallowed() {
        let repo = InMemoryRepository::new();
        repo.set_remote_down(true);
        let mut store = store(&repo);

        store.save(&snapshot_at("d1", 1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        store.flush(&snapshot_at("d1", 2));
        store.settle().await;

        assert!(repo.remote_writes().is_empty());
        assert_eq!(repo.read().unwrap(), Some(snapshot_at("d1", 2)));
    }

    #[tokio::test]
    async fn broken_local_cache_does_not_block_remote() {
        let repo = InMemoryRepository::new();
        let mut store = ProgressStore::new(
            LearnerId::new("alice"),
            Arc::new(BrokenCache),
            Arc::new(repo.clone()),
        );
        store.flush(&snapshot_at("d1", 4));
        store.settle().await;
        assert_eq!(repo.remote_writes(), vec![snapshot_at("d1", 4)]);

        let loaded = store.load_with_source(&DeckId::new("d2")).await;
        assert_eq!(loaded.source, ProgressSource::Fresh);
    }

    #[tokio::test]
    async fn load_prefers_remote() {
        let repo = InMemoryRepository::new();
        let store = store(&repo);
        repo.write(&snapshot_at("d1", 1)).unwrap();
        repo.write_progress(store.learner(), &snapshot_at("d1", 2))
            .await
            .unwrap();

        let loaded = store.load_with_source(&DeckId::new("d1")).await;
        assert_eq!(loaded.source, ProgressSource::Remote);
        assert_eq!(loaded.snapshot.current_index, 2);
    }

    #[tokio::test]
    async fn load_falls_back_to_matching_local_cache() {
        let repo = InMemoryRepository::new();
        let store = store(&repo);
        let mut cached = snapshot_at("d1", 3);
        cached.learned_set.insert(CardId::new("c1"));
        cached.mode = SessionMode::Normal;
        repo.write(&cached).unwrap();
        repo.set_remote_down(true);

        let loaded = store.load_with_source(&DeckId::new("d1")).await;
        assert_eq!(loaded.source, ProgressSource::LocalCache);
        assert_eq!(loaded.snapshot, cached);
    }

    #[tokio::test]
    async fn cache_for_another_deck_is_discarded() {
        let repo = InMemoryRepository::new();
        let store = store(&repo);
        repo.write(&snapshot_at("other", 5)).unwrap();

        let loaded = store.load_with_source(&DeckId::new("d1")).await;
        assert_eq!(loaded.source, ProgressSource::Fresh);
        assert_eq!(loaded.snapshot, ProgressSnapshot::empty(DeckId::new("d1"), fixed_now()));
    }

    #[tokio::test]
    async fn embedded_progress_wins_when_it_matches() {
        let repo = InMemoryRepository::new();
        let store = store(&repo);
        repo.write_progress(store.learner(), &snapshot_at("d1", 1))
            .await
            .unwrap();

        let loaded = store
            .reconcile(&DeckId::new("d1"), Some(snapshot_at("d1", 4)))
            .await;
        assert_eq!(loaded.source, ProgressSource::Embedded);
        assert_eq!(loaded.snapshot.current_index, 4);

        let loaded = store
            .reconcile(&DeckId::new("d1"), Some(snapshot_at("d9", 4)))
            .await;
        assert_eq!(loaded.source, ProgressSource::Remote);
        assert_eq!(loaded.snapshot.current_index, 1);
    }

    #[test]
    fn save_without_runtime_still_writes_locally() {
        let repo = InMemoryRepository::new();
        let mut store = store(&repo);
        store.save(&snapshot_at("d1", 2));
        store.flush(&snapshot_at("d1", 3));
        assert_eq!(repo.read().unwrap(), Some(snapshot_at("d1", 3)));
        assert!(repo.remote_writes().is_empty());
    }
}
