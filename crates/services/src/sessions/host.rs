use std::fmt;

use storage::repository::DeckRepository;
use study_core::Clock;
use study_core::model::{CardId, Deck, DeckId, ProgressSnapshot, SessionMode};
use study_core::session::{ModeController, SessionAction, SessionEvent, SessionState, SessionView};

use super::observer::{CardOutcome, SessionObserver};
use crate::progress::ProgressStore;

/// Wires learner actions to the session state machine and its persistence.
///
/// The host owns the deck, the current `SessionState`, and the `ProgressStore`.
/// Every action goes through `ModeController::reduce`; when persisted progress
/// changed, the new snapshot is reported and saved exactly once.
pub struct SessionHost {
    deck: Deck,
    state: SessionState,
    store: ProgressStore,
    observer: Box<dyn SessionObserver>,
    clock: Clock,
}

/// What is left after `SessionHost::exit`.
#[derive(Debug)]
pub struct ExitedSession {
    pub snapshot: ProgressSnapshot,
    store: ProgressStore,
}

impl ExitedSession {
    /// Waits for the final remote write to finish.
    pub async fn settle(&mut self) {
        self.store.settle().await;
    }
}

impl SessionHost {
    /// Fetches the deck and restores the learner's progress.
    ///
    /// A failed fetch is not an error: the session opens on an empty deck and
    /// shows "no cards". Progress comes from the deck payload when embedded,
    /// otherwise from `ProgressStore::load`.
    pub async fn open(
        decks: &dyn DeckRepository,
        deck_id: &DeckId,
        store: ProgressStore,
        observer: Box<dyn SessionObserver>,
        clock: Clock,
    ) -> Self {
        let (deck, embedded) = match decks.fetch_deck(store.learner(), deck_id).await {
            Ok(payload) => (payload.deck, payload.study_progress),
            Err(e) => {
                log::warn!("could not fetch deck {deck_id}: {e}");
                (Deck::empty(deck_id.clone()), None)
            }
        };

        if deck.is_empty() {
            log::info!("deck {deck_id} has no cards");
            return Self::from_parts(deck, SessionState::new(), store, observer, clock);
        }

        let loaded = store.reconcile(deck_id, embedded).await;
        let state = ModeController::new(&deck).resume(&loaded.snapshot);
        if loaded.snapshot.is_fresh() {
            log::info!("starting deck {deck_id} from the first card");
        } else {
            log::info!(
                "resumed deck {deck_id} from {:?} at card {} in {} mode",
                loaded.source,
                state.current_index() + 1,
                state.mode()
            );
        }
        Self::from_parts(deck, state, store, observer, clock)
    }

    #[must_use]
    pub fn from_parts(
        deck: Deck,
        state: SessionState,
        store: ProgressStore,
        observer: Box<dyn SessionObserver>,
        clock: Clock,
    ) -> Self {
        Self {
            deck,
            state,
            store,
            observer,
            clock,
        }
    }

    #[must_use]
    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    #[must_use]
    pub fn view(&self) -> SessionView<'_> {
        ModeController::new(&self.deck).view(&self.state)
    }

    /// Progress as it would be saved right now.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state
            .to_snapshot(self.deck.id().clone(), self.clock.now())
    }

    pub fn flip(&mut self) -> Vec<SessionEvent> {
        self.dispatch(&[SessionAction::Flip])
    }

    /// "Know this": marks the visible card learned and moves on.
    pub fn learn_current(&mut self) -> Vec<SessionEvent> {
        match self.visible_card() {
            Some(card_id) => {
                self.dispatch(&[SessionAction::MarkLearned(card_id), SessionAction::Advance])
            }
            None => Vec::new(),
        }
    }

    /// "Review later": defers the visible card and moves on. Normal pass only.
    pub fn defer_current(&mut self) -> Vec<SessionEvent> {
        if self.state.mode() != SessionMode::Normal {
            return Vec::new();
        }
        match self.visible_card() {
            Some(card_id) => self.dispatch(&[
                SessionAction::MarkReviewLater(card_id),
                SessionAction::Advance,
            ]),
            None => Vec::new(),
        }
    }

    /// Takes the review-later mark off the visible card without moving.
    pub fn unmark_current(&mut self) -> Vec<SessionEvent> {
        match self.visible_card() {
            Some(card_id) => self.dispatch(&[SessionAction::ClearReviewLater(card_id)]),
            None => Vec::new(),
        }
    }

    pub fn next(&mut self) -> Vec<SessionEvent> {
        self.dispatch(&[SessionAction::Advance])
    }

    pub fn prev(&mut self) -> Vec<SessionEvent> {
        self.dispatch(&[SessionAction::Retreat])
    }

    pub fn start_review(&mut self) -> Vec<SessionEvent> {
        self.dispatch(&[SessionAction::StartReview])
    }

    pub fn restart(&mut self) -> Vec<SessionEvent> {
        self.dispatch(&[SessionAction::Restart])
    }

    /// Ends the session.
    ///
    /// Reports the exit snapshot, flushes it to both stores, then cancels any
    /// debounced write so nothing stale lands afterwards. An empty deck has no
    /// progress to keep and leaves the stores untouched.
    pub fn exit(mut self) -> ExitedSession {
        let snapshot =
            ModeController::new(&self.deck).exit_snapshot(&self.state, self.clock.now());
        self.observer.on_exit(&snapshot);

        if self.deck.is_empty() {
            self.store.cancel_pending();
        } else {
            self.store.flush(&snapshot);
            self.store.cancel_pending();
            log::info!(
                "left deck {} at card {} in {} mode",
                snapshot.deck_id,
                snapshot.current_index + 1,
                snapshot.mode
            );
        }

        ExitedSession {
            snapshot,
            store: self.store,
        }
    }

    // The card is only actionable while it is on screen, not behind the
    // review prompt or the completion screen.
    fn visible_card(&self) -> Option<CardId> {
        match self.view() {
            SessionView::Studying { card, .. } | SessionView::Reviewing { card, .. } => {
                Some(card.id().clone())
            }
            _ => None,
        }
    }

    fn dispatch(&mut self, actions: &[SessionAction]) -> Vec<SessionEvent> {
        let before = self.snapshot();
        let controller = ModeController::new(&self.deck);
        let mut events = Vec::new();

        for action in actions {
            let state = std::mem::take(&mut self.state);
            let mut transition = controller.reduce(state, action.clone());
            self.state = transition.state;
            events.append(&mut transition.events);
        }

        let after = self.snapshot();
        for event in &events {
            match event {
                SessionEvent::CardLearned(card_id) => {
                    self.observer
                        .on_card_complete(card_id, CardOutcome::Learned);
                }
                SessionEvent::ReviewLaterToggled { card_id, marked } => {
                    self.observer.on_review_later_toggle(card_id, *marked);
                }
                SessionEvent::DeckCompleted => {}
            }
        }

        if !after.same_progress(&before) {
            log::debug!(
                "deck {} now at card {} in {} mode",
                after.deck_id,
                after.current_index + 1,
                after.mode
            );
            self.observer.on_progress_update(&after);
            self.store.save(&after);
        }

        if events.contains(&SessionEvent::DeckCompleted) {
            log::info!(
                "deck {} completed with {} cards learned",
                after.deck_id,
                after.learned_set.len()
            );
            self.observer.on_deck_complete(&after);
        }

        events
    }
}

impl fmt::Debug for SessionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHost")
            .field("deck", self.deck.id())
            .field("state", &self.state)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
