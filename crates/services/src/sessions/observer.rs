use study_core::model::{CardId, ProgressSnapshot};

/// How a card left the active list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardOutcome {
    Learned,
}

impl CardOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Learned => "learned",
        }
    }
}

/// Callbacks a hosting UI registers with a `SessionHost`.
///
/// Every method defaults to doing nothing, so a listener only implements the
/// notifications it cares about.
pub trait SessionObserver: Send {
    fn on_card_complete(&mut self, _card_id: &CardId, _outcome: CardOutcome) {}

    fn on_review_later_toggle(&mut self, _card_id: &CardId, _marked: bool) {}

    /// Receives the snapshot as it stands once the deck is finished.
    fn on_deck_complete(&mut self, _snapshot: &ProgressSnapshot) {}

    /// Fired after every action that changed persisted progress.
    fn on_progress_update(&mut self, _snapshot: &ProgressSnapshot) {}

    /// Fired once, with the exit snapshot (mode override applied).
    fn on_exit(&mut self, _snapshot: &ProgressSnapshot) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
