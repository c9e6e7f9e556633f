use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::model::{Card, CardId, Deck, DeckId, ProgressSnapshot, SessionMode};

/// Where the learner is inside one sitting.
///
/// Every transition takes the state by value and returns the next one, so a
/// host never holds two diverging copies of the bookkeeping. Transitions are
/// total: inputs that make no sense for the current mode leave the state as is.
///
/// Invariant: `learned` and `review` never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    current_index: usize,
    learned: BTreeSet<CardId>,
    review: BTreeSet<CardId>,
    mode: SessionMode,
    // Deck positions of the cards in the current review pass. Fixed on entry
    // to `Review`, empty in every other mode.
    review_queue: Vec<usize>,
    showing_answer: bool,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn learned(&self) -> &BTreeSet<CardId> {
        &self.learned
    }

    #[must_use]
    pub fn review(&self) -> &BTreeSet<CardId> {
        &self.review
    }

    #[must_use]
    pub fn showing_answer(&self) -> bool {
        self.showing_answer
    }

    #[must_use]
    pub fn is_learned(&self, card_id: &CardId) -> bool {
        self.learned.contains(card_id)
    }

    #[must_use]
    pub fn is_marked_for_review(&self, card_id: &CardId) -> bool {
        self.review.contains(card_id)
    }

    /// Cards of the current review pass, in deck order.
    pub fn review_queue<'d>(&self, deck: &'d Deck) -> impl Iterator<Item = &'d Card> {
        self.review_queue
            .iter()
            .filter_map(move |&pos| deck.card_at(pos).ok())
    }

    /// Length of the list the index walks: the deck, or the review queue in `Review`.
    #[must_use]
    pub fn active_len(&self, deck: &Deck) -> usize {
        match self.mode {
            SessionMode::Review => self.review_queue.len(),
            SessionMode::Normal | SessionMode::Completed => deck.size(),
        }
    }

    /// The card under the index, if the active list has one.
    #[must_use]
    pub fn active_card<'d>(&self, deck: &'d Deck) -> Option<&'d Card> {
        let position = match self.mode {
            SessionMode::Review => *self.review_queue.get(self.current_index)?,
            SessionMode::Normal | SessionMode::Completed => self.current_index,
        };
        deck.card_at(position).ok()
    }

    #[must_use]
    pub fn at_last_card(&self, deck: &Deck) -> bool {
        let len = self.active_len(deck);
        len > 0 && self.current_index + 1 >= len
    }

    /// True once every deck card is either learned or marked for review.
    #[must_use]
    pub fn all_acted_upon(&self, deck: &Deck) -> bool {
        deck.card_ids()
            .all(|id| self.learned.contains(id) || self.review.contains(id))
    }

    /// Deck positions of cards marked for review and not yet learned.
    #[must_use]
    pub fn outstanding_review(&self, deck: &Deck) -> Vec<usize> {
        deck.cards()
            .iter()
            .enumerate()
            .filter(|(_, card)| self.review.contains(card.id()) && !self.learned.contains(card.id()))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// True when every card of the current review pass has been learned.
    #[must_use]
    pub fn review_pass_finished(&self, deck: &Deck) -> bool {
        self.review_queue(deck).all(|card| self.learned.contains(card.id()))
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────────
    //

    /// Toggles the answer side. Bookkeeping is untouched.
    #[must_use]
    pub fn flip(mut self) -> Self {
        self.showing_answer = !self.showing_answer;
        self
    }

    /// Adds `card_id` to the learned set and drops any review mark.
    ///
    /// Does not move the index.
    #[must_use]
    pub fn mark_learned(mut self, card_id: &CardId) -> Self {
        self.review.remove(card_id);
        self.learned.insert(card_id.clone());
        self
    }

    /// Defers `card_id` to the review pass.
    ///
    /// Only honored in `Normal` mode, and never for a learned card.
    #[must_use]
    pub fn mark_review_later(mut self, card_id: &CardId) -> Self {
        if self.mode != SessionMode::Normal || self.learned.contains(card_id) {
            return self;
        }
        self.review.insert(card_id.clone());
        self
    }

    /// Removes a review mark. Only honored in `Normal` mode.
    #[must_use]
    pub fn clear_review_later(mut self, card_id: &CardId) -> Self {
        if self.mode == SessionMode::Normal {
            self.review.remove(card_id);
        }
        self
    }

    /// Moves forward one card, stopping on the last one.
    ///
    /// Stepping past the end leaves the index on the last card; completion is
    /// decided by the controller afterwards either way.
    #[must_use]
    pub fn advance(mut self, deck: &Deck) -> Self {
        let len = self.active_len(deck);
        if self.current_index + 1 < len {
            self.current_index += 1;
            self.showing_answer = false;
        } else {
            self.current_index = len.saturating_sub(1);
        }
        self
    }

    /// Moves back one card, stopping on the first one.
    #[must_use]
    pub fn retreat(mut self) -> Self {
        if self.current_index > 0 {
            self.current_index -= 1;
            self.showing_answer = false;
        }
        self
    }

    /// Back to a blank `Normal` pass at the first card.
    #[must_use]
    pub fn restart(self) -> Self {
        Self::new()
    }

    pub(crate) fn enter_review(mut self, queue: Vec<usize>) -> Self {
        self.mode = SessionMode::Review;
        self.review_queue = queue;
        self.current_index = 0;
        self.showing_answer = false;
        self
    }

    pub(crate) fn complete(mut self, deck: &Deck) -> Self {
        self.mode = SessionMode::Completed;
        self.review_queue.clear();
        self.current_index = self.current_index.min(deck.size().saturating_sub(1));
        self.showing_answer = false;
        self
    }

    //
    // ─── PERSISTENCE ───────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn to_snapshot(&self, deck_id: DeckId, timestamp: DateTime<Utc>) -> ProgressSnapshot {
        ProgressSnapshot {
            deck_id,
            current_index: self.current_index,
            learned_set: self.learned.clone(),
            review_set: self.review.clone(),
            mode: self.mode,
            timestamp,
        }
    }

    /// Rebuilds state from a saved snapshot against the deck as it exists now.
    ///
    /// Ids the deck no longer has are dropped, a learned mark wins over a review
    /// mark, the review queue is rebuilt from the outstanding review cards, and
    /// the index is clamped into the active list. A `Review` snapshot with no
    /// outstanding cards comes back as `Completed`.
    #[must_use]
    pub fn resume(deck: &Deck, snapshot: &ProgressSnapshot) -> Self {
        let learned: BTreeSet<CardId> = snapshot
            .learned_set
            .iter()
            .filter(|id| deck.contains(id))
            .cloned()
            .collect();
        let review: BTreeSet<CardId> = snapshot
            .review_set
            .iter()
            .filter(|id| deck.contains(id) && !learned.contains(*id))
            .cloned()
            .collect();

        let mut state = Self {
            current_index: snapshot.current_index,
            learned,
            review,
            mode: SessionMode::Normal,
            review_queue: Vec::new(),
            showing_answer: false,
        };

        match snapshot.mode {
            SessionMode::Normal => {}
            SessionMode::Completed => {
                state.mode = SessionMode::Completed;
            }
            SessionMode::Review => {
                let queue = state.outstanding_review(deck);
                if queue.is_empty() {
                    return state.complete(deck);
                }
                let index = snapshot.current_index;
                state = state.enter_review(queue);
                state.current_index = index;
            }
        }

        let len = state.active_len(deck);
        state.current_index = state.current_index.min(len.saturating_sub(1));
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn deck(n: usize) -> Deck {
        let cards = (1..=n)
            .map(|i| Card::new(CardId::new(format!("c{i}")), format!("Q{i}"), format!("A{i}")).unwrap())
            .collect();
        Deck::new(DeckId::new("d1"), None, cards).unwrap()
    }

    fn id(s: &str) -> CardId {
        CardId::new(s)
    }

    #[test]
    fn flip_leaves_bookkeeping_alone() {
        let state = SessionState::new().mark_learned(&id("c1")).flip();
        assert!(state.showing_answer());
        assert_eq!(state.learned().len(), 1);
        assert!(!state.flip().showing_answer());
    }

    #[test]
    fn mark_learned_removes_review_mark_and_is_idempotent() {
        let once = SessionState::new()
            .mark_review_later(&id("c1"))
            .mark_learned(&id("c1"));
        assert!(once.is_learned(&id("c1")));
        assert!(!once.is_marked_for_review(&id("c1")));

        let twice = once.clone().mark_learned(&id("c1"));
        assert_eq!(once, twice);
    }

    #[test]
    fn learned_card_cannot_be_deferred() {
        let state = SessionState::new()
            .mark_learned(&id("c1"))
            .mark_review_later(&id("c1"));
        assert!(state.review().is_empty());
    }

    #[test]
    fn defer_is_ignored_outside_normal_mode() {
        let d = deck(2);
        let state = SessionState::new()
            .mark_review_later(&id("c1"))
            .enter_review(vec![0])
            .mark_review_later(&id("c2"));
        assert_eq!(state.review().len(), 1);
        assert!(!state.is_marked_for_review(&id("c2")));
        assert_eq!(state.active_len(&d), 1);
    }

    #[test]
    fn advance_and_retreat_clamp() {
        let d = deck(2);
        let state = SessionState::new().retreat();
        assert_eq!(state.current_index(), 0);

        let state = state.flip().advance(&d);
        assert_eq!(state.current_index(), 1);
        assert!(!state.showing_answer());

        let state = state.advance(&d);
        assert_eq!(state.current_index(), 1);
        assert!(state.at_last_card(&d));
    }

    #[test]
    fn advance_on_empty_deck_stays_at_zero() {
        let d = Deck::empty(DeckId::new("d0"));
        let state = SessionState::new().advance(&d);
        assert_eq!(state.current_index(), 0);
        assert!(!state.at_last_card(&d));
    }

    #[test]
    fn restart_clears_everything() {
        let d = deck(3);
        let state = SessionState::new()
            .mark_learned(&id("c1"))
            .mark_review_later(&id("c2"))
            .advance(&d);
        let state = state.enter_review(vec![1]).restart();
        assert_eq!(state, SessionState::new());
        assert_eq!(state.mode(), SessionMode::Normal);
    }

    #[test]
    fn outstanding_review_follows_deck_order() {
        let d = deck(4);
        let state = SessionState::new()
            .mark_review_later(&id("c4"))
            .mark_review_later(&id("c2"));
        assert_eq!(state.outstanding_review(&d), vec![1, 3]);
    }

    #[test]
    fn resume_drops_unknown_ids_and_repairs_overlap() {
        let d = deck(3);
        let mut snapshot = ProgressSnapshot::empty(DeckId::new("d1"), fixed_now());
        snapshot.learned_set.extend([id("c1"), id("gone")]);
        snapshot.review_set.extend([id("c1"), id("c2")]);
        snapshot.current_index = 9;

        let state = SessionState::resume(&d, &snapshot);
        assert_eq!(state.learned().iter().collect::<Vec<_>>(), vec![&id("c1")]);
        assert_eq!(state.review().iter().collect::<Vec<_>>(), vec![&id("c2")]);
        assert_eq!(state.current_index(), 2);
    }

    #[test]
    fn resume_review_rebuilds_queue() {
        let d = deck(5);
        let mut snapshot = ProgressSnapshot::empty(DeckId::new("d1"), fixed_now());
        snapshot.learned_set.extend([id("c1"), id("c3"), id("c5")]);
        snapshot.review_set.extend([id("c2"), id("c4")]);
        snapshot.mode = SessionMode::Review;

        let state = SessionState::resume(&d, &snapshot);
        assert_eq!(state.mode(), SessionMode::Review);
        let queue: Vec<_> = state.review_queue(&d).map(|c| c.id().as_str()).collect();
        assert_eq!(queue, vec!["c2", "c4"]);
        assert_eq!(state.active_card(&d).unwrap().id(), &id("c2"));
    }

    #[test]
    fn resume_review_without_outstanding_cards_completes() {
        let d = deck(2);
        let mut snapshot = ProgressSnapshot::empty(DeckId::new("d1"), fixed_now());
        snapshot.learned_set.extend([id("c1"), id("c2")]);
        snapshot.mode = SessionMode::Review;

        let state = SessionState::resume(&d, &snapshot);
        assert_eq!(state.mode(), SessionMode::Completed);
        assert_eq!(state.active_len(&d), 2);
    }
}
