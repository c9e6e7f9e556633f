use chrono::{DateTime, Utc};

use crate::model::{Card, CardId, Deck, ProgressSnapshot, SessionMode};
use crate::session::state::SessionState;

/// A user intent fed through `ModeController::reduce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Flip,
    MarkLearned(CardId),
    MarkReviewLater(CardId),
    ClearReviewLater(CardId),
    Advance,
    Retreat,
    StartReview,
    Restart,
}

/// Something a host should tell its listeners about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CardLearned(CardId),
    ReviewLaterToggled { card_id: CardId, marked: bool },
    DeckCompleted,
}

/// Result of one reduction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub events: Vec<SessionEvent>,
}

/// What the learner should be looking at. Always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionView<'d> {
    /// The deck has no cards; nothing else is reachable.
    NoCards,
    Studying {
        card: &'d Card,
        index: usize,
        total: usize,
        showing_answer: bool,
        learned: bool,
        marked_for_review: bool,
    },
    /// The normal pass is over but deferred cards remain.
    ReviewNeeded { count: usize },
    Reviewing {
        card: &'d Card,
        index: usize,
        total: usize,
        showing_answer: bool,
        learned: bool,
    },
    Completed { learned: usize, total: usize },
}

/// Mode state machine layered over `SessionState`.
///
/// `Normal` becomes `Completed` once the last card is reached with every card
/// acted upon and nothing left to review; with review cards left it shows
/// "review needed" until `StartReview`. `Review` becomes `Completed` once every
/// queued card is learned. `Restart` returns to a blank `Normal` from anywhere.
#[derive(Debug, Clone, Copy)]
pub struct ModeController<'d> {
    deck: &'d Deck,
}

impl<'d> ModeController<'d> {
    #[must_use]
    pub fn new(deck: &'d Deck) -> Self {
        Self { deck }
    }

    #[must_use]
    pub fn deck(&self) -> &'d Deck {
        self.deck
    }

    /// Applies `action` and then settles the mode.
    ///
    /// An empty deck short-circuits: the state comes back unchanged.
    #[must_use]
    pub fn reduce(&self, state: SessionState, action: SessionAction) -> Transition {
        if self.deck.is_empty() {
            return Transition {
                state,
                events: Vec::new(),
            };
        }

        let before = state.mode();
        let mut events = Vec::new();

        let state = match action {
            SessionAction::Flip => state.flip(),
            SessionAction::MarkLearned(card_id) => {
                if !self.deck.contains(&card_id) || state.is_learned(&card_id) {
                    state
                } else {
                    events.push(SessionEvent::CardLearned(card_id.clone()));
                    state.mark_learned(&card_id)
                }
            }
            SessionAction::MarkReviewLater(card_id) => {
                if !self.deck.contains(&card_id) {
                    return Transition { state, events };
                }
                let was_marked = state.is_marked_for_review(&card_id);
                let next = state.mark_review_later(&card_id);
                if !was_marked && next.is_marked_for_review(&card_id) {
                    events.push(SessionEvent::ReviewLaterToggled {
                        card_id,
                        marked: true,
                    });
                }
                next
            }
            SessionAction::ClearReviewLater(card_id) => {
                let was_marked = state.is_marked_for_review(&card_id);
                let next = state.clear_review_later(&card_id);
                if was_marked && !next.is_marked_for_review(&card_id) {
                    events.push(SessionEvent::ReviewLaterToggled {
                        card_id,
                        marked: false,
                    });
                }
                next
            }
            // A finished session has nothing left to walk.
            SessionAction::Advance | SessionAction::Retreat
                if state.mode() == SessionMode::Completed =>
            {
                state
            }
            SessionAction::Advance => state.advance(self.deck),
            SessionAction::Retreat => state.retreat(),
            SessionAction::StartReview => self.start_review(state),
            SessionAction::Restart => state.restart(),
        };

        let state = self.settle(state);
        if before != SessionMode::Completed && state.mode() == SessionMode::Completed {
            events.push(SessionEvent::DeckCompleted);
        }

        Transition { state, events }
    }

    /// Forces any mode change the current bookkeeping calls for.
    #[must_use]
    pub fn settle(&self, state: SessionState) -> SessionState {
        match state.mode() {
            SessionMode::Normal => {
                if state.at_last_card(self.deck)
                    && state.all_acted_upon(self.deck)
                    && state.outstanding_review(self.deck).is_empty()
                {
                    state.complete(self.deck)
                } else {
                    state
                }
            }
            SessionMode::Review => {
                if state.review_pass_finished(self.deck) {
                    state.complete(self.deck)
                } else {
                    state
                }
            }
            SessionMode::Completed => state,
        }
    }

    /// Enters the focused review pass from the "review needed" prompt.
    ///
    /// Anywhere else this is a no-op. If every deferred card was learned in the
    /// meantime the session goes straight to `Completed` instead of opening an
    /// empty review pass.
    #[must_use]
    pub fn start_review(&self, state: SessionState) -> SessionState {
        if !self.end_of_pass(&state) {
            return state;
        }
        let queue = state.outstanding_review(self.deck);
        if queue.is_empty() {
            return state.complete(self.deck);
        }
        state.enter_review(queue)
    }

    /// Number of deferred cards still waiting when the prompt is showing.
    #[must_use]
    pub fn review_needed(&self, state: &SessionState) -> Option<usize> {
        if !self.end_of_pass(state) {
            return None;
        }
        let count = state.outstanding_review(self.deck).len();
        (count > 0).then_some(count)
    }

    #[must_use]
    pub fn is_review_needed(&self, state: &SessionState) -> bool {
        self.review_needed(state).is_some()
    }

    fn end_of_pass(&self, state: &SessionState) -> bool {
        state.mode() == SessionMode::Normal
            && state.at_last_card(self.deck)
            && state.all_acted_upon(self.deck)
    }

    #[must_use]
    pub fn view(&self, state: &SessionState) -> SessionView<'d> {
        if self.deck.is_empty() {
            return SessionView::NoCards;
        }
        if let Some(count) = self.review_needed(state) {
            return SessionView::ReviewNeeded { count };
        }

        let total = state.active_len(self.deck);
        match (state.mode(), state.active_card(self.deck)) {
            (SessionMode::Completed, _) => SessionView::Completed {
                learned: state.learned().len(),
                total: self.deck.size(),
            },
            (SessionMode::Normal, Some(card)) => SessionView::Studying {
                card,
                index: state.current_index(),
                total,
                showing_answer: state.showing_answer(),
                learned: state.is_learned(card.id()),
                marked_for_review: state.is_marked_for_review(card.id()),
            },
            (SessionMode::Review, Some(card)) => SessionView::Reviewing {
                card,
                index: state.current_index(),
                total,
                showing_answer: state.showing_answer(),
                learned: state.is_learned(card.id()),
            },
            (_, None) => SessionView::NoCards,
        }
    }

    /// Rebuilds state from a saved snapshot and settles its mode.
    #[must_use]
    pub fn resume(&self, snapshot: &ProgressSnapshot) -> SessionState {
        if self.deck.is_empty() {
            return SessionState::new();
        }
        self.settle(SessionState::resume(self.deck, snapshot))
    }

    /// Snapshot written when the learner leaves the session.
    #[must_use]
    pub fn exit_snapshot(&self, state: &SessionState, timestamp: DateTime<Utc>) -> ProgressSnapshot {
        let mut snapshot = state.to_snapshot(self.deck.id().clone(), timestamp);
        // Intentional: leaving from the review prompt or from inside the review
        // pass always resumes at the first card of the review pass, wherever the
        // learner actually was. Leaving mid-deck in Normal keeps the exact spot.
        if state.mode() == SessionMode::Review || self.is_review_needed(state) {
            snapshot.mode = SessionMode::Review;
            snapshot.current_index = 0;
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeckId;
    use crate::time::fixed_now;

    fn deck(n: usize) -> Deck {
        let cards = (1..=n)
            .map(|i| Card::new(CardId::new(format!("c{i}")), format!("Q{i}"), format!("A{i}")).unwrap())
            .collect();
        Deck::new(DeckId::new("d1"), Some("Five".into()), cards).unwrap()
    }

    fn id(s: &str) -> CardId {
        CardId::new(s)
    }

    // Marks the current card the way a host does: mark, then advance.
    fn learn(ctl: &ModeController<'_>, state: SessionState) -> Transition {
        let card = state.active_card(ctl.deck()).unwrap().id().clone();
        let t = ctl.reduce(state, SessionAction::MarkLearned(card));
        let mut events = t.events;
        let mut t2 = ctl.reduce(t.state, SessionAction::Advance);
        events.append(&mut t2.events);
        Transition {
            state: t2.state,
            events,
        }
    }

    fn defer(ctl: &ModeController<'_>, state: SessionState) -> Transition {
        let card = state.active_card(ctl.deck()).unwrap().id().clone();
        let t = ctl.reduce(state, SessionAction::MarkReviewLater(card));
        let mut events = t.events;
        let mut t2 = ctl.reduce(t.state, SessionAction::Advance);
        events.append(&mut t2.events);
        Transition {
            state: t2.state,
            events,
        }
    }

    fn five_card_pass(ctl: &ModeController<'_>) -> SessionState {
        let s = SessionState::new();
        let s = learn(ctl, s).state;
        let s = defer(ctl, s).state;
        let s = learn(ctl, s).state;
        let s = defer(ctl, s).state;
        learn(ctl, s).state
    }

    fn assert_disjoint(state: &SessionState) {
        assert!(state.learned().is_disjoint(state.review()));
    }

    #[test]
    fn mixed_pass_ends_in_review_needed() {
        let d = deck(5);
        let ctl = ModeController::new(&d);
        let state = five_card_pass(&ctl);

        assert_eq!(state.mode(), SessionMode::Normal);
        assert_eq!(state.current_index(), 4);
        assert_eq!(ctl.view(&state), SessionView::ReviewNeeded { count: 2 });
        assert_disjoint(&state);
    }

    #[test]
    fn start_review_walks_only_deferred_cards() {
        let d = deck(5);
        let ctl = ModeController::new(&d);
        let state = ctl
            .reduce(five_card_pass(&ctl), SessionAction::StartReview)
            .state;

        assert_eq!(state.mode(), SessionMode::Review);
        assert_eq!(state.current_index(), 0);
        let queue: Vec<_> = state.review_queue(&d).map(|c| c.id().as_str()).collect();
        assert_eq!(queue, vec!["c2", "c4"]);
        assert!(matches!(
            ctl.view(&state),
            SessionView::Reviewing { index: 0, total: 2, .. }
        ));
    }

    #[test]
    fn learning_every_review_card_completes() {
        let d = deck(5);
        let ctl = ModeController::new(&d);
        let state = ctl
            .reduce(five_card_pass(&ctl), SessionAction::StartReview)
            .state;

        let t = learn(&ctl, state);
        assert_eq!(t.state.mode(), SessionMode::Review);
        assert_eq!(t.events, vec![SessionEvent::CardLearned(id("c2"))]);

        let t = learn(&ctl, t.state);
        assert_eq!(t.state.mode(), SessionMode::Completed);
        assert_eq!(
            t.events,
            vec![SessionEvent::CardLearned(id("c4")), SessionEvent::DeckCompleted]
        );
        assert_eq!(t.state.learned().len(), 5);
        assert!(t.state.review().is_empty());
        assert_eq!(
            ctl.view(&t.state),
            SessionView::Completed { learned: 5, total: 5 }
        );
    }

    #[test]
    fn defer_is_a_no_op_during_review() {
        let d = deck(5);
        let ctl = ModeController::new(&d);
        let state = ctl
            .reduce(five_card_pass(&ctl), SessionAction::StartReview)
            .state;
        let t = ctl.reduce(state.clone(), SessionAction::MarkReviewLater(id("c2")));
        assert_eq!(t.state, state);
        assert!(t.events.is_empty());
    }

    #[test]
    fn all_learned_pass_completes_without_prompt() {
        let d = deck(3);
        let ctl = ModeController::new(&d);
        let mut state = SessionState::new();
        for _ in 0..2 {
            state = learn(&ctl, state).state;
            assert_eq!(state.mode(), SessionMode::Normal);
        }
        let t = learn(&ctl, state);
        assert_eq!(t.state.mode(), SessionMode::Completed);
        assert!(t.events.contains(&SessionEvent::DeckCompleted));
    }

    #[test]
    fn single_card_deferred_then_learned() {
        let d = deck(1);
        let ctl = ModeController::new(&d);
        let t = defer(&ctl, SessionState::new());
        assert_eq!(
            t.events,
            vec![SessionEvent::ReviewLaterToggled {
                card_id: id("c1"),
                marked: true
            }]
        );
        assert_eq!(ctl.view(&t.state), SessionView::ReviewNeeded { count: 1 });

        let state = ctl.reduce(t.state, SessionAction::StartReview).state;
        assert_eq!(state.mode(), SessionMode::Review);
        assert_eq!(state.active_len(&d), 1);

        let state = learn(&ctl, state).state;
        assert_eq!(state.mode(), SessionMode::Completed);
    }

    #[test]
    fn start_review_after_last_deferred_card_learned_completes() {
        let d = deck(2);
        let ctl = ModeController::new(&d);
        let state = learn(&ctl, SessionState::new()).state;
        let state = defer(&ctl, state).state;
        assert!(ctl.is_review_needed(&state));

        // The deferred card gets learned from the prompt before review starts.
        let state = state.mark_learned(&id("c2"));
        let t = ctl.reduce(state, SessionAction::StartReview);
        assert_eq!(t.state.mode(), SessionMode::Completed);
        assert_eq!(t.events, vec![SessionEvent::DeckCompleted]);
    }

    #[test]
    fn start_review_mid_deck_is_ignored() {
        let d = deck(3);
        let ctl = ModeController::new(&d);
        let state = defer(&ctl, SessionState::new()).state;
        let t = ctl.reduce(state.clone(), SessionAction::StartReview);
        assert_eq!(t.state, state);
    }

    #[test]
    fn skipped_cards_block_completion() {
        let d = deck(2);
        let ctl = ModeController::new(&d);
        let state = ctl.reduce(SessionState::new(), SessionAction::Advance).state;
        let state = learn(&ctl, state).state;
        assert_eq!(state.mode(), SessionMode::Normal);
        assert!(!ctl.is_review_needed(&state));
        assert!(matches!(ctl.view(&state), SessionView::Studying { index: 1, .. }));
    }

    #[test]
    fn marking_twice_emits_one_event() {
        let d = deck(3);
        let ctl = ModeController::new(&d);
        let t1 = ctl.reduce(SessionState::new(), SessionAction::MarkLearned(id("c1")));
        let t2 = ctl.reduce(t1.state.clone(), SessionAction::MarkLearned(id("c1")));
        assert_eq!(t1.events.len(), 1);
        assert!(t2.events.is_empty());
        assert_eq!(t1.state, t2.state);
    }

    #[test]
    fn unknown_card_ids_are_ignored() {
        let d = deck(2);
        let ctl = ModeController::new(&d);
        let t = ctl.reduce(SessionState::new(), SessionAction::MarkLearned(id("zz")));
        assert!(t.state.learned().is_empty());
        let t = ctl.reduce(t.state, SessionAction::MarkReviewLater(id("zz")));
        assert!(t.state.review().is_empty());
    }

    #[test]
    fn clear_review_later_reports_unmark() {
        let d = deck(2);
        let ctl = ModeController::new(&d);
        let t = ctl.reduce(SessionState::new(), SessionAction::MarkReviewLater(id("c1")));
        let t = ctl.reduce(t.state, SessionAction::ClearReviewLater(id("c1")));
        assert!(t.state.review().is_empty());
        assert_eq!(
            t.events,
            vec![SessionEvent::ReviewLaterToggled {
                card_id: id("c1"),
                marked: false
            }]
        );
    }

    #[test]
    fn restart_from_every_mode() {
        let d = deck(5);
        let ctl = ModeController::new(&d);
        let normal = five_card_pass(&ctl);
        let review = ctl.reduce(normal.clone(), SessionAction::StartReview).state;
        let completed = learn(&ctl, learn(&ctl, review.clone()).state).state;
        assert_eq!(completed.mode(), SessionMode::Completed);

        for state in [normal, review, completed] {
            let t = ctl.reduce(state, SessionAction::Restart);
            assert_eq!(t.state, SessionState::new());
            assert!(t.events.is_empty());
        }
    }

    #[test]
    fn empty_deck_short_circuits() {
        let d = Deck::empty(DeckId::new("d0"));
        let ctl = ModeController::new(&d);
        let t = ctl.reduce(SessionState::new(), SessionAction::MarkLearned(id("c1")));
        assert!(t.events.is_empty());
        assert_eq!(ctl.view(&t.state), SessionView::NoCards);
        let t = ctl.reduce(t.state, SessionAction::StartReview);
        assert_eq!(t.state.mode(), SessionMode::Normal);
    }

    #[test]
    fn exit_from_review_resumes_at_start_of_pass() {
        let d = deck(8);
        let ctl = ModeController::new(&d);
        let mut state = SessionState::new();
        for _ in 0..8 {
            state = defer(&ctl, state).state;
        }
        let mut state = ctl.reduce(state, SessionAction::StartReview).state;
        for _ in 0..3 {
            state = ctl.reduce(state, SessionAction::Advance).state;
        }
        assert_eq!(state.mode(), SessionMode::Review);
        assert_eq!(state.current_index(), 3);

        let snapshot = ctl.exit_snapshot(&state, fixed_now());
        assert_eq!(snapshot.mode, SessionMode::Review);
        assert_eq!(snapshot.current_index, 0);
    }

    #[test]
    fn exit_from_prompt_is_saved_as_review() {
        let d = deck(5);
        let ctl = ModeController::new(&d);
        let state = five_card_pass(&ctl);
        let snapshot = ctl.exit_snapshot(&state, fixed_now());
        assert_eq!(snapshot.mode, SessionMode::Review);
        assert_eq!(snapshot.current_index, 0);

        let resumed = ctl.resume(&snapshot);
        assert_eq!(resumed.mode(), SessionMode::Review);
        assert_eq!(resumed.active_card(&d).unwrap().id(), &id("c2"));
    }

    #[test]
    fn exit_mid_deck_keeps_exact_position() {
        let d = deck(5);
        let ctl = ModeController::new(&d);
        let state = learn(&ctl, SessionState::new()).state;
        let state = defer(&ctl, state).state;
        let snapshot = ctl.exit_snapshot(&state, fixed_now());
        assert_eq!(snapshot.mode, SessionMode::Normal);
        assert_eq!(snapshot.current_index, 2);

        let resumed = ctl.resume(&snapshot);
        assert!(resumed.to_snapshot(d.id().clone(), fixed_now()).same_progress(&snapshot));
    }

    #[test]
    fn disjointness_holds_along_a_long_walk() {
        let d = deck(4);
        let ctl = ModeController::new(&d);
        let actions = [
            SessionAction::MarkReviewLater(id("c1")),
            SessionAction::MarkLearned(id("c1")),
            SessionAction::MarkReviewLater(id("c1")),
            SessionAction::Advance,
            SessionAction::MarkReviewLater(id("c2")),
            SessionAction::Retreat,
            SessionAction::MarkLearned(id("c2")),
            SessionAction::Advance,
            SessionAction::Advance,
            SessionAction::MarkReviewLater(id("c3")),
            SessionAction::Advance,
            SessionAction::MarkReviewLater(id("c4")),
            SessionAction::StartReview,
            SessionAction::MarkLearned(id("c3")),
            SessionAction::Advance,
            SessionAction::Advance,
        ];
        let mut state = SessionState::new();
        for action in actions {
            state = ctl.reduce(state, action).state;
            assert_disjoint(&state);
            let len = state.active_len(&d);
            assert!(state.current_index() < len.max(1));
        }
        assert_eq!(state.mode(), SessionMode::Review);
        assert_eq!(state.current_index(), 1);
    }
}
