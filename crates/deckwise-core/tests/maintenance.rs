//! Integration tests for card maintenance: burying, suspending, forgetting,
//! rescheduling and reordering.

mod common;

use common::{Harness, DAY, NOW, TODAY};
use deckwise_core::{
    BasicSearch, CardQueue, CardType, CoreError, DeckId, Due, Ease, FilteredDeck, Store,
    UnburyKind, ValidationError,
};

// ============================================================================
// Bury
// ============================================================================

#[test]
fn test_unbury_releases_only_the_requested_kind() {
    let mut h = Harness::new();
    let a = h.add_note(DeckId::DEFAULT);
    let b = h.add_note(DeckId::DEFAULT);
    h.sched.bury_cards(&mut h.session, &[a.id], true).unwrap();
    h.sched.bury_cards(&mut h.session, &[b.id], false).unwrap();
    assert_eq!(h.card(a.id).queue, CardQueue::ManuallyBuried);
    assert_eq!(h.card(b.id).queue, CardQueue::SiblingBuried);
    assert_eq!(h.counts(), (0, 0, 0));

    let released = h
        .sched
        .unbury_cards_for_deck(&mut h.session, UnburyKind::Manual)
        .unwrap();
    assert_eq!(released, 1);
    assert_eq!(h.card(a.id).queue, CardQueue::New);
    assert_eq!(h.card(b.id).queue, CardQueue::SiblingBuried);

    h.sched
        .unbury_cards_for_deck(&mut h.session, UnburyKind::Siblings)
        .unwrap();
    assert_eq!(h.card(b.id).queue, CardQueue::New);

    h.sched
        .bury_cards(&mut h.session, &[a.id, b.id], true)
        .unwrap();
    assert_eq!(h.counts(), (0, 0, 0));
    h.sched
        .unbury_cards_for_deck(&mut h.session, UnburyKind::All)
        .unwrap();
    assert_eq!(h.counts(), (2, 0, 0));
}

#[test]
fn test_unbury_for_deck_leaves_other_decks() {
    let mut h = Harness::new();
    let other = h.add_deck("Other");
    let here = h.add_note(DeckId::DEFAULT);
    let there = h.add_note(other);
    h.sched
        .bury_cards(&mut h.session, &[here.id, there.id], true)
        .unwrap();

    h.sched
        .unbury_cards_for_deck(&mut h.session, UnburyKind::All)
        .unwrap();
    assert_eq!(h.card(here.id).queue, CardQueue::New);
    assert_eq!(h.card(there.id).queue, CardQueue::ManuallyBuried);

    assert_eq!(h.sched.unbury_cards(&mut h.session).unwrap(), 1);
    assert_eq!(h.card(there.id).queue, CardQueue::New);
}

#[test]
fn test_buried_learning_card_returns_to_its_queue() {
    let mut h = Harness::new();
    h.add_note(DeckId::DEFAULT);
    let card = h.study(Ease::Again);
    h.sched.bury_cards(&mut h.session, &[card.id], true).unwrap();
    assert_eq!(h.counts(), (0, 0, 0));

    h.sched.unbury_cards(&mut h.session).unwrap();
    let card = h.card(card.id);
    assert_eq!(card.queue, CardQueue::Learning);
    assert_eq!(h.counts(), (0, 1, 0));
}

#[test]
fn test_new_day_releases_buried_cards() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    h.sched.bury_cards(&mut h.session, &[card.id], true).unwrap();
    assert!(h.next().is_none());

    h.clock.advance_secs(DAY);
    let next = h.next().unwrap();
    assert_eq!(next.id, card.id);
    assert_eq!(next.queue, CardQueue::New);
    let col = h.sched.store().collection().unwrap();
    assert_eq!(col.last_unburied, TODAY + 1);
}

// ============================================================================
// Suspend
// ============================================================================

#[test]
fn test_suspend_and_unsuspend() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    h.reset();
    assert_eq!(h.next().unwrap().id, card.id);

    h.sched.suspend_cards(&mut h.session, &[card.id]).unwrap();
    assert!(h.next().is_none());

    h.sched.unsuspend_cards(&mut h.session, &[card.id]).unwrap();
    assert_eq!(h.next().unwrap().id, card.id);
}

#[test]
fn test_suspended_relearning_card_keeps_due() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    h.make_review(&card, 100, TODAY);
    let card = h.study(Ease::Again);
    assert_eq!(card.ctype, CardType::Relearning);
    let due = card.due;

    h.sched.suspend_cards(&mut h.session, &[card.id]).unwrap();
    assert_eq!(h.card(card.id).queue, CardQueue::SuspendedBySystem);
    h.sched.unsuspend_cards(&mut h.session, &[card.id]).unwrap();
    let card = h.card(card.id);
    assert_eq!(card.queue, CardQueue::Learning);
    assert_eq!(card.ctype, CardType::Relearning);
    assert_eq!(card.due, due);
}

#[test]
fn test_suspended_card_stays_in_filtered_deck() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    h.make_review(&card, 10, 1);
    let cram = h.add_filtered("Cram", FilteredDeck::default());
    h.sched
        .rebuild_dyn(&mut h.session, cram, &BasicSearch::new())
        .unwrap();
    let borrowed = h.card(card.id);
    assert_eq!(borrowed.deck_id, cram);
    assert_eq!(borrowed.original_due, Some(Due::DayNumber(1)));

    h.sched.suspend_cards(&mut h.session, &[card.id]).unwrap();
    let suspended = h.card(card.id);
    assert_eq!(suspended.deck_id, cram);
    assert_eq!(suspended.original_deck_id, Some(DeckId::DEFAULT));
    assert_eq!(suspended.original_due, Some(Due::DayNumber(1)));

    // emptying sends it home still suspended
    h.sched.empty_dyn(&mut h.session, cram).unwrap();
    let home = h.card(card.id);
    assert_eq!(home.deck_id, DeckId::DEFAULT);
    assert_eq!(home.queue, CardQueue::SuspendedBySystem);
    assert_eq!(home.due, Due::DayNumber(1));
}

#[test]
fn test_unsuspend_ignores_other_cards() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    h.sched.bury_cards(&mut h.session, &[card.id], true).unwrap();
    h.sched.unsuspend_cards(&mut h.session, &[card.id]).unwrap();
    assert_eq!(h.card(card.id).queue, CardQueue::ManuallyBuried);
}

// ============================================================================
// Forget / reschedule
// ============================================================================

#[test]
fn test_forget_turns_review_into_new() {
    let mut h = Harness::new();
    let other = h.add_note(DeckId::DEFAULT);
    let card = h.add_note(DeckId::DEFAULT);
    let mut card = h.make_review(&card, 30, TODAY);
    card.factor = 2100;
    card.reps = 7;
    h.put(&card);
    assert_eq!(h.counts(), (1, 0, 1));

    h.sched.forget_cards(&mut h.session, &[card.id]).unwrap();
    assert_eq!(h.counts(), (2, 0, 0));
    let card = h.card(card.id);
    assert_eq!(card.ctype, CardType::New);
    assert_eq!(card.queue, CardQueue::New);
    assert_eq!(card.interval, 0);
    assert_eq!(card.factor, 2500);
    assert_eq!(card.reps, 7);
    // placed after the existing new card
    assert_eq!(other.due, Due::Ordinal(1));
    assert_eq!(card.due, Due::Ordinal(2));
}

#[test]
fn test_forget_brings_card_home_from_filtered_deck() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    h.make_review(&card, 30, TODAY);
    let cram = h.add_filtered("Cram", FilteredDeck::default());
    h.sched
        .rebuild_dyn(&mut h.session, cram, &BasicSearch::new())
        .unwrap();

    h.sched.forget_cards(&mut h.session, &[card.id]).unwrap();
    let card = h.card(card.id);
    assert_eq!(card.deck_id, DeckId::DEFAULT);
    assert!(!card.in_filtered_deck());
    assert_eq!(card.queue, CardQueue::New);
}

#[test]
fn test_resched_sets_review_due() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);

    h.sched
        .resched_cards(&mut h.session, &[card.id], 0, 0)
        .unwrap();
    let c = h.card(card.id);
    assert_eq!(c.due, Due::DayNumber(TODAY));
    assert_eq!(c.interval, 1);
    assert_eq!(c.ctype, CardType::Review);
    assert_eq!(c.queue, CardQueue::Review);
    assert_eq!(c.factor, 2500);

    h.sched
        .resched_cards(&mut h.session, &[card.id], 1, 1)
        .unwrap();
    let c = h.card(card.id);
    assert_eq!(c.due, Due::DayNumber(TODAY + 1));
    assert_eq!(c.interval, 1);

    h.sched
        .resched_cards(&mut h.session, &[card.id], 5, 9)
        .unwrap();
    let c = h.card(card.id);
    assert!((5..=9).contains(&c.interval));
    assert_eq!(c.due, Due::DayNumber(TODAY + c.interval as i32));
}

#[test]
fn test_resched_rejects_inverted_range() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    let err = h
        .sched
        .resched_cards(&mut h.session, &[card.id], 5, 2)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::InvalidDayRange { min: 5, max: 2 })
    ));
    assert_eq!(h.card(card.id), card);
}

#[test]
fn test_ops_on_missing_card_fail() {
    let mut h = Harness::new();
    let missing = deckwise_core::CardId(999);
    let err = h
        .sched
        .suspend_cards(&mut h.session, &[missing])
        .unwrap_err();
    assert!(matches!(err, CoreError::CardNotFound(_)));
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_reposition_randomize_then_order() {
    let mut h = Harness::new();
    let first = h.add_note(DeckId::DEFAULT);
    let second = h.add_note(DeckId::DEFAULT);

    let mut swapped = false;
    for _ in 0..20 {
        h.sched
            .reposition_new_cards(&mut h.session, DeckId::DEFAULT, true)
            .unwrap();
        let mut dues = [h.card(first.id).due, h.card(second.id).due];
        if dues[0] == Due::Ordinal(2) {
            swapped = true;
        }
        dues.sort_by_key(|d| d.raw());
        assert_eq!(dues, [Due::Ordinal(1), Due::Ordinal(2)]);
    }
    assert!(swapped);

    h.sched
        .reposition_new_cards(&mut h.session, DeckId::DEFAULT, false)
        .unwrap();
    assert_eq!(h.card(first.id).due, Due::Ordinal(1));
    assert_eq!(h.card(second.id).due, Due::Ordinal(2));
}

#[test]
fn test_sort_with_shift_makes_room() {
    let mut h = Harness::new();
    let one = h.add_note(DeckId::DEFAULT);
    let two = h.add_note(DeckId::DEFAULT);
    let three = h.add_note(DeckId::DEFAULT);
    let four = h.add_note(DeckId::DEFAULT);
    assert_eq!(four.due, Due::Ordinal(4));

    h.sched
        .sort_cards(&mut h.session, &[three.id, four.id], 1, 1, false, true)
        .unwrap();
    assert_eq!(h.card(one.id).due, Due::Ordinal(3));
    assert_eq!(h.card(two.id).due, Due::Ordinal(4));
    assert_eq!(h.card(three.id).due, Due::Ordinal(1));
    assert_eq!(h.card(four.id).due, Due::Ordinal(2));
}

#[test]
fn test_sort_keeps_siblings_together_and_skips_reviews() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    let sibling = h.add_sibling(&card);
    let review = h.add_note(DeckId::DEFAULT);
    let review = h.make_review(&review, 4, TODAY + 2);

    h.sched
        .sort_cards(
            &mut h.session,
            &[card.id, sibling.id, review.id],
            10,
            5,
            false,
            false,
        )
        .unwrap();
    assert_eq!(h.card(card.id).due, Due::Ordinal(10));
    assert_eq!(h.card(sibling.id).due, Due::Ordinal(10));
    assert_eq!(h.card(review.id), review);
}

#[test]
fn test_ops_invalidate_session() {
    let mut h = Harness::new();
    let card = h.add_note(DeckId::DEFAULT);
    h.reset();
    assert!(h.session.is_valid());
    h.sched.suspend_cards(&mut h.session, &[card.id]).unwrap();
    assert!(!h.session.is_valid());

    h.reset();
    h.sched
        .resched_cards(&mut h.session, &[card.id], 0, 0)
        .unwrap();
    assert!(!h.session.is_valid());

    // the clock is untouched by maintenance
    assert_eq!(h.sched.times().unwrap().now, NOW);
}
