//! Integration tests for queue building: which decks feed the session,
//! in what order, and how daily limits cut them down.

mod common;

use common::{Harness, TODAY};
use deckwise_core::{CardQueue, ConfigId, CoreError, DeckId, Ease, NewCardOrder, NewSpread, Store};

// ============================================================================
// New card limits
// ============================================================================

fn limits_fixture() -> (Harness, DeckId) {
    let mut h = Harness::new();
    let child = h.add_deck("Default::foo");
    for i in 0..30 {
        let deck = if i > 4 { child } else { DeckId::DEFAULT };
        h.add_note(deck);
    }
    h.give_config(child, ConfigId(2), |_| {});
    (h, child)
}

#[test]
fn test_new_limits_default_to_twenty() {
    let (mut h, _) = limits_fixture();
    h.reset();
    assert_eq!(h.counts(), (20, 0, 0));

    // the parent's own cards come first
    let card = h.next().unwrap();
    assert_eq!(card.deck_id, DeckId::DEFAULT);
}

#[test]
fn test_parent_new_limit_caps_total() {
    let (mut h, _) = limits_fixture();
    h.update_config(ConfigId::DEFAULT, |c| c.new.per_day = 10);
    assert_eq!(h.counts(), (10, 0, 0));
}

#[test]
fn test_child_new_limit_caps_its_share() {
    let (mut h, _) = limits_fixture();
    h.update_config(ConfigId::DEFAULT, |c| c.new.per_day = 10);
    h.update_config(ConfigId(2), |c| c.new.per_day = 4);
    assert_eq!(h.counts(), (9, 0, 0));
}

#[test]
fn test_zero_parent_limit_blocks_children() {
    let (mut h, child) = limits_fixture();
    h.update_config(ConfigId::DEFAULT, |c| c.new.per_day = 0);
    assert_eq!(h.counts(), (0, 0, 0));

    // the parent's limit still applies when studying the child
    h.sched.select_deck(&mut h.session, child).unwrap();
    assert_eq!(h.counts(), (0, 0, 0));
    assert_eq!(h.session.new_limit(child), 0);
}

#[test]
fn test_studied_new_cards_spend_todays_budget() {
    let mut h = Harness::new();
    h.update_config(ConfigId::DEFAULT, |c| c.new.per_day = 3);
    for _ in 0..5 {
        h.add_note(DeckId::DEFAULT);
    }
    assert_eq!(h.counts(), (3, 0, 0));
    h.study(Ease::Good);
    h.reset();
    assert_eq!(h.counts(), (2, 1, 0));
    assert_eq!(h.session.new_limit(DeckId::DEFAULT), 0);

    let deck = h.sched.store().get_deck_required(DeckId::DEFAULT).unwrap();
    assert_eq!(deck.today.new.on(TODAY), 1);
    assert_eq!(deck.today.new.on(TODAY + 1), 0);
}

#[test]
fn test_counts_pick_up_a_new_day() {
    let mut h = Harness::new();
    h.update_config(ConfigId::DEFAULT, |c| c.new.per_day = 3);
    for _ in 0..5 {
        h.add_note(DeckId::DEFAULT);
    }
    h.study(Ease::Good);
    assert_eq!(h.counts().0, 2);

    h.clock.advance_days(1);
    assert_eq!(h.counts().0, 3);
    assert!(h.session.is_valid());
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_new_cards_follow_deck_order() {
    let mut h = Harness::new();
    let two = h.add_deck("Default::2");
    let one = h.add_deck("Default::1");
    let a = h.add_note(DeckId::DEFAULT);
    let b = h.add_note(two);
    let c = h.add_note(one);

    h.reset();
    assert_eq!(h.counts(), (3, 0, 0));
    for expected in [a.id, c.id, b.id] {
        let card = h.study(Ease::Hard);
        assert_eq!(card.id, expected);
    }
}

#[test]
fn test_new_spread_first_and_last() {
    let mut h = Harness::new();
    let new = h.add_note(DeckId::DEFAULT);
    let review = h.add_note(DeckId::DEFAULT);
    h.make_review(&review, 3, TODAY);

    let mut col = h.sched.store().collection().unwrap();
    col.new_spread = NewSpread::First;
    h.store().save_collection(&col).unwrap();
    h.reset();
    assert_eq!(h.next().unwrap().id, new.id);

    col.new_spread = NewSpread::Last;
    h.store().save_collection(&col).unwrap();
    h.reset();
    assert_eq!(h.next().unwrap().id, review.id);
}

#[test]
fn test_distributed_new_cards_mix_with_reviews() {
    let mut h = Harness::new();
    let new = h.add_note(DeckId::DEFAULT);
    for _ in 0..3 {
        let card = h.add_note(DeckId::DEFAULT);
        h.make_review(&card, 3, TODAY);
    }

    h.reset();
    // modulus (1 + 3) / 1 = 4: three reviews, then the new card
    let order: Vec<_> = (0..4).map(|_| h.study(Ease::Good)).collect();
    assert!(order[..3].iter().all(|c| c.id != new.id));
    assert_eq!(order[3].id, new.id);
}

#[test]
fn test_random_new_order_keeps_every_card() {
    let mut h = Harness::new();
    h.update_config(ConfigId::DEFAULT, |c| c.new.order = NewCardOrder::Random);
    let mut ids: Vec<_> = (0..10).map(|_| h.add_note(DeckId::DEFAULT).id).collect();

    h.reset();
    let mut seen = Vec::new();
    while let Some(card) = h.next() {
        if card.queue != CardQueue::New {
            break;
        }
        seen.push(card.id);
        let mut card = card;
        h.answer(&mut card, Ease::Easy);
    }
    seen.sort();
    ids.sort();
    assert_eq!(seen, ids);
}

#[test]
fn test_learning_card_shown_once_due() {
    let mut h = Harness::new();
    h.add_note(DeckId::DEFAULT);
    h.add_note(DeckId::DEFAULT);

    h.reset();
    let first = h.study(Ease::Again);
    let second = h.next().unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.queue, CardQueue::New);

    h.clock.advance_secs(120);
    let mut second = second;
    h.answer(&mut second, Ease::Again);
    let card = h.next().unwrap();
    assert_eq!(card.id, first.id);
    assert_eq!(card.queue, CardQueue::Learning);
}

// ============================================================================
// Deck selection
// ============================================================================

#[test]
fn test_select_deck_limits_active_decks() {
    let mut h = Harness::new();
    let child = h.add_deck("Default::child");
    let other = h.add_deck("Other");
    h.add_note(DeckId::DEFAULT);
    h.add_note(child);
    h.add_note(other);

    h.reset();
    assert_eq!(h.counts(), (2, 0, 0));
    assert_eq!(h.session.active_decks(), &[DeckId::DEFAULT, child]);

    h.sched.select_deck(&mut h.session, other).unwrap();
    assert_eq!(h.counts(), (1, 0, 0));
    assert_eq!(h.sched.store().collection().unwrap().current_deck, other);
}

#[test]
fn test_select_missing_deck_fails() {
    let mut h = Harness::new();
    let err = h
        .sched
        .select_deck(&mut h.session, DeckId(404))
        .unwrap_err();
    assert!(matches!(err, CoreError::DeckNotFound(DeckId(404))));
    assert_eq!(h.session.selected_deck(), None);
}
