//! Interval arithmetic.
//!
//! Everything here is a pure function of the card, its configuration and
//! the time of day. Randomness is passed in explicitly: `None` means the
//! exact, unfuzzed value used for display.

use rand::{Rng, RngCore};

use crate::card::{Card, CardQueue, CardType, Due, Ease};
use crate::clock::SECS_PER_DAY;
use crate::deck_config::{DeckConfig, LapseConfig, ReviewConfig};

/// Time of day as seen by the interval calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalContext {
    pub today: i32,
    pub now: i64,
    pub day_cutoff: i64,
}

/// Learning steps that govern the card: relearning steps for cards that
/// have graduated before, new-card steps otherwise.
pub fn learning_delays<'a>(conf: &'a DeckConfig, card: &Card) -> &'a [f64] {
    match card.ctype {
        CardType::Review | CardType::Relearning => &conf.lapse.delays,
        CardType::New | CardType::Learning => &conf.new.delays,
    }
}

/// Delay in seconds for the step `left % 1000` steps from the end.
///
/// Out-of-range steps fall back to the first step, and an empty step list
/// to one minute.
pub fn delay_for_grade(delays: &[f64], left: u32) -> u64 {
    let remaining = (left % 1000) as usize;
    let minutes = if remaining >= 1 && remaining <= delays.len() {
        delays[delays.len() - remaining]
    } else {
        delays.first().copied().unwrap_or(1.0)
    };
    (minutes * 60.0) as u64
}

/// Halfway between the current step and the next one. With a single step
/// the next one counts as twice as long; on the last of several steps the
/// next one falls back to the first, so the current delay repeats.
pub fn delay_for_repeating_grade(delays: &[f64], left: u32) -> u64 {
    let current = delay_for_grade(delays, left);
    let next = if delays.len() > 1 {
        delay_for_grade(delays, left.saturating_sub(1))
    } else {
        current * 2
    };
    (current + current.max(next)) / 2
}

/// How many of the last `left` steps can be completed before the day ends.
///
/// Never more than `left`, so `steps_today <= steps_remaining` holds.
pub fn left_today(delays: &[f64], left: u32, now: i64, day_cutoff: i64) -> u32 {
    let left = left as usize;
    let start = if left == 0 || left >= delays.len() {
        0
    } else {
        delays.len() - left
    };
    let tail = &delays[start..];
    let mut ok = 0;
    let mut at = now as f64;
    for (i, minutes) in tail.iter().enumerate() {
        at += minutes * 60.0;
        if at > day_cutoff as f64 {
            break;
        }
        ok = i;
    }
    ((ok + 1).min(tail.len()).min(left)) as u32
}

/// `left` for a card entering its first step.
pub fn starting_left(delays: &[f64], now: i64, day_cutoff: i64) -> u32 {
    let total = delays.len() as u32;
    total + left_today(delays, total, now, day_cutoff) * 1000
}

/// Inclusive range a review interval may be fuzzed into.
pub fn fuzz_range(interval: u32) -> (u32, u32) {
    let fuzz = match interval {
        0 | 1 => return (1, 1),
        2 => return (2, 3),
        3..=6 => (f64::from(interval) * 0.25) as u32,
        7..=29 => ((f64::from(interval) * 0.15) as u32).max(2),
        _ => ((f64::from(interval) * 0.05) as u32).max(4),
    };
    let fuzz = fuzz.max(1);
    (interval - fuzz, interval + fuzz)
}

pub fn fuzzed_interval(interval: u32, rng: &mut dyn RngCore) -> u32 {
    let (lo, hi) = fuzz_range(interval);
    rng.gen_range(lo..=hi)
}

/// Apply the interval modifier, fuzz, and keep the result above `prev` and
/// within `max_interval`.
pub fn constrained_interval(
    interval: f64,
    rev: &ReviewConfig,
    prev: u32,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> u32 {
    let mut ivl = (interval * rev.interval_factor) as u32;
    if let Some(rng) = rng {
        ivl = fuzzed_interval(ivl, rng);
    }
    ivl.max(prev.saturating_add(1)).max(1).min(rev.max_interval)
}

/// Days past the scheduled review day, counting from the home due date for
/// cards in a filtered deck.
pub fn days_late(card: &Card, today: i32) -> u32 {
    let due = match (card.in_filtered_deck(), card.original_due) {
        (true, Some(Due::DayNumber(d))) => d,
        _ => match card.due {
            Due::DayNumber(d) => d,
            _ => today,
        },
    };
    (today - due).max(0) as u32
}

/// Interval for a passing answer on a review card, in days.
///
/// Hard, Good and Easy are computed in order so each one can be kept above
/// the previous. `Again` is a lapse and has no review interval; it is
/// treated like Hard here.
pub fn next_review_interval(
    card: &Card,
    rev: &ReviewConfig,
    today: i32,
    ease: Ease,
    mut rng: Option<&mut (dyn RngCore + '_)>,
) -> u32 {
    let late = days_late(card, today);
    let ivl = f64::from(card.interval);
    let fct = f64::from(card.factor) / 1000.0;
    let hard_min = if rev.hard_factor > 1.0 { card.interval } else { 0 };

    let hard = constrained_interval(ivl * rev.hard_factor, rev, hard_min, rng.as_deref_mut());
    if matches!(ease, Ease::Again | Ease::Hard) {
        return hard;
    }
    let good = constrained_interval(
        (ivl + f64::from(late / 2)) * fct,
        rev,
        hard,
        rng.as_deref_mut(),
    );
    if ease == Ease::Good {
        return good;
    }
    constrained_interval(
        (ivl + f64::from(late)) * fct * rev.ease4,
        rev,
        good,
        rng.as_deref_mut(),
    )
}

/// Whether a review card is being studied ahead of its home due date in a
/// filtered deck.
pub fn is_early_review(card: &Card, today: i32) -> bool {
    card.in_filtered_deck()
        && matches!(card.original_due, Some(Due::DayNumber(d)) if d > today)
}

/// Interval for a passing answer given before the card was due, in days.
/// Never fuzzed. `Again` is handled as a lapse by callers and is treated
/// like Good here.
pub fn early_review_interval(card: &Card, rev: &ReviewConfig, today: i32, ease: Ease) -> u32 {
    let original_due = match card.original_due {
        Some(Due::DayNumber(d)) => d,
        _ => today,
    };
    let elapsed = f64::from(card.interval) - f64::from(original_due - today);
    let fct = f64::from(card.factor) / 1000.0;
    let (factor, min_new, bonus) = match ease {
        // never cut the interval by more than half the hard factor
        Ease::Hard => (rev.hard_factor, rev.hard_factor / 2.0, 1.0),
        Ease::Easy => (fct, 1.0, rev.ease4 - (rev.ease4 - 1.0) / 2.0),
        Ease::Again | Ease::Good => (fct, 1.0, 1.0),
    };
    let ivl = (elapsed * factor).max(1.0);
    let ivl = (f64::from(card.interval) * min_new).max(ivl) * bonus;
    constrained_interval(ivl, rev, 0, None)
}

/// Interval after a lapse, in days.
pub fn lapse_interval(card: &Card, lapse: &LapseConfig) -> u32 {
    let scaled = (f64::from(card.interval) * lapse.mult) as u32;
    scaled.max(lapse.min_interval).max(1)
}

/// Interval given when a card leaves learning, in days.
pub fn graduating_interval(
    card: &Card,
    conf: &DeckConfig,
    early: bool,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> u32 {
    if matches!(card.ctype, CardType::Review | CardType::Relearning) {
        return card.interval + u32::from(early);
    }
    let ideal = conf.new.intervals[usize::from(early)];
    match rng {
        Some(rng) => fuzzed_interval(ideal, rng),
        None => ideal,
    }
}

/// Seconds until the card would next be shown for each answer, without fuzz.
pub fn next_interval_secs(card: &Card, conf: &DeckConfig, ctx: IntervalContext, ease: Ease) -> u64 {
    match card.queue {
        CardQueue::New | CardQueue::Learning | CardQueue::DayLearnRelearn => {
            next_learning_interval_secs(card, conf, ctx, ease)
        }
        _ => match ease {
            Ease::Again => match conf.lapse.delays.first() {
                Some(minutes) => (minutes * 60.0) as u64,
                None => u64::from(lapse_interval(card, &conf.lapse)) * SECS_PER_DAY as u64,
            },
            _ => {
                let days = if is_early_review(card, ctx.today) {
                    early_review_interval(card, &conf.rev, ctx.today, ease)
                } else {
                    next_review_interval(card, &conf.rev, ctx.today, ease, None)
                };
                u64::from(days) * SECS_PER_DAY as u64
            }
        },
    }
}

fn next_learning_interval_secs(
    card: &Card,
    conf: &DeckConfig,
    ctx: IntervalContext,
    ease: Ease,
) -> u64 {
    let delays = learning_delays(conf, card);
    let left = if card.queue == CardQueue::New {
        starting_left(delays, ctx.now, ctx.day_cutoff)
    } else {
        card.left
    };
    let days = |early| u64::from(graduating_interval(card, conf, early, None)) * SECS_PER_DAY as u64;
    if delays.is_empty() {
        return days(ease == Ease::Easy);
    }
    match ease {
        Ease::Again => delay_for_grade(delays, delays.len() as u32),
        Ease::Hard => delay_for_repeating_grade(delays, left),
        Ease::Good => {
            let remaining = (left % 1000).saturating_sub(1);
            if remaining == 0 {
                days(false)
            } else {
                delay_for_grade(delays, remaining)
            }
        }
        Ease::Easy => days(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardId, NoteId};
    use crate::deck::DeckId;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Mcg128Xsl64;

    const NOW: i64 = 1_000_000;

    fn review_card(interval: u32, due: i32) -> Card {
        let mut card = Card::new(CardId(1), NoteId(1), DeckId(1), 0);
        card.ctype = CardType::Review;
        card.queue = CardQueue::Review;
        card.interval = interval;
        card.factor = 2500;
        card.due = Due::DayNumber(due);
        card
    }

    #[test]
    fn delay_for_grade_counts_from_the_end() {
        let delays = [0.5, 3.0, 10.0];
        assert_eq!(delay_for_grade(&delays, 3003), 30);
        assert_eq!(delay_for_grade(&delays, 2), 180);
        assert_eq!(delay_for_grade(&delays, 1001), 600);
        // out of range falls back to the first step
        assert_eq!(delay_for_grade(&delays, 5), 30);
        assert_eq!(delay_for_grade(&delays, 0), 30);
        assert_eq!(delay_for_grade(&[], 1), 60);
    }

    #[test]
    fn repeating_grade_averages_with_next_step() {
        assert_eq!(delay_for_repeating_grade(&[0.5, 3.0, 10.0], 3003), 105);
        assert_eq!(delay_for_repeating_grade(&[0.5, 3.0, 10.0], 2002), 390);
        assert_eq!(delay_for_repeating_grade(&[1.0, 10.0], 2002), 330);
        // single step: 1.5x
        assert_eq!(delay_for_repeating_grade(&[20.0], 1001), 1800);
    }

    #[test]
    fn left_today_stops_at_cutoff() {
        let delays = [1.0, 10.0, 1440.0];
        assert_eq!(left_today(&delays, 3, NOW, NOW + 3600), 2);
        assert_eq!(left_today(&delays, 3, NOW, NOW + 10 * 86_400), 3);
        // the first step always counts
        assert_eq!(left_today(&delays, 3, NOW, NOW + 10), 1);
        assert_eq!(left_today(&[], 0, NOW, NOW + 3600), 0);
        assert_eq!(starting_left(&delays, NOW, NOW + 3600), 2003);
    }

    #[test]
    fn fuzz_ranges() {
        assert_eq!(fuzz_range(1), (1, 1));
        assert_eq!(fuzz_range(2), (2, 3));
        assert_eq!(fuzz_range(4), (3, 5));
        assert_eq!(fuzz_range(10), (8, 12));
        assert_eq!(fuzz_range(20), (17, 23));
        assert_eq!(fuzz_range(100), (95, 105));
    }

    #[test]
    fn review_intervals_without_fuzz() {
        let rev = ReviewConfig::default();
        let card = review_card(100, 2);
        // eight days late
        assert_eq!(next_review_interval(&card, &rev, 10, Ease::Hard, None), 120);
        assert_eq!(next_review_interval(&card, &rev, 10, Ease::Good, None), 260);
        assert_eq!(next_review_interval(&card, &rev, 10, Ease::Easy, None), 351);
    }

    #[test]
    fn fuzzed_review_intervals_share_one_rng() {
        let rev = ReviewConfig::default();
        let card = review_card(100, 2);
        let mut rng = Mcg128Xsl64::seed_from_u64(3);
        for _ in 0..20 {
            let hard = next_review_interval(&card, &rev, 10, Ease::Hard, Some(&mut rng));
            let good = next_review_interval(&card, &rev, 10, Ease::Good, Some(&mut rng));
            let easy = next_review_interval(&card, &rev, 10, Ease::Easy, Some(&mut rng));
            assert!((114..=126).contains(&hard), "hard {hard}");
            assert!((247..=273).contains(&good), "good {good}");
            assert!((334..=369).contains(&easy), "easy {easy}");
        }
    }

    #[test]
    fn constrained_interval_saturates_on_huge_prev() {
        let rev = ReviewConfig::default();
        assert_eq!(constrained_interval(10.0, &rev, u32::MAX, None), rev.max_interval);
    }

    #[test]
    fn review_intervals_capped_by_max() {
        let mut rev = ReviewConfig::default();
        rev.max_interval = 200;
        let card = review_card(100, 10);
        assert_eq!(next_review_interval(&card, &rev, 10, Ease::Good, None), 200);
        assert_eq!(next_review_interval(&card, &rev, 10, Ease::Easy, None), 200);
    }

    #[test]
    fn early_review_examples() {
        let rev = ReviewConfig::default();
        let mut card = review_card(100, -100_000);
        card.original_deck_id = Some(DeckId(1));

        card.original_due = Some(Due::DayNumber(10 + 25));
        assert!(is_early_review(&card, 10));
        assert_eq!(early_review_interval(&card, &rev, 10, Ease::Hard), 90);
        assert_eq!(early_review_interval(&card, &rev, 10, Ease::Good), 187);
        assert_eq!(early_review_interval(&card, &rev, 10, Ease::Easy), 215);

        card.original_due = Some(Due::DayNumber(10 + 75));
        assert_eq!(early_review_interval(&card, &rev, 10, Ease::Hard), 60);
        assert_eq!(early_review_interval(&card, &rev, 10, Ease::Good), 100);
        assert_eq!(early_review_interval(&card, &rev, 10, Ease::Easy), 114);
    }

    #[test]
    fn lapse_interval_halves_with_mult() {
        let mut lapse = LapseConfig::default();
        lapse.mult = 0.5;
        let mut card = review_card(100, 0);
        assert_eq!(lapse_interval(&card, &lapse), 50);
        card.interval = 50;
        assert_eq!(lapse_interval(&card, &lapse), 25);
        lapse.mult = 0.0;
        assert_eq!(lapse_interval(&card, &lapse), 1);
    }

    #[test]
    fn next_interval_secs_for_learning_and_reviews() {
        let mut conf = DeckConfig::default();
        conf.new.delays = vec![0.5, 3.0, 10.0];
        let ctx = IntervalContext {
            today: 10,
            now: NOW,
            day_cutoff: NOW + 20 * 3600,
        };
        let mut card = Card::new(CardId(1), NoteId(1), DeckId(1), 1);
        assert_eq!(next_interval_secs(&card, &conf, ctx, Ease::Again), 30);
        assert_eq!(next_interval_secs(&card, &conf, ctx, Ease::Hard), 105);
        assert_eq!(next_interval_secs(&card, &conf, ctx, Ease::Good), 180);
        assert_eq!(next_interval_secs(&card, &conf, ctx, Ease::Easy), 4 * 86_400);

        card.queue = CardQueue::Learning;
        card.ctype = CardType::Learning;
        card.left = 1001;
        assert_eq!(next_interval_secs(&card, &conf, ctx, Ease::Good), 86_400);

        let mut review = review_card(100, 10);
        conf.lapse.delays = vec![1.0];
        assert_eq!(next_interval_secs(&review, &conf, ctx, Ease::Again), 60);
        conf.lapse.delays.clear();
        assert_eq!(next_interval_secs(&review, &conf, ctx, Ease::Again), 86_400);
        assert_eq!(next_interval_secs(&review, &conf, ctx, Ease::Hard), 120 * 86_400);
        assert_eq!(next_interval_secs(&review, &conf, ctx, Ease::Good), 250 * 86_400);
        assert_eq!(next_interval_secs(&review, &conf, ctx, Ease::Easy), 325 * 86_400);

        // relearning card in the learning queue graduates with its interval
        review.ctype = CardType::Relearning;
        review.queue = CardQueue::Learning;
        review.left = 1001;
        conf.lapse.delays = vec![1.0];
        assert_eq!(next_interval_secs(&review, &conf, ctx, Ease::Good), 100 * 86_400);
        assert_eq!(next_interval_secs(&review, &conf, ctx, Ease::Easy), 101 * 86_400);
    }

    #[test]
    fn graduating_interval_fuzz_stays_in_range() {
        let conf = DeckConfig::default();
        let card = Card::new(CardId(1), NoteId(1), DeckId(1), 1);
        let mut rng = Mcg128Xsl64::seed_from_u64(7);
        for _ in 0..50 {
            let ivl = graduating_interval(&card, &conf, true, Some(&mut rng));
            assert!((3..=5).contains(&ivl));
        }
    }

    proptest! {
        #[test]
        fn left_today_never_exceeds_remaining(
            delays in proptest::collection::vec(0.0f64..2000.0, 0..6),
            left in 0u32..8,
            until_cutoff in 0i64..200_000,
        ) {
            let today = left_today(&delays, left, NOW, NOW + until_cutoff);
            prop_assert!(today <= left);
            let start = starting_left(&delays, NOW, NOW + until_cutoff);
            prop_assert!(start / 1000 <= start % 1000);
        }

        #[test]
        fn constrained_interval_respects_bounds(
            ivl in 0.0f64..100_000.0,
            prev in 0u32..40_000,
            seed in any::<u64>(),
        ) {
            let rev = ReviewConfig::default();
            let mut rng = Mcg128Xsl64::seed_from_u64(seed);
            let out = constrained_interval(ivl, &rev, prev, Some(&mut rng));
            prop_assert!(out >= 1);
            prop_assert!(out <= rev.max_interval);
            if prev < rev.max_interval {
                prop_assert!(out > prev);
            }
        }

        #[test]
        fn lapse_interval_at_least_min(ivl in 0u32..50_000, mult in 0.0f64..=1.0, min in 1u32..30) {
            let lapse = LapseConfig { mult, min_interval: min, ..LapseConfig::default() };
            let card = review_card(ivl, 0);
            let out = lapse_interval(&card, &lapse);
            prop_assert!(out >= min);
            prop_assert!(out <= ivl.max(min));
        }
    }
}
