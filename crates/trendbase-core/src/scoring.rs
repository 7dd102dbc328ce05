//! Composite base score from heterogeneous signal sources.
//!
//! Each source contributes a bounded sub-score; the sum is clamped to
//! `0..=100`. Momentum follows the bounded 10–70 policy, not a flat score for
//! list presence.

use serde::Serialize;

use crate::entity::SignalSource;

pub const MAX_SCORE: i16 = 100;

pub const MOMENTUM_PRESENCE_BASELINE: i16 = 10;
pub const MOMENTUM_MAX: i16 = 70;
const MOMENTUM_MAGNITUDE_DIVISOR: f64 = 20.0;

pub const SOCIAL_CAP: i16 = 30;
const SOCIAL_HIGH_MAGNITUDE: f64 = 500.0;
const SOCIAL_MID_MAGNITUDE: f64 = 300.0;
const SOCIAL_HIGH_POINTS: i16 = 20;
const SOCIAL_MID_POINTS: i16 = 15;

pub const SEARCH_TREND_POINTS: i16 = 20;

const DROP_OFF_RATIO: f64 = 0.12;
const DROP_OFF_MIN: i16 = 10;
const DROP_OFF_MAX: i16 = 15;

/// Per-source contribution to an entity's base score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub momentum: i16,
    pub social: i16,
    pub search_trend: i16,
}

impl ScoreBreakdown {
    #[must_use]
    pub fn total(&self) -> i16 {
        (self.momentum + self.social + self.search_trend).clamp(0, MAX_SCORE)
    }

    /// Social or search activity without any marketplace momentum yet.
    #[must_use]
    pub fn early_signal(&self) -> bool {
        self.momentum == 0 && (self.social > 0 || self.search_trend > 0)
    }
}

/// Compose the per-source sub-scores for a set of `(source, magnitude)` pairs.
///
/// `on_momentum_list` confirms momentum presence even when no momentum signal
/// carries a usable magnitude.
pub fn compose<I>(signals: I, on_momentum_list: bool) -> ScoreBreakdown
where
    I: IntoIterator<Item = (SignalSource, f64)>,
{
    let mut momentum = Vec::new();
    let mut social = Vec::new();
    let mut search_hits = 0_usize;

    for (source, magnitude) in signals {
        match source {
            SignalSource::Momentum => momentum.push(magnitude),
            SignalSource::Social => social.push(magnitude),
            SignalSource::SearchTrend => search_hits += 1,
        }
    }

    let presence = on_momentum_list || !momentum.is_empty();

    ScoreBreakdown {
        momentum: momentum_sub_score(&momentum, presence),
        social: social_sub_score(&mut social),
        search_trend: if search_hits > 0 {
            SEARCH_TREND_POINTS
        } else {
            0
        },
    }
}

#[allow(clippy::cast_possible_truncation)]
fn momentum_sub_score(magnitudes: &[f64], presence: bool) -> i16 {
    let strongest = magnitudes
        .iter()
        .copied()
        .filter(|m| *m > 0.0)
        .fold(None, |best: Option<f64>, m| {
            Some(best.map_or(m, |b| b.max(m)))
        });

    match strongest {
        Some(magnitude) => {
            // Bounded before the cast so huge magnitudes cannot overflow i16.
            let steps = (magnitude / MOMENTUM_MAGNITUDE_DIVISOR)
                .floor()
                .min(f64::from(MOMENTUM_MAX));
            (steps as i16).clamp(MOMENTUM_PRESENCE_BASELINE, MOMENTUM_MAX)
        }
        None if presence => MOMENTUM_PRESENCE_BASELINE,
        None => 0,
    }
}

fn social_sub_score(magnitudes: &mut [f64]) -> i16 {
    magnitudes.sort_by(|a, b| b.total_cmp(a));

    let top: i16 = magnitudes
        .iter()
        .take(2)
        .map(|m| {
            if *m > SOCIAL_HIGH_MAGNITUDE {
                SOCIAL_HIGH_POINTS
            } else if *m >= SOCIAL_MID_MAGNITUDE {
                SOCIAL_MID_POINTS
            } else {
                0
            }
        })
        .sum();

    let volume_bonus = match magnitudes.len() {
        n if n >= 3 => 10,
        2 => 5,
        _ => 0,
    };

    (top + volume_bonus).min(SOCIAL_CAP)
}

/// Points removed from the base score when an entity leaves the momentum list.
///
/// Roughly 12% of the base, bounded to 10–15 points.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn drop_off_penalty(base_score: i16) -> i16 {
    let raw = (f64::from(base_score) * DROP_OFF_RATIO).round() as i16;
    raw.clamp(DROP_OFF_MIN, DROP_OFF_MAX)
}

/// Base score after the drop-off reduction, floored at zero.
#[must_use]
pub fn apply_drop_off(base_score: i16) -> i16 {
    (base_score - drop_off_penalty(base_score)).max(0)
}

/// New base score after signals were added or merged.
///
/// The base never falls because a source stopped reporting; the only
/// decrease comes from the drop-off reduction, which stays applied for as
/// long as the entity remains off the momentum list.
#[must_use]
pub fn recompute_base(previous: i16, composed: i16, dropped_off: bool) -> i16 {
    let target = if dropped_off {
        apply_drop_off(composed)
    } else {
        composed
    };
    previous.max(target).clamp(0, MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use SignalSource::{Momentum, SearchTrend, Social};

    #[test]
    fn momentum_magnitude_scales_and_clamps() {
        assert_eq!(compose([(Momentum, 400.0)], false).momentum, 20);
        assert_eq!(compose([(Momentum, 50.0)], false).momentum, 10);
        assert_eq!(compose([(Momentum, 5_000.0)], false).momentum, 70);
        assert_eq!(compose([(Momentum, 1.0e300)], false).momentum, 70);
    }

    #[test]
    fn momentum_uses_strongest_signal() {
        let b = compose([(Momentum, 300.0), (Momentum, 900.0)], false);
        assert_eq!(b.momentum, 45);
    }

    #[test]
    fn momentum_presence_without_magnitude_is_baseline() {
        assert_eq!(compose([(Momentum, 0.0)], false).momentum, 10);
        assert_eq!(compose(Vec::<(SignalSource, f64)>::new(), true).momentum, 10);
        assert_eq!(compose([(Momentum, -40.0)], false).momentum, 10);
    }

    #[test]
    fn no_momentum_scores_zero() {
        assert_eq!(compose([(Social, 800.0)], false).momentum, 0);
    }

    #[test]
    fn single_social_signal_has_no_volume_bonus() {
        assert_eq!(compose([(Social, 800.0)], false).social, 20);
        assert_eq!(compose([(Social, 300.0)], false).social, 15);
        assert_eq!(compose([(Social, 299.0)], false).social, 0);
    }

    #[test]
    fn two_mid_social_signals_hit_the_cap() {
        // 15 + 15 + 5 volume bonus = 35, capped at 30.
        let b = compose([(Social, 320.0), (Social, 350.0)], false);
        assert_eq!(b.social, 30);
    }

    #[test]
    fn low_social_signals_still_earn_volume_bonus() {
        let b = compose([(Social, 10.0), (Social, 20.0), (Social, 30.0)], false);
        assert_eq!(b.social, 10);
        let b = compose([(Social, 10.0), (Social, 20.0)], false);
        assert_eq!(b.social, 5);
    }

    #[test]
    fn only_top_two_social_signals_contribute_points() {
        // 900 and 600 both earn 20; 310 only counts toward volume; capped at 30.
        let b = compose([(Social, 310.0), (Social, 600.0), (Social, 900.0)], false);
        assert_eq!(b.social, 30);
    }

    #[test]
    fn search_trend_is_flat() {
        let b = compose([(SearchTrend, 1.0), (SearchTrend, 99.0)], false);
        assert_eq!(b.search_trend, 20);
    }

    #[test]
    fn total_sums_and_clamps() {
        let b = compose(
            [
                (Momentum, 5_000.0),
                (Social, 900.0),
                (Social, 700.0),
                (Social, 650.0),
                (SearchTrend, 3.0),
            ],
            true,
        );
        assert_eq!(b.momentum + b.social + b.search_trend, 120);
        assert_eq!(b.total(), 100);
    }

    #[test]
    fn early_signal_requires_activity_without_momentum() {
        assert!(compose([(SearchTrend, 1.0)], false).early_signal());
        assert!(!compose([(SearchTrend, 1.0)], true).early_signal());
        assert!(!compose(Vec::<(SignalSource, f64)>::new(), false).early_signal());
    }

    #[test]
    fn drop_off_penalty_is_bounded() {
        assert_eq!(drop_off_penalty(100), 12);
        assert_eq!(drop_off_penalty(20), 10);
        assert_eq!(drop_off_penalty(125), 15);
        assert_eq!(apply_drop_off(100), 88);
        assert_eq!(apply_drop_off(6), 0);
    }

    #[test]
    fn recompute_base_never_decreases_without_drop_off() {
        assert_eq!(recompute_base(60, 40, false), 60);
        assert_eq!(recompute_base(40, 60, false), 60);
    }

    #[test]
    fn recompute_base_keeps_drop_off_reduction() {
        let after_transition = apply_drop_off(100);
        assert_eq!(recompute_base(after_transition, 100, true), 88);
        assert_eq!(recompute_base(after_transition, 100, false), 100);
    }
}
