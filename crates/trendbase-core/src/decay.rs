//! Age decay, traffic boost, and the peak-score watermark.

use chrono::{DateTime, Utc};

use crate::entity::Entity;
use crate::scoring::MAX_SCORE;

const HOMEPAGE_MAX_DAYS: i32 = 30;
const HOMEPAGE_MIN_SCORE: i16 = 40;

/// Whole days since first detection, never negative.
#[must_use]
pub fn days_trending(first_detected_at: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    let days = (now - first_detected_at).num_days().max(0);
    i32::try_from(days).unwrap_or(i32::MAX)
}

/// Decay multiplier for an entity `days` old, in whole percent.
///
/// Dropped-off entities follow the accelerated curve, which starts below 100
/// but keeps a 20 floor after a month instead of falling to zero.
#[must_use]
pub fn decay_percent(days: i32, dropped_off: bool) -> i64 {
    if dropped_off {
        match days {
            i32::MIN..=1 => 90,
            2..=3 => 80,
            4..=7 => 65,
            8..=14 => 50,
            15..=30 => 30,
            _ => 20,
        }
    } else {
        match days {
            i32::MIN..=1 => 100,
            2..=3 => 95,
            4..=7 => 85,
            8..=14 => 70,
            15..=21 => 50,
            22..=30 => 30,
            _ => 0,
        }
    }
}

/// `base * percent / 100`, rounded half away from zero in exact integer math.
#[must_use]
pub fn decayed_base(base_score: i16, percent: i64) -> i64 {
    let product = i64::from(base_score) * percent;
    if product >= 0 {
        (product + 50) / 100
    } else {
        (product - 50) / 100
    }
}

/// Up to 10 points for page views and 5 for clicks.
#[must_use]
pub fn traffic_boost(page_views: i64, clicks: i64) -> i16 {
    let views = (page_views.max(0) / 100).min(10);
    let clicks = (clicks.max(0) / 10).min(5);
    // Both terms are bounded above, so the sum always fits.
    i16::try_from(views + clicks).unwrap_or(15)
}

/// Derived fields produced by one age-decay evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayOutcome {
    pub days_trending: i32,
    pub current_score: i16,
    pub peak_score: i16,
    pub should_show_on_homepage: bool,
}

impl DecayOutcome {
    /// Evaluate an entity at `now`. Entities never detected are not tracked.
    #[must_use]
    pub fn evaluate(entity: &Entity, now: DateTime<Utc>) -> Option<Self> {
        let first_detected_at = entity.first_detected_at?;
        let days = days_trending(first_detected_at, now);
        let percent = decay_percent(days, entity.dropped_off());
        let boost = traffic_boost(entity.page_views, entity.clicks);

        let raw = decayed_base(entity.base_score, percent) + i64::from(boost);
        let current = i16::try_from(raw.clamp(0, i64::from(MAX_SCORE))).unwrap_or(MAX_SCORE);
        let peak = entity.peak_score.map_or(current, |p| p.max(current));

        Some(Self {
            days_trending: days,
            current_score: current,
            peak_score: peak,
            should_show_on_homepage: days <= HOMEPAGE_MAX_DAYS && current >= HOMEPAGE_MIN_SCORE,
        })
    }

    /// Write the outcome onto `entity`, returning whether anything changed.
    pub fn apply_to(&self, entity: &mut Entity) -> bool {
        let changed = entity.days_trending != Some(self.days_trending)
            || entity.current_score != Some(self.current_score)
            || entity.peak_score != Some(self.peak_score)
            || entity.should_show_on_homepage != self.should_show_on_homepage;

        entity.days_trending = Some(self.days_trending);
        entity.current_score = Some(self.current_score);
        entity.peak_score = Some(self.peak_score);
        entity.should_show_on_homepage = self.should_show_on_homepage;
        changed
    }
}
