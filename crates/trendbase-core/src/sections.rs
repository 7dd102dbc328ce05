//! Homepage section selection.
//!
//! Sections are evaluated in priority order and are mutually exclusive: an
//! entity that qualifies for a higher section is excluded from every lower
//! one, even if the higher list was truncated by the caller's limit.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::decay::days_trending;
use crate::entity::{Entity, EntityId, EntityStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    TrendingNow,
    AboutToExplode,
    RecentlyHot,
    RisingFast,
    WarmingUp,
}

impl SectionKind {
    /// Priority order, highest first.
    pub const ALL: [SectionKind; 5] = [
        SectionKind::TrendingNow,
        SectionKind::AboutToExplode,
        SectionKind::RecentlyHot,
        SectionKind::RisingFast,
        SectionKind::WarmingUp,
    ];

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            SectionKind::TrendingNow => "Trending Now",
            SectionKind::AboutToExplode => "About to Explode",
            SectionKind::RecentlyHot => "Recently Hot",
            SectionKind::RisingFast => "Rising Fast",
            SectionKind::WarmingUp => "Warming Up",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionEntry {
    pub entity_id: EntityId,
    pub canonical_name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    /// Effective current score (falls back to the base score).
    pub score: i16,
    /// Effective peak score (falls back to current, then base).
    pub peak_score: i16,
    pub days_trending: Option<i32>,
    pub early_signal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HomepageSections {
    pub trending_now: Vec<SectionEntry>,
    pub about_to_explode: Vec<SectionEntry>,
    pub recently_hot: Vec<SectionEntry>,
    pub rising_fast: Vec<SectionEntry>,
    pub warming_up: Vec<SectionEntry>,
}

impl HomepageSections {
    #[must_use]
    pub fn get(&self, kind: SectionKind) -> &[SectionEntry] {
        match kind {
            SectionKind::TrendingNow => &self.trending_now,
            SectionKind::AboutToExplode => &self.about_to_explode,
            SectionKind::RecentlyHot => &self.recently_hot,
            SectionKind::RisingFast => &self.rising_fast,
            SectionKind::WarmingUp => &self.warming_up,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        SectionKind::ALL.iter().all(|k| self.get(*k).is_empty())
    }

    #[must_use]
    pub fn total_entries(&self) -> usize {
        SectionKind::ALL.iter().map(|k| self.get(*k).len()).sum()
    }
}

/// Published, has generated content, and priced at 5 or more (or unpriced).
#[must_use]
pub fn is_section_eligible(entity: &Entity) -> bool {
    entity.status == EntityStatus::Published
        && entity.has_content
        && entity.price.is_none_or(|p| p >= Decimal::new(5, 0))
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    entity: &'a Entity,
    score: i16,
    peak: i16,
    days: Option<i32>,
}

impl Candidate<'_> {
    fn id(&self) -> EntityId {
        self.entity.id
    }

    fn days_within(&self, max: i32) -> bool {
        self.days.is_some_and(|d| d <= max)
    }

    fn entry(&self) -> SectionEntry {
        SectionEntry {
            entity_id: self.entity.id,
            canonical_name: self.entity.canonical_name.clone(),
            brand: self.entity.brand.clone(),
            category: self.entity.category.clone(),
            price: self.entity.price,
            score: self.score,
            peak_score: self.peak,
            days_trending: self.days,
            early_signal: self.entity.early_signal,
        }
    }
}

fn qualifies_trending_now(c: &Candidate<'_>) -> bool {
    c.score >= 60 && (c.days_within(14) || (c.days_within(21) && c.score >= 70))
}

/// Build all five sections, each capped at `limit` entries.
#[must_use]
pub fn select_sections(entities: &[Entity], now: DateTime<Utc>, limit: usize) -> HomepageSections {
    let candidates: Vec<Candidate<'_>> = entities
        .iter()
        .filter(|e| is_section_eligible(e))
        .map(|entity| Candidate {
            entity,
            score: entity.effective_score(),
            peak: entity.effective_peak(),
            days: entity.first_detected_at.map(|at| days_trending(at, now)),
        })
        .collect();

    let mut placed: HashSet<EntityId> = HashSet::new();

    let trending_now = take_section(&candidates, &mut placed, qualifies_trending_now);

    // Three overlapping sub-queries unioned and deduplicated by id.
    let mut about: BTreeMap<EntityId, Candidate<'_>> = BTreeMap::new();
    let fresh = candidates
        .iter()
        .filter(|c| c.days_within(7) && !placed.contains(&c.id()));
    for c in fresh {
        let near_breakout = (50..=69).contains(&c.score);
        let early = c.entity.early_signal;
        let building = (10..50).contains(&c.score);
        if near_breakout || early || building {
            about.insert(c.id(), *c);
        }
    }
    let about_to_explode: Vec<Candidate<'_>> = about.into_values().collect();
    placed.extend(about_to_explode.iter().map(Candidate::id));

    let recently_hot = take_section(&candidates, &mut placed, |c| {
        c.peak >= 60 && c.days.is_some_and(|d| (7..=45).contains(&d))
    });

    let rising_fast = take_section(&candidates, &mut placed, |c| {
        (40..=69).contains(&c.score) && c.days_within(14)
    });

    let warming_up = take_section(&candidates, &mut placed, |c| (10..=39).contains(&c.score));

    HomepageSections {
        trending_now: rank(trending_now, |c| c.score, limit),
        about_to_explode: rank(about_to_explode, |c| c.score, limit),
        recently_hot: rank(recently_hot, |c| c.peak, limit),
        rising_fast: rank(rising_fast, |c| c.score, limit),
        warming_up: rank(warming_up, |c| c.score, limit),
    }
}

fn take_section<'a, F>(
    candidates: &[Candidate<'a>],
    placed: &mut HashSet<EntityId>,
    qualifies: F,
) -> Vec<Candidate<'a>>
where
    F: Fn(&Candidate<'a>) -> bool,
{
    let section: Vec<Candidate<'a>> = candidates
        .iter()
        .filter(|c| !placed.contains(&c.id()) && qualifies(c))
        .copied()
        .collect();
    placed.extend(section.iter().map(Candidate::id));
    section
}

fn rank<F>(mut section: Vec<Candidate<'_>>, key: F, limit: usize) -> Vec<SectionEntry>
where
    F: Fn(&Candidate<'_>) -> i16,
{
    section.sort_by(|a, b| key(b).cmp(&key(a)).then_with(|| a.id().cmp(&b.id())));
    section.iter().take(limit).map(Candidate::entry).collect()
}

#[cfg(test)]
#[path = "sections_test.rs"]
mod tests;
