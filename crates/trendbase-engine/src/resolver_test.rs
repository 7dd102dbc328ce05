use chrono::{Duration, TimeZone};
use trendbase_core::{NewSignal, TokenSetSimilarity};

use super::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 2, 8, 0, 0).unwrap()
}

fn entity(id: i64, name: &str) -> Entity {
    Entity {
        id,
        canonical_name: name.to_string(),
        brand: None,
        category: None,
        price: None,
        canonical_key: None,
        status: EntityStatus::Draft,
        has_content: false,
        base_score: 20,
        current_score: None,
        peak_score: None,
        days_trending: None,
        should_show_on_homepage: false,
        early_signal: false,
        first_detected_at: Some(now() - Duration::days(4)),
        last_updated_at: now(),
        on_momentum_list: false,
        last_seen_on_momentum_list_at: None,
        page_views: 0,
        clicks: 0,
        created_at: now() - Duration::days(4),
        version: 1,
    }
}

fn observation(name: &str, source: SignalSource) -> Observation {
    Observation {
        name: name.to_string(),
        brand: None,
        canonical_key: None,
        category: None,
        price: None,
        signal: NewSignal {
            source,
            signal_type: source.default_signal_type().to_string(),
            magnitude: 400.0,
            metadata: serde_json::json!({}),
            observed_at: now() - Duration::hours(2),
        },
    }
}

#[test]
fn brand_bonus_lifts_cerave_over_threshold() {
    let mut existing = entity(1, "CeraVe Moisturizing Cream");
    existing.brand = Some("CeraVe".to_string());
    let mut obs = observation("CeraVe Daily Moisturizing Lotion", SignalSource::Social);
    obs.brand = Some("CeraVe".to_string());

    let score = candidate_score(&TokenSetSimilarity, &obs, &existing, 0.12).unwrap();
    assert!((score - 0.52).abs() < 1e-9);
    assert!(score >= 0.5);

    obs.brand = None;
    let without = candidate_score(&TokenSetSimilarity, &obs, &existing, 0.12).unwrap();
    assert!(without < 0.5);
}

#[test]
fn different_canonical_keys_never_fuzzy_match() {
    let mut existing = entity(1, "Snail Mucin Essence");
    existing.canonical_key = Some("B0AAA".to_string());
    let mut obs = observation("Snail Mucin Essence", SignalSource::Momentum);
    obs.canonical_key = Some("B0BBB".to_string());

    assert!(candidate_score(&TokenSetSimilarity, &obs, &existing, 0.12).is_none());

    obs.canonical_key = None;
    assert!(candidate_score(&TokenSetSimilarity, &obs, &existing, 0.12).is_some());
}

#[test]
fn best_candidate_breaks_ties_by_lowest_id() {
    let obs = observation("Lip Sleeping Mask", SignalSource::Social);
    let candidates = vec![
        entity(9, "Lip Sleeping Mask"),
        entity(4, "lip sleeping mask"),
        entity(6, "Lip Mask"),
    ];
    let (winner, score) = best_candidate(&TokenSetSimilarity, &obs, candidates, 0.12).unwrap();
    assert_eq!(winner.id, 4);
    assert!((score - 1.0).abs() < f64::EPSILON);
}

#[test]
fn survivor_prefers_published_then_momentum_then_oldest() {
    let mut draft_old = entity(1, "A");
    draft_old.created_at = now() - Duration::days(30);
    let mut published = entity(2, "A");
    published.status = EntityStatus::Published;
    let mut on_list = entity(3, "A");
    on_list.on_momentum_list = true;

    let (survivor, losers) =
        split_survivor(vec![draft_old.clone(), on_list.clone(), published]).unwrap();
    assert_eq!(survivor.id, 2);
    assert_eq!(losers.len(), 2);

    let (survivor, _) = split_survivor(vec![draft_old.clone(), on_list]).unwrap();
    assert_eq!(survivor.id, 3);

    let mut twin = draft_old.clone();
    twin.id = 0;
    let (survivor, _) = split_survivor(vec![draft_old, twin]).unwrap();
    assert_eq!(survivor.id, 0);

    assert!(split_survivor(Vec::new()).is_none());
}

#[test]
fn attach_fills_missing_fields_and_marks_momentum() {
    let mut e = entity(1, "Glow Toner");
    e.first_detected_at = None;
    e.brand = Some("Glow Recipe".to_string());
    let mut obs = observation("Glow Toner", SignalSource::Momentum);
    obs.brand = Some("Other".to_string());
    obs.category = Some("skincare".to_string());
    obs.canonical_key = Some("B0TONER".to_string());

    attach_observation(&mut e, &obs, now());

    assert_eq!(e.brand.as_deref(), Some("Glow Recipe"));
    assert_eq!(e.category.as_deref(), Some("skincare"));
    assert_eq!(e.canonical_key.as_deref(), Some("B0TONER"));
    assert_eq!(e.first_detected_at, Some(obs.signal.observed_at));
    assert!(e.on_momentum_list);
    assert_eq!(
        e.last_seen_on_momentum_list_at,
        Some(obs.signal.observed_at)
    );
}

#[test]
fn attach_never_moves_first_detection_or_sets_it_in_the_future() {
    let mut e = entity(1, "Glow Toner");
    let original = e.first_detected_at;
    attach_observation(&mut e, &observation("Glow Toner", SignalSource::Social), now());
    assert_eq!(e.first_detected_at, original);

    let mut fresh = entity(2, "Glow Toner");
    fresh.first_detected_at = None;
    let mut obs = observation("Glow Toner", SignalSource::Social);
    obs.signal.observed_at = now() + Duration::days(3);
    attach_observation(&mut fresh, &obs, now());
    assert_eq!(fresh.first_detected_at, Some(now()));
}

#[test]
fn stale_momentum_observation_keeps_latest_sighting() {
    let mut e = entity(1, "Glow Toner");
    e.last_seen_on_momentum_list_at = Some(now());
    let mut obs = observation("Glow Toner", SignalSource::Momentum);
    obs.signal.observed_at = now() - Duration::days(2);
    attach_observation(&mut e, &obs, now());
    assert_eq!(e.last_seen_on_momentum_list_at, Some(now()));
}

#[test]
fn merge_fields_combines_both_sides() {
    let mut survivor = entity(1, "Vitamin C Serum");
    survivor.brand = Some("Truly".to_string());
    survivor.page_views = 120;
    survivor.clicks = 4;
    survivor.peak_score = Some(40);
    survivor.last_seen_on_momentum_list_at = Some(now() - Duration::days(3));

    let mut loser = entity(2, "Vit C Serum");
    loser.brand = Some("Other".to_string());
    loser.category = Some("skincare".to_string());
    loser.on_momentum_list = true;
    loser.page_views = 80;
    loser.clicks = 6;
    loser.peak_score = Some(75);
    loser.base_score = 55;
    loser.last_seen_on_momentum_list_at = Some(now());

    merge_fields(&mut survivor, &loser);

    assert_eq!(survivor.brand.as_deref(), Some("Truly"));
    assert_eq!(survivor.category.as_deref(), Some("skincare"));
    assert!(survivor.on_momentum_list);
    assert_eq!(survivor.last_seen_on_momentum_list_at, Some(now()));
    assert_eq!(survivor.page_views, 200);
    assert_eq!(survivor.clicks, 10);
    assert_eq!(survivor.peak_score, Some(75));
    assert_eq!(survivor.base_score, 55);
}
