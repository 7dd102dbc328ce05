//! Canonical entities, their signals, and the raw records collectors submit.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type EntityId = i64;

const MAX_NAME_LEN: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Draft,
    Flagged,
    Published,
}

impl EntityStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityStatus::Draft => "draft",
            EntityStatus::Flagged => "flagged",
            EntityStatus::Published => "published",
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EntityStatus::Draft),
            "flagged" => Ok(EntityStatus::Flagged),
            "published" => Ok(EntityStatus::Published),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Which collaborator produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Momentum,
    Social,
    SearchTrend,
}

impl SignalSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SignalSource::Momentum => "momentum",
            SignalSource::Social => "social",
            SignalSource::SearchTrend => "search_trend",
        }
    }

    /// Signal type recorded when a collector does not supply one.
    #[must_use]
    pub fn default_signal_type(self) -> &'static str {
        match self {
            SignalSource::Momentum => "rank_jump",
            SignalSource::Social => "mention",
            SignalSource::SearchTrend => "spike",
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "momentum" => Ok(SignalSource::Momentum),
            "social" => Ok(SignalSource::Social),
            "search_trend" => Ok(SignalSource::SearchTrend),
            other => Err(ValidationError::UnknownSource(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("raw_name must not be empty")]
    EmptyName,

    #[error("raw_name is {0} characters; the maximum is 300")]
    NameTooLong(usize),

    #[error("magnitude must be a finite number")]
    NonFiniteMagnitude,

    #[error("price must not be negative")]
    NegativePrice,

    #[error("metadata must be a JSON object")]
    MetadataNotObject,

    #[error("score {0} is outside 0..=100")]
    ScoreOutOfRange(i64),

    #[error("unknown signal source '{0}'")]
    UnknownSource(String),

    #[error("unknown entity status '{0}'")]
    UnknownStatus(String),

    #[error("{0}")]
    Invalid(String),
}

/// One canonical, deduplicated real-world item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub canonical_name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    /// Marketplace URL or ASIN; exact matches always win over fuzzy matching.
    pub canonical_key: Option<String>,
    pub status: EntityStatus,
    /// Set by the content pipeline once generated copy exists.
    pub has_content: bool,
    pub base_score: i16,
    /// `None` until the first age-decay evaluation.
    pub current_score: Option<i16>,
    pub peak_score: Option<i16>,
    pub days_trending: Option<i32>,
    pub should_show_on_homepage: bool,
    pub early_signal: bool,
    pub first_detected_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
    pub on_momentum_list: bool,
    pub last_seen_on_momentum_list_at: Option<DateTime<Utc>>,
    pub page_views: i64,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped by every persisted write.
    pub version: i64,
}

impl Entity {
    /// The entity was on the momentum list and has since left it.
    #[must_use]
    pub fn dropped_off(&self) -> bool {
        !self.on_momentum_list && self.last_seen_on_momentum_list_at.is_some()
    }

    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.first_detected_at.is_some()
    }

    /// Current score, falling back to the base score before the first decay pass.
    #[must_use]
    pub fn effective_score(&self) -> i16 {
        self.current_score.unwrap_or(self.base_score)
    }

    /// Peak score, falling back to current and then base score.
    #[must_use]
    pub fn effective_peak(&self) -> i16 {
        self.peak_score
            .or(self.current_score)
            .unwrap_or(self.base_score)
    }
}

/// Fields for inserting a fresh entity. Storage assigns id, timestamps and version.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub canonical_name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub canonical_key: Option<String>,
    pub status: EntityStatus,
    pub base_score: i16,
    pub early_signal: bool,
    pub first_detected_at: Option<DateTime<Utc>>,
    pub on_momentum_list: bool,
    pub last_seen_on_momentum_list_at: Option<DateTime<Utc>>,
}

/// One observed data point, owned by exactly one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub entity_id: EntityId,
    pub source: SignalSource,
    pub signal_type: String,
    pub magnitude: f64,
    pub metadata: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSignal {
    pub source: SignalSource,
    pub signal_type: String,
    pub magnitude: f64,
    pub metadata: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

/// A record as submitted by a collector. Untrusted until validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub source: SignalSource,
    pub raw_name: String,
    #[serde(default)]
    pub raw_brand: Option<String>,
    #[serde(default)]
    pub canonical_key: Option<String>,
    #[serde(default)]
    pub signal_type: Option<String>,
    /// Unknown magnitudes count as zero.
    #[serde(default)]
    pub magnitude: Option<f64>,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// A validated, normalized raw signal ready for the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub brand: Option<String>,
    pub canonical_key: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub signal: NewSignal,
}

impl RawSignal {
    /// Validate and normalize the record.
    ///
    /// Whitespace in names is collapsed; blank optional strings become `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the name is empty or too long, the
    /// magnitude is not finite, the price is negative, or metadata is not an
    /// object.
    pub fn into_observation(self) -> Result<Observation, ValidationError> {
        let name = collapse_whitespace(&self.raw_name);
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let name_len = name.chars().count();
        if name_len > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong(name_len));
        }

        let magnitude = self.magnitude.unwrap_or(0.0);
        if !magnitude.is_finite() {
            return Err(ValidationError::NonFiniteMagnitude);
        }

        if self.price.is_some_and(|p| p.is_sign_negative() && !p.is_zero()) {
            return Err(ValidationError::NegativePrice);
        }

        if !self.metadata.is_object() {
            return Err(ValidationError::MetadataNotObject);
        }

        let signal_type = non_blank(self.signal_type)
            .unwrap_or_else(|| self.source.default_signal_type().to_string());

        Ok(Observation {
            name,
            brand: non_blank(self.raw_brand).map(|b| collapse_whitespace(&b)),
            canonical_key: normalize_canonical_key(self.canonical_key.as_deref()),
            category: non_blank(self.category),
            price: self.price,
            signal: NewSignal {
                source: self.source,
                signal_type,
                magnitude,
                metadata: self.metadata,
                observed_at: self.observed_at,
            },
        })
    }
}

/// Trim a canonical key; blank keys are treated as absent.
#[must_use]
pub fn normalize_canonical_key(key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ToOwned::to_owned)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(name: &str) -> RawSignal {
        RawSignal {
            source: SignalSource::Social,
            raw_name: name.to_string(),
            raw_brand: None,
            canonical_key: None,
            signal_type: None,
            magnitude: Some(320.0),
            metadata: empty_metadata(),
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            category: None,
            price: None,
        }
    }

    #[test]
    fn into_observation_collapses_whitespace_and_defaults_type() {
        let mut record = raw("  CeraVe   Moisturizing\tCream ");
        record.raw_brand = Some("   ".to_string());
        record.canonical_key = Some("  B00TTD9BRC ".to_string());
        let obs = record.into_observation().expect("valid");
        assert_eq!(obs.name, "CeraVe Moisturizing Cream");
        assert!(obs.brand.is_none());
        assert_eq!(obs.canonical_key.as_deref(), Some("B00TTD9BRC"));
        assert_eq!(obs.signal.signal_type, "mention");
    }

    #[test]
    fn into_observation_rejects_blank_name() {
        assert_eq!(
            raw("   ").into_observation().unwrap_err(),
            ValidationError::EmptyName
        );
    }

    #[test]
    fn into_observation_rejects_long_name() {
        let long = "x".repeat(301);
        assert_eq!(
            raw(&long).into_observation().unwrap_err(),
            ValidationError::NameTooLong(301)
        );
    }

    #[test]
    fn into_observation_rejects_nan_magnitude() {
        let mut record = raw("Lip Oil");
        record.magnitude = Some(f64::NAN);
        assert_eq!(
            record.into_observation().unwrap_err(),
            ValidationError::NonFiniteMagnitude
        );
    }

    #[test]
    fn into_observation_rejects_non_object_metadata() {
        let mut record = raw("Lip Oil");
        record.metadata = serde_json::json!([1, 2, 3]);
        assert_eq!(
            record.into_observation().unwrap_err(),
            ValidationError::MetadataNotObject
        );
    }

    #[test]
    fn into_observation_rejects_negative_price() {
        let mut record = raw("Lip Oil");
        record.price = Some(Decimal::new(-199, 2));
        assert_eq!(
            record.into_observation().unwrap_err(),
            ValidationError::NegativePrice
        );
    }

    #[test]
    fn missing_magnitude_counts_as_zero() {
        let mut record = raw("Lip Oil");
        record.magnitude = None;
        let obs = record.into_observation().expect("valid");
        assert!(obs.signal.magnitude.abs() < f64::EPSILON);
    }

    #[test]
    fn raw_signal_deserializes_with_defaults() {
        let json = r#"{
            "source": "search_trend",
            "raw_name": "Snail Mucin Essence",
            "magnitude": 12.5,
            "observed_at": "2026-03-01T00:00:00Z"
        }"#;
        let record: RawSignal = serde_json::from_str(json).expect("parse");
        assert_eq!(record.source, SignalSource::SearchTrend);
        assert!(record.metadata.is_object());
        assert!(record.canonical_key.is_none());
    }

    #[test]
    fn status_and_source_round_trip_through_strings() {
        for status in [
            EntityStatus::Draft,
            EntityStatus::Flagged,
            EntityStatus::Published,
        ] {
            assert_eq!(status.as_str().parse::<EntityStatus>().unwrap(), status);
        }
        assert_eq!(
            "search_trend".parse::<SignalSource>().unwrap(),
            SignalSource::SearchTrend
        );
        assert!("tiktok".parse::<SignalSource>().is_err());
    }

    #[test]
    fn dropped_off_requires_prior_presence() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut entity = Entity {
            id: 1,
            canonical_name: "Lip Oil".to_string(),
            brand: None,
            category: None,
            price: None,
            canonical_key: None,
            status: EntityStatus::Draft,
            has_content: false,
            base_score: 40,
            current_score: None,
            peak_score: None,
            days_trending: None,
            should_show_on_homepage: false,
            early_signal: false,
            first_detected_at: Some(now),
            last_updated_at: now,
            on_momentum_list: false,
            last_seen_on_momentum_list_at: None,
            page_views: 0,
            clicks: 0,
            created_at: now,
            version: 1,
        };
        assert!(!entity.dropped_off());
        entity.last_seen_on_momentum_list_at = Some(now);
        assert!(entity.dropped_off());
        entity.on_momentum_list = true;
        assert!(!entity.dropped_off());
        assert_eq!(entity.effective_score(), 40);
        assert_eq!(entity.effective_peak(), 40);
    }
}
