//! Domain types and pure scoring logic for trendbase.
//!
//! Everything in this crate is free of I/O except configuration loading. The
//! persistence seam ([`EntityStore`]) is declared here so that the engine and
//! the Postgres layer can meet without depending on each other.

pub mod app_config;
pub mod config;
pub mod decay;
pub mod entity;
pub mod scoring;
pub mod sections;
pub mod similarity;
pub mod store;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use decay::{days_trending, decay_percent, decayed_base, traffic_boost, DecayOutcome};
pub use entity::{
    Entity, EntityId, EntityStatus, NewEntity, NewSignal, Observation, RawSignal, Signal,
    SignalSource, ValidationError,
};
pub use scoring::{apply_drop_off, compose, drop_off_penalty, recompute_base, ScoreBreakdown};
pub use sections::{
    is_section_eligible, select_sections, HomepageSections, SectionEntry, SectionKind,
};
pub use similarity::{NameSimilarity, TokenSetSimilarity};
pub use store::{
    CandidateFilter, EntityStore, RecalcRun, RecalcRunStatus, RecalcTotals, RecalcTrigger,
    StoreError,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
