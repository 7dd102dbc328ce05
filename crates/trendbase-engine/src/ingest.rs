//! Batch ingestion of raw signal records.
//!
//! Malformed records are rejected individually and never abort the batch.
//! Records are resolved in submission order so that two records for the same
//! new item within one batch land on the same entity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use trendbase_core::{Observation, RawSignal};

use crate::resolver::ResolutionKind;
use crate::TrendEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Position of the record in the submitted batch.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub index: usize,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub created: usize,
    pub attached: usize,
    pub merged_duplicates: usize,
    pub rejected: Vec<Rejection>,
    pub failed: Vec<IngestFailure>,
}

/// Parse and validate raw records without touching storage.
#[must_use]
pub fn validate_records(
    records: Vec<serde_json::Value>,
) -> (Vec<(usize, Observation)>, Vec<Rejection>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for (index, value) in records.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RawSignal>(value)
            .map_err(|e| e.to_string())
            .and_then(|raw| raw.into_observation().map_err(|e| e.to_string()));
        match parsed {
            Ok(observation) => accepted.push((index, observation)),
            Err(reason) => rejected.push(Rejection { index, reason }),
        }
    }

    (accepted, rejected)
}

impl TrendEngine {
    /// Validate and resolve a batch of raw records.
    pub async fn ingest(
        &self,
        records: Vec<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> IngestReport {
        let total = records.len();
        let (observations, rejected) = validate_records(records);

        for rejection in &rejected {
            warn!(index = rejection.index, reason = %rejection.reason, "rejected raw signal");
        }

        let mut report = IngestReport {
            accepted: observations.len(),
            rejected,
            ..IngestReport::default()
        };

        for (index, observation) in &observations {
            match self.resolve(observation, now).await {
                Ok(outcome) => {
                    match outcome.kind {
                        ResolutionKind::Created => report.created += 1,
                        ResolutionKind::AttachedByKey | ResolutionKind::AttachedByName { .. } => {
                            report.attached += 1;
                        }
                    }
                    report.merged_duplicates += outcome.merged_duplicates;
                }
                Err(err) => {
                    warn!(
                        index = *index,
                        source = %observation.signal.source,
                        name = %observation.name,
                        error = %err,
                        "failed to resolve raw signal"
                    );
                    report.failed.push(IngestFailure {
                        index: *index,
                        code: err.code(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if report.attached > 0 || report.merged_duplicates > 0 {
            self.invalidate_sections().await;
        }

        info!(
            total,
            accepted = report.accepted,
            rejected = report.rejected.len(),
            created = report.created,
            attached = report.attached,
            merged_duplicates = report.merged_duplicates,
            failed = report.failed.len(),
            "ingest complete"
        );

        report
    }
}
