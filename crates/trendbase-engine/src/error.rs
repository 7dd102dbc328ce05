use thiserror::Error;
use trendbase_core::{EntityId, StoreError, ValidationError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("entity {0} not found")]
    NotFound(EntityId),

    /// No fuzzy candidate reached the match threshold.
    #[error("no match for '{name}' (best candidate {best_id:?} scored {best_score:.2})")]
    MergeAmbiguous {
        name: String,
        best_id: Option<EntityId>,
        best_score: f64,
    },

    #[error("entity {0} was modified concurrently")]
    Conflict(EntityId),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl EngineError {
    /// Stable machine-readable code used in API error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::MergeAmbiguous { .. } => "merge_ambiguous",
            EngineError::Conflict(_) => "conflict",
            EngineError::PersistenceUnavailable(_) => "persistence_unavailable",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::Conflict(id) => EngineError::Conflict(id),
            StoreError::RunNotFound(id) => {
                EngineError::PersistenceUnavailable(format!("recalc run {id} not found"))
            }
            StoreError::Unavailable(message) => EngineError::PersistenceUnavailable(message),
        }
    }
}
