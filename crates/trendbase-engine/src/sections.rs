//! Cached homepage section reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use trendbase_core::{select_sections, HomepageSections};

use crate::TrendEngine;

struct CachedSections {
    sections: Arc<HomepageSections>,
    loaded_at: Instant,
}

impl CachedSections {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }
}

/// Per-limit section results with a fixed TTL.
pub(crate) struct SectionCache {
    ttl: Duration,
    entries: RwLock<HashMap<usize, CachedSections>>,
}

impl SectionCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, limit: usize) -> Option<Arc<HomepageSections>> {
        let guard = self.entries.read().await;
        guard
            .get(&limit)
            .filter(|cached| cached.is_fresh(self.ttl))
            .map(|cached| Arc::clone(&cached.sections))
    }

    async fn put(&self, limit: usize, sections: Arc<HomepageSections>) {
        let mut guard = self.entries.write().await;
        guard.insert(
            limit,
            CachedSections {
                sections,
                loaded_at: Instant::now(),
            },
        );
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl TrendEngine {
    /// Homepage sections capped at `limit` entries each.
    ///
    /// Storage reads are bounded by the configured timeout. A timeout or an
    /// unavailable store yields empty sections, which are not cached.
    pub async fn homepage_sections(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Arc<HomepageSections> {
        if let Some(hit) = self.sections.get(limit).await {
            debug!(limit, "section cache hit");
            return hit;
        }

        let read = tokio::time::timeout(
            self.config.section_query_timeout,
            self.store.list_section_candidates(),
        )
        .await;

        match read {
            Ok(Ok(entities)) => {
                let sections = Arc::new(select_sections(&entities, now, limit));
                self.sections.put(limit, Arc::clone(&sections)).await;
                debug!(
                    limit,
                    candidates = entities.len(),
                    entries = sections.total_entries(),
                    "section cache refreshed"
                );
                sections
            }
            Ok(Err(err)) => {
                warn!(error = %err, "section read failed, serving empty sections");
                Arc::new(HomepageSections::default())
            }
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(self.config.section_query_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                    "section read timed out, serving empty sections"
                );
                Arc::new(HomepageSections::default())
            }
        }
    }

    /// Drop every cached section result.
    pub async fn invalidate_sections(&self) {
        self.sections.clear().await;
        debug!("section cache invalidated");
    }
}
