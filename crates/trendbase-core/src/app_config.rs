use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Minimum similarity (brand bonus included) for a fuzzy name match.
    pub match_threshold: f64,
    /// Added to the token similarity when both brands normalize-equal.
    pub match_brand_bonus: f64,
    pub resolver_max_retries: u32,
    /// Fuzzy-match candidates loaded per observation, brand matches first.
    pub match_candidate_limit: i64,
    /// Six-field cron expression (seconds first) for the daily recalculation.
    pub recalc_cron: String,
    pub recalc_concurrency: usize,
    pub section_cache_ttl_secs: u64,
    pub section_query_timeout_ms: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("match_threshold", &self.match_threshold)
            .field("match_brand_bonus", &self.match_brand_bonus)
            .field("resolver_max_retries", &self.resolver_max_retries)
            .field("match_candidate_limit", &self.match_candidate_limit)
            .field("recalc_cron", &self.recalc_cron)
            .field("recalc_concurrency", &self.recalc_concurrency)
            .field("section_cache_ttl_secs", &self.section_cache_ttl_secs)
            .field("section_query_timeout_ms", &self.section_query_timeout_ms)
            .finish()
    }
}
