use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the process environment so they
/// can be tested with a pure `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_fraction = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let value = or_default(var, default)
            .parse::<f64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if (0.0..=1.0).contains(&value) {
            Ok(value)
        } else {
            Err(invalid(var, format!("{value} is outside [0, 1]")))
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("TRENDBASE_ENV", "development"))?;

    let bind_addr = parse_addr("TRENDBASE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("TRENDBASE_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("TRENDBASE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("TRENDBASE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("TRENDBASE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let match_threshold = parse_fraction("TRENDBASE_MATCH_THRESHOLD", "0.5")?;
    let match_brand_bonus = parse_fraction("TRENDBASE_MATCH_BRAND_BONUS", "0.12")?;
    let resolver_max_retries = parse_u32("TRENDBASE_RESOLVER_MAX_RETRIES", "3")?;
    let match_candidate_limit = parse_u32("TRENDBASE_MATCH_CANDIDATE_LIMIT", "200")?;
    if !(1..=5_000).contains(&match_candidate_limit) {
        return Err(invalid(
            "TRENDBASE_MATCH_CANDIDATE_LIMIT",
            format!("{match_candidate_limit} is outside [1, 5000]"),
        ));
    }

    let recalc_cron = or_default("TRENDBASE_RECALC_CRON", "0 0 4 * * *");
    let recalc_concurrency = parse_usize("TRENDBASE_RECALC_CONCURRENCY", "4")?;
    if recalc_concurrency == 0 {
        return Err(invalid(
            "TRENDBASE_RECALC_CONCURRENCY",
            "must be at least 1".to_string(),
        ));
    }

    let section_cache_ttl_secs = parse_u64("TRENDBASE_SECTION_CACHE_TTL_SECS", "300")?;
    let section_query_timeout_ms = parse_u64("TRENDBASE_SECTION_QUERY_TIMEOUT_MS", "2000")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        match_threshold,
        match_brand_bonus,
        resolver_max_retries,
        match_candidate_limit: i64::from(match_candidate_limit),
        recalc_cron,
        recalc_concurrency,
        section_cache_ttl_secs,
        section_query_timeout_ms,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "production" => Ok(Environment::Production),
        "test" => Ok(Environment::Test),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TRENDBASE_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
