use std::path::PathBuf;

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
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("ADWATCH_ENV", "development"))?;
    let log_level = or_default("ADWATCH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("ADWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("ADWATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("ADWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_base_url = or_default("ADWATCH_SCRAPER_BASE_URL", "http://127.0.0.1:8700");
    let scraper_request_timeout_secs = parse_u64("ADWATCH_SCRAPER_REQUEST_TIMEOUT_SECS", "60")?;
    let user_agent = or_default("ADWATCH_USER_AGENT", "adwatch/0.1 (ad-intelligence)");

    let min_competitor_delay_secs = parse_u64("ADWATCH_MIN_COMPETITOR_DELAY_SECS", "30")?;
    let max_competitor_delay_secs = parse_u64("ADWATCH_MAX_COMPETITOR_DELAY_SECS", "60")?;
    if min_competitor_delay_secs > max_competitor_delay_secs {
        return Err(ConfigError::InvalidEnvVar {
            var: "ADWATCH_MIN_COMPETITOR_DELAY_SECS".to_string(),
            reason: format!(
                "must not exceed ADWATCH_MAX_COMPETITOR_DELAY_SECS ({max_competitor_delay_secs})"
            ),
        });
    }

    let max_retries = parse_u32("ADWATCH_MAX_RETRIES", "3")?;
    if max_retries == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "ADWATCH_MAX_RETRIES".to_string(),
            reason: "at least one attempt is required".to_string(),
        });
    }
    let retry_delay_secs = parse_u64("ADWATCH_RETRY_DELAY_SECS", "5")?;

    let media_base_path = PathBuf::from(or_default("ADWATCH_MEDIA_BASE_PATH", "./data/media"));
    let media_concurrency = parse_usize("ADWATCH_MEDIA_CONCURRENCY", "3")?;
    let media_timeout_secs = parse_u64("ADWATCH_MEDIA_TIMEOUT_SECS", "60")?;
    let screenshot_dir = PathBuf::from(or_default("ADWATCH_SCREENSHOT_DIR", "./logs/screenshots"));
    let stale_run_hours = parse_u64("ADWATCH_STALE_RUN_HOURS", "24")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_base_url,
        scraper_request_timeout_secs,
        user_agent,
        min_competitor_delay_secs,
        max_competitor_delay_secs,
        max_retries,
        retry_delay_secs,
        media_base_path,
        media_concurrency,
        media_timeout_secs,
        screenshot_dir,
        stale_run_hours,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ADWATCH_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
