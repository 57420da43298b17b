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

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.into(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a
/// plain `HashMap`.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    // Empty strings count as unset for optional secrets and URLs.
    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
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

    let parse_f32 = |var: &str, default: &str| -> Result<f32, ConfigError> {
        or_default(var, default)
            .parse::<f32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("SHOPDB_ENV", "development"));
    let bind_addr = parse_addr("SHOPDB_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("SHOPDB_LOG_LEVEL", "info");
    let locales_path = PathBuf::from(or_default(
        "SHOPDB_LOCALES_PATH",
        "./config/assistant.yaml",
    ));
    let store_name = or_default("SHOPDB_STORE_NAME", "Shop");

    let db_max_connections = parse_u32("SHOPDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SHOPDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SHOPDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let tei_url = trim_url(&or_default("SHOPDB_TEI_URL", "http://localhost:8080"));
    let qdrant_url = trim_url(&or_default("SHOPDB_QDRANT_URL", "http://localhost:6333"));
    let qdrant_collection_prefix = or_default("SHOPDB_QDRANT_COLLECTION_PREFIX", "shopdb");
    let embedding_dim = parse_u64("SHOPDB_EMBEDDING_DIM", "1024")?;
    if embedding_dim == 0 {
        return Err(invalid("SHOPDB_EMBEDDING_DIM", "must be greater than zero"));
    }

    let llm_base_url = trim_url(&or_default(
        "SHOPDB_LLM_BASE_URL",
        "https://api.openai.com/v1",
    ));
    let llm_api_key = optional("SHOPDB_LLM_API_KEY");
    let llm_model = or_default("SHOPDB_LLM_MODEL", "gpt-4o-mini");
    let llm_max_tokens = parse_u32("SHOPDB_LLM_MAX_TOKENS", "512")?;
    let llm_temperature = parse_f32("SHOPDB_LLM_TEMPERATURE", "0.2")?;
    if !(0.0..=2.0).contains(&llm_temperature) {
        return Err(invalid("SHOPDB_LLM_TEMPERATURE", "must be within 0.0..=2.0"));
    }
    let llm_timeout_secs = parse_u64("SHOPDB_LLM_TIMEOUT_SECS", "60")?;
    let llm_max_retries = parse_u32("SHOPDB_LLM_MAX_RETRIES", "3")?;
    let llm_retry_backoff_base_ms = parse_u64("SHOPDB_LLM_RETRY_BACKOFF_BASE_MS", "1000")?;
    let llm_min_request_interval_ms = parse_u64("SHOPDB_LLM_MIN_REQUEST_INTERVAL_MS", "500")?;

    let translate_url = optional("SHOPDB_TRANSLATE_URL").map(|u| trim_url(&u));
    let translate_api_key = optional("SHOPDB_TRANSLATE_API_KEY");
    let catalog_language = or_default("SHOPDB_CATALOG_LANGUAGE", "en").to_lowercase();

    let retrieval_top_k = parse_usize("SHOPDB_RETRIEVAL_TOP_K", "5")?;
    if retrieval_top_k == 0 {
        return Err(invalid("SHOPDB_RETRIEVAL_TOP_K", "must be at least 1"));
    }
    let retrieval_min_score = parse_f32("SHOPDB_RETRIEVAL_MIN_SCORE", "0.3")?;
    if !(-1.0..=1.0).contains(&retrieval_min_score) {
        return Err(invalid(
            "SHOPDB_RETRIEVAL_MIN_SCORE",
            "cosine score threshold must be within -1.0..=1.0",
        ));
    }
    let history_turns = parse_usize("SHOPDB_HISTORY_TURNS", "6")?;
    let reindex_cron = or_default("SHOPDB_REINDEX_CRON", "0 0 3 * * *");
    let trust_forwarded_for = parse_bool("SHOPDB_TRUST_FORWARDED_FOR", "false")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        locales_path,
        store_name,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        tei_url,
        qdrant_url,
        qdrant_collection_prefix,
        embedding_dim,
        llm_base_url,
        llm_api_key,
        llm_model,
        llm_max_tokens,
        llm_temperature,
        llm_timeout_secs,
        llm_max_retries,
        llm_retry_backoff_base_ms,
        llm_min_request_interval_ms,
        translate_url,
        translate_api_key,
        catalog_language,
        retrieval_top_k,
        retrieval_min_score,
        history_turns,
        reindex_cron,
        trust_forwarded_for,
    })
}

fn trim_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
