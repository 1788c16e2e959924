//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Unprefixed variables still honoured, with the config key each one sets
const LEGACY_ENV: &[(&str, &str)] = &[
    ("OPENROUTER_API_KEY", "llm.api_key"),
    ("OPENROUTER_BASE_URL", "llm.base_url"),
    ("OPENROUTER_MODEL", "llm.model"),
    ("OPENROUTER_PRICE_PER_1K", "llm.price_per_1k"),
    ("PINECONE_API_KEY", "index.pinecone_api_key"),
    ("PINECONE_INDEX_HOST", "index.pinecone_host"),
    ("PINECONE_UPSERT_COST", "index.upsert_cost"),
    ("COST_ALERT_LIMIT", "monitor.alert_limit"),
    ("MONITOR_LOG_PATH", "monitor.log_path"),
    ("MONITOR_DASHBOARD_URL", "monitor.dashboard_url"),
    ("MONITOR_DASHBOARD_RETRIES", "monitor.dashboard_retries"),
    ("MONITOR_DASHBOARD_TIMEOUT", "monitor.dashboard_timeout_secs"),
];

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let mut builder = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority)
        // prefix_separator("_") ensures DENSEX_MONITOR__X works (single _ after prefix).
        .add_source(
            Environment::with_prefix("DENSEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    for (key, value) in legacy_overrides(|name| std::env::var(name).ok()) {
        builder = builder
            .set_override(key, value)
            .with_context(|| format!("Invalid override for {key}"))?;
    }

    builder
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Legacy variables that are set and not shadowed by a `DENSEX_` variable
fn legacy_overrides(lookup: impl Fn(&str) -> Option<String>) -> Vec<(&'static str, String)> {
    LEGACY_ENV
        .iter()
        .filter(|(_, key)| lookup(&prefixed_name(key)).is_none())
        .filter_map(|(name, key)| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .map(|v| (*key, v))
        })
        .collect()
}

/// `monitor.alert_limit` -> `DENSEX_MONITOR__ALERT_LIMIT`
fn prefixed_name(key: &str) -> String {
    format!("DENSEX_{}", key.replace('.', "__").to_uppercase())
}
