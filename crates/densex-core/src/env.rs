//! Required environment variables

use std::collections::HashMap;
use tracing::debug;

use crate::error::{Error, Result};

/// Load `.env` (if present) and resolve every variable in `required`.
///
/// Returns the resolved values keyed by name. Fails on the first name that
/// is blank, unset or set to an empty value.
pub async fn load_env(required: &[&str]) -> Result<HashMap<String, String>> {
    if required.iter().any(|name| name.trim().is_empty()) {
        return Err(Error::Configuration(
            "environment variable names must be non-empty".to_string(),
        ));
    }

    let loaded = tokio::task::spawn_blocking(dotenvy::dotenv)
        .await
        .map_err(|e| Error::Configuration(format!("failed to load .env: {e}")))?;
    match loaded {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(Error::Configuration(format!("failed to load .env: {e}"))),
    }

    let mut values = HashMap::with_capacity(required.len());
    for name in required {
        match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => {
                values.insert((*name).to_string(), value);
            }
            _ => {
                return Err(Error::Configuration(format!(
                    "Missing environment variable: {name}"
                )))
            }
        }
    }
    Ok(values)
}
