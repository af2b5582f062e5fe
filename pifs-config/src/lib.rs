//! Runtime configuration for `pifs-server` and `pifs-worker`.
//!
//! There is no global singleton here, deliberately: every value is read
//! once at process start into a plain [`Config`] struct and handed down
//! through the application root to handlers and workers (spec §9, "Global
//! client singletons for catalogue/Redis"). A missing required variable
//! fails startup immediately instead of surfacing as a confusing runtime
//! error deep in a request handler.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_MAX_CONTENT_LENGTH: u64 = 50 * 1024 * 1024 * 1024; // 50 GiB
const DEFAULT_ASYNC_THRESHOLD_BYTES: u64 = 64 * 1024 * 1024; // 64 MiB, per spec §9 Open Question
const DEFAULT_LOCK_TTL_SECS: u64 = 3600;
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 900;

/// Everything the core needs to run, read from the process environment
/// once at startup (spec §6 "Environment/config keys").
#[derive(Debug, Clone)]
pub struct Config {
    pub upload_projects_path: String,
    pub upload_tmp_path: String,
    pub upload_trash_path: String,
    pub max_content_length: u64,
    pub upload_async_threshold_bytes: u64,
    pub upload_lock_ttl: Duration,
    pub upload_lock_timeout: Duration,
    pub storage_id: String,
    pub catalogue_base_url: String,
    pub catalogue_token: String,
    pub redis_url: String,
    pub database_url: String,
    pub admin_token: String,
}

impl Config {
    /// Reads and validates every key from the environment. Fails closed:
    /// a required key missing or unparsable aborts startup rather than
    /// falling back to a silent default.
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            upload_projects_path: required("UPLOAD_PROJECTS_PATH")?,
            upload_tmp_path: required("UPLOAD_TMP_PATH")?,
            upload_trash_path: required("UPLOAD_TRASH_PATH")?,
            max_content_length: optional_u64("MAX_CONTENT_LENGTH", DEFAULT_MAX_CONTENT_LENGTH)?,
            upload_async_threshold_bytes: optional_u64(
                "UPLOAD_ASYNC_THRESHOLD_BYTES",
                DEFAULT_ASYNC_THRESHOLD_BYTES,
            )?,
            upload_lock_ttl: Duration::from_secs(optional_u64(
                "UPLOAD_LOCK_TTL",
                DEFAULT_LOCK_TTL_SECS,
            )?),
            upload_lock_timeout: Duration::from_secs(optional_u64(
                "UPLOAD_LOCK_TIMEOUT",
                DEFAULT_LOCK_TIMEOUT_SECS,
            )?),
            storage_id: required("STORAGE_ID")?,
            catalogue_base_url: required("CATALOGUE_BASE_URL")?,
            catalogue_token: required("CATALOGUE_TOKEN")?,
            redis_url: required("REDIS_URL")?,
            database_url: required("DATABASE_URL")?,
            admin_token: required("ADMIN_TOKEN")?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn optional_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(val) => val
            .parse()
            .with_context(|| format!("environment variable {key} is not a valid integer: {val}")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => bail!("environment variable {key} is not valid unicode: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_u64_falls_back_to_default_when_unset() {
        env::remove_var("PIFS_TEST_UNSET_KEY");
        assert_eq!(
            optional_u64("PIFS_TEST_UNSET_KEY", 42).unwrap(),
            42
        );
    }

    #[test]
    fn optional_u64_rejects_non_integer_values() {
        env::set_var("PIFS_TEST_BAD_KEY", "not-a-number");
        assert!(optional_u64("PIFS_TEST_BAD_KEY", 1).is_err());
        env::remove_var("PIFS_TEST_BAD_KEY");
    }

    #[test]
    fn required_reports_missing_key_by_name() {
        env::remove_var("PIFS_TEST_MISSING_KEY");
        let err = required("PIFS_TEST_MISSING_KEY").unwrap_err();
        assert!(err.to_string().contains("PIFS_TEST_MISSING_KEY"));
    }
}
