//! Store configuration, read from `STOCKLEDGER_*` environment variables.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::retry::RetryPolicy;

pub const DATABASE_URL_VAR: &str = "STOCKLEDGER_DATABASE_URL";
pub const BUSY_TIMEOUT_VAR: &str = "STOCKLEDGER_BUSY_TIMEOUT_MS";
pub const MAX_CONNECTIONS_VAR: &str = "STOCKLEDGER_MAX_CONNECTIONS";
pub const RETRY_ATTEMPTS_VAR: &str = "STOCKLEDGER_RETRY_ATTEMPTS";
pub const RETRY_BASE_DELAY_VAR: &str = "STOCKLEDGER_RETRY_BASE_DELAY_MS";

const DEFAULT_DATABASE_URL: &str = "sqlite://stockledger.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    /// How long SQLite waits on a held lock before reporting busy.
    pub busy_timeout: Duration,
    pub max_connections: u32,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            busy_timeout: Duration::from_secs(30),
            max_connections: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Defaults for everything except the database file.
    pub fn sqlite_file(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite://{}", path.as_ref().display()),
            ..Default::default()
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(DATABASE_URL_VAR) {
            config.database_url = url;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, BUSY_TIMEOUT_VAR)? {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, MAX_CONNECTIONS_VAR)? {
            anyhow::ensure!(n > 0, "{MAX_CONNECTIONS_VAR} must be at least 1");
            config.max_connections = n;
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, RETRY_ATTEMPTS_VAR)? {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, RETRY_BASE_DELAY_VAR)? {
            config.retry.base_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.database_url, "sqlite://stockledger.db");
        assert_eq!(config.busy_timeout, Duration::from_secs(30));
    }

    #[test]
    fn variables_override_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[
            (DATABASE_URL_VAR, "sqlite:///var/lib/stock.db"),
            (BUSY_TIMEOUT_VAR, "1500"),
            (MAX_CONNECTIONS_VAR, "8"),
            (RETRY_ATTEMPTS_VAR, "0"),
            (RETRY_BASE_DELAY_VAR, " 10 "),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite:///var/lib/stock.db");
        assert_eq!(config.busy_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.retry.max_attempts, 0);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn malformed_numbers_name_the_variable() {
        let err = StoreConfig::from_lookup(lookup(&[(BUSY_TIMEOUT_VAR, "soon")])).unwrap_err();
        assert!(err.to_string().contains(BUSY_TIMEOUT_VAR));

        assert!(StoreConfig::from_lookup(lookup(&[(MAX_CONNECTIONS_VAR, "0")])).is_err());
    }

    #[test]
    fn sqlite_file_builds_url() {
        let config = StoreConfig::sqlite_file("/tmp/ledger.db");
        assert_eq!(config.database_url, "sqlite:///tmp/ledger.db");
    }
}
