use std::time::Duration;

use testbed_core::error::CoreError;

use crate::release::DEFAULT_RELEASE_PAGE_SIZE;

/// Lease engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasingConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Page size used by the release sweep and the expiry reaper.
    pub release_page_size: i64,
    /// Whether expired leases are cleared in the background.
    pub reaper_enabled: bool,
    pub reaper_interval: Duration,
}

impl LeasingConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                      | Default    |
    /// |------------------------------|------------|
    /// | `DATABASE_URL`               | (required) |
    /// | `DATABASE_MAX_CONNECTIONS`   | `20`       |
    /// | `RELEASE_PAGE_SIZE`          | `10`       |
    /// | `LEASE_REAPER_ENABLED`       | `false`    |
    /// | `LEASE_REAPER_INTERVAL_SECS` | `60`       |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CoreError::InvalidArgument("DATABASE_URL must be set".to_string()))?;

        let database_max_connections: u32 = parse(&lookup, "DATABASE_MAX_CONNECTIONS", 20)?;
        let release_page_size: i64 =
            parse(&lookup, "RELEASE_PAGE_SIZE", DEFAULT_RELEASE_PAGE_SIZE)?;
        if release_page_size < 1 {
            return Err(CoreError::InvalidArgument(
                "RELEASE_PAGE_SIZE must be at least 1".to_string(),
            ));
        }
        let reaper_enabled: bool = parse(&lookup, "LEASE_REAPER_ENABLED", false)?;
        let reaper_interval_secs: u64 = parse(&lookup, "LEASE_REAPER_INTERVAL_SECS", 60)?;
        if reaper_interval_secs == 0 {
            return Err(CoreError::InvalidArgument(
                "LEASE_REAPER_INTERVAL_SECS must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            release_page_size,
            reaper_enabled,
            reaper_interval: Duration::from_secs(reaper_interval_secs),
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::InvalidArgument(format!("{key} has an invalid value: {raw}"))),
    }
}
