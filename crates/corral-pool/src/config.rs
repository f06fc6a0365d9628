//! Pool configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::PoolError;

/// Property key for the lease timeout, in milliseconds.
pub const PROPERTY_CONNECTION_TIME_OUT: &str = "CONNECTION_TIME_OUT";
/// Property key for the idle-queue capacity.
pub const PROPERTY_MAX_IDLE_SIZE: &str = "MAX_IDLE_SIZE";
/// Property key for the maximum pool size.
pub const PROPERTY_MAX_SIZE: &str = "MAX_SIZE";
/// Property key for the minimum pool size.
pub const PROPERTY_MIN_SIZE: &str = "MIN_SIZE";
/// Property key for the maintenance interval, in milliseconds.
pub const PROPERTY_TIME_BETWEEN_POOL_MAINTENANCE: &str = "TIME_BETWEEN_POOL_MAINTENANCE";
/// Property key for the acquire wait timeout, in milliseconds.
pub const PROPERTY_WAIT_TIME_OUT: &str = "WAIT_TIME_OUT";

/// Configuration for the connection pool.
///
/// Immutable once a pool is built. This struct is marked
/// `#[non_exhaustive]` to allow adding new fields in future minor
/// versions without breaking changes; use the builder-style methods or
/// [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Minimum number of connections to maintain (warm-up target).
    pub min_size: usize,

    /// Maximum number of live connections, idle or checked out.
    pub max_size: usize,

    /// Idle-queue capacity. Connections recycled beyond this are disposed.
    pub max_idle: usize,

    /// Maximum time a checked-out connection may be held before the pool
    /// reclaims it.
    pub lease_timeout: Duration,

    /// Maximum time a caller blocks in `acquire` waiting for a connection.
    pub wait_timeout: Duration,

    /// Interval between maintenance sweeps. Zero disables background
    /// maintenance.
    pub maintenance_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            max_idle: 10,
            lease_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(30),
            maintenance_interval: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum pool size.
    #[must_use]
    pub fn min_size(mut self, count: usize) -> Self {
        self.min_size = count;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_size(mut self, count: usize) -> Self {
        self.max_size = count;
        self
    }

    /// Set the idle-queue capacity.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    /// Set the connection lease timeout.
    #[must_use]
    pub fn lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    /// Set the acquire wait timeout.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the interval between maintenance sweeps.
    #[must_use]
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Parse a configuration from `KEY=VALUE` properties text.
    ///
    /// Recognized keys (all required, all numeric, durations in
    /// milliseconds): `CONNECTION_TIME_OUT`, `MAX_IDLE_SIZE`, `MAX_SIZE`,
    /// `MIN_SIZE`, `TIME_BETWEEN_POOL_MAINTENANCE`, `WAIT_TIME_OUT`.
    /// Blank lines and lines starting with `#` or `!` are ignored.
    pub fn from_properties(text: &str) -> Result<Self, PoolError> {
        let mut entries: HashMap<&str, &str> = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                PoolError::Configuration(format!("malformed property line: {line:?}"))
            })?;
            entries.insert(key.trim(), value.trim());
        }

        let config = Self {
            min_size: required(&entries, PROPERTY_MIN_SIZE)?,
            max_size: required(&entries, PROPERTY_MAX_SIZE)?,
            max_idle: required(&entries, PROPERTY_MAX_IDLE_SIZE)?,
            lease_timeout: Duration::from_millis(required(&entries, PROPERTY_CONNECTION_TIME_OUT)?),
            wait_timeout: Duration::from_millis(required(&entries, PROPERTY_WAIT_TIME_OUT)?),
            maintenance_interval: Duration::from_millis(required(
                &entries,
                PROPERTY_TIME_BETWEEN_POOL_MAINTENANCE,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Enforces `min_size <= max_idle <= max_size` and `max_size >= 1`.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::Configuration(
                "max_size must be greater than 0".into(),
            ));
        }
        if self.min_size > self.max_idle {
            return Err(PoolError::Configuration(
                "min_size cannot be greater than max_idle".into(),
            ));
        }
        if self.max_idle > self.max_size {
            return Err(PoolError::Configuration(
                "max_idle cannot be greater than max_size".into(),
            ));
        }
        Ok(())
    }
}

fn required<T: std::str::FromStr>(
    entries: &HashMap<&str, &str>,
    key: &str,
) -> Result<T, PoolError> {
    let raw = entries
        .get(key)
        .ok_or_else(|| PoolError::Configuration(format!("missing required property {key}")))?;
    raw.parse()
        .map_err(|_| PoolError::Configuration(format!("property {key} is not numeric: {raw:?}")))
}
