//! Pool configuration.
//!
//! All fields carry serde defaults so a config file only needs to name the
//! values it overrides. `PoolConfig::validate` rejects values that would
//! render the pool inert (zero bounds, zero deadlines).

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Which sub-pool flavor the pool creates on host admission.
///
/// Both flavors share the bounded sub-pool implementation; the distinction
/// drives health checking. `Sync` transports learn about bad hosts from
/// execution feedback alone, `Async` (multiplexing) transports additionally
/// get ping-based liveness probes, because many operations complete before
/// the transport notices a dead peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    Sync,
    Async,
}

/// Top-level pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Pool identity, used for logging and console registration.
    #[serde(default = "default_name")]
    pub name: String,

    /// When set, stamped onto every host on admission, overriding the port
    /// the supplier delivered.
    #[serde(default)]
    pub port: Option<u16>,

    /// Upper bound each per-host sub-pool primes to.
    #[serde(default = "default_max_conns_per_host")]
    pub max_conns_per_host: usize,

    /// Deadline for borrowing a connection through the selection strategy.
    #[serde(default = "default_max_timeout_when_exhausted_ms")]
    pub max_timeout_when_exhausted_ms: u64,

    /// Deadline for opening a single connection, and for the direct
    /// scoped-borrow path.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_pool_type")]
    pub pool_type: PoolType,

    /// Rack this client runs in; selection prefers hosts in the same rack.
    #[serde(default)]
    pub local_rack: Option<String>,

    /// Datacenter this client runs in; second preference tier after rack.
    #[serde(default)]
    pub local_datacenter: Option<String>,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

fn default_name() -> String {
    "ringpool".to_string()
}

const fn default_max_conns_per_host() -> usize {
    3
}

const fn default_max_timeout_when_exhausted_ms() -> u64 {
    800
}

const fn default_connect_timeout_ms() -> u64 {
    3000
}

const fn default_pool_type() -> PoolType {
    PoolType::Sync
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            port: None,
            max_conns_per_host: default_max_conns_per_host(),
            max_timeout_when_exhausted_ms: default_max_timeout_when_exhausted_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            pool_type: default_pool_type(),
            local_rack: None,
            local_datacenter: None,
            refresh: RefreshConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a config from TOML, applying field defaults for anything the
    /// document omits.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid pool config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| Error::Config(format!("{field} {reason}"));

        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be empty"));
        }
        if self.max_conns_per_host == 0 {
            return Err(invalid("max_conns_per_host", "must be > 0"));
        }
        if self.max_timeout_when_exhausted_ms == 0 {
            return Err(invalid("max_timeout_when_exhausted_ms", "must be > 0"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms", "must be > 0"));
        }
        if self.refresh.period_secs == 0 {
            return Err(invalid("refresh.period_secs", "must be > 0"));
        }
        if self.health.check_interval_secs == 0 {
            return Err(invalid("health.check_interval_secs", "must be > 0"));
        }
        if self.health.error_threshold == 0 {
            return Err(invalid("health.error_threshold", "must be > 0"));
        }
        if self.health.ping_interval_secs == 0 {
            return Err(invalid("health.ping_interval_secs", "must be > 0"));
        }
        if self.health.ping_borrow_timeout_ms == 0 {
            return Err(invalid("health.ping_borrow_timeout_ms", "must be > 0"));
        }
        Ok(())
    }

    pub fn max_timeout_when_exhausted(&self) -> Duration {
        Duration::from_millis(self.max_timeout_when_exhausted_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Cadence of the periodic membership refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Delay before the first scheduled refresh tick.
    #[serde(default = "default_refresh_initial_delay_secs")]
    pub initial_delay_secs: u64,

    /// Fixed delay between refresh ticks.
    #[serde(default = "default_refresh_period_secs")]
    pub period_secs: u64,
}

const fn default_refresh_initial_delay_secs() -> u64 {
    15
}

const fn default_refresh_period_secs() -> u64 {
    30
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_refresh_initial_delay_secs(),
            period_secs: default_refresh_period_secs(),
        }
    }
}

impl RefreshConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Error-rate and ping-liveness settings for the health tracker.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Interval of the error-rate scan loop.
    #[serde(default = "default_health_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Errors per scan window that mark a sub-pool for recycling.
    #[serde(default = "default_health_error_threshold")]
    pub error_threshold: u64,

    /// Interval between liveness pings on async sub-pools.
    #[serde(default = "default_health_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Borrow deadline used by a ping probe.
    #[serde(default = "default_health_ping_borrow_timeout_ms")]
    pub ping_borrow_timeout_ms: u64,
}

const fn default_health_check_interval_secs() -> u64 {
    30
}

const fn default_health_error_threshold() -> u64 {
    10
}

const fn default_health_ping_interval_secs() -> u64 {
    30
}

const fn default_health_ping_borrow_timeout_ms() -> u64 {
    500
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_health_check_interval_secs(),
            error_threshold: default_health_error_threshold(),
            ping_interval_secs: default_health_ping_interval_secs(),
            ping_borrow_timeout_ms: default_health_ping_borrow_timeout_ms(),
        }
    }
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_borrow_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_borrow_timeout_ms)
    }
}
