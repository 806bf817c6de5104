//! Canonical test configurations.
//!
//! Single source of truth for pool configs used across tests: short
//! deadlines, the periodic refresh parked far in the future (tests drive
//! `refresh()` directly), and a health threshold high enough that only
//! the dedicated health tests trigger recycles.

use crate::config::{HealthConfig, PoolConfig, PoolType, RefreshConfig};

/// Fast-deadline config with background schedules effectively disabled.
pub fn fast() -> PoolConfig {
    PoolConfig {
        name: "test-pool".to_string(),
        port: None,
        max_conns_per_host: 2,
        max_timeout_when_exhausted_ms: 200,
        connect_timeout_ms: 200,
        pool_type: PoolType::Sync,
        local_rack: None,
        local_datacenter: None,
        refresh: RefreshConfig {
            initial_delay_secs: 3600,
            period_secs: 3600,
        },
        health: HealthConfig {
            check_interval_secs: 1,
            error_threshold: 1000,
            ping_interval_secs: 1,
            ping_borrow_timeout_ms: 100,
        },
    }
}

/// `fast()` with a live refresh ticker.
pub fn ticking_refresh() -> PoolConfig {
    let mut config = fast();
    config.refresh = RefreshConfig {
        initial_delay_secs: 1,
        period_secs: 1,
    };
    config
}

/// `fast()` with a hair-trigger health tracker.
pub fn touchy_health(error_threshold: u64) -> PoolConfig {
    let mut config = fast();
    config.health.error_threshold = error_threshold;
    config
}
