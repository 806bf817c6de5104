//! Atomic operation counters.
//!
//! The default [`Monitor`]: global and per-host counters updated lock-free
//! on the operation path, with a serializable snapshot for the console.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::domain::Host;
use crate::error::Error;
use crate::port::monitor::Monitor;

#[derive(Debug, Default)]
struct HostCounters {
    success: AtomicU64,
    failure: AtomicU64,
    failover: AtomicU64,
}

/// Thread-safe counter-based [`Monitor`].
#[derive(Debug, Default)]
pub struct CountingMonitor {
    success: AtomicU64,
    failure: AtomicU64,
    failover: AtomicU64,
    no_host_failures: AtomicU64,
    latency_micros: AtomicU64,
    hosts_added: AtomicU64,
    hosts_removed: AtomicU64,
    host_count: AtomicUsize,
    per_host: DashMap<Host, HostCounters>,
}

impl CountingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    pub fn failover_count(&self) -> u64 {
        self.failover.load(Ordering::Relaxed)
    }

    /// Failures recorded before any host was chosen.
    pub fn no_host_failure_count(&self) -> u64 {
        self.no_host_failures.load(Ordering::Relaxed)
    }

    pub fn hosts_added(&self) -> u64 {
        self.hosts_added.load(Ordering::Relaxed)
    }

    pub fn hosts_removed(&self) -> u64 {
        self.hosts_removed.load(Ordering::Relaxed)
    }

    pub fn host_count(&self) -> usize {
        self.host_count.load(Ordering::Relaxed)
    }

    pub fn host_success_count(&self, host: &Host) -> u64 {
        self.per_host
            .get(host)
            .map(|c| c.success.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn host_failure_count(&self, host: &Host) -> u64 {
        self.per_host
            .get(host)
            .map(|c| c.failure.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn host_failover_count(&self, host: &Host) -> u64 {
        self.per_host
            .get(host)
            .map(|c| c.failover.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Mean success latency in microseconds.
    pub fn avg_latency_micros(&self) -> u64 {
        let successes = self.success.load(Ordering::Relaxed);
        if successes == 0 {
            return 0;
        }
        self.latency_micros.load(Ordering::Relaxed) / successes
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            success: self.success_count(),
            failure: self.failure_count(),
            failover: self.failover_count(),
            no_host_failures: self.no_host_failure_count(),
            avg_latency_micros: self.avg_latency_micros(),
            host_count: self.host_count(),
        }
    }

    fn bump_host(&self, host: &Host, pick: impl Fn(&HostCounters) -> &AtomicU64) {
        let counters = self.per_host.entry(host.clone()).or_default();
        pick(&counters).fetch_add(1, Ordering::Relaxed);
    }
}

impl Monitor for CountingMonitor {
    fn operation_success(&self, host: &Host, latency: Duration) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.bump_host(host, |c| &c.success);
    }

    fn operation_failure(&self, host: Option<&Host>, _err: &Error) {
        self.failure.fetch_add(1, Ordering::Relaxed);
        match host {
            Some(host) => self.bump_host(host, |c| &c.failure),
            None => {
                self.no_host_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn failover(&self, host: &Host, _err: &Error) {
        self.failover.fetch_add(1, Ordering::Relaxed);
        self.bump_host(host, |c| &c.failover);
    }

    fn host_added(&self, _host: &Host) {
        self.hosts_added.fetch_add(1, Ordering::Relaxed);
    }

    fn host_removed(&self, _host: &Host) {
        self.hosts_removed.fetch_add(1, Ordering::Relaxed);
    }

    fn set_host_count(&self, count: usize) {
        self.host_count.store(count, Ordering::Relaxed);
    }
}

/// Serializable totals for the console surface.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub success: u64,
    pub failure: u64,
    pub failover: u64,
    pub no_host_failures: u64,
    pub avg_latency_micros: u64,
    pub host_count: usize,
}
