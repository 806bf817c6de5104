//! Recording collaborators.
//!
//! Thin wrappers around the real implementations that count and log every
//! call, so tests can assert on interaction sequences instead of peeking
//! at internals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{Host, TokenTopology};
use crate::error::{Error, Result};
use crate::port::connection::{Borrowed, Connection, HostPool, SharedHostPool, SubPoolFactory};
use crate::port::health::HealthTracker;
use crate::port::monitor::Monitor;
use crate::port::retry::{RetryNTimes, RetryPolicy, RetryPolicyFactory};
use crate::port::selection::SelectionStrategy;

// ---------------------------------------------------------------------------
// RecordingMonitor
// ---------------------------------------------------------------------------

/// One monitor callback, as observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Success { host: Host },
    Failure { host: Option<Host> },
    Failover { host: Host },
    HostAdded { host: Host },
    HostRemoved { host: Host },
    HostCount { count: usize },
}

/// Monitor that remembers every callback in order.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().clone()
    }

    pub fn successes(&self) -> Vec<Host> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Success { host } => Some(host.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<Option<Host>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Failure { host } => Some(host.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failovers(&self) -> Vec<Host> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Failover { host } => Some(host.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.successes().len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().len()
    }

    pub fn failover_count(&self) -> usize {
        self.failovers().len()
    }

    /// Failures recorded with no host attached.
    pub fn no_host_failure_count(&self) -> usize {
        self.failures().iter().filter(|h| h.is_none()).count()
    }

    pub fn host_failure_count(&self, host: &Host) -> usize {
        self.failures()
            .iter()
            .filter(|h| h.as_ref() == Some(host))
            .count()
    }

    pub fn added_hosts(&self) -> Vec<Host> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::HostAdded { host } => Some(host.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn removed_hosts(&self) -> Vec<Host> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::HostRemoved { host } => Some(host.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_host_count(&self) -> Option<usize> {
        self.events.lock().iter().rev().find_map(|e| match e {
            MonitorEvent::HostCount { count } => Some(*count),
            _ => None,
        })
    }
}

impl Monitor for RecordingMonitor {
    fn operation_success(&self, host: &Host, _latency: Duration) {
        self.events.lock().push(MonitorEvent::Success {
            host: host.clone(),
        });
    }

    fn operation_failure(&self, host: Option<&Host>, _err: &Error) {
        self.events.lock().push(MonitorEvent::Failure {
            host: host.cloned(),
        });
    }

    fn failover(&self, host: &Host, _err: &Error) {
        self.events.lock().push(MonitorEvent::Failover {
            host: host.clone(),
        });
    }

    fn host_added(&self, host: &Host) {
        self.events.lock().push(MonitorEvent::HostAdded {
            host: host.clone(),
        });
    }

    fn host_removed(&self, host: &Host) {
        self.events.lock().push(MonitorEvent::HostRemoved {
            host: host.clone(),
        });
    }

    fn set_host_count(&self, count: usize) {
        self.events.lock().push(MonitorEvent::HostCount { count });
    }
}

// ---------------------------------------------------------------------------
// RecordingSelection
// ---------------------------------------------------------------------------

/// Selection wrapper that counts seeds, adds and removes.
pub struct RecordingSelection<C: Connection> {
    inner: Arc<dyn SelectionStrategy<C>>,
    init_count: AtomicU32,
    added: Mutex<Vec<Host>>,
    removed: Mutex<Vec<Host>>,
}

impl<C: Connection> RecordingSelection<C> {
    pub fn new(inner: Arc<dyn SelectionStrategy<C>>) -> Self {
        Self {
            inner,
            init_count: AtomicU32::new(0),
            added: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn init_count(&self) -> u32 {
        self.init_count.load(Ordering::SeqCst)
    }

    pub fn added_hosts(&self) -> Vec<Host> {
        self.added.lock().clone()
    }

    pub fn removed_hosts(&self) -> Vec<Host> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl<C: Connection> SelectionStrategy<C> for RecordingSelection<C> {
    fn init_with_hosts(&self, pools: &HashMap<Host, SharedHostPool<C>>) {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        self.inner.init_with_hosts(pools);
    }

    fn add_host(&self, host: Host, pool: SharedHostPool<C>) {
        self.added.lock().push(host.clone());
        self.inner.add_host(host, pool);
    }

    fn remove_host(&self, host: &Host) {
        self.removed.lock().push(host.clone());
        self.inner.remove_host(host);
    }

    async fn connection_for(
        &self,
        key: Option<&str>,
        attempt: usize,
        timeout: Duration,
    ) -> Result<Borrowed<C>> {
        self.inner.connection_for(key, attempt, timeout).await
    }

    async fn connections_to_ring(&self, timeout: Duration) -> Result<Vec<Borrowed<C>>> {
        self.inner.connections_to_ring(timeout).await
    }

    fn topology(&self) -> TokenTopology {
        self.inner.topology()
    }
}

// ---------------------------------------------------------------------------
// RecordingHealth
// ---------------------------------------------------------------------------

/// Health-tracker wrapper that remembers every error report.
pub struct RecordingHealth<C: Connection> {
    inner: Arc<dyn HealthTracker<C>>,
    error_reports: Mutex<Vec<Host>>,
    pings_scheduled: Mutex<Vec<Host>>,
    removed: Mutex<Vec<Host>>,
}

impl<C: Connection> RecordingHealth<C> {
    pub fn new(inner: Arc<dyn HealthTracker<C>>) -> Self {
        Self {
            inner,
            error_reports: Mutex::new(Vec::new()),
            pings_scheduled: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Hosts charged with an error, one entry per report.
    pub fn error_reports(&self) -> Vec<Host> {
        self.error_reports.lock().clone()
    }

    pub fn error_report_count(&self) -> usize {
        self.error_reports.lock().len()
    }

    pub fn error_reports_for(&self, host: &Host) -> usize {
        self.error_reports.lock().iter().filter(|h| *h == host).count()
    }

    pub fn pings_scheduled(&self) -> Vec<Host> {
        self.pings_scheduled.lock().clone()
    }

    pub fn removed_hosts(&self) -> Vec<Host> {
        self.removed.lock().clone()
    }
}

impl<C: Connection> HealthTracker<C> for RecordingHealth<C> {
    fn start(&self) -> tokio::sync::mpsc::UnboundedReceiver<Host> {
        self.inner.start()
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn connection_error(&self, pool: &SharedHostPool<C>, err: &Error) {
        self.error_reports.lock().push(pool.host().clone());
        self.inner.connection_error(pool, err);
    }

    fn schedule_initial_pings(&self, pool: SharedHostPool<C>) {
        self.pings_scheduled.lock().push(pool.host().clone());
        self.inner.schedule_initial_pings(pool);
    }

    fn remove_host(&self, host: &Host) {
        self.removed.lock().push(host.clone());
        self.inner.remove_host(host);
    }
}

// ---------------------------------------------------------------------------
// Recording retry policies
// ---------------------------------------------------------------------------

/// Call counters shared by every policy a recording factory hands out.
#[derive(Debug, Default)]
pub struct RetryStats {
    begins: AtomicU32,
    successes: AtomicU32,
    failures: AtomicU32,
}

impl RetryStats {
    pub fn begin_count(&self) -> u32 {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn success_count(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

struct RecordingRetryPolicy {
    inner: RetryNTimes,
    stats: Arc<RetryStats>,
}

impl RetryPolicy for RecordingRetryPolicy {
    fn begin(&mut self) {
        self.stats.begins.fetch_add(1, Ordering::SeqCst);
        self.inner.begin();
    }

    fn success(&mut self) {
        self.stats.successes.fetch_add(1, Ordering::SeqCst);
        self.inner.success();
    }

    fn failure(&mut self, err: &Error) {
        self.stats.failures.fetch_add(1, Ordering::SeqCst);
        self.inner.failure(err);
    }

    fn allow_retry(&self) -> bool {
        self.inner.allow_retry()
    }

    fn attempts(&self) -> u32 {
        self.inner.attempts()
    }
}

/// A retry factory granting `max_retries` retries, plus the shared stats
/// it reports into.
pub fn recording_retry(max_retries: u32) -> (RetryPolicyFactory, Arc<RetryStats>) {
    let stats = Arc::new(RetryStats::default());
    let factory_stats = Arc::clone(&stats);
    let factory: RetryPolicyFactory = Arc::new(move || {
        Box::new(RecordingRetryPolicy {
            inner: RetryNTimes::new(max_retries),
            stats: Arc::clone(&factory_stats),
        })
    });
    (factory, stats)
}

// ---------------------------------------------------------------------------
// Borrow ledger
// ---------------------------------------------------------------------------

/// Global borrow/return accounting across every sub-pool.
#[derive(Debug, Default)]
pub struct BorrowLedger {
    borrows: AtomicU32,
    returns: AtomicU32,
}

impl BorrowLedger {
    pub fn borrow_count(&self) -> u32 {
        self.borrows.load(Ordering::SeqCst)
    }

    pub fn return_count(&self) -> u32 {
        self.returns.load(Ordering::SeqCst)
    }

    /// True when every borrow has been matched by a return.
    pub fn balanced(&self) -> bool {
        self.borrow_count() == self.return_count()
    }
}

/// Sub-pool wrapper feeding the ledger.
pub struct CountingSubPool<C: Connection> {
    inner: SharedHostPool<C>,
    ledger: Arc<BorrowLedger>,
}

#[async_trait]
impl<C: Connection> HostPool<C> for CountingSubPool<C> {
    fn host(&self) -> &Host {
        self.inner.host()
    }

    async fn prime_connections(&self) -> Result<usize> {
        self.inner.prime_connections().await
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    fn primed_count(&self) -> usize {
        self.inner.primed_count()
    }

    fn idle_count(&self) -> usize {
        self.inner.idle_count()
    }

    async fn borrow(&self, timeout: Duration) -> Result<C> {
        let conn = self.inner.borrow(timeout).await?;
        self.ledger.borrows.fetch_add(1, Ordering::SeqCst);
        Ok(conn)
    }

    fn return_connection(&self, conn: C) {
        self.ledger.returns.fetch_add(1, Ordering::SeqCst);
        self.inner.return_connection(conn);
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

/// Factory wrapping another factory's sub-pools in [`CountingSubPool`]s.
pub struct CountingSubPoolFactory<C: Connection> {
    inner: Arc<dyn SubPoolFactory<C>>,
    ledger: Arc<BorrowLedger>,
}

impl<C: Connection> CountingSubPoolFactory<C> {
    pub fn new(inner: Arc<dyn SubPoolFactory<C>>, ledger: Arc<BorrowLedger>) -> Self {
        Self { inner, ledger }
    }
}

impl<C: Connection> SubPoolFactory<C> for CountingSubPoolFactory<C> {
    fn create(&self, host: Host, config: &crate::config::PoolConfig) -> SharedHostPool<C> {
        Arc::new(CountingSubPool {
            inner: self.inner.create(host, config),
            ledger: Arc::clone(&self.ledger),
        })
    }
}
