//! Error-rate health tracking with optional ping liveness.
//!
//! Attempt failures are counted per host. A background scan loop samples
//! and resets the counters on a fixed interval; hosts whose count crossed
//! the configured threshold are emitted as recycle requests for the
//! orchestrator to service. Ping loops (async pool type only) borrow a
//! connection under a short deadline, probe it, and feed failures back
//! into the same counters — so a silently dead host eventually crosses the
//! threshold even when no operation traffic touches it.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::HealthConfig;
use crate::domain::Host;
use crate::error::Error;
use crate::port::connection::{Borrowed, Connection, HostPool, SharedHostPool};
use crate::port::health::HealthTracker;

/// Default [`HealthTracker`]: windowed error counters plus ping probes.
pub struct ErrorRateHealthTracker<C: Connection> {
    config: HealthConfig,
    errors: Arc<DashMap<Host, AtomicU64>>,
    scan: Mutex<Option<JoinHandle<()>>>,
    pings: Arc<DashMap<Host, JoinHandle<()>>>,
    _conn: PhantomData<fn() -> C>,
}

impl<C: Connection> ErrorRateHealthTracker<C> {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            errors: Arc::new(DashMap::new()),
            scan: Mutex::new(None),
            pings: Arc::new(DashMap::new()),
            _conn: PhantomData,
        }
    }

    fn record_error(errors: &DashMap<Host, AtomicU64>, host: &Host) {
        errors
            .entry(host.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Errors counted against `host` in the current window. Test hook and
    /// console fodder.
    pub fn error_count(&self, host: &Host) -> u64 {
        self.errors
            .get(host)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl<C: Connection> HealthTracker<C> for ErrorRateHealthTracker<C> {
    fn start(&self) -> mpsc::UnboundedReceiver<Host> {
        let (tx, rx) = mpsc::unbounded_channel();
        let errors = Arc::clone(&self.errors);
        let threshold = self.config.error_threshold;
        let interval = self.config.check_interval();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            // The immediate first tick would sample an empty window.
            tick.tick().await;
            loop {
                tick.tick().await;
                for entry in errors.iter() {
                    let window_errors = entry.value().swap(0, Ordering::Relaxed);
                    if window_errors >= threshold {
                        warn!(
                            host = %entry.key(),
                            errors = window_errors,
                            threshold,
                            "error rate over threshold, requesting sub-pool recycle"
                        );
                        if tx.send(entry.key().clone()).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        if let Some(previous) = self.scan.lock().replace(handle) {
            previous.abort();
        }
        rx
    }

    fn stop(&self) {
        if let Some(handle) = self.scan.lock().take() {
            handle.abort();
        }
        self.pings.retain(|_, handle| {
            handle.abort();
            false
        });
        self.errors.clear();
    }

    fn connection_error(&self, pool: &SharedHostPool<C>, err: &Error) {
        // Selection-level failures carry no host signal.
        if matches!(err, Error::NoAvailableHosts | Error::NotStarted) {
            return;
        }
        Self::record_error(&self.errors, pool.host());
    }

    fn schedule_initial_pings(&self, pool: SharedHostPool<C>) {
        let host = pool.host().clone();
        let errors = Arc::clone(&self.errors);
        let interval = self.config.ping_interval();
        let borrow_timeout = self.config.ping_borrow_timeout();

        let task_host = host.clone();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                if !pool.is_active() {
                    continue;
                }
                match pool.borrow(borrow_timeout).await {
                    Ok(conn) => {
                        let mut borrowed = Borrowed::new(conn, Arc::clone(&pool));
                        if let Err(e) = borrowed.ping().await {
                            debug!(host = %task_host, error = %e, "ping failed");
                            ErrorRateHealthTracker::<C>::record_error(&errors, &task_host);
                        }
                    }
                    Err(e) => {
                        debug!(host = %task_host, error = %e, "ping borrow failed");
                        ErrorRateHealthTracker::<C>::record_error(&errors, &task_host);
                    }
                }
            }
        });

        if let Some(previous) = self.pings.insert(host, handle) {
            previous.abort();
        }
    }

    fn remove_host(&self, host: &Host) {
        self.errors.remove(host);
        if let Some((_, handle)) = self.pings.remove(host) {
            handle.abort();
        }
    }
}

impl<C: Connection> Drop for ErrorRateHealthTracker<C> {
    fn drop(&mut self) {
        <Self as HealthTracker<C>>::stop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::PoolConfig;
    use crate::port::connection::HostPool;
    use crate::subpool::BoundedHostPool;
    use crate::testkit::conn::{ScriptedBackend, TestConnection, TestConnectionFactory};
    use crate::testkit::domain::host;

    fn fast_config() -> HealthConfig {
        HealthConfig {
            check_interval_secs: 1,
            error_threshold: 3,
            ping_interval_secs: 1,
            ping_borrow_timeout_ms: 100,
        }
    }

    async fn primed_pool(backend: &Arc<ScriptedBackend>) -> SharedHostPool<TestConnection> {
        let mut config = PoolConfig::default();
        config.max_conns_per_host = 1;
        config.connect_timeout_ms = 200;
        let pool = Arc::new(BoundedHostPool::new(
            host("node-a"),
            Arc::new(TestConnectionFactory::new(Arc::clone(backend))),
            &config,
        ));
        pool.prime_connections().await.unwrap();
        pool as SharedHostPool<TestConnection>
    }

    #[tokio::test]
    async fn errors_accumulate_per_host() {
        let backend = ScriptedBackend::new();
        let pool = primed_pool(&backend).await;
        let tracker: ErrorRateHealthTracker<TestConnection> =
            ErrorRateHealthTracker::new(fast_config());

        let err = Error::Backend("busy".into());
        tracker.connection_error(&pool, &err);
        tracker.connection_error(&pool, &err);
        assert_eq!(tracker.error_count(&host("node-a")), 2);

        // Selection failures are not charged to any host.
        tracker.connection_error(&pool, &Error::NoAvailableHosts);
        assert_eq!(tracker.error_count(&host("node-a")), 2);
    }

    #[tokio::test]
    async fn error_burst_requests_a_recycle() {
        let backend = ScriptedBackend::new();
        let pool = primed_pool(&backend).await;
        let tracker: ErrorRateHealthTracker<TestConnection> =
            ErrorRateHealthTracker::new(fast_config());

        let mut rx = tracker.start();
        let err = Error::Connection("reset".into());
        for _ in 0..3 {
            tracker.connection_error(&pool, &err);
        }

        let recycled = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("scan loop should emit within one interval")
            .expect("channel open");
        assert_eq!(recycled, host("node-a"));
        tracker.stop();
    }

    #[tokio::test]
    async fn quiet_hosts_are_not_recycled() {
        let backend = ScriptedBackend::new();
        let pool = primed_pool(&backend).await;
        let tracker: ErrorRateHealthTracker<TestConnection> =
            ErrorRateHealthTracker::new(fast_config());

        let mut rx = tracker.start();
        tracker.connection_error(&pool, &Error::Backend("one-off".into()));

        let outcome = tokio::time::timeout(Duration::from_millis(1500), rx.recv()).await;
        assert!(outcome.is_err(), "below-threshold host must not be recycled");
        tracker.stop();
    }

    #[tokio::test]
    async fn ping_failures_feed_the_error_window() {
        let backend = ScriptedBackend::new();
        backend.fail_pings(&host("node-a"));
        let pool = primed_pool(&backend).await;
        let tracker: ErrorRateHealthTracker<TestConnection> =
            ErrorRateHealthTracker::new(fast_config());

        tracker.schedule_initial_pings(Arc::clone(&pool));
        tokio::time::sleep(Duration::from_millis(1300)).await;

        assert!(tracker.error_count(&host("node-a")) >= 1);
        assert!(backend.ping_count() >= 1);
        // Probe connections must be back in the pool.
        assert_eq!(pool.idle_count(), 1);
        tracker.stop();
    }

    #[tokio::test]
    async fn remove_host_clears_state_and_cancels_pings() {
        let backend = ScriptedBackend::new();
        let pool = primed_pool(&backend).await;
        let tracker: ErrorRateHealthTracker<TestConnection> =
            ErrorRateHealthTracker::new(fast_config());

        tracker.connection_error(&pool, &Error::Backend("busy".into()));
        tracker.schedule_initial_pings(Arc::clone(&pool));
        tracker.remove_host(&host("node-a"));

        assert_eq!(tracker.error_count(&host("node-a")), 0);
        // Let any in-flight probe finish before sampling the counter.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let pings_before = backend.ping_count();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(backend.ping_count(), pings_before);
    }
}
