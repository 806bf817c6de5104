//! A fully wired pool over the mock transport.

use std::sync::Arc;

use crate::config::PoolConfig;
use crate::domain::Host;
use crate::health::ErrorRateHealthTracker;
use crate::pool::ConnectionPool;
use crate::port::supplier::{StaticHostSupplier, StaticTokenSupplier};
use crate::selection::TokenAwareSelection;
use crate::subpool::BoundedSubPoolFactory;

use super::config as test_config;
use super::conn::{ScriptedBackend, TestConnection, TestConnectionFactory};
use super::record::{
    recording_retry, BorrowLedger, CountingSubPoolFactory, RecordingHealth, RecordingMonitor,
    RecordingSelection, RetryStats,
};

/// A pool wired to scripted connections and recording collaborators,
/// with handles to everything a test wants to script or assert on.
pub struct TestPool {
    pub pool: Arc<ConnectionPool<TestConnection>>,
    pub backend: Arc<ScriptedBackend>,
    pub monitor: Arc<RecordingMonitor>,
    pub selection: Arc<RecordingSelection<TestConnection>>,
    pub health: Arc<RecordingHealth<TestConnection>>,
    pub supplier: Arc<StaticHostSupplier>,
    pub tokens: Arc<StaticTokenSupplier>,
    pub retry: Arc<RetryStats>,
    pub ledger: Arc<BorrowLedger>,
}

impl TestPool {
    /// Wire a pool over `hosts` with `retries` retry allowance, unstarted.
    pub fn build(hosts: Vec<Host>, retries: u32) -> Self {
        Self::build_with(hosts, retries, test_config::fast())
    }

    pub fn build_with(hosts: Vec<Host>, retries: u32, config: PoolConfig) -> Self {
        let backend = ScriptedBackend::new();
        let supplier = Arc::new(StaticHostSupplier::new(hosts.clone()));
        let tokens = Arc::new(StaticTokenSupplier::evenly_spaced(&hosts));
        let monitor = Arc::new(RecordingMonitor::new());
        let ledger = Arc::new(BorrowLedger::default());
        let (retry_factory, retry) = recording_retry(retries);

        let selection = Arc::new(RecordingSelection::new(Arc::new(TokenAwareSelection::new(
            tokens.clone(),
            config.local_rack.clone(),
            config.local_datacenter.clone(),
        ))));
        let health = Arc::new(RecordingHealth::new(Arc::new(ErrorRateHealthTracker::new(
            config.health.clone(),
        ))));

        let subpool_factory = Arc::new(CountingSubPoolFactory::new(
            Arc::new(BoundedSubPoolFactory::new(Arc::new(
                TestConnectionFactory::new(Arc::clone(&backend)),
            ))),
            Arc::clone(&ledger),
        ));

        let pool = ConnectionPool::builder(config)
            .sub_pool_factory(subpool_factory)
            .host_supplier(supplier.clone())
            .token_supplier(tokens.clone())
            .selection_strategy(selection.clone())
            .health_tracker(health.clone())
            .monitor(monitor.clone())
            .retry_policy_factory(retry_factory)
            .build()
            .expect("test pool config is valid");

        Self {
            pool: Arc::new(pool),
            backend,
            monitor,
            selection,
            health,
            supplier,
            tokens,
            retry,
            ledger,
        }
    }

    /// Build and start.
    pub async fn started(hosts: Vec<Host>, retries: u32) -> Self {
        let harness = Self::build(hosts, retries);
        harness
            .pool
            .start()
            .await
            .expect("test pool starts cleanly");
        harness
    }

    pub async fn started_with(hosts: Vec<Host>, retries: u32, config: PoolConfig) -> Self {
        let harness = Self::build_with(hosts, retries, config);
        harness
            .pool
            .start()
            .await
            .expect("test pool starts cleanly");
        harness
    }
}
