//! The pool orchestrator.
//!
//! Owns the membership map (host → per-host sub-pool), drives the
//! lifecycle state machine, applies membership changes from the periodic
//! refresh, and services recycle requests from the health tracker. The
//! operation paths live in [`execute`].
//!
//! Membership mutations go through the map's atomic entry API rather than
//! a lock: admitting a host includes priming its connections, a
//! network-latency operation that must not stall readers or other
//! admissions.

mod execute;
pub mod status;
pub mod updater;

pub use execute::OperationFuture;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{PoolConfig, PoolType};
use crate::domain::{Host, TokenTopology};
use crate::error::{Error, Result};
use crate::health::ErrorRateHealthTracker;
use crate::metrics::CountingMonitor;
use crate::port::connection::{
    Connection, ConnectionFactory, HostPool, SharedHostPool, SubPoolFactory,
};
use crate::port::health::HealthTracker;
use crate::port::monitor::{ConsoleRegistry, Monitor, NoopConsole, PoolSnapshot, SnapshotFn};
use crate::port::retry::{run_once, RetryPolicyFactory};
use crate::port::selection::SelectionStrategy;
use crate::port::supplier::{HostSupplier, TokenSupplier};
use crate::selection::TokenAwareSelection;
use crate::subpool::BoundedSubPoolFactory;
use status::HostStatusTracker;
use updater::HostsUpdater;

const STATE_NEW: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_STARTED: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Client-side connection pool over a token-ring cluster.
///
/// Wrap in an [`Arc`] and call [`start`](Self::start) before executing
/// operations; see the crate docs for the full lifecycle.
pub struct ConnectionPool<C: Connection> {
    config: PoolConfig,
    pools: Arc<DashMap<Host, SharedHostPool<C>>>,
    subpool_factory: Arc<dyn SubPoolFactory<C>>,
    selection: Arc<dyn SelectionStrategy<C>>,
    health: Arc<dyn HealthTracker<C>>,
    monitor: Arc<dyn Monitor>,
    console: Arc<dyn ConsoleRegistry>,
    retry_factory: RetryPolicyFactory,
    updater: HostsUpdater,
    state: AtomicU8,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Connection> ConnectionPool<C> {
    pub fn builder(config: PoolConfig) -> ConnectionPoolBuilder<C> {
        ConnectionPoolBuilder::new(config)
    }

    /// Bring the pool up: first membership refresh, parallel priming of
    /// every up-host, selection seeding, health tracking, and the
    /// periodic refresh schedule.
    ///
    /// Returns `Ok(true)` for the caller that performed the startup and
    /// `Ok(false)` for every other caller. Fails with
    /// [`Error::NoAvailableHosts`] when the first refresh yields no
    /// up-hosts, leaving the pool restartable.
    pub async fn start(self: &Arc<Self>) -> Result<bool> {
        if self
            .state
            .compare_exchange(STATE_NEW, STATE_STARTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        match self.start_inner().await {
            Ok(()) => {
                info!(pool = %self.config.name, hosts = self.pools.len(), "connection pool started");
                Ok(true)
            }
            Err(e) => {
                self.state.store(STATE_NEW, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn start_inner(self: &Arc<Self>) -> Result<()> {
        let status = self.updater.refresh().await?;
        self.monitor.set_host_count(status.up().len());
        if status.up().is_empty() {
            return Err(Error::NoAvailableHosts);
        }

        // Prime all initial hosts in parallel, holding off load-balancer
        // refreshes: the selection ring is seeded once, whole, below.
        let limit = status.up().len().max(10);
        let admissions: Vec<bool> = stream::iter(status.up().to_vec())
            .map(|host| {
                let this = Arc::clone(self);
                async move {
                    match this.add_host(host.clone(), false).await {
                        Ok(admitted) => admitted,
                        Err(e) => {
                            warn!(host = %host, error = %e, "dropping host after failed admission");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        debug!(
            admitted = admissions.iter().filter(|a| **a).count(),
            offered = admissions.len(),
            "initial host priming complete"
        );

        self.state.store(STATE_STARTED, Ordering::SeqCst);

        let snapshot: HashMap<Host, SharedHostPool<C>> = self
            .pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.selection.init_with_hosts(&snapshot);

        let recycle_rx = self.health.start();
        self.spawn_recycle_loop(recycle_rx);
        self.spawn_refresh_ticker();
        self.register_console();
        Ok(())
    }

    /// Tear the pool down: every host removed, health tracking stopped,
    /// scheduled tasks cancelled, console deregistered. A second call is
    /// a no-op.
    pub async fn shutdown(&self) {
        if self
            .state
            .compare_exchange(STATE_STARTED, STATE_STOPPED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let hosts: Vec<Host> = self.pools.iter().map(|e| e.key().clone()).collect();
        for host in hosts {
            self.remove_host(&host).await;
        }

        self.health.stop();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Err(e) = self.console.deregister(&self.config.name) {
            warn!(error = %e, "console deregistration failed");
        }
        info!(pool = %self.config.name, "connection pool shut down");
    }

    /// Admit a host: create its sub-pool, prime connections, and (when
    /// `refresh_load_balancer` is set) inform the selection strategy.
    ///
    /// Returns `Ok(true)` iff the host is newly admitted with at least one
    /// primed connection and an active sub-pool. A host whose sub-pool
    /// fails to become active is rolled back from the membership map; a
    /// later refresh tick may retry it.
    pub async fn add_host(&self, host: Host, refresh_load_balancer: bool) -> Result<bool> {
        if self.state.load(Ordering::SeqCst) == STATE_STOPPED {
            return Err(Error::NotStarted);
        }
        let host = self.stamped(host);

        let pool = self.subpool_factory.create(host.clone(), &self.config);
        match self.pools.entry(host.clone()) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&pool));
            }
        }

        // Priming happens outside the map entry: it talks to the network.
        let primed = match pool.prime_connections().await {
            Ok(primed) => primed,
            Err(e) => {
                warn!(host = %host, error = %e, "priming failed, rolling host back");
                self.pools.remove(&host);
                return Ok(false);
            }
        };
        if !pool.is_active() {
            debug!(host = %host, "sub-pool inactive after priming, rolling host back");
            self.pools.remove(&host);
            return Ok(false);
        }

        if refresh_load_balancer {
            self.selection.add_host(host.clone(), Arc::clone(&pool));
        }
        if self.config.pool_type == PoolType::Async {
            self.health.schedule_initial_pings(Arc::clone(&pool));
        }
        self.monitor.host_added(&host);
        info!(host = %host, primed, "host admitted");
        Ok(primed > 0)
    }

    /// Remove a host: selection first, then health tracking, then sub-pool
    /// shutdown. Returns true iff the host was present. Idempotent.
    pub async fn remove_host(&self, host: &Host) -> bool {
        let host = self.stamped(host.clone());
        let Some((host, pool)) = self.pools.remove(&host) else {
            return false;
        };

        self.selection.remove_host(&host);
        self.health.remove_host(&host);
        self.monitor.host_removed(&host);
        pool.shutdown().await;
        info!(host = %host, "host removed");
        true
    }

    /// Apply a batch of admissions and removals; the result is the
    /// logical-or of the individual outcomes.
    pub async fn update_hosts(&self, up: Vec<Host>, down: Vec<Host>) -> Result<bool> {
        let mut changed = false;
        for host in up {
            changed |= self.add_host(host, true).await?;
        }
        for host in down {
            changed |= self.remove_host(&host).await;
        }
        Ok(changed)
    }

    /// One membership refresh: poll the supplier and converge the map onto
    /// its snapshot. Hosts absent from the new up-set are removed, new
    /// up-hosts admitted. Runs on the periodic schedule; callable directly.
    pub async fn refresh(&self) -> Result<bool> {
        let status = self.updater.refresh().await?;
        self.monitor.set_host_count(status.up().len());

        let up: Vec<Host> = status.up().iter().cloned().map(|h| self.stamped(h)).collect();
        let mut down: Vec<Host> = status
            .down()
            .iter()
            .cloned()
            .map(|h| self.stamped(h))
            .collect();
        for entry in self.pools.iter() {
            let host = entry.key();
            if !up.contains(host) && !down.contains(host) {
                down.push(host.clone());
            }
        }

        self.update_hosts(up, down).await
    }

    // -- membership queries -------------------------------------------------

    pub fn is_host_up(&self, host: &Host) -> bool {
        self.pools
            .get(&self.stamped(host.clone()))
            .map(|entry| entry.value().is_active())
            .unwrap_or(false)
    }

    pub fn has_host(&self, host: &Host) -> bool {
        self.pools.contains_key(&self.stamped(host.clone()))
    }

    pub fn pools(&self) -> Vec<SharedHostPool<C>> {
        self.pools.iter().map(|e| e.value().clone()).collect()
    }

    pub fn active_pools(&self) -> Vec<SharedHostPool<C>> {
        self.pools
            .iter()
            .filter(|e| e.value().is_active())
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn host_pool(&self, host: &Host) -> Option<SharedHostPool<C>> {
        self.pools
            .get(&self.stamped(host.clone()))
            .map(|e| e.value().clone())
    }

    pub fn host_count(&self) -> usize {
        self.pools.len()
    }

    pub fn topology(&self) -> TokenTopology {
        self.selection.topology()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_started(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_STARTED
    }

    /// Last supplier snapshot seen by the updater.
    pub fn last_host_status(&self) -> HostStatusTracker {
        self.updater.last_status()
    }

    // -- internals ----------------------------------------------------------

    pub(crate) fn ensure_started(&self) -> Result<()> {
        if self.state.load(Ordering::SeqCst) == STATE_STARTED {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn selection(&self) -> &Arc<dyn SelectionStrategy<C>> {
        &self.selection
    }

    pub(crate) fn health(&self) -> &Arc<dyn HealthTracker<C>> {
        &self.health
    }

    pub(crate) fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    pub(crate) fn retry_factory(&self) -> &RetryPolicyFactory {
        &self.retry_factory
    }

    fn stamped(&self, mut host: Host) -> Host {
        if let Some(port) = self.config.port {
            host.set_port(port);
        }
        host
    }

    fn spawn_refresh_ticker(self: &Arc<Self>) {
        let this = Arc::downgrade(self);
        let initial = self.config.refresh.initial_delay();
        let period = self.config.refresh.period();

        let handle = tokio::spawn(async move {
            let first = tokio::time::Instant::now() + initial;
            let mut tick = tokio::time::interval_at(first, period);
            loop {
                tick.tick().await;
                let Some(pool) = this.upgrade() else { break };
                if pool.state.load(Ordering::SeqCst) != STATE_STARTED {
                    break;
                }
                // A failed tick must never kill the schedule.
                if let Err(e) = pool.refresh().await {
                    warn!(error = %e, "membership refresh failed");
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    fn spawn_recycle_loop(self: &Arc<Self>, mut recycle_rx: mpsc::UnboundedReceiver<Host>) {
        let this = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            while let Some(host) = recycle_rx.recv().await {
                let Some(pool) = this.upgrade() else { break };
                if pool.state.load(Ordering::SeqCst) != STATE_STARTED {
                    break;
                }
                if !pool.has_host(&host) {
                    continue;
                }
                info!(host = %host, "recycling sub-pool after error burst");
                pool.remove_host(&host).await;
                match pool.add_host(host.clone(), true).await {
                    Ok(true) => {}
                    Ok(false) => warn!(host = %host, "host not readmitted during recycle"),
                    Err(e) => warn!(host = %host, error = %e, "recycle admission failed"),
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    fn register_console(&self) {
        let name = self.config.name.clone();
        let pools = Arc::clone(&self.pools);
        let selection = Arc::clone(&self.selection);
        let snapshot: SnapshotFn = Arc::new(move || PoolSnapshot {
            name: name.clone(),
            host_count: pools.len(),
            active_hosts: pools.iter().filter(|e| e.value().is_active()).count(),
            topology: selection.topology(),
        });

        if let Err(e) = self.console.register(&self.config.name, snapshot) {
            warn!(error = %e, "console registration failed");
        }
    }
}

/// Assembles a [`ConnectionPool`] from its collaborators.
///
/// Required: a connection factory (or a full sub-pool factory), a host
/// supplier and a token supplier. Everything else has a shipped default:
/// token-aware selection, error-rate health tracking, counting monitor,
/// run-once retries, no-op console.
pub struct ConnectionPoolBuilder<C: Connection> {
    config: PoolConfig,
    subpool_factory: Option<Arc<dyn SubPoolFactory<C>>>,
    host_supplier: Option<Arc<dyn HostSupplier>>,
    token_supplier: Option<Arc<dyn TokenSupplier>>,
    selection: Option<Arc<dyn SelectionStrategy<C>>>,
    health: Option<Arc<dyn HealthTracker<C>>>,
    monitor: Option<Arc<dyn Monitor>>,
    console: Option<Arc<dyn ConsoleRegistry>>,
    retry_factory: Option<RetryPolicyFactory>,
}

impl<C: Connection> ConnectionPoolBuilder<C> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            subpool_factory: None,
            host_supplier: None,
            token_supplier: None,
            selection: None,
            health: None,
            monitor: None,
            console: None,
            retry_factory: None,
        }
    }

    /// Use the bounded sub-pool over this connection factory.
    pub fn connection_factory<F>(mut self, factory: F) -> Self
    where
        F: ConnectionFactory<Connection = C>,
    {
        self.subpool_factory = Some(Arc::new(BoundedSubPoolFactory::new(Arc::new(factory))));
        self
    }

    /// Replace the sub-pool implementation wholesale.
    pub fn sub_pool_factory(mut self, factory: Arc<dyn SubPoolFactory<C>>) -> Self {
        self.subpool_factory = Some(factory);
        self
    }

    pub fn host_supplier(mut self, supplier: Arc<dyn HostSupplier>) -> Self {
        self.host_supplier = Some(supplier);
        self
    }

    pub fn token_supplier(mut self, supplier: Arc<dyn TokenSupplier>) -> Self {
        self.token_supplier = Some(supplier);
        self
    }

    pub fn selection_strategy(mut self, selection: Arc<dyn SelectionStrategy<C>>) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn health_tracker(mut self, health: Arc<dyn HealthTracker<C>>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn console(mut self, console: Arc<dyn ConsoleRegistry>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn retry_policy_factory(mut self, factory: RetryPolicyFactory) -> Self {
        self.retry_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<ConnectionPool<C>> {
        self.config.validate()?;

        let subpool_factory = self
            .subpool_factory
            .ok_or_else(|| Error::Config("a connection factory is required".into()))?;
        let host_supplier = self
            .host_supplier
            .ok_or_else(|| Error::Config("a host supplier is required".into()))?;
        let token_supplier = self
            .token_supplier
            .ok_or_else(|| Error::Config("a token supplier is required".into()))?;

        let selection = self.selection.unwrap_or_else(|| {
            Arc::new(TokenAwareSelection::new(
                token_supplier,
                self.config.local_rack.clone(),
                self.config.local_datacenter.clone(),
            ))
        });
        let health = self
            .health
            .unwrap_or_else(|| Arc::new(ErrorRateHealthTracker::new(self.config.health.clone())));
        let monitor = self
            .monitor
            .unwrap_or_else(|| Arc::new(CountingMonitor::new()));
        let console = self.console.unwrap_or_else(|| Arc::new(NoopConsole));
        let retry_factory = self.retry_factory.unwrap_or_else(run_once);

        Ok(ConnectionPool {
            config: self.config,
            pools: Arc::new(DashMap::new()),
            subpool_factory,
            selection,
            health,
            monitor,
            console,
            retry_factory,
            updater: HostsUpdater::new(host_supplier),
            state: AtomicU8::new(STATE_NEW),
            tasks: Mutex::new(Vec::new()),
        })
    }
}
