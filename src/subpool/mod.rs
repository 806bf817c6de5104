//! Bounded per-host sub-pool.
//!
//! Owns up to `max_conns_per_host` live connections to a single host.
//! Borrowing is gated by a semaphore whose permit count equals the number
//! of pooled connections, so a borrow either pops an idle connection or
//! waits, bounded by the caller's deadline. Shutdown closes the semaphore,
//! failing any waiter immediately, and drains the idle set.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::domain::Host;
use crate::error::{Error, Result};
use crate::port::connection::{
    Connection, ConnectionFactory, HostPool, SharedHostPool, SubPoolFactory,
};

/// Bounded set of live connections to one host.
pub struct BoundedHostPool<F: ConnectionFactory> {
    host: Host,
    factory: Arc<F>,
    max_conns: usize,
    connect_timeout: Duration,
    idle: Mutex<Vec<F::Connection>>,
    available: Arc<Semaphore>,
    primed: AtomicUsize,
    active: AtomicBool,
    shut_down: AtomicBool,
}

impl<F: ConnectionFactory> BoundedHostPool<F> {
    pub fn new(host: Host, factory: Arc<F>, config: &PoolConfig) -> Self {
        Self {
            host,
            factory,
            max_conns: config.max_conns_per_host,
            connect_timeout: config.connect_timeout(),
            idle: Mutex::new(Vec::new()),
            available: Arc::new(Semaphore::new(0)),
            primed: AtomicUsize::new(0),
            active: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<F: ConnectionFactory> HostPool<F::Connection> for BoundedHostPool<F> {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn prime_connections(&self) -> Result<usize> {
        let mut opened = 0;
        let mut last_err = None;

        for _ in 0..self.max_conns {
            if self.shut_down.load(Ordering::SeqCst) {
                break;
            }
            match tokio::time::timeout(self.connect_timeout, self.factory.open(&self.host)).await {
                Ok(Ok(conn)) => {
                    self.idle.lock().push(conn);
                    self.available.add_permits(1);
                    opened += 1;
                }
                Ok(Err(e)) => {
                    warn!(host = %self.host, error = %e, "failed to open connection");
                    last_err = Some(e);
                }
                Err(_) => {
                    let e = Error::Timeout(format!("connect to {} timed out", self.host));
                    warn!(host = %self.host, error = %e, "failed to open connection");
                    last_err = Some(e);
                }
            }
        }

        self.primed.store(opened, Ordering::SeqCst);
        self.active
            .store(opened > 0 && !self.shut_down.load(Ordering::SeqCst), Ordering::SeqCst);

        if opened == 0 {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        debug!(host = %self.host, primed = opened, "sub-pool primed");
        Ok(opened)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.shut_down.load(Ordering::SeqCst)
    }

    fn primed_count(&self) -> usize {
        self.primed.load(Ordering::SeqCst)
    }

    fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    async fn borrow(&self, timeout: Duration) -> Result<F::Connection> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!(
                "sub-pool for {} is shut down",
                self.host
            )));
        }

        let semaphore = Arc::clone(&self.available);
        let permit = match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(Error::Connection(format!(
                    "sub-pool for {} is shut down",
                    self.host
                )))
            }
            Err(_) => {
                return Err(Error::PoolExhausted {
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        };
        // The permit stands for the connection leaving the pool; it is
        // restored by return_connection, not by dropping the permit.
        permit.forget();

        match self.idle.lock().pop() {
            Some(conn) => Ok(conn),
            // Shutdown drained the idle set between the acquire and the pop.
            None => Err(Error::Connection(format!(
                "sub-pool for {} is shut down",
                self.host
            ))),
        }
    }

    fn return_connection(&self, conn: F::Connection) {
        if self.shut_down.load(Ordering::SeqCst) {
            drop(conn);
            return;
        }
        self.idle.lock().push(conn);
        self.available.add_permits(1);
    }

    async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.active.store(false, Ordering::SeqCst);
        self.available.close();

        let drained: Vec<F::Connection> = self.idle.lock().drain(..).collect();
        for mut conn in drained {
            conn.close().await;
        }
        debug!(host = %self.host, "sub-pool shut down");
    }
}

/// Default [`SubPoolFactory`] wrapping a connection factory.
pub struct BoundedSubPoolFactory<F: ConnectionFactory> {
    factory: Arc<F>,
}

impl<F: ConnectionFactory> BoundedSubPoolFactory<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self { factory }
    }
}

impl<F: ConnectionFactory> SubPoolFactory<F::Connection> for BoundedSubPoolFactory<F> {
    fn create(&self, host: Host, config: &PoolConfig) -> SharedHostPool<F::Connection> {
        Arc::new(BoundedHostPool::new(host, Arc::clone(&self.factory), config))
    }
}
