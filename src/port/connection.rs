//! Connection, factory and per-host sub-pool seams.
//!
//! A [`Connection`] is the transport handle operations run on. Sub-pools
//! own a bounded set of them per host; the orchestrator only ever sees the
//! [`HostPool`] trait. Borrowed connections travel inside the [`Borrowed`]
//! guard, which returns them to their parent pool on drop — the return is
//! structural, not a caller obligation.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::domain::Host;
use crate::error::Result;

/// Per-connection scratch metadata.
///
/// Operations and transports may stamp arbitrary string pairs here; the
/// snapshot taken at success decorates the operation result. Reset every
/// time the connection goes back to its pool.
#[derive(Debug, Default)]
pub struct ConnectionContext {
    entries: Mutex<HashMap<String, String>>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn all(&self) -> HashMap<String, String> {
        self.entries.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}

/// A live transport handle to one host.
#[async_trait]
pub trait Connection: Send + 'static {
    /// The host this connection is attached to.
    fn host(&self) -> &Host;

    /// Scratch metadata carried across one borrow.
    fn context(&self) -> &ConnectionContext;

    /// Cheap liveness probe, used by ping-based health checks.
    async fn ping(&mut self) -> Result<()>;

    /// Release transport resources. Called when a sub-pool shuts down.
    async fn close(&mut self);
}

/// Opens connections to a given host. The integration point for the actual
/// wire protocol, which this crate does not implement.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    async fn open(&self, host: &Host) -> Result<Self::Connection>;
}

/// A bounded collection of live connections to one host.
///
/// Created on host admission, shut down on removal or recycle, never
/// reused after shutdown.
#[async_trait]
pub trait HostPool<C: Connection>: Send + Sync {
    fn host(&self) -> &Host;

    /// Open up to the configured number of connections, reporting how many
    /// succeeded. An error means nothing could be primed.
    async fn prime_connections(&self) -> Result<usize>;

    /// True once the pool holds at least one usable connection and has not
    /// been shut down.
    fn is_active(&self) -> bool;

    fn primed_count(&self) -> usize;

    fn idle_count(&self) -> usize;

    /// Take a connection, waiting at most `timeout` for one to free up.
    async fn borrow(&self, timeout: Duration) -> Result<C>;

    /// Hand a borrowed connection back. Must never block.
    fn return_connection(&self, conn: C);

    async fn shutdown(&self);
}

pub type SharedHostPool<C> = Arc<dyn HostPool<C>>;

/// Creates sub-pools on host admission.
pub trait SubPoolFactory<C: Connection>: Send + Sync {
    fn create(&self, host: Host, config: &PoolConfig) -> SharedHostPool<C>;
}

/// Scoped borrow of one connection.
///
/// Dereferences to the connection for the duration of an attempt. Dropping
/// the guard resets the connection context and returns the connection to
/// its parent sub-pool, on every control path.
pub struct Borrowed<C: Connection> {
    conn: Option<C>,
    pool: SharedHostPool<C>,
}

impl<C: Connection + std::fmt::Debug> std::fmt::Debug for Borrowed<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Borrowed").field("conn", &self.conn).finish()
    }
}

impl<C: Connection> Borrowed<C> {
    pub fn new(conn: C, pool: SharedHostPool<C>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    pub fn host(&self) -> &Host {
        self.get().host()
    }

    /// The sub-pool the connection goes back to.
    pub fn parent(&self) -> &SharedHostPool<C> {
        &self.pool
    }

    fn get(&self) -> &C {
        self.conn.as_ref().expect("connection present until drop")
    }

    fn get_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<C: Connection> Deref for Borrowed<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.get()
    }
}

impl<C: Connection> DerefMut for Borrowed<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.get_mut()
    }
}

impl<C: Connection> Drop for Borrowed<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.context().reset();
            self.pool.return_connection(conn);
        }
    }
}
