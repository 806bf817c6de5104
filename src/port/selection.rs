//! Host selection seam.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Host, TokenTopology};
use crate::error::Result;
use crate::port::connection::{Borrowed, Connection, SharedHostPool};

/// Picks which host serves an attempt and borrows the connection.
///
/// Implementations hold a derived view of the membership map, refreshed
/// through `init_with_hosts` / `add_host` / `remove_host`. Readers must
/// always observe a complete view: rebuilds swap in a full snapshot, never
/// mutate in place under a reader.
#[async_trait]
pub trait SelectionStrategy<C: Connection>: Send + Sync {
    /// Seed the strategy with the full membership map. Called once at pool
    /// startup, after initial priming.
    fn init_with_hosts(&self, pools: &HashMap<Host, SharedHostPool<C>>);

    fn add_host(&self, host: Host, pool: SharedHostPool<C>);

    fn remove_host(&self, host: &Host);

    /// Borrow a connection for one attempt.
    ///
    /// `key` drives token affinity; `attempt` is the zero-based failover
    /// attempt index, moving the choice off the primary replica onto
    /// fallbacks. Fails with [`Error::NoAvailableHosts`] when no active
    /// sub-pool exists, and with the sub-pool's borrow error otherwise.
    ///
    /// [`Error::NoAvailableHosts`]: crate::error::Error::NoAvailableHosts
    async fn connection_for(
        &self,
        key: Option<&str>,
        attempt: usize,
        timeout: Duration,
    ) -> Result<Borrowed<C>>;

    /// Borrow one connection per token-owning host, covering the whole
    /// ring.
    async fn connections_to_ring(&self, timeout: Duration) -> Result<Vec<Borrowed<C>>>;

    /// Observable snapshot of the ring.
    fn topology(&self) -> TokenTopology;
}
