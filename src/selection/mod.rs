//! Token-aware host selection with rack/datacenter fallback.
//!
//! The strategy keeps an immutable [`Ring`] snapshot behind an
//! `RwLock<Arc<_>>`: readers clone the `Arc` and work off a complete ring,
//! rebuilds construct a fresh ring and swap it in whole. No reader ever
//! observes a partially updated ring.
//!
//! An operation key hashes onto the ring; the owner is the first entry at
//! or clockwise of the hash. Failover attempts walk the ring from the
//! owner through the remaining hosts. When a local rack or datacenter is
//! configured, candidates are re-ranked rack-first then datacenter-first,
//! preserving ring order inside each tier. Inactive sub-pools are skipped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, warn};

use crate::domain::{token_for_key, Host, TokenRange, TokenTopology};
use crate::error::{Error, Result};
use crate::port::connection::{Borrowed, Connection, HostPool, SharedHostPool};
use crate::port::selection::SelectionStrategy;
use crate::port::supplier::TokenSupplier;

struct RingEntry<C: Connection> {
    token: u64,
    pool: SharedHostPool<C>,
}

struct Ring<C: Connection> {
    entries: Vec<RingEntry<C>>,
    pools: HashMap<Host, SharedHostPool<C>>,
}

impl<C: Connection> Ring<C> {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            pools: HashMap::new(),
        }
    }

    fn build(pools: HashMap<Host, SharedHostPool<C>>, tokens: &[crate::domain::HostToken]) -> Self {
        let mut entries: Vec<RingEntry<C>> = tokens
            .iter()
            .filter_map(|t| {
                pools.get(&t.host).map(|pool| RingEntry {
                    token: t.token,
                    pool: Arc::clone(pool),
                })
            })
            .collect();

        // A member without a token assignment still needs a slot; derive
        // one from its address so it remains reachable.
        for (host, pool) in &pools {
            if !tokens.iter().any(|t| &t.host == host) {
                warn!(host = %host, "no ring token assigned, deriving one from the address");
                entries.push(RingEntry {
                    token: token_for_key(&host.address()),
                    pool: Arc::clone(pool),
                });
            }
        }

        entries.sort_by_key(|e| e.token);
        Self { entries, pools }
    }

    /// Index of the entry owning `hash`: first token at or clockwise of it.
    fn owner_index(&self, hash: u64) -> usize {
        let idx = self.entries.partition_point(|e| e.token < hash);
        if idx == self.entries.len() {
            0
        } else {
            idx
        }
    }

    /// Distinct hosts in ring order starting at `start`.
    fn hosts_from(&self, start: usize) -> Vec<SharedHostPool<C>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let len = self.entries.len();
        for offset in 0..len {
            let entry = &self.entries[(start + offset) % len];
            if seen.insert(entry.pool.host().clone()) {
                out.push(Arc::clone(&entry.pool));
            }
        }
        out
    }
}

/// Default [`SelectionStrategy`]: token affinity with rack/DC fallback.
pub struct TokenAwareSelection<C: Connection> {
    tokens: Arc<dyn TokenSupplier>,
    local_rack: Option<String>,
    local_datacenter: Option<String>,
    ring: RwLock<Arc<Ring<C>>>,
}

impl<C: Connection> TokenAwareSelection<C> {
    pub fn new(
        tokens: Arc<dyn TokenSupplier>,
        local_rack: Option<String>,
        local_datacenter: Option<String>,
    ) -> Self {
        Self {
            tokens,
            local_rack,
            local_datacenter,
            ring: RwLock::new(Arc::new(Ring::empty())),
        }
    }

    fn snapshot(&self) -> Arc<Ring<C>> {
        Arc::clone(&self.ring.read())
    }

    fn rebuild(&self, pools: HashMap<Host, SharedHostPool<C>>) {
        let next = Arc::new(Ring::build(pools, &self.tokens.tokens()));
        *self.ring.write() = next;
    }

    /// Stable three-tier ranking: local rack, then local datacenter, then
    /// the rest, each tier keeping ring order.
    fn rank(&self, candidates: Vec<SharedHostPool<C>>) -> Vec<SharedHostPool<C>> {
        if self.local_rack.is_none() && self.local_datacenter.is_none() {
            return candidates;
        }
        let mut rack_local = Vec::new();
        let mut dc_local = Vec::new();
        let mut remote = Vec::new();
        for pool in candidates {
            let host = pool.host();
            if self.local_rack.is_some() && host.rack() == self.local_rack.as_deref() {
                rack_local.push(pool);
            } else if self.local_datacenter.is_some()
                && host.datacenter() == self.local_datacenter.as_deref()
            {
                dc_local.push(pool);
            } else {
                remote.push(pool);
            }
        }
        rack_local.extend(dc_local);
        rack_local.extend(remote);
        rack_local
    }
}

#[async_trait]
impl<C: Connection> SelectionStrategy<C> for TokenAwareSelection<C> {
    fn init_with_hosts(&self, pools: &HashMap<Host, SharedHostPool<C>>) {
        debug!(hosts = pools.len(), "seeding selection ring");
        self.rebuild(pools.clone());
    }

    fn add_host(&self, host: Host, pool: SharedHostPool<C>) {
        let mut pools = self.snapshot().pools.clone();
        pools.insert(host, pool);
        self.rebuild(pools);
    }

    fn remove_host(&self, host: &Host) {
        let mut pools = self.snapshot().pools.clone();
        if pools.remove(host).is_some() {
            self.rebuild(pools);
        }
    }

    async fn connection_for(
        &self,
        key: Option<&str>,
        attempt: usize,
        timeout: Duration,
    ) -> Result<Borrowed<C>> {
        let ring = self.snapshot();
        if ring.entries.is_empty() {
            return Err(Error::NoAvailableHosts);
        }

        let start = match key {
            Some(key) => ring.owner_index(token_for_key(key)),
            None => rand::thread_rng().gen_range(0..ring.entries.len()),
        };

        let ranked = self.rank(ring.hosts_from(start));
        let active: Vec<_> = ranked.into_iter().filter(|p| p.is_active()).collect();
        if active.is_empty() {
            return Err(Error::NoAvailableHosts);
        }

        let pool = &active[attempt % active.len()];
        let conn = pool.borrow(timeout).await?;
        Ok(Borrowed::new(conn, Arc::clone(pool)))
    }

    async fn connections_to_ring(&self, timeout: Duration) -> Result<Vec<Borrowed<C>>> {
        let ring = self.snapshot();
        if ring.entries.is_empty() {
            return Err(Error::NoAvailableHosts);
        }

        let owners = ring.hosts_from(0);
        let mut connections = Vec::with_capacity(owners.len());
        let mut covered = 0;
        for pool in owners {
            if !pool.is_active() {
                warn!(host = %pool.host(), "skipping inactive sub-pool in ring execution");
                continue;
            }
            let conn = pool.borrow(timeout).await?;
            connections.push(Borrowed::new(conn, pool));
            covered += 1;
        }
        if covered == 0 {
            return Err(Error::NoAvailableHosts);
        }
        Ok(connections)
    }

    fn topology(&self) -> TokenTopology {
        let ring = self.snapshot();
        TokenTopology {
            entries: ring
                .entries
                .iter()
                .map(|e| TokenRange {
                    token: e.token,
                    owner: e.pool.host().address(),
                    active: e.pool.is_active(),
                })
                .collect(),
        }
    }
}
