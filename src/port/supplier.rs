//! Membership and token sources.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{Host, HostToken};
use crate::error::Result;

/// Source of cluster membership. Polled by the hosts updater; each call
/// returns the full current host list with up/down status attached.
#[async_trait]
pub trait HostSupplier: Send + Sync {
    async fn hosts(&self) -> Result<Vec<Host>>;
}

/// Source of ring token assignments.
pub trait TokenSupplier: Send + Sync {
    fn tokens(&self) -> Vec<HostToken>;
}

/// Fixed host list. The list can be swapped at runtime, which also makes
/// this the supplier of choice for membership-churn tests.
#[derive(Debug, Default)]
pub struct StaticHostSupplier {
    hosts: RwLock<Vec<Host>>,
}

impl StaticHostSupplier {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts: RwLock::new(hosts),
        }
    }

    /// Replace the host list delivered by subsequent polls.
    pub fn set_hosts(&self, hosts: Vec<Host>) {
        *self.hosts.write() = hosts;
    }
}

#[async_trait]
impl HostSupplier for StaticHostSupplier {
    async fn hosts(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.read().clone())
    }
}

/// Fixed token assignment.
#[derive(Debug, Default)]
pub struct StaticTokenSupplier {
    tokens: RwLock<Vec<HostToken>>,
}

impl StaticTokenSupplier {
    pub fn new(tokens: Vec<HostToken>) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }

    /// Assign evenly spaced tokens to `hosts` in the order given.
    pub fn evenly_spaced(hosts: &[Host]) -> Self {
        let step = if hosts.is_empty() {
            0
        } else {
            u64::MAX / hosts.len() as u64
        };
        let tokens = hosts
            .iter()
            .enumerate()
            .map(|(i, host)| HostToken::new(i as u64 * step, host.clone()))
            .collect();
        Self::new(tokens)
    }

    pub fn set_tokens(&self, tokens: Vec<HostToken>) {
        *self.tokens.write() = tokens;
    }
}

impl TokenSupplier for StaticTokenSupplier {
    fn tokens(&self) -> Vec<HostToken> {
        self.tokens.read().clone()
    }
}
