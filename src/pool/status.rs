//! Up/down membership snapshot.

use crate::domain::Host;

/// Immutable partition of a supplier read into up and down hosts.
///
/// Produced by the hosts updater on every poll; the orchestrator diffs it
/// against the membership map to decide admissions and removals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostStatusTracker {
    up: Vec<Host>,
    down: Vec<Host>,
}

impl HostStatusTracker {
    /// Partition `hosts` by their supplier-reported status, dropping
    /// duplicate identities.
    pub fn from_hosts(hosts: Vec<Host>) -> Self {
        let mut up: Vec<Host> = Vec::new();
        let mut down: Vec<Host> = Vec::new();
        for host in hosts {
            let bucket = if host.is_up() { &mut up } else { &mut down };
            if !bucket.contains(&host) {
                bucket.push(host);
            }
        }
        Self { up, down }
    }

    pub fn up(&self) -> &[Host] {
        &self.up
    }

    pub fn down(&self) -> &[Host] {
        &self.down
    }

    pub fn is_up(&self, host: &Host) -> bool {
        self.up.contains(host)
    }

    pub fn host_count(&self) -> usize {
        self.up.len() + self.down.len()
    }

    /// Whether the up/down sets differ from `other`, ignoring order.
    pub fn changed_from(&self, other: &Self) -> bool {
        fn sorted(hosts: &[Host]) -> Vec<&Host> {
            let mut v: Vec<&Host> = hosts.iter().collect();
            v.sort();
            v
        }
        sorted(&self.up) != sorted(&other.up) || sorted(&self.down) != sorted(&other.down)
    }
}
