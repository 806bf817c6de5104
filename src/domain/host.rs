//! Backend host identity.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Whether a host is taking traffic, as reported by the host supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Up,
    Down,
}

/// One backend server: hostname, port, and its place in the cluster
/// topology (rack, datacenter, ring token assignment live elsewhere).
///
/// Hosts are value-compared by `(hostname, port)` only — rack, datacenter
/// and status are descriptive and do not participate in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    hostname: String,
    port: u16,
    #[serde(default)]
    rack: Option<String>,
    #[serde(default)]
    datacenter: Option<String>,
    #[serde(default = "default_status")]
    status: HostStatus,
}

fn default_status() -> HostStatus {
    HostStatus::Up
}

impl Host {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            rack: None,
            datacenter: None,
            status: HostStatus::Up,
        }
    }

    pub fn with_rack(mut self, rack: impl Into<String>) -> Self {
        self.rack = Some(rack.into());
        self
    }

    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    pub fn with_status(mut self, status: HostStatus) -> Self {
        self.status = status;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Overwrite the port, typically with the pool-wide configured port on
    /// admission.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn rack(&self) -> Option<&str> {
        self.rack.as_deref()
    }

    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    pub fn status(&self) -> HostStatus {
        self.status
    }

    pub fn is_up(&self) -> bool {
        self.status == HostStatus::Up
    }

    /// `"hostname:port"`, the canonical rendering used in logs and the
    /// topology snapshot.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.hostname == other.hostname && self.port == other.port
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hostname.hash(state);
        self.port.hash(state);
    }
}

impl PartialOrd for Host {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Host {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.hostname, self.port).cmp(&(&other.hostname, other.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_is_hostname_and_port() {
        let a = Host::new("node-a", 8102).with_rack("r1").with_datacenter("east");
        let b = Host::new("node-a", 8102).with_rack("r2").with_status(HostStatus::Down);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn different_port_is_a_different_host() {
        assert_ne!(Host::new("node-a", 8102), Host::new("node-a", 8103));
    }

    #[test]
    fn set_port_changes_identity() {
        let mut h = Host::new("node-a", 11211);
        h.set_port(8102);
        assert_eq!(h, Host::new("node-a", 8102));
        assert_eq!(h.address(), "node-a:8102");
    }

    #[test]
    fn status_defaults_up() {
        let h = Host::new("node-a", 8102);
        assert!(h.is_up());
        assert!(!h.with_status(HostStatus::Down).is_up());
    }
}
