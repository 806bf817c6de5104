//! Builders for hosts and token-ownership math.

use crate::domain::{token_for_key, Host, HostStatus};

/// A host on the conventional test port.
pub fn host(name: &str) -> Host {
    Host::new(name, 8102)
}

/// A host with rack and datacenter placement.
pub fn host_in(name: &str, rack: &str, datacenter: &str) -> Host {
    Host::new(name, 8102).with_rack(rack).with_datacenter(datacenter)
}

/// A host the supplier reports as down.
pub fn down_host(name: &str) -> Host {
    host(name).with_status(HostStatus::Down)
}

fn owner_index(key: &str, n: usize) -> usize {
    // Mirrors StaticTokenSupplier::evenly_spaced: token i = i * (MAX / n).
    let step = u64::MAX / n as u64;
    let hash = token_for_key(key);
    let idx = (0..n).take_while(|i| (*i as u64 * step) < hash).count();
    idx % n
}

/// The host owning `key` under evenly spaced tokens in host order.
pub fn owner_of(key: &str, hosts: &[Host]) -> Host {
    hosts[owner_index(key, hosts.len())].clone()
}

/// The first ring fallback after the owner of `key`.
pub fn fallback_of(key: &str, hosts: &[Host]) -> Host {
    hosts[(owner_index(key, hosts.len()) + 1) % hosts.len()].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_and_fallback_differ() {
        let hosts = vec![host("a"), host("b"), host("c")];
        for key in ["alpha", "beta", "gamma"] {
            assert_ne!(owner_of(key, &hosts), fallback_of(key, &hosts));
        }
    }
}
