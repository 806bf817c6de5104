//! Ring token assignments and the observable ring topology.

use serde::Serialize;

use crate::domain::host::Host;

/// Position on the token ring assigned to one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostToken {
    pub token: u64,
    pub host: Host,
}

impl HostToken {
    pub fn new(token: u64, host: Host) -> Self {
        Self { token, host }
    }
}

/// One entry of the observable ring: a token and the host owning the range
/// that ends at it.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRange {
    pub token: u64,
    pub owner: String,
    pub active: bool,
}

/// Snapshot of the full ring, ordered by token. Surfaced through the
/// console registry for observability; never used on the operation path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenTopology {
    pub entries: Vec<TokenRange>,
}

impl TokenTopology {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Hash an operation key onto the ring (murmur3 x64, first half).
pub fn token_for_key(key: &str) -> u64 {
    mur3::murmurhash3_x64_128(key.as_bytes(), 0).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hash_is_stable() {
        assert_eq!(token_for_key("abc"), token_for_key("abc"));
        assert_ne!(token_for_key("abc"), token_for_key("abd"));
    }

    #[test]
    fn topology_len_tracks_entries() {
        let topo = TokenTopology {
            entries: vec![TokenRange {
                token: 42,
                owner: "node-a:8102".into(),
                active: true,
            }],
        };
        assert_eq!(topo.len(), 1);
        assert!(!topo.is_empty());
    }
}
