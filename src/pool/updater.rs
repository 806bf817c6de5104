//! Polls the host supplier and tracks the last-seen snapshot.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::pool::status::HostStatusTracker;
use crate::port::supplier::HostSupplier;

pub struct HostsUpdater {
    supplier: Arc<dyn HostSupplier>,
    last: Mutex<HostStatusTracker>,
}

impl HostsUpdater {
    pub fn new(supplier: Arc<dyn HostSupplier>) -> Self {
        Self {
            supplier,
            last: Mutex::new(HostStatusTracker::default()),
        }
    }

    /// Poll the supplier and return the fresh snapshot, logging when the
    /// membership moved since the previous poll.
    pub async fn refresh(&self) -> Result<HostStatusTracker> {
        let hosts = self.supplier.hosts().await?;
        let next = HostStatusTracker::from_hosts(hosts);

        let mut last = self.last.lock();
        if next.changed_from(&last) {
            info!(
                up = next.up().len(),
                down = next.down().len(),
                "cluster membership changed"
            );
        }
        *last = next.clone();
        Ok(next)
    }

    pub fn last_status(&self) -> HostStatusTracker {
        self.last.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Host, HostStatus};
    use crate::port::supplier::StaticHostSupplier;

    #[tokio::test]
    async fn refresh_tracks_the_latest_snapshot() {
        let supplier = Arc::new(StaticHostSupplier::new(vec![
            Host::new("a", 8102),
            Host::new("b", 8102).with_status(HostStatus::Down),
        ]));
        let updater = HostsUpdater::new(supplier.clone());

        let status = updater.refresh().await.unwrap();
        assert_eq!(status.up().len(), 1);
        assert_eq!(status.down().len(), 1);
        assert_eq!(updater.last_status(), status);

        supplier.set_hosts(vec![Host::new("b", 8102), Host::new("c", 8102)]);
        let status = updater.refresh().await.unwrap();
        assert_eq!(status.up().len(), 2);
        assert!(status.is_up(&Host::new("c", 8102)));
        assert_eq!(updater.last_status(), status);
    }
}
