//! Health tracking seam.

use tokio::sync::mpsc;

use crate::domain::Host;
use crate::error::Error;
use crate::port::connection::{Connection, SharedHostPool};

/// Sink for per-host error reports, plus the recycle and ping loops.
///
/// The tracker never mutates pool membership itself: hosts whose error
/// rate crosses the threshold are emitted on the channel returned by
/// `start`, and the orchestrator services those requests by replacing the
/// host's sub-pool.
pub trait HealthTracker<C: Connection>: Send + Sync {
    /// Start the background scan loop. Hosts needing a sub-pool recycle
    /// are sent on the returned channel.
    fn start(&self) -> mpsc::UnboundedReceiver<Host>;

    /// Stop the scan loop and all ping loops.
    fn stop(&self);

    /// Record a failed attempt against the sub-pool that served it.
    fn connection_error(&self, pool: &SharedHostPool<C>, err: &Error);

    /// Begin periodic ping liveness probes against a freshly admitted
    /// sub-pool. Only called for the async pool type.
    fn schedule_initial_pings(&self, pool: SharedHostPool<C>);

    /// Forget a host's error history and cancel its ping loop.
    fn remove_host(&self, host: &Host);
}
