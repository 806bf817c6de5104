//! Observability seams: per-outcome metrics and the console registry.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{Host, TokenTopology};
use crate::error::{Error, Result};

/// Receives one callback per attempt outcome and per membership event.
/// Implementations must be cheap and thread-safe; callbacks fire on the
/// operation path.
pub trait Monitor: Send + Sync {
    fn operation_success(&self, host: &Host, latency: Duration);

    /// `host` is `None` when the failure happened before a host was chosen
    /// (selection failures, exhausted borrows).
    fn operation_failure(&self, host: Option<&Host>, err: &Error);

    /// An attempt failed on `host` and the retry policy granted another
    /// attempt.
    fn failover(&self, host: &Host, err: &Error);

    fn host_added(&self, host: &Host);

    fn host_removed(&self, host: &Host);

    fn set_host_count(&self, count: usize);
}

/// Point-in-time view of the pool published to a management console.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub name: String,
    pub host_count: usize,
    pub active_hosts: usize,
    pub topology: TokenTopology,
}

pub type SnapshotFn = Arc<dyn Fn() -> PoolSnapshot + Send + Sync>;

/// Management-console surface. The pool registers a snapshot provider
/// under its configured name on startup and deregisters on shutdown;
/// registration failures are logged by the caller and ignored.
pub trait ConsoleRegistry: Send + Sync {
    fn register(&self, name: &str, snapshot: SnapshotFn) -> Result<()>;

    fn deregister(&self, name: &str) -> Result<()>;
}

/// Console that ignores everything. The default when no management
/// console is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConsole;

impl ConsoleRegistry for NoopConsole {
    fn register(&self, _name: &str, _snapshot: SnapshotFn) -> Result<()> {
        Ok(())
    }

    fn deregister(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}
