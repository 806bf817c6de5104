//! Collaborator seams consumed by the pool orchestrator.
//!
//! Each trait here is a boundary the orchestrator depends on but does not
//! own. Default implementations ship in sibling modules (`subpool`,
//! `selection`, `health`, `metrics`); integrators swap any of them through
//! the pool builder.

pub mod connection;
pub mod health;
pub mod monitor;
pub mod operation;
pub mod retry;
pub mod selection;
pub mod supplier;

pub use connection::{
    Borrowed, Connection, ConnectionContext, ConnectionFactory, HostPool, SharedHostPool,
    SubPoolFactory,
};
pub use health::HealthTracker;
pub use monitor::{ConsoleRegistry, Monitor, NoopConsole, PoolSnapshot, SnapshotFn};
pub use operation::{OpFuture, Operation};
pub use retry::{retry_n_times, run_once, RetryNTimes, RetryPolicy, RetryPolicyFactory, RunOnce};
pub use selection::SelectionStrategy;
pub use supplier::{HostSupplier, StaticHostSupplier, StaticTokenSupplier, TokenSupplier};
