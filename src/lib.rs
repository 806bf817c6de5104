//! ringpool - client-side connection pooling for token-ring datastores.
//!
//! A calling application hands the pool an operation targeted at a logical
//! key; the pool selects a backend host by token affinity, borrows a
//! connection from that host's bounded sub-pool, runs the operation, and
//! retries on a fallback replica when an attempt fails. Cluster membership
//! is refreshed continuously from a host supplier, and hosts with error
//! bursts get their sub-pools recycled.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── domain/       # Host identity, ring tokens, operation results
//! ├── port/         # Collaborator seams: connections, suppliers,
//! │                 # selection, health, monitor, retry
//! ├── subpool/      # Bounded per-host connection pool
//! ├── selection/    # Token-aware selection with rack/DC fallback
//! ├── health/       # Error-rate tracking, recycle requests, pings
//! ├── pool/         # The orchestrator: lifecycle, membership, execution
//! └── metrics       # Counter-based monitor
//! ```
//!
//! # Lifecycle
//!
//! Build a [`pool::ConnectionPool`] with its builder, wrap it in an
//! [`std::sync::Arc`], and call `start()`. Operations run through
//! `execute_with_failover`, `execute_with_ring`, or `execute_async` until
//! `shutdown()`.
//!
//! # Features
//!
//! - `testkit` - Scripted mock connections and recording collaborators
//!   for downstream tests.

pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod port;
pub mod selection;
pub mod subpool;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, Result};
