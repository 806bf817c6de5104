//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests and downstream crates).
//!
//! # Modules
//!
//! - [`conn`] — Scripted mock transport: `ScriptedBackend`,
//!   `TestConnection`, `TestConnectionFactory`, and ready-made operations.
//! - [`record`] — Recording collaborators that wrap the real
//!   implementations and count calls: monitor, selection, retry policies,
//!   borrow ledger.
//! - [`domain`] — Builders for hosts and token-ownership math.
//! - [`config`] — Canonical test configurations.
//! - [`harness`] — A fully wired pool over the mock transport.

pub mod config;
pub mod conn;
pub mod domain;
pub mod harness;
pub mod record;
