//! Pure domain types: host identities, ring tokens, operation results.

pub mod host;
pub mod operation;
pub mod token;

pub use host::{Host, HostStatus};
pub use operation::OperationResult;
pub use token::{token_for_key, HostToken, TokenRange, TokenTopology};
