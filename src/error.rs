use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Host selection could not produce any connection. Never retried.
    #[error("no available hosts to serve the operation")]
    NoAvailableHosts,

    /// Transport-level failure (connect refused, broken pipe, protocol
    /// violation). Retriable.
    #[error("connection error: {0}")]
    Connection(String),

    /// Recoverable error reported by the datastore itself. Retriable.
    #[error("backend error: {0}")]
    Backend(String),

    /// An attempt exceeded its deadline. Retriable.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The per-host sub-pool had no free connection within the borrow
    /// deadline. Retriable.
    #[error("no pooled connection available after {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    /// The pool is not in the started state.
    #[error("connection pool is not running")]
    NotStarted,

    #[error("configuration error: {0}")]
    Config(String),

    /// Wrapper for programming errors surfaced by an operation. Never
    /// retried.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Whether a failed attempt with this error may be handed to the retry
    /// policy for another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Backend(_) | Self::Timeout(_) | Self::PoolExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn backend_and_transport_errors_are_retriable() {
        assert!(Error::Connection("reset".into()).is_retriable());
        assert!(Error::Backend("server busy".into()).is_retriable());
        assert!(Error::Timeout("read".into()).is_retriable());
        assert!(Error::PoolExhausted { waited_ms: 800 }.is_retriable());
    }

    #[test]
    fn terminal_errors_are_not_retriable() {
        assert!(!Error::NoAvailableHosts.is_retriable());
        assert!(!Error::NotStarted.is_retriable());
        assert!(!Error::Config("bad".into()).is_retriable());
        assert!(!Error::Unexpected("boom".into()).is_retriable());
    }
}
