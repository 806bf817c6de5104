//! Per-operation retry policies.

use std::sync::Arc;

use crate::error::Error;

/// Mutable per-operation retry state. A fresh instance is created from the
/// factory for every operation (and for every connection in a ring
/// execution).
pub trait RetryPolicy: Send {
    /// Reset counters at the start of an operation.
    fn begin(&mut self);

    /// An attempt succeeded; no further attempts will be made.
    fn success(&mut self);

    /// An attempt failed with a retriable error.
    fn failure(&mut self, err: &Error);

    /// Whether another attempt may run after the most recent failure.
    fn allow_retry(&self) -> bool;

    /// Attempts consumed so far (failures plus the success, if any).
    fn attempts(&self) -> u32;
}

/// Creates a fresh policy per operation.
pub type RetryPolicyFactory = Arc<dyn Fn() -> Box<dyn RetryPolicy> + Send + Sync>;

/// Single attempt, no retries.
#[derive(Debug, Default)]
pub struct RunOnce {
    attempts: u32,
    succeeded: bool,
}

impl RunOnce {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RetryPolicy for RunOnce {
    fn begin(&mut self) {
        self.attempts = 0;
        self.succeeded = false;
    }

    fn success(&mut self) {
        self.attempts += 1;
        self.succeeded = true;
    }

    fn failure(&mut self, _err: &Error) {
        self.attempts += 1;
    }

    fn allow_retry(&self) -> bool {
        false
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Up to `max_retries` retries after the first attempt.
#[derive(Debug)]
pub struct RetryNTimes {
    max_retries: u32,
    failures: u32,
    succeeded: bool,
}

impl RetryNTimes {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            failures: 0,
            succeeded: false,
        }
    }
}

impl RetryPolicy for RetryNTimes {
    fn begin(&mut self) {
        self.failures = 0;
        self.succeeded = false;
    }

    fn success(&mut self) {
        self.succeeded = true;
    }

    fn failure(&mut self, _err: &Error) {
        self.failures += 1;
    }

    fn allow_retry(&self) -> bool {
        !self.succeeded && self.failures <= self.max_retries
    }

    fn attempts(&self) -> u32 {
        self.failures + u32::from(self.succeeded)
    }
}

/// Factory for [`RunOnce`].
pub fn run_once() -> RetryPolicyFactory {
    Arc::new(|| Box::new(RunOnce::new()))
}

/// Factory for [`RetryNTimes`].
pub fn retry_n_times(max_retries: u32) -> RetryPolicyFactory {
    Arc::new(move || Box::new(RetryNTimes::new(max_retries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_err() -> Error {
        Error::Backend("busy".into())
    }

    #[test]
    fn run_once_never_retries() {
        let mut policy = RunOnce::new();
        policy.begin();
        policy.failure(&backend_err());
        assert!(!policy.allow_retry());
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn retry_n_times_allows_exactly_n_retries() {
        let mut policy = RetryNTimes::new(2);
        policy.begin();

        policy.failure(&backend_err());
        assert!(policy.allow_retry());
        policy.failure(&backend_err());
        assert!(policy.allow_retry());
        policy.failure(&backend_err());
        assert!(!policy.allow_retry());
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn retry_stops_after_success() {
        let mut policy = RetryNTimes::new(3);
        policy.begin();
        policy.failure(&backend_err());
        policy.success();
        assert!(!policy.allow_retry());
        assert_eq!(policy.attempts(), 2);
    }

    #[test]
    fn begin_resets_state() {
        let mut policy = RetryNTimes::new(1);
        policy.begin();
        policy.failure(&backend_err());
        policy.failure(&backend_err());
        assert!(!policy.allow_retry());

        policy.begin();
        assert!(policy.allow_retry());
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn factories_hand_out_fresh_state() {
        let factory = retry_n_times(1);
        let mut first = factory();
        first.begin();
        first.failure(&backend_err());
        first.failure(&backend_err());
        assert!(!first.allow_retry());

        let second = factory();
        assert!(second.allow_retry());
    }
}
