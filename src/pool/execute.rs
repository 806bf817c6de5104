//! Operation execution: failover retries, ring fan-out, async initiation.

use std::time::Instant;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::domain::OperationResult;
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::port::connection::{Borrowed, Connection};
use crate::port::operation::Operation;

/// Completion future of an asynchronously initiated operation, resolving
/// to the decorated result.
pub type OperationFuture<T> = BoxFuture<'static, Result<OperationResult<T>>>;

impl<C: Connection> ConnectionPool<C> {
    /// Run an operation, retrying on another host while the retry policy
    /// allows.
    ///
    /// Each attempt borrows a connection through the selection strategy
    /// (token affinity with rack/DC fallback), so consecutive attempts
    /// land on different replicas. Selection failing with
    /// [`Error::NoAvailableHosts`] is terminal; a retriable error on an
    /// attempt is reported to the health tracker and retried; anything
    /// else surfaces as [`Error::Unexpected`]. When retries run out, the
    /// last backend error is returned.
    pub async fn execute_with_failover<O>(&self, op: &O) -> Result<OperationResult<O::Output>>
    where
        O: Operation<C>,
    {
        self.ensure_started()?;
        let borrow_deadline = self.config().max_timeout_when_exhausted();
        let mut retry = (self.retry_factory())();
        retry.begin();
        let started = Instant::now();
        let mut attempt: usize = 0;

        loop {
            let mut borrowed = match self
                .selection()
                .connection_for(op.key(), attempt, borrow_deadline)
                .await
            {
                Ok(borrowed) => borrowed,
                Err(e @ Error::NoAvailableHosts) => {
                    self.monitor().operation_failure(None, &e);
                    return Err(e);
                }
                Err(e) if e.is_retriable() => {
                    retry.failure(&e);
                    self.monitor().operation_failure(None, &e);
                    if !retry.allow_retry() {
                        return Err(e);
                    }
                    attempt += 1;
                    continue;
                }
                Err(e) => {
                    self.monitor().operation_failure(None, &e);
                    return Err(e);
                }
            };
            attempt += 1;

            match op.execute(&mut *borrowed).await {
                Ok(value) => {
                    let node = borrowed.host().clone();
                    let metadata = borrowed.context().all();
                    retry.success();
                    self.monitor().operation_success(&node, started.elapsed());
                    return Ok(OperationResult::new(value, node, metadata));
                }
                Err(e) if e.is_retriable() => {
                    let node = borrowed.host().clone();
                    retry.failure(&e);
                    self.monitor().operation_failure(Some(&node), &e);
                    if retry.allow_retry() {
                        self.monitor().failover(&node, &e);
                    }
                    self.health().connection_error(borrowed.parent(), &e);
                    debug!(
                        op = op.name(),
                        host = %node,
                        error = %e,
                        retrying = retry.allow_retry(),
                        "attempt failed"
                    );
                    drop(borrowed);
                    if !retry.allow_retry() {
                        return Err(e);
                    }
                }
                Err(e) => {
                    let node = borrowed.host().clone();
                    self.monitor().operation_failure(Some(&node), &e);
                    return Err(Error::Unexpected(format!(
                        "operation {} failed on {node}: {e}",
                        op.name()
                    )));
                }
            }
        }
    }

    /// Run an operation once against every token-owning host on the ring
    /// and collect the results.
    ///
    /// Each connection gets a fresh retry policy; retries re-run on the
    /// same connection. The first connection that exhausts its retries
    /// fails the whole call with its last error — already-collected
    /// results are discarded and the remaining queued connections are
    /// returned to their pools without executing.
    pub async fn execute_with_ring<O>(&self, op: &O) -> Result<Vec<OperationResult<O::Output>>>
    where
        O: Operation<C>,
    {
        self.ensure_started()?;
        let borrow_deadline = self.config().max_timeout_when_exhausted();

        let connections = match self.selection().connections_to_ring(borrow_deadline).await {
            Ok(connections) => connections,
            Err(e) => {
                self.monitor().operation_failure(None, &e);
                return Err(e);
            }
        };

        let mut results = Vec::with_capacity(connections.len());
        let mut queue = connections.into_iter();
        while let Some(mut borrowed) = queue.next() {
            let mut retry = (self.retry_factory())();
            retry.begin();
            let started = Instant::now();

            loop {
                match op.execute(&mut *borrowed).await {
                    Ok(value) => {
                        let node = borrowed.host().clone();
                        let metadata = borrowed.context().all();
                        retry.success();
                        self.monitor().operation_success(&node, started.elapsed());
                        results.push(OperationResult::new(value, node, metadata));
                        break;
                    }
                    Err(e) if e.is_retriable() => {
                        let node = borrowed.host().clone();
                        retry.failure(&e);
                        self.monitor().operation_failure(Some(&node), &e);
                        self.health().connection_error(borrowed.parent(), &e);
                        if !retry.allow_retry() {
                            // Dropping the iterator drains the unused
                            // connections back to their pools.
                            return Err(e);
                        }
                    }
                    Err(e) => {
                        let node = borrowed.host().clone();
                        self.monitor().operation_failure(Some(&node), &e);
                        return Err(Error::Unexpected(format!(
                            "operation {} failed on {node}: {e}",
                            op.name()
                        )));
                    }
                }
            }
        }
        Ok(results)
    }

    /// Initiate an operation and return its completion future.
    ///
    /// The connection goes back to its sub-pool as soon as the initiation
    /// completes, not when the operation does. Initiation failures are
    /// returned as `Err` here (counted and reported to the health
    /// tracker); the future itself resolves to the decorated result.
    pub async fn execute_async<O>(&self, op: &O) -> Result<OperationFuture<O::Output>>
    where
        O: Operation<C>,
    {
        self.ensure_started()?;
        let borrow_deadline = self.config().max_timeout_when_exhausted();

        let mut borrowed = match self.selection().connection_for(op.key(), 0, borrow_deadline).await
        {
            Ok(borrowed) => borrowed,
            Err(e) => {
                self.monitor().operation_failure(None, &e);
                return Err(e);
            }
        };

        match op.initiate(&mut *borrowed).await {
            Ok(completion) => {
                let node = borrowed.host().clone();
                let metadata = borrowed.context().all();
                drop(borrowed);
                Ok(Box::pin(async move {
                    completion
                        .await
                        .map(|value| OperationResult::new(value, node, metadata))
                }))
            }
            Err(e) => {
                let node = borrowed.host().clone();
                self.monitor().operation_failure(Some(&node), &e);
                self.health().connection_error(borrowed.parent(), &e);
                Err(e)
            }
        }
    }

    /// Borrow a connection directly, bypassing operation execution.
    ///
    /// The guard returns the connection on drop; hold it only as long as
    /// the work needs it. Bounded by `connect_timeout`.
    pub async fn connection_for_operation(&self, key: Option<&str>) -> Result<Borrowed<C>> {
        self.ensure_started()?;
        self.selection()
            .connection_for(key, 0, self.config().connect_timeout())
            .await
    }
}
