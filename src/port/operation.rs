//! The operation seam: what callers hand to the pool's execute methods.

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::port::connection::Connection;

/// Completion future of an asynchronously initiated operation.
pub type OpFuture<T> = BoxFuture<'static, Result<T>>;

/// One operation against the datastore, generic over the connection type
/// it runs on.
///
/// `execute` runs the operation to completion on a borrowed connection.
/// `initiate` starts it and hands back a completion future that no longer
/// borrows the connection; the default implementation completes inline and
/// returns a ready future, which is correct for request/response
/// transports. Multiplexing transports override it to write the request
/// and resolve the future off the response stream.
#[async_trait]
pub trait Operation<C: Connection>: Send + Sync {
    type Output: Send + 'static;

    /// Stable name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Logical key, hashed onto the ring for token-aware host selection.
    /// Key-less operations land on an arbitrary host.
    fn key(&self) -> Option<&str> {
        None
    }

    async fn execute(&self, conn: &mut C) -> Result<Self::Output>;

    async fn initiate(&self, conn: &mut C) -> Result<OpFuture<Self::Output>> {
        let value = self.execute(conn).await?;
        Ok(Box::pin(std::future::ready(Ok(value))))
    }
}
