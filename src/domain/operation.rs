//! Result payload of a completed operation.

use std::collections::HashMap;

use crate::domain::host::Host;

/// A successful attempt's payload, decorated with the node that served it
/// and the connection's context metadata captured at success.
#[derive(Debug, Clone)]
pub struct OperationResult<T> {
    value: T,
    node: Host,
    metadata: HashMap<String, String>,
}

impl<T> OperationResult<T> {
    pub fn new(value: T, node: Host, metadata: HashMap<String, String>) -> Self {
        Self {
            value,
            node,
            metadata,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// The host whose connection served the attempt.
    pub fn node(&self) -> &Host {
        &self.node
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}
