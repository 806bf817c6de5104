//! Scripted mock transport.
//!
//! A [`ScriptedBackend`] is shared by every connection a test creates: it
//! scripts per-host responses, connect failures and ping failures, and
//! counts opens, executions and pings for assertions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::Host;
use crate::error::{Error, Result};
use crate::port::connection::{Connection, ConnectionContext, ConnectionFactory};
use crate::port::operation::Operation;

/// Shared scripting surface for a test's whole cluster.
///
/// Responses default to `Ok("ok")` once a host's queue is exhausted, so
/// tests only script the interesting attempts.
#[derive(Debug)]
pub struct ScriptedBackend {
    responses: Mutex<HashMap<Host, VecDeque<Result<String>>>>,
    connect_failures: Mutex<HashMap<Host, u32>>,
    failing_pings: Mutex<HashSet<Host>>,
    opened: AtomicU32,
    executed: AtomicU32,
    pings: AtomicU32,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            connect_failures: Mutex::new(HashMap::new()),
            failing_pings: Mutex::new(HashSet::new()),
            opened: AtomicU32::new(0),
            executed: AtomicU32::new(0),
            pings: AtomicU32::new(0),
        })
    }

    /// Script the next response served by `host`.
    pub fn queue_response(&self, host: &Host, result: Result<String>) {
        self.responses
            .lock()
            .entry(host.clone())
            .or_default()
            .push_back(result);
    }

    /// Script `n` consecutive failures on `host`.
    pub fn queue_failures(&self, host: &Host, n: u32, err: Error) {
        for _ in 0..n {
            self.queue_response(host, Err(err.clone()));
        }
    }

    /// Make the next `n` connection attempts to `host` fail.
    pub fn fail_next_connects(&self, host: &Host, n: u32) {
        self.connect_failures.lock().insert(host.clone(), n);
    }

    /// Make every ping against `host` fail.
    pub fn fail_pings(&self, host: &Host) {
        self.failing_pings.lock().insert(host.clone());
    }

    pub fn open_count(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn execute_count(&self) -> u32 {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    fn next_response(&self, host: &Host) -> Result<String> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .get_mut(host)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok("ok".to_string()))
    }

    fn try_open(&self, host: &Host) -> Result<()> {
        let mut failures = self.connect_failures.lock();
        if let Some(remaining) = failures.get_mut(host) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(Error::Connection(format!("connect to {host} refused")));
            }
        }
        drop(failures);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn ping(&self, host: &Host) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.failing_pings.lock().contains(host) {
            Err(Error::Connection(format!("ping to {host} failed")))
        } else {
            Ok(())
        }
    }
}

/// Mock connection bound to a [`ScriptedBackend`].
#[derive(Debug)]
pub struct TestConnection {
    host: Host,
    context: ConnectionContext,
    backend: Arc<ScriptedBackend>,
}

impl TestConnection {
    /// Serve the next scripted response, stamping the serving node into
    /// the connection context.
    pub fn respond(&self) -> Result<String> {
        self.context.set("node", self.host.address());
        self.backend.next_response(&self.host)
    }
}

#[async_trait]
impl Connection for TestConnection {
    fn host(&self) -> &Host {
        &self.host
    }

    fn context(&self) -> &ConnectionContext {
        &self.context
    }

    async fn ping(&mut self) -> Result<()> {
        self.backend.ping(&self.host)
    }

    async fn close(&mut self) {}
}

/// Factory opening [`TestConnection`]s against the shared backend.
pub struct TestConnectionFactory {
    backend: Arc<ScriptedBackend>,
}

impl TestConnectionFactory {
    pub fn new(backend: Arc<ScriptedBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ConnectionFactory for TestConnectionFactory {
    type Connection = TestConnection;

    async fn open(&self, host: &Host) -> Result<TestConnection> {
        self.backend.try_open(host)?;
        Ok(TestConnection {
            host: host.clone(),
            context: ConnectionContext::new(),
            backend: Arc::clone(&self.backend),
        })
    }
}

/// Keyed read served by whichever host the selection strategy picks.
pub struct KeyedGet {
    key: String,
}

impl KeyedGet {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl Operation<TestConnection> for KeyedGet {
    type Output = String;

    fn name(&self) -> &'static str {
        "keyed-get"
    }

    fn key(&self) -> Option<&str> {
        Some(&self.key)
    }

    async fn execute(&self, conn: &mut TestConnection) -> Result<String> {
        conn.respond()
    }
}

/// Key-less operation; lands on an arbitrary host.
pub struct UnkeyedScan;

#[async_trait]
impl Operation<TestConnection> for UnkeyedScan {
    type Output = String;

    fn name(&self) -> &'static str {
        "unkeyed-scan"
    }

    async fn execute(&self, conn: &mut TestConnection) -> Result<String> {
        conn.respond()
    }
}
