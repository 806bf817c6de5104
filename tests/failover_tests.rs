//! Failover execution against a scripted cluster: happy path, retries
//! across replicas, exhaustion, and the non-retriable paths.

use ringpool::error::Error;
use ringpool::testkit::conn::{KeyedGet, UnkeyedScan};
use ringpool::testkit::domain::{fallback_of, host, owner_of};
use ringpool::testkit::harness::TestPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn three_nodes() -> Vec<ringpool::domain::Host> {
    vec![host("node-a"), host("node-b"), host("node-c")]
}

fn backend_err(msg: &str) -> Error {
    Error::Backend(msg.to_string())
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_attempt_success_lands_on_the_token_owner() {
    let hosts = vec![host("node-a"), host("node-b")];
    let t = TestPool::started(hosts.clone(), 0).await;

    let result = t.pool.execute_with_failover(&KeyedGet::new("alpha")).await.unwrap();

    let owner = owner_of("alpha", &hosts);
    assert_eq!(result.node(), &owner);
    assert_eq!(result.value(), "ok");
    assert_eq!(result.metadata().get("node").unwrap(), &owner.address());

    assert_eq!(t.monitor.successes(), vec![owner]);
    assert_eq!(t.monitor.failure_count(), 0);
    assert_eq!(t.retry.success_count(), 1);
    assert_eq!(t.retry.failure_count(), 0);
    assert!(t.ledger.balanced());
}

#[tokio::test]
async fn unkeyed_operations_run_on_some_host() {
    let t = TestPool::started(three_nodes(), 0).await;

    let result = t.pool.execute_with_failover(&UnkeyedScan).await.unwrap();
    assert!(three_nodes().contains(result.node()));
    assert!(t.ledger.balanced());
}

// ---------------------------------------------------------------------------
// Failover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_attempt_retries_on_the_next_replica() {
    let hosts = three_nodes();
    let t = TestPool::started(hosts.clone(), 1).await;

    let owner = owner_of("alpha", &hosts);
    let fallback = fallback_of("alpha", &hosts);
    t.backend.queue_response(&owner, Err(backend_err("shard busy")));

    let result = t.pool.execute_with_failover(&KeyedGet::new("alpha")).await.unwrap();

    assert_eq!(result.node(), &fallback);
    assert_eq!(t.monitor.failures(), vec![Some(owner.clone())]);
    assert_eq!(t.monitor.failovers(), vec![owner.clone()]);
    assert_eq!(t.monitor.successes(), vec![fallback]);
    assert_eq!(t.retry.failure_count(), 1);
    assert_eq!(t.retry.success_count(), 1);
    assert_eq!(t.health.error_reports_for(&owner), 1);
    assert!(t.ledger.balanced());
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_error() {
    let hosts = three_nodes();
    let t = TestPool::started(hosts.clone(), 2).await;

    // Each of the three attempts walks one step around the ring.
    let owner = owner_of("alpha", &hosts);
    let start = hosts.iter().position(|h| *h == owner).unwrap();
    for (i, msg) in ["first down", "second down", "third down"].iter().enumerate() {
        let target = &hosts[(start + i) % hosts.len()];
        t.backend.queue_response(target, Err(backend_err(msg)));
    }

    let err = t
        .pool
        .execute_with_failover(&KeyedGet::new("alpha"))
        .await
        .unwrap_err();

    assert_eq!(err, backend_err("third down"));
    assert_eq!(t.monitor.failure_count(), 3);
    assert_eq!(t.monitor.success_count(), 0);
    assert_eq!(t.retry.failure_count(), 3);
    assert_eq!(t.retry.success_count(), 0);
    assert_eq!(t.health.error_report_count(), 3);
    assert!(t.ledger.balanced());
}

// ---------------------------------------------------------------------------
// Non-retriable paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn selection_without_hosts_fails_immediately() {
    let t = TestPool::started(vec![host("node-a")], 3).await;
    assert!(t.pool.remove_host(&host("node-a")).await);

    let err = t
        .pool
        .execute_with_failover(&KeyedGet::new("alpha"))
        .await
        .unwrap_err();

    assert_eq!(err, Error::NoAvailableHosts);
    assert_eq!(t.monitor.no_host_failure_count(), 1);
    // The retry policy never saw the failure.
    assert_eq!(t.retry.failure_count(), 0);
}

#[tokio::test]
async fn unexpected_errors_are_fatal_and_not_retried() {
    let hosts = three_nodes();
    let t = TestPool::started(hosts.clone(), 5).await;

    let owner = owner_of("alpha", &hosts);
    t.backend
        .queue_response(&owner, Err(Error::Unexpected("assertion tripped".into())));

    let err = t
        .pool
        .execute_with_failover(&KeyedGet::new("alpha"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unexpected(_)));
    assert_eq!(t.retry.failure_count(), 0);
    assert_eq!(t.monitor.host_failure_count(&owner), 1);
    assert!(t.ledger.balanced());
}

#[tokio::test]
async fn exhausted_sub_pool_counts_as_a_hostless_failure() {
    let mut config = ringpool::testkit::config::fast();
    config.max_conns_per_host = 1;
    let t = TestPool::started_with(vec![host("node-a")], 0, config).await;

    // Hold the only connection so the borrow deadline expires.
    let _held = t.pool.connection_for_operation(None).await.unwrap();

    let err = t
        .pool
        .execute_with_failover(&KeyedGet::new("alpha"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PoolExhausted { .. }));
    assert_eq!(t.monitor.no_host_failure_count(), 1);
    assert_eq!(t.retry.failure_count(), 1);
}

// ---------------------------------------------------------------------------
// Connection discipline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn borrows_match_returns_across_a_mixed_workload() {
    let hosts = three_nodes();
    let t = TestPool::started(hosts.clone(), 1).await;

    let owner = owner_of("alpha", &hosts);
    t.backend.queue_response(&owner, Err(backend_err("hiccup")));
    t.backend
        .queue_failures(&hosts[1], 2, backend_err("down for a while"));

    let _ = t.pool.execute_with_failover(&KeyedGet::new("alpha")).await;
    let _ = t.pool.execute_with_failover(&KeyedGet::new("beta")).await;
    let _ = t.pool.execute_with_ring(&UnkeyedScan).await;
    if let Ok(pending) = t.pool.execute_async(&KeyedGet::new("gamma")).await {
        let _ = pending.await;
    }
    let _ = t.pool.execute_with_failover(&UnkeyedScan).await;

    assert!(
        t.ledger.balanced(),
        "borrows {} != returns {}",
        t.ledger.borrow_count(),
        t.ledger.return_count()
    );
}
