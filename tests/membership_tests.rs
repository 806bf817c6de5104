//! Membership management: idempotent admission and removal, prime-failure
//! rollback, refresh convergence, and the membership queries.

use ringpool::domain::Host;
use ringpool::testkit::domain::{down_host, host};
use ringpool::testkit::harness::TestPool;

// ---------------------------------------------------------------------------
// Admission and removal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_host_is_idempotent() {
    let t = TestPool::started(vec![host("node-a")], 0).await;

    assert!(t.pool.add_host(host("node-b"), true).await.unwrap());
    assert!(!t.pool.add_host(host("node-b"), true).await.unwrap());

    assert_eq!(t.pool.host_count(), 2);
    assert_eq!(
        t.selection
            .added_hosts()
            .iter()
            .filter(|h| **h == host("node-b"))
            .count(),
        1
    );
}

#[tokio::test]
async fn remove_host_is_idempotent() {
    let t = TestPool::started(vec![host("node-a"), host("node-b")], 0).await;

    assert!(t.pool.remove_host(&host("node-b")).await);
    assert!(!t.pool.remove_host(&host("node-b")).await);

    assert_eq!(t.pool.host_count(), 1);
    assert_eq!(t.monitor.removed_hosts(), vec![host("node-b")]);
    assert_eq!(t.health.removed_hosts(), vec![host("node-b")]);
}

#[tokio::test]
async fn prime_failure_rolls_the_host_back() {
    let t = TestPool::started(vec![host("node-a")], 0).await;

    t.backend.fail_next_connects(&host("node-b"), u32::MAX);
    let admitted = t.pool.add_host(host("node-b"), true).await.unwrap();

    assert!(!admitted);
    assert!(!t.pool.has_host(&host("node-b")));
    assert!(t.pool.host_pool(&host("node-b")).is_none());
    // The selection strategy never learned about the host.
    assert!(!t.selection.added_hosts().contains(&host("node-b")));
}

#[tokio::test]
async fn update_hosts_or_folds_individual_results() {
    let t = TestPool::started(vec![host("node-a")], 0).await;

    // Nothing new: the existing host is a no-op, the unknown removal too.
    let changed = t
        .pool
        .update_hosts(vec![host("node-a")], vec![host("node-x")])
        .await
        .unwrap();
    assert!(!changed);

    let changed = t
        .pool
        .update_hosts(vec![host("node-b")], vec![])
        .await
        .unwrap();
    assert!(changed);
}

// ---------------------------------------------------------------------------
// Refresh convergence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_converges_onto_the_supplier_snapshot() {
    let t = TestPool::started(vec![host("node-a"), host("node-b")], 0).await;
    let pool_a = t.pool.host_pool(&host("node-a")).unwrap();

    t.supplier.set_hosts(vec![host("node-b"), host("node-c")]);
    let changed = t.pool.refresh().await.unwrap();

    assert!(changed);
    assert_eq!(t.pool.host_count(), 2);
    assert!(t.pool.has_host(&host("node-b")));
    assert!(t.pool.has_host(&host("node-c")));
    assert!(!t.pool.has_host(&host("node-a")));

    assert!(t.selection.added_hosts().contains(&host("node-c")));
    assert!(t.selection.removed_hosts().contains(&host("node-a")));
    // The departed host's sub-pool has been shut down.
    assert!(!pool_a.is_active());
}

#[tokio::test]
async fn refresh_removes_hosts_reported_down() {
    let t = TestPool::started(vec![host("node-a"), host("node-b")], 0).await;

    t.supplier
        .set_hosts(vec![host("node-a"), down_host("node-b")]);
    t.pool.refresh().await.unwrap();

    assert!(t.pool.has_host(&host("node-a")));
    assert!(!t.pool.has_host(&host("node-b")));
}

#[tokio::test]
async fn refresh_retries_a_previously_unprimable_host() {
    let t = TestPool::started(vec![host("node-a")], 0).await;

    t.backend.fail_next_connects(&host("node-b"), u32::MAX);
    t.supplier.set_hosts(vec![host("node-a"), host("node-b")]);
    t.pool.refresh().await.unwrap();
    assert!(!t.pool.has_host(&host("node-b")));

    // The backend recovered; the next tick admits the host.
    t.backend.fail_next_connects(&host("node-b"), 0);
    t.pool.refresh().await.unwrap();
    assert!(t.pool.has_host(&host("node-b")));
}

#[tokio::test]
async fn startup_drops_hosts_that_fail_priming() {
    let hosts: Vec<Host> = (1..=12).map(|i| host(&format!("node-{i:02}"))).collect();
    let t = TestPool::build(hosts.clone(), 0);
    t.backend.fail_next_connects(&hosts[6], u32::MAX);

    let started = t.pool.start().await.unwrap();

    assert!(started);
    assert_eq!(t.pool.host_count(), 11);
    assert!(!t.pool.has_host(&hosts[6]));
    assert_eq!(t.monitor.last_host_count(), Some(12));
}

// ---------------------------------------------------------------------------
// Queries and port stamping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn membership_queries_reflect_sub_pool_state() {
    let t = TestPool::started(vec![host("node-a"), host("node-b")], 0).await;

    assert!(t.pool.is_host_up(&host("node-a")));
    assert!(t.pool.has_host(&host("node-b")));
    assert!(!t.pool.has_host(&host("node-z")));
    assert_eq!(t.pool.pools().len(), 2);
    assert_eq!(t.pool.active_pools().len(), 2);

    let sub = t.pool.host_pool(&host("node-a")).unwrap();
    assert_eq!(sub.host(), &host("node-a"));
    assert_eq!(sub.primed_count(), 2);

    sub.shutdown().await;
    assert!(!t.pool.is_host_up(&host("node-a")));
    assert_eq!(t.pool.active_pools().len(), 1);
}

#[tokio::test]
async fn configured_port_is_stamped_on_admission() {
    let mut config = ringpool::testkit::config::fast();
    config.port = Some(6380);
    let t = TestPool::started_with(vec![Host::new("node-a", 8102)], 0, config).await;

    // Any port in the query resolves to the stamped identity.
    assert!(t.pool.has_host(&Host::new("node-a", 1)));
    let sub = t.pool.host_pool(&Host::new("node-a", 8102)).unwrap();
    assert_eq!(sub.host().port(), 6380);
}

#[tokio::test]
async fn status_snapshot_is_observable() {
    let t = TestPool::started(vec![host("node-a"), down_host("node-b")], 0).await;

    let status = t.pool.last_host_status();
    assert_eq!(status.up().len(), 1);
    assert_eq!(status.down().len(), 1);
    assert!(status.is_up(&host("node-a")));
    assert!(!status.is_up(&host("node-b")));
    assert_eq!(status.host_count(), 2);

    // The down host was never admitted.
    assert!(!t.pool.has_host(&host("node-b")));
    assert_eq!(t.pool.host_count(), 1);
}

#[tokio::test]
async fn topology_tracks_membership() {
    let t = TestPool::started(vec![host("node-a"), host("node-b")], 0).await;
    assert_eq!(t.pool.topology().len(), 2);

    t.pool.remove_host(&host("node-b")).await;
    let topo = t.pool.topology();
    assert_eq!(topo.len(), 1);
    assert_eq!(topo.entries[0].owner, host("node-a").address());
}

#[tokio::test]
async fn down_supplier_hosts_are_not_admitted_at_startup() {
    let t = TestPool::started(vec![host("node-a"), down_host("node-b")], 0).await;
    assert_eq!(t.pool.host_count(), 1);
    assert_eq!(t.monitor.last_host_count(), Some(1));
}
