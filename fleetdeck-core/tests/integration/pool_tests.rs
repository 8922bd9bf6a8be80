//! Connection pool behaviour under concurrency and failure

use std::sync::Arc;
use std::time::Duration;

use fleetdeck_core::transport::mock::MockDialer;
use fleetdeck_core::{
    ConnectionKey, ConnectionPool, Credentials, DialTarget, PoolConfig, PoolStats, RemoteSession,
};
use tokio::task::JoinSet;

fn target(host: &str) -> DialTarget {
    DialTarget::new(ConnectionKey::new(host, 22), "ops", Credentials::Agent)
}

#[tokio::test(start_paused = true)]
async fn concurrent_acquires_share_one_dial() {
    let dialer = MockDialer::new();
    dialer.set_dial_delay(Duration::from_millis(200));
    let pool = ConnectionPool::new(Arc::new(dialer.clone()), PoolConfig::default());

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let pool = pool.clone();
        tasks.spawn(async move { pool.acquire(&target("db")).await.map(|c| c.id()) });
    }

    let mut ids = Vec::new();
    while let Some(result) = tasks.join_next().await {
        ids.push(result.unwrap().unwrap());
    }

    assert_eq!(dialer.dial_count(), 1);
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(pool.stats().await, PoolStats { keys: 1, connections: 1 });
    pool.shutdown().await;
}

#[tokio::test]
async fn failed_probe_replaces_connection() {
    let dialer = MockDialer::new();
    let pool = ConnectionPool::new(Arc::new(dialer.clone()), PoolConfig::default());

    let first = pool.acquire(&target("db")).await.unwrap();
    let stale = dialer.last_transport().unwrap();
    stale.set_healthy(false);

    let second = pool.acquire(&target("db")).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert!(first.is_closed());
    assert_eq!(stale.close_count(), 1);
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(pool.connection_count(&ConnectionKey::new("db", 22)).await, 1);
    pool.shutdown().await;
    assert_eq!(stale.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn idle_sweep_closes_each_connection_once() {
    let dialer = MockDialer::new();
    let config = PoolConfig {
        idle_timeout: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(30),
        keepalive_interval: Duration::from_secs(3600),
        ..PoolConfig::default()
    };
    let pool = ConnectionPool::new(Arc::new(dialer.clone()), config);
    pool.start().await;

    pool.acquire(&target("a")).await.unwrap();
    pool.acquire(&target("b")).await.unwrap();
    assert_eq!(pool.stats().await.connections, 2);

    tokio::time::sleep(Duration::from_secs(95)).await;

    assert_eq!(pool.stats().await, PoolStats::default());
    for transport in dialer.transports() {
        assert_eq!(transport.close_count(), 1);
    }

    pool.shutdown().await;
    for transport in dialer.transports() {
        assert_eq!(transport.close_count(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn used_connection_survives_sweep() {
    let dialer = MockDialer::new();
    let config = PoolConfig {
        idle_timeout: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(30),
        keepalive_interval: Duration::from_secs(3600),
        ..PoolConfig::default()
    };
    let pool = ConnectionPool::new(Arc::new(dialer.clone()), config);
    pool.start().await;

    let conn = pool.acquire(&target("a")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(45)).await;
    let session = conn.open_session().await.unwrap();
    session.close().await;
    tokio::time::sleep(Duration::from_secs(50)).await;

    assert!(!conn.is_closed());
    assert_eq!(pool.stats().await.connections, 1);
    pool.shutdown().await;
}
