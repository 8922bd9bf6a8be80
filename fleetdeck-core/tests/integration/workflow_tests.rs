//! Collector, runner, tester and checker working over one store

use std::sync::Arc;
use std::time::Duration;

use fleetdeck_core::testing::TEST_COMMAND;
use fleetdeck_core::transport::mock::MockDialer;
use fleetdeck_core::{
    CheckerConfig, CollectionOutcome, CollectorConfig, CommandRunner, ConnectError,
    ConnectionPool, ConnectionTester, HostDirectory, HostStatus, Inventory, MemoryStore,
    MetricsCollector, MonitorChecker, MonitorDefinition, NetworkProber, PlaintextVault,
    PoolConfig, ProbeStatus,
};

const INVENTORY: &str = r#"
[[hosts]]
name = "web-1"
host = "10.0.0.11"
username = "deploy"
auth = "password"
encrypted_password = "hunter2"
"#;

struct Fleet {
    dialer: MockDialer,
    store: Arc<MemoryStore>,
    collector: MetricsCollector,
    runner: CommandRunner,
    tester: ConnectionTester,
}

fn fleet() -> Fleet {
    let store = Arc::new(
        Inventory::from_toml(INVENTORY, "inventory.toml")
            .unwrap()
            .into_store(),
    );
    let dialer = MockDialer::new();
    dialer.script_stdout(TEST_COMMAND, "ok\n");
    let vault = Arc::new(PlaintextVault);
    let pool = ConnectionPool::new(Arc::new(dialer.clone()), PoolConfig::default());

    let collector = MetricsCollector::new(
        pool.clone(),
        store.clone(),
        store.clone(),
        vault.clone(),
        CollectorConfig::default(),
    );
    let runner = CommandRunner::new(pool, store.clone(), store.clone(), vault.clone());
    let tester = ConnectionTester::new(Arc::new(dialer.clone()), store.clone(), vault);

    Fleet {
        dialer,
        store,
        collector,
        runner,
        tester,
    }
}

#[tokio::test]
async fn collection_and_commands_share_a_connection() {
    let Fleet {
        dialer,
        store,
        collector,
        runner,
        ..
    } = fleet();
    let host = store.find_host_by_name("web-1").await.unwrap();

    let outcome = collector.collect_host(&host).await;
    assert!(matches!(outcome, CollectionOutcome::Collected(_)), "{outcome:?}");

    let record = runner
        .run(host.id, "uptime", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(record.exit_code, 0);

    assert_eq!(dialer.dial_count(), 1);
    assert_eq!(dialer.targets()[0].username, "deploy");
    assert_eq!(store.samples_for(host.id).await.len(), 1);
    assert_eq!(store.commands().await.len(), 1);
    assert_eq!(
        store.get_host(host.id).await.unwrap().status,
        HostStatus::Online
    );
}

#[tokio::test]
async fn unreachable_host_recovers_after_connectivity_test() {
    let Fleet {
        dialer,
        store,
        collector,
        tester,
        ..
    } = fleet();
    let host = store.find_host_by_name("web-1").await.unwrap();

    dialer.set_dial_error(Some(ConnectError::Unreachable("10.0.0.11:22".into())));
    let outcome = collector.collect_host(&host).await;
    assert!(matches!(outcome, CollectionOutcome::Offline(_)), "{outcome:?}");
    assert_eq!(
        store.get_host(host.id).await.unwrap().status,
        HostStatus::Offline
    );
    assert!(store.samples_for(host.id).await.is_empty());

    dialer.set_dial_error(None);
    let result = tester.test_host(&host).await;
    assert!(result.success, "{result:?}");
    assert_eq!(
        store.get_host(host.id).await.unwrap().status,
        HostStatus::Online
    );
}

#[tokio::test]
async fn tcp_monitor_tracks_uptime_across_outage() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let monitor = MonitorDefinition::tcp("db port", format!("tcp://{address}")).with_timeout_ms(2000);
    let store = Arc::new(MemoryStore::with_inventory(Vec::new(), vec![monitor.clone()]));
    let checker = MonitorChecker::new(
        store.clone(),
        Arc::new(NetworkProber::new().unwrap()),
        CheckerConfig::default(),
    );

    let probe = checker.check_monitor(&monitor).await;
    assert_eq!(probe.status, ProbeStatus::Up, "{probe:?}");
    let state = store.get_monitor(monitor.id).await.unwrap().state;
    assert!((state.uptime_percent - 100.0).abs() < f64::EPSILON);
    assert_eq!(state.consecutive_fails, 0);

    drop(listener);
    let probe = checker.check_monitor(&monitor).await;
    assert_eq!(probe.status, ProbeStatus::Down);
    assert!(probe.error.is_some());

    let state = store.get_monitor(monitor.id).await.unwrap().state;
    assert!((state.uptime_percent - 50.0).abs() < f64::EPSILON);
    assert_eq!(state.consecutive_fails, 1);
    assert_eq!(state.last_status, Some(ProbeStatus::Down));
    assert_eq!(store.probes(monitor.id).await.len(), 2);
}
