//! Terminal bridge driven end to end over a frame channel

use std::sync::Arc;
use std::time::Duration;

use fleetdeck_core::transport::mock::{MockDialer, MockSession, RemoteShell};
use fleetdeck_core::{
    ConnectionPool, ControlMessage, Frame, FrameSink, FrameSource, Host, HostDirectory,
    MemoryStore, PlaintextVault, PoolConfig, TerminalBridge, TerminalConfig, frame_channel,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct Fixture {
    dialer: MockDialer,
    store: Arc<MemoryStore>,
    bridge: TerminalBridge,
    host: Host,
}

fn fixture() -> Fixture {
    let host = Host::new("web", "web.local", "ops").with_encrypted_password("pw");
    let dialer = MockDialer::new();
    let store = Arc::new(MemoryStore::with_inventory(vec![host.clone()], Vec::new()));
    let pool = ConnectionPool::new(Arc::new(dialer.clone()), PoolConfig::default());
    let bridge = TerminalBridge::new(
        pool,
        store.clone(),
        store.clone(),
        Arc::new(PlaintextVault),
        TerminalConfig::default(),
    );
    Fixture {
        dialer,
        store,
        bridge,
        host,
    }
}

/// Waits until the bridge has started a shell and takes its far end
async fn remote_shell(dialer: &MockDialer) -> (Arc<MockSession>, RemoteShell) {
    for _ in 0..500 {
        if let Some(session) = dialer.last_transport().and_then(|t| t.last_session()) {
            if let Some(remote) = session.take_remote() {
                return (session, remote);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("shell was never started");
}

#[tokio::test(start_paused = true)]
async fn resize_and_input_reach_the_remote_shell() {
    let Fixture {
        dialer,
        store,
        bridge,
        host,
    } = fixture();
    let host_id = host.id;
    let (bridge_end, mut client) = frame_channel(16);

    let run = tokio::spawn(async move {
        bridge
            .run(host_id, bridge_end.sink, bridge_end.source)
            .await
    });

    let (session, mut remote) = remote_shell(&dialer).await;
    assert_eq!(session.pty().unwrap().term, "xterm-256color");

    let resize = ControlMessage::Resize {
        cols: 120,
        rows: 40,
    };
    client.sink.send(Frame::Text(resize.to_json())).await.unwrap();
    client.sink.send(Frame::Text("ls\r".into())).await.unwrap();

    let mut typed = [0u8; 3];
    remote.stdin.read_exact(&mut typed).await.unwrap();
    assert_eq!(&typed, b"ls\r");
    assert_eq!(session.window_changes(), vec![(120, 40)]);

    remote.stdout.write_all(b"file\r\n").await.unwrap();
    assert_eq!(
        client.source.recv().await,
        Some(Frame::Binary(b"file\r\n".to_vec()))
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    drop(remote);

    assert_eq!(client.source.recv().await, Some(Frame::Close));
    let record = run.await.unwrap().unwrap();

    assert_eq!(record.host_id, host_id);
    assert_eq!(record.commands_executed, 1);
    assert_eq!(record.bytes_transferred, 3 + 6);
    assert!(record.duration_seconds >= 3);
    assert!(record.ended_at >= record.started_at);
    assert!(session.is_closed());

    assert_eq!(store.sessions().await, vec![record.clone()]);
    let host = store.get_host(record.host_id).await.unwrap();
    assert_eq!(host.last_connected_at, Some(record.ended_at));
}

#[tokio::test(start_paused = true)]
async fn stderr_is_forwarded_as_binary() {
    let Fixture {
        dialer,
        bridge,
        host,
        ..
    } = fixture();
    let (bridge_end, mut client) = frame_channel(16);

    let run = tokio::spawn(async move {
        bridge
            .run(host.id, bridge_end.sink, bridge_end.source)
            .await
    });

    let (_, mut remote) = remote_shell(&dialer).await;
    remote.stderr.write_all(b"bash: nope\r\n").await.unwrap();
    assert_eq!(
        client.source.recv().await,
        Some(Frame::Binary(b"bash: nope\r\n".to_vec()))
    );

    client.sink.send(Frame::Close).await.unwrap();
    let record = run.await.unwrap().unwrap();
    assert_eq!(record.commands_executed, 0);
    assert_eq!(record.bytes_transferred, 12);
}

#[tokio::test(start_paused = true)]
async fn second_terminal_reuses_pooled_connection() {
    let Fixture {
        dialer,
        store,
        bridge,
        host,
    } = fixture();

    for _ in 0..2 {
        let (bridge_end, client) = frame_channel(16);
        let bridge = bridge.clone();
        let host_id = host.id;
        let run = tokio::spawn(async move {
            bridge.run(host_id, bridge_end.sink, bridge_end.source).await
        });
        let (_, remote) = remote_shell(&dialer).await;
        drop(remote);
        run.await.unwrap().unwrap();
        drop(client);
    }

    assert_eq!(dialer.dial_count(), 1);
    assert_eq!(dialer.last_transport().unwrap().sessions().len(), 2);
    assert_eq!(store.sessions().await.len(), 2);
}
