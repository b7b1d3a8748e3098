//! Push connection lifecycle against a scripted connector, on a paused clock.

mod common;

use std::time::Duration;

use codegraph_viewer::backend::protocol::{ping_message, subscribe_message};
use codegraph_viewer::backend::{
    ConnectionEvent, ConnectionManager, ConnectionState, PushEvent, PushSettings,
};
use codegraph_viewer::graph::GraphDelta;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

use common::{Attempt, open_socket, scripted_connector};

const DELAY: Duration = Duration::from_secs(5);

fn settings() -> PushSettings {
    PushSettings {
        reconnect_delay: DELAY,
        keepalive: None,
    }
}

fn drain_states(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ConnectionEvent::State(state) = event {
            states.push(state);
        }
    }
    states
}

#[tokio::test(start_paused = true)]
async fn three_failures_then_three_spaced_reconnects() {
    let (socket, _peer) = open_socket();
    let (connector, probe) = scripted_connector(vec![
        Attempt::Refuse,
        Attempt::Refuse,
        Attempt::Refuse,
        Attempt::Accept(socket),
    ]);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let start = Instant::now();
    let manager = ConnectionManager::start(connector, settings(), &Handle::current(), events_tx);

    for checkpoint in [1, 6, 11] {
        sleep(Duration::from_secs(checkpoint) - start.elapsed()).await;
        assert!(!manager.is_connected(), "connected too early at {checkpoint}s");
    }

    sleep(Duration::from_secs(16) - start.elapsed()).await;
    assert!(manager.is_connected());
    assert_eq!(manager.reconnect_attempts(), 3);

    let offsets = probe
        .connect_times()
        .into_iter()
        .map(|at| at - start)
        .collect::<Vec<_>>();
    assert_eq!(offsets, vec![Duration::ZERO, DELAY, DELAY * 2, DELAY * 3]);

    assert_eq!(
        drain_states(&mut events),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_reconnect() {
    let (connector, probe) = scripted_connector(vec![Attempt::Refuse]);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut manager =
        ConnectionManager::start(connector, settings(), &Handle::current(), events_tx);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(probe.connect_count(), 1);

    manager.shutdown();
    manager.shutdown();
    assert!(manager.is_shut_down());

    sleep(DELAY * 4).await;
    assert_eq!(probe.connect_count(), 1);
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // The task has finished and dropped its sender.
    while events.recv().await.is_some() {}
}

#[tokio::test(start_paused = true)]
async fn malformed_message_keeps_connection_open() {
    let (socket, peer) = open_socket();
    let (connector, probe) = scripted_connector(vec![Attempt::Accept(socket)]);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let manager = ConnectionManager::start(connector, settings(), &Handle::current(), events_tx);

    sleep(Duration::from_millis(10)).await;
    assert!(manager.is_connected());
    assert_eq!(peer.sent(), vec![subscribe_message()]);

    peer.push("this is not json");
    peer.push(r#"{"type":"node_added","data":{"id":42}}"#);
    peer.push(r#"{"type":"progress","data":{"percent":40}}"#);
    peer.push(r#"{"type":"node_removed","data":{"nodeId":"a"}}"#);
    sleep(Duration::from_millis(10)).await;

    assert!(manager.is_connected());
    assert_eq!(probe.connect_count(), 1);

    let pushed = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            ConnectionEvent::Push(event) => Some(event),
            ConnectionEvent::State(_) => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        pushed,
        vec![PushEvent::Delta(GraphDelta::NodeRemoved {
            node_id: "a".to_owned()
        })]
    );
}

#[tokio::test(start_paused = true)]
async fn peer_close_schedules_reconnect() {
    let (socket, peer) = open_socket();
    let (connector, probe) = scripted_connector(vec![Attempt::Accept(socket)]);
    let (events_tx, _events) = mpsc::unbounded_channel();
    let manager = ConnectionManager::start(connector, settings(), &Handle::current(), events_tx);

    sleep(Duration::from_millis(10)).await;
    assert!(manager.is_connected());

    drop(peer);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    sleep(DELAY).await;
    assert_eq!(probe.connect_count(), 2);
    assert_eq!(manager.reconnect_attempts(), 1);
    assert_eq!(manager.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn keepalive_pings_while_connected() {
    let (socket, peer) = open_socket();
    let (connector, _probe) = scripted_connector(vec![Attempt::Accept(socket)]);
    let (events_tx, _events) = mpsc::unbounded_channel();
    let settings = PushSettings {
        reconnect_delay: DELAY,
        keepalive: Some(Duration::from_secs(30)),
    };
    let _manager = ConnectionManager::start(connector, settings, &Handle::current(), events_tx);

    sleep(Duration::from_secs(61)).await;
    assert_eq!(
        peer.sent(),
        vec![subscribe_message(), ping_message(), ping_message()]
    );
}

#[tokio::test(start_paused = true)]
async fn zero_keepalive_disables_pings() {
    let (socket, peer) = open_socket();
    let (connector, _connects) = scripted_connector(vec![Attempt::Accept(socket)]);
    let (events_tx, _events) = mpsc::unbounded_channel();
    let settings = PushSettings {
        reconnect_delay: DELAY,
        keepalive: Some(Duration::ZERO),
    };
    let manager = ConnectionManager::start(connector, settings, &Handle::current(), events_tx);

    sleep(Duration::from_secs(61)).await;
    assert!(manager.is_connected());
    assert_eq!(peer.sent(), vec![subscribe_message()]);
}
