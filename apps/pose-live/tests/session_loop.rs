//! State-machine tests driven through a scripted mock transport. Timed tests
//! run with the clock paused so backoff delays elapse instantly.

use pose_live::session::{
    ConnectionState, RunState, SessionClient, SessionHandle, SessionOptions, SessionSnapshot,
};
use pose_live::transport::mock::{MockConnector, MockLink};
use pose_proto::{AudioBot, Exercise, Preferences};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn spawn_session(connector: &MockConnector) -> SessionHandle {
    SessionClient::spawn(
        Arc::new(connector.clone()),
        SessionOptions::new(Preferences::default()),
    )
}

async fn wait_for(
    rx: &mut watch::Receiver<SessionSnapshot>,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    loop {
        if pred(&rx.borrow_and_update()) {
            return rx.borrow().clone();
        }
        rx.changed().await.expect("session task dropped");
    }
}

async fn wait_sent(link: &MockLink, count: usize) -> Vec<String> {
    for _ in 0..200 {
        let sent = link.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never sent {count} commands; got {:?}", link.sent());
}

async fn connected_session(connector: &MockConnector) -> (SessionHandle, watch::Receiver<SessionSnapshot>, MockLink) {
    let handle = spawn_session(connector);
    let mut rx = handle.subscribe();
    handle.connect().unwrap();
    wait_for(&mut rx, |s| s.connection == ConnectionState::Connected).await;
    let link = connector.latest_link().expect("no transport opened");
    (handle, rx, link)
}

#[tokio::test(start_paused = true)]
async fn reconnect_attempts_never_exceed_five() {
    let connector = MockConnector::new();
    connector.fail_next_connects(u32::MAX);

    let handle = spawn_session(&connector);
    let mut rx = handle.subscribe();
    handle.connect().unwrap();

    let snapshot = wait_for(&mut rx, |s| {
        s.last_error.as_deref() == Some("Failed to connect. Please try manually reconnecting.")
    })
    .await;

    assert_eq!(snapshot.reconnect_attempts, 5);
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    // One manual attempt plus five retries, then it gives up for good.
    assert_eq!(connector.attempts(), 6);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_a_pending_reconnect() {
    let connector = MockConnector::new();
    connector.fail_next_connects(u32::MAX);

    let handle = spawn_session(&connector);
    let mut rx = handle.subscribe();
    handle.connect().unwrap();

    // First attempt fails; a retry is now scheduled 3s out.
    wait_for(&mut rx, |s| s.connection == ConnectionState::Disconnected).await;
    assert_eq!(connector.attempts(), 1);

    handle.disconnect().unwrap();
    wait_for(&mut rx, |s| {
        s.connection == ConnectionState::Disconnected && s.last_error.is_none()
    })
    .await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_connect_after_giving_up_resets_the_budget() {
    let connector = MockConnector::new();
    connector.fail_next_connects(u32::MAX);

    let handle = spawn_session(&connector);
    let mut rx = handle.subscribe();
    handle.connect().unwrap();
    wait_for(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(connector.attempts(), 6);

    connector.fail_next_connects(0);
    handle.connect().unwrap();
    let snapshot = wait_for(&mut rx, |s| s.connection == ConnectionState::Connected).await;
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(snapshot.last_error, None);
    assert_eq!(connector.attempts(), 7);
}

#[tokio::test(start_paused = true)]
async fn unexpected_close_triggers_backoff_reconnect() {
    let connector = MockConnector::new();
    let (_handle, mut rx, link) = connected_session(&connector).await;

    link.server_close();
    wait_for(&mut rx, |s| s.connection == ConnectionState::Disconnected).await;

    // The retry fires after the 3s backoff and succeeds.
    let snapshot = wait_for(&mut rx, |s| s.connection == ConnectionState::Connected).await;
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn start_while_disconnected_errors_locally_and_sends_nothing() {
    let connector = MockConnector::new();
    let handle = spawn_session(&connector);
    let mut rx = handle.subscribe();

    handle.start(Exercise::Squats).unwrap();
    let snapshot = wait_for(&mut rx, |s| s.last_error.is_some()).await;

    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Not connected to server. Please connect first.")
    );
    assert_eq!(connector.attempts(), 0);
    assert!(connector.latest_link().is_none());
}

#[tokio::test]
async fn good_form_squats_then_pose_lost() {
    let connector = MockConnector::new();
    let (handle, mut rx, link) = connected_session(&connector).await;

    let sent = wait_sent(&link, 1).await;
    assert_eq!(sent[0], r#"{"action":"connect"}"#);

    handle.start(Exercise::Squats).unwrap();
    let sent = wait_sent(&link, 2).await;
    assert_eq!(sent[1], r#"{"action":"start","exercise":"Squats"}"#);

    link.server_text(r#"{"status":"started"}"#);
    wait_for(&mut rx, |s| s.run == RunState::Running).await;

    link.server_text(r#"{"type":"frame","data":"anBlZ2J5dGVz","prediction":"good","rep_count":1}"#);
    let snapshot = wait_for(&mut rx, |s| s.display.feedback.is_some()).await;
    assert_eq!(
        snapshot.display.feedback.as_deref(),
        Some("Good form! Keep it up.")
    );
    assert_eq!(snapshot.display.frame_jpeg.as_deref(), Some(&b"jpegbytes"[..]));
    assert_eq!(snapshot.display.rep_count, 1);

    link.server_text(r#"{"error":"Pose lost"}"#);
    let snapshot = wait_for(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(snapshot.last_error.as_deref(), Some("Pose lost"));
    assert_eq!(snapshot.run, RunState::Idle);
    assert_eq!(snapshot.display.frame_jpeg, None);
}

#[tokio::test]
async fn stopped_status_clears_the_display() {
    let connector = MockConnector::new();
    let (handle, mut rx, link) = connected_session(&connector).await;

    handle.start(Exercise::Lunges).unwrap();
    link.server_text(r#"{"status":"started"}"#);
    link.server_text(r#"{"type":"frame","frame":"anBlZ2J5dGVz","error_counts":{"knee past toe":3},"frame_count":30}"#);
    wait_for(&mut rx, |s| s.display.frame_count == 30).await;

    link.server_text(r#"{"status":"stopped"}"#);
    let snapshot = wait_for(&mut rx, |s| s.display == Default::default()).await;
    assert_eq!(snapshot.run, RunState::Idle);
}

#[tokio::test]
async fn stop_resets_locally_even_when_disconnected() {
    let connector = MockConnector::new();
    let (handle, mut rx, link) = connected_session(&connector).await;

    link.server_text(r#"{"status":"started"}"#);
    link.server_text(r#"{"type":"frame","data":"anBlZ2J5dGVz","prediction":"good"}"#);
    wait_for(&mut rx, |s| s.display.frame_jpeg.is_some()).await;

    handle.disconnect().unwrap();
    wait_for(&mut rx, |s| s.connection == ConnectionState::Disconnected).await;

    handle.stop().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.run, RunState::Idle);
    assert_eq!(snapshot.display, Default::default());
    // Nothing beyond the connect hello ever went out.
    assert_eq!(link.sent().len(), 1);
}

#[tokio::test]
async fn transport_error_sets_last_error_without_dropping_the_connection() {
    let connector = MockConnector::new();
    let (_handle, mut rx, link) = connected_session(&connector).await;

    link.server_error("broken pipe");
    let snapshot = wait_for(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Connection error: broken pipe")
    );
    // The state transition waits for the close event.
    assert_eq!(snapshot.connection, ConnectionState::Connected);
}

#[tokio::test]
async fn events_from_a_replaced_transport_are_ignored() {
    let connector = MockConnector::new();
    let (handle, mut rx, link) = connected_session(&connector).await;

    handle.disconnect().unwrap();
    wait_for(&mut rx, |s| s.connection == ConnectionState::Disconnected).await;
    assert!(link.is_closed());

    // Late events from the superseded transport must be no-ops: no run-state
    // change and no reconnect scheduling from its close.
    link.server_text(r#"{"status":"started"}"#);
    link.server_close();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert_eq!(snapshot.run, RunState::Idle);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn malformed_messages_never_change_state() {
    let connector = MockConnector::new();
    let (_handle, mut rx, link) = connected_session(&connector).await;

    link.server_text(r#"{"status":"started"}"#);
    let before = wait_for(&mut rx, |s| s.run == RunState::Running).await;

    link.server_text("not json at all");
    link.server_text(r#"{"type":"status","message":"Not connected"}"#);
    link.server_text(r#"{"unrelated":true}"#);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(rx.borrow().clone(), before);
}

#[tokio::test]
async fn audio_is_delivered_only_with_audiobot_on() {
    let connector = MockConnector::new();
    let prefs = Preferences {
        audiobot: AudioBot::On,
        language: None,
    };
    let mut handle = SessionClient::spawn(Arc::new(connector.clone()), SessionOptions::new(prefs));
    let mut audio = handle.take_audio().unwrap();
    let mut rx = handle.subscribe();
    handle.connect().unwrap();
    wait_for(&mut rx, |s| s.connection == ConnectionState::Connected).await;

    let link = connector.latest_link().unwrap();
    link.server_text(r#"{"type":"audio","audio_data":"c291bmQ="}"#);
    assert_eq!(audio.recv().await, Some(b"sound".to_vec()));

    // With the default (off) preference the clip is dropped.
    let muted_connector = MockConnector::new();
    let muted_handle = spawn_session(&muted_connector);
    let mut muted_rx = muted_handle.subscribe();
    muted_handle.connect().unwrap();
    wait_for(&mut muted_rx, |s| s.connection == ConnectionState::Connected).await;
    let muted_link = muted_connector.latest_link().unwrap();
    muted_link.server_text(r#"{"type":"audio","audio_data":"c291bmQ="}"#);
    muted_link.server_text(r#"{"status":"started"}"#);
    let snapshot = wait_for(&mut muted_rx, |s| s.run == RunState::Running).await;
    assert_eq!(snapshot.last_error, None);
}
