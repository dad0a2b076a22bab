//! Session lifecycle scenarios: pairing, reconnect, terminate

use super::{start_engine, wait_until};
use crate::core_engine::{ConnectError, SessionPhase};
use crate::core_protocol::{LoopbackClient, LoopbackConfig, ProtocolClient, ProtocolEvent};
use std::time::Duration;
use tempfile::tempdir;

fn pairing_config(confirm: bool) -> LoopbackConfig {
    LoopbackConfig {
        pairing_codes: vec!["2@first".into(), "2@second".into()],
        code_interval: Duration::from_millis(20),
        confirm_pairing: confirm,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_pairing_publishes_codes_then_connects() {
    let (client, engine) = start_engine(LoopbackClient::with_config(pairing_config(true)));
    assert_eq!(engine.phase(), SessionPhase::Unpaired);

    let mut codes = engine.watch_pairing();
    let task = engine.session().spawn_establish().unwrap();

    codes.changed().await.unwrap();
    let first = codes.borrow_and_update().clone().unwrap();
    assert_eq!(first.payload, "2@first");
    assert_eq!(engine.phase(), SessionPhase::Pairing);

    task.await.unwrap().unwrap();
    wait_until(|| engine.is_ready()).await;

    assert!(client.has_stored_identity());
    assert!(engine.pairing_code().is_none());
    assert!(!engine.session().is_establishing());
}

#[tokio::test]
async fn test_pairing_timeout_returns_to_unpaired() {
    let (client, engine) = start_engine(LoopbackClient::with_config(pairing_config(false)));

    engine.session().establish().await.unwrap();

    assert_eq!(engine.phase(), SessionPhase::Unpaired);
    assert!(!engine.is_ready());
    assert!(engine.pairing_code().is_none());
    assert!(!client.has_stored_identity());
}

#[tokio::test]
async fn test_second_establish_is_refused_while_pairing() {
    let (_client, engine) = start_engine(LoopbackClient::with_config(pairing_config(true)));

    let task = engine.session().spawn_establish().unwrap();
    assert!(engine.session().is_establishing());

    assert!(matches!(
        engine.session().spawn_establish(),
        Err(ConnectError::AlreadyEstablishing)
    ));
    assert_eq!(engine.session().establish().await, Err(ConnectError::AlreadyEstablishing));
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_drop_and_reconnect() {
    let (client, engine) = start_engine(LoopbackClient::paired());
    assert_eq!(engine.phase(), SessionPhase::Disconnected);

    engine.session().establish().await.unwrap();
    wait_until(|| engine.is_ready()).await;

    client.drop_connection();
    wait_until(|| !engine.is_ready()).await;
    assert_eq!(engine.phase(), SessionPhase::Disconnected);

    engine.session().establish().await.unwrap();
    wait_until(|| engine.is_ready()).await;
}

#[tokio::test]
async fn test_early_disconnect_event_leaves_session_not_ready() {
    let (client, engine) = start_engine(LoopbackClient::paired());

    client.emit(ProtocolEvent::Disconnected);
    client.emit(ProtocolEvent::Connected);
    wait_until(|| engine.is_ready()).await;

    client.emit(ProtocolEvent::Disconnected);
    wait_until(|| !engine.is_ready()).await;
}

#[tokio::test]
async fn test_terminate_twice_leaves_disconnected() {
    let (client, engine) = start_engine(LoopbackClient::paired());
    engine.session().establish().await.unwrap();
    wait_until(|| engine.is_ready()).await;

    engine.session().terminate().await;
    engine.session().terminate().await;

    assert_eq!(engine.phase(), SessionPhase::Disconnected);
    assert!(!engine.is_ready());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_stored_identity_survives_restart() {
    let dir = tempdir().unwrap();
    let config = LoopbackConfig {
        device_store: Some(dir.path().join("device.json")),
        ..pairing_config(true)
    };

    {
        let (_client, engine) = start_engine(LoopbackClient::open(config.clone()).unwrap());
        engine.session().establish().await.unwrap();
        wait_until(|| engine.is_ready()).await;
        engine.session().disconnect().await;
    }

    let (client, engine) = start_engine(LoopbackClient::open(config).unwrap());
    assert!(client.has_stored_identity());
    assert_eq!(engine.phase(), SessionPhase::Disconnected);

    engine.session().establish().await.unwrap();
    wait_until(|| engine.is_ready()).await;
    assert!(engine.pairing_code().is_none());
}

#[tokio::test]
async fn test_terminate_during_pairing_stays_logged_out() {
    let (client, engine) = start_engine(LoopbackClient::with_config(LoopbackConfig {
        pairing_codes: vec!["2@first".into(), "2@second".into()],
        code_interval: Duration::from_millis(100),
        ..Default::default()
    }));

    let task = engine.session().spawn_establish().unwrap();
    wait_until(|| engine.phase() == SessionPhase::Pairing).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    engine.session().terminate().await;
    assert_eq!(engine.phase(), SessionPhase::Disconnected);

    task.await.unwrap().unwrap();
    assert!(!engine.session().is_establishing());

    // Past the point where the abandoned pairing would have been confirmed
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(engine.phase(), SessionPhase::Disconnected);
    assert!(!engine.is_ready());
    assert!(!client.has_stored_identity());
    assert!(!client.is_connected());
    assert!(engine.pairing_code().is_none());
}

#[tokio::test]
async fn test_pairing_can_restart_after_terminate() {
    let (client, engine) = start_engine(LoopbackClient::with_config(LoopbackConfig {
        pairing_codes: vec!["2@only".into()],
        code_interval: Duration::from_millis(50),
        ..Default::default()
    }));

    let task = engine.session().spawn_establish().unwrap();
    wait_until(|| engine.phase() == SessionPhase::Pairing).await;
    engine.session().terminate().await;
    task.await.unwrap().unwrap();

    engine.session().establish().await.unwrap();
    wait_until(|| engine.is_ready()).await;
    assert!(client.has_stored_identity());
}
