//! In-process protocol client
//!
//! Behaves like a real client from the engine's point of view: it keeps a
//! device record on disk, hands out pairing codes until the pairing is
//! confirmed, accepts sends only while connected and emits lifecycle events.
//! Nothing leaves the process. Tests use the failure knobs to script
//! rejected recipients, failed connects and inbound traffic.

use crate::core_protocol::client::{DeliveryId, Jid, ProtocolClient, ProtocolError, ProtocolResult};
use crate::core_protocol::events::{EventBroadcaster, PairingEvent, ProtocolEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Loopback client settings
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Device record location; `None` keeps the identity in memory only
    pub device_store: Option<PathBuf>,
    /// Codes issued during pairing, in order. Empty issues one random code.
    pub pairing_codes: Vec<String>,
    /// Delay before each code rotation and before confirmation
    pub code_interval: Duration,
    /// Confirm the pairing after the last code; otherwise time out
    pub confirm_pairing: bool,
    pub pairing_buffer: usize,
    pub event_buffer: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            device_store: None,
            pairing_codes: Vec::new(),
            code_interval: Duration::ZERO,
            confirm_pairing: true,
            pairing_buffer: 8,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceRecord {
    jid: String,
    paired_at: DateTime<Utc>,
}

/// One accepted send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: Jid,
    pub body: String,
    pub id: DeliveryId,
}

#[derive(Default)]
struct LoopbackState {
    device: Option<DeviceRecord>,
    connected: bool,
    pairing_tx: Option<mpsc::Sender<PairingEvent>>,
    pairing_task: Option<JoinHandle<()>>,
    attempts: Vec<Jid>,
    outbox: Vec<SentMessage>,
    rejected: HashSet<String>,
    fail_next_connect: Option<ProtocolError>,
}

pub struct LoopbackClient {
    config: LoopbackConfig,
    state: Arc<Mutex<LoopbackState>>,
    events: EventBroadcaster,
}

impl LoopbackClient {
    /// Open the client, loading the device record if one exists
    pub fn open(config: LoopbackConfig) -> ProtocolResult<Self> {
        let device = match &config.device_store {
            Some(path) if path.exists() => {
                let raw = std::fs::read(path).map_err(|e| ProtocolError::Store(e.to_string()))?;
                let record: DeviceRecord =
                    serde_json::from_slice(&raw).map_err(|e| ProtocolError::Store(e.to_string()))?;
                info!(jid = %record.jid, "Loaded stored device identity");
                Some(record)
            }
            _ => None,
        };

        let events = EventBroadcaster::new(config.event_buffer);
        let state = LoopbackState { device, ..Default::default() };
        Ok(Self { config, state: Arc::new(Mutex::new(state)), events })
    }

    /// In-memory client with no stored identity
    pub fn unpaired() -> Self {
        Self::in_memory(LoopbackConfig::default(), None)
    }

    /// In-memory client that already holds a device identity
    pub fn paired() -> Self {
        Self::in_memory(LoopbackConfig::default(), Some(new_device_record()))
    }

    pub fn with_config(config: LoopbackConfig) -> Self {
        Self::in_memory(config, None)
    }

    fn in_memory(config: LoopbackConfig, device: Option<DeviceRecord>) -> Self {
        let events = EventBroadcaster::new(config.event_buffer);
        let state = LoopbackState { device, ..Default::default() };
        Self { config, state: Arc::new(Mutex::new(state)), events }
    }

    /// Make every send to `user` fail
    pub fn reject_recipient(&self, user: impl Into<String>) {
        self.state.lock().rejected.insert(user.into());
    }

    /// Make the next `connect` call fail with `err`
    pub fn fail_next_connect(&self, err: ProtocolError) {
        self.state.lock().fail_next_connect = Some(err);
    }

    /// Every address a send was attempted to, in order
    pub fn attempts(&self) -> Vec<Jid> {
        self.state.lock().attempts.clone()
    }

    pub fn outbox(&self) -> Vec<SentMessage> {
        self.state.lock().outbox.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Deliver an inbound message as if it came from the network
    pub fn receive(&self, sender: impl Into<String>, text: Option<&str>) {
        self.events.emit(ProtocolEvent::InboundMessage {
            sender: sender.into(),
            text: text.map(String::from),
        });
    }

    /// Emit an arbitrary event without touching connection state
    pub fn emit(&self, event: ProtocolEvent) -> usize {
        self.events.emit(event)
    }

    /// Simulate the network dropping the connection
    pub fn drop_connection(&self) {
        let was_connected = std::mem::replace(&mut self.state.lock().connected, false);
        if was_connected {
            warn!("Loopback connection dropped");
            self.events.emit(ProtocolEvent::Disconnected);
        }
    }

    /// Close any open pairing stream and stop issuing codes
    fn abandon_pairing(state: &mut LoopbackState) {
        let stream = state.pairing_tx.take();
        if let Some(task) = state.pairing_task.take() {
            if !task.is_finished() {
                task.abort();
                debug!("Pairing attempt abandoned");
            }
        } else if stream.is_some() {
            debug!("Unused pairing stream closed");
        }
    }

    fn codes(&self) -> Vec<String> {
        if self.config.pairing_codes.is_empty() {
            vec![format!("2@{}", uuid::Uuid::new_v4().simple())]
        } else {
            self.config.pairing_codes.clone()
        }
    }

    async fn run_pairing(
        state: Arc<Mutex<LoopbackState>>,
        events: EventBroadcaster,
        tx: mpsc::Sender<PairingEvent>,
        codes: Vec<String>,
        config: LoopbackConfig,
    ) {
        for code in codes {
            tokio::time::sleep(config.code_interval).await;
            if tx.send(PairingEvent::Code(code)).await.is_err() {
                debug!("Pairing stream receiver dropped");
                return;
            }
        }

        tokio::time::sleep(config.code_interval).await;
        if !config.confirm_pairing {
            let _ = tx.send(PairingEvent::Timeout).await;
            return;
        }

        let record = new_device_record();
        if let Some(path) = &config.device_store {
            if let Err(e) = persist(path, &record) {
                let _ = tx.send(PairingEvent::Error(e.to_string())).await;
                return;
            }
        }

        info!(jid = %record.jid, "Pairing confirmed");
        {
            let mut state = state.lock();
            state.device = Some(record);
            state.connected = true;
        }
        events.emit(ProtocolEvent::Connected);
        let _ = tx.send(PairingEvent::Success).await;
    }
}

fn new_device_record() -> DeviceRecord {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    DeviceRecord { jid: format!("{}:1@s.whatsapp.net", &simple[..12]), paired_at: Utc::now() }
}

fn persist(path: &Path, record: &DeviceRecord) -> ProtocolResult<()> {
    let raw = serde_json::to_vec_pretty(record).map_err(|e| ProtocolError::Store(e.to_string()))?;
    std::fs::write(path, raw).map_err(|e| ProtocolError::Store(e.to_string()))
}

fn new_delivery_id() -> DeliveryId {
    let simple = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    DeliveryId(format!("3EB0{}", &simple[..16]))
}

#[async_trait]
impl ProtocolClient for LoopbackClient {
    fn has_stored_identity(&self) -> bool {
        self.state.lock().device.is_some()
    }

    async fn pairing_events(&self) -> ProtocolResult<mpsc::Receiver<PairingEvent>> {
        let mut state = self.state.lock();
        if state.device.is_some() {
            return Err(ProtocolError::AlreadyPaired);
        }
        let stream_open = state.pairing_tx.as_ref().is_some_and(|tx| !tx.is_closed());
        let issuing = state.pairing_task.as_ref().is_some_and(|task| !task.is_finished());
        if stream_open || issuing {
            return Err(ProtocolError::PairingInProgress);
        }

        let (tx, rx) = mpsc::channel(self.config.pairing_buffer);
        state.pairing_tx = Some(tx);
        Ok(rx)
    }

    async fn connect(&self) -> ProtocolResult<()> {
        let pairing_tx = {
            let mut state = self.state.lock();
            if let Some(err) = state.fail_next_connect.take() {
                return Err(err);
            }

            if state.device.is_some() {
                if state.connected {
                    return Ok(());
                }
                state.connected = true;
                None
            } else {
                Some(state.pairing_tx.take().ok_or(ProtocolError::NotPaired)?)
            }
        };

        match pairing_tx {
            None => {
                self.events.emit(ProtocolEvent::Connected);
            }
            Some(tx) => {
                let codes = self.codes();
                let mut state = self.state.lock();
                state.pairing_task = Some(tokio::spawn(Self::run_pairing(
                    self.state.clone(),
                    self.events.clone(),
                    tx,
                    codes,
                    self.config.clone(),
                )));
            }
        }
        Ok(())
    }

    async fn disconnect(&self) {
        let was_connected = {
            let mut state = self.state.lock();
            Self::abandon_pairing(&mut state);
            std::mem::replace(&mut state.connected, false)
        };
        if was_connected {
            self.events.emit(ProtocolEvent::Disconnected);
        }
    }

    async fn logout(&self) -> ProtocolResult<()> {
        let was_connected = {
            let mut state = self.state.lock();
            Self::abandon_pairing(&mut state);
            if state.device.take().is_none() {
                return Err(ProtocolError::NotLoggedIn);
            }
            std::mem::replace(&mut state.connected, false)
        };

        if let Some(path) = &self.config.device_store {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ProtocolError::Store(e.to_string())),
            }
        }

        self.events.emit(ProtocolEvent::LoggedOut { reason: "logout requested".to_string() });
        if was_connected {
            self.events.emit(ProtocolEvent::Disconnected);
        }
        Ok(())
    }

    async fn send_text(&self, to: &Jid, body: &str) -> ProtocolResult<DeliveryId> {
        let mut state = self.state.lock();
        state.attempts.push(to.clone());

        if !state.connected {
            return Err(ProtocolError::NotConnected);
        }
        if state.rejected.contains(&to.user) {
            return Err(ProtocolError::Rejected {
                recipient: to.to_string(),
                reason: "recipient is not on the network".to_string(),
            });
        }

        let id = new_delivery_id();
        state.outbox.push(SentMessage { to: to.clone(), body: body.to_string(), id: id.clone() });
        Ok(id)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paired_connect_emits_connected() {
        let client = LoopbackClient::paired();
        let mut events = client.subscribe();

        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(events.recv().await.unwrap(), ProtocolEvent::Connected);

        // Reconnecting while connected emits nothing new
        client.connect().await.unwrap();
        client.disconnect().await;
        assert_eq!(events.recv().await.unwrap(), ProtocolEvent::Disconnected);
    }

    #[tokio::test]
    async fn test_unpaired_connect_without_stream_fails() {
        let client = LoopbackClient::unpaired();
        assert_eq!(client.connect().await, Err(ProtocolError::NotPaired));
    }

    #[tokio::test]
    async fn test_pairing_issues_codes_then_success() {
        let client = LoopbackClient::with_config(LoopbackConfig {
            pairing_codes: vec!["code-1".into(), "code-2".into()],
            ..Default::default()
        });

        let mut rx = client.pairing_events().await.unwrap();
        client.connect().await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }

        assert_eq!(
            seen,
            vec![
                PairingEvent::Code("code-1".into()),
                PairingEvent::Code("code-2".into()),
                PairingEvent::Success,
            ]
        );
        assert!(client.has_stored_identity());
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_pairing_timeout_leaves_device_unpaired() {
        let client = LoopbackClient::with_config(LoopbackConfig {
            pairing_codes: vec!["only".into()],
            confirm_pairing: false,
            ..Default::default()
        });

        let mut rx = client.pairing_events().await.unwrap();
        client.connect().await.unwrap();

        assert_eq!(rx.recv().await, Some(PairingEvent::Code("only".into())));
        assert_eq!(rx.recv().await, Some(PairingEvent::Timeout));
        assert_eq!(rx.recv().await, None);
        assert!(!client.has_stored_identity());
    }

    #[tokio::test]
    async fn test_pairing_stream_refused_when_paired() {
        let client = LoopbackClient::paired();
        assert_eq!(client.pairing_events().await.unwrap_err(), ProtocolError::AlreadyPaired);
    }

    #[tokio::test]
    async fn test_send_requires_connection_and_honours_rejections() {
        let client = LoopbackClient::paired();
        let to = Jid::for_recipient("100", "s.whatsapp.net");

        assert_eq!(client.send_text(&to, "hi").await, Err(ProtocolError::NotConnected));

        client.connect().await.unwrap();
        client.reject_recipient("200");

        let id = client.send_text(&to, "hi").await.unwrap();
        assert!(id.0.starts_with("3EB0"));

        let bad = Jid::for_recipient("200", "s.whatsapp.net");
        assert!(matches!(client.send_text(&bad, "hi").await, Err(ProtocolError::Rejected { .. })));

        assert_eq!(client.attempts().len(), 3);
        assert_eq!(client.outbox().len(), 1);
        assert_eq!(client.outbox()[0].body, "hi");
    }

    #[tokio::test]
    async fn test_device_record_persists_and_logout_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        let config = LoopbackConfig { device_store: Some(path.clone()), ..Default::default() };

        let client = LoopbackClient::open(config.clone()).unwrap();
        assert!(!client.has_stored_identity());

        let mut rx = client.pairing_events().await.unwrap();
        client.connect().await.unwrap();
        while rx.recv().await.is_some() {}
        assert!(path.exists());

        let reopened = LoopbackClient::open(config).unwrap();
        assert!(reopened.has_stored_identity());

        reopened.logout().await.unwrap();
        assert!(!path.exists());
        assert_eq!(reopened.logout().await, Err(ProtocolError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pairing() {
        let client = LoopbackClient::with_config(LoopbackConfig {
            pairing_codes: vec!["code-1".into(), "code-2".into()],
            code_interval: Duration::from_millis(50),
            ..Default::default()
        });
        let mut events = client.subscribe();

        let mut rx = client.pairing_events().await.unwrap();
        client.connect().await.unwrap();
        client.disconnect().await;

        assert_eq!(rx.recv().await, None);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!client.has_stored_identity());
        assert!(!client.is_connected());
        assert!(matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty)));

        // A fresh attempt can start afterwards
        let _rx = client.pairing_events().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_closes_unused_pairing_stream() {
        let client = LoopbackClient::unpaired();
        let mut rx = client.pairing_events().await.unwrap();

        client.disconnect().await;
        assert_eq!(rx.recv().await, None);
        assert_eq!(client.connect().await, Err(ProtocolError::NotPaired));
    }

    #[tokio::test]
    async fn test_fail_next_connect_is_one_shot() {
        let client = LoopbackClient::paired();
        client.fail_next_connect(ProtocolError::Transport("refused".into()));

        assert!(client.connect().await.is_err());
        assert!(client.connect().await.is_ok());
    }
}
