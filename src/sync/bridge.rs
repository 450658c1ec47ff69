//! Transport bridge to the relay.
//!
//! The engine only sees [`RelayBridge`]: a fire-and-forget request sink plus
//! a stream of typed [`RelayEvent`]s delivered to the engine's dispatcher.
//! [`WsRelayBridge`] is the WebSocket backend.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::error::BridgeError;
use super::protocol::{ClientConfig, RecordPair, RelayEvent, RelayRequest};
use super::record::{SyncCategory, SyncRecord};
use super::seed::SyncSeed;
use crate::models::DeviceId;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Parameters for opening the relay connection.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeLaunch {
    /// Group fingerprint; `None` while a new group is being created.
    pub fingerprint: Option<String>,
    pub device_name: String,
}

/// Request/response channel to the relay.
///
/// Outbound calls do not wait for a reply; results arrive later as inbound
/// events. Callers are responsible for waiting on readiness first.
#[async_trait]
pub trait RelayBridge: Send + Sync {
    async fn start(&self, launch: &BridgeLaunch) -> Result<(), BridgeError>;

    async fn stop(&self) -> Result<(), BridgeError>;

    /// Whether a connection is open and its tasks are still running.
    async fn is_connected(&self) -> bool;

    async fn send(&self, request: RelayRequest) -> Result<(), BridgeError>;

    async fn got_init_data(
        &self,
        seed: Option<SyncSeed>,
        device_id: Option<DeviceId>,
        device_name: Option<String>,
        config: ClientConfig,
    ) -> Result<(), BridgeError> {
        self.send(RelayRequest::GotInitData {
            seed,
            device_id,
            device_name,
            config,
        })
        .await
    }

    async fn fetch_sync_records(
        &self,
        categories: &[SyncCategory],
        start_at: i64,
        max_records: u32,
    ) -> Result<(), BridgeError> {
        self.send(RelayRequest::FetchSyncRecords {
            categories: categories.to_vec(),
            start_at,
            max_records,
        })
        .await
    }

    async fn fetch_sync_devices(&self) -> Result<(), BridgeError> {
        self.send(RelayRequest::FetchSyncDevices).await
    }

    async fn send_sync_records(
        &self,
        category: SyncCategory,
        records: Vec<SyncRecord>,
    ) -> Result<(), BridgeError> {
        self.send(RelayRequest::SendSyncRecords { category, records })
            .await
    }

    async fn resolve_sync_records(
        &self,
        category: SyncCategory,
        pairs: Vec<RecordPair>,
    ) -> Result<(), BridgeError> {
        self.send(RelayRequest::ResolveSyncRecords {
            category,
            records_and_existing_objects: pairs,
        })
        .await
    }

    async fn delete_sync_user(&self) -> Result<(), BridgeError> {
        self.send(RelayRequest::DeleteSyncUser).await
    }

    async fn delete_sync_category(&self, category: SyncCategory) -> Result<(), BridgeError> {
        self.send(RelayRequest::DeleteSyncCategory { category })
            .await
    }

    async fn delete_sync_site_settings(&self) -> Result<(), BridgeError> {
        self.send(RelayRequest::DeleteSyncSiteSettings).await
    }
}

struct Connection {
    outgoing: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        !self.writer.is_finished() && !self.reader.is_finished()
    }
}

/// WebSocket relay backend.
///
/// A writer task drains an outgoing channel into the socket; a reader task
/// decodes text frames and forwards them to the engine.
pub struct WsRelayBridge {
    relay_url: String,
    events: mpsc::UnboundedSender<RelayEvent>,
    connection: Mutex<Option<Connection>>,
}

impl WsRelayBridge {
    pub fn new(relay_url: impl Into<String>, events: mpsc::UnboundedSender<RelayEvent>) -> Self {
        Self {
            relay_url: relay_url.into(),
            events,
            connection: Mutex::new(None),
        }
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }
}

#[async_trait]
impl RelayBridge for WsRelayBridge {
    async fn start(&self, launch: &BridgeLaunch) -> Result<(), BridgeError> {
        let mut connection = self.connection.lock().await;
        if let Some(existing) = connection.as_ref() {
            if existing.is_alive() {
                return Ok(());
            }
            debug!("Relay connection went away, reconnecting");
        }

        let ws_url = build_ws_url(&self.relay_url, launch);
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| BridgeError::Connection(e.to_string()))?;
        info!(relay = %self.relay_url, "Connected to relay");

        let (sink, stream) = ws_stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(sink, outgoing_rx));
        let reader = tokio::spawn(read_loop(stream, self.events.clone(), outgoing.clone()));

        if let Some(old) = connection.replace(Connection {
            outgoing,
            writer,
            reader,
        }) {
            old.reader.abort();
            old.writer.abort();
        }

        Ok(())
    }

    async fn stop(&self) -> Result<(), BridgeError> {
        let Some(connection) = self.connection.lock().await.take() else {
            return Ok(());
        };

        // The writer exits once the close frame is flushed and the sender drops.
        let _ = connection.outgoing.send(Message::Close(None));
        connection.reader.abort();
        drop(connection.outgoing);
        debug!("Relay connection stopped");

        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(Connection::is_alive)
    }

    async fn send(&self, request: RelayRequest) -> Result<(), BridgeError> {
        let text = request.encode()?;

        let connection = self.connection.lock().await;
        let connection = connection.as_ref().ok_or(BridgeError::NotConnected)?;
        connection
            .outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| BridgeError::Closed)?;

        debug!(message = request.name(), "Sent relay request");
        Ok(())
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outgoing.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            warn!(error = %e, "Failed to write to relay");
            break;
        }
        if closing {
            break;
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<RelayEvent>,
    outgoing: mpsc::UnboundedSender<Message>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match RelayEvent::decode(text.as_str()) {
                Ok(event) => {
                    if events.send(event).is_err() {
                        // Engine dispatcher is gone
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring undecodable relay frame"),
            },
            Ok(Message::Ping(data)) => {
                let _ = outgoing.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                // Binary and pong frames are not part of the protocol
            }
            Err(e) => {
                warn!(error = %e, "Relay connection error");
                break;
            }
        }
    }

    debug!("Relay connection closed");
}

/// Builds the WebSocket URL for the relay.
pub fn build_ws_url(relay_url: &str, launch: &BridgeLaunch) -> String {
    // Convert http(s) to ws(s) if needed
    let base_url = if relay_url.starts_with("http://") {
        relay_url.replacen("http://", "ws://", 1)
    } else if relay_url.starts_with("https://") {
        relay_url.replacen("https://", "wss://", 1)
    } else if !relay_url.starts_with("ws://") && !relay_url.starts_with("wss://") {
        format!("ws://{}", relay_url)
    } else {
        relay_url.to_string()
    };
    let base_url = base_url.trim_end_matches('/');

    let device = urlencoding::encode(&launch.device_name);
    match &launch.fingerprint {
        Some(group) => format!("{}/sync?group={}&device={}", base_url, group, device),
        None => format!("{}/sync?device={}", base_url, device),
    }
}
