mod bookmark;
mod config_cmd;
mod device;
mod group;
mod run_cmd;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use seedsync::config::Config;
use seedsync::db::Store;
use seedsync::sync::{Identity, SeedStorage, SyncEngine, SyncError, WsRelayBridge};

pub use bookmark::BookmarkCommand;
pub use config_cmd::ConfigCommand;
pub use device::DeviceCommand;
pub use group::GroupCommand;
pub use run_cmd::RunCommand;

/// The store plus an engine wired to the WebSocket relay.
///
/// Inbound relay events are dispatched on a background task for as long as
/// the session is open.
pub struct Session {
    pub store: Store,
    pub engine: Arc<SyncEngine<WsRelayBridge>>,
    device_name: String,
    dispatcher: JoinHandle<()>,
}

impl Session {
    pub async fn open(config: &Config) -> Result<Self, SyncError> {
        let store = Store::open(&config.database_path.value).await?;
        let identity = Identity::new(
            SeedStorage::new(config.data_dir.value.clone()),
            store.clone(),
        );

        let (events, inbound) = tokio::sync::mpsc::unbounded_channel();
        let bridge = Arc::new(WsRelayBridge::new(config.sync.relay_url.clone(), events));
        let engine = SyncEngine::new(bridge, store.clone(), identity, config.sync.engine_config());

        let dispatcher = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run(inbound).await }
        });

        Ok(Self {
            store,
            engine,
            device_name: config.device_name.value.clone(),
            dispatcher,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Connects to the relay and waits for the handshake.
    ///
    /// Returns false, without connecting, when this device is not in a group.
    pub async fn go_online(&self) -> Result<bool, SyncError> {
        if !self.engine.is_in_group() {
            return Ok(false);
        }

        self.engine
            .initialize_sync(None, Some(&self.device_name))
            .await?;
        self.engine.wait_until_ready().await?;
        Ok(true)
    }

    pub async fn close(self) {
        self.engine.shutdown().await;
        self.dispatcher.abort();
        debug!("Session closed");
    }
}
