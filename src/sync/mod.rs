//! Seed-keyed synchronization of bookmarks and devices through a relay.
//!
//! Devices that hold the same 32-byte seed form a sync group. All traffic
//! goes through a [`RelayBridge`]; nothing flows until the relay has
//! acknowledged each of its channels, after which the [`SyncEngine`] pushes
//! local changes, pulls remote ones page by page and reconciles them against
//! the local store.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use seedsync::db::Store;
//! use seedsync::sync::{EngineConfig, Identity, SeedStorage, SyncEngine, WsRelayBridge};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(Path::new("seedsync.db")).await?;
//! let identity = Identity::new(SeedStorage::new("data".into()), store.clone());
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let bridge = Arc::new(WsRelayBridge::new("ws://localhost:8080", tx));
//!
//! let engine = SyncEngine::new(bridge, store, identity, EngineConfig::default());
//! engine.initialize_sync(None, Some("laptop")).await?;
//! engine.run(rx).await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod codec;
pub mod cursor;
pub mod devices;
pub mod engine;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod readiness;
pub mod reconcile;
pub mod record;
pub mod seed;

#[cfg(test)]
mod scenario_tests;
#[cfg(test)]
mod testing;

pub use bridge::{build_ws_url, BridgeLaunch, RelayBridge, WsRelayBridge};
pub use codec::{from_wire_records, to_wire_record, Syncable};
pub use devices::DeviceRegistry;
pub use engine::{EngineConfig, SyncEngine, SyncEvent};
pub use error::{BridgeError, ProtocolError, SyncError};
pub use identity::Identity;
pub use protocol::{RelayEvent, RelayRequest};
pub use readiness::{Channel, Readiness};
pub use record::{SyncAction, SyncCategory, SyncRecord};
pub use seed::{SeedError, SeedStorage, SyncSeed, SEED_LEN};
