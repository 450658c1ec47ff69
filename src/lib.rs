//! Seedsync Library
//!
//! Seed-keyed synchronization of bookmarks and device records across the
//! devices of a sync group.

pub mod config;
pub mod db;
pub mod models;
pub mod sync;

pub use db::Store;
pub use models::{Bookmark, Device, DeviceId, IdError, NewBookmark, NewDevice, ObjectId};
pub use sync::{
    EngineConfig, Identity, RelayBridge, SeedStorage, SyncAction, SyncCategory, SyncEngine,
    SyncError, SyncEvent, SyncSeed, WsRelayBridge,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
