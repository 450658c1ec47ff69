//! Group membership.
//!
//! Membership is derived from the seed file: a device is in a group if and
//! only if a valid seed is stored. The relay-assigned device id and the
//! device name live in plain preferences.

use tracing::{info, warn};

use super::error::SyncError;
use super::seed::{SeedStorage, SyncSeed};
use crate::db::Store;
use crate::models::DeviceId;

pub const HAS_EVER_JOINED_KEY: &str = "sync.has_ever_joined";
pub const DEVICE_ID_KEY: &str = "sync.device_id";
pub const DEVICE_NAME_KEY: &str = "sync.device_name";

/// What `save-init-data` changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitDataOutcome {
    pub seed_saved: bool,
    pub device_id_saved: bool,
}

#[derive(Debug, Clone)]
pub struct Identity {
    seeds: SeedStorage,
    store: Store,
}

impl Identity {
    pub fn new(seeds: SeedStorage, store: Store) -> Self {
        Self { seeds, store }
    }

    pub fn is_in_group(&self) -> bool {
        matches!(self.seeds.load(), Ok(Some(_)))
    }

    pub fn seed(&self) -> Result<Option<SyncSeed>, SyncError> {
        Ok(self.seeds.load()?)
    }

    /// Stores the seed unless already in a group.
    ///
    /// Returns false, leaving the existing seed untouched, if a seed is
    /// already present.
    pub async fn join(&self, seed: SyncSeed) -> Result<bool, SyncError> {
        if self.is_in_group() {
            warn!("Already in a sync group, ignoring join");
            return Ok(false);
        }

        self.seeds.save(&seed)?;
        self.store
            .preferences()
            .set_bool(HAS_EVER_JOINED_KEY, true)
            .await?;
        info!(group = %seed.fingerprint(), "Joined sync group");
        Ok(true)
    }

    /// Accepts the seed and device id delivered by the relay.
    ///
    /// Each value is taken at most once: the seed only while not in a group,
    /// the device id only while none is stored.
    pub async fn accept_init_data(
        &self,
        seed: Option<&[u8]>,
        device_id: Option<&[u8]>,
    ) -> Result<InitDataOutcome, SyncError> {
        let mut outcome = InitDataOutcome::default();

        if let Some(bytes) = seed {
            let seed = SyncSeed::try_from(bytes)?;
            match self.seeds.load()? {
                Some(existing) if existing != seed => {
                    warn!("Relay sent a different seed while in a group, ignoring it");
                }
                Some(_) => {}
                None => outcome.seed_saved = self.join(seed).await?,
            }
        }

        if let Some(bytes) = device_id {
            if self.device_id().await?.is_none() {
                let device_id = DeviceId::from_bytes(bytes.to_vec())
                    .map_err(|e| SyncError::Protocol(e.into()))?;
                self.store
                    .preferences()
                    .set(DEVICE_ID_KEY, &device_id.to_bs58check())
                    .await?;
                outcome.device_id_saved = true;
            }
        }

        Ok(outcome)
    }

    pub async fn device_id(&self) -> Result<Option<DeviceId>, SyncError> {
        let stored = self.store.preferences().get(DEVICE_ID_KEY).await?;
        // An unreadable id is treated as missing so the relay can assign a new one.
        Ok(stored.and_then(|s| DeviceId::from_bs58check(&s).ok()))
    }

    pub async fn device_name(&self) -> Result<Option<String>, SyncError> {
        Ok(self.store.preferences().get(DEVICE_NAME_KEY).await?)
    }

    pub async fn set_device_name(&self, name: &str) -> Result<(), SyncError> {
        Ok(self.store.preferences().set(DEVICE_NAME_KEY, name).await?)
    }

    pub async fn has_ever_joined(&self) -> Result<bool, SyncError> {
        Ok(self
            .store
            .preferences()
            .get_bool(HAS_EVER_JOINED_KEY)
            .await?)
    }

    /// Forgets the seed and the relay-assigned device id.
    ///
    /// The has-ever-joined flag survives so a later join can tell a
    /// returning device from a fresh install.
    pub async fn clear(&self) -> Result<(), SyncError> {
        self.seeds.clear()?;
        self.store.preferences().remove(DEVICE_ID_KEY).await?;
        Ok(())
    }
}
