//! Device registry: the paired devices of the current group.

use tracing::debug;

use super::error::SyncError;
use crate::db::{device_repo, Store};
use crate::models::{Device, DeviceId, NewDevice, ObjectId};

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    store: Store,
}

impl DeviceRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// This installation's own row, created on first use.
    ///
    /// A relay-assigned id is filled in if the row does not have one yet.
    pub async fn current_device(
        &self,
        name: &str,
        device_id: Option<&DeviceId>,
    ) -> Result<Device, SyncError> {
        let mut conn = self.store.pool().acquire().await?;

        let device = match device_repo::find_current(&mut conn).await? {
            Some(device) => device,
            None => {
                debug!(name, "Creating local device row");
                device_repo::insert(&mut conn, &NewDevice::current(name, device_id.cloned()))
                    .await?
            }
        };

        if let (None, Some(assigned)) = (&device.device_id, device_id) {
            self.store
                .devices()
                .assign_device_id(&device.object_id, assigned)
                .await?;
            return Ok(Device {
                device_id: Some(assigned.clone()),
                ..device
            });
        }

        Ok(device)
    }

    pub async fn current(&self) -> Result<Option<Device>, SyncError> {
        Ok(self.store.devices().current().await?)
    }

    /// Devices shown to the user; removed ones are hidden.
    pub async fn list(&self) -> Result<Vec<Device>, SyncError> {
        Ok(self.store.devices().list().await?)
    }

    /// Soft-deletes a device and returns it, or `None` if it was not listed.
    pub async fn remove(&self, object_id: &ObjectId) -> Result<Option<Device>, SyncError> {
        let devices = self.store.devices();
        if !devices.soft_remove(object_id).await? {
            return Ok(None);
        }
        Ok(devices.get_by_object_id(object_id).await?)
    }

    pub async fn mark_synced(&self, object_id: &ObjectId) -> Result<(), SyncError> {
        Ok(self.store.devices().mark_synced(object_id).await?)
    }

    pub async fn purge(&self) -> Result<u64, SyncError> {
        Ok(self.store.devices().purge_all().await?)
    }
}
