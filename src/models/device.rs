use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::object_id::{DeviceId, ObjectId};

/// A paired device in the sync group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub object_id: ObjectId,
    /// Relay-assigned id; `None` until the handshake delivers it.
    pub device_id: Option<DeviceId>,
    pub name: String,
    /// This installation's own row.
    pub is_current: bool,
    /// Whether the row has been pushed to the relay at least once.
    pub synced: bool,
    /// Soft-deleted rows are kept until the next resync.
    pub removed: bool,
    pub last_modified: DateTime<Utc>,
}

/// A device row that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub object_id: ObjectId,
    pub device_id: Option<DeviceId>,
    pub name: String,
    pub is_current: bool,
    pub synced: bool,
}

impl NewDevice {
    /// This installation's own row, not yet pushed to the relay.
    pub fn current(name: impl Into<String>, device_id: Option<DeviceId>) -> Self {
        Self {
            object_id: ObjectId::mint(),
            device_id,
            name: name.into(),
            is_current: true,
            synced: false,
        }
    }

    /// A row learned from the relay.
    pub fn remote(object_id: ObjectId, device_id: Option<DeviceId>, name: impl Into<String>) -> Self {
        Self {
            object_id,
            device_id,
            name: name.into(),
            is_current: false,
            synced: true,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.is_current {
            write!(f, " (this device)")?;
        }
        Ok(())
    }
}
