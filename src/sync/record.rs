//! The sync record envelope exchanged with the relay.
//!
//! Records are immutable projections of local entities. Inbound records are
//! decoded through an all-optional intermediate shape so one malformed
//! field fails only its own record.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::error::ProtocolError;
use crate::models::{DeviceId, ObjectId};

/// Independently synchronized data domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncCategory {
    #[serde(rename = "BOOKMARKS")]
    Bookmarks,
    /// Device records travel in the preferences category.
    #[serde(rename = "PREFERENCES")]
    Devices,
    /// Declared by the relay, never fetched.
    #[serde(rename = "HISTORY_SITES")]
    History,
}

impl SyncCategory {
    pub fn as_wire(&self) -> &'static str {
        match self {
            SyncCategory::Bookmarks => "BOOKMARKS",
            SyncCategory::Devices => "PREFERENCES",
            SyncCategory::History => "HISTORY_SITES",
        }
    }

    /// The `objectData` tag carried by records of this category.
    pub fn object_data(&self) -> Option<&'static str> {
        match self {
            SyncCategory::Bookmarks => Some("bookmark"),
            SyncCategory::Devices => Some("device"),
            SyncCategory::History => None,
        }
    }
}

impl std::fmt::Display for SyncCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub fn code(&self) -> u8 {
        match self {
            SyncAction::Create => 0,
            SyncAction::Update => 1,
            SyncAction::Delete => 2,
        }
    }
}

impl TryFrom<u8> for SyncAction {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(SyncAction::Create),
            1 => Ok(SyncAction::Update),
            2 => Ok(SyncAction::Delete),
            other => Err(ProtocolError::UnknownAction(other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SitePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_title: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkPayload {
    pub site: SitePayload,
    pub is_folder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_folder_object_id: Option<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    Bookmark(BookmarkPayload),
    Device(DevicePayload),
}

impl RecordPayload {
    pub fn category(&self) -> SyncCategory {
        match self {
            RecordPayload::Bookmark(_) => SyncCategory::Bookmarks,
            RecordPayload::Device(_) => SyncCategory::Devices,
        }
    }
}

/// A typed sync record.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub object_id: ObjectId,
    pub device_id: Option<DeviceId>,
    pub action: SyncAction,
    pub payload: RecordPayload,
    /// Relay timestamp in milliseconds.
    pub timestamp: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord<'a> {
    object_id: &'a ObjectId,
    device_id: Option<&'a DeviceId>,
    action: u8,
    object_data: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bookmark: Option<&'a BookmarkPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<&'a DevicePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_timestamp: Option<i64>,
}

impl Serialize for SyncRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (object_data, bookmark, device) = match &self.payload {
            RecordPayload::Bookmark(b) => ("bookmark", Some(b), None),
            RecordPayload::Device(d) => ("device", None, Some(d)),
        };

        WireRecord {
            object_id: &self.object_id,
            device_id: self.device_id.as_ref(),
            action: self.action.code(),
            object_data,
            bookmark,
            device,
            sync_timestamp: self.timestamp,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawRecord {
    object_id: Option<Vec<u8>>,
    device_id: Option<Vec<u8>>,
    action: Option<u8>,
    object_data: Option<String>,
    bookmark: Option<RawBookmark>,
    device: Option<DevicePayload>,
    sync_timestamp: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawBookmark {
    site: Option<SitePayload>,
    is_folder: Option<bool>,
    parent_folder_object_id: Option<Vec<u8>>,
}

impl SyncRecord {
    /// Decodes one relay record of the given category.
    pub fn parse(value: &Value, category: SyncCategory) -> Result<Self, ProtocolError> {
        let raw = RawRecord::deserialize(value)?;

        let object_id = ObjectId::from_bytes(raw.object_id.ok_or(ProtocolError::MissingField("objectId"))?)?;
        let device_id = raw
            .device_id
            .and_then(|bytes| DeviceId::from_bytes(bytes).ok());
        let action = SyncAction::try_from(raw.action.ok_or(ProtocolError::MissingField("action"))?)?;

        let expected = category
            .object_data()
            .ok_or(ProtocolError::UnsupportedCategory(category))?;
        if let Some(found) = raw.object_data {
            if found != expected {
                return Err(ProtocolError::UnexpectedObjectData { expected, found });
            }
        }

        let payload = match category {
            SyncCategory::Bookmarks => {
                let raw = raw.bookmark.unwrap_or_default();
                RecordPayload::Bookmark(BookmarkPayload {
                    site: raw.site.unwrap_or_default(),
                    is_folder: raw.is_folder.unwrap_or(false),
                    // An unreadable parent reference leaves the bookmark at the root.
                    parent_folder_object_id: raw
                        .parent_folder_object_id
                        .and_then(|bytes| ObjectId::from_bytes(bytes).ok()),
                })
            }
            SyncCategory::Devices => RecordPayload::Device(raw.device.unwrap_or_default()),
            SyncCategory::History => return Err(ProtocolError::UnsupportedCategory(category)),
        };

        Ok(Self {
            object_id,
            device_id,
            action,
            payload,
            timestamp: raw.sync_timestamp.map(|ts| ts as i64),
        })
    }

    pub fn category(&self) -> SyncCategory {
        self.payload.category()
    }
}
