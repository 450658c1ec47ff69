//! Mapping between local entities and sync records.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use super::record::{
    BookmarkPayload, DevicePayload, RecordPayload, SitePayload, SyncAction, SyncCategory,
    SyncRecord,
};
use crate::models::{Bookmark, Device, DeviceId, NewBookmark, ObjectId};

/// A local entity that can be projected onto a sync record.
pub trait Syncable {
    const CATEGORY: SyncCategory;

    fn object_id(&self) -> &ObjectId;

    fn payload(&self) -> RecordPayload;

    fn last_modified(&self) -> DateTime<Utc>;

    /// Device id the entity itself carries, overriding the sender's.
    fn own_device_id(&self) -> Option<&DeviceId> {
        None
    }
}

impl Syncable for Bookmark {
    const CATEGORY: SyncCategory = SyncCategory::Bookmarks;

    fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    fn payload(&self) -> RecordPayload {
        RecordPayload::Bookmark(BookmarkPayload {
            site: SitePayload {
                location: self.url.clone(),
                title: Some(self.title.clone()),
                custom_title: self.custom_title.clone(),
                creation_time: Some(self.created_at.timestamp_millis()),
            },
            is_folder: self.is_folder,
            parent_folder_object_id: self.parent_object_id.clone(),
        })
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

impl Syncable for Device {
    const CATEGORY: SyncCategory = SyncCategory::Devices;

    fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    fn payload(&self) -> RecordPayload {
        RecordPayload::Device(DevicePayload {
            name: Some(self.name.clone()),
        })
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn own_device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }
}

/// Projects an entity onto a sync record. Pure.
pub fn to_wire_record<T: Syncable>(
    entity: &T,
    device_id: Option<&DeviceId>,
    action: SyncAction,
) -> SyncRecord {
    SyncRecord {
        object_id: entity.object_id().clone(),
        device_id: entity.own_device_id().or(device_id).cloned(),
        action,
        payload: entity.payload(),
        timestamp: Some(entity.last_modified().timestamp_millis()),
    }
}

/// Decodes a page of relay records, dropping the ones that do not parse.
///
/// Device pages are de-duplicated by object id, keeping the newest record.
pub fn from_wire_records(category: SyncCategory, records: &[Value]) -> Vec<SyncRecord> {
    let parsed: Vec<SyncRecord> = records
        .iter()
        .filter_map(|value| match SyncRecord::parse(value, category) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%category, error = %e, "Dropping malformed sync record");
                None
            }
        })
        .collect();

    match category {
        SyncCategory::Devices => dedup_newest(parsed),
        _ => parsed,
    }
}

/// Sorts newest first, then keeps the first record seen per object id.
pub fn dedup_newest(mut records: Vec<SyncRecord>) -> Vec<SyncRecord> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.object_id.clone()));
    records
}

pub(crate) fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Builds a local bookmark from a remote record.
pub(crate) fn new_bookmark_from(record: &SyncRecord, payload: &BookmarkPayload) -> NewBookmark {
    let now = Utc::now();
    NewBookmark {
        object_id: record.object_id.clone(),
        title: payload.site.title.clone().unwrap_or_default(),
        url: payload.site.location.clone(),
        custom_title: payload.site.custom_title.clone(),
        is_folder: payload.is_folder,
        parent_object_id: payload.parent_folder_object_id.clone(),
        created_at: payload
            .site
            .creation_time
            .and_then(millis_to_datetime)
            .unwrap_or(now),
        last_modified: record.timestamp.and_then(millis_to_datetime).unwrap_or(now),
    }
}

/// Applies a remote payload onto an existing bookmark. Last writer wins for
/// every field.
pub(crate) fn apply_bookmark_payload(
    bookmark: &mut Bookmark,
    record: &SyncRecord,
    payload: &BookmarkPayload,
) {
    bookmark.title = payload.site.title.clone().unwrap_or_default();
    bookmark.url = payload.site.location.clone();
    bookmark.custom_title = payload.site.custom_title.clone();
    bookmark.is_folder = payload.is_folder;
    bookmark.parent_object_id = payload.parent_folder_object_id.clone();
    bookmark.last_modified = record
        .timestamp
        .and_then(millis_to_datetime)
        .unwrap_or_else(Utc::now);
}
