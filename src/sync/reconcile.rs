//! Reconciliation of relay batches against the local store.
//!
//! Two inbound shapes drive this module. An existing-objects request asks
//! for the local view of each remote record; a resolved batch carries the
//! final verdicts, which are applied inside the caller's transaction.

use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use super::codec::{apply_bookmark_payload, new_bookmark_from, to_wire_record};
use super::protocol::RecordPair;
use super::record::{RecordPayload, SyncAction, SyncCategory, SyncRecord};
use crate::db::{bookmark_repo, device_repo};
use crate::models::{DeviceId, NewDevice, ObjectId};

/// Local answer to an existing-objects request.
#[derive(Debug, Clone, Default)]
pub struct ExistingObjects {
    pub pairs: Vec<RecordPair>,
    /// Newest timestamp among the records that parsed.
    pub newest: Option<i64>,
}

/// Builds `[remote, local | null]` pairs for each parsable remote record.
///
/// Local entities are serialized as Create records.
pub async fn existing_objects(
    conn: &mut SqliteConnection,
    category: SyncCategory,
    records: &[Value],
    device_id: Option<&DeviceId>,
) -> Result<ExistingObjects, sqlx::Error> {
    let mut answer = ExistingObjects::default();

    for value in records {
        let remote = match SyncRecord::parse(value, category) {
            Ok(record) => record,
            Err(e) => {
                warn!(%category, error = %e, "Dropping malformed sync record");
                continue;
            }
        };
        answer.newest = answer.newest.max(remote.timestamp);

        let local = match category {
            SyncCategory::Bookmarks => bookmark_repo::find(conn, &remote.object_id)
                .await?
                .map(|b| to_wire_record(&b, device_id, SyncAction::Create)),
            SyncCategory::Devices => device_repo::find(conn, &remote.object_id)
                .await?
                .filter(|d| !d.removed)
                .map(|d| to_wire_record(&d, device_id, SyncAction::Create)),
            SyncCategory::History => None,
        };

        answer.pairs.push((value.clone(), local));
    }

    Ok(answer)
}

/// Counts and side effects of one applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Newest record timestamp in the batch.
    pub newest: Option<i64>,
    /// Other devices deleted by the relay.
    pub removed_devices: Vec<ObjectId>,
    /// The relay deleted this installation's own device row.
    pub current_device_removed: bool,
}

/// Applies resolved bookmark records in delivery order.
///
/// Create on an existing row degrades to Update; Delete of an absent row is
/// a no-op. Children that arrived before their folder are attached at the
/// end of the batch.
pub async fn apply_bookmarks(
    conn: &mut SqliteConnection,
    records: &[SyncRecord],
) -> Result<ApplyOutcome, sqlx::Error> {
    let mut outcome = ApplyOutcome::default();

    for record in records {
        outcome.newest = outcome.newest.max(record.timestamp);
        let RecordPayload::Bookmark(payload) = &record.payload else {
            continue;
        };

        if record.action == SyncAction::Delete {
            if bookmark_repo::delete_by_object_id(conn, &record.object_id).await? {
                outcome.deleted += 1;
            }
            continue;
        }

        match bookmark_repo::find(conn, &record.object_id).await? {
            Some(mut existing) => {
                if record.action == SyncAction::Create {
                    debug!(object_id = %record.object_id, "Create for existing bookmark, applying as update");
                }
                apply_bookmark_payload(&mut existing, record, payload);
                bookmark_repo::write_fields(conn, &existing).await?;
                outcome.updated += 1;
            }
            None => {
                bookmark_repo::insert(conn, &new_bookmark_from(record, payload)).await?;
                outcome.created += 1;
            }
        }
    }

    let attached = bookmark_repo::attach_orphans(conn).await?;
    if attached > 0 {
        debug!(attached, "Attached bookmarks to late-arriving folders");
    }

    Ok(outcome)
}

/// Applies resolved device records.
///
/// A Delete for this installation's own row is reported rather than applied;
/// the caller leaves the group once the batch commits.
pub async fn apply_devices(
    conn: &mut SqliteConnection,
    records: &[SyncRecord],
) -> Result<ApplyOutcome, sqlx::Error> {
    let mut outcome = ApplyOutcome::default();

    for record in records {
        outcome.newest = outcome.newest.max(record.timestamp);
        let RecordPayload::Device(payload) = &record.payload else {
            continue;
        };
        let existing = device_repo::find(conn, &record.object_id).await?;

        if record.action == SyncAction::Delete {
            match existing {
                Some(device) if device.is_current => outcome.current_device_removed = true,
                Some(_) => {
                    device_repo::delete_by_object_id(conn, &record.object_id).await?;
                    outcome.removed_devices.push(record.object_id.clone());
                    outcome.deleted += 1;
                }
                None => {}
            }
            continue;
        }

        let name = payload.name.clone().unwrap_or_default();
        match existing {
            Some(_) => {
                device_repo::apply_remote(conn, &record.object_id, record.device_id.as_ref(), &name)
                    .await?;
                outcome.updated += 1;
            }
            None => {
                let device = NewDevice::remote(record.object_id.clone(), record.device_id.clone(), name);
                device_repo::insert(conn, &device).await?;
                outcome.created += 1;
            }
        }
    }

    Ok(outcome)
}
