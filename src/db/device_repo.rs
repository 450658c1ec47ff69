use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use super::bookmark_repo::parse_timestamp;
use crate::models::{Device, DeviceId, NewDevice, ObjectId};

pub struct DeviceRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: i64,
    object_id: String,
    device_id: Option<String>,
    name: String,
    is_current: bool,
    synced: bool,
    removed: bool,
    last_modified: String,
}

impl TryFrom<DeviceRow> for Device {
    type Error = sqlx::Error;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let object_id = ObjectId::from_bs58check(&row.object_id)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let device_id = row
            .device_id
            .as_deref()
            .map(DeviceId::from_bs58check)
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Device {
            id: row.id,
            object_id,
            device_id,
            name: row.name,
            is_current: row.is_current,
            synced: row.synced,
            removed: row.removed,
            last_modified: parse_timestamp(&row.last_modified),
        })
    }
}

impl DeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Devices visible to the UI; soft-deleted rows are excluded.
    pub async fn list(&self) -> Result<Vec<Device>, sqlx::Error> {
        let rows: Vec<DeviceRow> =
            sqlx::query_as("SELECT * FROM devices WHERE removed = 0 ORDER BY is_current DESC, id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Device::try_from).collect()
    }

    /// Every row, including soft-deleted ones.
    pub async fn list_all(&self) -> Result<Vec<Device>, sqlx::Error> {
        let rows: Vec<DeviceRow> = sqlx::query_as("SELECT * FROM devices ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Device::try_from).collect()
    }

    pub async fn get_by_object_id(
        &self,
        object_id: &ObjectId,
    ) -> Result<Option<Device>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, object_id).await
    }

    pub async fn current(&self) -> Result<Option<Device>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        find_current(&mut conn).await
    }

    pub async fn create(&self, device: &NewDevice) -> Result<Device, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, device).await
    }

    /// Marks a device as removed. Returns false if no visible row matched.
    pub async fn soft_remove(&self, object_id: &ObjectId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE devices SET removed = 1, last_modified = ? WHERE object_id = ? AND removed = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(object_id.to_bs58check())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_synced(&self, object_id: &ObjectId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE devices SET synced = 1 WHERE object_id = ?")
            .bind(object_id.to_bs58check())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Assigns the relay device id to a row that does not have one yet.
    pub async fn assign_device_id(
        &self,
        object_id: &ObjectId,
        device_id: &DeviceId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE devices SET device_id = ? WHERE object_id = ? AND device_id IS NULL",
        )
        .bind(device_id.to_bs58check())
        .bind(object_id.to_bs58check())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drops every device row. Used when leaving the group.
    pub async fn purge_all(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM devices")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

pub(crate) async fn find(
    conn: &mut SqliteConnection,
    object_id: &ObjectId,
) -> Result<Option<Device>, sqlx::Error> {
    let row: Option<DeviceRow> = sqlx::query_as("SELECT * FROM devices WHERE object_id = ?")
        .bind(object_id.to_bs58check())
        .fetch_optional(&mut *conn)
        .await?;

    row.map(Device::try_from).transpose()
}

pub(crate) async fn find_current(
    conn: &mut SqliteConnection,
) -> Result<Option<Device>, sqlx::Error> {
    let row: Option<DeviceRow> =
        sqlx::query_as("SELECT * FROM devices WHERE is_current = 1 ORDER BY id LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;

    row.map(Device::try_from).transpose()
}

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    device: &NewDevice,
) -> Result<Device, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO devices (object_id, device_id, name, is_current, synced, removed, last_modified)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(device.object_id.to_bs58check())
    .bind(device.device_id.as_ref().map(DeviceId::to_bs58check))
    .bind(&device.name)
    .bind(device.is_current)
    .bind(device.synced)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    find(conn, &device.object_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

/// Applies the remote view of a device onto an existing row.
///
/// The relay-assigned id is only filled in when missing; a local soft
/// delete is preserved.
pub(crate) async fn apply_remote(
    conn: &mut SqliteConnection,
    object_id: &ObjectId,
    device_id: Option<&DeviceId>,
    name: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE devices
        SET name = ?, device_id = COALESCE(device_id, ?), synced = 1, last_modified = ?
        WHERE object_id = ?
        "#,
    )
    .bind(name)
    .bind(device_id.map(DeviceId::to_bs58check))
    .bind(Utc::now().to_rfc3339())
    .bind(object_id.to_bs58check())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_by_object_id(
    conn: &mut SqliteConnection,
    object_id: &ObjectId,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM devices WHERE object_id = ?")
        .bind(object_id.to_bs58check())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
