use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{Bookmark, NewBookmark, ObjectId};

pub struct BookmarkRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct BookmarkRow {
    id: i64,
    object_id: String,
    title: String,
    url: Option<String>,
    custom_title: Option<String>,
    is_folder: bool,
    parent_object_id: Option<String>,
    parent_id: Option<i64>,
    created_at: String,
    last_modified: String,
}

impl TryFrom<BookmarkRow> for Bookmark {
    type Error = sqlx::Error;

    fn try_from(row: BookmarkRow) -> Result<Self, Self::Error> {
        let object_id = ObjectId::from_bs58check(&row.object_id)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        // A corrupt parent reference is treated as no parent.
        let parent_object_id = row
            .parent_object_id
            .as_deref()
            .and_then(|s| ObjectId::from_bs58check(s).ok());

        Ok(Bookmark {
            id: row.id,
            object_id,
            title: row.title,
            url: row.url,
            custom_title: row.custom_title,
            is_folder: row.is_folder,
            parent_object_id,
            parent_id: row.parent_id,
            created_at: parse_timestamp(&row.created_at),
            last_modified: parse_timestamp(&row.last_modified),
        })
    }
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl BookmarkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, bookmark: &NewBookmark) -> Result<Bookmark, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, bookmark).await
    }

    pub async fn get_by_object_id(
        &self,
        object_id: &ObjectId,
    ) -> Result<Option<Bookmark>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, object_id).await
    }

    pub async fn list(&self) -> Result<Vec<Bookmark>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        list_all(&mut conn).await
    }

    /// Children of a folder, by the folder's object id.
    pub async fn children(&self, parent: &ObjectId) -> Result<Vec<Bookmark>, sqlx::Error> {
        let rows: Vec<BookmarkRow> =
            sqlx::query_as("SELECT * FROM bookmarks WHERE parent_object_id = ? ORDER BY id")
                .bind(parent.to_bs58check())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Bookmark::try_from).collect()
    }

    /// Saves a local edit. Bumps `last_modified` and re-resolves the parent.
    pub async fn update(&self, bookmark: &Bookmark) -> Result<Bookmark, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let mut edited = bookmark.clone();
        edited.last_modified = Utc::now();
        write_fields(&mut conn, &edited).await?;

        find(&mut conn, &bookmark.object_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Removes a bookmark. Returns false if it did not exist.
    pub async fn delete(&self, object_id: &ObjectId) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        delete_by_object_id(&mut conn, object_id).await
    }
}

pub(crate) async fn find(
    conn: &mut SqliteConnection,
    object_id: &ObjectId,
) -> Result<Option<Bookmark>, sqlx::Error> {
    let row: Option<BookmarkRow> = sqlx::query_as("SELECT * FROM bookmarks WHERE object_id = ?")
        .bind(object_id.to_bs58check())
        .fetch_optional(&mut *conn)
        .await?;

    row.map(Bookmark::try_from).transpose()
}

pub(crate) async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Bookmark>, sqlx::Error> {
    let rows: Vec<BookmarkRow> = sqlx::query_as("SELECT * FROM bookmarks ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(Bookmark::try_from).collect()
}

async fn resolve_parent_id(
    conn: &mut SqliteConnection,
    parent: Option<&ObjectId>,
) -> Result<Option<i64>, sqlx::Error> {
    let Some(parent) = parent else {
        return Ok(None);
    };

    let id: Option<(i64,)> = sqlx::query_as("SELECT id FROM bookmarks WHERE object_id = ?")
        .bind(parent.to_bs58check())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(id.map(|(id,)| id))
}

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    bookmark: &NewBookmark,
) -> Result<Bookmark, sqlx::Error> {
    let parent_id = resolve_parent_id(conn, bookmark.parent_object_id.as_ref()).await?;

    sqlx::query(
        r#"
        INSERT INTO bookmarks (object_id, title, url, custom_title, is_folder, parent_object_id, parent_id, created_at, last_modified)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(bookmark.object_id.to_bs58check())
    .bind(&bookmark.title)
    .bind(&bookmark.url)
    .bind(&bookmark.custom_title)
    .bind(bookmark.is_folder)
    .bind(bookmark.parent_object_id.as_ref().map(ObjectId::to_bs58check))
    .bind(parent_id)
    .bind(bookmark.created_at.to_rfc3339())
    .bind(bookmark.last_modified.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    find(conn, &bookmark.object_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

/// Overwrites every mutable field of an existing row, keyed by object id.
pub(crate) async fn write_fields(
    conn: &mut SqliteConnection,
    bookmark: &Bookmark,
) -> Result<(), sqlx::Error> {
    let parent_id = resolve_parent_id(conn, bookmark.parent_object_id.as_ref()).await?;

    sqlx::query(
        r#"
        UPDATE bookmarks
        SET title = ?, url = ?, custom_title = ?, is_folder = ?,
            parent_object_id = ?, parent_id = ?, last_modified = ?
        WHERE object_id = ?
        "#,
    )
    .bind(&bookmark.title)
    .bind(&bookmark.url)
    .bind(&bookmark.custom_title)
    .bind(bookmark.is_folder)
    .bind(bookmark.parent_object_id.as_ref().map(ObjectId::to_bs58check))
    .bind(parent_id)
    .bind(bookmark.last_modified.to_rfc3339())
    .bind(bookmark.object_id.to_bs58check())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_by_object_id(
    conn: &mut SqliteConnection,
    object_id: &ObjectId,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM bookmarks WHERE object_id = ?")
        .bind(object_id.to_bs58check())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Attaches every child whose parent has arrived since it was stored.
///
/// Returns the number of rows that were attached.
pub(crate) async fn attach_orphans(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE bookmarks
        SET parent_id = (SELECT p.id FROM bookmarks p WHERE p.object_id = bookmarks.parent_object_id)
        WHERE parent_object_id IS NOT NULL
          AND parent_id IS NULL
          AND EXISTS (SELECT 1 FROM bookmarks p WHERE p.object_id = bookmarks.parent_object_id)
        "#,
    )
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
