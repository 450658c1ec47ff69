//! Incremental fetch cursor.
//!
//! Only bookmarks persist a cursor. The transient half of the cursor lives
//! with the engine between an existing-objects request and the resolved
//! batch that follows it.

use sqlx::SqliteConnection;

use crate::db::{preferences, Preferences};

pub const BOOKMARKS_CURSOR_KEY: &str = "sync.bookmarks.last_successful_timestamp";

/// Transient per-category fetch state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchProgress {
    /// Newest record timestamp seen in the last fetched page.
    pub last_fetched: Option<i64>,
    /// The relay has more records beyond the last page.
    pub trimmed: bool,
}

/// Next persisted cursor after a batch is committed.
///
/// Advances to one past the newest timestamp seen and never moves backwards.
pub fn next_cursor(previous: i64, last_fetched: Option<i64>, batch_max: Option<i64>) -> i64 {
    match last_fetched.max(batch_max) {
        Some(newest) => previous.max(newest.saturating_add(1)),
        None => previous,
    }
}

pub async fn load(prefs: &Preferences) -> Result<i64, sqlx::Error> {
    Ok(prefs.get_i64(BOOKMARKS_CURSOR_KEY).await?.unwrap_or(0))
}

pub(crate) async fn load_in(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    Ok(preferences::get_i64(conn, BOOKMARKS_CURSOR_KEY)
        .await?
        .unwrap_or(0))
}

pub(crate) async fn store_in(conn: &mut SqliteConnection, value: i64) -> Result<(), sqlx::Error> {
    preferences::set(conn, BOOKMARKS_CURSOR_KEY, &value.to_string()).await
}

pub async fn reset(prefs: &Preferences) -> Result<(), sqlx::Error> {
    prefs.set_i64(BOOKMARKS_CURSOR_KEY, 0).await
}
