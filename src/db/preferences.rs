//! Plain key/value preference storage.
//!
//! Values are stored as text; typed helpers parse on read and treat an
//! unparsable value as absent.

use sqlx::{SqliteConnection, SqlitePool};

pub struct Preferences {
    pool: SqlitePool,
}

impl Preferences {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        set(&mut conn, key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM preferences WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_i64(&self, key: &str) -> Result<Option<i64>, sqlx::Error> {
        Ok(self.get(key).await?.and_then(|v| v.parse().ok()))
    }

    pub async fn set_i64(&self, key: &str, value: i64) -> Result<(), sqlx::Error> {
        self.set(key, &value.to_string()).await
    }

    pub async fn get_bool(&self, key: &str) -> Result<bool, sqlx::Error> {
        Ok(self.get(key).await?.is_some_and(|v| v == "true"))
    }

    pub async fn set_bool(&self, key: &str, value: bool) -> Result<(), sqlx::Error> {
        self.set(key, if value { "true" } else { "false" }).await
    }
}

/// Upsert usable inside a transaction.
pub(crate) async fn set(
    conn: &mut SqliteConnection,
    key: &str,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO preferences (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn get_i64(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM preferences WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.and_then(|(value,)| value.parse().ok()))
}
