//! Settings table accessors
//!
//! Key-value rows; values are stored as text and parsed on read.

use qforge_common::{Error, Result};
use sqlx::SqlitePool;

/// Generator endpoint override
pub const GENERATOR_URL_KEY: &str = "gen_generator_url";

/// Generator API key override
pub const GENERATOR_API_KEY_KEY: &str = "gen_generator_api_key";

pub async fn get_generator_url(db: &SqlitePool) -> Result<Option<String>> {
    get_setting::<String>(db, GENERATOR_URL_KEY).await
}

pub async fn get_generator_api_key(db: &SqlitePool) -> Result<Option<String>> {
    get_setting::<String>(db, GENERATOR_API_KEY_KEY).await
}

pub async fn set_generator_api_key(db: &SqlitePool, key: String) -> Result<()> {
    set_setting(db, GENERATOR_API_KEY_KEY, key).await
}

/// Raw text value of a setting (NULL reads as absent)
pub async fn get_raw_setting(db: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;
    Ok(value.flatten())
}

/// Typed setting getter
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_raw_setting(db, key).await? {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e))),
        None => Ok(None),
    }
}

/// Typed setting setter (upsert)
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
