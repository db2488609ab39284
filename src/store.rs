use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::warn;

pub const JQL_KEY: &str = "jira_metrics_jql";
pub const ISSUES_KEY: &str = "jira_metrics_issues";
pub const BASELINE_KEY: &str = "jira_metrics_baseline";
pub const METRIC_KEY: &str = "jira_metrics_selected_metric";

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn get_raw(pool: &SqlitePool, key: &str) -> anyhow::Result<Option<String>> {
    let row = sqlx::query("SELECT value FROM kv_state WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to read {key}"))?;

    Ok(row.map(|row| row.get("value")))
}

pub async fn put_raw(pool: &SqlitePool, key: &str, value: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO kv_state (key, value)
        VALUES (?1, ?2)
        ON CONFLICT (key) DO UPDATE
        SET value = excluded.value,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .with_context(|| format!("failed to write {key}"))?;

    Ok(())
}

pub async fn put<T: Serialize>(pool: &SqlitePool, key: &str, value: &T) -> anyhow::Result<()> {
    let encoded =
        serde_json::to_string(value).with_context(|| format!("failed to encode {key}"))?;
    put_raw(pool, key, &encoded).await
}

pub async fn remove(pool: &SqlitePool, key: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM kv_state WHERE key = ?1")
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to remove {key}"))?;
    Ok(())
}

/// Reads a stored JSON value. Missing keys yield `default`; a value that no
/// longer parses is dropped from the store and also yields `default`.
pub async fn load_or_default<T: DeserializeOwned>(
    pool: &SqlitePool,
    key: &str,
    default: T,
) -> anyhow::Result<T> {
    let Some(raw) = get_raw(pool, key).await? else {
        return Ok(default);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(key, error = %err, "discarding unreadable stored value");
            remove(pool, key).await?;
            Ok(default)
        }
    }
}
