//! Task-segment link queries
//!
//! Links are written with `INSERT … ON CONFLICT DO NOTHING` against the
//! composite primary key, so replaying a persistence step is a no-op for
//! segments that were already linked.

use crate::models::TaskSegmentLink;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use triage_common::Result;
use uuid::Uuid;

/// Idempotent link upsert. Returns true when a new row was inserted.
pub async fn upsert_link(pool: &SqlitePool, link: &TaskSegmentLink) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO task_segment_links (
            task_id, session_id, segment_start, segment_end, content, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (task_id, session_id, segment_start, segment_end) DO NOTHING
        "#,
    )
    .bind(link.task_id.to_string())
    .bind(&link.session_id)
    .bind(link.segment_start)
    .bind(link.segment_end)
    .bind(&link.content)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Existing link keys for a task, used to compute "new segments since the
/// last match" before accumulating counters.
pub async fn existing_link_keys(
    pool: &SqlitePool,
    task_id: Uuid,
) -> Result<HashSet<(String, DateTime<Utc>, DateTime<Utc>)>> {
    let rows: Vec<(String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT session_id, segment_start, segment_end FROM task_segment_links WHERE task_id = ?",
    )
    .bind(task_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Number of links for a task (test and diagnostics helper)
pub async fn count_links(pool: &SqlitePool, task_id: Uuid) -> Result<i64> {
    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM task_segment_links WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count.0)
}
