//! Task row queries

use crate::models::Task;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use triage_common::{Error, Result};
use uuid::Uuid;

/// All non-deleted task centroids for a tenant and origin.
///
/// This is the dedup matcher's view of previously persisted work.
pub async fn fetch_task_centroids(
    pool: &SqlitePool,
    tenant_id: &str,
    origin: &str,
) -> Result<Vec<(Uuid, Vec<f32>)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, centroid FROM tasks WHERE tenant_id = ? AND origin = ? AND deleted = 0",
    )
    .bind(tenant_id)
    .bind(origin)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, centroid_json)| {
            let id = Uuid::parse_str(&id)
                .map_err(|e| Error::Internal(format!("Invalid task UUID in database: {}", e)))?;
            let centroid: Vec<f32> = serde_json::from_str(&centroid_json)
                .map_err(|e| Error::Internal(format!("Invalid centroid JSON for task {}: {}", id, e)))?;
            Ok((id, centroid))
        })
        .collect()
}

/// Insert a newly created task.
///
/// Task ids are derived from the run-scoped cluster id, so replaying a
/// persistence step re-inserts with the same key and the conflict clause
/// makes it a no-op.
pub async fn insert_task(pool: &SqlitePool, task: &Task) -> Result<()> {
    let centroid_json = serde_json::to_string(&task.centroid)
        .map_err(|e| Error::Internal(format!("Centroid serialization failed: {}", e)))?;
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO tasks (
            id, tenant_id, title, description, actionable, centroid,
            priority_score, occurrence_count, distinct_user_count,
            last_occurrence_at, origin, deleted, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(task.id.to_string())
    .bind(&task.tenant_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.actionable)
    .bind(centroid_json)
    .bind(task.priority_score)
    .bind(task.occurrence_count)
    .bind(task.distinct_user_count)
    .bind(task.last_occurrence_at)
    .bind(&task.origin)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one task by id
pub async fn get_task(pool: &SqlitePool, task_id: Uuid) -> Result<Task> {
    let row: (
        String,
        String,
        String,
        String,
        bool,
        String,
        f64,
        i64,
        i64,
        Option<DateTime<Utc>>,
        String,
    ) = sqlx::query_as(
        r#"
        SELECT id, tenant_id, title, description, actionable, centroid,
               priority_score, occurrence_count, distinct_user_count,
               last_occurrence_at, origin
        FROM tasks WHERE id = ?
        "#,
    )
    .bind(task_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(Task {
        id: Uuid::parse_str(&row.0)
            .map_err(|e| Error::Internal(format!("Invalid task UUID in database: {}", e)))?,
        tenant_id: row.1,
        title: row.2,
        description: row.3,
        actionable: row.4,
        centroid: serde_json::from_str(&row.5)
            .map_err(|e| Error::Internal(format!("Invalid centroid JSON: {}", e)))?,
        priority_score: row.6,
        occurrence_count: row.7,
        distinct_user_count: row.8,
        last_occurrence_at: row.9,
        origin: row.10,
    })
}

/// Update a matched task's accumulated counters and priority
pub async fn update_task_counters(
    pool: &SqlitePool,
    task_id: Uuid,
    occurrence_count: i64,
    distinct_user_count: i64,
    last_occurrence_at: Option<DateTime<Utc>>,
    priority_score: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tasks
        SET occurrence_count = ?, distinct_user_count = ?,
            last_occurrence_at = ?, priority_score = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(occurrence_count)
    .bind(distinct_user_count)
    .bind(last_occurrence_at)
    .bind(priority_score)
    .bind(Utc::now())
    .bind(task_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}
