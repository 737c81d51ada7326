//! Database access for triage-cluster
//!
//! SQLite via sqlx. Tasks and segment links are the only rows mutated
//! concurrently across tenants; every write is scoped by tenant id and task
//! id so there is no cross-tenant contention.

pub mod links;
pub mod tasks;
pub mod watermarks;

use sqlx::SqlitePool;
use std::path::Path;
use triage_common::Result;

/// Initialize database connection pool and ensure tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the pipeline's tables if they don't exist.
///
/// The composite primary key on task_segment_links is what makes link
/// writes idempotent under retry.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            actionable INTEGER NOT NULL,
            centroid TEXT NOT NULL,
            priority_score REAL NOT NULL,
            occurrence_count INTEGER NOT NULL,
            distinct_user_count INTEGER NOT NULL,
            last_occurrence_at TEXT,
            origin TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_tenant_origin ON tasks(tenant_id, origin)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_segment_links (
            task_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            segment_start TEXT NOT NULL,
            segment_end TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (task_id, session_id, segment_start, segment_end)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clustering_watermarks (
            tenant_id TEXT PRIMARY KEY,
            last_processed_at TEXT NOT NULL,
            segments_processed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (tasks, task_segment_links, clustering_watermarks)");

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // One connection: pooled in-memory SQLite databases are per-connection
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    pool
}
