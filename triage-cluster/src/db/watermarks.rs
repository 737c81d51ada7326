//! Clustering watermark queries

use crate::models::ClusteringWatermark;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use triage_common::Result;

/// Load a tenant's watermark, if it has one
pub async fn get_watermark(
    pool: &SqlitePool,
    tenant_id: &str,
) -> Result<Option<ClusteringWatermark>> {
    let row: Option<(DateTime<Utc>, i64)> = sqlx::query_as(
        "SELECT last_processed_at, segments_processed FROM clustering_watermarks WHERE tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(last_processed_at, segments_processed)| ClusteringWatermark {
        tenant_id: tenant_id.to_string(),
        last_processed_at,
        segments_processed,
    }))
}

/// Advance a tenant's watermark, accumulating the processed-segment total.
///
/// Called only once persistence has fully succeeded.
pub async fn advance_watermark(
    pool: &SqlitePool,
    tenant_id: &str,
    last_processed_at: DateTime<Utc>,
    segments_processed: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO clustering_watermarks (tenant_id, last_processed_at, segments_processed)
        VALUES (?, ?, ?)
        ON CONFLICT (tenant_id) DO UPDATE SET
            last_processed_at = MAX(last_processed_at, excluded.last_processed_at),
            segments_processed = segments_processed + excluded.segments_processed
        "#,
    )
    .bind(tenant_id)
    .bind(last_processed_at)
    .bind(segments_processed)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_missing_watermark_is_none() {
        let pool = test_pool().await;
        assert!(get_watermark(&pool, "tenant-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_advance_accumulates() {
        let pool = test_pool().await;
        let first: DateTime<Utc> = "2026-08-01T10:00:00Z".parse().unwrap();
        let second: DateTime<Utc> = "2026-08-02T10:00:00Z".parse().unwrap();

        advance_watermark(&pool, "tenant-1", first, 10).await.unwrap();
        advance_watermark(&pool, "tenant-1", second, 5).await.unwrap();

        let mark = get_watermark(&pool, "tenant-1").await.unwrap().unwrap();
        assert_eq!(mark.last_processed_at, second);
        assert_eq!(mark.segments_processed, 15);
    }

    #[tokio::test]
    async fn test_watermark_never_regresses() {
        let pool = test_pool().await;
        let newer: DateTime<Utc> = "2026-08-02T10:00:00Z".parse().unwrap();
        let older: DateTime<Utc> = "2026-08-01T10:00:00Z".parse().unwrap();

        advance_watermark(&pool, "tenant-1", newer, 5).await.unwrap();
        advance_watermark(&pool, "tenant-1", older, 5).await.unwrap();

        let mark = get_watermark(&pool, "tenant-1").await.unwrap().unwrap();
        assert_eq!(mark.last_processed_at, newer);
    }
}
