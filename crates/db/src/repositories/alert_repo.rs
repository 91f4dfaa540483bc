//! Repository for the `alerts` table.
//!
//! Status transitions are guarded in SQL on the current status so they
//! only move forward through the lattice in
//! `vigil_core::alert::AlertStatus`; a claim or update that matches zero
//! rows means another worker got there first (or the row is terminal).

use sqlx::PgPool;
use vigil_core::alert::AlertStatus;

use crate::models::alert::{AlertRow, NewAlert};

/// Column list for `alerts` queries (excludes the `embedding` vector).
const COLUMNS: &str = "\
    id, alert_uid, source, alert_type, title, description, severity, \
    location, latitude, longitude, status, error_message, is_active, \
    raw_data, start_time, processed_at, created_at, updated_at, \
    (embedding IS NOT NULL) AS has_embedding";

/// Provides query operations for alert ingestion and embedding tracking.
pub struct AlertRepo;

impl AlertRepo {
    // ── Inserts ──────────────────────────────────────────────────────

    /// Insert a new alert row with status `pending`.
    ///
    /// Duplicate ids are ignored (`ON CONFLICT DO NOTHING`): a replayed
    /// message must not clobber an existing row. Returns `true` when a
    /// row was actually inserted.
    pub async fn insert(pool: &PgPool, alert: &NewAlert) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO alerts (\
                alert_uid, source, alert_type, title, description, severity, \
                location, latitude, longitude, status, is_active, raw_data, start_time\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, true, $11, $12) \
             ON CONFLICT (alert_uid) DO NOTHING",
        )
        .bind(&alert.alert_uid)
        .bind(&alert.source)
        .bind(&alert.alert_type)
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(alert.severity)
        .bind(&alert.location)
        .bind(alert.latitude)
        .bind(alert.longitude)
        .bind(AlertStatus::Pending.as_str())
        .bind(&alert.raw_data)
        .bind(alert.start_time)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert a dead-letter stub for a payload that failed normalization,
    /// so the failure stays inspectable via `status = 'failed'`.
    pub async fn insert_failed_stub(
        pool: &PgPool,
        alert_uid: &str,
        source: &str,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO alerts (\
                alert_uid, source, title, description, status, error_message, \
                is_active, raw_data, start_time, processed_at\
             ) VALUES ($1, $2, 'New Alert', '', $3, $4, false, '{}'::jsonb, NOW(), NOW()) \
             ON CONFLICT (alert_uid) DO NOTHING",
        )
        .bind(alert_uid)
        .bind(source)
        .bind(AlertStatus::Failed.as_str())
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Find an alert by its external id.
    pub async fn find_by_uid(
        pool: &PgPool,
        alert_uid: &str,
    ) -> Result<Option<AlertRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM alerts WHERE alert_uid = $1");
        sqlx::query_as::<_, AlertRow>(&query)
            .bind(alert_uid)
            .fetch_optional(pool)
            .await
    }

    // ── Status transitions ───────────────────────────────────────────

    /// Claim a pending alert for embedding (`pending -> processing`).
    ///
    /// Returns `false` when the row is already claimed or terminal; the
    /// guard is what keeps a record from being embedded twice
    /// concurrently.
    pub async fn claim_for_processing(
        pool: &PgPool,
        alert_uid: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alerts SET status = $2, updated_at = NOW() \
             WHERE alert_uid = $1 AND status = $3",
        )
        .bind(alert_uid)
        .bind(AlertStatus::Processing.as_str())
        .bind(AlertStatus::Pending.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the embedding and finish the row (`pending|processing ->
    /// embedded`, stamps `processed_at`).
    ///
    /// The vector is passed as a pgvector text literal and cast in SQL.
    pub async fn update_embedding(
        pool: &PgPool,
        alert_uid: &str,
        embedding: &[f32],
    ) -> Result<bool, sqlx::Error> {
        let embedding_str = format!(
            "[{}]",
            embedding
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        let result = sqlx::query(
            "UPDATE alerts SET \
                embedding = $2::vector, \
                status = $3, \
                processed_at = NOW(), \
                updated_at = NOW() \
             WHERE alert_uid = $1 AND status IN ($4, $5)",
        )
        .bind(alert_uid)
        .bind(&embedding_str)
        .bind(AlertStatus::Embedded.as_str())
        .bind(AlertStatus::Pending.as_str())
        .bind(AlertStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close a no-content alert (`pending|processing -> skipped`).
    pub async fn mark_skipped(pool: &PgPool, alert_uid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alerts SET status = $2, processed_at = NOW(), updated_at = NOW() \
             WHERE alert_uid = $1 AND status IN ($3, $4)",
        )
        .bind(alert_uid)
        .bind(AlertStatus::Skipped.as_str())
        .bind(AlertStatus::Pending.as_str())
        .bind(AlertStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Dead-letter an alert with a human-readable reason
    /// (`pending|processing -> failed`). The row is retained.
    pub async fn mark_failed(
        pool: &PgPool,
        alert_uid: &str,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alerts SET \
                status = $2, \
                error_message = $3, \
                processed_at = NOW(), \
                updated_at = NOW() \
             WHERE alert_uid = $1 AND status IN ($4, $5)",
        )
        .bind(alert_uid)
        .bind(AlertStatus::Failed.as_str())
        .bind(reason)
        .bind(AlertStatus::Pending.as_str())
        .bind(AlertStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
