//! Persistence client for the pipeline.
//!
//! [`AlertStore`] owns the pool and fronts [`AlertRepo`] with the write
//! contract the coordinator needs: every operation retries exactly once
//! when the failure looks like a dead connection (the pool hands out a
//! fresh connection on the second acquire), then surfaces
//! [`PersistenceError`] -- never a silent drop.

use sqlx::PgPool;
use vigil_core::alert::AlertRecord;

use crate::models::alert::{AlertRow, NewAlert};
use crate::repositories::AlertRepo;

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The store rejected or could not perform a write.
    #[error("Persistence error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Whether an error indicates a dead or exhausted connection that a
/// single reconnect-and-retry could fix, as opposed to a rejected
/// statement.
fn is_transient(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Write-side client for the `alerts` table.
#[derive(Clone)]
pub struct AlertStore {
    pool: PgPool,
}

impl AlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a normalized alert with status `pending`.
    ///
    /// Returns `Ok(false)` when a row with the same id already exists
    /// (conflict-ignore; duplicate publishes converge on one row).
    pub async fn insert_alert(&self, record: &AlertRecord) -> Result<bool, PersistenceError> {
        let new_alert = NewAlert::from(record);
        self.with_reconnect(|| AlertRepo::insert(&self.pool, &new_alert))
            .await
    }

    /// Dead-letter a payload that never produced a full record.
    pub async fn insert_failed_stub(
        &self,
        alert_uid: &str,
        source: &str,
        reason: &str,
    ) -> Result<(), PersistenceError> {
        self.with_reconnect(|| AlertRepo::insert_failed_stub(&self.pool, alert_uid, source, reason))
            .await
    }

    /// Claim a pending alert for embedding. `false` means another worker
    /// holds it or the row is already terminal.
    pub async fn claim_for_processing(&self, alert_uid: &str) -> Result<bool, PersistenceError> {
        self.with_reconnect(|| AlertRepo::claim_for_processing(&self.pool, alert_uid))
            .await
    }

    /// Store an embedding and mark the row `embedded`.
    pub async fn update_embedding(
        &self,
        alert_uid: &str,
        embedding: &[f32],
    ) -> Result<bool, PersistenceError> {
        self.with_reconnect(|| AlertRepo::update_embedding(&self.pool, alert_uid, embedding))
            .await
    }

    /// Mark a no-content row `skipped`.
    pub async fn mark_skipped(&self, alert_uid: &str) -> Result<bool, PersistenceError> {
        self.with_reconnect(|| AlertRepo::mark_skipped(&self.pool, alert_uid))
            .await
    }

    /// Mark a row `failed` with a reason, keeping it inspectable.
    pub async fn mark_failed(
        &self,
        alert_uid: &str,
        reason: &str,
    ) -> Result<bool, PersistenceError> {
        self.with_reconnect(|| AlertRepo::mark_failed(&self.pool, alert_uid, reason))
            .await
    }

    /// Look up an alert by external id.
    pub async fn find_by_uid(&self, alert_uid: &str) -> Result<Option<AlertRow>, PersistenceError> {
        self.with_reconnect(|| AlertRepo::find_by_uid(&self.pool, alert_uid))
            .await
    }

    // ---- private helpers ----

    /// Run an operation, retrying exactly once on a transient
    /// connection-level failure.
    async fn with_reconnect<T, F, Fut>(&self, mut op: F) -> Result<T, PersistenceError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match op().await {
            Ok(value) => Ok(value),
            Err(e) if is_transient(&e) => {
                tracing::warn!(error = %e, "Transient store failure, retrying once");
                op().await.map_err(PersistenceError::from)
            }
            Err(e) => Err(PersistenceError::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_pool_errors_are_transient() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(is_transient(&io));
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(is_transient(&sqlx::Error::PoolClosed));
    }

    #[test]
    fn row_not_found_is_not_transient() {
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }
}
