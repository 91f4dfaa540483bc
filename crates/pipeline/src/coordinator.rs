//! Batch coordinator for the ingestion pipeline.
//!
//! Pulls bounded batches off the inbound queue, fans each item out to a
//! concurrent normalize -> store -> embed -> persist task, and converts
//! every per-item failure into a terminal `failed` row instead of a
//! crashed worker. Queue outages cool the loop down and, past a
//! configured ceiling of consecutive failures, end the run with an error
//! so a supervisor can restart the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vigil_core::message::EmbeddingTask;
use vigil_core::normalize::{normalize, NormalizationError};
use vigil_db::AlertStore;
use vigil_embed::EmbeddingApi;
use vigil_queue::QueueClient;

use crate::stats::PipelineStats;

/// Which stage(s) of the pipeline this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Consume alerts and run the whole lifecycle in-process (default).
    Full,
    /// Consume alerts, store them, and forward embedding work to the
    /// second-stage queue.
    Ingest,
    /// Consume second-stage embedding tasks only.
    Embed,
}

impl WorkerMode {
    /// Parse a mode name (`full`, `ingest`, `embed`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "ingest" => Some(Self::Ingest),
            "embed" => Some(Self::Embed),
            _ => None,
        }
    }
}

/// Tunables for the batch loop.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub mode: WorkerMode,
    /// Maximum items pulled and processed per cycle; also the
    /// concurrency bound.
    pub batch_size: usize,
    /// Bounded wait for each queue pop.
    pub pop_timeout: Duration,
    /// Pause after a queue failure before the loop resumes.
    pub error_cooldown: Duration,
    /// Consecutive queue failures tolerated before the run ends.
    pub max_queue_failures: u32,
    /// Inbound alerts queue name.
    pub alerts_queue: String,
    /// Second-stage embedding task queue name.
    pub embedding_queue: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mode: WorkerMode::Full,
            batch_size: 10,
            pop_timeout: Duration::from_secs(1),
            error_cooldown: Duration::from_secs(5),
            max_queue_failures: 10,
            alerts_queue: "alerts_queue".to_string(),
            embedding_queue: "embedding_queue".to_string(),
        }
    }
}

/// Terminal result of processing one queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Embedding stored; row is `embedded`.
    Embedded,
    /// No content to embed; row is `skipped`.
    Skipped,
    /// Stored and forwarded to the second-stage queue (ingest mode).
    Forwarded,
    /// Another worker already owns or finished this alert.
    Duplicate,
    /// Dead-lettered; row is `failed` where one exists.
    Failed,
}

/// Error that ends a coordinator run.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The queue stayed unreachable past the configured ceiling.
    #[error("Queue unavailable after {attempts} consecutive failures: {reason}")]
    QueueExhausted { attempts: u32, reason: String },
}

/// Owns the consume -> process lifecycle for one worker process.
pub struct Coordinator {
    queue: Arc<QueueClient>,
    store: AlertStore,
    embedder: Arc<EmbeddingApi>,
    stats: Arc<PipelineStats>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        queue: Arc<QueueClient>,
        store: AlertStore,
        embedder: Arc<EmbeddingApi>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            store,
            embedder,
            stats: Arc::new(PipelineStats::default()),
            config,
        })
    }

    /// The coordinator-owned counters (read via snapshots).
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run the batch loop until cancelled or the queue-failure ceiling
    /// is reached.
    ///
    /// Cancellation drains: the in-flight batch finishes before the
    /// loop exits, so items already popped still reach a terminal state.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), CoordinatorError> {
        let source_queue = match self.config.mode {
            WorkerMode::Embed => self.config.embedding_queue.clone(),
            WorkerMode::Full | WorkerMode::Ingest => self.config.alerts_queue.clone(),
        };

        tracing::info!(
            mode = ?self.config.mode,
            queue = %source_queue,
            batch_size = self.config.batch_size,
            "Coordinator started",
        );

        let mut consecutive_failures = 0u32;

        while !cancel.is_cancelled() {
            match self.pull_batch(&source_queue, &cancel).await {
                Ok(batch) => {
                    consecutive_failures = 0;
                    if batch.is_empty() {
                        continue;
                    }
                    tracing::debug!(count = batch.len(), "Processing batch");
                    Arc::clone(&self).process_batch(batch).await;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.max_queue_failures {
                        return Err(CoordinatorError::QueueExhausted {
                            attempts: consecutive_failures,
                            reason: e.to_string(),
                        });
                    }
                    tracing::warn!(
                        error = %e,
                        consecutive_failures,
                        cooldown_secs = self.config.error_cooldown.as_secs(),
                        "Queue failure, cooling down",
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_cooldown) => {}
                    }
                }
            }
        }

        tracing::info!("Coordinator stopped");
        Ok(())
    }

    // ---- batch handling ----

    /// Pop up to `batch_size` items with a bounded wait each, stopping
    /// early when the queue drains or cancellation is requested.
    ///
    /// A pop failure with items already in hand returns those items so
    /// nothing popped is dropped; the failure resurfaces on the next
    /// cycle.
    async fn pull_batch(
        &self,
        queue: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, vigil_queue::QueueError> {
        let mut batch = Vec::with_capacity(self.config.batch_size);

        while batch.len() < self.config.batch_size && !cancel.is_cancelled() {
            match self.queue.consume_one(queue, self.config.pop_timeout).await {
                Ok(Some(payload)) => batch.push(payload),
                Ok(None) => break,
                Err(e) if batch.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Pop failed mid-batch, processing partial batch");
                    break;
                }
            }
        }

        Ok(batch)
    }

    /// Dispatch a batch concurrently and wait for every item to reach a
    /// terminal state.
    async fn process_batch(self: Arc<Self>, batch: Vec<String>) {
        let mut tasks = JoinSet::new();

        for payload in batch {
            let this = Arc::clone(&self);
            tasks.spawn(async move {
                let outcome = this.process_item(payload).await;
                this.record_outcome(&outcome);
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                // A panic in one item must not take down the batch.
                tracing::error!(error = %e, "Item task panicked");
                self.stats.record_failed();
            }
        }
    }

    fn record_outcome(&self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Embedded => self.stats.record_embedded(),
            ItemOutcome::Skipped => self.stats.record_skipped(),
            ItemOutcome::Failed => self.stats.record_failed(),
            ItemOutcome::Forwarded | ItemOutcome::Duplicate => self.stats.record_processed(),
        }
    }

    // ---- per-item pipeline ----

    /// Process one queue payload to a terminal state. Never returns an
    /// error: every failure is converted to an outcome here.
    async fn process_item(&self, payload: String) -> ItemOutcome {
        match self.config.mode {
            WorkerMode::Full => self.process_alert(&payload, true).await,
            WorkerMode::Ingest => self.process_alert(&payload, false).await,
            WorkerMode::Embed => self.process_embedding_task(&payload).await,
        }
    }

    /// First-stage lifecycle: normalize -> insert -> embed inline or
    /// forward to the second-stage queue.
    async fn process_alert(&self, payload: &str, embed_inline: bool) -> ItemOutcome {
        let raw: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Discarding undecodable queue payload");
                return ItemOutcome::Failed;
            }
        };

        let record = match normalize(&raw) {
            Ok(record) => record,
            Err(e) => return self.dead_letter_unnormalizable(e).await,
        };

        match self.store.insert_alert(&record).await {
            Ok(true) => {
                tracing::info!(alert_uid = %record.id, source = %record.source, "Alert stored");
            }
            Ok(false) => {
                tracing::debug!(alert_uid = %record.id, "Alert already stored");
            }
            Err(e) => {
                tracing::error!(alert_uid = %record.id, error = %e, "Failed to store alert");
                return ItemOutcome::Failed;
            }
        }

        if embed_inline {
            self.embed_and_persist(&record.id, &record.content).await
        } else {
            self.forward_embedding_task(&record.id, &record.content)
                .await
        }
    }

    /// Second-stage lifecycle: claim -> embed -> persist.
    async fn process_embedding_task(&self, payload: &str) -> ItemOutcome {
        let task: EmbeddingTask = match serde_json::from_str(payload) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, "Discarding undecodable embedding task");
                return ItemOutcome::Failed;
            }
        };

        self.embed_and_persist(&task.alert_id, &task.content).await
    }

    /// Claim the row, call the provider, and store the vector.
    async fn embed_and_persist(&self, alert_uid: &str, content: &str) -> ItemOutcome {
        if content.trim().is_empty() {
            return self.skip_no_content(alert_uid).await;
        }

        match self.store.claim_for_processing(alert_uid).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(alert_uid = %alert_uid, "Alert already claimed or terminal");
                return ItemOutcome::Duplicate;
            }
            Err(e) => {
                tracing::error!(alert_uid = %alert_uid, error = %e, "Failed to claim alert");
                return ItemOutcome::Failed;
            }
        }

        let vector = match self.embedder.embed(content).await {
            Ok(Some(vector)) => vector,
            Ok(None) => {
                // Content reduced to nothing after trimming.
                return self.skip_no_content(alert_uid).await;
            }
            Err(e) => {
                tracing::warn!(alert_uid = %alert_uid, error = %e, "Embedding failed");
                return self.dead_letter(alert_uid, &e.to_string()).await;
            }
        };

        match self.store.update_embedding(alert_uid, &vector).await {
            Ok(true) => {
                tracing::info!(
                    alert_uid = %alert_uid,
                    dimension = vector.len(),
                    "Embedding stored",
                );
                ItemOutcome::Embedded
            }
            Ok(false) => {
                tracing::warn!(alert_uid = %alert_uid, "Row left processing state during embed");
                ItemOutcome::Duplicate
            }
            Err(e) => {
                tracing::error!(alert_uid = %alert_uid, error = %e, "Failed to store embedding");
                self.dead_letter(alert_uid, &format!("embedding write failed: {e}"))
                    .await
            }
        }
    }

    /// Store the alert's embedding work on the second-stage queue.
    async fn forward_embedding_task(&self, alert_uid: &str, content: &str) -> ItemOutcome {
        if content.trim().is_empty() {
            return self.skip_no_content(alert_uid).await;
        }

        let task = EmbeddingTask::new(alert_uid, content);
        match self
            .queue
            .publish_embedding_task(&self.config.embedding_queue, &task)
            .await
        {
            Ok(()) => ItemOutcome::Forwarded,
            Err(e) => {
                tracing::error!(alert_uid = %alert_uid, error = %e, "Failed to forward embedding task");
                self.dead_letter(alert_uid, &format!("embedding task enqueue failed: {e}"))
                    .await
            }
        }
    }

    /// Close a no-content row as `skipped` (success without embedding).
    async fn skip_no_content(&self, alert_uid: &str) -> ItemOutcome {
        match self.store.mark_skipped(alert_uid).await {
            Ok(_) => {
                tracing::info!(alert_uid = %alert_uid, "No content, embedding skipped");
                ItemOutcome::Skipped
            }
            Err(e) => {
                tracing::error!(alert_uid = %alert_uid, error = %e, "Failed to mark skipped");
                ItemOutcome::Failed
            }
        }
    }

    /// Mark a row failed, best effort; the outcome is `Failed` whether or
    /// not the mark itself succeeds.
    async fn dead_letter(&self, alert_uid: &str, reason: &str) -> ItemOutcome {
        if let Err(e) = self.store.mark_failed(alert_uid, reason).await {
            tracing::error!(alert_uid = %alert_uid, error = %e, "Failed to record dead-letter reason");
        }
        ItemOutcome::Failed
    }

    /// Write a dead-letter stub for a payload that never produced a
    /// record, keeping the failure inspectable in the store.
    async fn dead_letter_unnormalizable(&self, error: NormalizationError) -> ItemOutcome {
        tracing::warn!(
            alert_uid = %error.id,
            source = %error.source,
            reason = %error.reason,
            "Alert failed normalization",
        );
        if let Err(e) = self
            .store
            .insert_failed_stub(&error.id, &error.source, &error.reason)
            .await
        {
            tracing::error!(alert_uid = %error.id, error = %e, "Failed to write dead-letter stub");
        }
        ItemOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_known_names() {
        assert_eq!(WorkerMode::parse("full"), Some(WorkerMode::Full));
        assert_eq!(WorkerMode::parse("ingest"), Some(WorkerMode::Ingest));
        assert_eq!(WorkerMode::parse("embed"), Some(WorkerMode::Embed));
        assert_eq!(WorkerMode::parse("both"), None);
        assert_eq!(WorkerMode::parse(""), None);
    }

    #[test]
    fn default_config_matches_documented_tunables() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.pop_timeout, Duration::from_secs(1));
        assert_eq!(config.error_cooldown, Duration::from_secs(5));
        assert_eq!(config.alerts_queue, "alerts_queue");
        assert_eq!(config.embedding_queue, "embedding_queue");
    }
}
