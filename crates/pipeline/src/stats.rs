//! Process-wide pipeline counters and the periodic reporter task.
//!
//! The coordinator owns one [`PipelineStats`] and bumps it with atomic
//! increments as items reach terminal states; everything else sees the
//! counters read-only through [`StatsSnapshot`]. Counters are advisory:
//! they live for the process lifetime and are not transactionally tied
//! to the rows they describe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Counters for items that reached a terminal state.
#[derive(Debug)]
pub struct PipelineStats {
    processed: AtomicU64,
    embedded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    started_at: Instant,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            processed: AtomicU64::new(0),
            embedded: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl PipelineStats {
    /// An item finished with a stored embedding.
    pub fn record_embedded(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.embedded.fetch_add(1, Ordering::Relaxed);
    }

    /// An item finished without an embedding (no content).
    pub fn record_skipped(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// An item was dead-lettered.
    pub fn record_failed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// An item was handled without a local terminal transition
    /// (forwarded to the second stage, or claimed elsewhere).
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read-only view of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            embedded: self.embedded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub embedded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub uptime: Duration,
}

/// Log a stats snapshot every `interval` until cancelled.
pub async fn run_stats_reporter(
    stats: Arc<PipelineStats>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so the first report
    // carries a full interval of work.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let snap = stats.snapshot();
                tracing::info!(
                    processed = snap.processed,
                    embedded = snap.embedded,
                    skipped = snap.skipped,
                    failed = snap.failed,
                    uptime_secs = snap.uptime.as_secs(),
                    "Final pipeline stats",
                );
                return;
            }
            _ = ticker.tick() => {
                let snap = stats.snapshot();
                tracing::info!(
                    processed = snap.processed,
                    embedded = snap.embedded,
                    skipped = snap.skipped,
                    failed = snap.failed,
                    uptime_secs = snap.uptime.as_secs(),
                    "Pipeline stats",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_outcomes_bump_processed() {
        let stats = PipelineStats::default();
        stats.record_embedded();
        stats.record_embedded();
        stats.record_skipped();
        stats.record_failed();
        stats.record_processed();

        let snap = stats.snapshot();
        assert_eq!(snap.processed, 5);
        assert_eq!(snap.embedded, 2);
        assert_eq!(snap.skipped, 1);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn snapshot_is_independent_of_later_updates() {
        let stats = PipelineStats::default();
        stats.record_embedded();
        let snap = stats.snapshot();
        stats.record_failed();
        assert_eq!(snap.embedded, 1);
        assert_eq!(snap.failed, 0);
    }

    #[tokio::test]
    async fn reporter_exits_on_cancellation() {
        let stats = Arc::new(PipelineStats::default());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_stats_reporter(
            Arc::clone(&stats),
            Duration::from_secs(60),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should exit promptly")
            .unwrap();
    }
}
