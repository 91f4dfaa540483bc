//! Worker configuration loaded from environment variables.

use std::time::Duration;

use vigil_embed::EmbeddingApiConfig;
use vigil_pipeline::{CoordinatorConfig, WorkerMode};
use vigil_queue::QueueConfig;

/// Worker configuration loaded from environment variables.
///
/// Connection endpoints and credentials are required; every tunable has
/// a default suitable for local development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue broker URL.
    pub redis_url: String,
    /// Postgres connection URL.
    pub database_url: String,
    /// Embedding provider endpoint.
    pub embedding_endpoint: String,
    /// Embedding provider API key.
    pub embedding_api_key: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Expected embedding vector length.
    pub embedding_dimension: usize,
    /// Pipeline stage(s) this process runs.
    pub mode: WorkerMode,
    /// Items per batch (also the concurrency bound).
    pub batch_size: usize,
    /// Bounded wait per queue pop, in seconds.
    pub pop_timeout_secs: u64,
    /// Cooldown after a queue failure, in seconds.
    pub error_cooldown_secs: u64,
    /// Consecutive queue failures before the process exits non-zero.
    pub max_queue_failures: u32,
    /// Interval between stats log lines, in seconds.
    pub stats_interval_secs: u64,
    /// Bound on draining the in-flight batch at shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Inbound alerts queue name.
    pub alerts_queue: String,
    /// Second-stage embedding task queue name.
    pub embedding_queue: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                 | Default                               |
    /// |-------------------------|---------------------------------------|
    /// | `REDIS_URL`             | `redis://localhost:6379`              |
    /// | `DATABASE_URL`          | (required)                            |
    /// | `EMBEDDING_API_URL`     | `https://api.jina.ai/v1/embeddings`   |
    /// | `EMBEDDING_API_KEY`     | (required)                            |
    /// | `EMBEDDING_MODEL`       | `jina-embeddings-v3`                  |
    /// | `EMBEDDING_DIMENSION`   | `1024`                                |
    /// | `WORKER_MODE`           | `full` (`full`/`ingest`/`embed`)      |
    /// | `BATCH_SIZE`            | `10`                                  |
    /// | `POP_TIMEOUT_SECS`      | `1`                                   |
    /// | `ERROR_COOLDOWN_SECS`   | `5`                                   |
    /// | `MAX_QUEUE_FAILURES`    | `10`                                  |
    /// | `STATS_INTERVAL_SECS`   | `60`                                  |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                                  |
    /// | `ALERTS_QUEUE`          | `alerts_queue`                        |
    /// | `EMBEDDING_QUEUE`       | `embedding_queue`                     |
    pub fn from_env() -> Self {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());

        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let embedding_endpoint = std::env::var("EMBEDDING_API_URL")
            .unwrap_or_else(|_| "https://api.jina.ai/v1/embeddings".into());

        let embedding_api_key =
            std::env::var("EMBEDDING_API_KEY").expect("EMBEDDING_API_KEY must be set");

        let embedding_model =
            std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "jina-embeddings-v3".into());

        let embedding_dimension: usize = std::env::var("EMBEDDING_DIMENSION")
            .unwrap_or_else(|_| "1024".into())
            .parse()
            .expect("EMBEDDING_DIMENSION must be a valid usize");

        let mode_name = std::env::var("WORKER_MODE").unwrap_or_else(|_| "full".into());
        let mode = WorkerMode::parse(&mode_name)
            .unwrap_or_else(|| panic!("WORKER_MODE must be full, ingest, or embed, got '{mode_name}'"));

        let batch_size: usize = std::env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("BATCH_SIZE must be a valid usize");

        let pop_timeout_secs: u64 = std::env::var("POP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("POP_TIMEOUT_SECS must be a valid u64");

        let error_cooldown_secs: u64 = std::env::var("ERROR_COOLDOWN_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("ERROR_COOLDOWN_SECS must be a valid u64");

        let max_queue_failures: u32 = std::env::var("MAX_QUEUE_FAILURES")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("MAX_QUEUE_FAILURES must be a valid u32");

        let stats_interval_secs: u64 = std::env::var("STATS_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("STATS_INTERVAL_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let alerts_queue =
            std::env::var("ALERTS_QUEUE").unwrap_or_else(|_| "alerts_queue".into());

        let embedding_queue =
            std::env::var("EMBEDDING_QUEUE").unwrap_or_else(|_| "embedding_queue".into());

        Self {
            redis_url,
            database_url,
            embedding_endpoint,
            embedding_api_key,
            embedding_model,
            embedding_dimension,
            mode,
            batch_size,
            pop_timeout_secs,
            error_cooldown_secs,
            max_queue_failures,
            stats_interval_secs,
            shutdown_timeout_secs,
            alerts_queue,
            embedding_queue,
        }
    }

    /// Queue client settings derived from this config.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.redis_url.clone())
    }

    /// Embedding client settings derived from this config.
    pub fn embedding_config(&self) -> EmbeddingApiConfig {
        let mut config = EmbeddingApiConfig::new(
            self.embedding_endpoint.clone(),
            self.embedding_api_key.clone(),
            self.embedding_model.clone(),
        );
        config.dimension = self.embedding_dimension;
        config
    }

    /// Coordinator settings derived from this config.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            mode: self.mode,
            batch_size: self.batch_size,
            pop_timeout: Duration::from_secs(self.pop_timeout_secs),
            error_cooldown: Duration::from_secs(self.error_cooldown_secs),
            max_queue_failures: self.max_queue_failures,
            alerts_queue: self.alerts_queue.clone(),
            embedding_queue: self.embedding_queue.clone(),
        }
    }
}
