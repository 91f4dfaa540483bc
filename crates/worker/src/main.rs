//! Alert ingestion worker entry point.
//!
//! Wires the queue client, persistence store, and embedding client into
//! a [`Coordinator`], starts the stats reporter, and runs until a
//! shutdown signal arrives or the queue-failure ceiling is hit. The
//! in-flight batch drains before connections close.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_embed::EmbeddingApi;
use vigil_pipeline::{run_stats_reporter, Coordinator};
use vigil_queue::QueueClient;

mod config;

use config::WorkerConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_worker=debug,vigil_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        mode = ?config.mode,
        batch_size = config.batch_size,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = vigil_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    vigil_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    vigil_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = vigil_db::AlertStore::new(pool);

    // --- Queue ---
    let queue = Arc::new(
        QueueClient::new(config.queue_config()).expect("Invalid queue broker configuration"),
    );

    for name in [&config.alerts_queue, &config.embedding_queue] {
        queue
            .ensure_queue_shape(name)
            .await
            .expect("Failed to verify queue shape");
        match queue.depth(name).await {
            Ok(depth) => tracing::info!(queue = %name, depth, "Queue ready"),
            Err(e) => tracing::warn!(queue = %name, error = %e, "Could not read queue depth"),
        }
    }

    // --- Embedding provider ---
    let embedder = Arc::new(
        EmbeddingApi::new(config.embedding_config()).expect("Invalid embedding configuration"),
    );

    // --- Coordinator + stats reporter ---
    let coordinator = Coordinator::new(
        Arc::clone(&queue),
        store,
        Arc::clone(&embedder),
        config.coordinator_config(),
    );

    let cancel = CancellationToken::new();

    let reporter_handle = tokio::spawn(run_stats_reporter(
        coordinator.stats(),
        Duration::from_secs(config.stats_interval_secs),
        cancel.clone(),
    ));

    let mut coordinator_handle = {
        let cancel = cancel.clone();
        tokio::spawn(coordinator.run(cancel))
    };

    // --- Run until signalled or the coordinator gives up ---
    let exit_code = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, draining in-flight batch");
            cancel.cancel();

            let drain = Duration::from_secs(config.shutdown_timeout_secs);
            match tokio::time::timeout(drain, &mut coordinator_handle).await {
                Ok(Ok(Ok(()))) => 0,
                Ok(Ok(Err(e))) => {
                    tracing::error!(error = %e, "Coordinator failed during drain");
                    1
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Coordinator task panicked");
                    1
                }
                Err(_) => {
                    tracing::error!(timeout_secs = drain.as_secs(), "Drain timed out");
                    1
                }
            }
        }
        result = &mut coordinator_handle => {
            cancel.cancel();
            match result {
                Ok(Ok(())) => 0,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Coordinator gave up");
                    1
                }
                Err(e) => {
                    tracing::error!(error = %e, "Coordinator task panicked");
                    1
                }
            }
        }
    };

    let _ = reporter_handle.await;
    tracing::info!("Worker stopped");

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
