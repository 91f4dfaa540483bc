//! Postgres persistence layer for alert records.
//!
//! Pool construction, migrations, `models/` row structs, `repositories/`
//! query methods, and the [`store::AlertStore`] client that the pipeline
//! writes through.

pub mod models;
pub mod repositories;
pub mod store;

pub use store::{AlertStore, PersistenceError};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a connection pool for the given database URL.
///
/// The pool transparently replaces dead connections on acquire, so it
/// doubles as the Disconnected -> Connecting -> Connected machine for
/// the persistence layer.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Apply pending migrations from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
