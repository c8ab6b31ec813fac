//! Schema migrations
//!
//! The SQL files under `crates/infra_db/migrations` are embedded at compile
//! time and applied in order. Applied versions are tracked by SQLx in
//! `_sqlx_migrations`, so running twice is a no-op.

use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::info;

use crate::error::DatabaseError;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Applies all pending migrations
///
/// # Errors
///
/// Returns `DatabaseError::MigrationFailed` if a migration fails or the
/// recorded checksum of an applied migration no longer matches its file
pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    info!(migrations = MIGRATOR.iter().count(), "Applying receivables schema migrations");
    MIGRATOR.run(pool).await?;
    info!("Schema is up to date");
    Ok(())
}

/// Versions of the embedded migrations, oldest first
pub fn embedded_versions() -> Vec<i64> {
    MIGRATOR.iter().map(|m| m.version).collect()
}
