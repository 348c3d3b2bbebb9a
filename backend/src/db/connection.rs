use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub type DbPool = Arc<PgPool>;

/// Shared Postgres pool for the API server and the sweep binary. The sweep
/// closes sessions in batches while capture traffic keeps writing, so the
/// pool holds a few spare connections and fails fast when saturated.
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect(database_url)
        .await?;
    Ok(Arc::new(pool))
}
