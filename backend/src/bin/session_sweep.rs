//! Scheduled maintenance: sweeps active sessions, applies retention to old
//! rows, and vacuums the touched tables. Intended to run from cron.

use chrono::{Duration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessiontrail_backend::{
    config::Config,
    db::connection::create_pool,
    repositories::{audit_log, session},
    services::gate::AuditGate,
    services::sweeper::Sweeper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_sweep=info,sessiontrail_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;
    let gate = AuditGate::new(pool.clone());

    let sweeper = Sweeper::new(pool.clone(), gate.clone(), config.sweep_batch_size);
    let report = sweeper.sweep().await?;
    if report.closed() > 0 {
        tracing::info!(
            expired = report.expired,
            browser_closed = report.browser_closed,
            superseded = report.superseded,
            "Closed {} sessions",
            report.closed()
        );
    }

    let settings = gate.settings().await;
    if settings.auto_cleanup_days > 0 {
        let cutoff = Utc::now() - Duration::days(settings.auto_cleanup_days as i64);

        let deleted_logs = audit_log::delete_logs_before(&pool, cutoff).await?;
        if deleted_logs > 0 {
            tracing::info!("Deleted {} audit log entries past retention", deleted_logs);
        }

        let deleted_sessions = session::delete_sessions_before(&pool, cutoff).await?;
        if deleted_sessions > 0 {
            tracing::info!("Deleted {} terminal sessions past retention", deleted_sessions);
        }
    }

    sqlx::query("VACUUM (ANALYZE) audit_sessions")
        .execute(&*pool)
        .await?;

    sqlx::query("VACUUM (ANALYZE) audit_log_entries")
        .execute(&*pool)
        .await?;

    Ok(())
}
