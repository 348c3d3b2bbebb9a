//! Periodic maintenance over active sessions.
//!
//! A sweep walks the active set in keyset batches and applies three rules:
//! sessions past the maximum age expire, quiet sessions superseded by a newer
//! login close, and sessions whose browser went silent close as browser-gone.
//! Classification is pure so the rules are testable in isolation.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::db::connection::DbPool;
use crate::models::session::{Session, SessionStatus};
use crate::repositories::session as session_repo;
use crate::services::gate::AuditGate;
use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Past the configured maximum session age.
    Expire,
    /// Heartbeats stopped for the silence window; browser is gone.
    CloseBrowser,
    /// Quiet and the user has a newer login elsewhere.
    CloseSuperseded,
    Keep,
}

/// Classifies one active session. `newest_login` is the most recent active
/// login time for the same user, used to detect superseded sessions.
pub fn classify(
    session: &Session,
    now: DateTime<Utc>,
    session_timeout: Duration,
    inactive_close: Duration,
    heartbeat_silence: Duration,
    newest_login: Option<DateTime<Utc>>,
) -> SweepAction {
    if now - session.login_time >= session_timeout {
        return SweepAction::Expire;
    }

    let idle = now - session.last_activity;

    if idle >= inactive_close {
        let superseded = newest_login
            .map(|newest| newest > session.login_time)
            .unwrap_or(false);
        if superseded {
            return SweepAction::CloseSuperseded;
        }
    }

    // Silence only means a closed browser for sessions that were
    // heartbeating in the first place.
    if idle >= heartbeat_silence && session.heartbeat_count > 0 {
        return SweepAction::CloseBrowser;
    }

    SweepAction::Keep
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub examined: u64,
    pub expired: u64,
    pub browser_closed: u64,
    pub superseded: u64,
}

impl SweepReport {
    pub fn closed(&self) -> u64 {
        self.expired + self.browser_closed + self.superseded
    }
}

#[derive(Clone)]
pub struct Sweeper {
    pool: DbPool,
    gate: AuditGate,
    batch_size: i64,
}

impl Sweeper {
    pub fn new(pool: DbPool, gate: AuditGate, batch_size: i64) -> Self {
        Self {
            pool,
            gate,
            batch_size: batch_size.max(1),
        }
    }

    /// One full pass over the active set.
    pub async fn sweep(&self) -> Result<SweepReport, sqlx::Error> {
        let now = Utc::now();
        let settings = self.gate.settings().await;
        let newest_logins: HashMap<UserId, DateTime<Utc>> =
            session_repo::newest_active_login_per_user(&self.pool).await?;

        let mut report = SweepReport::default();
        let mut after: Option<SessionId> = None;

        loop {
            let batch = session_repo::list_active_batch(&self.pool, after, self.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            after = batch.last().map(|s| s.id);
            report.examined += batch.len() as u64;

            let mut expire = Vec::new();
            let mut browser_gone = Vec::new();
            let mut superseded = Vec::new();

            for session in &batch {
                let action = classify(
                    session,
                    now,
                    settings.session_timeout(),
                    settings.inactive_close(),
                    settings.heartbeat_silence(),
                    newest_logins.get(&session.user_id).copied(),
                );
                match action {
                    SweepAction::Expire => expire.push(session.id),
                    SweepAction::CloseBrowser => browser_gone.push(session.id),
                    SweepAction::CloseSuperseded => superseded.push(session.id),
                    SweepAction::Keep => {}
                }
            }

            report.expired += session_repo::close_sessions(
                &self.pool,
                &expire,
                SessionStatus::Expired,
                false,
                Some("exceeded maximum session age"),
                now,
            )
            .await?;
            report.browser_closed += session_repo::close_sessions(
                &self.pool,
                &browser_gone,
                SessionStatus::LoggedOut,
                true,
                Some("no heartbeat within the silence window"),
                now,
            )
            .await?;
            report.superseded += session_repo::close_sessions(
                &self.pool,
                &superseded,
                SessionStatus::LoggedOut,
                true,
                Some("superseded by a newer login"),
                now,
            )
            .await?;
        }

        tracing::info!(
            examined = report.examined,
            expired = report.expired,
            browser_closed = report.browser_closed,
            superseded = report.superseded,
            "session sweep finished"
        );

        Ok(report)
    }
}
