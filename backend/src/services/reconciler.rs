//! Session reconciliation on login and logout.
//!
//! Login is a single idempotent entry point: given whatever rows currently
//! exist for the transport identifier and the user, it computes a plan
//! (reuse, reactivate, or create, plus the set of rows to close) and applies
//! it. Planning is a pure function so the decision table is testable without
//! a database.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::connection::DbPool;
use crate::models::session::{Session, SessionContext, SessionStatus};
use crate::repositories::session as session_repo;
use crate::services::gate::AuditGate;
use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginAction {
    /// Refresh activity on a still-active row holding this identifier.
    Reuse(SessionId),
    /// Reopen a row that was closed moments ago.
    Reactivate(SessionId),
    CreateNew,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginPlan {
    pub action: LoginAction,
    /// Active rows holding the same identifier that were not chosen.
    pub replace: Vec<SessionId>,
    /// The user's other active rows that exceeded the maximum session age.
    pub expire: Vec<SessionId>,
    /// The user's remaining active rows under other identifiers. A login
    /// ends every concurrent session, so all of them close as superseded.
    pub close_superseded: Vec<SessionId>,
}

/// Human-readable record of the decisions taken during one reconciliation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileTrace {
    pub steps: Vec<String>,
}

impl ReconcileTrace {
    fn push(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub session: Session,
    pub created: bool,
    pub trace: ReconcileTrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutStrategy {
    /// An active row held the exact identifier.
    ExactSid,
    /// No identifier match; the user's active rows were closed instead.
    UserActive,
    /// Only terminal rows found within the recent-login window; nothing to do.
    UserRecent,
    /// Nothing matched at all; a pre-closed row was created for the record.
    Emergency,
    /// No identifier or user supplied, or nothing to attribute the logout to.
    NoMatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutOutcome {
    pub strategy: LogoutStrategy,
    pub closed: Vec<SessionId>,
}

/// Closure note recording which lookup attributed the logout, appended to
/// the caller-supplied reason when one was given.
fn closure_note(reason: Option<&str>, matched_via: &str) -> String {
    match reason {
        Some(reason) => format!("{} (found via {})", reason, matched_via),
        None => format!("logout found via {}", matched_via),
    }
}

/// Computes the login plan from the current state of the store.
///
/// `same_sid` holds every row ever created for the identifier (newest first);
/// `other_active` holds the user's active rows under other identifiers.
pub fn plan_login(
    user_id: UserId,
    same_sid: &[Session],
    other_active: &[Session],
    now: DateTime<Utc>,
    reuse_grace: Duration,
    session_timeout: Duration,
) -> LoginPlan {
    let mut replace = Vec::new();

    // Prefer a still-active row owned by this user.
    let chosen_active = same_sid
        .iter()
        .find(|s| s.is_active() && s.user_id == user_id);

    let action = if let Some(session) = chosen_active {
        LoginAction::Reuse(session.id)
    } else {
        // A row this user closed within the grace window is reopened rather
        // than duplicated; refreshes and quick re-logins land here.
        let reactivatable = same_sid.iter().find(|s| {
            s.user_id == user_id
                && s.status.is_terminal()
                && s.status != SessionStatus::Error
                && s.logout_time
                    .map(|t| now - t <= reuse_grace)
                    .unwrap_or(false)
        });
        match reactivatable {
            Some(session) => LoginAction::Reactivate(session.id),
            None => LoginAction::CreateNew,
        }
    };

    // Any other active row still holding this identifier is stale. Terminal
    // rows are left untouched so repeated logins stay idempotent.
    for session in same_sid.iter().filter(|s| s.is_active()) {
        let chosen = matches!(action, LoginAction::Reuse(id) if id == session.id);
        if !chosen {
            replace.push(session.id);
        }
    }

    // The user gets exactly one live session. Every active row under a
    // different identifier closes now: over-age rows expire, the rest are
    // superseded by this login.
    let mut expire = Vec::new();
    let mut close_superseded = Vec::new();
    for session in other_active {
        if now - session.login_time >= session_timeout {
            expire.push(session.id);
        } else {
            close_superseded.push(session.id);
        }
    }

    LoginPlan {
        action,
        replace,
        expire,
        close_superseded,
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pool: DbPool,
    gate: AuditGate,
}

impl Reconciler {
    pub fn new(pool: DbPool, gate: AuditGate) -> Self {
        Self { pool, gate }
    }

    /// Reconciles the store with a login event and returns the session that
    /// now represents it. Safe to call repeatedly with the same identifier.
    pub async fn login(
        &self,
        user_id: UserId,
        session_sid: &str,
        context: SessionContext,
    ) -> Result<LoginOutcome, sqlx::Error> {
        let now = Utc::now();
        let settings = self.gate.settings().await;
        let mut trace = ReconcileTrace::default();

        let same_sid = session_repo::find_sessions_by_sid(&self.pool, session_sid).await?;
        let other_active: Vec<Session> = session_repo::find_active_for_user(&self.pool, user_id)
            .await?
            .into_iter()
            .filter(|s| s.session_sid != session_sid)
            .collect();
        trace.push(format!(
            "found {} rows for identifier, {} other active rows for user",
            same_sid.len(),
            other_active.len()
        ));

        let plan = plan_login(
            user_id,
            &same_sid,
            &other_active,
            now,
            settings.reuse_grace(),
            settings.session_timeout(),
        );

        if !plan.replace.is_empty() {
            let n = session_repo::close_sessions(
                &self.pool,
                &plan.replace,
                SessionStatus::Replaced,
                false,
                Some("replaced by new login with same identifier"),
                now,
            )
            .await?;
            trace.push(format!("replaced {} stale rows holding the identifier", n));
        }
        if !plan.expire.is_empty() {
            let n = session_repo::close_sessions(
                &self.pool,
                &plan.expire,
                SessionStatus::Expired,
                false,
                Some("exceeded maximum session age at login"),
                now,
            )
            .await?;
            trace.push(format!("expired {} over-age rows", n));
        }
        if !plan.close_superseded.is_empty() {
            let n = session_repo::close_sessions(
                &self.pool,
                &plan.close_superseded,
                SessionStatus::LoggedOut,
                true,
                Some("superseded by a newer login"),
                now,
            )
            .await?;
            trace.push(format!("closed {} superseded rows", n));
        }

        let (session_id, created) = match plan.action {
            LoginAction::Reuse(id) => {
                session_repo::reopen_session(&self.pool, id, &context, now).await?;
                trace.push(format!("reused active session {}", id));
                (id, false)
            }
            LoginAction::Reactivate(id) => {
                session_repo::reopen_session(&self.pool, id, &context, now).await?;
                trace.push(format!("reactivated recently closed session {}", id));
                (id, false)
            }
            LoginAction::CreateNew => {
                let mut session = Session::new(user_id, session_sid.to_string(), now);
                context.apply_to(&mut session);
                session_repo::insert_session(&self.pool, &session).await?;
                trace.push(format!("created session {}", session.id));
                (session.id, true)
            }
        };

        let session = session_repo::fetch_session(&self.pool, session_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            created,
            "login reconciled"
        );

        Ok(LoginOutcome {
            session,
            created,
            trace,
        })
    }

    /// Attributes a logout to a session, searching progressively wider.
    /// Already-closed sessions make this a no-op, never an error.
    pub async fn logout(
        &self,
        session_sid: Option<&str>,
        user_id: Option<UserId>,
        reason: Option<&str>,
    ) -> Result<LogoutOutcome, sqlx::Error> {
        let now = Utc::now();
        let settings = self.gate.settings().await;

        // Strategy 1: the exact identifier still has an active row. Terminal
        // rows under the identifier do not count as a match; the search
        // widens to the user so no live session slips through.
        if let Some(sid) = session_sid {
            let rows = session_repo::find_sessions_by_sid(&self.pool, sid).await?;
            if let Some(active) = rows.iter().find(|s| s.is_active()) {
                session_repo::close_sessions(
                    &self.pool,
                    &[active.id],
                    SessionStatus::LoggedOut,
                    false,
                    Some(&closure_note(reason, "exact identifier")),
                    now,
                )
                .await?;
                return Ok(LogoutOutcome {
                    strategy: LogoutStrategy::ExactSid,
                    closed: vec![active.id],
                });
            }
        }

        let Some(user_id) = user_id else {
            return Ok(LogoutOutcome {
                strategy: LogoutStrategy::NoMatch,
                closed: Vec::new(),
            });
        };

        // Strategy 2: close the user's active rows.
        let active = session_repo::find_active_for_user(&self.pool, user_id).await?;
        if !active.is_empty() {
            let ids: Vec<SessionId> = active.iter().map(|s| s.id).collect();
            session_repo::close_sessions(
                &self.pool,
                &ids,
                SessionStatus::LoggedOut,
                false,
                Some(&closure_note(reason, "user lookup")),
                now,
            )
            .await?;
            return Ok(LogoutOutcome {
                strategy: LogoutStrategy::UserActive,
                closed: ids,
            });
        }

        // Strategy 3: the user logged in recently but every row is already
        // terminal; treat the logout as satisfied.
        let recent_cutoff = now - settings.logout_recent_window();
        let recent = session_repo::sessions_for_user(&self.pool, user_id, 20).await?;
        if recent.iter().any(|s| s.login_time >= recent_cutoff) {
            return Ok(LogoutOutcome {
                strategy: LogoutStrategy::UserRecent,
                closed: Vec::new(),
            });
        }

        // Strategy 4: nothing to attribute the logout to; record a pre-closed
        // row so the event is not lost.
        let mut session = Session::new(
            user_id,
            session_sid.map(str::to_string).unwrap_or_else(|| {
                format!("logout-{}", SessionId::new())
            }),
            now,
        );
        session.status = SessionStatus::LoggedOut;
        session.logout_time = Some(now);
        session.error_message = Some("emergency session created at logout".to_string());
        session_repo::insert_session(&self.pool, &session).await?;

        tracing::warn!(user_id = %user_id, session_id = %session.id, "logout had no matching session");

        Ok(LogoutOutcome {
            strategy: LogoutStrategy::Emergency,
            closed: vec![session.id],
        })
    }

    /// Records a failed or anomalous login attempt as a terminal error row.
    pub async fn record_failed_login(
        &self,
        user_id: UserId,
        session_sid: Option<&str>,
        reason: &str,
        context: SessionContext,
    ) -> Result<Session, sqlx::Error> {
        let now = Utc::now();
        let mut session = Session::new(
            user_id,
            session_sid
                .map(str::to_string)
                .unwrap_or_else(|| format!("failed-{}", SessionId::new())),
            now,
        );
        session.status = SessionStatus::Error;
        session.logout_time = Some(now);
        session.error_message = Some(reason.to_string());
        context.apply_to(&mut session);
        session_repo::insert_session(&self.pool, &session).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: UserId, sid: &str, now: DateTime<Utc>) -> Session {
        Session::new(user_id, sid.to_string(), now)
    }

    fn grace() -> Duration {
        Duration::minutes(5)
    }

    fn timeout() -> Duration {
        Duration::hours(24)
    }

    #[test]
    fn fresh_login_creates_new_session() {
        let now = Utc::now();
        let plan = plan_login(UserId::new(), &[], &[], now, grace(), timeout());
        assert_eq!(plan.action, LoginAction::CreateNew);
        assert!(plan.replace.is_empty());
        assert!(plan.expire.is_empty());
        assert!(plan.close_superseded.is_empty());
    }

    #[test]
    fn repeated_login_reuses_active_row() {
        let now = Utc::now();
        let user = UserId::new();
        let existing = session(user, "sid-1", now - Duration::minutes(10));
        let plan = plan_login(user, &[existing.clone()], &[], now, grace(), timeout());
        assert_eq!(plan.action, LoginAction::Reuse(existing.id));
        assert!(plan.replace.is_empty());
    }

    #[test]
    fn quick_relogin_reactivates_just_closed_row() {
        let now = Utc::now();
        let user = UserId::new();
        let mut closed = session(user, "sid-1", now - Duration::hours(1));
        closed.status = SessionStatus::LoggedOut;
        closed.logout_time = Some(now - Duration::minutes(2));
        let plan = plan_login(user, &[closed.clone()], &[], now, grace(), timeout());
        assert_eq!(plan.action, LoginAction::Reactivate(closed.id));
    }

    #[test]
    fn relogin_after_grace_creates_new_row() {
        let now = Utc::now();
        let user = UserId::new();
        let mut closed = session(user, "sid-1", now - Duration::hours(1));
        closed.status = SessionStatus::LoggedOut;
        closed.logout_time = Some(now - Duration::minutes(20));
        let plan = plan_login(user, &[closed], &[], now, grace(), timeout());
        assert_eq!(plan.action, LoginAction::CreateNew);
    }

    #[test]
    fn error_rows_are_never_reactivated() {
        let now = Utc::now();
        let user = UserId::new();
        let mut failed = session(user, "sid-1", now - Duration::minutes(3));
        failed.status = SessionStatus::Error;
        failed.logout_time = Some(now - Duration::minutes(3));
        let plan = plan_login(user, &[failed], &[], now, grace(), timeout());
        assert_eq!(plan.action, LoginAction::CreateNew);
    }

    #[test]
    fn other_users_active_row_on_same_identifier_is_replaced() {
        let now = Utc::now();
        let user = UserId::new();
        let foreign = session(UserId::new(), "sid-1", now - Duration::hours(2));
        let plan = plan_login(user, &[foreign.clone()], &[], now, grace(), timeout());
        assert_eq!(plan.action, LoginAction::CreateNew);
        assert_eq!(plan.replace, vec![foreign.id]);
    }

    #[test]
    fn duplicate_active_rows_keep_one_and_replace_rest() {
        let now = Utc::now();
        let user = UserId::new();
        let newest = session(user, "sid-1", now - Duration::minutes(5));
        let older = session(user, "sid-1", now - Duration::hours(3));
        let plan = plan_login(
            user,
            &[newest.clone(), older.clone()],
            &[],
            now,
            grace(),
            timeout(),
        );
        assert_eq!(plan.action, LoginAction::Reuse(newest.id));
        assert_eq!(plan.replace, vec![older.id]);
    }

    #[test]
    fn terminal_rows_are_left_untouched() {
        let now = Utc::now();
        let user = UserId::new();
        let mut replaced = session(user, "sid-1", now - Duration::hours(5));
        replaced.status = SessionStatus::Replaced;
        replaced.logout_time = Some(now - Duration::hours(4));
        let plan = plan_login(user, &[replaced], &[], now, grace(), timeout());
        assert_eq!(plan.action, LoginAction::CreateNew);
        assert!(plan.replace.is_empty());
    }

    #[test]
    fn over_age_sessions_expire_at_login() {
        let now = Utc::now();
        let user = UserId::new();
        let mut old = session(user, "sid-old", now - Duration::hours(25));
        old.last_activity = now - Duration::minutes(1);
        let plan = plan_login(user, &[], &[old.clone()], now, grace(), timeout());
        assert_eq!(plan.expire, vec![old.id]);
        assert!(plan.close_superseded.is_empty());
    }

    #[test]
    fn every_other_active_session_closes_at_login() {
        // Recent activity does not spare a concurrent session; only the row
        // serving this login survives.
        let now = Utc::now();
        let user = UserId::new();
        let mut quiet = session(user, "sid-old", now - Duration::hours(2));
        quiet.last_activity = now - Duration::minutes(45);
        let mut busy = session(user, "sid-busy", now - Duration::minutes(10));
        busy.last_activity = now - Duration::minutes(1);
        let plan = plan_login(
            user,
            &[],
            &[quiet.clone(), busy.clone()],
            now,
            grace(),
            timeout(),
        );
        assert_eq!(plan.close_superseded, vec![quiet.id, busy.id]);
        assert!(plan.expire.is_empty());
    }

    #[test]
    fn concurrent_sessions_split_between_expire_and_supersede() {
        let now = Utc::now();
        let user = UserId::new();
        let mut over_age = session(user, "sid-old", now - Duration::hours(30));
        over_age.last_activity = now - Duration::minutes(1);
        let fresh = session(user, "sid-fresh", now - Duration::minutes(10));
        let plan = plan_login(
            user,
            &[],
            &[over_age.clone(), fresh.clone()],
            now,
            grace(),
            timeout(),
        );
        assert_eq!(plan.expire, vec![over_age.id]);
        assert_eq!(plan.close_superseded, vec![fresh.id]);
    }

    #[test]
    fn plan_is_stable_when_reapplied() {
        // After the plan is applied, replanning with the surviving state
        // must choose reuse and touch nothing else.
        let now = Utc::now();
        let user = UserId::new();
        let kept = session(user, "sid-1", now - Duration::minutes(1));
        let plan = plan_login(user, &[kept.clone()], &[], now, grace(), timeout());
        assert_eq!(plan.action, LoginAction::Reuse(kept.id));
        assert!(plan.replace.is_empty());
        assert!(plan.expire.is_empty());
        assert!(plan.close_superseded.is_empty());
    }

    #[test]
    fn closure_note_keeps_caller_reason() {
        assert_eq!(
            closure_note(Some("user logout via UI"), "exact identifier"),
            "user logout via UI (found via exact identifier)"
        );
        assert_eq!(closure_note(None, "user lookup"), "logout found via user lookup");
    }
}
