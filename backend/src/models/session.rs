//! Models describing a tracked login session and its lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// Database representation of one login period for a user.
pub struct Session {
    /// Unique identifier for this session row.
    #[schema(value_type = String)]
    pub id: SessionId,
    /// User the session belongs to.
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Opaque transport session identifier; several rows may share it over time.
    pub session_sid: String,
    /// When the session was opened.
    pub login_time: DateTime<Utc>,
    /// When the session was closed, if it has been.
    pub logout_time: Option<DateTime<Utc>>,
    /// Most recent observed activity (request, heartbeat, login).
    pub last_activity: DateTime<Utc>,
    /// Number of heartbeats received while active.
    pub heartbeat_count: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: DeviceType,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub status: SessionStatus,
    /// True when the session was closed because the browser went silent
    /// rather than through an explicit logout.
    pub browser_closed: bool,
    /// Diagnostic note recorded when the session was created or closed
    /// through a fallback path.
    pub error_message: Option<String>,
}

impl Session {
    /// Builds a fresh active session starting now.
    pub fn new(user_id: UserId, session_sid: String, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            session_sid,
            login_time: now,
            logout_time: None,
            last_activity: now,
            heartbeat_count: 0,
            ip_address: None,
            user_agent: None,
            device_type: DeviceType::Unknown,
            browser: None,
            os: None,
            country: None,
            city: None,
            status: SessionStatus::Active,
            browser_closed: false,
            error_message: None,
        }
    }

    /// Session duration in fractional hours. Zero while the session is
    /// still open.
    pub fn duration_hours(&self) -> f64 {
        match self.logout_time {
            Some(logout) => {
                let seconds = (logout - self.login_time).num_seconds();
                if seconds <= 0 {
                    0.0
                } else {
                    seconds as f64 / 3600.0
                }
            }
            None => 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Active)
    }
}

/// Client metadata captured from the transport layer at login time and
/// written onto the session row the event resolves to.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: DeviceType,
    pub country: Option<String>,
    pub city: Option<String>,
}

impl SessionContext {
    pub fn apply_to(&self, session: &mut Session) {
        session.ip_address = self.ip_address.clone();
        session.user_agent = self.user_agent.clone();
        session.browser = self.browser.clone();
        session.os = self.os.clone();
        session.device_type = self.device_type;
        session.country = self.country.clone();
        session.city = self.city.clone();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
/// Lifecycle state of a session row. Every state except `Active` is terminal.
pub enum SessionStatus {
    #[default]
    Active,
    /// Closed through an explicit logout.
    LoggedOut,
    /// Closed by the sweeper after exceeding the configured maximum age.
    Expired,
    /// Superseded by a newer login reusing the same transport identifier.
    Replaced,
    /// Closed administratively or as a side effect of another login.
    ForcedLogout,
    /// Recorded for a failed or anomalous login attempt.
    Error,
}

impl SessionStatus {
    /// Returns the canonical snake_case representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::LoggedOut => "logged_out",
            SessionStatus::Expired => "expired",
            SessionStatus::Replaced => "replaced",
            SessionStatus::ForcedLogout => "forced_logout",
            SessionStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl Serialize for SessionStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "active" => Ok(SessionStatus::Active),
            "logged_out" => Ok(SessionStatus::LoggedOut),
            "expired" => Ok(SessionStatus::Expired),
            "replaced" => Ok(SessionStatus::Replaced),
            "forced_logout" => Ok(SessionStatus::ForcedLogout),
            "error" => Ok(SessionStatus::Error),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &[
                    "active",
                    "logged_out",
                    "expired",
                    "replaced",
                    "forced_logout",
                    "error",
                ],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
/// Coarse device category derived from the user agent string.
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Unknown => "unknown",
        }
    }
}

impl Serialize for DeviceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "desktop" => Ok(DeviceType::Desktop),
            "mobile" => Ok(DeviceType::Mobile),
            "tablet" => Ok(DeviceType::Tablet),
            "unknown" => Ok(DeviceType::Unknown),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["desktop", "mobile", "tablet", "unknown"],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn duration_is_zero_while_active() {
        let session = Session::new(UserId::new(), "sid-1".into(), Utc::now());
        assert_eq!(session.duration_hours(), 0.0);
    }

    #[test]
    fn duration_reflects_logout_time() {
        let now = Utc::now();
        let mut session = Session::new(UserId::new(), "sid-1".into(), now);
        session.logout_time = Some(now + Duration::minutes(90));
        session.status = SessionStatus::LoggedOut;
        assert!((session.duration_hours() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn duration_never_negative() {
        let now = Utc::now();
        let mut session = Session::new(UserId::new(), "sid-1".into(), now);
        session.logout_time = Some(now - Duration::minutes(5));
        assert_eq!(session.duration_hours(), 0.0);
    }

    #[test]
    fn status_round_trips_through_serde() {
        for status in [
            SessionStatus::Active,
            SessionStatus::LoggedOut,
            SessionStatus::Expired,
            SessionStatus::Replaced,
            SessionStatus::ForcedLogout,
            SessionStatus::Error,
        ] {
            let json = serde_json::to_string(&status).expect("serialize");
            let back: SessionStatus = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(status, back);
        }
    }

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Replaced.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
    }
}
