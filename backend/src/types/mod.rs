pub mod id;

pub use id::{AuditConfigId, AuditLogId, SessionId, UserId};
