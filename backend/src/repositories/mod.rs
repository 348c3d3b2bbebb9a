pub mod audit_config;
pub mod audit_log;
pub mod session;
