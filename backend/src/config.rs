use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Number of active sessions examined per batch during a sweep pass.
    pub sweep_batch_size: i64,
    /// Enables outbound IP geolocation lookups on login.
    pub geoip_enabled: bool,
    /// Optional path to a JSON file describing model fields for readable
    /// change formatting.
    pub schema_catalog_path: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/sessiontrail".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let sweep_batch_size = env::var("SWEEP_BATCH_SIZE")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .unwrap_or(500);

        let geoip_enabled = env::var("GEOIP_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let schema_catalog_path = env::var("SCHEMA_CATALOG_PATH").ok();

        Ok(Config {
            database_url,
            bind_addr,
            sweep_batch_size,
            geoip_enabled,
            schema_catalog_path,
        })
    }
}
