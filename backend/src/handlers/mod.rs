pub mod capture;
pub mod config;
pub mod sessions;
pub mod stats;
