//! Configuration module for the jobtrack sync service.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Root directory of the blob storage
    pub blob_dir: PathBuf,
    /// Base URL download links are resolved against
    pub public_url: String,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("JOBTRACK_API_PSK").ok();

        let db_path = env::var("JOBTRACK_DB_PATH")
            .unwrap_or_else(|_| "./data/jobtrack.sqlite".to_string())
            .into();

        let blob_dir = env::var("JOBTRACK_BLOB_DIR")
            .unwrap_or_else(|_| "./data/blobs".to_string())
            .into();

        let bind_addr_raw =
            env::var("JOBTRACK_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = bind_addr_raw.parse().map_err(|_| {
            AppError::Validation(format!("Invalid JOBTRACK_BIND_ADDR: {}", bind_addr_raw))
        })?;

        let public_url = env::var("JOBTRACK_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}", bind_addr_raw));

        let log_level = env::var("JOBTRACK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_psk,
            db_path,
            blob_dir,
            public_url,
            bind_addr,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "JOBTRACK_API_PSK",
        "JOBTRACK_DB_PATH",
        "JOBTRACK_BLOB_DIR",
        "JOBTRACK_PUBLIC_URL",
        "JOBTRACK_BIND_ADDR",
        "JOBTRACK_LOG_LEVEL",
    ];

    // Both cases live in one test so they never race on the process environment.
    #[test]
    fn test_config_from_env() {
        for var in VARS {
            env::remove_var(var);
        }

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/jobtrack.sqlite"));
        assert_eq!(config.blob_dir, PathBuf::from("./data/blobs"));
        assert_eq!(config.public_url, "http://127.0.0.1:8080");
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");

        env::set_var("JOBTRACK_BIND_ADDR", "not-an-address");
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        env::remove_var("JOBTRACK_BIND_ADDR");
    }
}
