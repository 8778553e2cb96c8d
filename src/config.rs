use crate::error::{ArgusError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE: &str = "DATA/platform.db";
pub const DEFAULT_DATA_DIR: &str = "DATA";
pub const DEFAULT_IMAGE_DIR: &str = "imgs";
pub const DEFAULT_SESSION_HOURS: u64 = 24;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Runtime settings of the dashboard server
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind: SocketAddr,
    /// SQLite database file
    pub database: PathBuf,
    /// Directory holding the seed CSV files
    pub data_dir: PathBuf,
    /// Directory holding the logo and background images, served under `/imgs`
    pub image_dir: PathBuf,
    pub session_ttl: Duration,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database: PathBuf::from(DEFAULT_DATABASE),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_HOURS * 60 * 60),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Read the configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first when present;
    /// variables already set in the environment win over it.
    pub fn from_env() -> Result<Self> {
        // a missing .env is the normal case
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    ///
    /// Unset and blank variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind = var("ARGUS_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ArgusError::Config(format!("ARGUS_BIND: {}", e)))?;

        let session_hours = match var("ARGUS_SESSION_HOURS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|e| ArgusError::Config(format!("ARGUS_SESSION_HOURS: {}", e)))?,
            None => DEFAULT_SESSION_HOURS,
        };
        if session_hours == 0 {
            return Err(ArgusError::Config(
                "ARGUS_SESSION_HOURS must be at least 1".into(),
            ));
        }

        Ok(Config {
            bind,
            database: var("ARGUS_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            data_dir: var("ARGUS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            image_dir: var("ARGUS_IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
            session_ttl: Duration::from_secs(session_hours * 60 * 60),
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: var("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        })
    }
}
