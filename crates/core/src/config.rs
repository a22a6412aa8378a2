//! Runtime configuration read from `TASKBOARD_*` environment variables

use std::path::PathBuf;

use crate::auth::{DEFAULT_AUTH_SECRET, DEFAULT_SESSION_TTL_SECONDS};
use crate::board::DEFAULT_BOARD_COLOR;
use crate::error::Error;
use crate::Result;

pub const DEFAULT_DATA_DIR: &str = ".taskboard";

/// Where boards and accounts live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Hosted backend reached over HTTP
    Rest { url: String, anon_key: String },
    /// In-process store persisted under `data_dir`
    Memory { data_dir: PathBuf },
}

impl Backend {
    pub fn store_path(data_dir: &std::path::Path) -> PathBuf {
        data_dir.join("store.json")
    }

    pub fn accounts_path(data_dir: &std::path::Path) -> PathBuf {
        data_dir.join("accounts.json")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: Backend,
    pub default_color: String,
    pub auth_secret: String,
    pub session_ttl_seconds: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Memory {
                data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            },
            default_color: DEFAULT_BOARD_COLOR.to_string(),
            auth_secret: DEFAULT_AUTH_SECRET.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let backend = match (get("TASKBOARD_BACKEND_URL"), get("TASKBOARD_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Backend::Rest {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
            },
            (Some(_), None) => {
                return Err(Error::Validation(
                    "TASKBOARD_ANON_KEY is required with TASKBOARD_BACKEND_URL".to_string(),
                ))
            }
            _ => Backend::Memory {
                data_dir: get("TASKBOARD_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            },
        };

        let session_ttl_seconds = match get("TASKBOARD_SESSION_TTL_SECONDS") {
            Some(raw) => raw.parse::<i64>().ok().filter(|ttl| *ttl > 0).ok_or_else(|| {
                Error::Validation(format!(
                    "TASKBOARD_SESSION_TTL_SECONDS must be a positive integer, got '{}'",
                    raw
                ))
            })?,
            None => defaults.session_ttl_seconds,
        };

        Ok(Self {
            backend,
            default_color: get("TASKBOARD_DEFAULT_COLOR").unwrap_or(defaults.default_color),
            auth_secret: get("TASKBOARD_AUTH_SECRET").unwrap_or(defaults.auth_secret),
            session_ttl_seconds,
        })
    }
}
