//! Runtime configuration read from the environment.
//!
//! An optional `.env` in the working directory is loaded first; variables
//! already set in the process environment win over it.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

pub const ENV_API_URL: &str = "MAPLEADS_API_URL";
pub const ENV_SOCKET_URL: &str = "MAPLEADS_SOCKET_URL";
pub const ENV_SESSION_FILE: &str = "MAPLEADS_SESSION_FILE";
pub const ENV_REQUEST_TIMEOUT: &str = "MAPLEADS_REQUEST_TIMEOUT";
pub const ENV_CONNECT_TIMEOUT: &str = "MAPLEADS_CONNECT_TIMEOUT";
pub const ENV_RECONNECT_MAX_ATTEMPTS: &str = "MAPLEADS_RECONNECT_MAX_ATTEMPTS";
pub const ENV_RECONNECT_MAX_DELAY: &str = "MAPLEADS_RECONNECT_MAX_DELAY";

const DEFAULT_API_URL: &str = "http://localhost:5000";
const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid duration '{value}': {source}")]
    Duration {
        var: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("{var}: expected a non-negative integer, got '{value}'")]
    Integer { var: &'static str, value: String },

    #[error("unable to determine a data directory for the session file")]
    NoDataDir,

    #[error("failed to read .env: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

/// Backoff applied between real-time channel reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Upper bound of the wait before attempt `attempt` (1-based):
    /// `min(max_delay, base_delay * 2^(attempt - 1))`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub socket_url: String,
    pub session_file: PathBuf,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Config with defaults for everything but the endpoints.
    pub fn new(api_url: impl Into<String>, session_file: PathBuf) -> Self {
        let api_url = normalize_base_url(api_url.into());
        Self {
            socket_url: api_url.clone(),
            api_url,
            session_file,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn from_environment() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("[Config] loaded {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err.into()),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = get(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.into());
        let session_file = match get(ENV_SESSION_FILE) {
            Some(path) => PathBuf::from(path),
            None => default_session_file()?,
        };

        let mut config = Self::new(api_url, session_file);
        if let Some(socket_url) = get(ENV_SOCKET_URL) {
            config.socket_url = normalize_base_url(socket_url);
        }
        if let Some(raw) = get(ENV_REQUEST_TIMEOUT) {
            config.request_timeout = parse_duration(ENV_REQUEST_TIMEOUT, raw)?;
        }
        if let Some(raw) = get(ENV_CONNECT_TIMEOUT) {
            config.connect_timeout = parse_duration(ENV_CONNECT_TIMEOUT, raw)?;
        }
        if let Some(raw) = get(ENV_RECONNECT_MAX_ATTEMPTS) {
            config.reconnect.max_attempts = raw.parse().map_err(|_| {
                ConfigError::Integer {
                    var: ENV_RECONNECT_MAX_ATTEMPTS,
                    value: raw.clone(),
                }
            })?;
        }
        if let Some(raw) = get(ENV_RECONNECT_MAX_DELAY) {
            config.reconnect.max_delay =
                parse_duration(ENV_RECONNECT_MAX_DELAY, raw)?;
        }

        Ok(config)
    }
}

fn parse_duration(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    humantime::parse_duration(&value).map_err(|source| ConfigError::Duration {
        var,
        value,
        source,
    })
}

fn default_session_file() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("", "mapleads", "mapleads")
        .map(|dirs| dirs.data_dir().join(SESSION_FILE_NAME))
        .ok_or(ConfigError::NoDataDir)
}

/// Add a scheme when missing and drop trailing slashes so paths can be
/// appended directly. `localhost:5000` is a common input reqwest rejects.
pub fn normalize_base_url(raw: String) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme =
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };
    if with_scheme != raw {
        log::warn!(
            "[Config] Normalized base URL from '{}' to '{}'",
            raw,
            with_scheme
        );
    }
    with_scheme
}
