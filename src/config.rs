use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::network::transport::{TransportConfig, TransportProfile};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
/// Env var holding the server-side master credential.
pub const MASTER_CREDENTIAL_ENV: &str = "MOMENTO_AUTH_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Origin the client fetches credentials from.
    pub origin: String,
    /// Where the token endpoint listens.
    pub bind_addr: String,
    pub cache_name: String,
    pub topic_name: String,
    pub username: String,
    pub token_lifetime_secs: u64,
    pub default_ttl_secs: u64,
    pub profile: TransportProfile,
    pub token_fetch_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub retry: RetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:3000".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            cache_name: "chat".to_string(),
            topic_name: "general".to_string(),
            username: "anonymous".to_string(),
            token_lifetime_secs: 300,
            default_ttl_secs: 60,
            profile: TransportProfile::Browser,
            token_fetch_timeout_secs: 10,
            sweep_interval_secs: 5,
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("cache_name"));
        }
        if self.topic_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("topic_name"));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingRequired("username"));
        }
        if self.origin.trim().is_empty() {
            return Err(ConfigError::MissingRequired("origin"));
        }
        if self.token_lifetime_secs == 0 {
            return Err(ConfigError::MustBePositive("token_lifetime_secs"));
        }
        if self.default_ttl_secs == 0 {
            return Err(ConfigError::MustBePositive("default_ttl_secs"));
        }
        if self.token_fetch_timeout_secs == 0 {
            return Err(ConfigError::MustBePositive("token_fetch_timeout_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::MustBePositive("sweep_interval_secs"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::MustBePositive("retry.max_attempts"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidBackoff);
        }
        self.bind_socket_addr()?;
        Ok(())
    }

    pub fn bind_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_secs)
    }

    pub fn token_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.token_fetch_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            profile: self.profile,
            default_ttl: Duration::from_secs(self.default_ttl_secs),
        }
    }
}

/// Reads the config file. A missing file yields the defaults; a file that
/// exists but cannot be read or parsed is an error.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::info!("No config at {}; using defaults", path.display());
            return Ok(AppConfig::default());
        }
        Err(err) => return Err(io_error(path, err)),
    };

    let config = serde_json::from_str(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Validates `config` and writes it as pretty JSON, creating parent dirs.
pub fn save_config(path: impl AsRef<Path>, config: &AppConfig) -> Result<(), ConfigError> {
    config.validate()?;
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
    }

    let json = serde_json::to_string_pretty(config).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    fs::write(path, json).map_err(|err| io_error(path, err))
}

fn io_error(path: &Path, err: io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Master credential from the environment; blank counts as missing.
pub fn master_credential() -> Option<String> {
    std::env::var(MASTER_CREDENTIAL_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
