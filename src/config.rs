use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid value {value:?} for {name}")]
pub struct ConfigError {
    name: &'static str,
    value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Upper bound for every call to the chat platform.
    pub platform_timeout: Duration,
    /// How long to wait before re-reading a member's status after a
    /// promotion or demotion; the admin list upstream lags behind.
    pub reverify_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("bot_data"),
            platform_timeout: Duration::from_secs(10),
            reverify_delay: Duration::from_secs(2),
        }
    }
}

fn seconds(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError { name, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Config::default();

        let data_dir = std::env::var("BOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(default.data_dir);

        Ok(Self {
            data_dir,
            platform_timeout: seconds("PLATFORM_TIMEOUT_SECS", default.platform_timeout)?,
            reverify_delay: seconds("REVERIFY_DELAY_SECS", default.reverify_delay)?,
        })
    }
}
