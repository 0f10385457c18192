use std::time::Duration;

use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Account credentials sent in every request body
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Runtime configuration, read once from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub api_key: String,
    pub credentials: Credentials,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    MissingVar(&'static str),
    #[error("{0} is not a valid number: {1}")]
    InvalidNumber(&'static str, String),
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

impl AppConfig {
    /// Load the configuration from `API_URL`, `API_KEY`, `API_EMAIL`,
    /// `API_PASSWORD` and optional `HTTP_TIMEOUT_SECS` (default 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = match std::env::var("HTTP_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber("HTTP_TIMEOUT_SECS", raw))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(AppConfig {
            api_url: required("API_URL")?,
            api_key: required("API_KEY")?,
            credentials: Credentials {
                email: required("API_EMAIL")?,
                password: required("API_PASSWORD")?,
            },
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
