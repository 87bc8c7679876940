use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("parsing error: {0}")]
    ParseError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
