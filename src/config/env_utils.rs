//! Environment variable loading with type conversion and defaults.

use std::env;
use std::str::FromStr;

use super::{ConfigError, ConfigResult};

/// Environment variable loader with type conversion and default handling.
pub struct EnvLoader;

impl EnvLoader {
    /// Load an environment variable, falling back to `default` if unset.
    pub fn load_with_default<T>(key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::ParseError(format!("{key}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Load a required environment variable.
    #[allow(dead_code)]
    pub fn load_required<T>(key: &str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = env::var(key).map_err(|_| ConfigError::EnvVarNotFound(key.to_string()))?;
        value
            .parse()
            .map_err(|e| ConfigError::ParseError(format!("{key}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_var_falls_back_to_default() {
        let value: u32 = EnvLoader::load_with_default("ENGAGEMENT_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
