//! Shared configuration helpers for the voice services.
//!
//! Service configuration is layered: compiled defaults, then an optional YAML
//! file named by `<PREFIX>CONFIG`, then individual environment overrides.

use std::env;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A service configuration that can be assembled by [`load`].
pub trait ServiceConfig: DeserializeOwned + Default {
    /// Environment variable prefix, including the trailing underscore.
    const PREFIX: &'static str;

    fn apply_environment_overrides(&mut self, prefix: &str);
}

/// Build a service configuration from defaults, the optional YAML file and
/// the environment.
pub fn load<T: ServiceConfig>() -> Result<T, ConfigError> {
    let file_var = format!("{}CONFIG", T::PREFIX);
    let mut config = match env::var(&file_var) {
        Ok(path) if !path.trim().is_empty() => from_file::<T>(PathBuf::from(path))?,
        _ => T::default(),
    };
    config.apply_environment_overrides(T::PREFIX);
    Ok(config)
}

fn from_file<T: ServiceConfig>(path: PathBuf) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded config file");
    from_yaml_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

/// Parse a YAML document; an empty document yields the defaults.
pub fn from_yaml_str<T: ServiceConfig>(raw: &str) -> Result<T, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(raw)
}

/// Resolve the port for a service from an environment variable.
///
/// Falls back to the provided default when the variable is missing or cannot be
/// parsed into a `u16`.
pub fn service_port(var: &str, default: u16) -> u16 {
    env_parsed(var).unwrap_or(default)
}

/// Read a non-empty string variable.
pub fn env_string(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

pub fn env_u64(var: &str) -> Option<u64> {
    env_parsed(var)
}

fn env_parsed<V>(var: &str) -> Option<V>
where
    V: std::str::FromStr,
    V::Err: std::fmt::Display,
{
    let value = env_string(var)?;
    value
        .trim()
        .parse::<V>()
        .inspect_err(|error| {
            tracing::warn!(%var, %value, %error, "invalid numeric override, using default");
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        port: u16,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "sample".to_string(),
                port: 9000,
            }
        }
    }

    impl ServiceConfig for Sample {
        const PREFIX: &'static str = "COMMON_CONFIG_TEST_";

        fn apply_environment_overrides(&mut self, prefix: &str) {
            if let Some(name) = env_string(&format!("{prefix}NAME")) {
                self.name = name;
            }
            self.port = service_port(&format!("{prefix}PORT"), self.port);
        }
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let parsed: Sample = from_yaml_str("   \n").unwrap();
        assert_eq!(parsed, Sample::default());
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let parsed: Sample = from_yaml_str("port: 7001\n").unwrap();
        assert_eq!(parsed.port, 7001);
        assert_eq!(parsed.name, "sample");
    }

    #[test]
    fn environment_overrides_apply_after_defaults() {
        env::set_var("COMMON_CONFIG_TEST_NAME", "from-env");
        env::set_var("COMMON_CONFIG_TEST_PORT", "not-a-port");
        let config = load::<Sample>().unwrap();
        env::remove_var("COMMON_CONFIG_TEST_NAME");
        env::remove_var("COMMON_CONFIG_TEST_PORT");

        assert_eq!(config.name, "from-env");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = from_file::<Sample>(PathBuf::from("/nonexistent/voice.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
