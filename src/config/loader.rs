//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: BridgeConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [chain]
            rpc_url = "http://geth:8545"
            chain_id = 1337

            [filters]
            min_wait_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.rpc_url, "http://geth:8545");
        assert_eq!(config.chain.chain_id, 1337);
        assert_eq!(config.filters.min_wait_ms, 250);
        // Untouched sections keep their defaults.
        assert_eq!(config.filters.max_wait_ms, 4000);
        assert_eq!(config.listener.bind_address, "0.0.0.0:31337");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = load_config(Path::new("/nonexistent/bridge.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
