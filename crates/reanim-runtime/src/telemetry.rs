//! Logging setup

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

use crate::LogConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Global subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `config.level`. Fails instead of panicking when a
/// subscriber is already set, so hosts and tests can call it freely.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
            filter: config.level.clone(),
            reason: e.to_string(),
        })?,
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LogConfig {
            level: "reanim=notalevel".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_second_install_fails() {
        let config = LogConfig::default();
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
