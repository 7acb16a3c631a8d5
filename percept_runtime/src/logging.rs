// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Console logging setup.

use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, LoggingConfig};

/// The filter `init_logging` would install: `RUST_LOG` when set, else the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| ConfigError::Filter {
        filter: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Install a `fmt` subscriber for the process.
///
/// Returns `Ok(false)` when a global subscriber was already installed, so calling
/// this from several tests or embedders is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = env_filter(config)?;
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        debug!(level = %config.level, "percept logging initialised");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let config = LoggingConfig {
            level: "warn".to_owned(),
            ansi: false,
        };
        init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap(), "a subscriber is already installed");
    }

    #[test]
    fn bad_directive_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "percept=notalevel".to_owned(),
            ansi: false,
        };
        assert!(matches!(env_filter(&config), Err(ConfigError::Filter { .. })));
    }
}
