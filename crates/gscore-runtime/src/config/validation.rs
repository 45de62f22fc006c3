//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CoreConfig, LogOutput, LoggingConfig, SessionConfig, StoreConfig, StoreKind};

/// Validates the entire configuration.
pub fn validate_config(config: &CoreConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_store_config(&config.store)?;
    validate_session_config(&config.session)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid log filter target: {target:?}"
        )));
    }

    Ok(())
}

fn validate_store_config(store: &StoreConfig) -> ConfigResult<()> {
    if store.kind == StoreKind::Json && store.path.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("store.path"));
    }
    Ok(())
}

fn validate_session_config(session: &SessionConfig) -> ConfigResult<()> {
    if session.outbound_buffer == 0 {
        return Err(ConfigError::validation(
            "Outbound buffer must be greater than 0",
        ));
    }

    if session.drain_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Drain timeout must be greater than 0",
        ));
    }

    Ok(())
}
