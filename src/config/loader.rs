//! YAML configuration loading

use std::path::Path;

use tracing::info;

use crate::config::types::BotConfig;
use crate::error::{AppError, Result};

/// Load and validate the bot configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<BotConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("cannot read config file {}: {e}", path.display()))
    })?;
    let config = load_config_from_str(&contents)?;
    info!(
        path = %path.display(),
        instruments = config.instruments.len(),
        tick_interval_secs = config.tick_interval_secs,
        "Configuration loaded"
    );
    Ok(config)
}

/// Parse and validate configuration from a YAML string.
pub fn load_config_from_str(contents: &str) -> Result<BotConfig> {
    let config: BotConfig = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Config(format!("invalid config YAML: {e}")))?;
    config.validate()?;
    Ok(config)
}
