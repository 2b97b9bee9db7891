use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::AuraConfig;

/// Loads the Aura configuration from disk with env-var overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the config path: explicit path > AURA_CONFIG env > ~/.aura/aura.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("AURA_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".aura")
            .join("aura.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> aura_core::Result<AuraConfig> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<AuraConfig>(&raw).map_err(|e| {
                aura_core::AuraError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            AuraConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(aura_core::AuraError::Config(e));
            }
        }
        Ok(config)
    }

    /// Environment variable overrides for the knobs most often tuned in
    /// tests and deployments.
    fn apply_env_overrides(mut config: AuraConfig) -> AuraConfig {
        if let Ok(level) = std::env::var("AURA_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(timeout) = std::env::var("AURA_PARAMETER_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => config.parallel.parameter_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "ignoring invalid AURA_PARAMETER_TIMEOUT_MS"),
            }
        }
        if let Ok(max) = std::env::var("AURA_MAX_CONCURRENT") {
            match max.parse() {
                Ok(n) => config.parallel.max_concurrent = n,
                Err(_) => warn!(value = %max, "ignoring invalid AURA_MAX_CONCURRENT"),
            }
        }
        config
    }
}
