//! Configuration Loader
//!
//! Loads and merges gateway configuration from the built-in defaults and the
//! file system, then applies environment overrides once.

use crate::config::provider::{GatewayConfig, ProviderConfig, RoutingConfig};
use crate::error::{GatewayError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variables that switch isolated mode on
const ISOLATED_MODE_ENVS: [&str; 2] = ["SIDE_ISOLATED_MODE", "SIDE_AIRGAP"];

/// One configuration layer as found on disk
#[derive(Debug, Default, Deserialize)]
struct ConfigLayer {
    #[serde(default)]
    providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    routing: Option<RoutingConfig>,
}

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    config: GatewayConfig,
}

impl ConfigLoader {
    /// Load built-ins, then every default path that exists
    pub fn new() -> Result<Self> {
        let mut loader = Self::empty();
        loader.load_builtin_defaults()?;
        loader.load_from_default_paths()?;
        loader.apply_env_overrides();
        Ok(loader)
    }

    /// Load built-ins, then one specific file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self::empty();
        loader.load_builtin_defaults()?;
        loader.load_from_file(path)?;
        loader.apply_env_overrides();
        Ok(loader)
    }

    fn empty() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    fn load_builtin_defaults(&mut self) -> Result<()> {
        let defaults = include_str!("../../providers.json");
        let layer: ConfigLayer = serde_json::from_str(defaults).map_err(|e| {
            GatewayError::Config(format!("Failed to parse built-in providers.json: {}", e))
        })?;

        self.merge_layer(layer);
        Ok(())
    }

    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                self.load_from_file(&path)?;
            }
        }
        Ok(())
    }

    /// Config paths in increasing precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".sidegate").join("config.json"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sidegate").join("config.json"));
        }

        paths.push(PathBuf::from("sidegate.json"));

        if let Ok(custom_path) = std::env::var("SIDEGATE_CONFIG") {
            paths.push(PathBuf::from(custom_path));
        }

        paths
    }

    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let layer: ConfigLayer = serde_json::from_str(&content).map_err(|e| {
            GatewayError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), providers = layer.providers.len(), "loaded config layer");
        self.merge_layer(layer);
        Ok(())
    }

    /// Later layers override providers by name and replace routing wholesale
    fn merge_layer(&mut self, layer: ConfigLayer) {
        self.config.providers.extend(layer.providers);

        if let Some(routing) = layer.routing {
            self.config.routing = routing;
        }
    }

    fn apply_env_overrides(&mut self) {
        for var in ISOLATED_MODE_ENVS {
            if let Ok(value) = std::env::var(var) {
                if let Some(flag) = parse_flag(&value) {
                    info!(env = var, isolated = flag, "isolated mode set from environment");
                    self.config.routing.isolated_mode = flag;
                    break;
                }
            }
        }
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Validate and take ownership of the configuration
    pub fn into_config(self) -> Result<GatewayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
